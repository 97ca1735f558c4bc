use std::cell::RefCell;
use std::rc::Rc;

use anyhow::Result;
use kuchiki::NodeRef;
use rquickjs::{Ctx, Function, IntoJs};
use serde_json::{to_string as to_json_string, Value as JsonValue};
use tracing::{error, warn};

use crate::dom::PageDom;
use crate::engine::QuickJsEngine;
use crate::error::BridgeError;
use crate::handles::Handle;

/// Host-side context owning the embedded runtime for one page load.
///
/// Construction installs the host exports and evaluates the bootstrap
/// program, in that order, exactly once: no user script can run before the
/// reflector layer exists. Globals and the listener registry then persist
/// across every script loaded into the page, by design: an earlier script's
/// top-level bindings are visible to later scripts and later dispatches.
pub struct PageBridge {
    engine: QuickJsEngine,
    dom: Rc<RefCell<PageDom>>,
}

impl PageBridge {
    pub fn new(dom: PageDom) -> Result<Self, BridgeError> {
        let engine = QuickJsEngine::new().map_err(|err| bootstrap_fault(&err))?;
        let dom = Rc::new(RefCell::new(dom));
        install_host_exports(&engine, Rc::clone(&dom)).map_err(|err| bootstrap_fault(&err))?;
        Ok(Self { engine, dom })
    }

    pub fn dom(&self) -> Rc<RefCell<PageDom>> {
        Rc::clone(&self.dom)
    }

    /// Run one script body. Faults are caught here, reported with the script
    /// label, and swallowed; the page and subsequent scripts continue.
    /// Returns whether the script completed.
    pub fn load_script(&self, source: &str, label: &str) -> bool {
        match self.engine.eval(source, label) {
            Ok(()) => true,
            Err(err) => {
                error!(target = "quickjs", script = label, error = %err, "script execution failed");
                false
            }
        }
    }

    /// Evaluate a script body and deserialize its completion value. Unlike
    /// [`load_script`](Self::load_script) this propagates faults; tests and
    /// host probes use it.
    pub fn eval_with<V>(&self, source: &str, label: &str) -> Result<V>
    where
        V: for<'js> rquickjs::FromJs<'js>,
    {
        self.engine.eval_with(source, label)
    }

    /// Dispatch an event with an empty detail payload. Returns `true` when a
    /// listener canceled the interaction's default action.
    pub fn dispatch_event(&self, event_type: &str, target: &NodeRef) -> Result<bool> {
        self.dispatch_with_payload(event_type, target, JsonValue::Object(Default::default()))
    }

    /// Dispatch an event to the listeners registered for the target's handle.
    ///
    /// A target without element identity can never hold a handle, so dispatch
    /// is skipped entirely. Listener exceptions are routine script faults:
    /// they are reported here and the verdict falls back to "not canceled".
    /// Only bridge-level defects (a missing dispatch entry, a poisoned
    /// context) surface as `Err`.
    pub fn dispatch_with_payload(
        &self,
        event_type: &str,
        target: &NodeRef,
        payload: JsonValue,
    ) -> Result<bool> {
        let handle = match self.dom.borrow_mut().element_handle(target) {
            Some(handle) => handle,
            None => return Ok(false),
        };

        let detail_json = to_json_string(&payload)?;
        let event_type_owned = event_type.to_string();

        let verdict = self.engine.with_context(|ctx| {
            let global = ctx.globals();
            let dispatch: Function = global.get("__page_dispatch")?;
            let detail = ctx.json_parse(detail_json.as_bytes())?;
            let allow_default: bool =
                dispatch.call((handle.raw(), event_type_owned, detail))?;
            Ok(allow_default)
        });

        let canceled = match verdict {
            Ok(allow_default) => !allow_default,
            Err(err) => {
                error!(
                    target = "quickjs",
                    event = event_type,
                    error = %err,
                    "event listener raised; default action proceeds"
                );
                false
            }
        };

        if let Err(err) = self.engine.drain_jobs() {
            error!(target = "quickjs", error = %err, "failed to drain jobs after dispatch");
        }

        Ok(canceled)
    }

    /// Serialize the current document tree.
    pub fn document_html(&self) -> Result<String> {
        self.dom.borrow().document_html()
    }
}

fn bootstrap_fault(err: &anyhow::Error) -> BridgeError {
    // Not expected in correct operation, unlike user-script faults; surface
    // the full chain.
    error!(target = "quickjs", error = ?err, "bootstrap failed");
    BridgeError::Bootstrap {
        message: format!("{err:#}"),
    }
}

/// Convert a host-side fault into an exception the script can observe and
/// catch. Uncaught, it degenerates into an ordinary script fault at the
/// load/dispatch boundary.
fn throw_bridge_fault<T>(ctx: &Ctx<'_>, err: BridgeError) -> rquickjs::Result<T> {
    match &err {
        BridgeError::UnknownHandle(_) => {
            // Scripts cannot forge handles; a miss here is a bridge defect.
            error!(target = "quickjs", error = %err, "handle resolution failed inside host export");
        }
        _ => {
            warn!(target = "quickjs", error = %err, "host export rejected script request");
        }
    }
    let message = err.to_string();
    let value = message.into_js(ctx)?;
    Err(ctx.throw(value))
}

/// Install the host capabilities under fixed names, then evaluate the
/// bootstrap program that builds the reflector layer on top of them.
fn install_host_exports(engine: &QuickJsEngine, dom: Rc<RefCell<PageDom>>) -> Result<()> {
    engine.with_context(|ctx| {
        let global = ctx.globals();

        {
            let dom_ref = Rc::clone(&dom);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, selector: String| -> rquickjs::Result<Vec<u32>> {
                    match dom_ref.borrow_mut().query_selector_all(&selector) {
                        Ok(handles) => Ok(handles.into_iter().map(Handle::raw).collect()),
                        Err(err) => throw_bridge_fault(&ctx, err),
                    }
                },
            )?
            .with_name("__page_query_selector_all")?;
            global.set("__page_query_selector_all", func)?;
        }

        {
            let dom_ref = Rc::clone(&dom);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, handle: u32, name: String| -> rquickjs::Result<Option<String>> {
                    match dom_ref
                        .borrow()
                        .get_attribute(Handle::from_raw(handle), &name)
                    {
                        Ok(value) => Ok(value),
                        Err(err) => throw_bridge_fault(&ctx, err),
                    }
                },
            )?
            .with_name("__page_get_attribute")?;
            global.set("__page_get_attribute", func)?;
        }

        {
            let dom_ref = Rc::clone(&dom);
            let func = Function::new(
                ctx.clone(),
                move |ctx: Ctx<'_>, handle: u32, value: Option<String>| -> rquickjs::Result<()> {
                    let html = value.unwrap_or_default();
                    match dom_ref
                        .borrow_mut()
                        .set_inner_html(Handle::from_raw(handle), &html)
                    {
                        Ok(()) => Ok(()),
                        Err(err) => throw_bridge_fault(&ctx, err),
                    }
                },
            )?
            .with_name("__page_set_inner_html")?;
            global.set("__page_set_inner_html", func)?;
        }

        ctx.eval::<(), _>(PAGE_BOOTSTRAP.as_bytes())
    })
}

const PAGE_BOOTSTRAP: &str = r#"
(() => {
    const global = globalThis;
    if (typeof global.window !== 'object' || global.window === null) {
        global.window = global;
    }
    if (typeof global.self !== 'object' || global.self === null) {
        global.self = global;
    }

    // handle -> (event type -> listeners in registration order). Entries are
    // never pruned when nodes leave the tree; they live as long as the page.
    const LISTENERS = new Map();

    // Node wrappers are cheap and transient: two wrappers for one handle are
    // distinct objects, and equality across them is undefined.
    function Node(handle) {
        this.handle = handle;
    }

    Node.prototype.getAttribute = function (name) {
        const value = global.__page_get_attribute(this.handle, String(name));
        return value == null ? null : value;
    };

    Node.prototype.addEventListener = function (type, listener) {
        if (typeof listener !== 'function') {
            throw new TypeError('listener is not a function');
        }
        let byType = LISTENERS.get(this.handle);
        if (byType === undefined) {
            byType = new Map();
            LISTENERS.set(this.handle, byType);
        }
        let list = byType.get(type);
        if (list === undefined) {
            list = [];
            byType.set(type, list);
        }
        list.push(listener);
    };

    Object.defineProperty(Node.prototype, 'innerHTML', {
        set(html) {
            global.__page_set_inner_html(this.handle, String(html));
        },
        configurable: true,
    });

    function Event(type, handle, detail) {
        this.type = type;
        this.target = new Node(handle);
        this.detail = detail === undefined ? {} : detail;
        this.defaultPrevented = false;
    }

    Event.prototype.preventDefault = function () {
        this.defaultPrevented = true;
    };

    global.Node = Node;
    global.Event = Event;

    global.document = {
        querySelectorAll(selector) {
            const handles = global.__page_query_selector_all(String(selector));
            return handles.map((handle) => new Node(handle));
        },
    };

    // Host-invoked dispatch entry. One fresh Event per dispatch; listeners
    // run in registration order with `this` bound to a fresh Node. Listener
    // exceptions propagate to the host, which catches them at the bridge
    // boundary. Returns whether the default action is still allowed.
    global.__page_dispatch = function (handle, type, detail) {
        const event = new Event(type, handle, detail);
        const byType = LISTENERS.get(handle);
        const list = byType === undefined ? undefined : byType.get(type);
        if (list !== undefined) {
            for (let i = 0; i < list.length; i += 1) {
                list[i].call(new Node(handle), event);
            }
        }
        return !event.defaultPrevented;
    };
})();
"#;
