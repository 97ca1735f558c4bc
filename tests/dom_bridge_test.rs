use std::cell::Cell;
use std::rc::Rc;

use pagebridge::{NullRenderer, PageSession, Renderer};

struct CountingRenderer {
    renders: Rc<Cell<usize>>,
}

impl Renderer for CountingRenderer {
    fn render(&mut self) {
        self.renders.set(self.renders.get() + 1);
    }
}

fn counting_renderer() -> (Box<dyn Renderer>, Rc<Cell<usize>>) {
    let renders = Rc::new(Cell::new(0));
    let renderer = CountingRenderer {
        renders: Rc::clone(&renders),
    };
    (Box::new(renderer), renders)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

#[test]
fn script_replaces_children_through_inner_html() {
    init_tracing();
    let html = r##"
        <html><body>
            <div id="x"></div>
            <script>
                document.querySelectorAll("#x")[0].innerHTML = "<span>hi</span>";
            </script>
        </body></html>
    "##;

    let (renderer, renders) = counting_renderer();
    let mut session = PageSession::new(html, renderer).expect("create session");
    let summary = session
        .run_blocking_scripts()
        .expect("page has runnable scripts");
    assert_eq!(summary.executed_scripts, 1);
    assert_eq!(summary.failed_scripts, 0);
    assert_eq!(renders.get(), 1, "one mutation, one render");

    let div = session
        .document()
        .select_first("#x")
        .expect("div still present")
        .as_node()
        .clone();
    let children: Vec<_> = div.children().collect();
    assert_eq!(children.len(), 1, "old children replaced by the fragment");

    let span = children[0].as_element().expect("span element");
    assert_eq!(span.name.local.as_ref(), "span");
    assert_eq!(children[0].text_contents(), "hi");

    let parent = children[0].parent().expect("span is attached");
    assert!(
        Rc::ptr_eq(&parent.0, &div.0),
        "fragment children are reparented onto the target"
    );
}

#[test]
fn get_attribute_returns_values_and_null() {
    let html = r#"<html><body><div id="x" data-kind="widget"></div></body></html>"#;
    let session = PageSession::new(html, Box::new(NullRenderer)).expect("create session");
    let bridge = session.bridge();

    assert!(bridge.load_script(
        r##"
            const node = document.querySelectorAll("#x")[0];
            globalThis.kind = node.getAttribute("data-kind");
            globalThis.missingIsNull = node.getAttribute("nope") === null;
        "##,
        "attr-probe.js",
    ));

    let kind: String = bridge.eval_with("kind", "read-kind.js").expect("read kind");
    assert_eq!(kind, "widget");

    let missing_is_null: bool = bridge
        .eval_with("missingIsNull", "read-missing.js")
        .expect("read missing");
    assert!(missing_is_null, "absent attributes surface as null");
}

#[test]
fn selector_without_matches_yields_empty_list() {
    let html = r#"<html><body><div id="x"></div></body></html>"#;
    let session = PageSession::new(html, Box::new(NullRenderer)).expect("create session");
    let bridge = session.bridge();

    let count: i32 = bridge
        .eval_with(
            r##"document.querySelectorAll("#missing").length"##,
            "missing-count.js",
        )
        .expect("query with no matches succeeds");
    assert_eq!(count, 0);
}

#[test]
fn invalid_selector_is_script_visible_and_host_survives() {
    init_tracing();
    let html = r#"<html><body><div id="x"></div></body></html>"#;
    let session = PageSession::new(html, Box::new(NullRenderer)).expect("create session");
    let bridge = session.bridge();

    assert!(bridge.load_script(
        r#"
            globalThis.caught = false;
            try {
                document.querySelectorAll("[");
            } catch (err) {
                globalThis.caught = true;
                globalThis.caughtMessage = String(err);
            }
        "#,
        "bad-selector.js",
    ));

    let caught: bool = bridge.eval_with("caught", "read-caught.js").expect("read flag");
    assert!(caught, "invalid selector raises a catchable exception");

    let message: String = bridge
        .eval_with("caughtMessage", "read-message.js")
        .expect("read message");
    assert!(
        message.contains("selector"),
        "exception names the selector problem: {message}"
    );

    // The host keeps serving input events after the fault.
    let div = session
        .document()
        .select_first("#x")
        .expect("div present")
        .as_node()
        .clone();
    let canceled = bridge
        .dispatch_event("click", &div)
        .expect("dispatch after fault");
    assert!(!canceled);
}

#[test]
fn uncaught_invalid_selector_degenerates_into_script_fault() {
    let html = r#"<html><body>
        <script>document.querySelectorAll("[");</script>
        <script>globalThis.after = true;</script>
    </body></html>"#;

    let mut session = PageSession::new(html, Box::new(NullRenderer)).expect("create session");
    let summary = session.run_blocking_scripts().expect("scripts ran");
    assert_eq!(summary.executed_scripts, 1);
    assert_eq!(summary.failed_scripts, 1);

    let after: bool = session
        .bridge()
        .eval_with("after", "read-after.js")
        .expect("read after");
    assert!(after, "later scripts run despite the earlier fault");
}

#[test]
fn mutation_inside_loaded_script_serializes_back() {
    let html = r#"<html><body><div id="x"><p>old</p></div></body></html>"#;
    let session = PageSession::new(html, Box::new(NullRenderer)).expect("create session");
    let bridge = session.bridge();

    assert!(bridge.load_script(
        r##"document.querySelectorAll("#x")[0].innerHTML = "<em>fresh</em>";"##,
        "mutate.js",
    ));

    let serialized = session.document_html().expect("serialize document");
    assert!(serialized.contains("<em>fresh</em>"), "{serialized}");
    assert!(!serialized.contains("<p>old</p>"), "{serialized}");
}
