use std::rc::Rc;

use anyhow::{Context as AnyhowContext, Result};
use kuchiki::traits::TendrilSink;
use kuchiki::{parse_html, NodeRef};

use crate::bridge::PageBridge;
use crate::dom::{PageDom, Renderer};
use crate::events::EventDispatcher;
use crate::processor::{
    collect_scripts, filter_inline_classic, run_inline_scripts, ScriptExecutionSummary,
};
use crate::script::ScriptDescriptor;

/// Per-page-load context: one document tree, one embedded runtime, one
/// handle table, one dispatcher. Created at load start and dropped at
/// navigation; never a process-wide singleton.
pub struct PageSession {
    bridge: Rc<PageBridge>,
    dispatcher: EventDispatcher,
    scripts: Vec<ScriptDescriptor>,
    executed_blocking: bool,
}

impl PageSession {
    /// Parse the page, collect its `<script>` manifest, and boot the
    /// scripting bridge (host exports, then bootstrap, exactly once).
    pub fn new(html: &str, renderer: Box<dyn Renderer>) -> Result<Self> {
        let document = parse_html().one(html);
        let scripts =
            collect_scripts(&document).context("failed to collect scripts from document")?;

        let dom = PageDom::from_document(document, renderer);
        let bridge =
            Rc::new(PageBridge::new(dom).context("failed to boot scripting bridge for page")?);
        let dispatcher = EventDispatcher::new(Rc::clone(&bridge));

        Ok(Self {
            bridge,
            dispatcher,
            scripts,
            executed_blocking: false,
        })
    }

    /// Execute all classic blocking scripts in document order, each to
    /// completion, each failing independently. Subsequent calls are no-ops.
    pub fn run_blocking_scripts(&mut self) -> Option<ScriptExecutionSummary> {
        if self.executed_blocking {
            return None;
        }
        self.executed_blocking = true;

        let inline = filter_inline_classic(&self.scripts);
        if inline.is_empty() {
            return None;
        }
        Some(run_inline_scripts(&self.bridge, &inline))
    }

    pub fn bridge(&self) -> Rc<PageBridge> {
        Rc::clone(&self.bridge)
    }

    pub fn dispatcher(&self) -> &EventDispatcher {
        &self.dispatcher
    }

    pub fn scripts(&self) -> &[ScriptDescriptor] {
        &self.scripts
    }

    pub fn document(&self) -> NodeRef {
        self.bridge.dom().borrow().document()
    }

    /// Serialize the current document tree managed by the session.
    pub fn document_html(&self) -> Result<String> {
        self.bridge
            .document_html()
            .context("failed to serialize session document")
    }
}
