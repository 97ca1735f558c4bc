use anyhow::Result;
use kuchiki::traits::TendrilSink;
use kuchiki::{parse_html, NodeRef, Selectors};

use crate::error::BridgeError;
use crate::handles::{Handle, HandleTable};

/// Rendering pipeline owned by the host. `render` re-runs styling, layout,
/// and paint-list generation from the current tree; it must not re-fetch
/// stylesheets or re-run script loading; those are one-time load actions.
pub trait Renderer {
    fn render(&mut self);
}

/// Renderer that does nothing, for hosts that drive painting elsewhere and
/// for tests that only observe the tree.
pub struct NullRenderer;

impl Renderer for NullRenderer {
    fn render(&mut self) {}
}

/// Host-side query and mutation surface over one page's document tree.
///
/// Owns the handle table: every node that becomes script-visible passes
/// through here and picks up its handle lazily.
pub struct PageDom {
    document: NodeRef,
    handles: HandleTable,
    renderer: Box<dyn Renderer>,
}

impl PageDom {
    pub fn new(html: &str, renderer: Box<dyn Renderer>) -> Self {
        Self::from_document(parse_html().one(html), renderer)
    }

    pub fn from_document(document: NodeRef, renderer: Box<dyn Renderer>) -> Self {
        Self {
            document,
            handles: HandleTable::new(),
            renderer,
        }
    }

    pub fn document(&self) -> NodeRef {
        self.document.clone()
    }

    pub fn handles(&self) -> &HandleTable {
        &self.handles
    }

    /// Handle for a node with element identity; non-elements are never
    /// script-visible and get none.
    pub fn element_handle(&mut self, node: &NodeRef) -> Option<Handle> {
        node.as_element()?;
        Some(self.handles.get_or_create(node))
    }

    /// Full preorder traversal from the document root, collecting the
    /// elements the compiled selector matches, in document order.
    pub fn query_selector_all(&mut self, selector: &str) -> Result<Vec<Handle>, BridgeError> {
        let selectors =
            Selectors::compile(selector).map_err(|()| BridgeError::InvalidSelector {
                selector: selector.to_string(),
            })?;

        let mut matched = Vec::new();
        for node in self.document.inclusive_descendants() {
            let Some(element) = node.clone().into_element_ref() else {
                continue;
            };
            if selectors.matches(&element) {
                matched.push(self.handles.get_or_create(&node));
            }
        }
        Ok(matched)
    }

    /// Named attribute of the handled node, or `None` when absent (mapped to
    /// `null` on the script side).
    pub fn get_attribute(&self, handle: Handle, name: &str) -> Result<Option<String>, BridgeError> {
        let node = self.handles.resolve(handle)?;
        let Some(element) = node.as_element() else {
            return Ok(None);
        };
        let value = element.attributes.borrow().get(name).map(str::to_string);
        Ok(value)
    }

    /// Replace the handled node's children with a re-parsed fragment and
    /// re-render. Appending the parsed nodes fixes their parent pointers.
    pub fn set_inner_html(&mut self, handle: Handle, html: &str) -> Result<(), BridgeError> {
        let target = self.handles.resolve(handle)?;

        while let Some(child) = target.first_child() {
            child.detach();
        }
        for child in parse_fragment(html) {
            target.append(child);
        }

        self.renderer.render();
        Ok(())
    }

    /// Serialize the current tree, for diagnostics and test assertions.
    pub fn document_html(&self) -> Result<String> {
        let mut output = Vec::new();
        self.document.serialize(&mut output)?;
        Ok(String::from_utf8(output)?)
    }
}

/// The document parser expects a full document shape, so fragments are parsed
/// inside a throwaway body wrapper whose children become the fragment roots.
fn parse_fragment(html: &str) -> Vec<NodeRef> {
    let wrapped = format!("<html><body>{html}</body></html>");
    let document = parse_html().one(wrapped);
    let Ok(body) = document.select_first("body") else {
        return Vec::new();
    };
    let children: Vec<NodeRef> = body.as_node().children().collect();
    for child in &children {
        child.detach();
    }
    children
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingRenderer {
        renders: Rc<Cell<usize>>,
    }

    impl Renderer for CountingRenderer {
        fn render(&mut self) {
            self.renders.set(self.renders.get() + 1);
        }
    }

    fn counting_dom(html: &str) -> (PageDom, Rc<Cell<usize>>) {
        let renders = Rc::new(Cell::new(0));
        let renderer = CountingRenderer {
            renders: Rc::clone(&renders),
        };
        (PageDom::new(html, Box::new(renderer)), renders)
    }

    #[test]
    fn query_returns_matches_in_document_order() {
        let (mut dom, _) = counting_dom(
            "<ul><li id=\"one\"></li><li id=\"two\"></li><li id=\"three\"></li></ul>",
        );
        let handles = dom.query_selector_all("li").expect("query li");
        assert_eq!(handles.len(), 3);

        let ids: Vec<String> = handles
            .iter()
            .map(|handle| {
                dom.get_attribute(*handle, "id")
                    .expect("resolve li")
                    .expect("li has id")
            })
            .collect();
        assert_eq!(ids, ["one", "two", "three"]);
    }

    #[test]
    fn query_with_no_matches_is_empty_not_an_error() {
        let (mut dom, _) = counting_dom("<div id=\"x\"></div>");
        let handles = dom.query_selector_all("#missing").expect("query");
        assert!(handles.is_empty());
    }

    #[test]
    fn invalid_selector_is_a_bridge_fault() {
        let (mut dom, _) = counting_dom("<div></div>");
        match dom.query_selector_all("[") {
            Err(BridgeError::InvalidSelector { selector }) => assert_eq!(selector, "["),
            Err(other) => panic!("unexpected error {other:?}"),
            Ok(_) => panic!("expected InvalidSelector"),
        }
    }

    #[test]
    fn repeated_queries_reuse_handles() {
        let (mut dom, _) = counting_dom("<div id=\"x\"></div>");
        let first = dom.query_selector_all("#x").expect("first query");
        let second = dom.query_selector_all("#x").expect("second query");
        assert_eq!(first, second);
    }

    #[test]
    fn set_inner_html_replaces_children_and_renders_once() {
        let (mut dom, renders) = counting_dom("<div id=\"x\"><p>old</p></div>");
        let handle = dom.query_selector_all("#x").expect("query")[0];

        dom.set_inner_html(handle, "<span>hi</span>")
            .expect("set innerHTML");

        assert_eq!(renders.get(), 1);

        let target = dom.handles().resolve(handle).expect("resolve target");
        let children: Vec<NodeRef> = target.children().collect();
        assert_eq!(children.len(), 1);

        let span = children[0].as_element().expect("span element");
        assert_eq!(span.name.local.as_ref(), "span");
        assert_eq!(children[0].text_contents(), "hi");

        let parent = children[0].parent().expect("span has a parent");
        assert!(Rc::ptr_eq(&parent.0, &target.0));
    }

    #[test]
    fn fragment_wrapper_handles_bare_text() {
        let (mut dom, _) = counting_dom("<div id=\"x\"></div>");
        let handle = dom.query_selector_all("#x").expect("query")[0];
        dom.set_inner_html(handle, "plain text").expect("set text");

        let target = dom.handles().resolve(handle).expect("resolve");
        assert_eq!(target.text_contents(), "plain text");
    }
}
