use std::rc::Rc;

use kuchiki::NodeRef;
use serde_json::json;
use tracing::error;

use crate::bridge::PageBridge;

/// Host-native behavior that normally follows an interaction, unless a
/// listener canceled it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DefaultAction {
    /// Navigate to the nearest enclosing anchor's destination.
    FollowLink { href: String },
    /// Submit the form.
    SubmitForm,
    /// Nothing beyond the dispatch itself.
    None,
}

/// What happened to a key press on a text-entry node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDisposition {
    /// The character was appended to the node's value.
    Committed,
    /// A listener canceled the dispatch before the value write.
    Suppressed,
    /// The target does not accumulate text, or the key has no text.
    Ignored,
}

/// Converts host-originated interaction into script dispatches and decides
/// whether the default action proceeds.
///
/// The ordering around input values is a deliberate contract: "keydown"
/// models pre-mutation interception and fires before the value write, so a
/// canceled dispatch suppresses the commit; "change" reports a
/// value-already-changed fact and fires after the commit, so listeners
/// observe the new value and the mutation itself cannot be canceled.
pub struct EventDispatcher {
    bridge: Rc<PageBridge>,
}

impl EventDispatcher {
    pub fn new(bridge: Rc<PageBridge>) -> Self {
        Self { bridge }
    }

    /// Click at page coordinates, already resolved to a target node by the
    /// host. Listeners run first; the navigation default survives unless one
    /// of them canceled.
    pub fn click(&self, target: &NodeRef, x: f64, y: f64) -> DefaultAction {
        let payload = json!({
            "clientX": x,
            "clientY": y,
            "button": 0,
        });
        if self.dispatch(target, "click", payload) {
            return DefaultAction::None;
        }
        match enclosing_link_href(target) {
            Some(href) => DefaultAction::FollowLink { href },
            None => DefaultAction::None,
        }
    }

    /// Key press on a node. Fires before any value mutation; a canceled
    /// dispatch suppresses the commit entirely.
    pub fn key_down(&self, target: &NodeRef, key: &str) -> KeyDisposition {
        if self.dispatch(target, "keydown", json!({ "key": key })) {
            return KeyDisposition::Suppressed;
        }
        if append_to_value(target, key) {
            KeyDisposition::Committed
        } else {
            KeyDisposition::Ignored
        }
    }

    /// Value commit on a node. The value is written first, then "change"
    /// fires, so listeners observe the committed value. Returns whether a
    /// listener called `preventDefault`. Informational only, since the
    /// mutation has already happened.
    pub fn change(&self, target: &NodeRef, value: &str) -> bool {
        set_value(target, value);
        self.dispatch(target, "change", json!({ "value": value }))
    }

    /// Form submission. Listeners run first; a canceled dispatch aborts the
    /// submission.
    pub fn submit(&self, form: &NodeRef) -> DefaultAction {
        if self.dispatch(form, "submit", json!({})) {
            DefaultAction::None
        } else {
            DefaultAction::SubmitForm
        }
    }

    /// Returns whether the dispatch was canceled. Bridge-level failures must
    /// not escape to the host's input handling; they are reported here and
    /// the default action proceeds.
    fn dispatch(&self, target: &NodeRef, event_type: &str, payload: serde_json::Value) -> bool {
        match self.bridge.dispatch_with_payload(event_type, target, payload) {
            Ok(canceled) => canceled,
            Err(err) => {
                error!(target = "quickjs", event = event_type, error = %err, "event dispatch failed");
                false
            }
        }
    }
}

/// Walk from the target through its ancestors looking for an anchor with a
/// destination, the way a click on nested markup still follows the link.
fn enclosing_link_href(node: &NodeRef) -> Option<String> {
    let mut current = Some(node.clone());
    while let Some(candidate) = current {
        if let Some(element) = candidate.as_element() {
            if element.name.local.as_ref().eq_ignore_ascii_case("a") {
                if let Some(href) = element.attributes.borrow().get("href") {
                    return Some(href.to_string());
                }
            }
        }
        current = candidate.parent();
    }
    None
}

fn is_text_entry(tag: &str) -> bool {
    tag.eq_ignore_ascii_case("input") || tag.eq_ignore_ascii_case("textarea")
}

fn set_value(node: &NodeRef, value: &str) -> bool {
    let Some(element) = node.as_element() else {
        return false;
    };
    element
        .attributes
        .borrow_mut()
        .insert("value", value.to_string());
    true
}

/// Append a printable character to the node's value. Control keys carry no
/// text and have no commit step.
fn append_to_value(node: &NodeRef, key: &str) -> bool {
    let Some(element) = node.as_element() else {
        return false;
    };
    if !is_text_entry(element.name.local.as_ref()) {
        return false;
    }
    if key.chars().count() != 1 {
        return false;
    }

    let mut attributes = element.attributes.borrow_mut();
    let mut value = attributes.get("value").unwrap_or("").to_string();
    value.push_str(key);
    attributes.insert("value", value);
    true
}
