use std::collections::HashMap;
use std::rc::Rc;

use kuchiki::NodeRef;

use crate::error::BridgeError;

/// Integer token standing in for a host-side node on the script side of the
/// boundary. Unique within one page-load session; never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(u32);

impl Handle {
    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        Handle(raw)
    }
}

/// Bidirectional node↔handle map scoped to a single page load.
///
/// Identity is the `Rc` pointer behind the `NodeRef`; the handle→node map
/// holds each node strongly, so a pointer can never be recycled while its
/// entry lives. The strong reference also means a node that obtains a handle
/// stays alive for the rest of the page even after being detached from the
/// tree. This is a known, deliberate leak: cross-runtime collection is out
/// of scope.
pub struct HandleTable {
    by_node: HashMap<usize, Handle>,
    by_handle: HashMap<Handle, NodeRef>,
    next: u32,
}

impl HandleTable {
    pub fn new() -> Self {
        Self {
            by_node: HashMap::new(),
            by_handle: HashMap::new(),
            next: 1,
        }
    }

    fn identity(node: &NodeRef) -> usize {
        Rc::as_ptr(&node.0) as usize
    }

    /// Returns the node's existing handle, or allocates the next integer and
    /// records the pair in both maps. O(1) amortized.
    pub fn get_or_create(&mut self, node: &NodeRef) -> Handle {
        let key = Self::identity(node);
        if let Some(handle) = self.by_node.get(&key) {
            return *handle;
        }
        let handle = Handle(self.next);
        self.next += 1;
        self.by_node.insert(key, handle);
        self.by_handle.insert(handle, node.clone());
        handle
    }

    /// Resolves a handle back to its node. Never returns a stale or
    /// incorrect node; a handle that was never allocated in this session is
    /// an `UnknownHandle` error.
    pub fn resolve(&self, handle: Handle) -> Result<NodeRef, BridgeError> {
        self.by_handle
            .get(&handle)
            .cloned()
            .ok_or(BridgeError::UnknownHandle(handle.raw()))
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.by_node.contains_key(&Self::identity(node))
    }

    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}
