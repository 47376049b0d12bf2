//! Mutation notifications for views bound to a document.

use crate::node::NodeId;

/// Receives a call after each successful mutation of the tree.
///
/// Ranges are child indices within `parent` as they are after the
/// mutation (for insertions) or were before it (for removals). A splice
/// reports its removal first, then its insertion. `highlight` is passed
/// through from the edit call so a view can select what changed.
pub trait TreeObserver {
    fn children_inserted(&mut self, parent: NodeId, first: usize, count: usize, highlight: bool) {
        let _ = (parent, first, count, highlight);
    }

    fn children_removed(&mut self, parent: NodeId, first: usize, count: usize) {
        let _ = (parent, first, count);
    }

    /// A node's name or value text changed.
    fn node_changed(&mut self, node: NodeId, highlight: bool) {
        let _ = (node, highlight);
    }
}
