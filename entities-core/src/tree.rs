//! Tree store for entities documents.
//!
//! The tree owns three block arenas: one for text, one for node records and
//! one for child arrays. A node's name and value are a single text block
//! (name first), and its children are an exactly-sized block of [`NodeId`]s.
//! Text is never edited in place: a change reserves a fresh block and frees
//! the old one.
//!
//! # Example
//!
//! ```
//! use entities_core::Document;
//!
//! let doc = Document::parse(b"entity {\n\tentityDef foo {\n\t\tclass = \"idProp2\";\n\t}\n}\n").unwrap();
//! let tree = doc.tree();
//! let def = tree.root().first_child().unwrap().first_child().unwrap();
//! assert_eq!(def.def_name(), b"foo");
//! ```

use crate::allocator::{AllocatorStats, BlockAllocator};
use crate::config::DocumentConfig;
use crate::node::{NodeData, NodeFlags, NodeId, NodeKind};
use crate::parser::GrammarContext;
use crate::value;

// ============================================================================
// Positional ids
// ============================================================================

/// Path of child indices from the root to a node.
///
/// Unlike a [`NodeId`], a positional id stays meaningful after the nodes it
/// passes through are freed and rebuilt, as long as the shape of the tree
/// along the path is the same.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct PositionalId(Vec<u32>);

impl PositionalId {
    /// The root's id (empty path).
    pub fn root() -> Self {
        PositionalId(Vec::new())
    }

    /// Child indices from the root.
    pub fn indices(&self) -> &[u32] {
        &self.0
    }
}

impl From<Vec<u32>> for PositionalId {
    fn from(path: Vec<u32>) -> Self {
        PositionalId(path)
    }
}

// ============================================================================
// Tree
// ============================================================================

/// An entities document as an editable tree.
#[derive(Debug)]
pub struct Tree {
    text: BlockAllocator<u8>,
    nodes: BlockAllocator<NodeData>,
    refs: BlockAllocator<NodeId>,
    root: NodeId,
    max_depth: usize,
}

/// Occupancy of the tree's three arenas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeStats {
    pub text: AllocatorStats,
    pub nodes: AllocatorStats,
    pub refs: AllocatorStats,
}

impl Tree {
    /// Create a tree holding only an empty root.
    pub fn new(config: &DocumentConfig) -> Self {
        let mut tree = Tree {
            text: BlockAllocator::new(config.text_buffer_size),
            nodes: BlockAllocator::new(config.node_buffer_size),
            refs: BlockAllocator::new(config.child_buffer_size),
            root: NodeId::default(),
            max_depth: config.max_depth,
        };
        tree.root = tree.alloc_node(NodeKind::Root, NodeFlags::empty(), b"", b"");
        tree
    }

    /// Get the root node.
    pub fn root(&self) -> NodeRef<'_> {
        NodeRef { tree: self, id: self.root }
    }

    /// Get the root node's id.
    #[inline]
    pub fn root_id(&self) -> NodeId {
        self.root
    }

    /// Get a navigation handle for a node.
    pub fn node(&self, id: NodeId) -> NodeRef<'_> {
        NodeRef { tree: self, id }
    }

    pub(crate) fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[inline]
    fn data(&self, id: NodeId) -> &NodeData {
        &self.nodes.get(id.block())[0]
    }

    #[inline]
    fn data_mut(&mut self, id: NodeId) -> &mut NodeData {
        &mut self.nodes.get_mut(id.block())[0]
    }

    // ---- accessors ----

    #[inline]
    pub fn kind(&self, id: NodeId) -> NodeKind {
        self.data(id).kind
    }

    #[inline]
    pub fn flags(&self, id: NodeId) -> NodeFlags {
        self.data(id).flags
    }

    /// Name and value bytes together.
    #[inline]
    pub fn text(&self, id: NodeId) -> &[u8] {
        self.text.get(self.data(id).text)
    }

    #[inline]
    pub fn name_len(&self, id: NodeId) -> usize {
        self.data(id).name_len as usize
    }

    #[inline]
    pub fn name(&self, id: NodeId) -> &[u8] {
        &self.text(id)[..self.name_len(id)]
    }

    #[inline]
    pub fn value(&self, id: NodeId) -> &[u8] {
        &self.text(id)[self.name_len(id)..]
    }

    #[inline]
    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.refs.get(self.data(id).children)
    }

    #[inline]
    pub fn child_count(&self, id: NodeId) -> usize {
        self.data(id).children.len()
    }

    #[inline]
    pub fn child(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.children(id).get(index).copied()
    }

    #[inline]
    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.data(id).parent
    }

    pub fn is_filtered(&self, id: NodeId) -> bool {
        self.data(id).filtered
    }

    /// Mark a node as hidden by a view filter. Not recorded in history.
    pub fn set_filtered(&mut self, id: NodeId, filtered: bool) {
        self.data_mut(id).filtered = filtered;
    }

    /// Position of `child` in its parent's child array.
    pub fn index_of(&self, child: NodeId) -> Option<usize> {
        let parent = self.parent(child)?;
        self.children(parent).iter().position(|&c| c == child)
    }

    /// First child named `name`.
    pub fn find_child(&self, parent: NodeId, name: &[u8]) -> Option<NodeId> {
        self.children(parent).iter().copied().find(|&c| self.name(c) == name)
    }

    /// Value of the first child named `name`.
    pub fn find_child_value(&self, parent: NodeId, name: &[u8]) -> Option<&[u8]> {
        self.find_child(parent, name).map(|c| self.value(c))
    }

    /// For an `entityDef foo` node, `foo`; otherwise the whole name.
    pub fn def_name(&self, id: NodeId) -> &[u8] {
        let name = self.name(id);
        match name.iter().position(|&b| b == b' ') {
            Some(i) => &name[i + 1..],
            None => name,
        }
    }

    /// Grammar production that parses this node's children, if it has any.
    pub fn context_of(&self, id: NodeId) -> Option<GrammarContext> {
        match self.kind(id) {
            NodeKind::Root => Some(GrammarContext::File),
            NodeKind::Entity => Some(GrammarContext::Entity),
            NodeKind::Layer => Some(GrammarContext::Layer),
            NodeKind::EntityDef | NodeKind::Object => Some(GrammarContext::Definition),
            _ => None,
        }
    }

    /// Number of nodes in the subtree rooted at `id`, including `id`.
    pub fn subtree_len(&self, id: NodeId) -> usize {
        let mut stack = vec![id];
        let mut count = 0;
        while let Some(n) = stack.pop() {
            count += 1;
            stack.extend_from_slice(self.children(n));
        }
        count
    }

    pub fn stats(&self) -> TreeStats {
        TreeStats { text: self.text.stats(), nodes: self.nodes.stats(), refs: self.refs.stats() }
    }

    // ---- positional ids ----

    /// Path of child indices from the root to `id`.
    ///
    /// Recomputed on every call; never cached.
    pub fn positional_id(&self, id: NodeId) -> PositionalId {
        let mut path = Vec::new();
        let mut current = id;
        while let Some(parent) = self.parent(current) {
            let index = self
                .children(parent)
                .iter()
                .position(|&c| c == current)
                .expect("child missing from its parent's child array");
            path.push(index as u32);
            current = parent;
        }
        debug_assert_eq!(current, self.root, "positional id of a detached node");
        path.reverse();
        PositionalId(path)
    }

    /// Follow a positional id from the root.
    pub fn resolve(&self, position: &PositionalId) -> Option<NodeId> {
        position
            .0
            .iter()
            .try_fold(self.root, |node, &index| self.child(node, index as usize))
    }

    // ---- construction and mutation ----

    /// Allocate a detached node with no children.
    pub(crate) fn alloc_node(&mut self, kind: NodeKind, flags: NodeFlags, name: &[u8], value: &[u8]) -> NodeId {
        let text = self.alloc_text(name, value);
        let block = self.nodes.reserve_block(1).unwrap_or_default();
        let id = NodeId::from_block(block);
        *self.data_mut(id) = NodeData {
            kind,
            flags,
            text,
            name_len: name.len() as u32,
            children: Default::default(),
            parent: None,
            filtered: false,
        };
        id
    }

    fn alloc_text(&mut self, name: &[u8], value: &[u8]) -> crate::allocator::Block {
        let block = self.text.reserve_block(name.len() + value.len()).unwrap_or_default();
        let buf = self.text.get_mut(block);
        buf[..name.len()].copy_from_slice(name);
        buf[name.len()..].copy_from_slice(value);
        block
    }

    /// Replace a node's child array with an exactly-sized copy of `children`
    /// and point each child's parent at `id`.
    pub(crate) fn set_children(&mut self, id: NodeId, children: &[NodeId]) {
        let old = self.data(id).children;
        let block = self.refs.reserve_block(children.len()).unwrap_or_default();
        self.refs.get_mut(block).copy_from_slice(children);
        self.refs.free_block(old);
        self.data_mut(id).children = block;
        for &child in children {
            self.data_mut(child).parent = Some(id);
        }
    }

    pub(crate) fn insert_flags(&mut self, id: NodeId, flags: NodeFlags) {
        self.data_mut(id).flags |= flags;
    }

    /// Replace a node's name and value with `text`, split at `name_len`.
    pub(crate) fn set_text(&mut self, id: NodeId, text: &[u8], name_len: usize) {
        let old = self.data(id).text;
        let (name, value) = text.split_at(name_len);
        let block = self.alloc_text(name, value);
        self.text.free_block(old);
        let data = self.data_mut(id);
        data.text = block;
        data.name_len = name_len as u32;
    }

    /// Remove `remove` children at `index` and insert `insert` in their place.
    ///
    /// Returns the removed children, detached but not freed.
    pub(crate) fn splice(&mut self, parent: NodeId, index: usize, remove: usize, insert: &[NodeId]) -> Vec<NodeId> {
        let old = self.children(parent).to_vec();
        let removed = old[index..index + remove].to_vec();

        let mut children = Vec::with_capacity(old.len() - remove + insert.len());
        children.extend_from_slice(&old[..index]);
        children.extend_from_slice(insert);
        children.extend_from_slice(&old[index + remove..]);
        self.set_children(parent, &children);

        for &r in &removed {
            self.data_mut(r).parent = None;
        }
        removed
    }

    /// Move the child at `from` so that it ends up at index `to`.
    pub(crate) fn move_child(&mut self, parent: NodeId, from: usize, to: usize) {
        let block = self.data(parent).children;
        let slice = self.refs.get_mut(block);
        if from < to {
            slice[from..=to].rotate_left(1);
        } else if to < from {
            slice[to..=from].rotate_right(1);
        }
    }

    /// Free a node and every descendant back to the arenas.
    ///
    /// Walks with an explicit stack so depth is not bounded by the call stack.
    pub(crate) fn free_subtree(&mut self, id: NodeId) {
        let mut stack = vec![id];
        let mut order = Vec::new();
        while let Some(n) = stack.pop() {
            order.push(n);
            stack.extend_from_slice(self.children(n));
        }
        for n in order.into_iter().rev() {
            let data = *self.data(n);
            self.text.free_block(data.text);
            self.refs.free_block(data.children);
            self.nodes.free_block(n.block());
        }
    }

    // ---- serialization ----

    /// Serialize the whole document.
    pub fn to_text(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_node(self.root, 0, false, &mut out);
        out
    }

    /// Serialize one node as if it were at nesting depth 0.
    pub fn node_text(&self, id: NodeId) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_node(id, 0, false, &mut out);
        out
    }

    /// Serialize `count` children of `parent` starting at `index`.
    pub fn children_text(&self, parent: NodeId, index: usize, count: usize) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_children(&self.children(parent)[index..index + count], 0, &mut out);
        out
    }

    fn write_children(&self, children: &[NodeId], depth: usize, out: &mut Vec<u8>) {
        let mut after_comment = false;
        for &child in children {
            self.write_node(child, depth, after_comment, out);
            after_comment = self.kind(child) == NodeKind::Comment;
        }
    }

    /// A comment runs to the end of its line, so nothing is joined onto a
    /// line that ends in one.
    fn write_node(&self, id: NodeId, depth: usize, after_comment: bool, out: &mut Vec<u8>) {
        let data = self.data(id);
        let flags = data.flags;

        if data.kind == NodeKind::Root {
            self.write_children(self.children(id), 0, out);
            if flags.contains(NodeFlags::NO_FINAL_NEWLINE) && out.last() == Some(&b'\n') {
                out.pop();
            }
            return;
        }

        if !(flags.contains(NodeFlags::NO_INDENT) && !after_comment && join_line(out)) {
            indent(depth, out);
        }

        let name = self.name(id);
        let value = self.value(id);
        if data.kind.is_container() {
            out.extend_from_slice(name);
            write_separator(flags, !name.is_empty(), out);
            let (open, close) = if flags.contains(NodeFlags::HAS_BRACKETS) { (b'[', b']') } else { (b'{', b'}') };
            out.push(open);
            out.push(b'\n');
            let children = self.children(id);
            self.write_children(children, depth + 1, out);
            let last_comment = children.last().is_some_and(|&c| self.kind(c) == NodeKind::Comment);
            if !(flags.contains(NodeFlags::CLOSE_INLINE) && !last_comment && join_line(out)) {
                indent(depth, out);
            }
            out.push(close);
        } else {
            out.extend_from_slice(name);
            if !name.is_empty() {
                write_separator(flags, true, out);
            }
            out.extend_from_slice(value);
        }
        write_terminator(flags, out);
        out.push(b'\n');
    }
}

/// Continue the last written line after one space. Returns false when
/// there is no line to continue.
fn join_line(out: &mut Vec<u8>) -> bool {
    if out.last() != Some(&b'\n') {
        return false;
    }
    out.pop();
    out.push(b' ');
    true
}

fn indent(depth: usize, out: &mut Vec<u8>) {
    out.extend(std::iter::repeat(b'\t').take(depth));
}

fn write_separator(flags: NodeFlags, named: bool, out: &mut Vec<u8>) {
    if flags.contains(NodeFlags::HAS_EQUALS) {
        out.extend_from_slice(b" = ");
    } else if flags.contains(NodeFlags::HAS_COLON) {
        out.extend_from_slice(b": ");
    } else if named {
        out.push(b' ');
    }
}

fn write_terminator(flags: NodeFlags, out: &mut Vec<u8>) {
    if flags.contains(NodeFlags::HAS_SEMICOLON) {
        out.push(b';');
    } else if flags.contains(NodeFlags::HAS_COMMA) {
        out.push(b',');
    }
}

/// Structural equality of two subtrees, possibly in different trees.
///
/// Compares kind, flags, name and value of every node and the children in
/// positional order. The filtered state is ignored.
pub fn deep_eq(a_tree: &Tree, a: NodeId, b_tree: &Tree, b: NodeId) -> bool {
    let mut stack = vec![(a, b)];
    while let Some((a, b)) = stack.pop() {
        if a_tree.kind(a) != b_tree.kind(b)
            || a_tree.flags(a) != b_tree.flags(b)
            || a_tree.name(a) != b_tree.name(b)
            || a_tree.value(a) != b_tree.value(b)
            || a_tree.child_count(a) != b_tree.child_count(b)
        {
            return false;
        }
        stack.extend(a_tree.children(a).iter().copied().zip(b_tree.children(b).iter().copied()));
    }
    true
}

// ============================================================================
// NodeRef (navigation handle)
// ============================================================================

/// A handle for navigating the tree.
///
/// This is a lightweight reference that borrows from the tree; it is what a
/// view binds against to walk the document lazily.
#[derive(Clone, Copy)]
pub struct NodeRef<'t> {
    tree: &'t Tree,
    id: NodeId,
}

impl<'t> NodeRef<'t> {
    /// Get the node's ID.
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn kind(&self) -> NodeKind {
        self.tree.kind(self.id)
    }

    pub fn flags(&self) -> NodeFlags {
        self.tree.flags(self.id)
    }

    pub fn name(&self) -> &'t [u8] {
        self.tree.name(self.id)
    }

    pub fn value(&self) -> &'t [u8] {
        self.tree.value(self.id)
    }

    /// The value with surrounding quotes stripped.
    pub fn value_unquoted(&self) -> &'t [u8] {
        value::unquote(self.value())
    }

    /// For an `entityDef foo` node, `foo`; otherwise the whole name.
    pub fn def_name(&self) -> &'t [u8] {
        self.tree.def_name(self.id)
    }

    pub fn is_filtered(&self) -> bool {
        self.tree.is_filtered(self.id)
    }

    /// Get the parent node, if any.
    pub fn parent(&self) -> Option<NodeRef<'t>> {
        self.tree.parent(self.id).map(|id| NodeRef { tree: self.tree, id })
    }

    pub fn child_count(&self) -> usize {
        self.tree.child_count(self.id)
    }

    pub fn child(&self, index: usize) -> Option<NodeRef<'t>> {
        self.tree.child(self.id, index).map(|id| NodeRef { tree: self.tree, id })
    }

    /// Iterate over child nodes.
    pub fn children(&self) -> impl Iterator<Item = NodeRef<'t>> + 't {
        let tree = self.tree;
        tree.children(self.id).iter().map(move |&id| NodeRef { tree, id })
    }

    /// Get the first child node.
    pub fn first_child(&self) -> Option<NodeRef<'t>> {
        self.child(0)
    }

    /// Get the next sibling node.
    pub fn next_sibling(&self) -> Option<NodeRef<'t>> {
        let parent = self.tree.parent(self.id)?;
        let pos = self.tree.index_of(self.id)?;
        self.tree.child(parent, pos + 1).map(|id| NodeRef { tree: self.tree, id })
    }

    /// Get the previous sibling node.
    pub fn prev_sibling(&self) -> Option<NodeRef<'t>> {
        let parent = self.tree.parent(self.id)?;
        let pos = self.tree.index_of(self.id)?;
        let prev = pos.checked_sub(1)?;
        self.tree.child(parent, prev).map(|id| NodeRef { tree: self.tree, id })
    }

    /// First child named `name`.
    pub fn find_child(&self, name: &[u8]) -> Option<NodeRef<'t>> {
        self.tree.find_child(self.id, name).map(|id| NodeRef { tree: self.tree, id })
    }

    /// Serialized text of this subtree.
    pub fn to_text(&self) -> Vec<u8> {
        self.tree.node_text(self.id)
    }
}

impl std::fmt::Debug for NodeRef<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeRef")
            .field("id", &self.id)
            .field("kind", &self.kind())
            .field("name", &String::from_utf8_lossy(self.name()))
            .field("value", &String::from_utf8_lossy(self.value()))
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
