//! Node records stored in the tree's block arenas.
//!
//! A node never owns memory directly: its text and its child array are
//! [`Block`]s in the tree's allocators, and the node record itself lives in a
//! one-element block of the node allocator. [`NodeId`] is that block's
//! address.

use bitflags::bitflags;

use crate::allocator::Block;

/// Address of a node record in the tree's node arena.
///
/// Ids are reused after a node is freed. History commands therefore never
/// store them and address nodes by [`crate::tree::PositionalId`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct NodeId {
    buffer: u32,
    slot: u32,
}

impl NodeId {
    pub(crate) fn from_block(block: Block) -> Self {
        debug_assert_eq!(block.len, 1);
        NodeId { buffer: block.buffer, slot: block.start }
    }

    pub(crate) fn block(self) -> Block {
        Block::new(self.buffer, self.slot, 1)
    }
}

/// The syntactic role of a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NodeKind {
    /// The file itself. Children are entities, comments and file-level leaves.
    Root,
    /// `entity { ... }` at file level.
    Entity,
    /// `entityDef name { ... }` inside an entity.
    EntityDef,
    /// `layers { ... }` inside an entity: a flat list of strings.
    Layer,
    /// `name = { ... }` inside a definition.
    Object,
    /// `name = value;` (or `name value` at file level).
    Leaf,
    /// A bare value with no name.
    #[default]
    Value,
    /// A string entry of a layer object.
    LayerString,
    /// `// ...` up to the end of the line.
    Comment,
}

impl NodeKind {
    /// Whether nodes of this kind hold children.
    #[inline]
    pub fn is_container(self) -> bool {
        matches!(
            self,
            NodeKind::Root | NodeKind::Entity | NodeKind::EntityDef | NodeKind::Layer | NodeKind::Object
        )
    }
}

bitflags! {
    /// Punctuation present around a node in its source text.
    ///
    /// Together with the node kind these reproduce the node's formatting.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u16 {
        /// `name = value`
        const HAS_EQUALS = 1 << 0;
        /// Terminated by `;`
        const HAS_SEMICOLON = 1 << 1;
        /// Children delimited by `{ }`
        const HAS_BRACES = 1 << 2;
        /// Written on the line of the preceding output, after one space
        const NO_INDENT = 1 << 3;
        /// `name: value`
        const HAS_COLON = 1 << 4;
        /// Terminated by `,`
        const HAS_COMMA = 1 << 5;
        /// Children delimited by `[ ]`
        const HAS_BRACKETS = 1 << 6;
        /// Closing delimiter on the line of the node's last child
        const CLOSE_INLINE = 1 << 7;
        /// Root only: the source did not end with a line break
        const NO_FINAL_NEWLINE = 1 << 8;
    }
}

/// Internal node storage.
///
/// `text` holds the name followed by the value; `name_len` splits them.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct NodeData {
    pub kind: NodeKind,
    pub flags: NodeFlags,
    pub text: Block,
    pub name_len: u32,
    pub children: Block,
    pub parent: Option<NodeId>,
    pub filtered: bool,
}
