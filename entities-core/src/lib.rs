//! Entities Core
//!
//! Parser, editable tree store and diff/merge engine for brace-delimited
//! entities files. Text is parsed into a tree backed by block arenas;
//! edits reparse fragments and splice them in, logging reversible commands
//! for undo and redo.
//!
//! # Architecture
//!
//! - **allocator.rs** - Block arenas with sorted, coalescing free lists
//! - **node.rs** - NodeId, NodeKind, NodeFlags and the node record
//! - **token.rs** - Hand-written tokenizer
//! - **parser.rs** - Recursive-descent grammar (file / entity / layer / definition)
//! - **tree.rs** - Tree store, canonical writer, positional ids, NodeRef
//! - **value.rs** - Unquoting, `item[N]` names, permissive number coercion
//! - **history.rs** - Reversible commands and the undo/redo log
//! - **document.rs** - Edit API over a tree and its history
//! - **observer.rs** - Mutation notifications for bound views
//! - **diff.rs** - Export and import of structural diffs
//! - **container.rs** - Compressed-file header and codec seam
//! - **config.rs** - Document and diff tunables

pub mod allocator;
pub mod config;
pub mod container;
pub mod diff;
pub mod document;
pub mod error;
pub mod history;
pub mod node;
pub mod observer;
pub mod parser;
pub mod token;
pub mod tree;
pub mod value;

pub use allocator::{AllocatorStats, Block, BlockAllocator};
pub use config::{DiffConfig, DocumentConfig};
pub use container::Codec;
pub use diff::{export, import, DiffDocument, EntityIndex, ImportSummary, ObjectDiff};
pub use document::Document;
pub use error::{Error, ParseError, ParseErrorKind, Result};
pub use history::{Command, CommandGroup, CommandKind, HistoryState};
pub use node::{NodeFlags, NodeId, NodeKind};
pub use observer::TreeObserver;
pub use parser::GrammarContext;
pub use token::{Token, TokenKind, Tokenizer};
pub use tree::{deep_eq, NodeRef, PositionalId, Tree, TreeStats};
