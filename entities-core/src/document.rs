//! Documents: a tree with its edit history.
//!
//! All mutation of a loaded document goes through [`Document`]. Each edit
//! is applied to the tree at once and its reverse is added to the pending
//! history group; [`Document::push_group_command`] commits the group as one
//! undo step and [`Document::cancel_group_command`] rolls it back.
//!
//! ```
//! use entities_core::Document;
//!
//! let mut doc = Document::parse(b"entity {\n\tentityDef a {\n\t}\n}\n").unwrap();
//! let def = doc.tree().root().first_child().unwrap().first_child().unwrap().id();
//! doc.edit_tree(b"class = \"idProp2\";\n", def, 0, 0, false, true).unwrap();
//! doc.push_group_command();
//! assert!(doc.undo());
//! assert_eq!(doc.to_text(), b"entity {\n\tentityDef a {\n\t}\n}\n");
//! ```

use tracing::trace;

use crate::config::DocumentConfig;
use crate::container::{self, Codec};
use crate::error::{ParseError, Result};
use crate::history::{Command, CommandGroup, CommandKind, History, HistoryState};
use crate::node::{NodeFlags, NodeId, NodeKind};
use crate::observer::TreeObserver;
use crate::parser::{self, GrammarContext};
use crate::tree::Tree;
use crate::value;

/// A parsed entities file open for editing.
pub struct Document {
    tree: Tree,
    history: History,
    observer: Option<Box<dyn TreeObserver>>,
    config: DocumentConfig,
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("tree", &self.tree)
            .field("history", &self.history)
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

impl Document {
    /// An empty document.
    pub fn new(config: DocumentConfig) -> Self {
        Document {
            tree: Tree::new(&config),
            history: History::new(config.history_capacity),
            observer: None,
            config,
        }
    }

    pub fn parse(text: &[u8]) -> Result<Self, ParseError> {
        Self::parse_with_config(text, DocumentConfig::default())
    }

    pub fn parse_with_config(text: &[u8], config: DocumentConfig) -> Result<Self, ParseError> {
        let mut doc = Document::new(config);
        parser::parse_document(&mut doc.tree, text)?;
        Ok(doc)
    }

    /// Open file contents, decompressing them first if they carry the
    /// compressed header.
    pub fn from_bytes(bytes: &[u8], codec: Option<&dyn Codec>, config: DocumentConfig) -> Result<Self> {
        let text = container::decode(bytes, codec)?;
        Ok(Self::parse_with_config(&text, config)?)
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn config(&self) -> &DocumentConfig {
        &self.config
    }

    pub fn to_text(&self) -> Vec<u8> {
        self.tree.to_text()
    }

    pub fn set_observer(&mut self, observer: Box<dyn TreeObserver>) {
        self.observer = Some(observer);
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn TreeObserver>> {
        self.observer.take()
    }

    /// Hide or show a node in filtered views. Not recorded in history.
    pub fn set_filtered(&mut self, node: NodeId, filtered: bool) {
        self.tree.set_filtered(node, filtered);
    }

    pub fn history_state(&self) -> HistoryState {
        self.history.state()
    }

    pub fn can_undo(&self) -> bool {
        self.history.undo_len() > 0 || self.history.state() == HistoryState::GroupOpen
    }

    pub fn can_redo(&self) -> bool {
        self.history.redo_len() > 0
    }

    // ========================================================================
    // Edits
    // ========================================================================

    /// Replace `remove` children of `parent` starting at `index` with the
    /// nodes parsed from `text`.
    ///
    /// `text` is parsed in the grammar context of `parent`. If it does not
    /// parse, the error is returned and the tree is left as it was.
    ///
    /// # Panics
    ///
    /// If `parent` cannot hold children or the range is out of bounds.
    pub fn edit_tree(
        &mut self,
        text: &[u8],
        parent: NodeId,
        index: usize,
        remove: usize,
        renumber_lists: bool,
        highlight: bool,
    ) -> Result<(), ParseError> {
        self.insert_fragment(text, parent, index, remove, false, highlight)?;
        if renumber_lists {
            self.fix_list_numberings(parent, false, highlight);
        }
        Ok(())
    }

    /// [`Document::edit_tree`] without renumbering, optionally placing the
    /// first parsed node on the line before it.
    pub(crate) fn insert_fragment(
        &mut self,
        text: &[u8],
        parent: NodeId,
        index: usize,
        remove: usize,
        first_inline: bool,
        highlight: bool,
    ) -> Result<(), ParseError> {
        assert!(
            index + remove <= self.tree.child_count(parent),
            "edit range {index}+{remove} out of bounds"
        );
        let target = self.tree.positional_id(parent);
        let inverse = self.apply_tree(parent, index, remove, text, first_inline, highlight)?;
        self.history.record(Command { target, kind: inverse, highlight });
        Ok(())
    }

    /// Replace a node's name and value with `text`, the first `name_len`
    /// bytes being the name. The text is not validated.
    pub fn edit_text(&mut self, text: &[u8], node: NodeId, name_len: usize, highlight: bool) {
        assert!(name_len <= text.len(), "name length past end of text");
        let target = self.tree.positional_id(node);
        let inverse = self.apply_text(node, text, name_len, highlight);
        self.history.record(Command { target, kind: inverse, highlight });
    }

    /// Move the child of `parent` at `from` to index `to`.
    ///
    /// # Panics
    ///
    /// If either index is out of bounds.
    pub fn edit_position(&mut self, parent: NodeId, from: usize, to: usize, highlight: bool) {
        let count = self.tree.child_count(parent);
        assert!(from < count && to < count, "move {from} -> {to} out of bounds ({count} children)");
        if from == to {
            return;
        }
        let target = self.tree.positional_id(parent);
        let inverse = self.apply_position(parent, from, to, highlight);
        self.history.record(Command { target, kind: inverse, highlight });
    }

    /// Renumber the `item[N]` children of `parent` to `0..count` in their
    /// current order and keep the sibling `num` leaf equal to the count.
    ///
    /// A missing `num` is inserted before the first item when there are
    /// items; none is created for an empty list. Only definition bodies hold
    /// lists; other parents are skipped but still recursed into.
    pub fn fix_list_numberings(&mut self, parent: NodeId, recursive: bool, highlight: bool) {
        if self.tree.context_of(parent) == Some(GrammarContext::Definition) {
            self.renumber(parent, highlight);
        }
        if recursive {
            let containers: Vec<NodeId> = self
                .tree
                .children(parent)
                .iter()
                .copied()
                .filter(|&c| self.tree.kind(c).is_container())
                .collect();
            for child in containers {
                self.fix_list_numberings(child, true, highlight);
            }
        }
    }

    fn renumber(&mut self, parent: NodeId, highlight: bool) {
        let mut count = 0;
        let mut first_item = None;
        let children = self.tree.children(parent).to_vec();
        for (position, child) in children.into_iter().enumerate() {
            let Some(index) = value::list_index(self.tree.name(child)) else {
                continue;
            };
            first_item.get_or_insert(position);
            if index != count {
                let mut text = value::list_item_name(count);
                let name_len = text.len();
                text.extend_from_slice(self.tree.value(child));
                self.edit_text(&text, child, name_len, highlight);
            }
            count += 1;
        }

        let count_text = count.to_string().into_bytes();
        match self.tree.find_child(parent, b"num") {
            Some(num) if self.tree.value(num) != count_text.as_slice() => {
                let mut text = b"num".to_vec();
                text.extend_from_slice(&count_text);
                self.edit_text(&text, num, 3, highlight);
            }
            Some(_) => {}
            None => {
                if let Some(index) = first_item {
                    let flags = NodeFlags::HAS_EQUALS | NodeFlags::HAS_SEMICOLON;
                    let num = self.tree.alloc_node(NodeKind::Leaf, flags, b"num", &count_text);
                    let target = self.tree.positional_id(parent);
                    let inverse = self.apply_splice(parent, index, 0, &[num], highlight);
                    self.history.record(Command { target, kind: inverse, highlight });
                }
            }
        }
    }

    // ========================================================================
    // Groups, undo and redo
    // ========================================================================

    /// Commit the pending edits as one undo step.
    pub fn push_group_command(&mut self) {
        self.history.commit();
    }

    /// Roll back and discard the pending edits.
    pub fn cancel_group_command(&mut self) {
        let pending = self.history.take_pending();
        trace!(commands = pending.len(), "cancel group");
        for command in pending.iter().rev() {
            self.replay(command);
        }
    }

    /// Undo the last committed group, committing any open group first.
    ///
    /// Returns `false` when there is nothing to undo.
    ///
    /// # Panics
    ///
    /// If a recorded command no longer applies, which means the tree was
    /// changed outside this document's edit methods.
    pub fn undo(&mut self) -> bool {
        self.history.commit();
        let Some(group) = self.history.pop_undo() else {
            return false;
        };
        trace!(commands = group.commands.len(), "undo");
        let redo = self.replay_group(&group);
        self.history.push_redo(redo);
        true
    }

    /// Redo the last undone group.
    ///
    /// Returns `false` when there is nothing to redo. Committing new edits
    /// clears the redo stack.
    ///
    /// # Panics
    ///
    /// As for [`Document::undo`].
    pub fn redo(&mut self) -> bool {
        self.history.commit();
        let Some(group) = self.history.pop_redo() else {
            return false;
        };
        trace!(commands = group.commands.len(), "redo");
        let undo = self.replay_group(&group);
        self.history.push_undo(undo);
        true
    }

    fn replay_group(&mut self, group: &CommandGroup) -> CommandGroup {
        let commands = group.commands.iter().rev().map(|c| self.replay(c)).collect();
        CommandGroup { commands }
    }

    fn replay(&mut self, command: &Command) -> Command {
        match self.apply(command) {
            Ok(inverse) => inverse,
            Err(e) => panic!("history command no longer parses: {e}"),
        }
    }

    // ========================================================================
    // Applying commands
    // ========================================================================

    fn apply(&mut self, command: &Command) -> Result<Command, ParseError> {
        let Some(node) = self.tree.resolve(&command.target) else {
            panic!("history target {:?} does not resolve", command.target.indices());
        };
        let highlight = command.highlight;
        let kind = match &command.kind {
            CommandKind::Tree { index, remove, text, first_inline } => {
                self.apply_tree(node, *index, *remove, text, *first_inline, highlight)?
            }
            CommandKind::Text { text, name_len } => self.apply_text(node, text, *name_len, highlight),
            CommandKind::Position { from, to } => self.apply_position(node, *from, *to, highlight),
        };
        Ok(Command { target: command.target.clone(), kind, highlight })
    }

    fn apply_tree(
        &mut self,
        parent: NodeId,
        index: usize,
        remove: usize,
        text: &[u8],
        first_inline: bool,
        highlight: bool,
    ) -> Result<CommandKind, ParseError> {
        let Some(context) = self.tree.context_of(parent) else {
            panic!("{:?} node cannot hold children", self.tree.kind(parent));
        };
        let depth = self.tree.positional_id(parent).indices().len();
        let nodes = parser::parse_fragment(&mut self.tree, context, text, depth, first_inline)?;
        Ok(self.apply_splice(parent, index, remove, &nodes, highlight))
    }

    /// Splice detached `nodes` in and return the command restoring what
    /// was removed.
    fn apply_splice(&mut self, parent: NodeId, index: usize, remove: usize, nodes: &[NodeId], highlight: bool) -> CommandKind {
        let removed_text = self.tree.children_text(parent, index, remove);
        let removed_inline = self
            .tree
            .child(parent, index)
            .filter(|_| remove > 0)
            .is_some_and(|c| self.tree.flags(c).contains(NodeFlags::NO_INDENT));

        let removed = self.tree.splice(parent, index, remove, nodes);
        for node in removed {
            self.tree.free_subtree(node);
        }

        if let Some(observer) = self.observer.as_mut() {
            if remove > 0 {
                observer.children_removed(parent, index, remove);
            }
            if !nodes.is_empty() {
                observer.children_inserted(parent, index, nodes.len(), highlight);
            }
        }

        CommandKind::Tree { index, remove: nodes.len(), text: removed_text, first_inline: removed_inline }
    }

    fn apply_text(&mut self, node: NodeId, text: &[u8], name_len: usize, highlight: bool) -> CommandKind {
        let old = self.tree.text(node).to_vec();
        let old_name_len = self.tree.name_len(node);
        self.tree.set_text(node, text, name_len);
        if let Some(observer) = self.observer.as_mut() {
            observer.node_changed(node, highlight);
        }
        CommandKind::Text { text: old, name_len: old_name_len }
    }

    fn apply_position(&mut self, parent: NodeId, from: usize, to: usize, highlight: bool) -> CommandKind {
        self.tree.move_child(parent, from, to);
        if let Some(observer) = self.observer.as_mut() {
            observer.children_removed(parent, from, 1);
            observer.children_inserted(parent, to, 1, highlight);
        }
        CommandKind::Position { from: to, to: from }
    }
}
