//! Reversible commands and the undo/redo log.
//!
//! Every mutation a [`crate::Document`] performs yields the command that
//! would reverse it. Reverse commands accumulate in a pending group until
//! the group is committed; undoing replays a group in reverse order, and the
//! reverses of *those* commands become the redo group.

use std::collections::VecDeque;

use tracing::trace;

use crate::tree::PositionalId;

/// One reversible mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandKind {
    /// Replace `remove` children of the target starting at `index` with
    /// the nodes parsed from `text`.
    Tree {
        index: usize,
        remove: usize,
        text: Vec<u8>,
        /// The first parsed node continues the previous line.
        first_inline: bool,
    },
    /// Replace the target's name and value with `text`, split at `name_len`.
    Text { text: Vec<u8>, name_len: usize },
    /// Move the target's child at `from` to index `to`.
    Position { from: usize, to: usize },
}

/// A command and the node it applies to.
///
/// The target is a path from the root rather than a node id: ids are not
/// stable once the nodes under them have been freed and reparsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub target: PositionalId,
    pub kind: CommandKind,
    pub highlight: bool,
}

/// Commands undone or redone together, in the order they were recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandGroup {
    pub commands: Vec<Command>,
}

/// Whether reverse commands are waiting to be committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryState {
    Clean,
    GroupOpen,
}

/// Bounded undo stack, redo stack and the pending group.
#[derive(Debug)]
pub struct History {
    undo: VecDeque<CommandGroup>,
    redo: Vec<CommandGroup>,
    pending: Vec<Command>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        History { undo: VecDeque::new(), redo: Vec::new(), pending: Vec::new(), capacity }
    }

    pub fn state(&self) -> HistoryState {
        if self.pending.is_empty() {
            HistoryState::Clean
        } else {
            HistoryState::GroupOpen
        }
    }

    /// Add a reverse command to the pending group.
    pub fn record(&mut self, command: Command) {
        self.pending.push(command);
    }

    /// Commit the pending group, dropping the redo tail.
    ///
    /// An empty pending group is not committed and leaves redo intact.
    pub fn commit(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let commands = std::mem::take(&mut self.pending);
        trace!(commands = commands.len(), dropped_redo = self.redo.len(), "commit group");
        self.redo.clear();
        self.push_undo(CommandGroup { commands });
    }

    /// Take the pending group without committing it.
    pub fn take_pending(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.pending)
    }

    pub fn pop_undo(&mut self) -> Option<CommandGroup> {
        self.undo.pop_back()
    }

    /// Push a group onto the undo stack, evicting the oldest past capacity.
    pub fn push_undo(&mut self, group: CommandGroup) {
        self.undo.push_back(group);
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
            trace!(capacity = self.capacity, "evicted oldest undo group");
        }
    }

    pub fn pop_redo(&mut self) -> Option<CommandGroup> {
        self.redo.pop()
    }

    pub fn push_redo(&mut self, group: CommandGroup) {
        self.redo.push(group);
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
