//! History log: append-only record of committed focus changes.
//!
//! Every committed transition appends a [`HistoryEntry`]. The log is
//! index-addressable and supports undo/redo by moving the index; replays
//! are authoritative and bypass validation, since they re-issue facts
//! that already committed once. A configurable cap gives the log
//! ring-buffer semantics: the oldest entries are dropped on overflow.

use rustc_hash::FxHashSet;
use std::collections::VecDeque;
use std::time::Instant;

/// Default maximum number of retained history entries.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Why a focus change was committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FocusReason {
    /// Sequential keyboard navigation.
    Keyboard,
    /// Pointer interaction.
    Pointer,
    /// Direct programmatic request.
    Programmatic,
    /// Moved as a consequence of validation (e.g. returned to a field).
    Validation,
    /// A scope opened and auto-activated its first element.
    ScopeOpen,
    /// A scope closed and restored its previous element.
    ScopeClose,
    /// Escape closed the topmost scope.
    Escape,
    /// Replayed backwards from the history log.
    Undo,
    /// Replayed forwards from the history log.
    Redo,
}

/// One committed focus change.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    /// The element that became active.
    pub element_id: String,
    /// The scope it belongs to.
    pub scope_id: String,
    /// Why the change happened.
    pub reason: FocusReason,
    /// When the change committed.
    pub timestamp: Instant,
    /// The element that was active before, if any.
    pub previous_element_id: Option<String>,
    /// Free-form annotation supplied by the caller.
    pub context: Option<String>,
}

/// Append-only, index-addressable log with undo/redo.
#[derive(Debug)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    /// Position of the current entry. Always within `[0, len)` while the
    /// log is non-empty.
    index: usize,
    limit: usize,
}

impl HistoryLog {
    /// Create a log retaining at most `limit` entries.
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            index: 0,
            limit: limit.max(1),
        }
    }

    /// Number of retained entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Position of the current entry.
    pub fn index(&self) -> usize {
        self.index
    }

    /// The entry the index currently points at.
    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.index)
    }

    /// Append a committed change. Any redo tail beyond the current entry
    /// is discarded; the oldest entry is dropped once the cap is hit.
    pub fn push(&mut self, entry: HistoryEntry) {
        if !self.entries.is_empty() {
            self.entries.truncate(self.index + 1);
        }
        self.entries.push_back(entry);
        if self.entries.len() > self.limit {
            self.entries.pop_front();
        }
        self.index = self.entries.len() - 1;
    }

    /// Step the index backwards, returning the entry to replay.
    pub fn undo(&mut self) -> Option<&HistoryEntry> {
        if self.index == 0 || self.entries.is_empty() {
            return None;
        }
        self.index -= 1;
        self.entries.get(self.index)
    }

    /// Step the index forwards, returning the entry to replay.
    pub fn redo(&mut self) -> Option<&HistoryEntry> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.entries.get(self.index)
    }

    /// Undo the most recent index move; used when a replay target turned
    /// out to be unregistered.
    pub(crate) fn revert_undo(&mut self) {
        if self.index + 1 < self.entries.len() {
            self.index += 1;
        }
    }

    /// See [`HistoryLog::revert_undo`], for redo.
    pub(crate) fn revert_redo(&mut self) {
        self.index = self.index.saturating_sub(1);
    }

    /// Reset the log and index. The active element is not touched.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index = 0;
    }

    /// Iterate over retained entries, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Distinct element ids that ever committed within the retained
    /// window. Step projection's "previously visited" input.
    pub fn visited_ids(&self) -> FxHashSet<String> {
        self.entries
            .iter()
            .map(|entry| entry.element_id.clone())
            .collect()
    }
}

impl Default for HistoryLog {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}
