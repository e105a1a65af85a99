use crate::action::Action;

/// An applied action together with the action that undoes it.
#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub action: Action,
    /// Computed from the state immediately before `action` was applied.
    pub reverse: Action,
}

/// Applied actions with a cursor.
///
/// Entries below `step` are applied; entries at or above `step` can be redone.
pub struct History {
    entries: Vec<HistoryEntry>,
    step: usize,
    max_depth: Option<usize>,
}

impl History {
    pub fn new(max_depth: Option<usize>) -> Self {
        Self {
            entries: Vec::new(),
            step: 0,
            max_depth,
        }
    }

    /// Drop every entry that could still be redone. Returns how many were
    /// discarded.
    pub fn truncate_redo(&mut self) -> usize {
        let discarded = self.entries.len() - self.step;
        self.entries.truncate(self.step);
        discarded
    }

    /// Append an entry after the cursor, discarding the redo branch, and move
    /// the cursor to the end.
    pub fn push(&mut self, entry: HistoryEntry) {
        self.truncate_redo();
        self.entries.push(entry);
        // Enforce depth limit by dropping the oldest entry
        if let Some(max) = self.max_depth
            && self.entries.len() > max
        {
            let excess = self.entries.len() - max;
            self.entries.drain(..excess);
        }
        self.step = self.entries.len();
    }

    /// Move the cursor back and return the entry to undo.
    pub fn step_back(&mut self) -> Option<&HistoryEntry> {
        if self.step == 0 {
            return None;
        }
        self.step -= 1;
        self.entries.get(self.step)
    }

    /// Return the entry to redo and move the cursor past it.
    pub fn step_forward(&mut self) -> Option<&mut HistoryEntry> {
        if self.step == self.entries.len() {
            return None;
        }
        self.step += 1;
        self.entries.get_mut(self.step - 1)
    }

    pub fn can_undo(&self) -> bool {
        self.step > 0
    }

    pub fn can_redo(&self) -> bool {
        self.step < self.entries.len()
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.step = 0;
    }
}
