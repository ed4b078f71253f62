use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

pub const DEFAULT_HISTORY_CAPACITY: usize = 10;
pub const DEFAULT_COMMIT_CAPACITY: usize = 20;

/// A user-labeled snapshot kept apart from the undo buffer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit<T> {
    pub label: String,
    pub snapshot: T,
}

/// Linear undo/redo over whole-state snapshots, plus named commits.
///
/// The undo buffer holds at most `capacity` states; the oldest is dropped
/// first. Recording a new state discards everything that could be redone.
#[derive(Debug, Clone)]
pub struct History<T> {
    undo: VecDeque<T>,
    redo: Vec<T>,
    commits: VecDeque<Commit<T>>,
    capacity: usize,
    commit_capacity: usize,
}

impl<T> Default for History<T> {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY, DEFAULT_COMMIT_CAPACITY)
    }
}

impl<T> History<T> {
    pub fn new(capacity: usize, commit_capacity: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            commits: VecDeque::new(),
            capacity: capacity.max(1),
            commit_capacity: commit_capacity.max(1),
        }
    }

    /// Rebuild from persisted parts, trimming to the capacities.
    pub fn from_parts(
        capacity: usize,
        commit_capacity: usize,
        undo: Vec<T>,
        redo: Vec<T>,
        commits: Vec<Commit<T>>,
    ) -> Self {
        let mut history = Self::new(capacity, commit_capacity);
        for state in undo {
            history.push_undo(state);
        }
        history.redo = redo;
        for commit in commits {
            history.push_commit(commit);
        }
        history
    }

    /// Remember the state just before a mutation.
    pub fn record(&mut self, before: T) {
        self.push_undo(before);
        self.redo.clear();
    }

    /// Step back. `current` becomes redoable; returns the state to apply.
    pub fn undo(&mut self, current: T) -> Option<T> {
        let previous = self.undo.pop_back()?;
        self.redo.push(current);
        Some(previous)
    }

    /// Step forward again after an undo.
    pub fn redo(&mut self, current: T) -> Option<T> {
        let next = self.redo.pop()?;
        self.push_undo(current);
        Some(next)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    pub fn undo_entries(&self) -> impl Iterator<Item = &T> {
        self.undo.iter()
    }

    pub fn redo_entries(&self) -> impl Iterator<Item = &T> {
        self.redo.iter()
    }

    pub fn commit(&mut self, label: impl Into<String>, snapshot: T) {
        self.push_commit(Commit {
            label: label.into(),
            snapshot,
        });
    }

    pub fn commits(&self) -> impl Iterator<Item = &Commit<T>> {
        self.commits.iter()
    }

    /// Most recent commit with `label`.
    pub fn find_commit(&self, label: &str) -> Option<&T> {
        self.commits
            .iter()
            .rev()
            .find(|c| c.label == label)
            .map(|c| &c.snapshot)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }

    /// Convert every stored state, keeping the buffer layout.
    pub fn try_map<U, E>(&self, mut f: impl FnMut(&T) -> Result<U, E>) -> Result<History<U>, E> {
        Ok(History {
            undo: self.undo.iter().map(&mut f).collect::<Result<_, E>>()?,
            redo: self.redo.iter().map(&mut f).collect::<Result<_, E>>()?,
            commits: self
                .commits
                .iter()
                .map(|c| {
                    Ok(Commit {
                        label: c.label.clone(),
                        snapshot: f(&c.snapshot)?,
                    })
                })
                .collect::<Result<_, E>>()?,
            capacity: self.capacity,
            commit_capacity: self.commit_capacity,
        })
    }

    fn push_undo(&mut self, state: T) {
        self.undo.push_back(state);
        while self.undo.len() > self.capacity {
            self.undo.pop_front();
        }
    }

    fn push_commit(&mut self, commit: Commit<T>) {
        self.commits.push_back(commit);
        while self.commits.len() > self.commit_capacity {
            self.commits.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo_is_linear() {
        let mut h = History::new(10, 20);
        // 1 -> 2 -> 3
        h.record(1);
        h.record(2);
        assert_eq!(h.undo(3), Some(2));
        assert_eq!(h.undo(2), Some(1));
        assert_eq!(h.undo(1), None);
        assert_eq!(h.redo(1), Some(2));
        assert_eq!(h.redo(2), Some(3));
        assert_eq!(h.redo(3), None);
    }

    #[test]
    fn test_new_mutation_truncates_redo() {
        let mut h = History::new(10, 20);
        h.record(1);
        h.record(2);
        assert_eq!(h.undo(3), Some(2));
        assert!(h.can_redo());

        h.record(2);
        assert!(!h.can_redo());
        assert_eq!(h.undo(4), Some(2));
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut h = History::new(3, 20);
        for state in 0..5 {
            h.record(state);
        }
        assert_eq!(h.undo_entries().copied().collect::<Vec<_>>(), vec![2, 3, 4]);
    }

    #[test]
    fn test_commits_are_capped_and_searchable() {
        let mut h = History::new(10, 2);
        h.commit("a", 1);
        h.commit("b", 2);
        h.commit("c", 3);
        assert_eq!(h.commits().map(|c| c.label.as_str()).collect::<Vec<_>>(), vec!["b", "c"]);
        assert_eq!(h.find_commit("a"), None);
        assert_eq!(h.find_commit("c"), Some(&3));
    }
}
