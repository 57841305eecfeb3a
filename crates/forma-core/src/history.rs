//! Undo/redo over immutable snapshots

use std::collections::VecDeque;

use forma_cad::HistoryConfig;

/// Bounded undo/redo stack of values
///
/// Edits produce new values, so a snapshot is the retained value itself.
#[derive(Debug, Clone)]
pub struct History<T: Clone> {
    undo_stack: VecDeque<T>,
    present: T,
    redo_stack: Vec<T>,
    max_depth: usize,
}

impl<T: Clone> History<T> {
    pub fn new(initial: T, config: &HistoryConfig) -> Self {
        Self::with_depth(initial, config.max_depth)
    }

    pub fn with_depth(initial: T, max_depth: usize) -> Self {
        Self {
            undo_stack: VecDeque::new(),
            present: initial,
            redo_stack: Vec::new(),
            max_depth,
        }
    }

    pub fn present(&self) -> &T {
        &self.present
    }

    /// Make `next` the present value; clears redo
    pub fn push(&mut self, next: T) {
        let prev = std::mem::replace(&mut self.present, next);
        self.undo_stack.push_back(prev);
        while self.undo_stack.len() > self.max_depth {
            self.undo_stack.pop_front();
        }
        self.redo_stack.clear();
    }

    /// Undo last change
    pub fn undo(&mut self) -> bool {
        match self.undo_stack.pop_back() {
            Some(prev) => {
                let current = std::mem::replace(&mut self.present, prev);
                self.redo_stack.push(current);
                true
            }
            None => false,
        }
    }

    /// Redo last undone change
    pub fn redo(&mut self) -> bool {
        match self.redo_stack.pop() {
            Some(next) => {
                let current = std::mem::replace(&mut self.present, next);
                self.undo_stack.push_back(current);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_undo_redo() {
        let mut history = History::with_depth(0, 10);
        history.push(1);
        history.push(2);
        assert!(history.undo());
        assert_eq!(*history.present(), 1);
        assert!(history.redo());
        assert_eq!(*history.present(), 2);
        assert!(!history.redo());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut history = History::with_depth("a", 10);
        history.push("b");
        history.undo();
        assert!(history.can_redo());
        history.push("c");
        assert!(!history.can_redo());
        history.undo();
        assert_eq!(*history.present(), "a");
        assert!(!history.can_undo());
    }

    #[test]
    fn test_depth_is_bounded() {
        let mut history = History::new(0, &HistoryConfig { max_depth: 3 });
        for i in 1..=5 {
            history.push(i);
        }
        assert_eq!(history.undo_depth(), 3);
        while history.undo() {}
        assert_eq!(*history.present(), 2);
    }
}
