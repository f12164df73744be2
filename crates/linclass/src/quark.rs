//! Bidirectional string <-> id table.
//!
//! Ids are handed out in first-seen order and always form the contiguous range
//! `0..len()`. A frozen table answers lookups but never grows, which is how
//! evaluation data is read against the vocabulary of a trained model.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{ClassifierError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Quark {
    ids: HashMap<String, usize>,
    items: Vec<String>,
    frozen: bool,
}

impl Quark {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the id of `name`, assigning the next id when it is new.
    ///
    /// A frozen table never assigns ids and returns `None` for unseen names.
    pub fn intern(&mut self, name: &str) -> Option<usize> {
        if let Some(&id) = self.ids.get(name) {
            return Some(id);
        }
        if self.frozen {
            return None;
        }
        let id = self.items.len();
        self.ids.insert(name.to_string(), id);
        self.items.push(name.to_string());
        Some(id)
    }

    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.ids.get(name).copied()
    }

    pub fn resolve(&self, id: usize) -> Result<&str> {
        self.items
            .get(id)
            .map(|s| s.as_str())
            .ok_or(ClassifierError::OutOfRange {
                id,
                size: self.items.len(),
            })
    }

    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.items.iter().enumerate().map(|(i, s)| (i, s.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_contiguous_and_stable() {
        let mut q = Quark::new();
        let words = ["b", "a", "b", "c", "a", "d"];
        let ids: Vec<usize> = words.iter().map(|w| q.intern(w).unwrap()).collect();
        assert_eq!(ids, vec![0, 1, 0, 2, 1, 3]);
        assert_eq!(q.len(), 4);
        for w in words {
            let id = q.lookup(w).unwrap();
            assert_eq!(q.resolve(id).unwrap(), w);
        }
    }

    #[test]
    fn frozen_table_does_not_grow() {
        let mut q = Quark::new();
        q.intern("x");
        q.freeze();
        assert_eq!(q.intern("x"), Some(0));
        assert_eq!(q.intern("y"), None);
        assert_eq!(q.len(), 1);
    }

    #[test]
    fn resolve_out_of_range() {
        let q = Quark::new();
        match q.resolve(0) {
            Err(ClassifierError::OutOfRange { id: 0, size: 0 }) => {}
            other => panic!("unexpected: {:?}", other),
        }
    }
}
