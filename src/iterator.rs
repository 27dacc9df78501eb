use std::cmp::Ordering;

use crate::error::{Result, StrataError};
use crate::util::Comparator;

pub trait Iterator {
    fn valid(&self) -> bool;
    fn seek_to_first(&mut self);
    fn seek_to_last(&mut self);
    fn seek(&mut self, target: &[u8]);
    fn next(&mut self);
    fn prev(&mut self);
    fn key(&self) -> &[u8];
    fn value(&self) -> &[u8];
    fn status(&self) -> Result<()>;
}

/// An iterator that is always invalid and never errors. Used as the
/// starting point of a merge, or wherever a component is empty.
pub struct EmptyIterator;

impl Iterator for EmptyIterator {
    fn valid(&self) -> bool {
        false
    }
    fn seek_to_first(&mut self) {}
    fn seek_to_last(&mut self) {}
    fn seek(&mut self, _target: &[u8]) {}
    fn next(&mut self) {}
    fn prev(&mut self) {}
    fn key(&self) -> &[u8] {
        panic!("key() called on an invalid iterator")
    }
    fn value(&self) -> &[u8] {
        panic!("value() called on an invalid iterator")
    }
    fn status(&self) -> Result<()> {
        Ok(())
    }
}

/// An iterator that is always invalid and reports a fixed error. Used to
/// surface a failure (e.g. a corrupt block) through an iterator-shaped API
/// instead of panicking partway through a scan.
pub struct ErrorIterator {
    message: String,
}

impl ErrorIterator {
    pub fn new(error: StrataError) -> Self {
        Self {
            message: error.to_string(),
        }
    }
}

impl Iterator for ErrorIterator {
    fn valid(&self) -> bool {
        false
    }
    fn seek_to_first(&mut self) {}
    fn seek_to_last(&mut self) {}
    fn seek(&mut self, _target: &[u8]) {}
    fn next(&mut self) {}
    fn prev(&mut self) {}
    fn key(&self) -> &[u8] {
        panic!("key() called on an invalid iterator")
    }
    fn value(&self) -> &[u8] {
        panic!("value() called on an invalid iterator")
    }
    fn status(&self) -> Result<()> {
        Err(StrataError::bad_block(self.message.clone()))
    }
}

/// Merges several child iterators (e.g. the active memtable, immutable
/// memtables, and SST readers for one level) into a single ordered stream,
/// always advancing whichever child currently holds the smallest (or, in
/// reverse, largest) key under `comparator`.
///
/// Ties are broken in favor of earlier children, so callers should list
/// children from newest to oldest when duplicate internal keys (same user
/// key, different sequence numbers) must resolve to the newest version.
pub struct MergingIterator<C> {
    comparator: C,
    children: Vec<Box<dyn Iterator>>,
    current: Option<usize>,
    direction: Direction,
}

#[derive(PartialEq, Eq)]
enum Direction {
    Forward,
    Reverse,
}

impl<C: Comparator> MergingIterator<C> {
    pub fn new(comparator: C, children: Vec<Box<dyn Iterator>>) -> Self {
        Self {
            comparator,
            children,
            current: None,
            direction: Direction::Forward,
        }
    }

    fn find_smallest(&self) -> Option<usize> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, child)| child.valid())
            .min_by(|(_, a), (_, b)| self.comparator.compare(a.key(), b.key()))
            .map(|(index, _)| index)
    }

    fn find_largest(&self) -> Option<usize> {
        self.children
            .iter()
            .enumerate()
            .filter(|(_, child)| child.valid())
            .max_by(|(_, a), (_, b)| self.comparator.compare(a.key(), b.key()))
            .map(|(index, _)| index)
    }
}

impl<C: Comparator> Iterator for MergingIterator<C> {
    fn valid(&self) -> bool {
        self.current.is_some()
    }

    fn seek_to_first(&mut self) {
        for child in self.children.iter_mut() {
            child.seek_to_first();
        }
        self.direction = Direction::Forward;
        self.current = self.find_smallest();
    }

    fn seek_to_last(&mut self) {
        for child in self.children.iter_mut() {
            child.seek_to_last();
        }
        self.direction = Direction::Reverse;
        self.current = self.find_largest();
    }

    fn seek(&mut self, target: &[u8]) {
        for child in self.children.iter_mut() {
            child.seek(target);
        }
        self.direction = Direction::Forward;
        self.current = self.find_smallest();
    }

    fn next(&mut self) {
        let current = self.current.expect("next() called on an invalid iterator");

        // Switching directions requires bringing every other child up to
        // (or past) the current key before resuming a forward scan.
        if self.direction != Direction::Forward {
            let key = self.children[current].key().to_vec();
            for (index, child) in self.children.iter_mut().enumerate() {
                if index == current {
                    continue;
                }
                child.seek(&key);
                if child.valid() && self.comparator.compare(child.key(), &key) == Ordering::Equal
                {
                    child.next();
                }
            }
            self.direction = Direction::Forward;
        }

        self.children[current].next();
        self.current = self.find_smallest();
    }

    fn prev(&mut self) {
        let current = self.current.expect("prev() called on an invalid iterator");

        if self.direction != Direction::Reverse {
            let key = self.children[current].key().to_vec();
            for (index, child) in self.children.iter_mut().enumerate() {
                if index == current {
                    continue;
                }
                child.seek(&key);
                if child.valid() {
                    child.prev();
                } else {
                    child.seek_to_last();
                }
            }
            self.direction = Direction::Reverse;
        }

        self.children[current].prev();
        self.current = self.find_largest();
    }

    fn key(&self) -> &[u8] {
        self.children[self.current.expect("key() called on an invalid iterator")].key()
    }

    fn value(&self) -> &[u8] {
        self.children[self.current.expect("value() called on an invalid iterator")].value()
    }

    fn status(&self) -> Result<()> {
        for child in &self.children {
            child.status()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::util::BytewiseComparator;

    struct VecIterator {
        entries: Vec<(Vec<u8>, Vec<u8>)>,
        cursor: Option<usize>,
    }

    impl VecIterator {
        fn new(mut entries: Vec<(Vec<u8>, Vec<u8>)>) -> Self {
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Self {
                entries,
                cursor: None,
            }
        }
    }

    impl Iterator for VecIterator {
        fn valid(&self) -> bool {
            matches!(self.cursor, Some(i) if i < self.entries.len())
        }
        fn seek_to_first(&mut self) {
            self.cursor = Some(0);
        }
        fn seek_to_last(&mut self) {
            self.cursor = if self.entries.is_empty() {
                Some(self.entries.len())
            } else {
                Some(self.entries.len() - 1)
            };
        }
        fn seek(&mut self, target: &[u8]) {
            self.cursor = Some(
                self.entries
                    .iter()
                    .position(|(k, _)| k.as_slice() >= target)
                    .unwrap_or(self.entries.len()),
            );
        }
        fn next(&mut self) {
            if let Some(i) = self.cursor {
                self.cursor = Some(i + 1);
            }
        }
        fn prev(&mut self) {
            match self.cursor {
                Some(0) | None => self.cursor = Some(self.entries.len()),
                Some(i) => self.cursor = Some(i - 1),
            }
        }
        fn key(&self) -> &[u8] {
            &self.entries[self.cursor.unwrap()].0
        }
        fn value(&self) -> &[u8] {
            &self.entries[self.cursor.unwrap()].1
        }
        fn status(&self) -> Result<()> {
            Ok(())
        }
    }

    fn vi(entries: &[(&str, &str)]) -> Box<dyn Iterator> {
        Box::new(VecIterator::new(
            entries
                .iter()
                .map(|(k, v)| (k.as_bytes().to_vec(), v.as_bytes().to_vec()))
                .collect(),
        ))
    }

    #[test]
    fn empty_iterator_is_always_invalid() {
        let mut it = EmptyIterator;
        assert!(!it.valid());
        it.seek_to_first();
        assert!(!it.valid());
        assert!(it.status().is_ok());
    }

    #[test]
    fn error_iterator_surfaces_its_error() {
        let it = ErrorIterator::new(StrataError::corruption(0, "bad block"));
        assert!(!it.valid());
        assert!(it.status().is_err());
    }

    #[test]
    fn merging_iterator_interleaves_children_in_order() {
        let children = vec![
            vi(&[("a", "1"), ("c", "3"), ("e", "5")]),
            vi(&[("b", "2"), ("d", "4")]),
        ];
        let mut merged = MergingIterator::new(BytewiseComparator::new(), children);
        merged.seek_to_first();

        let mut collected = Vec::new();
        while merged.valid() {
            collected.push((merged.key().to_vec(), merged.value().to_vec()));
            merged.next();
        }
        let keys: Vec<_> = collected.iter().map(|(k, _)| k.clone()).collect();
        assert_eq!(
            keys,
            vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec(), b"d".to_vec(), b"e".to_vec()]
        );
    }

    #[test]
    fn merging_iterator_seek_lands_on_first_key_at_or_after_target() {
        let children = vec![vi(&[("a", "1"), ("c", "3")]), vi(&[("b", "2")])];
        let mut merged = MergingIterator::new(BytewiseComparator::new(), children);
        merged.seek(b"b");
        assert!(merged.valid());
        assert_eq!(merged.key(), b"b");
    }

    #[test]
    fn merging_iterator_reverse_scan_visits_keys_descending() {
        let children = vec![vi(&[("a", "1"), ("c", "3")]), vi(&[("b", "2")])];
        let mut merged = MergingIterator::new(BytewiseComparator::new(), children);
        merged.seek_to_last();

        let mut collected = Vec::new();
        while merged.valid() {
            collected.push(merged.key().to_vec());
            merged.prev();
        }
        assert_eq!(collected, vec![b"c".to_vec(), b"b".to_vec(), b"a".to_vec()]);
    }

    #[test]
    fn merging_iterator_with_no_children_is_invalid() {
        let mut merged = MergingIterator::new(BytewiseComparator::new(), Vec::new());
        merged.seek_to_first();
        assert!(!merged.valid());
    }
}
