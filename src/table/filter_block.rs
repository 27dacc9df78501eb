//! C8: the filter block. One Bloom filter is built over every key added to
//! the table — not per data block — matching how the meta-index only ever
//! records a single filter location per table.

use std::sync::Arc;

use crate::util::FilterPolicy;

/// Accumulates keys as they're added to the table and builds a single
/// filter over all of them on `finish()`.
pub struct FilterBlockBuilder {
    policy: Option<Arc<dyn FilterPolicy>>,
    keys: Vec<Vec<u8>>,
}

impl FilterBlockBuilder {
    pub fn new(policy: Option<Arc<dyn FilterPolicy>>) -> Self {
        Self {
            policy,
            keys: Vec::new(),
        }
    }

    pub fn available(&self) -> bool {
        self.policy.is_some()
    }

    pub fn add(&mut self, key: &[u8]) {
        if self.available() {
            self.keys.push(key.to_vec());
        }
    }

    /// Builds the filter's persisted form, or `None` if no policy is
    /// configured (the table simply won't have a filter block).
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let policy = self.policy.as_ref()?;
        let key_slices: Vec<&[u8]> = self.keys.iter().map(|k| k.as_slice()).collect();
        let mut dst = Vec::new();
        policy.create_filter(&key_slices, &mut dst);
        Some(dst)
    }
}

/// Wraps a filter blob loaded from disk and the policy used to query it.
pub struct FilterBlockReader {
    policy: Arc<dyn FilterPolicy>,
    data: Vec<u8>,
}

impl FilterBlockReader {
    pub fn new(policy: Arc<dyn FilterPolicy>, data: Vec<u8>) -> Self {
        Self { policy, data }
    }

    pub fn key_may_match(&self, key: &[u8]) -> bool {
        self.policy.key_may_match(key, &self.data)
    }
}
