//! C3: internal keys, the user/sequence/type encoding every other layer
//! builds on.

use std::cmp::Ordering;

use crate::util::{
    decode_fixed64, encode_fixed64, encode_varint32, extend_fixed64, Comparator, FilterPolicy,
};

pub type SequenceNumber = u64;

pub const MAX_SEQUENCE_NUMBER: u64 = (1 << 56) - 1;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ValueType {
    Deletion = 0x0,
    Value = 0x1,
}

impl From<u8> for ValueType {
    fn from(value: u8) -> Self {
        if value == 0x0 {
            Self::Deletion
        } else if value == 0x1 {
            Self::Value
        } else {
            panic!("invalid value type tag: {value}")
        }
    }
}

pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

pub struct ParsedInternalKey<'a> {
    pub user_key: &'a [u8],
    pub sequence: SequenceNumber,
    pub type_: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(user_key: &'a [u8], sequence: SequenceNumber, type_: ValueType) -> Self {
        Self {
            user_key,
            sequence,
            type_,
        }
    }
}

/// Appends the encoding of `key` to `dst`: `user_key ∥ fixed64(seq << 8 | type)`.
pub fn append_internal_key(dst: &mut Vec<u8>, key: &ParsedInternalKey) {
    dst.extend_from_slice(key.user_key);
    extend_fixed64(dst, key.sequence << 8 | key.type_ as u64);
}

/// Attempts to parse an internal key out of `internal_key`.
pub fn parse_internal_key(internal_key: &[u8]) -> Option<ParsedInternalKey> {
    let n = internal_key.len();
    if n < 8 {
        return None;
    }
    let num = decode_fixed64(&internal_key[n - 8..]);
    Some(ParsedInternalKey::new(
        &internal_key[..n - 8],
        num >> 8,
        (num as u8).into(),
    ))
}

pub fn extract_user_key(internal_key: &[u8]) -> &[u8] {
    assert!(internal_key.len() >= 8);
    &internal_key[..internal_key.len() - 8]
}

/// Orders internal keys by increasing user key, then decreasing sequence
/// number, then decreasing type — the ordering every index structure in the
/// engine (skip list, SST blocks) relies on.
pub struct InternalKeyComparator {
    user_comparator: Box<dyn Comparator>,
}

impl InternalKeyComparator {
    pub fn new(user_comparator: Box<dyn Comparator>) -> Self {
        Self { user_comparator }
    }

    pub fn user_comparator(&self) -> &dyn Comparator {
        self.user_comparator.as_ref()
    }
}

impl Comparator for InternalKeyComparator {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let r = self
            .user_comparator
            .compare(extract_user_key(a), extract_user_key(b));
        if r == Ordering::Equal {
            let anum = decode_fixed64(&a[a.len() - 8..]);
            let bnum = decode_fixed64(&b[b.len() - 8..]);
            anum.cmp(&bnum).reverse()
        } else {
            r
        }
    }

    fn name(&self) -> &str {
        "stratadb.InternalKeyComparator"
    }

    fn find_shortest_separator(&self, start: &[u8], limit: &[u8]) -> Vec<u8> {
        let user_start = extract_user_key(start);
        let user_limit = extract_user_key(limit);
        let mut result = self
            .user_comparator
            .find_shortest_separator(user_start, user_limit);
        if result.len() < user_start.len()
            && self.user_comparator.compare(user_start, &result) == Ordering::Less
        {
            // User key got physically shorter but logically larger; tack on
            // the earliest possible sequence/type so it still sorts before
            // every internal key sharing the original, longer user key.
            extend_fixed64(
                &mut result,
                MAX_SEQUENCE_NUMBER << 8 | VALUE_TYPE_FOR_SEEK as u64,
            );
            debug_assert_eq!(self.compare(start, &result), Ordering::Less);
            debug_assert_eq!(self.compare(&result, limit), Ordering::Less);
            result
        } else {
            start.to_vec()
        }
    }

    fn find_short_successor(&self, key: &[u8]) -> Vec<u8> {
        let user_key = extract_user_key(key);
        let mut result = self.user_comparator.find_short_successor(user_key);
        if result.len() < user_key.len()
            && self.user_comparator.compare(user_key, &result) == Ordering::Less
        {
            extend_fixed64(
                &mut result,
                MAX_SEQUENCE_NUMBER << 8 | VALUE_TYPE_FOR_SEEK as u64,
            );
            debug_assert_eq!(self.compare(key, &result), Ordering::Less);
            result
        } else {
            key.to_vec()
        }
    }
}

/// Wraps a user `FilterPolicy` so the filter block is built and queried
/// against user keys, even though it's handed internal keys.
pub struct InternalFilterPolicy {
    user_policy: Box<dyn FilterPolicy>,
}

impl InternalFilterPolicy {
    pub fn new(user_policy: Box<dyn FilterPolicy>) -> Self {
        Self { user_policy }
    }
}

impl FilterPolicy for InternalFilterPolicy {
    fn name(&self) -> &str {
        self.user_policy.name()
    }

    fn create_filter(&self, keys: &[&[u8]], dst: &mut Vec<u8>) {
        let user_keys: Vec<&[u8]> = keys.iter().map(|k| extract_user_key(k)).collect();
        self.user_policy.create_filter(&user_keys, dst)
    }

    fn key_may_match(&self, key: &[u8], filter: &[u8]) -> bool {
        self.user_policy
            .key_may_match(extract_user_key(key), filter)
    }
}

/// An owned, encoded internal key.
pub struct InternalKey {
    rep: Vec<u8>,
}

impl InternalKey {
    pub fn new_empty() -> Self {
        Self { rep: vec![] }
    }

    pub fn new(user_key: &[u8], seq: SequenceNumber, type_: ValueType) -> Self {
        let mut rep = vec![];
        append_internal_key(&mut rep, &ParsedInternalKey::new(user_key, seq, type_));
        Self { rep }
    }

    pub fn decode_from(&mut self, s: &[u8]) -> bool {
        self.rep = s.to_vec();
        !self.rep.is_empty()
    }

    pub fn encode(&self) -> &[u8] {
        assert!(!self.rep.is_empty());
        &self.rep
    }

    pub fn user_key(&self) -> &[u8] {
        extract_user_key(&self.rep)
    }
}

const LOOKUP_KEY_STACK_SPACE: usize = 200;

/// A lookup key holds both the memtable-format key (length-prefixed
/// internal key, for seeking the skip list) and the internal key itself,
/// sharing one buffer — small keys stay on the stack, large ones spill to
/// the heap.
pub struct LookupKey {
    // `buf[kstart_offset..]` is the internal key; `buf[..]` up to `end_len`
    // is the full memtable key (length prefix included).
    buf: LookupKeyBuf,
    kstart_offset: usize,
    end_len: usize,
}

enum LookupKeyBuf {
    OnStack([u8; LOOKUP_KEY_STACK_SPACE]),
    OnHeap(Vec<u8>),
}

impl LookupKeyBuf {
    fn as_slice(&self) -> &[u8] {
        match self {
            LookupKeyBuf::OnStack(buf) => buf.as_slice(),
            LookupKeyBuf::OnHeap(buf) => buf.as_slice(),
        }
    }

    fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            LookupKeyBuf::OnStack(buf) => buf.as_mut_slice(),
            LookupKeyBuf::OnHeap(buf) => buf.as_mut_slice(),
        }
    }
}

impl LookupKey {
    pub fn new(user_key: &[u8], sequence: SequenceNumber) -> Self {
        let ksize = user_key.len();
        let needed = ksize + 13; // varint32 + user_key + tag(8)
        let mut buf = if needed <= LOOKUP_KEY_STACK_SPACE {
            LookupKeyBuf::OnStack([0; LOOKUP_KEY_STACK_SPACE])
        } else {
            LookupKeyBuf::OnHeap(vec![0; needed])
        };

        let target = buf.as_mut_slice();
        let koffset = encode_varint32(target, (ksize + 8) as u32);
        target[koffset..koffset + ksize].copy_from_slice(user_key);
        encode_fixed64(
            &mut target[koffset + ksize..],
            sequence << 8 | VALUE_TYPE_FOR_SEEK as u64,
        );

        Self {
            buf,
            kstart_offset: koffset,
            end_len: koffset + ksize + 8,
        }
    }

    /// The full memtable-format key: `varint32(len) ∥ internal_key`.
    pub fn memtable_key(&self) -> &[u8] {
        &self.buf.as_slice()[..self.end_len]
    }

    /// `user_key ∥ tag`, without the varint32 length prefix.
    pub fn internal_key(&self) -> &[u8] {
        &self.buf.as_slice()[self.kstart_offset..self.end_len]
    }

    pub fn user_key(&self) -> &[u8] {
        &self.buf.as_slice()[self.kstart_offset..self.end_len - 8]
    }
}
