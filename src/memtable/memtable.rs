use std::cell::RefCell;
use std::cmp::Ordering;
use std::ptr::null;
use std::rc::Rc;
use std::slice;

use super::skiplist::{KeyComparator, SkipList, SkipListIterator};
use crate::dbformat::{InternalKeyComparator, LookupKey, SequenceNumber, ValueType};
use crate::error::{Result, StrataError};
use crate::iterator::Iterator;
use crate::util::{decode_fixed64, decode_varint32, encode_fixed64, encode_varint32, varint_size};

/// Decode a varint32-length-prefixed slice starting at `ptr`. The caller
/// guarantees the memory behind `ptr` outlives the returned slice (it is
/// arena-allocated and never freed while the memtable is alive).
fn decode_length_prefixed_slice_ptr<'a>(ptr: *const u8) -> (&'a [u8], usize) {
    let header = unsafe { slice::from_raw_parts(ptr, 5.min(isize::MAX as usize)) };
    let (len, offset) = decode_varint32(header).unwrap();
    (
        unsafe { slice::from_raw_parts(ptr.add(offset), len as usize) },
        offset + len as usize,
    )
}

fn encode_key(scratch: &mut Vec<u8>, target: &[u8]) -> *const u8 {
    scratch.clear();
    let mut buf = [0u8; 5];
    let len = encode_varint32(&mut buf, target.len() as u32);
    scratch.extend_from_slice(&buf[..len]);
    scratch.extend_from_slice(target);
    scratch.as_ptr()
}

pub struct MemTableKeyComparator {
    comparator: InternalKeyComparator,
}

impl MemTableKeyComparator {
    pub fn new(comparator: InternalKeyComparator) -> Self {
        Self { comparator }
    }
}

/// Compares the internal keys the two pointers refer to, not the pointers
/// themselves.
impl KeyComparator<*const u8> for MemTableKeyComparator {
    fn compare(&self, a: &*const u8, b: &*const u8) -> Ordering {
        let (a, _) = decode_length_prefixed_slice_ptr(*a);
        let (b, _) = decode_length_prefixed_slice_ptr(*b);
        crate::util::Comparator::compare(&self.comparator, a, b)
    }
}

pub struct MemTableIterator<'a> {
    iter: SkipListIterator<'a, *const u8, MemTableKeyComparator>,
    tmp: Vec<u8>,
}

impl<'a> MemTableIterator<'a> {
    pub fn new(table: &'a SkipList<*const u8, MemTableKeyComparator>) -> Self {
        Self {
            iter: SkipListIterator::new(table),
            tmp: vec![],
        }
    }
}

impl<'a> Iterator for MemTableIterator<'a> {
    fn valid(&self) -> bool {
        self.iter.valid()
    }

    fn seek_to_first(&mut self) {
        self.iter.seek_to_first()
    }

    fn seek_to_last(&mut self) {
        self.iter.seek_to_last()
    }

    fn seek(&mut self, target: &[u8]) {
        self.iter.seek(&encode_key(&mut self.tmp, target))
    }

    fn next(&mut self) {
        self.iter.next()
    }

    fn prev(&mut self) {
        self.iter.prev()
    }

    fn key(&self) -> &[u8] {
        decode_length_prefixed_slice_ptr(*self.iter.key()).0
    }

    fn value(&self) -> &[u8] {
        let (_, offset) = decode_length_prefixed_slice_ptr(*self.iter.key());
        decode_length_prefixed_slice_ptr(unsafe { self.iter.key().add(offset) }).0
    }

    fn status(&self) -> Result<()> {
        Ok(())
    }
}

/// In-memory write buffer backed by a concurrent skip list (C4/C5).
///
/// Entries are encoded as `varint32(internal_key_len) ∥ internal_key ∥
/// varint32(value_len) ∥ value` and bump-allocated from the skip list's
/// arena; nothing is ever freed until the whole memtable is dropped.
pub struct MemTable {
    table: SkipList<*const u8, MemTableKeyComparator>,
}

impl MemTable {
    pub fn new(comparator: InternalKeyComparator) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            table: SkipList::new(MemTableKeyComparator { comparator }, null()),
        }))
    }

    pub fn approximate_memory_usage(&self) -> usize {
        self.table.arena.memory_usage()
    }

    pub fn new_iterator(&self) -> Box<dyn Iterator + '_> {
        Box::new(MemTableIterator::new(&self.table))
    }

    /// Format of an entry is the concatenation of:
    ///  key_size     : varint32 of internal_key.len()
    ///  key bytes    : internal_key.len() bytes
    ///  value_size   : varint32 of value.len()
    ///  value bytes  : value.len() bytes
    pub fn add(&mut self, seq: SequenceNumber, type_: ValueType, key: &[u8], value: &[u8]) {
        let key_size = key.len();
        let val_size = value.len();
        let internal_key_size = key_size + 8;
        let encoded_len = varint_size(internal_key_size as u64)
            + internal_key_size
            + varint_size(val_size as u64)
            + val_size;
        let ptr = self.table.arena.allocate(encoded_len);
        let memkey = unsafe { slice::from_raw_parts_mut(ptr, encoded_len) };

        let varint_len = encode_varint32(memkey, internal_key_size as u32);
        memkey[varint_len..varint_len + key_size].copy_from_slice(key);
        let offset_to_tag = varint_len + key_size;
        encode_fixed64(&mut memkey[offset_to_tag..], (seq << 8) | type_ as u64);
        let offset_to_value = offset_to_tag + 8;
        let varint_len = encode_varint32(&mut memkey[offset_to_value..], val_size as u32);
        memkey[offset_to_value + varint_len..offset_to_value + varint_len + val_size]
            .copy_from_slice(value);
        assert_eq!(offset_to_value + varint_len + val_size, encoded_len);

        self.table.insert(memkey.as_ptr());
    }

    /// Looks up `key`. Returns `None` if no entry with this user key exists
    /// at or before the lookup sequence number; `Some(Err(StrataError::Deleted))`
    /// if the most recent entry is a tombstone; otherwise `Some(Ok(value))`.
    pub fn get(&self, key: &LookupKey) -> Option<Result<Vec<u8>>> {
        let memkey = key.memtable_key();
        let mut iter = SkipListIterator::new(&self.table);
        iter.seek(&memkey.as_ptr());
        if iter.valid() {
            // entry format is:
            //    klength  varint32
            //    userkey  char[klength]
            //    tag      uint64
            //    vlength  varint32
            //    value    char[vlength]
            // Check that it belongs to the same user key. We don't check the
            // sequence number since the seek above already skipped entries
            // with an overly large sequence number.
            let entry = *iter.key();
            let (ukey_len, ukey_offset) =
                decode_varint32(unsafe { slice::from_raw_parts(entry, 5) }).unwrap();
            if self.table.comparator.comparator.user_comparator().compare(
                unsafe { slice::from_raw_parts(entry.add(ukey_offset), ukey_len as usize - 8) },
                key.user_key(),
            ) == Ordering::Equal
            {
                let tag = decode_fixed64(unsafe {
                    slice::from_raw_parts(entry.add(ukey_offset + ukey_len as usize - 8), 8)
                });
                match ValueType::from(tag as u8) {
                    ValueType::Value => {
                        let (value, _) = decode_length_prefixed_slice_ptr(unsafe {
                            entry.add(ukey_offset + ukey_len as usize)
                        });
                        return Some(Ok(value.to_vec()));
                    }
                    ValueType::Deletion => {
                        return Some(Err(StrataError::Deleted));
                    }
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dbformat::MAX_SEQUENCE_NUMBER;
    use crate::util::BytewiseComparator;

    fn new_table() -> Rc<RefCell<MemTable>> {
        MemTable::new(InternalKeyComparator::new(Box::new(BytewiseComparator::new())))
    }

    #[test]
    fn get_missing_key_returns_none() {
        let table = new_table();
        let key = LookupKey::new(b"missing", MAX_SEQUENCE_NUMBER);
        assert!(table.borrow().get(&key).is_none());
    }

    #[test]
    fn add_then_get_round_trips_value() {
        let table = new_table();
        table
            .borrow_mut()
            .add(1, ValueType::Value, b"k1", b"v1");
        let key = LookupKey::new(b"k1", MAX_SEQUENCE_NUMBER);
        let got = table.borrow().get(&key);
        assert_eq!(got.unwrap().unwrap(), b"v1");
    }

    #[test]
    fn deletion_tombstone_surfaces_as_deleted_error() {
        let table = new_table();
        table.borrow_mut().add(1, ValueType::Value, b"k1", b"v1");
        table
            .borrow_mut()
            .add(2, ValueType::Deletion, b"k1", b"");
        let key = LookupKey::new(b"k1", MAX_SEQUENCE_NUMBER);
        let got = table.borrow().get(&key).unwrap();
        assert!(matches!(got, Err(StrataError::Deleted)));
    }

    #[test]
    fn get_respects_snapshot_sequence_number() {
        let table = new_table();
        table.borrow_mut().add(5, ValueType::Value, b"k1", b"new");
        table.borrow_mut().add(1, ValueType::Value, b"k1", b"old");
        let key_at_2 = LookupKey::new(b"k1", 2);
        assert_eq!(table.borrow().get(&key_at_2).unwrap().unwrap(), b"old");
        let key_at_10 = LookupKey::new(b"k1", 10);
        assert_eq!(table.borrow().get(&key_at_10).unwrap().unwrap(), b"new");
    }

    #[test]
    fn iterator_walks_keys_in_internal_key_order() {
        let table = new_table();
        table.borrow_mut().add(1, ValueType::Value, b"b", b"2");
        table.borrow_mut().add(1, ValueType::Value, b"a", b"1");
        table.borrow_mut().add(1, ValueType::Value, b"c", b"3");
        let table_ref = table.borrow();
        let mut iter = table_ref.new_iterator();
        iter.seek_to_first();
        assert!(iter.valid());
        assert_eq!(iter.value(), b"1");
        iter.next();
        assert_eq!(iter.value(), b"2");
        iter.next();
        assert_eq!(iter.value(), b"3");
        iter.next();
        assert!(!iter.valid());
    }
}
