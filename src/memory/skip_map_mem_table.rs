use crate::collections::skip_list::skipmap::{self, SkipMap};
use crate::db::key_types::{InternalKey, Lookup, Value, ValueType};

/// Byte overhead accounted per entry on top of the key and value payload,
/// covering the sequence number and type tag.
const ENTRY_OVERHEAD: u64 = 16;

/// Mutable in-memory index over internal keys. Writes land here first; once
/// the byte estimate crosses the engine's flush threshold the table is
/// sealed, drained into an SSTable and replaced.
pub struct MemTable {
    map: SkipMap<InternalKey, Value>,
    memory_usage: u64,
    last_sequence: u64,
}

impl MemTable {
    pub fn new(max_height: usize) -> MemTable {
        MemTable {
            map: SkipMap::new(max_height),
            memory_usage: 0,
            last_sequence: 0,
        }
    }

    /// Insert a live value. `sequence_number` must be strictly greater than
    /// that of every earlier insertion.
    pub fn add(&mut self, sequence_number: u64, user_key: &[u8], value: &[u8]) {
        self.insert(
            InternalKey {
                user_key: user_key.to_vec(),
                sequence_number,
                value_type: ValueType::Value,
            },
            value.to_vec(),
        );
    }

    /// Write a deletion tombstone. Tombstones take part in scans and mask
    /// older versions on lookup.
    pub fn delete(&mut self, sequence_number: u64, user_key: &[u8]) {
        self.insert(
            InternalKey {
                user_key: user_key.to_vec(),
                sequence_number,
                value_type: ValueType::Deletion,
            },
            Vec::new(),
        );
    }

    fn insert(&mut self, key: InternalKey, value: Value) {
        debug_assert!(
            key.sequence_number > self.last_sequence || self.map.is_empty(),
            "sequence numbers must be monotonically increasing"
        );
        self.last_sequence = key.sequence_number;
        self.memory_usage += key.user_key.len() as u64 + value.len() as u64 + ENTRY_OVERHEAD;
        self.map.insert(key, value);
    }

    /// Newest entry kind for `user_key` among versions with sequence number
    /// at most `snapshot`.
    pub fn get(&self, user_key: &[u8], snapshot: u64) -> Lookup {
        let target = InternalKey::lookup(user_key, snapshot);
        let node = self.map.find_first_ge(&target, None);
        if node.is_null() {
            return Lookup::Miss;
        }
        unsafe {
            if (*node).key.user_key != user_key {
                Lookup::Miss
            } else if (*node).key.value_type == ValueType::Value {
                Lookup::Found((*node).value.clone())
            } else {
                Lookup::Tombstone
            }
        }
    }

    /// Lazy iteration over all entries, tombstones included, in internal-key
    /// order.
    pub fn scan(&self) -> MemTableScan<'_> {
        MemTableScan {
            iter: self.map.iter(),
        }
    }

    /// Drain the sealed table in internal-key order, consuming it.
    pub fn into_scan(self) -> impl Iterator<Item = (InternalKey, Value)> {
        self.map.into_iter()
    }

    /// Byte estimate of the stored entries. Monotone non-decreasing:
    /// deletions are tombstones and also consume memory.
    pub fn approximate_memory_usage(&self) -> u64 {
        self.memory_usage
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

pub struct MemTableScan<'a> {
    iter: skipmap::Iter<'a, InternalKey, Value>,
}

impl Iterator for MemTableScan<'_> {
    type Item = (InternalKey, Value);

    fn next(&mut self) -> Option<Self::Item> {
        self.iter.next().map(|(key, value)| (key.clone(), value.clone()))
    }
}
