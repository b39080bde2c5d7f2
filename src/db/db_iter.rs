use crate::collections::merge::MergingIterator;
use crate::db::key_types::{InternalKey, UserKey, Value, ValueType};
use crate::sstable::{LevelsManager, SSTableReader, SSTableScan};

pub(crate) type EntrySource<'a> = Box<dyn Iterator<Item = (InternalKey, Value)> + 'a>;

/// Merged, range-clipped view over all tiers of the store, produced by
/// [`Lsm::scan`](crate::db::Lsm::scan).
///
/// On top of the k-way merge it applies, in order: the start-key skip, the
/// end-key cut, the snapshot filter, and version dedup with tombstone
/// elision. Because internal keys sort newest-first within a user key, the
/// first visible entry per key decides: a value is emitted, a tombstone
/// suppresses the key entirely.
pub struct LsmScan<'a> {
    merged: MergingIterator<(InternalKey, Value), EntrySource<'a>>,
    start_key: Option<UserKey>,
    end_key: Option<UserKey>,
    snapshot: u64,
    last_user_key: Option<UserKey>,
    done: bool,
}

impl<'a> LsmScan<'a> {
    pub(crate) fn new(
        sources: Vec<EntrySource<'a>>,
        start_key: Option<&[u8]>,
        end_key: Option<&[u8]>,
        snapshot: u64,
    ) -> LsmScan<'a> {
        LsmScan {
            merged: MergingIterator::new(sources),
            start_key: start_key.map(<[u8]>::to_vec),
            end_key: end_key.map(<[u8]>::to_vec),
            snapshot,
            last_user_key: None,
            done: false,
        }
    }
}

impl Iterator for LsmScan<'_> {
    type Item = (UserKey, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let (key, value) = match self.merged.next() {
                Some(entry) => entry,
                None => {
                    self.done = true;
                    return None;
                }
            };
            if let Some(start_key) = &self.start_key {
                if key.user_key < *start_key {
                    continue;
                }
            }
            if let Some(end_key) = &self.end_key {
                if key.user_key >= *end_key {
                    self.done = true;
                    return None;
                }
            }
            if key.sequence_number > self.snapshot {
                continue;
            }
            if key.value_type == ValueType::Deletion {
                self.last_user_key = Some(key.user_key);
                continue;
            }
            if self.last_user_key.as_ref() == Some(&key.user_key) {
                continue;
            }
            self.last_user_key = Some(key.user_key.clone());
            return Some((key.user_key, value));
        }
    }
}

/// Streams one level of the granular engine: its tables hold disjoint key
/// ranges in order, so concatenating their scans yields one sorted source.
/// Tables are opened lazily as the scan reaches them.
pub(crate) struct LevelScan<'a> {
    levels: &'a LevelsManager,
    level: usize,
    next_table: usize,
    current: Option<SSTableScan>,
}

impl<'a> LevelScan<'a> {
    pub(crate) fn new(levels: &'a LevelsManager, level: usize) -> LevelScan<'a> {
        LevelScan {
            levels,
            level,
            next_table: 0,
            current: None,
        }
    }
}

impl Iterator for LevelScan<'_> {
    type Item = (InternalKey, Value);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(current) = &mut self.current {
                if let Some(entry) = current.next() {
                    return Some(entry);
                }
            }
            if self.next_table == self.levels.num_tables(self.level) {
                return None;
            }
            let file = self.levels.table_file(self.level, self.next_table);
            self.next_table += 1;
            let reader = SSTableReader::open(file).expect("sstable read failed during scan");
            self.current = Some(reader.scan());
        }
    }
}
