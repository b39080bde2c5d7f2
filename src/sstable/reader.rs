use crate::db::key_types::{InternalKey, Lookup, Value, ValueType};
use crate::storage::file::TableFile;
use crate::Result;
use std::rc::Rc;

/// Random-access view over a table image. Opening memoizes only the entry
/// count; each entry access reads the two header offsets and the record's own
/// bytes, so a point lookup touches O(log n) small regions of the file, never
/// the whole image.
#[derive(Clone)]
pub struct SSTableReader {
    file: Rc<dyn TableFile>,
    entry_count: u64,
}

impl SSTableReader {
    pub fn open(file: Rc<dyn TableFile>) -> Result<SSTableReader> {
        let raw = file.read(0, 8)?;
        let entry_count = u64::from_le_bytes(raw.as_slice().try_into().unwrap());
        Ok(SSTableReader { file, entry_count })
    }

    #[inline]
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    pub fn entry(&self, ind: u64) -> Result<(InternalKey, Value)> {
        assert!(ind < self.entry_count, "entry index out of bounds");
        let size = self.file.size();

        let raw = self.file.read((2 * ind + 1) * 8, 16)?;
        let key_end = u64::from_le_bytes(raw[..8].try_into().unwrap());
        let value_end = u64::from_le_bytes(raw[8..].try_into().unwrap());

        let raw = self.file.read(size - key_end, 8)?;
        let sequence_number = u64::from_le_bytes(raw.as_slice().try_into().unwrap());
        let user_key = self
            .file
            .read(size - key_end + 8, key_end - value_end - 8)?;

        // The previous record's key end delimits this entry's value bytes.
        let value_len = if ind > 0 {
            let raw = self.file.read((2 * ind - 1) * 8, 8)?;
            value_end - u64::from_le_bytes(raw.as_slice().try_into().unwrap())
        } else {
            value_end
        };

        let (value_type, value) = if value_len > 0 {
            (ValueType::Value, self.file.read(size - value_end, value_len)?)
        } else {
            (ValueType::Deletion, Vec::new())
        };
        Ok((
            InternalKey {
                user_key,
                sequence_number,
                value_type,
            },
            value,
        ))
    }

    /// Newest entry kind for `user_key` within this table only, considering
    /// versions with sequence number at most `snapshot`.
    pub fn get(&self, user_key: &[u8], snapshot: u64) -> Result<Lookup> {
        let target = InternalKey::lookup(user_key, snapshot);
        let (mut lo, mut hi) = (0, self.entry_count);
        while lo < hi {
            let mid = (lo + hi) / 2;
            if self.entry(mid)?.0 < target {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if lo == self.entry_count {
            return Ok(Lookup::Miss);
        }
        let (key, value) = self.entry(lo)?;
        if key.user_key != user_key {
            Ok(Lookup::Miss)
        } else if key.value_type == ValueType::Value {
            Ok(Lookup::Found(value))
        } else {
            Ok(Lookup::Tombstone)
        }
    }

    /// Forward iteration over all entries in internal-key order.
    pub fn scan(&self) -> SSTableScan {
        SSTableScan {
            reader: self.clone(),
            ind: 0,
        }
    }
}

/// Lazy scan over a table. The reader's file handle is reference-counted, so
/// a scan stays valid even after the table is erased from its level.
pub struct SSTableScan {
    reader: SSTableReader,
    ind: u64,
}

impl Iterator for SSTableScan {
    type Item = (InternalKey, Value);

    fn next(&mut self) -> Option<Self::Item> {
        if self.ind == self.reader.entry_count {
            return None;
        }
        let entry = self
            .reader
            .entry(self.ind)
            .expect("sstable read failed during scan");
        self.ind += 1;
        Some(entry)
    }
}
