use crate::db::key_types::{InternalKey, Value, ValueType};
use crate::storage::file::TableFile;
use crate::Result;

/// Collects entries in memory and writes the whole table image with a single
/// `write_all` on [`finish`](SSTableBuilder::finish).
///
/// `add` must be called in strictly increasing internal-key order.
pub struct SSTableBuilder<F: TableFile> {
    file: F,
    entries: Vec<(InternalKey, Value)>,
}

impl<F: TableFile> SSTableBuilder<F> {
    pub fn new(file: F) -> SSTableBuilder<F> {
        SSTableBuilder {
            file,
            entries: Vec::new(),
        }
    }

    pub fn add(&mut self, key: InternalKey, value: Value) {
        debug_assert!(
            self.entries.last().map_or(true, |(last, _)| *last < key),
            "entries must be added in strictly increasing internal-key order"
        );
        debug_assert!(
            key.value_type == ValueType::Value || value.is_empty(),
            "a deletion entry carries no value"
        );
        self.entries.push((key, value));
    }

    /// Serialize all entries and hand back the written file.
    pub fn finish(mut self) -> Result<F> {
        let header_len = (2 * self.entries.len() + 1) * 8;
        let data_len: usize = self
            .entries
            .iter()
            .map(|(key, value)| 8 + key.user_key.len() + value.len())
            .sum();
        let total = header_len + data_len;

        let mut buffer = vec![0u8; total];
        buffer[..8].copy_from_slice(&(self.entries.len() as u64).to_le_bytes());

        let mut shift: usize = 0;
        for (ind, (key, value)) in self.entries.iter().enumerate() {
            shift += value.len();
            buffer[(2 * ind + 2) * 8..(2 * ind + 3) * 8]
                .copy_from_slice(&(shift as u64).to_le_bytes());
            buffer[total - shift..total - shift + value.len()].copy_from_slice(value);

            shift += key.user_key.len();
            buffer[total - shift..total - shift + key.user_key.len()]
                .copy_from_slice(&key.user_key);

            shift += 8;
            buffer[(2 * ind + 1) * 8..(2 * ind + 2) * 8]
                .copy_from_slice(&(shift as u64).to_le_bytes());
            buffer[total - shift..total - shift + 8]
                .copy_from_slice(&key.sequence_number.to_le_bytes());
        }

        self.file.write_all(&buffer)?;
        Ok(self.file)
    }
}
