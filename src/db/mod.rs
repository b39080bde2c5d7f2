pub mod db_iter;
pub mod granular_lsm;
pub mod key_types;
pub mod simple_lsm;

pub use db_iter::LsmScan;
pub use granular_lsm::GranularLsm;
pub use key_types::{InternalKey, Lookup, UserKey, Value, ValueType};
pub use simple_lsm::SimpleLsm;

use crate::Result;

/// A single-threaded LSM-tree store over byte-string keys and values.
///
/// Put/Delete are applied in invocation order; every mutation is tagged with
/// the next sequence number. Reads take an optional snapshot: they observe
/// the newest version whose sequence number does not exceed it. The store is
/// ephemeral: its working directory is created on open and removed on drop.
pub trait Lsm {
    /// Insert or overwrite the value for `user_key`.
    fn put(&mut self, user_key: &[u8], value: &[u8]) -> Result<()>;

    /// Write a deletion tombstone for `user_key`.
    fn delete(&mut self, user_key: &[u8]) -> Result<()>;

    /// Newest live value for `user_key` across all tiers, considering only
    /// versions with sequence number at most `snapshot`. `None` if the key is
    /// absent or its newest visible entry is a tombstone.
    fn get_at(&self, user_key: &[u8], snapshot: u64) -> Result<Option<Value>>;

    fn get(&self, user_key: &[u8]) -> Result<Option<Value>> {
        self.get_at(user_key, u64::MAX)
    }

    /// Lazy range scan over live key-value pairs in `[start_key, end_key)`,
    /// keys ascending, tombstones elided, one newest visible version per key.
    /// `None` bounds are unbounded.
    fn scan_at(
        &self,
        start_key: Option<&[u8]>,
        end_key: Option<&[u8]>,
        snapshot: u64,
    ) -> Result<LsmScan<'_>>;

    fn scan(&self, start_key: Option<&[u8]>, end_key: Option<&[u8]>) -> Result<LsmScan<'_>> {
        self.scan_at(start_key, end_key, u64::MAX)
    }

    /// The sequence number assigned to the most recent mutation, 0 before
    /// any write.
    fn current_sequence_number(&self) -> u64;
}
