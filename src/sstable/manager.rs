use crate::sstable::SSTableMetadata;
use crate::storage::file::TableFile;
use std::cell::Cell;
use std::rc::Rc;

struct TableSlot {
    file: Rc<dyn TableFile>,
    filter: Option<Rc<dyn TableFile>>,
    metadata: Option<SSTableMetadata>,
}

/// Passive per-level bookkeeping of table files: an ordered list of
/// (data file, optional filter file, optional metadata) per level, with
/// insert/erase at arbitrary indices. Compaction policy lives in the engines.
///
/// Files are reference-counted; erasing a table drops the backing file once
/// the last reader holding it is gone. The manager also counts bytes
/// inserted and per-table visits, which the write-amplification and
/// read-amplification checks observe.
#[derive(Default)]
pub struct LevelsManager {
    levels: Vec<Vec<TableSlot>>,
    table_visits: Cell<u64>,
    bytes_inserted: Cell<u64>,
    bytes_read: Cell<u64>,
}

impl LevelsManager {
    pub fn new() -> LevelsManager {
        LevelsManager::default()
    }

    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn num_tables(&self, level: usize) -> usize {
        self.levels.get(level).map_or(0, Vec::len)
    }

    pub fn table_file(&self, level: usize, ind: usize) -> Rc<dyn TableFile> {
        let file = self.levels[level][ind].file.clone();
        self.table_visits.set(self.table_visits.get() + 1);
        self.bytes_read.set(self.bytes_read.get() + file.size());
        file
    }

    pub fn table_filter(&self, level: usize, ind: usize) -> Option<Rc<dyn TableFile>> {
        self.levels[level][ind].filter.clone()
    }

    pub fn table_metadata(&self, level: usize, ind: usize) -> Option<SSTableMetadata> {
        self.levels
            .get(level)
            .and_then(|tables| tables.get(ind))
            .and_then(|slot| slot.metadata.clone())
    }

    /// Insert a table at `ind` (clamped to the current table count), shifting
    /// subsequent tables to the right. Missing levels are created on demand.
    pub fn insert_table(
        &mut self,
        level: usize,
        ind: usize,
        file: Rc<dyn TableFile>,
        filter: Option<Rc<dyn TableFile>>,
        metadata: Option<SSTableMetadata>,
    ) {
        if self.levels.len() <= level {
            self.levels.resize_with(level + 1, Vec::new);
        }
        let tables = &mut self.levels[level];
        let ind = ind.min(tables.len());
        self.bytes_inserted
            .set(self.bytes_inserted.get() + file.size());
        tables.insert(
            ind,
            TableSlot {
                file,
                filter,
                metadata,
            },
        );
    }

    /// Erase the table at `ind`, shifting subsequent tables to the left.
    pub fn erase_table(&mut self, level: usize, ind: usize) {
        self.levels[level].remove(ind);
    }

    pub fn total_bytes_inserted(&self) -> u64 {
        self.bytes_inserted.get()
    }

    pub fn reset_bytes_inserted(&self) {
        self.bytes_inserted.set(0);
    }

    /// Number of `table_file` accesses since the last reset.
    pub fn table_visits(&self) -> u64 {
        self.table_visits.get()
    }

    pub fn reset_table_visits(&self) {
        self.table_visits.set(0);
    }

    pub fn total_bytes_read(&self) -> u64 {
        self.bytes_read.get()
    }
}
