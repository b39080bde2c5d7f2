use crate::error::LsmError;
use crate::storage::buffer_pool::ReadBufferPool;
use crate::Result;
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::rc::Rc;

/// An append-once byte blob: written in full exactly once, then read at
/// random offsets.
pub trait TableFile {
    /// Read `len` bytes starting at `offset`. Reading past the current size
    /// fails with [`LsmError::OutOfRange`].
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>>;

    /// Replace the whole content.
    fn write_all(&mut self, data: &[u8]) -> Result<()>;

    fn size(&self) -> u64;
}

fn check_bounds(offset: u64, len: u64, size: u64) -> Result<()> {
    if offset.checked_add(len).map_or(true, |end| end > size) {
        return Err(LsmError::OutOfRange { offset, len, size });
    }
    Ok(())
}

/// Table file named `sstable_<id>` in the store's working directory whose
/// reads are served by the frame cache. The backing file is removed when the
/// last holder drops it.
pub struct BufferedFile {
    dir: PathBuf,
    table_id: u32,
    buffer_pool: Rc<ReadBufferPool>,
    size: u64,
}

impl BufferedFile {
    pub fn new(dir: &Path, table_id: u32, buffer_pool: Rc<ReadBufferPool>) -> BufferedFile {
        BufferedFile {
            dir: dir.to_path_buf(),
            table_id,
            buffer_pool,
            size: 0,
        }
    }

    fn path(&self) -> PathBuf {
        self.dir.join(format!("sstable_{}", self.table_id))
    }
}

impl TableFile for BufferedFile {
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        check_bounds(offset, len, self.size)?;
        if len == 0 {
            return Ok(Vec::new());
        }
        let frame_size = self.buffer_pool.frame_size();
        let l = offset / frame_size;
        let r = (offset + len - 1) / frame_size;
        let frames = self.buffer_pool.frames(self.table_id, l as u32, r as u32)?;

        let mut result = Vec::with_capacity(len as usize);
        let mut pos = offset;
        for frame in frames {
            let in_frame = (pos % frame_size) as usize;
            let take = ((len as usize) - result.len()).min(frame_size as usize - in_frame);
            result.extend_from_slice(&frame[in_frame..in_frame + take]);
            pos += take as u64;
        }
        Ok(result)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        fs::write(self.path(), data)?;
        self.size = data.len() as u64;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for BufferedFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(self.path());
    }
}

/// Plain disk-backed blob at a fixed path, read without the frame cache.
/// Used for bloom filter images. Removed on drop.
pub struct DiskFile {
    path: PathBuf,
    size: u64,
}

impl DiskFile {
    pub fn new(path: PathBuf) -> DiskFile {
        DiskFile { path, size: 0 }
    }
}

impl TableFile for DiskFile {
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        check_bounds(offset, len, self.size)?;
        let mut file = fs::File::open(&self.path)?;
        file.seek(SeekFrom::Start(offset))?;
        let mut result = vec![0u8; len as usize];
        file.read_exact(&mut result)?;
        Ok(result)
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        fs::write(&self.path, data)?;
        self.size = data.len() as u64;
        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for DiskFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}

/// Memory-backed blob for tests of the codec and filters.
#[derive(Default)]
pub struct MemFile {
    data: Vec<u8>,
}

impl TableFile for MemFile {
    fn read(&self, offset: u64, len: u64) -> Result<Vec<u8>> {
        check_bounds(offset, len, self.data.len() as u64)?;
        Ok(self.data[offset as usize..(offset + len) as usize].to_vec())
    }

    fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.data = data.to_vec();
        Ok(())
    }

    fn size(&self) -> u64 {
        self.data.len() as u64
    }
}
