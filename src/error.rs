use std::io;

#[derive(thiserror::Error, Debug)]
pub enum LsmError {
    #[error("{0}")]
    Io(#[from] io::Error),

    #[error("read of {len} bytes at offset {offset} is out of range for file of {size} bytes")]
    OutOfRange { offset: u64, len: u64, size: u64 },

    #[error("{0}")]
    Custom(String),
}
