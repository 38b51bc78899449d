use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("virtual file system is not formatted")]
    NotFormatted,

    #[error("invalid disk size: {0} bytes")]
    InvalidSize(u64),

    #[error("image I/O failed: {0}")]
    Io(#[from] io::Error),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("directory not empty: {0}")]
    NotEmpty(String),

    #[error("no free inode available")]
    NoFreeInode,

    #[error("not enough free blocks")]
    NoFreeBlocks,

    #[error("directory cannot address another cluster")]
    DirectoryFull,

    #[error("invalid name: {0:?}")]
    InvalidName(String),

    #[error("image corrupted: {0}")]
    Corruption(String),
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
