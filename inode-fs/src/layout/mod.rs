//! # 磁盘数据结构层
//!
//! inode-fs 的磁盘布局（每个区域都占整数个簇）：
//! 超级块 | 数据块位图 | 索引节点区域 | 数据块区域

mod super_block;
pub use super_block::SuperBlock;

mod bitmap;
pub use bitmap::Bitmap;

mod inode;
pub use inode::{DiskInode, DiskInodeKind, IndirectBlock};
#[cfg(test)]
pub use inode::DIRECT_COUNT;

/// 文件项，也属于磁盘文件系统数据结构
mod dir_entry;
pub use dir_entry::DirEntry;
