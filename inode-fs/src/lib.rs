/* inode-fs 的整体架构，自上而下 */

// 文件系统层：对外提供建目录、删目录、列目录等操作
mod vfs;

// 目录树层：内存中的目录树与路径解析
mod path;
mod tree;

// 目录项存储层：目录数据簇内的定长槽位
mod directory;

// 磁盘管理器层：位图分配器与 inode 表
mod volume;

// 磁盘数据结构层：表示磁盘文件系统的数据结构
mod layout;

// 字节读写层：按偏移读写镜像
mod image;

mod error;
mod id;

pub use self::{
    error::{Error, Result},
    id::{ClusterId, InodeId},
    layout::SuperBlock,
    vfs::{FileSystem, Listing, Stat, StatKind},
};

/// 超级块签名，不足部分补零
pub const SIGNATURE: [u8; SIGNATURE_LEN] = *b"inode-fs\0\0\0\0";
pub const SIGNATURE_LEN: usize = 12;

/// 簇（数据块）大小
pub const CLUSTER_SIZE: usize = 4096;

/// 可格式化的最小镜像大小
pub const MIN_DISK_SIZE: u64 = 102_400;
/// 磁盘上各字段都是 `i32`，镜像大小不能超过其表示范围
pub const MAX_DISK_SIZE: u64 = i32::MAX as u64;

/// 目录项名字的最大字节数
pub const NAME_MAX_LEN: usize = 12;

type Cluster = [u8; CLUSTER_SIZE];
