//! # 块设备接口层
//!
//! 磁盘镜像是以**字节偏移**寻址的扁平存储，例如宿主机上的一个文件；
//! [`BlockDevice`] 就是对读写这类存储的抽象，
//! 实现了此特质的类型称为**块设备驱动**。
//!
//! `inode-fs` 只通过块设备驱动读写磁盘镜像，不直接接触宿主文件。

use std::any::Any;
use std::io;

mod memory;

pub use self::memory::MemoryDevice;

/// 块设备驱动特质
///
/// 所有读写都是定位读写：要么整段完成，要么返回错误。
pub trait BlockDevice: Send + Sync + Any {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// 丢弃原有内容，把设备重置为 `len` 字节的全零镜像
    fn reset(&self, len: u64) -> io::Result<()>;

    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}
