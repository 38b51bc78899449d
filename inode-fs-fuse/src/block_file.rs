use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use block_dev::BlockDevice;
use send_wrapper::SendWrapper;

/// 以宿主机上的文件作为磁盘镜像，只能在创建它的线程上使用
#[derive(Debug)]
pub struct BlockFile {
    inner: SendWrapper<RefCell<File>>,
}

impl BlockFile {
    pub fn new(fd: File) -> Self {
        Self {
            inner: SendWrapper::new(RefCell::new(fd)),
        }
    }

    /// 打开已有的镜像
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new().read(true).write(true).open(path)?;
        Ok(Self::new(fd))
    }

    /// 打开镜像，不存在时新建；原有内容留待格式化时清除
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let fd = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;
        Ok(Self::new(fd))
    }
}

impl BlockDevice for BlockFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.read_exact(buf)
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut file = self.inner.borrow_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(buf)
    }

    fn reset(&self, len: u64) -> io::Result<()> {
        let file = self.inner.borrow();
        file.set_len(0)?;
        file.set_len(len)
    }

    fn flush(&self) -> io::Result<()> {
        self.inner.borrow_mut().flush()
    }
}
