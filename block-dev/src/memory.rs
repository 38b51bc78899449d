use std::io;

use spin::Mutex;

use crate::BlockDevice;

/// 内存中的磁盘镜像，容量在 [`BlockDevice::reset`] 时确定
#[derive(Debug, Default)]
pub struct MemoryDevice {
    data: Mutex<Vec<u8>>,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前镜像内容的拷贝
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.data.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlockDevice for MemoryDevice {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let data = self.data.lock();
        let range = span(offset, buf.len(), data.len())?;
        buf.copy_from_slice(&data[range]);
        Ok(())
    }

    fn write_at(&self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let mut data = self.data.lock();
        let range = span(offset, buf.len(), data.len())?;
        data[range].copy_from_slice(buf);
        Ok(())
    }

    fn reset(&self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(io::Error::other)?;
        let mut data = self.data.lock();
        data.clear();
        data.resize(len, 0);
        Ok(())
    }
}

/// 镜像之外的访问一律视为读到文件尾
fn span(offset: u64, len: usize, cap: usize) -> io::Result<std::ops::Range<usize>> {
    usize::try_from(offset)
        .ok()
        .and_then(|start| Some(start..start.checked_add(len)?))
        .filter(|range| range.end <= cap)
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("access of {len} bytes at {offset} exceeds image of {cap} bytes"),
            )
        })
}
