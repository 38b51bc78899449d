use crate::layout::DiskInode;
use crate::{Error, Result};
use crate::{ClusterId, InodeId};
use crate::{CLUSTER_SIZE, MAX_DISK_SIZE, MIN_DISK_SIZE, SIGNATURE, SIGNATURE_LEN};

/// 超级块：
/// - 提供文件系统合法性校验；
/// - 定位其它连续区域
///
/// 磁盘上依次是签名与十个小端 `i32` 字段，位于镜像偏移 0 处。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuperBlock {
    /// 签名：用于校验文件系统合法性
    signature: [u8; SIGNATURE_LEN],
    /// 格式化时请求的镜像大小
    pub disk_size: u32,
    pub cluster_size: u32,
    /// 镜像占据的簇数，包括超级块自身所在的簇
    pub cluster_count: u32,
    pub inode_count: u32,
    pub bitmap_cluster_count: u32,
    pub inode_cluster_count: u32,
    pub data_cluster_count: u32,
    /// 各区域的起始字节偏移
    pub bitmap_start: u32,
    pub inode_start: u32,
    pub data_start: u32,
}

impl SuperBlock {
    pub const SIZE: usize = SIGNATURE_LEN + 10 * 4;

    /// 由请求的镜像大小推导出整个布局
    pub fn layout(disk_size: u64) -> Result<Self> {
        if !(MIN_DISK_SIZE..=MAX_DISK_SIZE).contains(&disk_size) {
            return Err(Error::InvalidSize(disk_size));
        }

        let cluster_size = CLUSTER_SIZE as u32;
        let cluster_count = (disk_size / CLUSTER_SIZE as u64) as u32;

        // 每个数据簇在位图中占一字节
        let bitmap_cluster_count = cluster_count.div_ceil(cluster_size).max(1);
        // inode 区占总簇数的一成
        let inode_cluster_count = (cluster_count / 10).max(1);
        let inode_count = inode_cluster_count * cluster_size / DiskInode::SIZE as u32;

        let data_cluster_count = cluster_count
            .checked_sub(1 + bitmap_cluster_count + inode_cluster_count)
            .filter(|&count| count > 0)
            .ok_or(Error::InvalidSize(disk_size))?;

        // 超级块独占第 0 簇，其余区域依次紧随
        let bitmap_start = cluster_size;
        let inode_start = bitmap_start + bitmap_cluster_count * cluster_size;
        let data_start = inode_start + inode_cluster_count * cluster_size;

        Ok(Self {
            signature: SIGNATURE,
            disk_size: disk_size as u32,
            cluster_size,
            cluster_count,
            inode_count,
            bitmap_cluster_count,
            inode_cluster_count,
            data_cluster_count,
            bitmap_start,
            inode_start,
            data_start,
        })
    }

    #[inline]
    pub fn has_signature(&self) -> bool {
        self.signature == SIGNATURE
    }

    /// 签名正确，且各字段与按 `disk_size` 重新推导的布局一致
    pub fn is_valid(&self) -> bool {
        self.has_signature()
            && Self::layout(self.disk_size.into()).is_ok_and(|layout| layout == *self)
    }

    /// 镜像的实际字节数
    #[inline]
    pub fn image_len(&self) -> u64 {
        u64::from(self.cluster_count) * CLUSTER_SIZE as u64
    }

    #[inline]
    pub fn bitmap_offset(&self, id: ClusterId) -> u64 {
        u64::from(self.bitmap_start) + id.index() as u64
    }

    #[inline]
    pub fn inode_offset(&self, id: InodeId) -> u64 {
        u64::from(self.inode_start) + (id.index() * DiskInode::SIZE) as u64
    }

    #[inline]
    pub fn cluster_offset(&self, id: ClusterId) -> u64 {
        u64::from(self.data_start) + (id.index() * CLUSTER_SIZE) as u64
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        buf[..SIGNATURE_LEN].copy_from_slice(&self.signature);

        let fields = [
            self.disk_size,
            self.cluster_size,
            self.cluster_count,
            self.inode_count,
            self.bitmap_cluster_count,
            self.inode_cluster_count,
            self.data_cluster_count,
            self.bitmap_start,
            self.inode_start,
            self.data_start,
        ];
        for (chunk, field) in buf[SIGNATURE_LEN..].chunks_exact_mut(4).zip(fields) {
            chunk.copy_from_slice(&field.to_le_bytes());
        }

        buf
    }

    pub fn decode(buf: &[u8; Self::SIZE]) -> Self {
        let mut signature = [0; SIGNATURE_LEN];
        signature.copy_from_slice(&buf[..SIGNATURE_LEN]);

        let mut fields = buf[SIGNATURE_LEN..]
            .chunks_exact(4)
            .map(|chunk| u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]));
        let mut next = || fields.next().unwrap_or_default();

        Self {
            signature,
            disk_size: next(),
            cluster_size: next(),
            cluster_count: next(),
            inode_count: next(),
            bitmap_cluster_count: next(),
            inode_cluster_count: next(),
            data_cluster_count: next(),
            bitmap_start: next(),
            inode_start: next(),
            data_start: next(),
        }
    }
}
