//! # 字节读写层
//!
//! 按字节偏移读写磁盘镜像，提供定宽整数、inode 记录与整簇的读写。
//! 所有写入立即落到块设备上，不做任何缓冲。

use std::sync::Arc;

use block_dev::BlockDevice;

use crate::layout::{DiskInode, IndirectBlock, SuperBlock};
use crate::{Cluster, ClusterId, Error, InodeId, Result, CLUSTER_SIZE};

pub struct Image {
    device: Arc<dyn BlockDevice>,
    /// 决定各区域寻址的常量
    sb: SuperBlock,
}

impl Image {
    #[inline]
    pub fn new(device: Arc<dyn BlockDevice>, sb: SuperBlock) -> Self {
        Self { device, sb }
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        &self.sb
    }

    #[inline]
    pub fn read(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        Ok(self.device.read_at(offset, buf)?)
    }

    #[inline]
    pub fn write(&self, offset: u64, buf: &[u8]) -> Result<()> {
        Ok(self.device.write_at(offset, buf)?)
    }

    #[inline]
    pub fn write_i32(&self, offset: u64, value: i32) -> Result<()> {
        self.write(offset, &value.to_le_bytes())
    }

    #[inline]
    pub fn flush(&self) -> Result<()> {
        Ok(self.device.flush()?)
    }

    /// 簇在镜像中的字节偏移；越出数据区的簇编号说明磁盘结构已损坏
    pub fn cluster_offset(&self, id: ClusterId) -> Result<u64> {
        if id.index() >= self.sb.data_cluster_count as usize {
            return Err(Error::Corruption(format!(
                "cluster {id} is outside the data region of {} clusters",
                self.sb.data_cluster_count
            )));
        }
        Ok(self.sb.cluster_offset(id))
    }

    pub fn read_cluster(&self, id: ClusterId) -> Result<Cluster> {
        let mut cluster = [0; CLUSTER_SIZE];
        self.read(self.cluster_offset(id)?, &mut cluster)?;
        Ok(cluster)
    }

    pub fn write_cluster(&self, id: ClusterId, cluster: &Cluster) -> Result<()> {
        self.write(self.cluster_offset(id)?, cluster)
    }

    #[inline]
    pub fn zero_cluster(&self, id: ClusterId) -> Result<()> {
        self.write_cluster(id, &[0; CLUSTER_SIZE])
    }

    #[inline]
    pub fn read_indirect(&self, id: ClusterId) -> Result<IndirectBlock> {
        self.read_cluster(id).map(|cluster| IndirectBlock::decode(&cluster))
    }

    #[inline]
    pub fn write_indirect(&self, id: ClusterId, block: &IndirectBlock) -> Result<()> {
        self.write_cluster(id, &block.encode())
    }

    fn inode_offset(&self, id: InodeId) -> Result<u64> {
        if id.index() >= self.sb.inode_count as usize {
            return Err(Error::Corruption(format!(
                "inode {id} is outside the inode table of {} records",
                self.sb.inode_count
            )));
        }
        Ok(self.sb.inode_offset(id))
    }

    /// 整条记录写回，不做字段级的局部写
    pub fn write_inode(&self, id: InodeId, inode: &DiskInode) -> Result<()> {
        self.write(self.inode_offset(id)?, &inode.encode())
    }

    /// 一次读出整张 inode 表
    pub fn read_inodes(&self) -> Result<Vec<DiskInode>> {
        let mut table = vec![0; self.sb.inode_count as usize * DiskInode::SIZE];
        self.read(self.sb.inode_start.into(), &mut table)?;
        Ok(table
            .chunks_exact(DiskInode::SIZE)
            .map(DiskInode::decode)
            .collect())
    }

    /// 一次写入整张 inode 表
    pub fn write_inodes(&self, inodes: &[DiskInode]) -> Result<()> {
        let table: Vec<u8> = inodes.iter().flat_map(DiskInode::encode).collect();
        self.write(self.sb.inode_start.into(), &table)
    }

    pub fn read_bitmap(&self) -> Result<Vec<u8>> {
        let mut bits = vec![0; self.sb.data_cluster_count as usize];
        self.read(self.sb.bitmap_start.into(), &mut bits)?;
        Ok(bits)
    }

    #[inline]
    pub fn write_bitmap(&self, id: ClusterId, used: bool) -> Result<()> {
        self.write(self.sb.bitmap_offset(id), &[u8::from(used)])
    }
}
