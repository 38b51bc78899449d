//! # 磁盘管理器层
//!
//! 构建出磁盘的布局并使用：持有位图与 inode 表在内存中的镜像，
//! 负责 inode 与数据簇的分配、回收。

use std::io;
use std::sync::Arc;

use block_dev::BlockDevice;
use log::{debug, info, warn};

use crate::image::Image;
use crate::layout::*;
use crate::{ClusterId, Error, InodeId, Result};

pub struct Volume {
    image: Image,
    bitmap: Bitmap,
    /// 整张 inode 表，下标即编号
    inodes: Vec<DiskInode>,
}

impl Volume {
    /// 按请求的大小重建镜像：全零内容、空闲的 inode 表、只含根目录的位图
    pub fn format(device: Arc<dyn BlockDevice>, disk_size: u64) -> Result<Self> {
        let sb = SuperBlock::layout(disk_size)?;
        debug!("layout: {sb:?}");

        device.reset(sb.image_len())?;
        let image = Image::new(device, sb);
        image.write(0, &sb.encode())?;

        // 全零的记录并不是空闲 inode，必须显式写入空闲值
        let mut inodes = vec![DiskInode::default(); sb.inode_count as usize];
        image.write_inodes(&inodes)?;

        let mut bitmap = Bitmap::new(sb.data_cluster_count as usize);
        bitmap.mark(&image, &[ClusterId::ROOT], true)?;

        let root = &mut inodes[InodeId::ROOT.index()];
        root.init(InodeId::ROOT, DiskInodeKind::Directory);
        root.direct[0] = Some(ClusterId::ROOT);
        image.write_inode(InodeId::ROOT, root)?;
        image.flush()?;

        info!(
            "formatted {} bytes: {} inodes, {} data clusters",
            sb.image_len(),
            sb.inode_count,
            sb.data_cluster_count
        );

        Ok(Self {
            image,
            bitmap,
            inodes,
        })
    }

    pub fn open(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let mut buf = [0; SuperBlock::SIZE];
        match device.read_at(0, &mut buf) {
            Err(err) if err.kind() == io::ErrorKind::UnexpectedEof => {
                return Err(Error::NotFormatted);
            }
            result => result?,
        }

        let sb = SuperBlock::decode(&buf);
        if !sb.has_signature() {
            return Err(Error::NotFormatted);
        }
        if !sb.is_valid() {
            warn!("superblock does not match its own layout: {sb:?}");
            return Err(Error::Corruption(String::from("inconsistent superblock")));
        }

        let image = Image::new(device, sb);
        // 镜像末尾必须可读，否则区域被截断了
        let mut last = [0];
        match image.read(sb.image_len() - 1, &mut last) {
            Err(Error::Io(err)) if err.kind() == io::ErrorKind::UnexpectedEof => {
                warn!("image is shorter than {} bytes", sb.image_len());
                return Err(Error::Corruption(String::from("truncated image")));
            }
            result => result?,
        }

        let bitmap = Bitmap::load(&image)?;
        let inodes = image.read_inodes()?;
        info!(
            "opened image of {} bytes, {} free clusters",
            sb.image_len(),
            bitmap.free_count()
        );

        Ok(Self {
            image,
            bitmap,
            inodes,
        })
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        self.image.super_block()
    }

    #[inline]
    pub fn image(&self) -> &Image {
        &self.image
    }

    #[inline]
    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn inode(&self, id: InodeId) -> Result<&DiskInode> {
        self.inodes.get(id.index()).ok_or_else(|| {
            Error::Corruption(format!(
                "inode {id} is outside the inode table of {} records",
                self.inodes.len()
            ))
        })
    }

    /// 先写盘，再更新内存中的镜像
    pub fn write_inode(&mut self, id: InodeId, inode: DiskInode) -> Result<()> {
        self.image.write_inode(id, &inode)?;
        self.inodes[id.index()] = inode;
        Ok(())
    }

    /// 第一个空闲的 inode，只查找不占用
    pub fn find_free_inode(&self) -> Result<InodeId> {
        self.inodes
            .iter()
            .position(DiskInode::is_free)
            .map(|index| InodeId::new(index as u32))
            .ok_or(Error::NoFreeInode)
    }

    pub fn free_inode_count(&self) -> usize {
        self.inodes.iter().filter(|inode| inode.is_free()).count()
    }

    /// 按扫描顺序找出 `count` 个空闲簇，只查找不占用
    #[inline]
    pub fn find_free_clusters(&self, count: usize) -> Result<Vec<ClusterId>> {
        self.bitmap.find_free(count)
    }

    pub fn find_free_cluster(&self) -> Result<ClusterId> {
        self.find_free_clusters(1)?
            .pop()
            .ok_or(Error::NoFreeBlocks)
    }

    #[inline]
    pub fn mark_used(&mut self, ids: &[ClusterId]) -> Result<()> {
        self.bitmap.mark(&self.image, ids, true)
    }

    /// 清零后再归还，空闲簇的内容总是全零
    pub fn free_clusters(&mut self, ids: &[ClusterId]) -> Result<()> {
        for &id in ids {
            self.image.zero_cluster(id)?;
        }
        self.bitmap.mark(&self.image, ids, false)
    }

    /// inode 占据的所有簇：数据块与索引块
    pub fn owned_clusters(&self, id: InodeId) -> Result<Vec<ClusterId>> {
        let inode = self.inode(id)?;
        let mut clusters = inode.data_blocks(&self.image)?;
        clusters.extend(inode.indirect_blocks());
        Ok(clusters)
    }

    #[inline]
    pub fn flush(&self) -> Result<()> {
        self.image.flush()
    }

    /// 一致性检查：
    /// - 每条 inode 记录的编号等于其下标；
    /// - 每个簇恰被引用一次时才标记为已用，且不被重复引用；
    /// - 每个目录项都指向存活的 inode，且 inode 的引用计数与目录项数一致
    pub fn check(&self) -> Result<()> {
        let root = self.inode(InodeId::ROOT)?;
        if root.is_free() || !root.is_dir() {
            return Err(self.inconsistent(String::from("root inode is not a directory")));
        }

        let mut cluster_refs = vec![0u32; self.bitmap.capacity()];
        let mut entry_refs = vec![0u32; self.inodes.len()];
        // 根目录引用它自己
        entry_refs[InodeId::ROOT.index()] = 1;

        for (index, inode) in self.inodes.iter().enumerate() {
            let Some(id) = inode.id else {
                continue;
            };
            if id.index() != index {
                return Err(self.inconsistent(format!("inode record {index} claims id {id}")));
            }

            for cluster in self.owned_clusters(id)? {
                let Some(refs) = cluster_refs.get_mut(cluster.index()) else {
                    return Err(self.inconsistent(format!(
                        "inode {id} points outside the data region at {cluster}"
                    )));
                };
                *refs += 1;
            }

            if !inode.is_dir() {
                continue;
            }
            for entry in self.dir_entries(id)? {
                let child = entry.inode_id().filter(|child| {
                    self.inodes
                        .get(child.index())
                        .is_some_and(|inode| !inode.is_free())
                });
                let Some(child) = child else {
                    return Err(self.inconsistent(format!(
                        "entry {:?} in directory {id} references no live inode",
                        entry.name()
                    )));
                };
                entry_refs[child.index()] += 1;
            }
        }

        for (index, &refs) in cluster_refs.iter().enumerate() {
            let cluster = ClusterId::new(index as u32);
            if refs > 1 || (refs == 1) != self.bitmap.is_used(cluster) {
                return Err(self.inconsistent(format!(
                    "cluster {cluster} has {refs} references, marked {}",
                    if self.bitmap.is_used(cluster) { "used" } else { "free" }
                )));
            }
        }

        for inode in &self.inodes {
            let Some(id) = inode.id else {
                continue;
            };
            let refs = entry_refs[id.index()];
            if refs != u32::from(inode.links) {
                return Err(self.inconsistent(format!(
                    "inode {id} has {refs} entries but {} links",
                    inode.links
                )));
            }
        }

        debug!("check passed");
        Ok(())
    }

    fn inconsistent(&self, reason: String) -> Error {
        warn!("check: {reason}");
        Error::Corruption(reason)
    }
}
