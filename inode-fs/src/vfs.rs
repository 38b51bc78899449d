//! # 文件系统层
//!
//! 对外提供的操作：格式化、打开、建目录、删目录、列目录、切换与打印当前目录、查看元信息。
//! 每个会改动镜像的操作都在返回前写穿到块设备。

use std::sync::Arc;

use block_dev::BlockDevice;
use enumflags2::bitflags;
use log::{debug, info};

use crate::layout::{DirEntry, DiskInode, DiskInodeKind, SuperBlock};
use crate::path::Path;
use crate::tree::{DirItem, DirTree};
use crate::volume::Volume;
use crate::{ClusterId, Error, InodeId, Result};

pub struct FileSystem {
    volume: Volume,
    tree: DirTree,
    /// 当前目录
    cwd: InodeId,
}

/// 一个目录下的子目录名与文件名，按存储顺序
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub inode: InodeId,
    pub kind: StatKind,
    pub links: u8,
    pub size: u32,
    /// 数据块，按编址顺序
    pub blocks: Vec<ClusterId>,
    /// 索引块自身
    pub indirect_blocks: Vec<ClusterId>,
}

#[allow(clippy::upper_case_acronyms)]
#[bitflags]
#[repr(u32)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StatKind {
    DIR = 0o040000,
    #[default]
    FILE = 0o100000,
}

impl FileSystem {
    /// 把设备格式化为只有空根目录的文件系统
    pub fn format(device: Arc<dyn BlockDevice>, disk_size: u64) -> Result<Self> {
        let volume = Volume::format(device, disk_size)?;
        Ok(Self {
            volume,
            tree: DirTree::new(),
            cwd: InodeId::ROOT,
        })
    }

    /// 打开已有的镜像并重建目录树
    pub fn open(device: Arc<dyn BlockDevice>) -> Result<Self> {
        let volume = Volume::open(device)?;
        let tree = DirTree::load(&volume)?;
        info!("loaded {} directories", tree.dir_count());

        Ok(Self {
            volume,
            tree,
            cwd: InodeId::ROOT,
        })
    }

    #[inline]
    pub fn super_block(&self) -> &SuperBlock {
        self.volume.super_block()
    }

    pub fn free_clusters(&self) -> usize {
        self.volume.bitmap().free_count()
    }

    pub fn free_inodes(&self) -> usize {
        self.volume.free_inode_count()
    }

    /// 新建空目录，返回其 inode 编号。
    ///
    /// 同名的目录或文件已存在时什么都不占用。
    pub fn make_directory(&mut self, path: &str) -> Result<InodeId> {
        let (parent, name) = self.split(path)?;
        if self.tree.get(parent)?.contains(name) {
            return Err(Error::AlreadyExists(path.to_owned()));
        }

        let id = self.volume.find_free_inode()?;
        let cluster = self.volume.find_free_cluster()?;
        self.volume.image().zero_cluster(cluster)?;
        self.volume.mark_used(&[cluster])?;

        let mut inode = DiskInode::default();
        inode.init(id, DiskInodeKind::Directory);
        inode.direct[0] = Some(cluster);
        self.volume.write_inode(id, inode)?;

        self.volume.insert_entry(parent, &DirEntry::new(name, id))?;
        self.tree.attach_dir(
            parent,
            DirItem {
                inode: id,
                name: name.to_owned(),
            },
        )?;
        self.volume.flush()?;

        debug!("mkdir {path:?}: inode {id}, cluster {cluster}");
        Ok(id)
    }

    /// 删除空目录；当前目录被删除时回到其父目录
    pub fn remove_directory(&mut self, path: &str) -> Result<()> {
        let (parent, name) = self.split(path)?;
        let id = self
            .tree
            .find_subdir(parent, name)
            .ok_or_else(|| Error::PathNotFound(path.to_owned()))?;
        if !self.tree.get(id)?.is_empty() {
            return Err(Error::NotEmpty(path.to_owned()));
        }

        let clusters = self.volume.owned_clusters(id)?;
        self.volume.remove_entry(parent, id)?;
        self.volume.write_inode(id, DiskInode::default())?;
        self.volume.free_clusters(&clusters)?;
        self.tree.detach_dir(id)?;
        self.volume.flush()?;

        if self.cwd == id {
            self.cwd = parent;
        }
        debug!("rmdir {path:?}: inode {id}, clusters {clusters:?}");
        Ok(())
    }

    pub fn list(&self, path: &str) -> Result<Listing> {
        let dir = self.tree.get(self.tree.resolve(self.cwd, path)?)?;
        fn names(items: &[DirItem]) -> Vec<String> {
            items.iter().map(|item| item.name.clone()).collect()
        }

        Ok(Listing {
            directories: names(&dir.subdirs),
            files: names(&dir.files),
        })
    }

    pub fn change_directory(&mut self, path: &str) -> Result<()> {
        self.cwd = self.tree.resolve(self.cwd, path)?;
        Ok(())
    }

    /// 当前目录的绝对路径
    pub fn working_directory(&self) -> Result<String> {
        self.tree.path_of(self.cwd)
    }

    /// 路径可以指向目录，也可以指向目录下的文件
    pub fn stat(&self, path: &str) -> Result<Stat> {
        let id = match self.tree.resolve(self.cwd, path) {
            Ok(id) => id,
            Err(Error::PathNotFound(_)) => self.find_file(path)?,
            Err(err) => return Err(err),
        };

        let inode = self.volume.inode(id)?;
        Ok(Stat {
            inode: id,
            kind: inode.kind.into(),
            links: inode.links,
            size: inode.size,
            blocks: inode.data_blocks(self.volume.image())?,
            indirect_blocks: inode.indirect_blocks().collect(),
        })
    }

    /// 检查磁盘结构，并确认内存中的目录树与磁盘一致
    pub fn check(&self) -> Result<()> {
        self.volume.check()?;
        if !DirTree::load(&self.volume)?.same_shape(&self.tree) {
            return Err(Error::Corruption(String::from(
                "directory tree differs from the image",
            )));
        }
        Ok(())
    }
}

impl FileSystem {
    /// 拆出父目录与合法的最终名字
    fn split<'a>(&self, path: &'a str) -> Result<(InodeId, &'a str)> {
        let (parent, name) = path
            .parent_file()
            .ok_or_else(|| Error::InvalidName(path.to_owned()))?;
        DirEntry::validate_name(name)?;
        Ok((self.tree.resolve(self.cwd, parent)?, name))
    }

    fn find_file(&self, path: &str) -> Result<InodeId> {
        let (parent, name) = path
            .parent_file()
            .ok_or_else(|| Error::PathNotFound(path.to_owned()))?;
        let parent = self.tree.resolve(self.cwd, parent)?;
        self.tree
            .find_file(parent, name)
            .map(|item| item.inode)
            .ok_or_else(|| Error::PathNotFound(path.to_owned()))
    }
}

impl From<DiskInodeKind> for StatKind {
    #[inline]
    fn from(kind: DiskInodeKind) -> Self {
        match kind {
            DiskInodeKind::Directory => Self::DIR,
            DiskInodeKind::File => Self::FILE,
        }
    }
}
