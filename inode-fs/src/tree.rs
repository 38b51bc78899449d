//! # 目录树层
//!
//! 内存中的目录树：每个存活的目录 inode 对应一个 [`Directory`]，
//! 以 inode 编号为键存放，父子之间只通过编号互相引用。
//! 根目录是它自己的父目录，向上回溯到 `current == parent` 即到达根。

use std::collections::BTreeMap;

use crate::path::Path;
use crate::volume::Volume;
use crate::{Error, InodeId, Result};

/// 目录下的一项
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct DirItem {
    pub inode: InodeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    pub parent: InodeId,
    /// 自身在父目录中的那一项，根目录名为 `/`
    pub item: DirItem,
    pub subdirs: Vec<DirItem>,
    pub files: Vec<DirItem>,
}

impl Directory {
    fn new(parent: InodeId, item: DirItem) -> Self {
        Self {
            parent,
            item,
            subdirs: Vec::new(),
            files: Vec::new(),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.subdirs.is_empty() && self.files.is_empty()
    }

    /// 目录与文件共用同一个命名空间
    pub fn contains(&self, name: &str) -> bool {
        self.subdirs
            .iter()
            .chain(&self.files)
            .any(|item| item.name == name)
    }
}

#[derive(Debug, Clone)]
pub struct DirTree {
    dirs: BTreeMap<InodeId, Directory>,
}

impl Default for DirTree {
    fn default() -> Self {
        Self::new()
    }
}

impl DirTree {
    /// 只有根目录的树
    pub fn new() -> Self {
        let root = DirItem {
            inode: InodeId::ROOT,
            name: String::from("/"),
        };

        Self {
            dirs: BTreeMap::from([(InodeId::ROOT, Directory::new(InodeId::ROOT, root))]),
        }
    }

    /// 从根目录出发，逐层读出目录项重建整棵树。
    ///
    /// 目录项指向表外或空闲的 inode，或同一目录被到达两次，都视为损坏。
    pub fn load(volume: &Volume) -> Result<Self> {
        let root = volume.inode(InodeId::ROOT)?;
        if root.is_free() || !root.is_dir() {
            return Err(Error::Corruption(String::from(
                "root inode is not a directory",
            )));
        }

        let mut tree = Self::new();
        let mut pending = vec![InodeId::ROOT];
        while let Some(id) = pending.pop() {
            let mut subdirs = Vec::new();
            let mut files = Vec::new();

            for entry in volume.dir_entries(id)? {
                let Some(child) = entry.inode_id() else {
                    continue;
                };
                let item = DirItem {
                    inode: child,
                    name: entry.name(),
                };

                let inode = volume.inode(child)?;
                if inode.is_free() {
                    return Err(Error::Corruption(format!(
                        "entry {:?} in directory {id} references free inode {child}",
                        item.name
                    )));
                }
                if !inode.is_dir() {
                    files.push(item);
                    continue;
                }

                if tree.dirs.contains_key(&child) {
                    return Err(Error::Corruption(format!(
                        "directory {child} is reachable more than once"
                    )));
                }
                tree.dirs.insert(child, Directory::new(id, item.clone()));
                subdirs.push(item);
                pending.push(child);
            }

            let dir = tree.get_mut(id)?;
            dir.subdirs = subdirs;
            dir.files = files;
        }

        Ok(tree)
    }

    /// 树中的目录数，包括根目录
    pub fn dir_count(&self) -> usize {
        self.dirs.len()
    }

    pub fn get(&self, id: InodeId) -> Result<&Directory> {
        self.dirs
            .get(&id)
            .ok_or_else(|| Error::Corruption(format!("directory {id} is not in the tree")))
    }

    fn get_mut(&mut self, id: InodeId) -> Result<&mut Directory> {
        self.dirs
            .get_mut(&id)
            .ok_or_else(|| Error::Corruption(format!("directory {id} is not in the tree")))
    }

    pub fn find_subdir(&self, dir: InodeId, name: &str) -> Option<InodeId> {
        self.dirs
            .get(&dir)?
            .subdirs
            .iter()
            .find(|item| item.name == name)
            .map(|item| item.inode)
    }

    pub fn find_file(&self, dir: InodeId, name: &str) -> Option<&DirItem> {
        self.dirs
            .get(&dir)?
            .files
            .iter()
            .find(|item| item.name == name)
    }

    /// 绝对路径从根目录出发，相对路径从 `cwd` 出发；
    /// `.` 原地不动，`..` 走向父目录，其余部分必须是子目录的名字
    pub fn resolve(&self, cwd: InodeId, path: &str) -> Result<InodeId> {
        let mut current = if path.is_relative() {
            cwd
        } else {
            InodeId::ROOT
        };

        for name in path.components() {
            current = match name {
                "." => current,
                ".." => self.get(current)?.parent,
                name => self
                    .find_subdir(current, name)
                    .ok_or_else(|| Error::PathNotFound(path.to_owned()))?,
            };
        }

        Ok(current)
    }

    pub fn attach_dir(&mut self, parent: InodeId, item: DirItem) -> Result<()> {
        self.get_mut(parent)?.subdirs.push(item.clone());
        self.dirs.insert(item.inode, Directory::new(parent, item));
        Ok(())
    }

    /// 从树中摘下一个（空）目录
    pub fn detach_dir(&mut self, id: InodeId) -> Result<Directory> {
        let dir = self
            .dirs
            .remove(&id)
            .ok_or_else(|| Error::Corruption(format!("directory {id} is not in the tree")))?;
        self.get_mut(dir.parent)?
            .subdirs
            .retain(|item| item.inode != id);
        Ok(dir)
    }

    /// 自 `id` 向上回溯到根目录得到的绝对路径
    pub fn path_of(&self, id: InodeId) -> Result<String> {
        let mut names = Vec::new();
        let mut current = id;
        loop {
            let dir = self.get(current)?;
            if dir.parent == current {
                break;
            }
            if names.len() >= self.dirs.len() {
                return Err(Error::Corruption(format!(
                    "directory {id} never reaches the root"
                )));
            }
            names.push(dir.item.name.as_str());
            current = dir.parent;
        }

        if names.is_empty() {
            return Ok(String::from("/"));
        }
        Ok(names.iter().rev().fold(String::new(), |mut path, name| {
            path.push('/');
            path.push_str(name);
            path
        }))
    }

    /// 两棵树是否描述同一组目录：子项的顺序不计
    pub fn same_shape(&self, other: &Self) -> bool {
        fn sorted(items: &[DirItem]) -> Vec<&DirItem> {
            let mut items: Vec<_> = items.iter().collect();
            items.sort();
            items
        }

        self.dirs.len() == other.dirs.len()
            && self.dirs.iter().all(|(id, dir)| {
                other.dirs.get(id).is_some_and(|that| {
                    dir.parent == that.parent
                        && dir.item == that.item
                        && sorted(&dir.subdirs) == sorted(&that.subdirs)
                        && sorted(&dir.files) == sorted(&that.files)
                })
            })
    }
}
