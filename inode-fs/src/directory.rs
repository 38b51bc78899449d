//! # 目录项存储层
//!
//! 目录的数据簇被切分为定长槽位。插入时优先复用空槽位，
//! 其次依次通过直接索引、已有索引块、新建索引块扩充一个簇；
//! 删除后若某个簇不再有任何目录项，且它不是目录的第一个簇，就把它归还。

use log::debug;

use crate::layout::{DirEntry, DiskInode, IndirectBlock};
use crate::volume::Volume;
use crate::{ClusterId, Error, InodeId, Result, CLUSTER_SIZE};

impl Volume {
    /// 目录下所有有效的目录项，按存储顺序
    pub fn dir_entries(&self, dir: InodeId) -> Result<Vec<DirEntry>> {
        let inode = self.inode(dir)?;
        let mut entries = Vec::new();
        for cluster in inode.data_blocks(self.image())? {
            let data = self.image().read_cluster(cluster)?;
            entries.extend(DirEntry::slots(&data).filter(|entry| !entry.is_empty()));
        }
        Ok(entries)
    }

    pub fn insert_entry(&mut self, dir: InodeId, entry: &DirEntry) -> Result<()> {
        let mut inode = self.inode(dir)?.clone();

        for cluster in inode.data_blocks(self.image())? {
            let data = self.image().read_cluster(cluster)?;
            if let Some(slot) = DirEntry::slots(&data).position(|slot| slot.is_empty()) {
                let offset = self.image().cluster_offset(cluster)? + DirEntry::offset(slot) as u64;
                return self.image().write(offset, &entry.encode());
            }
        }

        // 所有槽位都已占满：新簇的第一个槽位放入目录项，其余为零
        let mut data = [0; CLUSTER_SIZE];
        entry.store(&mut data, 0);

        if let Some(pointer) = inode.direct.iter_mut().find(|pointer| pointer.is_none()) {
            let cluster = self.find_free_cluster()?;
            self.image().write_cluster(cluster, &data)?;
            self.mark_used(&[cluster])?;
            *pointer = Some(cluster);
            debug!("directory {dir}: cluster {cluster} attached directly");
            return self.write_inode(dir, inode);
        }

        let tables: Vec<ClusterId> = inode.indirect_blocks().collect();
        for table_id in tables {
            let mut table = self.image().read_indirect(table_id)?;
            if table.is_full() {
                continue;
            }

            let cluster = self.find_free_cluster()?;
            let Some(index) = table.push(cluster) else {
                continue;
            };
            self.image().write_cluster(cluster, &data)?;
            self.mark_used(&[cluster])?;
            let offset =
                self.image().cluster_offset(table_id)? + IndirectBlock::entry_offset(index);
            self.image().write_i32(offset, ClusterId::encode(Some(cluster)))?;
            debug!("directory {dir}: cluster {cluster} appended to indirect block {table_id}");
            return self.write_inode(dir, inode);
        }

        let Some(pointer) = inode.indirect.iter_mut().find(|pointer| pointer.is_none()) else {
            return Err(Error::DirectoryFull);
        };
        let clusters = self.find_free_clusters(2)?;
        let (cluster, table_id) = (clusters[0], clusters[1]);

        let mut table = IndirectBlock::default();
        table.push(cluster);
        self.image().write_cluster(cluster, &data)?;
        self.image().write_indirect(table_id, &table)?;
        self.mark_used(&clusters)?;
        *pointer = Some(table_id);
        debug!("directory {dir}: cluster {cluster} attached through new indirect block {table_id}");
        self.write_inode(dir, inode)
    }

    /// 清空指向 `child` 的槽位，并回收因此变空的簇
    pub fn remove_entry(&mut self, dir: InodeId, child: InodeId) -> Result<()> {
        let mut inode = self.inode(dir)?.clone();

        for cluster in inode.data_blocks(self.image())? {
            let mut data = self.image().read_cluster(cluster)?;
            let slot = DirEntry::slots(&data).position(|slot| slot.inode_id() == Some(child));
            let Some(slot) = slot else {
                continue;
            };

            let empty = DirEntry::default();
            empty.store(&mut data, slot);
            let offset = self.image().cluster_offset(cluster)? + DirEntry::offset(slot) as u64;
            self.image().write(offset, &empty.encode())?;

            // 目录的第一个簇永不归还
            let resident = inode.direct[0] == Some(cluster);
            if resident || DirEntry::slots(&data).any(|slot| !slot.is_empty()) {
                return Ok(());
            }

            let freed = self.detach(&mut inode, cluster)?;
            self.write_inode(dir, inode)?;
            self.free_clusters(&freed)?;
            debug!("directory {dir}: released clusters {freed:?}");
            return Ok(());
        }

        Err(Error::PathNotFound(format!(
            "inode {child} in directory {dir}"
        )))
    }

    /// 解除 inode 对 `cluster` 的引用，返回需要归还的簇：
    /// 该簇本身，以及因此变空的索引块
    fn detach(&self, inode: &mut DiskInode, cluster: ClusterId) -> Result<Vec<ClusterId>> {
        if let Some(pointer) = inode.direct.iter_mut().find(|pointer| **pointer == Some(cluster)) {
            *pointer = None;
            return Ok(vec![cluster]);
        }

        for pointer in &mut inode.indirect {
            let Some(table_id) = *pointer else {
                continue;
            };
            let mut table = self.image().read_indirect(table_id)?;
            if !table.remove(cluster) {
                continue;
            }

            if table.is_empty() {
                *pointer = None;
                return Ok(vec![cluster, table_id]);
            }
            self.image().write_indirect(table_id, &table)?;
            return Ok(vec![cluster]);
        }

        Err(Error::Corruption(format!(
            "cluster {cluster} is not referenced by its directory"
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::MemoryDevice;

    use super::*;
    use crate::layout::DIRECT_COUNT;

    const PER_CLUSTER: usize = DirEntry::PER_CLUSTER;

    fn volume(size: u64) -> Volume {
        Volume::format(Arc::new(MemoryDevice::new()), size).unwrap()
    }

    fn entry(i: usize) -> DirEntry {
        DirEntry::new(&format!("d{i}"), InodeId::new(i as u32 + 1))
    }

    fn fill(volume: &mut Volume, range: std::ops::Range<usize>) {
        for i in range {
            volume.insert_entry(InodeId::ROOT, &entry(i)).unwrap();
        }
    }

    #[test]
    fn first_empty_slot_is_reused() {
        let mut volume = volume(1 << 20);
        fill(&mut volume, 0..3);
        volume.remove_entry(InodeId::ROOT, InodeId::new(2)).unwrap();

        volume
            .insert_entry(InodeId::ROOT, &DirEntry::new("new", InodeId::new(9)))
            .unwrap();
        let names: Vec<_> = volume
            .dir_entries(InodeId::ROOT)
            .unwrap()
            .iter()
            .map(DirEntry::name)
            .collect();
        assert_eq!(vec!["d0", "new", "d2"], names);
    }

    #[test]
    fn grows_through_direct_then_indirect() {
        let mut volume = volume(8 << 20);
        fill(&mut volume, 0..PER_CLUSTER);
        assert_eq!(None, volume.inode(InodeId::ROOT).unwrap().direct[1]);

        fill(&mut volume, PER_CLUSTER..PER_CLUSTER + 1);
        let root = volume.inode(InodeId::ROOT).unwrap();
        assert_eq!(Some(ClusterId::new(1)), root.direct[1]);

        fill(&mut volume, PER_CLUSTER + 1..DIRECT_COUNT * PER_CLUSTER + 1);
        let root = volume.inode(InodeId::ROOT).unwrap();
        assert!(root.direct.iter().all(Option::is_some));
        // 数据簇在前，索引块在后
        assert_eq!(Some(ClusterId::new(6)), root.indirect[0]);
        assert_eq!(DIRECT_COUNT + 1, root.data_blocks(volume.image()).unwrap().len());
        assert_eq!(
            DIRECT_COUNT * PER_CLUSTER + 1,
            volume.dir_entries(InodeId::ROOT).unwrap().len()
        );
        volume.check_clusters();
    }

    #[test]
    fn releases_emptied_clusters() {
        let mut volume = volume(8 << 20);
        let total = DIRECT_COUNT * PER_CLUSTER + 2;
        fill(&mut volume, 0..total);
        let used = volume.bitmap().clone();

        // 最后两项各自独占一个经索引块挂载的簇
        volume
            .remove_entry(InodeId::ROOT, InodeId::new(total as u32))
            .unwrap();
        let root = volume.inode(InodeId::ROOT).unwrap();
        assert!(root.indirect[0].is_some());
        assert_eq!(DIRECT_COUNT + 1, root.data_blocks(volume.image()).unwrap().len());

        volume
            .remove_entry(InodeId::ROOT, InodeId::new(total as u32 - 1))
            .unwrap();
        assert_eq!(None, volume.inode(InodeId::ROOT).unwrap().indirect[0]);
        assert_eq!(used.free_count() + 3, volume.bitmap().free_count());

        // 第一个簇即使清空也保留
        for i in 0..PER_CLUSTER {
            volume
                .remove_entry(InodeId::ROOT, InodeId::new(i as u32 + 1))
                .unwrap();
        }
        let root = volume.inode(InodeId::ROOT).unwrap();
        assert_eq!(Some(ClusterId::ROOT), root.direct[0]);
        assert_eq!(Some(ClusterId::new(1)), root.direct[1]);
        assert_eq!(
            (DIRECT_COUNT - 1) * PER_CLUSTER,
            volume.dir_entries(InodeId::ROOT).unwrap().len()
        );
        volume.check_clusters();
    }

    #[test]
    fn released_clusters_are_zeroed() {
        let mut volume = volume(1 << 20);
        fill(&mut volume, 0..PER_CLUSTER + 1);
        let cluster = ClusterId::new(1);
        assert!(volume.bitmap().is_used(cluster));

        volume
            .remove_entry(InodeId::ROOT, InodeId::new(PER_CLUSTER as u32 + 1))
            .unwrap();
        assert!(!volume.bitmap().is_used(cluster));
        assert_eq!([0; CLUSTER_SIZE], volume.image().read_cluster(cluster).unwrap());
    }

    #[test]
    fn missing_entry() {
        let mut volume = volume(1 << 20);
        fill(&mut volume, 0..2);
        assert!(matches!(
            volume.remove_entry(InodeId::ROOT, InodeId::new(42)),
            Err(Error::PathNotFound(_))
        ));
    }

    #[test]
    fn out_of_space() {
        // 最小镜像只有 21 个数据簇
        let mut volume = volume(crate::MIN_DISK_SIZE);
        let capacity = volume.bitmap().capacity();
        let clusters = volume.find_free_clusters(capacity - 1).unwrap();
        volume.mark_used(&clusters).unwrap();

        fill(&mut volume, 0..PER_CLUSTER);
        assert!(matches!(
            volume.insert_entry(InodeId::ROOT, &entry(PER_CLUSTER)),
            Err(Error::NoFreeBlocks)
        ));
    }

    #[test]
    fn directory_full() {
        let mut volume = volume(16 << 20);
        let mut full = [0; CLUSTER_SIZE];
        for slot in 0..PER_CLUSTER {
            entry(slot).store(&mut full, slot);
        }

        // 根目录的 5 个直接索引与 2 个索引块全部占满
        let last = (DIRECT_COUNT - 1 + 2 * 1024) as u32;
        for raw in 0..=last {
            volume
                .image()
                .write_cluster(ClusterId::new(raw), &full)
                .unwrap();
        }

        let mut root = volume.inode(InodeId::ROOT).unwrap().clone();
        for (i, pointer) in root.direct.iter_mut().enumerate() {
            *pointer = Some(ClusterId::new(i as u32));
        }
        let mut raw = DIRECT_COUNT as u32;
        for (i, pointer) in root.indirect.iter_mut().enumerate() {
            let mut table = IndirectBlock::default();
            while table.push(ClusterId::new(raw)).is_some() {
                raw += 1;
            }
            let table_id = ClusterId::new(3000 + i as u32);
            volume.image().write_indirect(table_id, &table).unwrap();
            *pointer = Some(table_id);
        }
        assert_eq!(last + 1, raw);
        volume.write_inode(InodeId::ROOT, root).unwrap();

        assert!(matches!(
            volume.insert_entry(InodeId::ROOT, &entry(0)),
            Err(Error::DirectoryFull)
        ));
    }

    impl Volume {
        /// 只核对簇的引用；这里的目录项并不对应真实的 inode
        fn check_clusters(&self) {
            let mut refs = vec![0; self.bitmap().capacity()];
            for cluster in self.owned_clusters(InodeId::ROOT).unwrap() {
                refs[cluster.index()] += 1;
            }
            for (index, refs) in refs.into_iter().enumerate() {
                assert_eq!(
                    refs == 1,
                    self.bitmap().is_used(ClusterId::new(index as u32)),
                    "cluster {index}"
                );
            }
        }
    }
}
