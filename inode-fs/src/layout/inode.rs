//! 块编址
//! - 直接索引：inode 内的 5 个块编号，各指向一个**数据块**
//! - 一级索引：inode 内的 2 个块编号，各指向一个**索引块**，
//!   索引块连续存储块编号，每个编号都指向一个数据块
//!
//! 两个间接指针都只有一级，不存在指向索引块的索引块。
//!
//! 目录的空间用于存放子项的元信息，其块数靠扫描指针直到空指针得出；
//! 文件的空间用于存放它的数据，其块数由文件大小算出。

use crate::image::Image;
use crate::{ClusterId, Error, InodeId, Result, CLUSTER_SIZE};

/// 直接索引个数
pub const DIRECT_COUNT: usize = 5;
/// 间接索引个数
pub const INDIRECT_COUNT: usize = 2;
/// 索引块的编号容量
const POINTERS_PER_CLUSTER: usize = CLUSTER_SIZE / 4;
/// 一个 inode 最多能编址的数据块数
const MAX_BLOCKS: usize = DIRECT_COUNT + INDIRECT_COUNT * POINTERS_PER_CLUSTER;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskInode {
    /// 自身编号，空闲时为空
    pub id: Option<InodeId>,
    pub kind: DiskInodeKind,
    /// 引用计数
    pub links: u8,
    /// 文件大小（字节），对目录没有意义
    pub size: u32,
    pub direct: [Option<ClusterId>; DIRECT_COUNT],
    pub indirect: [Option<ClusterId>; INDIRECT_COUNT],
}

#[derive(Debug, Default, PartialEq, Eq, Clone, Copy)]
pub enum DiskInodeKind {
    #[default]
    File,
    Directory,
}

impl Default for DiskInode {
    /// 空闲 inode：所有字段都是空闲值
    fn default() -> Self {
        Self {
            id: None,
            kind: DiskInodeKind::File,
            links: 0,
            size: 0,
            direct: [None; DIRECT_COUNT],
            indirect: [None; INDIRECT_COUNT],
        }
    }
}

impl DiskInode {
    /// 磁盘上每条记录的宽度，末尾两字节留空
    pub const SIZE: usize = 40;

    #[inline]
    pub fn init(&mut self, id: InodeId, kind: DiskInodeKind) {
        *self = Self {
            id: Some(id),
            kind,
            links: 1,
            ..Default::default()
        }
    }

    #[inline]
    pub fn is_free(&self) -> bool {
        self.id.is_none()
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind == DiskInodeKind::Directory
    }

    /// 按固定顺序给出 inode 拥有的数据块：直接索引，一级索引块1，一级索引块2
    pub fn data_blocks(&self, image: &Image) -> Result<Vec<ClusterId>> {
        if self.is_dir() {
            self.scan_blocks(image)
        } else {
            self.slice_blocks(image)
        }
    }

    /// 索引块自身占用的簇
    pub fn indirect_blocks(&self) -> impl Iterator<Item = ClusterId> + '_ {
        self.indirect.iter().flatten().copied()
    }

    /// 计算容纳指定数据量需要多少个**数据块**
    #[inline]
    pub fn count_data_block(size: u32) -> usize {
        (size as usize).div_ceil(CLUSTER_SIZE)
    }

    /// 目录：跳过空的直接索引，索引块内读到 0 为止
    fn scan_blocks(&self, image: &Image) -> Result<Vec<ClusterId>> {
        let mut blocks: Vec<ClusterId> = self.direct.iter().flatten().copied().collect();
        for table in self.indirect_blocks() {
            blocks.extend(image.read_indirect(table)?.entries()?);
        }
        Ok(blocks)
    }

    /// 文件：块数由大小决定，指针必须恰好填满这么多
    fn slice_blocks(&self, image: &Image) -> Result<Vec<ClusterId>> {
        let count = Self::count_data_block(self.size);
        if count > MAX_BLOCKS {
            return Err(self.corrupted(format!(
                "size {} needs {count} blocks, at most {MAX_BLOCKS} are addressable",
                self.size
            )));
        }

        let mut blocks = Vec::with_capacity(count);
        for pointer in self.direct.iter().take(count) {
            blocks.push(pointer.ok_or_else(|| self.corrupted("missing direct pointer"))?);
        }

        for pointer in &self.indirect {
            let rest = count - blocks.len();
            if rest == 0 {
                break;
            }

            let table = pointer.ok_or_else(|| self.corrupted("missing indirect pointer"))?;
            let entries = image.read_indirect(table)?.entries()?;
            if entries.len() < rest.min(POINTERS_PER_CLUSTER) {
                return Err(self.corrupted(format!(
                    "indirect block {table} holds {} of the expected pointers",
                    entries.len()
                )));
            }
            blocks.extend(entries.into_iter().take(rest));
        }

        Ok(blocks)
    }

    fn corrupted(&self, reason: impl AsRef<str>) -> Error {
        let id = self.id.map_or(String::from("?"), |id| id.to_string());
        Error::Corruption(format!("inode {id}: {}", reason.as_ref()))
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        buf[0..4].copy_from_slice(&InodeId::encode(self.id).to_le_bytes());
        buf[4] = u8::from(self.is_dir());
        buf[5] = self.links;
        buf[6..10].copy_from_slice(&self.size.to_le_bytes());

        let pointers = self.direct.iter().chain(&self.indirect);
        for (chunk, &pointer) in buf[10..38].chunks_exact_mut(4).zip(pointers) {
            chunk.copy_from_slice(&ClusterId::encode(pointer).to_le_bytes());
        }

        buf
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut pointers = buf[10..38]
            .chunks_exact(4)
            .map(|chunk| ClusterId::decode(read_i32(chunk)));
        let mut direct = [None; DIRECT_COUNT];
        let mut indirect = [None; INDIRECT_COUNT];
        for slot in direct.iter_mut().chain(indirect.iter_mut()) {
            *slot = pointers.next().flatten();
        }

        Self {
            id: InodeId::decode(read_i32(&buf[0..4])),
            kind: if buf[4] != 0 {
                DiskInodeKind::Directory
            } else {
                DiskInodeKind::File
            },
            links: buf[5],
            size: u32::from_le_bytes([buf[6], buf[7], buf[8], buf[9]]),
            direct,
            indirect,
        }
    }
}

#[inline]
fn read_i32(chunk: &[u8]) -> i32 {
    i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]])
}

/// 间接索引块：整簇的 `i32` 块编号，第一个 0 之后都视为空。
///
/// 第 0 簇永远属于根目录，所以 0 不会是合法的表项。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndirectBlock([i32; POINTERS_PER_CLUSTER]);

impl Default for IndirectBlock {
    fn default() -> Self {
        Self([0; POINTERS_PER_CLUSTER])
    }
}

impl IndirectBlock {
    /// 有效表项个数
    pub fn len(&self) -> usize {
        self.0.iter().position(|&raw| raw == 0).unwrap_or(POINTERS_PER_CLUSTER)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.len() == POINTERS_PER_CLUSTER
    }

    /// 表项在块内的字节偏移
    #[inline]
    pub fn entry_offset(index: usize) -> u64 {
        (index * 4) as u64
    }

    pub fn entries(&self) -> Result<Vec<ClusterId>> {
        self.0[..self.len()]
            .iter()
            .map(|&raw| {
                ClusterId::decode(raw).ok_or_else(|| {
                    Error::Corruption(format!("negative pointer {raw} in indirect block"))
                })
            })
            .collect()
    }

    /// 追加到第一个空位，返回其下标；块已满时返回空
    pub fn push(&mut self, id: ClusterId) -> Option<usize> {
        let index = self.len();
        let slot = self.0.get_mut(index)?;
        *slot = ClusterId::encode(Some(id));
        Some(index)
    }

    /// 移除表项，并用最后一个表项填补空洞，保证 0 之前没有空位
    pub fn remove(&mut self, id: ClusterId) -> bool {
        let len = self.len();
        let raw = ClusterId::encode(Some(id));
        let Some(index) = self.0[..len].iter().position(|&entry| entry == raw) else {
            return false;
        };
        self.0.swap(index, len - 1);
        self.0[len - 1] = 0;
        true
    }

    pub fn encode(&self) -> [u8; CLUSTER_SIZE] {
        let mut buf = [0; CLUSTER_SIZE];
        for (chunk, raw) in buf.chunks_exact_mut(4).zip(self.0) {
            chunk.copy_from_slice(&raw.to_le_bytes());
        }
        buf
    }

    pub fn decode(buf: &[u8; CLUSTER_SIZE]) -> Self {
        let mut block = Self::default();
        for (raw, chunk) in block.0.iter_mut().zip(buf.chunks_exact(4)) {
            *raw = read_i32(chunk);
        }
        block
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use block_dev::{BlockDevice, MemoryDevice};

    use super::*;
    use crate::layout::SuperBlock;

    fn image() -> Image {
        let sb = SuperBlock::layout(1 << 20).unwrap();
        let dev = Arc::new(MemoryDevice::new());
        dev.reset(sb.image_len()).unwrap();
        Image::new(dev, sb)
    }

    fn file(size: u32) -> DiskInode {
        let mut inode = DiskInode::default();
        inode.init(InodeId::new(3), DiskInodeKind::File);
        inode.size = size;
        inode
    }

    #[test]
    fn record_layout() {
        let mut inode = DiskInode::default();
        inode.init(InodeId::new(7), DiskInodeKind::Directory);
        inode.direct[0] = Some(ClusterId::new(9));
        inode.indirect[1] = Some(ClusterId::new(11));

        let buf = inode.encode();
        assert_eq!(7i32.to_le_bytes(), buf[0..4]);
        assert_eq!(1, buf[4]);
        assert_eq!(1, buf[5]);
        assert_eq!(9i32.to_le_bytes(), buf[10..14]);
        assert_eq!((-1i32).to_le_bytes(), buf[14..18]);
        assert_eq!((-1i32).to_le_bytes(), buf[30..34]);
        assert_eq!(11i32.to_le_bytes(), buf[34..38]);
        assert_eq!(inode, DiskInode::decode(&buf));
    }

    #[test]
    fn free_record() {
        let buf = DiskInode::default().encode();
        assert_eq!((-1i32).to_le_bytes(), buf[0..4]);
        assert!(DiskInode::decode(&buf).is_free());
    }

    #[test]
    fn file_blocks_follow_size() {
        let image = image();
        let mut inode = file(0);
        assert!(inode.data_blocks(&image).unwrap().is_empty());

        inode.size = CLUSTER_SIZE as u32 + 1;
        inode.direct[0] = Some(ClusterId::new(4));
        inode.direct[1] = Some(ClusterId::new(2));
        // 多余的指针不属于文件
        inode.direct[2] = Some(ClusterId::new(8));
        assert_eq!(
            vec![ClusterId::new(4), ClusterId::new(2)],
            inode.data_blocks(&image).unwrap()
        );
    }

    #[test]
    fn file_blocks_through_indirect() {
        let image = image();
        let mut inode = file(7 * CLUSTER_SIZE as u32);
        for (i, slot) in inode.direct.iter_mut().enumerate() {
            *slot = Some(ClusterId::new(i as u32 + 1));
        }

        let mut table = IndirectBlock::default();
        table.push(ClusterId::new(20));
        table.push(ClusterId::new(21));
        table.push(ClusterId::new(22));
        image.write_indirect(ClusterId::new(10), &table).unwrap();
        inode.indirect[0] = Some(ClusterId::new(10));

        let blocks = inode.data_blocks(&image).unwrap();
        assert_eq!(7, blocks.len());
        assert_eq!(&[ClusterId::new(20), ClusterId::new(21)], &blocks[5..]);
    }

    #[test]
    fn file_with_missing_pointer_is_corrupted() {
        let image = image();
        let mut inode = file(2 * CLUSTER_SIZE as u32);
        inode.direct[0] = Some(ClusterId::new(1));
        assert!(matches!(
            inode.data_blocks(&image),
            Err(Error::Corruption(_))
        ));

        let mut inode = file(6 * CLUSTER_SIZE as u32);
        inode.direct = [Some(ClusterId::new(1)); DIRECT_COUNT];
        inode.indirect[0] = Some(ClusterId::new(10));
        // 索引块全零：缺一个表项
        assert!(matches!(
            inode.data_blocks(&image),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn directory_scan_skips_holes_and_stops_at_zero() {
        let image = image();
        let mut inode = DiskInode::default();
        inode.init(InodeId::new(1), DiskInodeKind::Directory);
        inode.direct[0] = Some(ClusterId::new(3));
        inode.direct[3] = Some(ClusterId::new(5));

        let mut table = IndirectBlock::default();
        table.push(ClusterId::new(12));
        image.write_indirect(ClusterId::new(6), &table).unwrap();
        inode.indirect[1] = Some(ClusterId::new(6));

        assert_eq!(
            vec![ClusterId::new(3), ClusterId::new(5), ClusterId::new(12)],
            inode.data_blocks(&image).unwrap()
        );
        assert_eq!(vec![ClusterId::new(6)], inode.indirect_blocks().collect::<Vec<_>>());
    }

    #[test]
    fn pointer_outside_data_region() {
        let image = image();
        let mut inode = DiskInode::default();
        inode.init(InodeId::new(1), DiskInodeKind::Directory);
        inode.indirect[0] = Some(ClusterId::new(u32::MAX >> 1));
        assert!(matches!(
            inode.data_blocks(&image),
            Err(Error::Corruption(_))
        ));
    }

    #[test]
    fn indirect_remove_fills_hole() {
        let mut table = IndirectBlock::default();
        for raw in 1..=4 {
            table.push(ClusterId::new(raw));
        }
        assert!(table.remove(ClusterId::new(2)));
        assert!(!table.remove(ClusterId::new(2)));
        assert_eq!(
            vec![ClusterId::new(1), ClusterId::new(4), ClusterId::new(3)],
            table.entries().unwrap()
        );

        for raw in [1, 3, 4] {
            assert!(table.remove(ClusterId::new(raw)));
        }
        assert!(table.is_empty());
    }

    #[test]
    fn indirect_capacity() {
        let mut table = IndirectBlock::default();
        for raw in 1..=POINTERS_PER_CLUSTER as u32 {
            assert_eq!(Some(raw as usize - 1), table.push(ClusterId::new(raw)));
        }
        assert!(table.is_full());
        assert_eq!(None, table.push(ClusterId::new(9999)));
    }
}
