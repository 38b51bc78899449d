use derive_more::{Display, From, Into};

/// 磁盘上 inode 编号与块指针共用的空闲标记
pub(crate) const FREE: i32 = -1;

/// 数据区内的簇编号，从数据区起点算起。
///
/// 簇编号是各磁盘结构之间唯一的引用方式。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[repr(transparent)]
pub struct ClusterId(u32);

impl ClusterId {
    /// 根目录的第一个簇，格式化时就被占用
    pub const ROOT: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// 解析磁盘上的块指针，负数表示空指针
    #[inline]
    pub(crate) fn decode(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    #[inline]
    pub(crate) fn encode(id: Option<Self>) -> i32 {
        id.map_or(FREE, |id| id.0 as i32)
    }
}

/// inode 编号，即其在 inode 表中的下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, From, Into)]
#[repr(transparent)]
pub struct InodeId(u32);

impl InodeId {
    pub const ROOT: Self = Self(0);

    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    #[inline]
    pub(crate) fn decode(raw: i32) -> Option<Self> {
        u32::try_from(raw).ok().map(Self)
    }

    #[inline]
    pub(crate) fn encode(id: Option<Self>) -> i32 {
        id.map_or(FREE, |id| id.0 as i32)
    }
}
