use crate::{Cluster, Error, InodeId, Result, CLUSTER_SIZE, NAME_MAX_LEN};

/// 文件系统项的元信息：子项 inode 编号 + 定长名字。
///
/// 目录的数据簇被切分为一个个这样的槽位，编号不大于 0 的槽位是空的。
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirEntry {
    inode_id: i32,
    // 不足部分补 0，满长时没有结尾的 0
    name: [u8; NAME_MAX_LEN],
}

impl DirEntry {
    /// 槽位宽度
    pub const SIZE: usize = 4 + NAME_MAX_LEN;
    /// 每簇槽位数，由槽位宽度与簇大小推出
    pub const PER_CLUSTER: usize = CLUSTER_SIZE / Self::SIZE;

    /// `name` 须先经过 [`DirEntry::validate_name`]
    pub fn new(name: &str, inode_id: InodeId) -> Self {
        let bytes = name.as_bytes();
        let mut name = [0; NAME_MAX_LEN];
        name[..bytes.len()].copy_from_slice(bytes);

        Self {
            inode_id: InodeId::encode(Some(inode_id)),
            name,
        }
    }

    pub fn validate_name(name: &str) -> Result<()> {
        let invalid = name.is_empty()
            || name == "."
            || name == ".."
            || name.len() > NAME_MAX_LEN
            || name.contains(['/', '\0']);

        if invalid {
            Err(Error::InvalidName(name.to_owned()))
        } else {
            Ok(())
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inode_id <= 0
    }

    pub fn inode_id(&self) -> Option<InodeId> {
        if self.is_empty() {
            None
        } else {
            InodeId::decode(self.inode_id)
        }
    }

    pub fn name(&self) -> String {
        let len = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(NAME_MAX_LEN);
        String::from_utf8_lossy(&self.name[..len]).into_owned()
    }

    /// 第 `slot` 个槽位在簇内的字节偏移
    #[inline]
    pub fn offset(slot: usize) -> usize {
        slot * Self::SIZE
    }

    pub fn encode(&self) -> [u8; Self::SIZE] {
        let mut buf = [0; Self::SIZE];
        buf[..4].copy_from_slice(&self.inode_id.to_le_bytes());
        buf[4..].copy_from_slice(&self.name);
        buf
    }

    pub fn decode(buf: &[u8]) -> Self {
        let mut name = [0; NAME_MAX_LEN];
        name.copy_from_slice(&buf[4..Self::SIZE]);

        Self {
            inode_id: i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            name,
        }
    }

    /// 依次解析簇内所有槽位，包括空槽位
    pub fn slots(cluster: &Cluster) -> impl Iterator<Item = Self> + '_ {
        cluster
            .chunks_exact(Self::SIZE)
            .take(Self::PER_CLUSTER)
            .map(Self::decode)
    }

    /// 写入第 `slot` 个槽位
    pub fn store(&self, cluster: &mut Cluster, slot: usize) {
        let start = Self::offset(slot);
        cluster[start..start + Self::SIZE].copy_from_slice(&self.encode());
    }
}
