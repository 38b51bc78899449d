use log::debug;

use crate::image::Image;
use crate::{ClusterId, Error, Result};

/// 数据块位图：每个数据簇一字节，0 为空闲，1 为已用。
///
/// 内存中保留一份镜像，每次标记都同步写回磁盘。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bits: Vec<u8>,
}

impl Bitmap {
    /// 全部空闲的位图
    #[inline]
    pub fn new(capacity: usize) -> Self {
        Self {
            bits: vec![0; capacity],
        }
    }

    #[inline]
    pub fn load(image: &Image) -> Result<Self> {
        image.read_bitmap().map(|bits| Self { bits })
    }

    /// 位图所指示区域的总簇数
    #[inline]
    pub fn capacity(&self) -> usize {
        self.bits.len()
    }

    #[inline]
    pub fn is_used(&self, id: ClusterId) -> bool {
        self.bits.get(id.index()).is_some_and(|&bit| bit != 0)
    }

    pub fn free_count(&self) -> usize {
        self.bits.iter().skip(1).filter(|&&bit| bit == 0).count()
    }

    /// 从下标 1 开始线性扫描（0 号簇留给根目录），按扫描顺序收集 `count` 个空闲簇。
    /// 只查找，不标记。
    pub fn find_free(&self, count: usize) -> Result<Vec<ClusterId>> {
        let free: Vec<ClusterId> = self
            .bits
            .iter()
            .enumerate()
            .skip(1)
            .filter(|&(_, &bit)| bit == 0)
            .map(|(index, _)| ClusterId::new(index as u32))
            .take(count)
            .collect();

        if free.len() < count {
            return Err(Error::NoFreeBlocks);
        }
        Ok(free)
    }

    /// 标记一批簇并写回磁盘。
    /// 重复分配或重复释放意味着磁盘结构已不一致。
    pub fn mark(&mut self, image: &Image, ids: &[ClusterId], used: bool) -> Result<()> {
        for &id in ids {
            let Some(bit) = self.bits.get_mut(id.index()) else {
                return Err(Error::Corruption(format!(
                    "cluster {id} is outside the bitmap"
                )));
            };
            if (*bit != 0) == used {
                return Err(Error::Corruption(format!(
                    "cluster {id} is already {}",
                    if used { "used" } else { "free" }
                )));
            }

            *bit = u8::from(used);
            image.write_bitmap(id, used)?;
        }

        debug!("bitmap: {ids:?} marked {}", if used { "used" } else { "free" });
        Ok(())
    }
}
