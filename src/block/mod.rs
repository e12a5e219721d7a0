//! ブロック(割当の最小単位)関連の構成要素.
//!
//! 両アロケータが共通して利用する[`BlockId`]と[`BlockStore`]を提供する.
//!
//! [`BlockId`]: ./struct.BlockId.html
//! [`BlockStore`]: ./struct.BlockStore.html
use std::fmt;

pub use self::store::{BlockStore, FreeBlocks};

mod store;

/// シミュレートされたディスク上のブロックの番号.
///
/// 先頭ブロックが`0`となる.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockId(u32);
impl BlockId {
    /// 新しい`BlockId`インスタンスを生成する.
    ///
    /// # Examples
    ///
    /// ```
    /// use allocsim::block::BlockId;
    ///
    /// assert_eq!(BlockId::new(3).as_u32(), 3);
    /// assert_eq!(BlockId::new(3).as_usize(), 3);
    /// ```
    pub fn new(id: u32) -> Self {
        BlockId(id)
    }

    /// ブロック番号を`u32`として返す.
    pub fn as_u32(self) -> u32 {
        self.0
    }

    /// ブロック番号を、テーブルの添字として使える`usize`として返す.
    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}
impl From<u32> for BlockId {
    fn from(from: u32) -> Self {
        BlockId(from)
    }
}
impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
