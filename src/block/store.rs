use std::iter::Enumerate;
use std::slice;

use super::BlockId;
use crate::{ErrorKind, Result};

/// 固定長のブロック列の使用状況を管理するための構造体.
///
/// 各ブロックは「空き」か「使用中」のいずれかの状態を取る.
/// どのファイルがブロックを使用しているか、といった情報は保持せず、
/// それらはアロケータ側のメタデータ(FATやインデックスブロック)から導出される.
///
/// 空きブロック数は常に保持されているので、容量の検査は`O(1)`で行える.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStore {
    used: Vec<bool>,
    free_count: u32,
}
impl BlockStore {
    /// 全ブロックが空きの状態の`BlockStore`を生成する.
    pub fn new(capacity: u32) -> Self {
        BlockStore {
            used: vec![false; capacity as usize],
            free_count: capacity,
        }
    }

    /// ブロックの総数を返す.
    pub fn capacity(&self) -> u32 {
        self.used.len() as u32
    }

    /// 空きブロックの数を返す.
    pub fn free_count(&self) -> u32 {
        self.free_count
    }

    /// 使用中のブロックの数を返す.
    pub fn used_count(&self) -> u32 {
        self.capacity() - self.free_count
    }

    /// `count`個のブロックを割り当てられるだけの空きがあるかどうかを判定する.
    pub fn has_room_for(&self, count: u32) -> bool {
        count <= self.free_count
    }

    /// `id`がこのストアの範囲内のブロックかどうかを判定する.
    pub fn contains(&self, id: BlockId) -> bool {
        id.as_usize() < self.used.len()
    }

    /// `id`のブロックが空きかどうかを判定する.
    ///
    /// 範囲外のブロックに対しては`false`を返す.
    pub fn is_free(&self, id: BlockId) -> bool {
        self.used.get(id.as_usize()).map_or(false, |used| !used)
    }

    /// 空きブロックを番号の昇順に走査するイテレータを返す.
    pub fn free_blocks(&self) -> FreeBlocks {
        FreeBlocks(self.used.iter().enumerate())
    }

    /// `id`のブロックを使用中にする.
    ///
    /// # Errors
    ///
    /// 範囲外のブロックや、既に使用中のブロックが指定された場合には、
    /// 種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub fn occupy(&mut self, id: BlockId) -> Result<()> {
        track_assert!(self.contains(id), ErrorKind::InconsistentState; id);
        track_assert!(!self.used[id.as_usize()], ErrorKind::InconsistentState; id);
        self.used[id.as_usize()] = true;
        self.free_count -= 1;
        Ok(())
    }

    /// `id`のブロックを空きに戻す.
    ///
    /// # Errors
    ///
    /// 範囲外のブロックや、既に空きのブロックが指定された場合には、
    /// 種類が`ErrorKind::InconsistentState`のエラーが返される.
    pub fn release(&mut self, id: BlockId) -> Result<()> {
        track_assert!(self.contains(id), ErrorKind::InconsistentState; id);
        track_assert!(self.used[id.as_usize()], ErrorKind::InconsistentState; id);
        self.used[id.as_usize()] = false;
        self.free_count += 1;
        Ok(())
    }
}

/// 空きブロックを昇順に列挙するためのイテレータ.
#[derive(Debug)]
pub struct FreeBlocks<'a>(Enumerate<slice::Iter<'a, bool>>);
impl<'a> Iterator for FreeBlocks<'a> {
    type Item = BlockId;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some((i, &used)) = self.0.next() {
            if !used {
                return Some(BlockId::new(i as u32));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;

    #[test]
    fn it_works() -> TestResult {
        let mut store = BlockStore::new(4);
        assert_eq!(store.capacity(), 4);
        assert_eq!(store.free_count(), 4);
        assert!(store.has_room_for(4));
        assert!(!store.has_room_for(5));

        track!(store.occupy(BlockId::new(1)))?;
        track!(store.occupy(BlockId::new(2)))?;
        assert_eq!(store.free_count(), 2);
        assert_eq!(store.used_count(), 2);
        assert!(!store.is_free(BlockId::new(1)));
        assert_eq!(
            store.free_blocks().collect::<Vec<_>>(),
            vec![BlockId::new(0), BlockId::new(3)]
        );

        track!(store.release(BlockId::new(1)))?;
        assert!(store.is_free(BlockId::new(1)));
        assert_eq!(store.free_count(), 3);
        Ok(())
    }

    #[test]
    fn out_of_range_blocks_are_not_free() {
        let store = BlockStore::new(2);
        assert!(!store.contains(BlockId::new(2)));
        assert!(!store.is_free(BlockId::new(2)));
    }

    #[test]
    fn double_occupation_is_rejected() -> TestResult {
        let mut store = BlockStore::new(2);
        track!(store.occupy(BlockId::new(0)))?;
        assert_eq!(
            store.occupy(BlockId::new(0)).err().map(|e| *e.kind()),
            Some(ErrorKind::InconsistentState)
        );
        assert_eq!(
            store.release(BlockId::new(1)).err().map(|e| *e.kind()),
            Some(ErrorKind::InconsistentState)
        );
        assert_eq!(
            store.occupy(BlockId::new(2)).err().map(|e| *e.kind()),
            Some(ErrorKind::InconsistentState)
        );
        assert_eq!(store.free_count(), 1);
        Ok(())
    }
}
