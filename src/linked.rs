//! FAT(File Allocation Table)方式のリンク割当.
//!
//! ブロック毎に一つのエントリを持つフラットなテーブルを管理し、
//! 各ファイルは「開始ブロックから`Next`を辿って`EndOfChain`に至るチェイン」として表現される.
//!
//! ファイルは外部からは開始ブロックの番号によって識別される.
use slog::Logger;
use std::fmt;

use crate::block::{BlockId, BlockStore};
use crate::metrics::AllocatorMetrics;
use crate::{ErrorKind, Result};

/// FATのエントリ.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FatEntry {
    /// どのファイルにも属していないブロック.
    Free,

    /// チェインの終端ブロック.
    EndOfChain,

    /// チェイン内の次のブロック.
    Next(BlockId),
}
impl FatEntry {
    /// 空きエントリの数値表現.
    pub const RAW_FREE: i64 = -1;

    /// 終端エントリの数値表現.
    pub const RAW_END_OF_CHAIN: i64 = -2;

    /// 古典的なFATの表示で使われる数値表現に変換する.
    ///
    /// # Examples
    ///
    /// ```
    /// use allocsim::block::BlockId;
    /// use allocsim::linked::FatEntry;
    ///
    /// assert_eq!(FatEntry::Free.to_raw(), -1);
    /// assert_eq!(FatEntry::EndOfChain.to_raw(), -2);
    /// assert_eq!(FatEntry::Next(BlockId::new(7)).to_raw(), 7);
    /// ```
    pub fn to_raw(self) -> i64 {
        match self {
            FatEntry::Free => Self::RAW_FREE,
            FatEntry::EndOfChain => Self::RAW_END_OF_CHAIN,
            FatEntry::Next(next) => i64::from(next.as_u32()),
        }
    }

    /// 数値表現から`FatEntry`を復元する.
    ///
    /// 解釈できない値の場合には`None`が返される.
    pub fn from_raw(raw: i64) -> Option<Self> {
        match raw {
            Self::RAW_FREE => Some(FatEntry::Free),
            Self::RAW_END_OF_CHAIN => Some(FatEntry::EndOfChain),
            n if 0 <= n && n <= i64::from(u32::MAX) => Some(FatEntry::Next(BlockId::new(n as u32))),
            _ => None,
        }
    }

    /// 空きエントリかどうかを判定する.
    pub fn is_free(self) -> bool {
        self == FatEntry::Free
    }
}
impl fmt::Display for FatEntry {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_raw())
    }
}

/// FAT方式のアロケータ.
///
/// # 割当戦略
///
/// 空きブロックを番号の昇順に走査し、先頭から必要な数だけ選択する("FirstFit").
/// 選択されたブロックはアドレス上で連続しているとは限らないが、その選択順にリンクされる.
///
/// 割当結果は常に決定的である.
///
/// # 不変条件
///
/// - 各ブロックは高々一つのチェインにしか属さない
/// - 任意の開始ブロックからの走査は、ブロック数以内のステップで`EndOfChain`に到達する
/// - `Free`のエントリはどのファイルにも属さない
#[derive(Debug)]
pub struct LinkedAllocator {
    table: Vec<FatEntry>,
    store: BlockStore,
    logger: Logger,
    metrics: AllocatorMetrics,
}
impl LinkedAllocator {
    pub(crate) fn new(capacity: u32, logger: Logger, metrics: AllocatorMetrics) -> Self {
        info!(logger, "Linked allocator is created"; "capacity" => capacity);
        LinkedAllocator {
            table: vec![FatEntry::Free; capacity as usize],
            store: BlockStore::new(capacity),
            logger,
            metrics,
        }
    }

    /// `file_size`ブロック分のファイルを作成し、その開始ブロックを返す.
    ///
    /// # Errors
    ///
    /// - `file_size`が`0`の場合には`ErrorKind::InvalidInput`
    /// - 空きブロックが`file_size`未満の場合には`ErrorKind::StorageFull`
    ///
    /// いずれの場合でもテーブルは変更されない.
    pub fn create(&mut self, file_size: u32) -> Result<BlockId> {
        track_assert_ne!(file_size, 0, ErrorKind::InvalidInput);
        if !self.store.has_room_for(file_size) {
            self.metrics.nospace_failures.increment();
            warn!(self.logger, "Not enough free blocks";
                  "requested" => file_size, "free" => self.store.free_count());
            track_panic!(ErrorKind::StorageFull; file_size, self.store.free_count());
        }

        let chosen = self
            .store
            .free_blocks()
            .take(file_size as usize)
            .collect::<Vec<_>>();
        track_assert_eq!(chosen.len(), file_size as usize, ErrorKind::InconsistentState);

        for (i, &block) in chosen.iter().enumerate() {
            track!(self.store.occupy(block))?;
            self.table[block.as_usize()] = match chosen.get(i + 1) {
                Some(&next) => FatEntry::Next(next),
                None => FatEntry::EndOfChain,
            };
        }
        self.metrics.count_allocation(chosen.len());

        let start = chosen[0];
        debug!(self.logger, "File is created";
               "start" => start.as_u32(), "size" => file_size);
        Ok(start)
    }

    /// `start_block`から始まるファイルを削除し、チェイン内の全ブロックを解放する.
    ///
    /// # Errors
    ///
    /// - `start_block`が範囲外・空き・チェインの途中のいずれかであれば`ErrorKind::InvalidHandle`
    /// - チェインが循環していたり、空きブロックを指していた場合には`ErrorKind::StorageCorrupted`
    ///
    /// いずれの場合でもテーブルは変更されない.
    pub fn delete(&mut self, start_block: BlockId) -> Result<()> {
        let chain = track!(self.chain(start_block))?;
        for &block in &chain {
            self.table[block.as_usize()] = FatEntry::Free;
            track!(self.store.release(block))?;
        }
        self.metrics.count_releasion(chain.len());
        debug!(self.logger, "File is deleted";
               "start" => start_block.as_u32(), "size" => chain.len());
        Ok(())
    }

    /// テーブル全体のスナップショットを返す.
    pub fn query(&self) -> &[FatEntry] {
        &self.table
    }

    /// `start_block`から始まるファイルのブロック列を、チェインの順番で返す.
    ///
    /// エラー条件は`delete`と同様.
    pub fn chain(&self, start_block: BlockId) -> Result<Vec<BlockId>> {
        track!(self.check_start_block(start_block))?;
        match self.walk(start_block) {
            Ok(chain) => Ok(chain),
            Err(e) => {
                self.metrics.corruptions.increment();
                crit!(self.logger, "Broken chain is detected";
                      "start" => start_block.as_u32(), "reason" => %e);
                Err(track!(e))
            }
        }
    }

    /// 現在存在するファイルの開始ブロック群を昇順で返す.
    ///
    /// 「空きではなく、かつ他のどのエントリからも指されていないブロック」が開始ブロックとなる.
    pub fn files(&self) -> Vec<BlockId> {
        let referenced = self.referenced_blocks();
        self.table
            .iter()
            .enumerate()
            .filter(|&(i, e)| !e.is_free() && !referenced[i])
            .map(|(i, _)| BlockId::new(i as u32))
            .collect()
    }

    /// `block`のエントリを返す.
    ///
    /// 範囲外の場合には`None`が返される.
    pub fn entry(&self, block: BlockId) -> Option<FatEntry> {
        self.table.get(block.as_usize()).cloned()
    }

    /// ブロックの総数を返す.
    pub fn capacity(&self) -> u32 {
        self.store.capacity()
    }

    /// 空きブロックの数を返す.
    pub fn free_count(&self) -> u32 {
        self.store.free_count()
    }

    /// アロケータ用のメトリクスを返す.
    pub fn metrics(&self) -> &AllocatorMetrics {
        &self.metrics
    }

    /// テーブル全体の整合性を検査する.
    ///
    /// 全てのチェインが循環せずに終端し、各ブロックが高々一つのチェインに属し、
    /// どのチェインにも属さない使用中ブロックが存在しないことを確認する.
    ///
    /// # Errors
    ///
    /// 不整合が見つかった場合には`ErrorKind::StorageCorrupted`が返される.
    pub fn verify(&self) -> Result<()> {
        let mut owned = vec![false; self.table.len()];
        let mut pointed = vec![false; self.table.len()];
        for entry in &self.table {
            if let FatEntry::Next(next) = *entry {
                track_assert!(
                    next.as_usize() < self.table.len(),
                    ErrorKind::StorageCorrupted; next
                );
                track_assert!(!pointed[next.as_usize()], ErrorKind::StorageCorrupted; next);
                pointed[next.as_usize()] = true;
            }
        }
        for start in self.files() {
            for block in track!(self.walk(start))? {
                track_assert!(!owned[block.as_usize()], ErrorKind::StorageCorrupted; block);
                owned[block.as_usize()] = true;
            }
        }
        for (i, entry) in self.table.iter().enumerate() {
            track_assert_eq!(
                !entry.is_free(),
                owned[i],
                ErrorKind::StorageCorrupted; i, entry
            );
            track_assert_eq!(
                entry.is_free(),
                self.store.is_free(BlockId::new(i as u32)),
                ErrorKind::StorageCorrupted; i, entry
            );
        }
        Ok(())
    }

    fn check_start_block(&self, start_block: BlockId) -> Result<()> {
        let is_valid = match self.entry(start_block) {
            None | Some(FatEntry::Free) => false,
            Some(_) => !self.table.contains(&FatEntry::Next(start_block)),
        };
        if !is_valid {
            self.metrics.invalid_handle_failures.increment();
            warn!(self.logger, "Invalid start block"; "start" => start_block.as_u32());
            track_panic!(ErrorKind::InvalidHandle, "Not a start block: {}", start_block);
        }
        Ok(())
    }

    // チェインを終端まで辿る.
    // ブロック数を超えても終端に至らない場合には循環しているものとみなす.
    fn walk(&self, start_block: BlockId) -> Result<Vec<BlockId>> {
        let mut chain = Vec::new();
        let mut current = start_block;
        loop {
            track_assert!(
                chain.len() < self.table.len(),
                ErrorKind::StorageCorrupted,
                "Chain from {} does not terminate",
                start_block
            );
            chain.push(current);
            match self.entry(current) {
                Some(FatEntry::EndOfChain) => return Ok(chain),
                Some(FatEntry::Next(next)) => current = next,
                Some(FatEntry::Free) | None => track_panic!(
                    ErrorKind::StorageCorrupted,
                    "Chain from {} reaches an unallocated block {}",
                    start_block,
                    current
                ),
            }
        }
    }

    fn referenced_blocks(&self) -> Vec<bool> {
        let mut referenced = vec![false; self.table.len()];
        for entry in &self.table {
            if let FatEntry::Next(next) = *entry {
                if let Some(r) = referenced.get_mut(next.as_usize()) {
                    *r = true;
                }
            }
        }
        referenced
    }

    #[cfg(test)]
    pub(crate) fn table_mut(&mut self) -> &mut Vec<FatEntry> {
        &mut self.table
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;
    use slog::{Discard, Logger};
    use trackable::result::TestResult;

    use super::*;

    fn allocator(capacity: u32) -> LinkedAllocator {
        let metrics = AllocatorMetrics::new(&MetricBuilder::new(), "linked_allocator", capacity);
        LinkedAllocator::new(capacity, Logger::root(Discard, o!()), metrics)
    }

    fn id(n: u32) -> BlockId {
        BlockId::new(n)
    }

    fn raw(table: &[FatEntry]) -> Vec<i64> {
        table.iter().map(|e| e.to_raw()).collect()
    }

    #[test]
    fn it_works() -> TestResult {
        let mut allocator = allocator(10);
        assert_eq!(track!(allocator.create(3))?, id(0));
        assert_eq!(
            raw(allocator.query()),
            vec![1, 2, -2, -1, -1, -1, -1, -1, -1, -1]
        );
        assert_eq!(allocator.free_count(), 7);

        track!(allocator.delete(id(0)))?;
        assert!(allocator.query().iter().all(|e| e.is_free()));
        assert_eq!(allocator.free_count(), 10);
        Ok(())
    }

    #[test]
    fn chains_skip_allocated_blocks() -> TestResult {
        let mut allocator = allocator(10);
        let a = track!(allocator.create(2))?;
        let b = track!(allocator.create(2))?;
        let c = track!(allocator.create(2))?;
        assert_eq!((a, b, c), (id(0), id(2), id(4)));

        track!(allocator.delete(b))?;
        let d = track!(allocator.create(4))?;
        assert_eq!(d, id(2));
        assert_eq!(track!(allocator.chain(d))?, vec![id(2), id(3), id(6), id(7)]);
        assert_eq!(allocator.files(), vec![id(0), id(2), id(4)]);
        track!(allocator.verify())?;
        Ok(())
    }

    #[test]
    fn create_then_delete_restores_table() -> TestResult {
        let mut allocator = allocator(20);
        track!(allocator.create(4))?;
        let victim = track!(allocator.create(3))?;
        track!(allocator.create(5))?;
        track!(allocator.delete(victim))?;

        let before = allocator.query().to_vec();
        let start = track!(allocator.create(6))?;
        track!(allocator.delete(start))?;
        assert_eq!(allocator.query(), &before[..]);
        Ok(())
    }

    #[test]
    fn storage_full_leaves_table_unchanged() -> TestResult {
        let mut allocator = allocator(5);
        track!(allocator.create(3))?;
        let before = allocator.query().to_vec();

        let e = allocator.create(3).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::StorageFull));
        assert_eq!(allocator.query(), &before[..]);
        assert_eq!(allocator.metrics().nospace_failures(), 1);

        assert_eq!(track!(allocator.create(2))?, id(3));
        assert_eq!(allocator.free_count(), 0);
        Ok(())
    }

    #[test]
    fn zero_sized_file_is_rejected() {
        let mut allocator = allocator(5);
        let e = allocator.create(0).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidInput));
        assert_eq!(allocator.free_count(), 5);
    }

    #[test]
    fn invalid_handles_are_rejected() -> TestResult {
        let mut allocator = allocator(10);
        let start = track!(allocator.create(3))?;
        let before = allocator.query().to_vec();

        for &handle in &[id(1), id(2), id(5), id(10), id(100)] {
            let e = allocator.delete(handle).err().map(|e| *e.kind());
            assert_eq!(e, Some(ErrorKind::InvalidHandle), "handle={}", handle);
        }
        assert_eq!(allocator.query(), &before[..]);
        assert_eq!(allocator.metrics().invalid_handle_failures(), 5);

        track!(allocator.delete(start))?;
        let e = allocator.delete(start).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::InvalidHandle));
        Ok(())
    }

    #[test]
    fn cyclic_chain_is_detected() -> TestResult {
        let mut allocator = allocator(4);
        let start = track!(allocator.create(3))?;

        // 0 -> 1 -> 2 -> 1 -> ...
        allocator.table_mut()[2] = FatEntry::Next(id(1));
        let before = allocator.query().to_vec();

        let e = allocator.delete(start).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::StorageCorrupted));
        assert_eq!(allocator.query(), &before[..]);
        assert_eq!(allocator.metrics().corruptions(), 1);

        let e = allocator.verify().err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::StorageCorrupted));
        Ok(())
    }

    #[test]
    fn chain_into_free_block_is_detected() -> TestResult {
        let mut allocator = allocator(4);
        let start = track!(allocator.create(2))?;
        allocator.table_mut()[1] = FatEntry::Next(id(3));

        let e = allocator.delete(start).err().map(|e| *e.kind());
        assert_eq!(e, Some(ErrorKind::StorageCorrupted));
        Ok(())
    }

    #[test]
    fn usage_matches_live_files() -> TestResult {
        let mut allocator = allocator(64);
        let mut live = Vec::new();
        for i in 0..200u32 {
            let size = i % 7 + 1;
            if i % 3 == 2 && !live.is_empty() {
                let (start, _) = live.remove((i as usize * 5) % live.len());
                track!(allocator.delete(start))?;
            } else {
                match allocator.create(size) {
                    Ok(start) => live.push((start, size)),
                    Err(e) => assert_eq!(*e.kind(), ErrorKind::StorageFull),
                }
            }

            let used = allocator.query().iter().filter(|e| !e.is_free()).count();
            let expected: u32 = live.iter().map(|&(_, size)| size).sum();
            assert_eq!(used as u32, expected);
            assert_eq!(allocator.metrics().usage_blocks(), u64::from(expected));
            track!(allocator.verify())?;
        }

        let mut starts = live.iter().map(|&(start, _)| start).collect::<Vec<_>>();
        starts.sort();
        assert_eq!(allocator.files(), starts);
        Ok(())
    }

    #[test]
    fn raw_entries_work() {
        assert_eq!(FatEntry::from_raw(-1), Some(FatEntry::Free));
        assert_eq!(FatEntry::from_raw(-2), Some(FatEntry::EndOfChain));
        assert_eq!(FatEntry::from_raw(3), Some(FatEntry::Next(id(3))));
        assert_eq!(FatEntry::from_raw(-3), None);
        assert_eq!(FatEntry::EndOfChain.to_string(), "-2");
    }
}
