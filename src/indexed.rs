//! インデックス割当.
//!
//! 各ファイルは一つのインデックスブロックと、任意個のデータブロックから構成される.
//! インデックスブロックには、そのファイルのデータブロック群の番号が順番通りに格納される.
//!
//! ファイルは外部からはインデックスブロックの番号によって識別される.
use slog::Logger;
use std::collections::BTreeSet;

use crate::block::{BlockId, BlockStore};
use crate::metrics::AllocatorMetrics;
use crate::policy::SelectionPolicy;
use crate::{ErrorKind, Result};

/// ブロックの状態.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// どのファイルにも属していないブロック.
    Free,

    /// インデックスブロック.
    ///
    /// ファイルのデータブロック群を、順番通りに保持している.
    Index(Vec<BlockId>),

    /// データブロック.
    Data {
        /// このブロックを参照しているインデックスブロック.
        owner: BlockId,
    },
}
impl Slot {
    /// 空きブロックかどうかを判定する.
    pub fn is_free(&self) -> bool {
        *self == Slot::Free
    }
}

/// 割当結果.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Allocation {
    /// インデックスブロック (i.e., ファイルのハンドル).
    pub index_block: BlockId,

    /// データブロック群.
    pub data_blocks: Vec<BlockId>,
}

/// インデックス割当方式のアロケータ.
///
/// 一つのファイルの割当には「要求ブロック数 + 1(インデックスブロック)」個の空きブロックが必要となる.
///
/// どの空きブロックを使用するかは[`SelectionPolicy`]によって決定される.
/// デフォルトでは番号の昇順に選択される.
///
/// # 不変条件
///
/// - インデックスブロックのリストに含まれるブロックは、全てそのインデックスブロックを所有者とするデータブロック
/// - 全てのデータブロックは、ちょうど一つのインデックスブロックから参照されている
///
/// [`SelectionPolicy`]: ../policy/trait.SelectionPolicy.html
#[derive(Debug)]
pub struct IndexedAllocator {
    slots: Vec<Slot>,
    store: BlockStore,
    policy: Box<dyn SelectionPolicy>,
    logger: Logger,
    metrics: AllocatorMetrics,
}
impl IndexedAllocator {
    pub(crate) fn new(
        capacity: u32,
        policy: Box<dyn SelectionPolicy>,
        logger: Logger,
        metrics: AllocatorMetrics,
    ) -> Self {
        info!(logger, "Indexed allocator is created";
              "capacity" => capacity, "policy" => format!("{:?}", policy));
        IndexedAllocator {
            slots: vec![Slot::Free; capacity as usize],
            store: BlockStore::new(capacity),
            policy,
            logger,
            metrics,
        }
    }

    /// `num_blocks`個のデータブロックを持つファイルを割り当てる.
    ///
    /// # Errors
    ///
    /// - `num_blocks`が`0`の場合には`ErrorKind::InvalidInput`
    /// - 空きブロックが`num_blocks + 1`未満の場合には`ErrorKind::StorageFull`
    /// - 選択方針が不正な結果を返した場合には`ErrorKind::InconsistentState`
    ///
    /// いずれの場合でもブロックの状態は変更されない.
    pub fn allocate(&mut self, num_blocks: u32) -> Result<Allocation> {
        track_assert_ne!(num_blocks, 0, ErrorKind::InvalidInput);
        let required = num_blocks.saturating_add(1);
        if !self.store.has_room_for(required) {
            self.metrics.nospace_failures.increment();
            warn!(self.logger, "Not enough free blocks";
                  "requested" => required, "free" => self.store.free_count());
            track_panic!(ErrorKind::StorageFull; required, self.store.free_count());
        }

        let free = self.store.free_blocks().collect::<Vec<_>>();
        let chosen = self.policy.choose(&free, required as usize);
        track!(self.check_selection(&chosen, required as usize))?;

        let index_block = chosen[0];
        let data_blocks = chosen[1..].to_vec();
        for &block in &chosen {
            track!(self.store.occupy(block))?;
        }
        for &block in &data_blocks {
            self.slots[block.as_usize()] = Slot::Data { owner: index_block };
        }
        self.slots[index_block.as_usize()] = Slot::Index(data_blocks.clone());
        self.metrics.count_allocation(chosen.len());

        debug!(self.logger, "File is allocated";
               "index_block" => index_block.as_u32(), "data_blocks" => num_blocks);
        Ok(Allocation {
            index_block,
            data_blocks,
        })
    }

    /// `index_block`をインデックスブロックとするファイルを解放する.
    ///
    /// インデックスブロック自体と、そこから参照されている全てのデータブロックが空きに戻る.
    ///
    /// `index_block`が既に空きの場合には何も行わず`false`を返す.
    ///
    /// # Errors
    ///
    /// `index_block`が範囲外、もしくはデータブロックの場合には`ErrorKind::InvalidHandle`が返される.
    pub fn free(&mut self, index_block: BlockId) -> Result<bool> {
        let data_blocks = match self.slots.get(index_block.as_usize()) {
            Some(Slot::Free) => return Ok(false),
            Some(Slot::Index(data_blocks)) => data_blocks.clone(),
            Some(Slot::Data { .. }) | None => {
                self.metrics.invalid_handle_failures.increment();
                warn!(self.logger, "Invalid index block"; "index_block" => index_block.as_u32());
                track_panic!(ErrorKind::InvalidHandle, "Not an index block: {}", index_block);
            }
        };

        for &block in &data_blocks {
            track_assert_eq!(
                self.slots[block.as_usize()],
                Slot::Data { owner: index_block },
                ErrorKind::InconsistentState
            );
        }
        for &block in data_blocks.iter().chain(Some(&index_block)) {
            self.slots[block.as_usize()] = Slot::Free;
            track!(self.store.release(block))?;
        }
        self.metrics.count_releasion(data_blocks.len() + 1);

        debug!(self.logger, "File is freed";
               "index_block" => index_block.as_u32(), "data_blocks" => data_blocks.len());
        Ok(true)
    }

    /// 全ブロックの状態のスナップショットを返す.
    pub fn query(&self) -> &[Slot] {
        &self.slots
    }

    /// `index_block`に格納されているデータブロック群を返す.
    ///
    /// # Errors
    ///
    /// - `index_block`が範囲外の場合には`ErrorKind::InvalidHandle`
    /// - `index_block`がインデックスブロックではない場合には`ErrorKind::NotFound`
    pub fn query_index_table(&self, index_block: BlockId) -> Result<&[BlockId]> {
        match self.slots.get(index_block.as_usize()) {
            Some(Slot::Index(data_blocks)) => Ok(&data_blocks[..]),
            Some(_) => track_panic!(ErrorKind::NotFound, "No index table at {}", index_block),
            None => track_panic!(ErrorKind::InvalidHandle, "Out of range: {}", index_block),
        }
    }

    /// 現在存在するファイル群を、インデックスブロックの昇順で返す.
    pub fn files(&self) -> Vec<Allocation> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| match slot {
                Slot::Index(data_blocks) => Some(Allocation {
                    index_block: BlockId::new(i as u32),
                    data_blocks: data_blocks.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    /// `block`を使用しているファイルのインデックスブロックを返す.
    ///
    /// `block`がインデックスブロックならそれ自体が、空きもしくは範囲外なら`None`が返される.
    pub fn owner_of(&self, block: BlockId) -> Option<BlockId> {
        match self.slots.get(block.as_usize())? {
            Slot::Free => None,
            Slot::Index(_) => Some(block),
            Slot::Data { owner } => Some(*owner),
        }
    }

    /// `block`の状態を返す.
    ///
    /// 範囲外の場合には`None`が返される.
    pub fn slot(&self, block: BlockId) -> Option<&Slot> {
        self.slots.get(block.as_usize())
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

    /// 全ブロックの整合性を検査する.
    ///
    /// # Errors
    ///
    /// 不整合が見つかった場合には`ErrorKind::StorageCorrupted`が返される.
    pub fn verify(&self) -> Result<()> {
        let mut referenced = vec![false; self.slots.len()];
        for (i, slot) in self.slots.iter().enumerate() {
            let id = BlockId::new(i as u32);
            track_assert_eq!(
                slot.is_free(),
                self.store.is_free(id),
                ErrorKind::StorageCorrupted; id
            );
            if let Slot::Index(data_blocks) = slot {
                for &block in data_blocks {
                    track_assert_eq!(
                        self.slot(block),
                        Some(&Slot::Data { owner: id }),
                        ErrorKind::StorageCorrupted; id, block
                    );
                    track_assert!(!referenced[block.as_usize()], ErrorKind::StorageCorrupted; block);
                    referenced[block.as_usize()] = true;
                }
            }
        }
        for (i, slot) in self.slots.iter().enumerate() {
            if let Slot::Data { owner } = slot {
                track_assert!(referenced[i], ErrorKind::StorageCorrupted; i, owner);
            }
        }
        Ok(())
    }

    fn check_selection(&self, chosen: &[BlockId], required: usize) -> Result<()> {
        let distinct = chosen.iter().collect::<BTreeSet<_>>();
        let is_valid = chosen.len() == required
            && distinct.len() == required
            && chosen.iter().all(|&b| self.store.is_free(b));
        if !is_valid {
            crit!(self.logger, "Selection policy returned unusable blocks";
                  "chosen" => format!("{:?}", chosen), "required" => required);
            track_panic!(ErrorKind::InconsistentState; required, chosen);
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn slots_mut(&mut self) -> &mut Vec<Slot> {
        &mut self.slots
    }
}
