//! インデックス割当で使われるブロックの選択方針.
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use std::fmt::Debug;
use std::str::FromStr;

use crate::block::BlockId;
use crate::{Error, ErrorKind};

/// 空きブロック群の中から、割当対象のブロックを選択するオブジェクト.
pub trait SelectionPolicy: Debug + Send {
    /// 空きブロック群`free`の中から、相異なる`count`個のブロックを選択する.
    ///
    /// `free`は昇順に並んでおり、その長さは`count`以上であることが保証されている.
    ///
    /// 結果の先頭要素はインデックスブロックとして使われ、残りが(その順番で)データブロックとなる.
    /// 内部状態の変更も許されることに注意.
    fn choose(&mut self, free: &[BlockId], count: usize) -> Vec<BlockId>;
}

/// 番号が小さい順に空きブロックを選択する`SelectionPolicy`.
///
/// 結果が決定的なので、テストや再現性が必要な場面に向いている.
#[derive(Debug, Default, Clone)]
pub struct AscendingOrder;
impl SelectionPolicy for AscendingOrder {
    fn choose(&mut self, free: &[BlockId], count: usize) -> Vec<BlockId> {
        free.iter().take(count).cloned().collect()
    }
}

/// 空きブロック群から一様ランダムに(非復元抽出で)選択する`SelectionPolicy`.
#[derive(Debug)]
pub struct RandomOrder {
    rng: StdRng,
}
impl RandomOrder {
    /// OSの乱数源で初期化された`RandomOrder`インスタンスを生成する.
    pub fn new() -> Self {
        RandomOrder {
            rng: StdRng::from_entropy(),
        }
    }

    /// 指定のシードで初期化された`RandomOrder`インスタンスを生成する.
    ///
    /// 同じシードからは、同じ選択列が得られる.
    pub fn with_seed(seed: u64) -> Self {
        RandomOrder {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}
impl Default for RandomOrder {
    fn default() -> Self {
        Self::new()
    }
}
impl SelectionPolicy for RandomOrder {
    fn choose(&mut self, free: &[BlockId], count: usize) -> Vec<BlockId> {
        free.choose_multiple(&mut self.rng, count).cloned().collect()
    }
}

/// ブロックの選択順序の設定値.
///
/// default は `Ascending`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationOrder {
    /// 番号の昇順に選択する ([`AscendingOrder`]).
    ///
    /// [`AscendingOrder`]: ./struct.AscendingOrder.html
    Ascending,

    /// ランダムに選択する ([`RandomOrder`]).
    ///
    /// [`RandomOrder`]: ./struct.RandomOrder.html
    Random,
}
impl AllocationOrder {
    /// 設定値に対応する`SelectionPolicy`を生成する.
    ///
    /// `seed`は`Random`の場合にのみ使われ、`None`ならOSの乱数源で初期化される.
    pub fn policy(self, seed: Option<u64>) -> Box<dyn SelectionPolicy> {
        match self {
            AllocationOrder::Ascending => Box::new(AscendingOrder),
            AllocationOrder::Random => match seed {
                Some(seed) => Box::new(RandomOrder::with_seed(seed)),
                None => Box::new(RandomOrder::new()),
            },
        }
    }
}
impl Default for AllocationOrder {
    fn default() -> Self {
        AllocationOrder::Ascending
    }
}
impl FromStr for AllocationOrder {
    type Err = Error;

    /// `"ascending"`もしくは`"random"`を解釈する.
    ///
    /// # Examples
    ///
    /// ```
    /// use allocsim::ErrorKind;
    /// use allocsim::policy::AllocationOrder;
    ///
    /// assert_eq!("ascending".parse().ok(), Some(AllocationOrder::Ascending));
    /// assert_eq!("random".parse().ok(), Some(AllocationOrder::Random));
    ///
    /// let e = "shuffled".parse::<AllocationOrder>().err().map(|e| *e.kind());
    /// assert_eq!(e, Some(ErrorKind::InvalidInput));
    /// ```
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ascending" => Ok(AllocationOrder::Ascending),
            "random" => Ok(AllocationOrder::Random),
            _ => track_panic!(ErrorKind::InvalidInput, "Unknown allocation order: {:?}", s),
        }
    }
}
