//! アロケータの構築と設定.
use prometrics::metrics::MetricBuilder;
use slog::{Discard, Logger};

use crate::indexed::IndexedAllocator;
use crate::linked::LinkedAllocator;
use crate::metrics::AllocatorMetrics;
use crate::policy::{AllocationOrder, SelectionPolicy};
use crate::{ErrorKind, Result};

/// アロケータのビルダ.
///
/// 一つのビルダから、[`LinkedAllocator`]と[`IndexedAllocator`]の両方を構築できる.
/// 構築された各インスタンスは、それぞれ独立したブロックテーブルを保持する.
///
/// # Examples
///
/// ```
/// use allocsim::AllocatorBuilder;
/// use allocsim::block::BlockId;
///
/// let mut linked = AllocatorBuilder::new().capacity(10).linked().unwrap();
/// assert_eq!(linked.create(3).unwrap(), BlockId::new(0));
///
/// let mut indexed = AllocatorBuilder::new().capacity(10).indexed().unwrap();
/// let allocation = indexed.allocate(2).unwrap();
/// assert_eq!(allocation.index_block, BlockId::new(0));
/// assert_eq!(allocation.data_blocks, vec![BlockId::new(1), BlockId::new(2)]);
/// ```
///
/// [`LinkedAllocator`]: ./linked/struct.LinkedAllocator.html
/// [`IndexedAllocator`]: ./indexed/struct.IndexedAllocator.html
#[derive(Debug, Clone)]
pub struct AllocatorBuilder {
    capacity: u32,
    allocation_order: AllocationOrder,
    seed: Option<u64>,
    logger: Logger,
    metrics: MetricBuilder,
}
impl AllocatorBuilder {
    /// デフォルトの容量.
    pub const DEFAULT_CAPACITY: u32 = 100;

    /// デフォルト設定で`AllocatorBuilder`インスタンスを生成する.
    pub fn new() -> Self {
        AllocatorBuilder {
            capacity: Self::DEFAULT_CAPACITY,
            allocation_order: AllocationOrder::default(),
            seed: None,
            logger: Logger::root(Discard, o!()),
            metrics: MetricBuilder::new(),
        }
    }

    /// アロケータが管理するブロックの総数を設定する.
    ///
    /// `0`が指定された場合には、構築時にエラーとなる.
    ///
    /// デフォルト値は`100`.
    pub fn capacity(&mut self, capacity: u32) -> &mut Self {
        self.capacity = capacity;
        self
    }

    /// インデックス割当において、空きブロックを選択する順番を設定する.
    ///
    /// リンク割当は常に昇順で選択するので、この設定の影響を受けない.
    ///
    /// デフォルト値は`AllocationOrder::Ascending`.
    pub fn allocation_order(&mut self, order: AllocationOrder) -> &mut Self {
        self.allocation_order = order;
        self
    }

    /// ランダム選択用の乱数のシードを設定する.
    ///
    /// 指定されていない場合は、OSの乱数源が使用される.
    pub fn seed(&mut self, seed: u64) -> &mut Self {
        self.seed = Some(seed);
        self
    }

    /// アロケータ用の logger を登録する
    pub fn logger(&mut self, logger: Logger) -> &mut Self {
        self.logger = logger;
        self
    }

    /// メトリクス用の共通設定を登録する.
    ///
    /// デフォルト値は`MetricBuilder::new()`.
    pub fn metrics(&mut self, metrics: MetricBuilder) -> &mut Self {
        self.metrics = metrics;
        self
    }

    /// リンク割当(FAT)方式のアロケータを構築する.
    pub fn linked(&self) -> Result<LinkedAllocator> {
        track!(self.check_capacity())?;
        let metrics = AllocatorMetrics::new(&self.metrics, "linked_allocator", self.capacity);
        let logger = self.logger.new(o!("allocator" => "linked"));
        Ok(LinkedAllocator::new(self.capacity, logger, metrics))
    }

    /// インデックス割当方式のアロケータを構築する.
    ///
    /// ブロックの選択方針は`allocation_order`と`seed`の設定から決定される.
    pub fn indexed(&self) -> Result<IndexedAllocator> {
        let policy = self.allocation_order.policy(self.seed);
        track!(self.build_indexed(policy))
    }

    /// 任意の選択方針を用いるインデックス割当方式のアロケータを構築する.
    ///
    /// `allocation_order`と`seed`の設定は無視される.
    pub fn indexed_with_policy<P>(&self, policy: P) -> Result<IndexedAllocator>
    where
        P: SelectionPolicy + 'static,
    {
        track!(self.build_indexed(Box::new(policy)))
    }

    fn build_indexed(&self, policy: Box<dyn SelectionPolicy>) -> Result<IndexedAllocator> {
        track!(self.check_capacity())?;
        let metrics = AllocatorMetrics::new(&self.metrics, "indexed_allocator", self.capacity);
        let logger = self.logger.new(o!("allocator" => "indexed"));
        Ok(IndexedAllocator::new(self.capacity, policy, logger, metrics))
    }

    fn check_capacity(&self) -> Result<()> {
        track_assert_ne!(self.capacity, 0, ErrorKind::InvalidInput);
        Ok(())
    }
}
impl Default for AllocatorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use trackable::result::TestResult;

    use super::*;
    use crate::block::BlockId;
    use crate::policy::AscendingOrder;

    #[test]
    fn default_capacity_works() -> TestResult {
        let linked = track!(AllocatorBuilder::new().linked())?;
        assert_eq!(linked.capacity(), 100);
        assert_eq!(linked.metrics().capacity_blocks(), 100);

        let indexed = track!(AllocatorBuilder::new().indexed())?;
        assert_eq!(indexed.capacity(), 100);
        assert_eq!(indexed.free_count(), 100);
        Ok(())
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut builder = AllocatorBuilder::new();
        builder.capacity(0);
        assert_eq!(
            builder.linked().err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
        assert_eq!(
            builder.indexed().err().map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
        assert_eq!(
            builder
                .indexed_with_policy(AscendingOrder)
                .err()
                .map(|e| *e.kind()),
            Some(ErrorKind::InvalidInput)
        );
    }

    #[test]
    fn seeded_random_order_is_reproducible() -> TestResult {
        let mut builder = AllocatorBuilder::new();
        builder
            .capacity(64)
            .allocation_order(AllocationOrder::Random)
            .seed(2024);
        let mut a0 = track!(builder.indexed())?;
        let mut a1 = track!(builder.indexed())?;
        for size in 1..6 {
            assert_eq!(track!(a0.allocate(size))?, track!(a1.allocate(size))?);
        }
        Ok(())
    }

    #[test]
    fn instances_are_independent() -> TestResult {
        let builder = AllocatorBuilder::new();
        let mut a0 = track!(builder.linked())?;
        let a1 = track!(builder.linked())?;
        assert_eq!(track!(a0.create(5))?, BlockId::new(0));
        assert_eq!(a0.free_count(), 95);
        assert_eq!(a1.free_count(), 100);
        Ok(())
    }
}
