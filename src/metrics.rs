//! [Prometheus][prometheus]用のメトリクス.
//!
//! [prometheus]: https://prometheus.io/
use prometrics::metrics::{Counter, Gauge, MetricBuilder};

/// アロケータのメトリクス.
///
/// [`LinkedAllocator`]と[`IndexedAllocator`]の両方で共通して使われる.
/// 両者はサブシステム名(`linked_allocator` or `indexed_allocator`)で区別される.
///
/// [`LinkedAllocator`]: ../linked/struct.LinkedAllocator.html
/// [`IndexedAllocator`]: ../indexed/struct.IndexedAllocator.html
#[derive(Debug, Clone)]
pub struct AllocatorMetrics {
    pub(crate) capacity_blocks: Gauge,
    pub(crate) allocated_files: Counter,
    pub(crate) allocated_blocks: Counter,
    pub(crate) released_files: Counter,
    pub(crate) released_blocks: Counter,
    pub(crate) nospace_failures: Counter,
    pub(crate) invalid_handle_failures: Counter,
    pub(crate) corruptions: Counter,
}
impl AllocatorMetrics {
    /// アロケータが管理するブロックの総数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_capacity_blocks <GAUGE>
    /// ```
    pub fn capacity_blocks(&self) -> u64 {
        self.capacity_blocks.value() as u64
    }

    /// これまでに割り当てたファイルの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_allocated_files_total <COUNTER>
    /// ```
    pub fn allocated_files(&self) -> u64 {
        self.allocated_files.value() as u64
    }

    /// これまでに割り当てたブロックの数.
    ///
    /// インデックス割当の場合には、インデックスブロック自体も含まれる.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_allocated_blocks_total <COUNTER>
    /// ```
    pub fn allocated_blocks(&self) -> u64 {
        self.allocated_blocks.value() as u64
    }

    /// これまでに解放したファイルの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_released_files_total <COUNTER>
    /// ```
    pub fn released_files(&self) -> u64 {
        self.released_files.value() as u64
    }

    /// これまでに解放したブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_released_blocks_total <COUNTER>
    /// ```
    pub fn released_blocks(&self) -> u64 {
        self.released_blocks.value() as u64
    }

    /// 空きブロック不足による割当失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_nospace_failures_total <COUNTER>
    /// ```
    pub fn nospace_failures(&self) -> u64 {
        self.nospace_failures.value() as u64
    }

    /// 不正なハンドルが指定されたことによる操作の失敗回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_invalid_handle_failures_total <COUNTER>
    /// ```
    pub fn invalid_handle_failures(&self) -> u64 {
        self.invalid_handle_failures.value() as u64
    }

    /// テーブルの破損が検出された回数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_corruptions_total <COUNTER>
    /// ```
    pub fn corruptions(&self) -> u64 {
        self.corruptions.value() as u64
    }

    /// 現在生存しているファイルの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_allocated_files_total - allocsim_<subsystem>_released_files_total
    /// ```
    pub fn live_files(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_files();
        let inc = self.allocated_files();
        inc - dec
    }

    /// 現在使用中のブロックの数.
    ///
    /// # Prometheus
    ///
    /// ```prometheus
    /// allocsim_<subsystem>_allocated_blocks_total - allocsim_<subsystem>_released_blocks_total
    /// ```
    pub fn usage_blocks(&self) -> u64 {
        // NOTE: 以下の順番で値を取得しないとアンダーフローする可能性がある
        let dec = self.released_blocks();
        let inc = self.allocated_blocks();
        inc - dec
    }

    pub(crate) fn new(builder: &MetricBuilder, subsystem: &str, capacity: u32) -> Self {
        let mut builder = builder.clone();
        builder.namespace("allocsim").subsystem(subsystem);
        let metrics = AllocatorMetrics {
            capacity_blocks: builder
                .gauge("capacity_blocks")
                .help("Number of blocks managed by the allocator")
                .finish()
                .expect("Never fails"),
            allocated_files: builder
                .counter("allocated_files_total")
                .help("Number of allocated files")
                .finish()
                .expect("Never fails"),
            allocated_blocks: builder
                .counter("allocated_blocks_total")
                .help("Number of allocated blocks")
                .finish()
                .expect("Never fails"),
            released_files: builder
                .counter("released_files_total")
                .help("Number of released files")
                .finish()
                .expect("Never fails"),
            released_blocks: builder
                .counter("released_blocks_total")
                .help("Number of released blocks")
                .finish()
                .expect("Never fails"),
            nospace_failures: builder
                .counter("nospace_failures_total")
                .help("Number of allocation failures caused by no available space")
                .finish()
                .expect("Never fails"),
            invalid_handle_failures: builder
                .counter("invalid_handle_failures_total")
                .help("Number of requests rejected because of an invalid file handle")
                .finish()
                .expect("Never fails"),
            corruptions: builder
                .counter("corruptions_total")
                .help("Number of detected block table corruptions")
                .finish()
                .expect("Never fails"),
        };
        metrics.capacity_blocks.set(f64::from(capacity));
        metrics
    }

    pub(crate) fn count_allocation(&self, blocks: usize) {
        self.allocated_files.increment();
        self.allocated_blocks.add_u64(blocks as u64);
    }

    pub(crate) fn count_releasion(&self, blocks: usize) {
        self.released_files.increment();
        self.released_blocks.add_u64(blocks as u64);
    }
}

#[cfg(test)]
mod tests {
    use prometrics::metrics::MetricBuilder;

    use super::*;

    #[test]
    fn it_works() {
        let m = AllocatorMetrics::new(&MetricBuilder::new(), "linked_allocator", 100);
        assert_eq!(m.capacity_blocks(), 100);

        m.count_allocation(3);
        m.count_allocation(5);
        m.count_releasion(3);
        assert_eq!(m.allocated_files(), 2);
        assert_eq!(m.allocated_blocks(), 8);
        assert_eq!(m.released_files(), 1);
        assert_eq!(m.released_blocks(), 3);
        assert_eq!(m.live_files(), 1);
        assert_eq!(m.usage_blocks(), 5);
    }
}
