//! 複数スレッドからアロケータを操作するためのラッパー.
use std::sync::{Arc, Mutex};

use crate::Result;

/// アロケータを複数スレッドで共有するためのハンドル.
///
/// 各操作は排他ロックの内側で完了まで実行されるので、
/// 割当途中の状態が他のスレッドから観測されることはない.
///
/// # Examples
///
/// ```
/// use allocsim::AllocatorBuilder;
/// use allocsim::shared::SharedAllocator;
///
/// let linked = AllocatorBuilder::new().linked().unwrap();
/// let shared = SharedAllocator::new(linked);
/// let start = shared.with(|a| a.create(3)).unwrap();
/// shared.with(|a| a.delete(start)).unwrap();
/// ```
#[derive(Debug)]
pub struct SharedAllocator<A>(Arc<Mutex<A>>);
impl<A> SharedAllocator<A> {
    /// 新しい`SharedAllocator`インスタンスを生成する.
    pub fn new(allocator: A) -> Self {
        SharedAllocator(Arc::new(Mutex::new(allocator)))
    }

    /// ロックを獲得した上で`f`を実行する.
    ///
    /// # Errors
    ///
    /// `f`が返したエラーに加えて、ロックがポイズニングされている場合には
    /// 種類が`ErrorKind::Other`のエラーが返される.
    pub fn with<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut A) -> Result<T>,
    {
        let mut allocator = track!(self.0.lock().map_err(crate::Error::from))?;
        track!(f(&mut *allocator))
    }
}
impl<A> Clone for SharedAllocator<A> {
    fn clone(&self) -> Self {
        SharedAllocator(Arc::clone(&self.0))
    }
}
