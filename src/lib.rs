//! Disk Block Allocation Simulator.
//!
//! `allocsim`は、古典的な二種類のディスク領域割当方式をメモリ上でシミュレートするためのライブラリ.
//!
//! # 特徴
//!
//! - 固定数のブロックから成る仮想的なディスクに対して、ファイルの割当・解放・参照を行う
//! - 以下の二方式をサポート:
//!   - [リンク割当][linked] (FAT方式): ブロック毎のエントリを持つテーブルでチェインを表現する
//!   - [インデックス割当][indexed]: ファイル毎のインデックスブロックがデータブロック群を保持する
//! - 割当の失敗時には状態が一切変更されない (i.e., 部分的な割当は発生しない)
//! - ハンドル(開始ブロック or インデックスブロック)の検証はライブラリ側で行う
//! - 永続化や実デバイスへのI/O、描画等は行わない
//!
//! # モジュールの依存関係
//!
//! ```text
//! builder => {linked, indexed} => block
//!                     indexed  => policy
//! ```
//!
//! - [builder]モジュール:
//!   - [AllocatorBuilder]を提供
//!   - 容量や選択方針、logger、メトリクスの設定を行い、各アロケータを構築する
//! - [linked]モジュール:
//!   - [LinkedAllocator]を提供
//! - [indexed]モジュール:
//!   - [IndexedAllocator]を提供
//! - [policy]モジュール:
//!   - インデックス割当で使うブロックの選択方針([SelectionPolicy])を提供
//! - [block]モジュール:
//!   - 両アロケータが共通で利用するブロック番号と空き管理を提供
//!
//! [linked]: ./linked/index.html
//! [indexed]: ./indexed/index.html
//! [builder]: ./builder/index.html
//! [policy]: ./policy/index.html
//! [block]: ./block/index.html
//! [AllocatorBuilder]: ./struct.AllocatorBuilder.html
//! [LinkedAllocator]: ./linked/struct.LinkedAllocator.html
//! [IndexedAllocator]: ./indexed/struct.IndexedAllocator.html
//! [SelectionPolicy]: ./policy/trait.SelectionPolicy.html
#![warn(missing_docs)]
extern crate prometrics;
extern crate rand;
#[macro_use]
extern crate trackable;
#[macro_use]
extern crate slog;

pub use crate::builder::AllocatorBuilder;
pub use crate::error::{Error, ErrorKind};

pub mod block;
pub mod builder;
pub mod indexed;
pub mod linked;
pub mod metrics;
pub mod policy;
pub mod shared;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
