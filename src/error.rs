use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ErrorKind::Other.cause(e.to_string()).into()
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 要求されたサイズを満たすだけの空きブロックが存在しない.
    ///
    /// このエラーが返された場合には、アロケータの状態は一切変更されていない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が不要なファイルを削除してから再試行する
    /// - より大きな容量でアロケータを構築し直す
    StorageFull,

    /// 指定されたハンドル(開始ブロック or インデックスブロック)が不正.
    ///
    /// 範囲外のブロック番号、空きブロック、チェインの途中のブロック、
    /// インデックスブロックではないブロック、等が指定された場合にこのエラーが返される.
    ///
    /// # 典型的な対応策
    ///
    /// - 割当時に返されたハンドルをそのまま使うように利用者側を修正する
    InvalidHandle,

    /// 指定されたブロックに対応するインデックステーブルが存在しない.
    NotFound,

    /// ブロックテーブルが破損している.
    ///
    /// チェインの走査がブロック数以上続いた(i.e., 循環している)場合や、
    /// チェインが空きブロックを指している場合等に、このエラーが返される.
    ///
    /// # 典型的な対応策
    ///
    /// - アロケータを破棄して作り直す
    StorageCorrupted,

    /// 入力が不正.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 内部状態が不整合に陥っている.
    ///
    /// プログラムにバグがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,

    /// その他エラー.
    ///
    /// E.g., ロックのポイズニング
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
