use async_trait::async_trait;
use domain::{FieldMap, Record, RecordId};
use shared::AppError;

/// リモートのレコードAPI（レコード型ごと）
///
/// 各呼び出しは成功時にレコードを返し、失敗時は `AppError` を返す。
/// リモート側が正本であり、ローカルのコレクションはそのキャッシュに過ぎない。
#[async_trait]
pub trait RecordApi<R: Record>: Send + Sync {
    /// 全件取得（並び順はリモートの返却順）
    async fn list(&self) -> Result<Vec<R>, AppError>;

    /// 1件取得（存在しなければ `AppError::NotFound`）
    async fn get(&self, id: &RecordId) -> Result<R, AppError>;

    /// 作成（ID・タイムスタンプ・所有者はリモート側で設定される）
    async fn create(&self, input: &R::Input) -> Result<R, AppError>;

    /// 部分更新
    async fn update(&self, id: &RecordId, patch: &FieldMap) -> Result<R, AppError>;

    /// 削除し、削除したレコードのIDを返す
    async fn delete(&self, id: &RecordId) -> Result<RecordId, AppError>;
}

/// 操作名（ログ・エラー用。例: `createTask`）
pub fn operation_name<R: Record>(verb: &str) -> String {
    match verb {
        "list" => format!("list{}", R::PLURAL_NAME),
        _ => format!("{verb}{}", R::TYPE_NAME),
    }
}
