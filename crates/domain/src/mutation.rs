use crate::record::{Record, RecordId};

/// ミューテーションのレスポンス
#[derive(Debug, Clone, PartialEq)]
pub enum MutationResult<R> {
    Created(R),
    Updated(R),
    Deleted(RecordId),
}

impl<R: Record> MutationResult<R> {
    pub fn record_id(&self) -> &RecordId {
        match self {
            MutationResult::Created(record) | MutationResult::Updated(record) => record.id(),
            MutationResult::Deleted(id) => id,
        }
    }
}

/// ミューテーション結果をローカルのコレクションに反映する
///
/// 再取得せずにレスポンスだけでキャッシュを更新するためのマージ関数。
/// - Created: 末尾に追加（同じIDが既にあれば置き換え）
/// - Updated: 同じ位置で置き換え（見つからなければ末尾に追加）
/// - Deleted: 該当IDを除外
///
/// どの場合もIDの一意性は保たれる。
pub fn apply_mutation_result<R: Record>(mut collection: Vec<R>, result: MutationResult<R>) -> Vec<R> {
    match result {
        MutationResult::Created(record) | MutationResult::Updated(record) => {
            match collection.iter().position(|r| r.id() == record.id()) {
                Some(index) => collection[index] = record,
                None => collection.push(record),
            }
            collection
        }
        MutationResult::Deleted(id) => {
            collection.retain(|r| r.id() != &id);
            collection
        }
    }
}
