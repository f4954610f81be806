//! レコードストア
//!
//! レコード型ごとにローカルのコレクションを所有し、リモートAPIとの整合を保つ。
//! 全操作は明示的な `Result` を返し、失敗は記録した上で呼び出し側に伝える。

use crate::api::{operation_name, RecordApi};
use crate::image::ImageResolver;
use domain::{
    apply_mutation_result, status_patch, total_amount, validate_patch, Expense, FieldMap,
    FormState, MutationResult, Record, RecordId, RecordInput, RecordStatus,
};
use shared::telemetry::{record_error, trace_remote_call};
use shared::{AppError, SyncStrategy};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument, warn};

struct StoreState<R> {
    records: Vec<R>,
    /// 最後に反映した同期チケット
    applied_ticket: u64,
    /// 最後に反映した一覧取得のチケット
    refetch_ticket: u64,
    /// 実行中の一覧取得数
    in_flight: usize,
}

/// 再取得結果の反映状況
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// ローカルのコレクションを置き換えた
    Applied(usize),
    /// より新しい同期が先に反映済みのため破棄した
    Stale,
}

pub struct RecordStore<R: Record> {
    api: Arc<dyn RecordApi<R>>,
    state: RwLock<StoreState<R>>,
    tickets: AtomicU64,
    strategy: SyncStrategy,
    images: Option<ImageResolver>,
}

impl<R: Record> RecordStore<R> {
    pub fn new(api: Arc<dyn RecordApi<R>>) -> Self {
        Self {
            api,
            state: RwLock::new(StoreState {
                records: Vec::new(),
                applied_ticket: 0,
                refetch_ticket: 0,
                in_flight: 0,
            }),
            tickets: AtomicU64::new(0),
            strategy: SyncStrategy::default(),
            images: None,
        }
    }

    pub fn with_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// 画像付きレコードの削除時に画像も削除する
    pub fn with_image_cleanup(mut self, images: ImageResolver) -> Self {
        self.images = Some(images);
        self
    }

    fn read_state(&self) -> RwLockReadGuard<'_, StoreState<R>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, StoreState<R>> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// 現在のローカルコレクション
    /// 直近の同期またはローカル更新の状態を返し、リモートの最新性は保証しない
    pub fn list(&self) -> Vec<R> {
        self.read_state().records.clone()
    }

    pub fn len(&self) -> usize {
        self.read_state().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read_state().records.is_empty()
    }

    pub fn find(&self, id: &RecordId) -> Option<R> {
        self.read_state()
            .records
            .iter()
            .find(|r| r.id() == id)
            .cloned()
    }

    pub fn is_loading(&self) -> bool {
        self.read_state().in_flight > 0
    }

    /// 一覧を再取得してローカルのコレクションを置き換える
    ///
    /// 発行時にチケットを取り、より新しいチケットが既に反映済みなら結果を破棄する。
    #[instrument(skip(self), fields(record_type = R::TYPE_NAME))]
    pub async fn refresh(&self) -> Result<RefreshOutcome, AppError> {
        let operation = operation_name::<R>("list");
        let ticket = self.next_ticket();
        let _loading = LoadingGuard::start(self);

        let records = trace_remote_call("record-api", &operation, || self.api.list())
            .await
            .map_err(|e| {
                record_error(&e, &operation);
                e
            })?;

        let mut state = self.write_state();
        if ticket <= state.applied_ticket {
            debug!(
                "古い一覧取得結果を破棄: ticket={}, applied={}",
                ticket, state.applied_ticket
            );
            return Ok(RefreshOutcome::Stale);
        }

        let count = records.len();
        state.records = records;
        state.applied_ticket = ticket;
        state.refetch_ticket = ticket;
        debug!("一覧取得を反映: {} 件", count);
        Ok(RefreshOutcome::Applied(count))
    }

    /// リモートから 1 件取得する（ローカルのコレクションは変更しない）
    #[instrument(skip(self), fields(record_type = R::TYPE_NAME))]
    pub async fn get(&self, id: &RecordId) -> Result<R, AppError> {
        let operation = operation_name::<R>("get");
        trace_remote_call("record-api", &operation, || self.api.get(id))
            .await
            .map_err(|e| {
                record_error(&e, &operation);
                e
            })
    }

    /// レコードを作成する
    ///
    /// 必須フィールドが欠けている場合はリモートを呼ばずに `AppError::Validation` を返す。
    /// 作成に失敗した場合、ローカルのコレクションは変更しない。
    #[instrument(skip(self, input), fields(record_type = R::TYPE_NAME))]
    pub async fn add(&self, input: R::Input) -> Result<R, AppError> {
        if let Err(e) = input.validate() {
            let error = AppError::from(e);
            warn!("入力検証エラーのため作成しません: {}", error);
            return Err(error);
        }

        let operation = operation_name::<R>("create");
        let created = trace_remote_call("record-api", &operation, || self.api.create(&input))
            .await
            .map_err(|e| {
                record_error(&e, &operation);
                e
            })?;

        info!("レコード作成完了: id={}", created.id());
        self.resync(MutationResult::Created(created.clone())).await;
        Ok(created)
    }

    /// レコードを削除し、ローカルからも即座に除外する
    ///
    /// ローカルに該当レコードがあった場合は true を返す。
    /// リモートに既に存在しない場合は削除済みとして扱い、エラーにしない。
    #[instrument(skip(self), fields(record_type = R::TYPE_NAME))]
    pub async fn remove(&self, id: &RecordId) -> Result<bool, AppError> {
        let operation = operation_name::<R>("delete");
        match trace_remote_call("record-api", &operation, || self.api.delete(id)).await {
            Ok(_) => {}
            Err(AppError::NotFound(_)) => {
                debug!("リモートに存在しないレコード: id={}", id);
            }
            Err(e) => {
                record_error(&e, &operation);
                return Err(e);
            }
        }

        let existing = self.find(id);
        self.apply_local(
            MutationResult::Deleted(id.clone()),
            self.tickets.load(Ordering::SeqCst),
        );

        if let (Some(record), Some(images)) = (&existing, &self.images) {
            if let Some(key) = record.image_key() {
                images.delete(key).await;
            }
        }

        info!("レコード削除完了: id={}, local={}", id, existing.is_some());
        Ok(existing.is_some())
    }

    /// ステータスを反対側に切り替える
    /// 送信するのは `id` と新しい `status` のみ
    #[instrument(skip(self, record), fields(record_type = R::TYPE_NAME, id = %record.id()))]
    pub async fn toggle_status(&self, record: &R) -> Result<R, AppError> {
        let next = record.status().toggled();
        debug!(
            "ステータス切り替え: {} -> {}",
            record.status().as_str(),
            next.as_str()
        );
        self.send_update(record.id(), status_patch(next)).await
    }

    /// 任意フィールドの部分更新
    /// フィールド定義に無いキーや読み取り専用のキーは `AppError::Validation`
    #[instrument(skip(self, patch), fields(record_type = R::TYPE_NAME))]
    pub async fn update(&self, id: &RecordId, patch: FieldMap) -> Result<R, AppError> {
        validate_patch::<R>(&patch)?;
        self.send_update(id, patch).await
    }

    /// フォームの内容を送信する
    /// 全フィールドを検証し、エラーがあればリモートを呼ばない
    pub async fn submit(&self, id: &RecordId, form: &mut FormState) -> Result<R, AppError> {
        let patch = form.to_patch()?;
        self.update(id, patch).await
    }

    async fn send_update(&self, id: &RecordId, patch: FieldMap) -> Result<R, AppError> {
        let operation = operation_name::<R>("update");
        let updated = trace_remote_call("record-api", &operation, || self.api.update(id, &patch))
            .await
            .map_err(|e| {
                record_error(&e, &operation);
                e
            })?;

        info!("レコード更新完了: id={}", updated.id());
        self.resync(MutationResult::Updated(updated.clone())).await;
        Ok(updated)
    }

    /// ミューテーション成功後にローカルを同期する
    ///
    /// 再取得が失敗または破棄された場合はレスポンスで直接更新する。
    /// ただしミューテーション完了後に発行された一覧取得が既に反映済みなら、
    /// その一覧がこの書き込み以降の状態なのでレスポンスは使わない。
    /// リモートの書き込みは完了しているため、ここでの失敗は呼び出し側に返さない。
    async fn resync(&self, result: MutationResult<R>) {
        let completed_at = self.tickets.load(Ordering::SeqCst);

        if self.strategy == SyncStrategy::Refetch {
            match self.refresh().await {
                Ok(RefreshOutcome::Applied(_)) => return,
                Ok(RefreshOutcome::Stale) => {
                    debug!("再取得が破棄されました: id={}", result.record_id());
                }
                Err(e) => {
                    warn!(
                        "再取得に失敗しました: id={}, error={}",
                        result.record_id(),
                        e
                    );
                }
            }

            if self.read_state().refetch_ticket > completed_at {
                debug!(
                    "より新しい一覧取得が反映済みのためレスポンスを破棄: id={}",
                    result.record_id()
                );
                return;
            }
            debug!("レスポンスで更新: id={}", result.record_id());
        }
        self.apply_local(result, completed_at);
    }

    /// レスポンスをローカルに反映する
    /// `completed_at` より後に発行された一覧取得が反映済みの場合は何もしない
    fn apply_local(&self, result: MutationResult<R>, completed_at: u64) {
        let ticket = self.next_ticket();
        let mut state = self.write_state();
        if state.refetch_ticket > completed_at {
            return;
        }
        let records = std::mem::take(&mut state.records);
        state.records = apply_mutation_result(records, result);
        state.applied_ticket = state.applied_ticket.max(ticket);
    }
}

impl RecordStore<Expense> {
    /// 金額の合計
    pub fn total(&self) -> f64 {
        total_amount(self.read_state().records.iter())
    }

    pub fn by_category(&self, category: &str) -> Vec<Expense> {
        self.read_state()
            .records
            .iter()
            .filter(|expense| expense.in_category(category))
            .cloned()
            .collect()
    }
}

/// 一覧取得中フラグ
struct LoadingGuard<'a, R: Record> {
    store: &'a RecordStore<R>,
}

impl<'a, R: Record> LoadingGuard<'a, R> {
    fn start(store: &'a RecordStore<R>) -> Self {
        store.write_state().in_flight += 1;
        Self { store }
    }
}

impl<R: Record> Drop for LoadingGuard<'_, R> {
    fn drop(&mut self) {
        let mut state = self.store.write_state();
        state.in_flight = state.in_flight.saturating_sub(1);
    }
}
