//! インメモリのレコードAPI
//!
//! リモートAPIと同じ振る舞い（ID・タイムスタンプ・所有者の採番、部分更新、
//! 存在しないIDへの NotFound）を再現する。テストとローカル開発用。

use crate::api::{operation_name, RecordApi};
use async_trait::async_trait;
use chrono::Utc;
use domain::{FieldMap, Record, RecordId};
use serde_json::Value;
use shared::AppError;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// API 操作の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApiOperation {
    List,
    Get,
    Create,
    Update,
    Delete,
}

impl ApiOperation {
    fn verb(self) -> &'static str {
        match self {
            ApiOperation::List => "list",
            ApiOperation::Get => "get",
            ApiOperation::Create => "create",
            ApiOperation::Update => "update",
            ApiOperation::Delete => "delete",
        }
    }
}

pub struct InMemoryRecordApi<R> {
    owner: String,
    records: Mutex<Vec<R>>,
    failing: Mutex<HashSet<ApiOperation>>,
    calls: Mutex<HashMap<ApiOperation, usize>>,
    list_delay: Mutex<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<R: Record> InMemoryRecordApi<R> {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            records: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
            calls: Mutex::new(HashMap::new()),
            list_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn with_records(self, records: Vec<R>) -> Self {
        *lock(&self.records) = records;
        self
    }

    /// 指定した操作を失敗させる
    pub fn fail(&self, operation: ApiOperation) {
        lock(&self.failing).insert(operation);
    }

    /// 失敗指定を解除する
    pub fn recover(&self, operation: ApiOperation) {
        lock(&self.failing).remove(&operation);
    }

    /// 一覧取得の応答を遅らせる
    /// 遅延前にスナップショットを取るため、遅れて届く古い一覧を再現できる
    pub fn set_list_delay(&self, delay: Duration) {
        *lock(&self.list_delay) = delay;
    }

    pub fn call_count(&self, operation: ApiOperation) -> usize {
        lock(&self.calls).get(&operation).copied().unwrap_or(0)
    }

    /// リモート側の現在の内容
    pub fn records(&self) -> Vec<R> {
        lock(&self.records).clone()
    }

    /// 他のクライアントによる書き込みを再現する
    pub fn insert_remote(&self, record: R) {
        lock(&self.records).push(record);
    }

    fn begin(&self, operation: ApiOperation) -> Result<(), AppError> {
        *lock(&self.calls).entry(operation).or_insert(0) += 1;
        if lock(&self.failing).contains(&operation) {
            return Err(AppError::remote(
                operation_name::<R>(operation.verb()),
                "injected failure",
            ));
        }
        Ok(())
    }

    fn not_found(operation: ApiOperation, id: &RecordId) -> AppError {
        AppError::NotFound(format!(
            "{}: {} {} does not exist",
            operation_name::<R>(operation.verb()),
            R::TYPE_NAME,
            id
        ))
    }
}

fn to_object<T: serde::Serialize>(value: &T) -> Result<FieldMap, AppError> {
    match serde_json::to_value(value) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(AppError::Serialization(format!(
            "expected an object, got {other}"
        ))),
        Err(e) => Err(AppError::Serialization(e.to_string())),
    }
}

fn from_object<R: Record>(map: FieldMap) -> Result<R, AppError> {
    serde_json::from_value(Value::Object(map))
        .map_err(|e| AppError::Serialization(format!("cannot build {}: {e}", R::TYPE_NAME)))
}

#[async_trait]
impl<R: Record> RecordApi<R> for InMemoryRecordApi<R> {
    async fn list(&self) -> Result<Vec<R>, AppError> {
        self.begin(ApiOperation::List)?;
        let snapshot = self.records();
        let delay = *lock(&self.list_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        Ok(snapshot)
    }

    async fn get(&self, id: &RecordId) -> Result<R, AppError> {
        self.begin(ApiOperation::Get)?;
        lock(&self.records)
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .ok_or_else(|| Self::not_found(ApiOperation::Get, id))
    }

    async fn create(&self, input: &R::Input) -> Result<R, AppError> {
        self.begin(ApiOperation::Create)?;
        let now = Utc::now().to_rfc3339();

        let mut fields = to_object(input)?;
        fields.insert("id".to_string(), Value::String(RecordId::new().to_string()));
        fields.insert("createdAt".to_string(), Value::String(now.clone()));
        fields.insert("updatedAt".to_string(), Value::String(now));
        fields.insert("owner".to_string(), Value::String(self.owner.clone()));

        let record: R = from_object(fields)?;
        lock(&self.records).push(record.clone());
        Ok(record)
    }

    async fn update(&self, id: &RecordId, patch: &FieldMap) -> Result<R, AppError> {
        self.begin(ApiOperation::Update)?;
        let mut records = lock(&self.records);
        let index = records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| Self::not_found(ApiOperation::Update, id))?;

        // 部分更新は指定されたフィールドの置き換え
        let mut fields = to_object(&records[index])?;
        for (name, value) in patch {
            if name != "id" {
                fields.insert(name.clone(), value.clone());
            }
        }
        fields.insert(
            "updatedAt".to_string(),
            Value::String(Utc::now().to_rfc3339()),
        );

        let updated: R = from_object(fields)?;
        records[index] = updated.clone();
        Ok(updated)
    }

    async fn delete(&self, id: &RecordId) -> Result<RecordId, AppError> {
        self.begin(ApiOperation::Delete)?;
        let mut records = lock(&self.records);
        let index = records
            .iter()
            .position(|r| r.id() == id)
            .ok_or_else(|| Self::not_found(ApiOperation::Delete, id))?;
        records.remove(index);
        Ok(id.clone())
    }
}
