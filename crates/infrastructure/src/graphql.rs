//! GraphQL（AppSync）用のリクエスト/レスポンス整形
//!
//! レコード型のフィールド定義からクエリ・ミューテーション文書を組み立て、
//! `{ query, variables }` を POST し、`data` / `errors` を展開する。

use crate::api::{operation_name, RecordApi};
use async_trait::async_trait;
use domain::{FieldMap, Record, RecordId};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared::telemetry::trace_remote_call;
use shared::{AppError, Config};
use std::marker::PhantomData;
use tracing::debug;

/// レコード型ごとの GraphQL 文書
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphQlDocuments {
    pub list: String,
    pub get: String,
    pub create: String,
    pub update: String,
    pub delete: String,
}

impl GraphQlDocuments {
    pub fn for_record<R: Record>() -> Self {
        let t = R::TYPE_NAME;
        let plural = R::PLURAL_NAME;
        let selection = R::selection_fields().join(" ");

        Self {
            list: format!("query List{plural} {{ list{plural} {{ items {{ {selection} }} }} }}"),
            get: format!("query Get{t}($id: ID!) {{ get{t}(id: $id) {{ {selection} }} }}"),
            create: format!(
                "mutation Create{t}($input: Create{t}Input!) {{ create{t}(input: $input) {{ {selection} }} }}"
            ),
            update: format!(
                "mutation Update{t}($input: Update{t}Input!) {{ update{t}(input: $input) {{ {selection} }} }}"
            ),
            delete: format!(
                "mutation Delete{t}($input: Delete{t}Input!) {{ delete{t}(input: $input) {{ id }} }}"
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: Value,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

/// GraphQL のエラー要素
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphQlError {
    pub message: String,
    #[serde(default)]
    pub error_type: Option<String>,
}

impl GraphQlError {
    // 存在しないレコードへの条件付き書き込みは DynamoDB の条件チェック失敗として返る。
    // 所有者認可（@auth(owner)）で他人のレコードに書き込んだ場合も同じエラーになるため、
    // 呼び出し側で `get` により不在を確認する
    fn is_not_found(&self) -> bool {
        self.error_type
            .as_deref()
            .is_some_and(|t| t.ends_with("ConditionalCheckFailedException"))
    }
}

/// GraphQL エンドポイントへの HTTP クライアント
/// プロセス全体で共有するシングルトンではなく、明示的に生成して各ストアへ渡す
#[derive(Clone)]
pub struct GraphQlClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    auth_token: Option<String>,
}

impl GraphQlClient {
    pub fn new(config: &Config) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: config.graphql_endpoint.clone(),
            api_key: config.graphql_api_key.clone(),
            auth_token: None,
        }
    }

    /// ユーザープールのトークンで認可する
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// レコード型に対応する API を作成
    pub fn records<R: Record>(&self) -> GraphQlRecordApi<R> {
        GraphQlRecordApi::new(self.clone())
    }

    /// 文書を実行し、`data` を返す
    pub async fn execute(
        &self,
        operation: &str,
        query: &str,
        variables: Value,
    ) -> Result<Value, AppError> {
        trace_remote_call("graphql", operation, || async {
            let mut request = self
                .http
                .post(&self.endpoint)
                .header(CONTENT_TYPE, "application/json")
                .json(&GraphQlRequest { query, variables });

            if let Some(api_key) = &self.api_key {
                request = request.header("x-api-key", api_key);
            }
            if let Some(token) = &self.auth_token {
                request = request.header(AUTHORIZATION, token);
            }

            let response = request
                .send()
                .await
                .map_err(|e| AppError::remote(operation, e.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                return Err(AppError::Authentication(format!(
                    "{operation} rejected with status {status}"
                )));
            }

            let body: GraphQlResponse = response.json().await.map_err(|e| {
                AppError::remote(operation, format!("status {status}: invalid response body: {e}"))
            })?;

            unwrap_response(operation, body)
        })
        .await
    }
}

/// `data` / `errors` を展開する
fn unwrap_response(operation: &str, response: GraphQlResponse) -> Result<Value, AppError> {
    if !response.errors.is_empty() {
        if response.errors.iter().any(GraphQlError::is_not_found) {
            return Err(AppError::NotFound(format!("{operation}: record does not exist")));
        }
        let messages = response
            .errors
            .iter()
            .map(|e| e.message.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        return Err(AppError::remote(operation, messages));
    }

    response
        .data
        .ok_or_else(|| AppError::remote(operation, "response has no data"))
}

/// `data.<operation>` を取り出す（null の場合は NotFound）
fn take_field(operation: &str, mut data: Value) -> Result<Value, AppError> {
    match data.get_mut(operation).map(Value::take) {
        Some(Value::Null) | None => Err(AppError::NotFound(format!(
            "{operation}: record does not exist"
        ))),
        Some(value) => Ok(value),
    }
}

fn decode<R: Record>(operation: &str, value: Value) -> Result<R, AppError> {
    serde_json::from_value(value).map_err(|e| {
        AppError::Serialization(format!("{operation}: cannot decode {}: {e}", R::TYPE_NAME))
    })
}

/// レコード型ごとの GraphQL 実装
pub struct GraphQlRecordApi<R> {
    client: GraphQlClient,
    documents: GraphQlDocuments,
    _record: PhantomData<fn() -> R>,
}

impl<R: Record> GraphQlRecordApi<R> {
    pub fn new(client: GraphQlClient) -> Self {
        Self {
            client,
            documents: GraphQlDocuments::for_record::<R>(),
            _record: PhantomData,
        }
    }

    /// 条件チェック失敗による NotFound を、レコードの不在を確かめてから確定する
    /// 読めるレコードが残っていれば書き込みが拒否されたものとして RemoteCall を返す
    async fn confirm_missing(&self, operation: &str, id: &RecordId, error: AppError) -> AppError {
        match self.get(id).await {
            Ok(_) => AppError::remote(
                operation,
                format!("conditional check failed on existing record {id}"),
            ),
            Err(AppError::NotFound(_)) => error,
            Err(other) => other,
        }
    }
}

#[async_trait]
impl<R: Record> RecordApi<R> for GraphQlRecordApi<R> {
    async fn list(&self) -> Result<Vec<R>, AppError> {
        let operation = operation_name::<R>("list");
        let data = self
            .client
            .execute(&operation, &self.documents.list, json!({}))
            .await?;

        let connection = take_field(&operation, data)?;
        let items = match connection.get("items") {
            Some(Value::Array(items)) => items.clone(),
            _ => {
                return Err(AppError::remote(&operation, "response has no items"));
            }
        };

        // 認可で弾かれた要素は null で返ることがあるため除外する
        let records = items
            .into_iter()
            .filter(|item| !item.is_null())
            .map(|item| decode::<R>(&operation, item))
            .collect::<Result<Vec<_>, _>>()?;

        debug!("{} 件取得: {}", records.len(), operation);
        Ok(records)
    }

    async fn get(&self, id: &RecordId) -> Result<R, AppError> {
        let operation = operation_name::<R>("get");
        let data = self
            .client
            .execute(&operation, &self.documents.get, json!({ "id": id }))
            .await?;
        decode(&operation, take_field(&operation, data)?)
    }

    async fn create(&self, input: &R::Input) -> Result<R, AppError> {
        let operation = operation_name::<R>("create");
        let data = self
            .client
            .execute(&operation, &self.documents.create, json!({ "input": input }))
            .await?;
        decode(&operation, take_field(&operation, data)?)
    }

    async fn update(&self, id: &RecordId, patch: &FieldMap) -> Result<R, AppError> {
        let operation = operation_name::<R>("update");
        let mut input = patch.clone();
        input.insert("id".to_string(), json!(id));

        let data = match self
            .client
            .execute(&operation, &self.documents.update, json!({ "input": input }))
            .await
        {
            Err(e @ AppError::NotFound(_)) => {
                return Err(self.confirm_missing(&operation, id, e).await);
            }
            other => other?,
        };
        decode(&operation, take_field(&operation, data)?)
    }

    async fn delete(&self, id: &RecordId) -> Result<RecordId, AppError> {
        let operation = operation_name::<R>("delete");
        let data = match self
            .client
            .execute(&operation, &self.documents.delete, json!({ "input": { "id": id } }))
            .await
        {
            Err(e @ AppError::NotFound(_)) => {
                return Err(self.confirm_missing(&operation, id, e).await);
            }
            other => other?,
        };

        let deleted = take_field(&operation, data)?;
        let deleted_id = deleted
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| AppError::remote(&operation, "response has no id"))?;
        Ok(RecordId::from_string(deleted_id)?)
    }
}
