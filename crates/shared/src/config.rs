use crate::errors::AppError;
use std::env;
use std::str::FromStr;

/// ミューテーション成功後のローカルコレクションの同期方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStrategy {
    /// 一覧を再取得して置き換える
    #[default]
    Refetch,
    /// ミューテーションのレスポンスでローカルを直接更新する
    Patch,
}

impl FromStr for SyncStrategy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "refetch" => Ok(SyncStrategy::Refetch),
            "patch" => Ok(SyncStrategy::Patch),
            other => Err(AppError::Configuration(format!(
                "Unknown SYNC_STRATEGY: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub environment: String,
    pub aws_region: String,
    pub graphql_endpoint: String,
    pub graphql_api_key: Option<String>,
    pub storage_bucket: String,
    pub storage_prefix: String,
    pub image_url_expires_secs: u64,
    pub sync_strategy: SyncStrategy,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// 任意のキー検索関数から設定を組み立てる
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let graphql_endpoint = lookup("GRAPHQL_ENDPOINT")
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| AppError::Configuration("GRAPHQL_ENDPOINT is not set".to_string()))?;

        let image_url_expires_secs = match lookup("IMAGE_URL_EXPIRES_SECS") {
            Some(v) => v.parse::<u64>().map_err(|_| {
                AppError::Configuration(format!("Invalid IMAGE_URL_EXPIRES_SECS: {v}"))
            })?,
            None => 900,
        };

        let sync_strategy = match lookup("SYNC_STRATEGY") {
            Some(v) => v.parse()?,
            None => SyncStrategy::default(),
        };

        let mut storage_prefix = lookup("STORAGE_PREFIX").unwrap_or_else(|| "public/".to_string());
        if !storage_prefix.is_empty() && !storage_prefix.ends_with('/') {
            storage_prefix.push('/');
        }

        Ok(Config {
            environment: lookup("ENVIRONMENT").unwrap_or_else(|| "dev".to_string()),
            aws_region: lookup("AWS_REGION").unwrap_or_else(|| "ap-northeast-1".to_string()),
            graphql_endpoint,
            graphql_api_key: lookup("GRAPHQL_API_KEY").filter(|v| !v.is_empty()),
            storage_bucket: lookup("STORAGE_BUCKET")
                .unwrap_or_else(|| "record-store-dev".to_string()),
            storage_prefix,
            image_url_expires_secs,
            sync_strategy,
        })
    }
}
