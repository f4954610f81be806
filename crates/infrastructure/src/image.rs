//! 画像キーの解決
//!
//! レコードが持つ不透明な画像キーとストレージ上のパス・URL を対応付ける。

use async_trait::async_trait;
use domain::ImageKey;
use shared::telemetry::record_error;
use shared::{AppError, Config};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

/// オブジェクトストレージ
/// `path` は名前空間プレフィックス付きのキー
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError>;

    async fn get_url(&self, path: &str) -> Result<String, AppError>;

    async fn remove(&self, path: &str) -> Result<(), AppError>;
}

/// 画像キーのリゾルバー
#[derive(Clone)]
pub struct ImageResolver {
    storage: Arc<dyn ObjectStorage>,
    prefix: String,
}

impl ImageResolver {
    pub fn new(storage: Arc<dyn ObjectStorage>, prefix: impl Into<String>) -> Self {
        Self {
            storage,
            prefix: prefix.into(),
        }
    }

    pub fn from_config(storage: Arc<dyn ObjectStorage>, config: &Config) -> Self {
        Self::new(storage, config.storage_prefix.clone())
    }

    /// 画像キーに対応するストレージ上のパス
    /// パス区切りを含むキーはプレフィックスの外を指し得るため拒否する
    pub fn path_for(&self, key: &ImageKey) -> Result<String, AppError> {
        if !key.is_path_safe() {
            return Err(AppError::Resolution(format!(
                "image key must not contain path segments: {key}"
            )));
        }
        Ok(format!("{}{}", self.prefix, key))
    }

    /// 画像をアップロードし、レコードに保存する画像キーを返す
    ///
    /// キーは ULID（時刻由来）と元のファイル名を組み合わせて衝突を避ける。
    pub async fn upload(
        &self,
        blob: Vec<u8>,
        suggested_name: &str,
        content_type: &str,
    ) -> Result<ImageKey, AppError> {
        let key = ImageKey::from_string(format!(
            "{}-{}",
            ulid::Ulid::new(),
            sanitize_file_name(suggested_name)
        ))
        .map_err(|e| AppError::Upload(e.to_string()))?;
        let path = self
            .path_for(&key)
            .map_err(|e| AppError::Upload(e.to_string()))?;

        info!("画像アップロード開始: path={}, bytes={}", path, blob.len());
        self.storage
            .upload(&path, blob, content_type)
            .await
            .map_err(|e| {
                let error = match e {
                    AppError::Upload(_) => e,
                    other => AppError::Upload(other.to_string()),
                };
                record_error(&error, "image upload");
                error
            })?;

        debug!("画像アップロード完了: key={}", key);
        Ok(key)
    }

    /// 画像キーを取得可能な URL に解決する
    ///
    /// キーが無い場合はストレージに触れずに `None` を返す。
    /// 解決に失敗した場合もエラーは記録のみ行い `None` を返す（画像なしとして表示する）。
    pub async fn resolve(&self, key: Option<&ImageKey>) -> Option<String> {
        let key = key?;
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(error) => {
                record_error(&error, "image resolve");
                return None;
            }
        };

        match self.storage.get_url(&path).await {
            Ok(url) => Some(url),
            Err(e) => {
                let error = AppError::Resolution(format!("{path}: {e}"));
                record_error(&error, "image resolve");
                None
            }
        }
    }

    /// 画像を削除する（ベストエフォート）
    pub async fn delete(&self, key: &ImageKey) {
        let path = match self.path_for(key) {
            Ok(path) => path,
            Err(e) => {
                warn!("画像削除をスキップしました: error={}", e);
                return;
            }
        };
        match self.storage.remove(&path).await {
            Ok(()) => debug!("画像削除完了: path={}", path),
            Err(e) => warn!("画像削除に失敗しました: path={}, error={}", path, e),
        }
    }
}

/// ファイル名をキーに使える形に整える
/// ディレクトリ部分を落とし、英数字と `.-_` 以外は `_` に置き換える
fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.').replace("..", "_");
    if cleaned.is_empty() {
        "image".to_string()
    } else {
        cleaned
    }
}

const MEMORY_URL_SCHEME: &str = "memory://";

/// インメモリのオブジェクトストレージ
/// URL は `memory://<path>` 形式で、`fetch` で中身を取り出せる
#[derive(Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    fail_uploads: AtomicBool,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> MutexGuard<'_, HashMap<String, (Vec<u8>, String)>> {
        self.objects.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_fail_uploads(&self, fail: bool) {
        self.fail_uploads.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects().contains_key(path)
    }

    pub fn content_type(&self, path: &str) -> Option<String> {
        self.objects().get(path).map(|(_, content_type)| content_type.clone())
    }

    pub fn len(&self) -> usize {
        self.objects().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects().is_empty()
    }

    /// URL を参照して中身を取り出す
    pub fn fetch(&self, url: &str) -> Option<Vec<u8>> {
        let path = url.strip_prefix(MEMORY_URL_SCHEME)?;
        self.objects().get(path).map(|(data, _)| data.clone())
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn upload(&self, path: &str, data: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(AppError::Upload(format!("{path}: injected failure")));
        }
        self.objects()
            .insert(path.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get_url(&self, path: &str) -> Result<String, AppError> {
        if !self.contains(path) {
            return Err(AppError::NotFound(path.to_string()));
        }
        Ok(format!("{MEMORY_URL_SCHEME}{path}"))
    }

    async fn remove(&self, path: &str) -> Result<(), AppError> {
        self.objects()
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(path.to_string()))
    }
}
