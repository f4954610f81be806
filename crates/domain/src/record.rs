use crate::errors::DomainError;
use chrono::NaiveDate;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// フィールド名 → 値 のマッピング（GraphQL の input と同じ形）
pub type FieldMap = Map<String, Value>;

/// サーバー側で設定されるフィールド（クライアントからは書き込み不可）
pub const SYSTEM_FIELDS: &[&str] = &["id", "createdAt", "updatedAt", "owner"];

/// レコードID
/// 作成時にリモートAPIが採番し、以後は変更されない
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    /// 新しいレコードIDを生成（フェイクAPI・テスト用）
    pub fn new() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    /// 文字列からレコードIDを作成
    pub fn from_string(id: impl Into<String>) -> Result<Self, DomainError> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(DomainError::InvalidRecordId(
                "Record ID cannot be empty".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 画像キー
/// ストレージ上のパスからプレフィックスを除いた不透明な文字列
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ImageKey(String);

impl ImageKey {
    /// 文字列から画像キーを作成
    /// 既存レコードのキーはアップロード元のファイル名を含むため、空文字以外は受け入れる
    pub fn from_string(key: impl Into<String>) -> Result<Self, DomainError> {
        let key = key.into();
        if key.trim().is_empty() {
            return Err(DomainError::InvalidImageKey(
                "Image key cannot be empty".to_string(),
            ));
        }
        Ok(Self(key))
    }

    /// ストレージのパスに連結しても名前空間の外に出ないキーかどうか
    pub fn is_path_safe(&self) -> bool {
        !self.0.contains('/') && !self.0.contains('\\') && self.0 != "." && self.0 != ".."
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ImageKey {
    type Error = DomainError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_string(value)
    }
}

impl From<ImageKey> for String {
    fn from(key: ImageKey) -> Self {
        key.0
    }
}

impl fmt::Display for ImageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// フィールドの値の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Decimal,
    Enum(&'static [&'static str]),
    /// `YYYY-MM-DD`
    Date,
    ImageKey,
}

/// レコード型ごとのフィールド定義
/// GraphQL の選択セットとフォームのバリデーションの両方に使う
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

impl FieldSpec {
    pub const fn required(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: true,
        }
    }

    pub const fn optional(name: &'static str, kind: FieldKind) -> Self {
        Self {
            name,
            kind,
            required: false,
        }
    }

    /// 値をフィールド定義に照らして検証する
    /// エラー時はフォームにそのまま表示できるメッセージを返す
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let blank = match value {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        };
        if blank {
            return if self.required {
                Err("The value is required".to_string())
            } else {
                Ok(())
            };
        }

        match (self.kind, value) {
            (FieldKind::Text, Value::String(_)) => Ok(()),
            (FieldKind::Decimal, Value::Number(n)) => match n.as_f64() {
                Some(v) if v.is_finite() => Ok(()),
                _ => Err("The value must be a finite number".to_string()),
            },
            (FieldKind::Enum(allowed), Value::String(s)) => {
                if allowed.contains(&s.as_str()) {
                    Ok(())
                } else {
                    Err(format!("The value must be one of: {}", allowed.join(", ")))
                }
            }
            (FieldKind::Date, Value::String(s)) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map(|_| ())
                .map_err(|_| "The value must be a valid date (YYYY-MM-DD)".to_string()),
            (FieldKind::ImageKey, Value::String(s)) => ImageKey::from_string(s.clone())
                .map(|_| ())
                .map_err(|e| e.to_string()),
            (FieldKind::Decimal, _) => Err("The value must be a number".to_string()),
            _ => Err("The value must be text".to_string()),
        }
    }
}

/// 二値で切り替わるステータス
pub trait RecordStatus:
    Copy + Eq + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// 反対側のステータスを返す（2回適用すると元に戻る）
    fn toggled(self) -> Self;

    fn as_str(&self) -> &'static str;
}

/// 作成時の入力
pub trait RecordInput: Clone + fmt::Debug + Serialize + Send + Sync + 'static {
    /// 必須フィールドが揃っているかを検証
    fn validate(&self) -> Result<(), DomainError>;
}

/// リモートに永続化され、ローカルにキャッシュされるドメインエンティティ
pub trait Record:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    type Status: RecordStatus;
    type Input: RecordInput;

    /// GraphQL の型名（例: `Task`）
    const TYPE_NAME: &'static str;

    /// 一覧クエリで使う複数形（例: `Tasks`）
    const PLURAL_NAME: &'static str;

    /// クライアントが書き込めるフィールド
    const FIELDS: &'static [FieldSpec];

    fn id(&self) -> &RecordId;

    fn status(&self) -> Self::Status;

    fn image_key(&self) -> Option<&ImageKey> {
        None
    }

    fn field_spec(name: &str) -> Option<&'static FieldSpec> {
        Self::FIELDS.iter().find(|spec| spec.name == name)
    }

    /// GraphQL の選択セットに並べるフィールド名
    fn selection_fields() -> Vec<&'static str> {
        let mut fields = vec!["id"];
        fields.extend(Self::FIELDS.iter().map(|spec| spec.name));
        fields.extend(SYSTEM_FIELDS.iter().skip(1));
        fields
    }
}

/// 部分更新の内容をフィールド定義に照らして検証する
pub fn validate_patch<R: Record>(patch: &FieldMap) -> Result<(), DomainError> {
    for (name, value) in patch {
        if SYSTEM_FIELDS.contains(&name.as_str()) {
            return Err(DomainError::ReadOnlyField(name.clone()));
        }
        let spec = R::field_spec(name).ok_or_else(|| DomainError::UnknownField(name.clone()))?;
        spec.check(value).map_err(|message| DomainError::InvalidField {
            field: name.clone(),
            message,
        })?;
    }
    Ok(())
}

/// ステータスだけを書き換える部分更新を作る
pub fn status_patch<S: RecordStatus>(status: S) -> FieldMap {
    let mut patch = FieldMap::new();
    patch.insert("status".to_string(), Value::String(status.as_str().to_string()));
    patch
}
