//! 更新フォームの状態
//!
//! 入力ごとに個別の状態を持つ代わりに、フィールド名 → 値 のマップと
//! フィールドごとの検証結果を 1 つの構造体で管理する。

use crate::errors::DomainError;
use crate::record::{FieldKind, FieldMap, FieldSpec, Record};
use serde_json::{Number, Value};
use std::collections::BTreeMap;

/// フィールド単位の検証結果
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldValidation {
    pub has_error: bool,
    pub error_message: Option<String>,
}

impl FieldValidation {
    fn from_check(result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::default(),
            Err(message) => Self {
                has_error: true,
                error_message: Some(message),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub struct FormState {
    fields: &'static [FieldSpec],
    initial: FieldMap,
    values: FieldMap,
    errors: BTreeMap<String, FieldValidation>,
}

impl FormState {
    /// 空のフォームを作成（全フィールドが空文字）
    pub fn new<R: Record>() -> Self {
        let initial: FieldMap = R::FIELDS
            .iter()
            .map(|spec| (spec.name.to_string(), Value::String(String::new())))
            .collect();
        Self {
            fields: R::FIELDS,
            values: initial.clone(),
            initial,
            errors: BTreeMap::new(),
        }
    }

    /// 既存レコードの値で初期化したフォームを作成
    pub fn from_record<R: Record>(record: &R) -> Result<Self, DomainError> {
        let value = serde_json::to_value(record)
            .map_err(|e| DomainError::Serialization(e.to_string()))?;
        let Value::Object(source) = value else {
            return Err(DomainError::Serialization(format!(
                "{} did not serialize to an object",
                R::TYPE_NAME
            )));
        };

        let initial: FieldMap = R::FIELDS
            .iter()
            .map(|spec| {
                let value = match source.get(spec.name) {
                    Some(Value::Null) | None => Value::String(String::new()),
                    Some(v) => v.clone(),
                };
                (spec.name.to_string(), value)
            })
            .collect();

        Ok(Self {
            fields: R::FIELDS,
            values: initial.clone(),
            initial,
            errors: BTreeMap::new(),
        })
    }

    pub fn value(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn values(&self) -> &FieldMap {
        &self.values
    }

    pub fn errors(&self) -> &BTreeMap<String, FieldValidation> {
        &self.errors
    }

    pub fn error(&self, name: &str) -> Option<&FieldValidation> {
        self.errors.get(name)
    }

    pub fn has_errors(&self) -> bool {
        self.errors.values().any(|v| v.has_error)
    }

    /// 値を変更する
    /// 数値フィールドに数値として解釈できる文字列が渡された場合は数値に変換する。
    /// 既にエラー表示中のフィールドは変更のたびに再検証する。
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), DomainError> {
        let spec = self.spec(name)?;
        let value = normalize(spec, value.into());
        self.values.insert(name.to_string(), value);

        if self.error(name).is_some_and(|v| v.has_error) {
            self.validate_field(name)?;
        }
        Ok(())
    }

    /// 1 フィールドを検証して結果を記録する
    pub fn validate_field(&mut self, name: &str) -> Result<&FieldValidation, DomainError> {
        let spec = self.spec(name)?;
        let value = self.values.get(name).cloned().unwrap_or(Value::Null);
        let validation = FieldValidation::from_check(spec.check(&value));
        self.errors.insert(name.to_string(), validation);
        Ok(&self.errors[name])
    }

    /// 全フィールドを検証し、エラーが無ければ true
    pub fn validate(&mut self) -> bool {
        for spec in self.fields {
            let value = self.values.get(spec.name).cloned().unwrap_or(Value::Null);
            self.errors.insert(
                spec.name.to_string(),
                FieldValidation::from_check(spec.check(&value)),
            );
        }
        !self.has_errors()
    }

    /// 初期値に戻し、検証結果を消去する
    pub fn reset(&mut self) {
        self.values = self.initial.clone();
        self.errors.clear();
    }

    /// 送信用の部分更新を作成する
    /// 全フィールドを検証し、空文字は null に置き換える
    pub fn to_patch(&mut self) -> Result<FieldMap, DomainError> {
        if !self.validate() {
            let failed = self
                .errors
                .iter()
                .filter(|(_, v)| v.has_error)
                .map(|(name, _)| name.clone())
                .collect();
            return Err(DomainError::InvalidForm(failed));
        }

        Ok(self
            .values
            .iter()
            .map(|(name, value)| {
                let value = match value {
                    Value::String(s) if s.is_empty() => Value::Null,
                    other => other.clone(),
                };
                (name.clone(), value)
            })
            .collect())
    }

    fn spec(&self, name: &str) -> Result<&'static FieldSpec, DomainError> {
        let fields: &'static [FieldSpec] = self.fields;
        fields
            .iter()
            .find(|spec| spec.name == name)
            .ok_or_else(|| DomainError::UnknownField(name.to_string()))
    }
}

fn normalize(spec: &FieldSpec, value: Value) -> Value {
    match (spec.kind, &value) {
        (FieldKind::Decimal, Value::String(s)) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or(value),
        _ => value,
    }
}
