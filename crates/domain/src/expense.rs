use crate::errors::DomainError;
use crate::record::{
    FieldKind, FieldSpec, ImageKey, Record, RecordId, RecordInput, RecordStatus,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// 支出のステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpenseStatus {
    #[default]
    Pending,
    Paid,
}

impl RecordStatus for ExpenseStatus {
    fn toggled(self) -> Self {
        match self {
            ExpenseStatus::Pending => ExpenseStatus::Paid,
            ExpenseStatus::Paid => ExpenseStatus::Pending,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            ExpenseStatus::Pending => "PENDING",
            ExpenseStatus::Paid => "PAID",
        }
    }
}

const EXPENSE_STATUSES: &[&str] = &["PENDING", "PAID"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: RecordId,
    pub name: String,
    pub amount: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    pub status: ExpenseStatus,
    #[serde(default)]
    pub receipt_image_key: Option<ImageKey>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl Expense {
    pub fn is_paid(&self) -> bool {
        self.status == ExpenseStatus::Paid
    }

    pub fn in_category(&self, category: &str) -> bool {
        self.category.as_deref() == Some(category)
    }
}

impl Record for Expense {
    type Status = ExpenseStatus;
    type Input = ExpenseInput;

    const TYPE_NAME: &'static str = "Expense";
    const PLURAL_NAME: &'static str = "Expenses";
    // 更新フォームのバリデーション定義に合わせ、notes と receiptImageKey 以外は必須
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("name", FieldKind::Text),
        FieldSpec::required("amount", FieldKind::Decimal),
        FieldSpec::required("category", FieldKind::Text),
        FieldSpec::optional("notes", FieldKind::Text),
        FieldSpec::required("date", FieldKind::Date),
        FieldSpec::required("status", FieldKind::Enum(EXPENSE_STATUSES)),
        FieldSpec::optional("receiptImageKey", FieldKind::ImageKey),
    ];

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn status(&self) -> ExpenseStatus {
        self.status
    }

    fn image_key(&self) -> Option<&ImageKey> {
        self.receipt_image_key.as_ref()
    }
}

/// 支出作成時の入力
/// `amount` は未入力を表現できるよう Option で持つ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseInput {
    pub name: String,
    pub amount: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    pub status: ExpenseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_image_key: Option<ImageKey>,
}

impl ExpenseInput {
    pub fn new(name: impl Into<String>, amount: f64) -> Self {
        Self {
            name: name.into(),
            amount: Some(amount),
            category: None,
            notes: None,
            date: None,
            status: ExpenseStatus::default(),
            receipt_image_key: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn with_date(mut self, date: NaiveDate) -> Self {
        self.date = Some(date);
        self
    }

    pub fn with_receipt(mut self, key: ImageKey) -> Self {
        self.receipt_image_key = Some(key);
        self
    }
}

impl RecordInput for ExpenseInput {
    fn validate(&self) -> Result<(), DomainError> {
        if self.name.trim().is_empty() {
            return Err(DomainError::MissingField("name".to_string()));
        }
        match self.amount {
            None => Err(DomainError::MissingField("amount".to_string())),
            Some(amount) if !amount.is_finite() => Err(DomainError::InvalidField {
                field: "amount".to_string(),
                message: format!("amount must be a finite number: {amount}"),
            }),
            Some(_) => Ok(()),
        }
    }
}

/// 金額の合計
pub fn total_amount<'a>(expenses: impl IntoIterator<Item = &'a Expense>) -> f64 {
    expenses.into_iter().map(|expense| expense.amount).sum()
}
