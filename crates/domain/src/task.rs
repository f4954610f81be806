use crate::errors::DomainError;
use crate::record::{FieldKind, FieldSpec, Record, RecordId, RecordInput, RecordStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// タスクのステータス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Todo,
    Completed,
}

impl RecordStatus for TaskStatus {
    fn toggled(self) -> Self {
        match self {
            TaskStatus::Todo => TaskStatus::Completed,
            TaskStatus::Completed => TaskStatus::Todo,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Todo => "TODO",
            TaskStatus::Completed => "COMPLETED",
        }
    }
}

/// タスクの優先度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "LOW",
            Priority::Medium => "MEDIUM",
            Priority::High => "HIGH",
        }
    }
}

const TASK_STATUSES: &[&str] = &["TODO", "COMPLETED"];
const PRIORITIES: &[&str] = &["LOW", "MEDIUM", "HIGH"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: RecordId,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Option<Priority>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub owner: Option<String>,
}

impl Task {
    pub fn is_completed(&self) -> bool {
        self.status == TaskStatus::Completed
    }
}

impl Record for Task {
    type Status = TaskStatus;
    type Input = TaskInput;

    const TYPE_NAME: &'static str = "Task";
    const PLURAL_NAME: &'static str = "Tasks";
    const FIELDS: &'static [FieldSpec] = &[
        FieldSpec::required("title", FieldKind::Text),
        FieldSpec::optional("description", FieldKind::Text),
        FieldSpec::required("status", FieldKind::Enum(TASK_STATUSES)),
        FieldSpec::optional("priority", FieldKind::Enum(PRIORITIES)),
    ];

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn status(&self) -> TaskStatus {
        self.status
    }
}

/// タスク作成時の入力
/// 入力フォームの初期値と同じく status=TODO, priority=MEDIUM で始まる
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskInput {
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: Priority,
}

impl TaskInput {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            status: TaskStatus::default(),
            priority: Priority::default(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        // 空の説明は未入力として扱う
        self.description = if description.trim().is_empty() {
            None
        } else {
            Some(description)
        };
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_status(mut self, status: TaskStatus) -> Self {
        self.status = status;
        self
    }
}

impl RecordInput for TaskInput {
    fn validate(&self) -> Result<(), DomainError> {
        if self.title.trim().is_empty() {
            return Err(DomainError::MissingField("title".to_string()));
        }
        Ok(())
    }
}
