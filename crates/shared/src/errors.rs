use domain::DomainError;
use thiserror::Error;

/// アプリケーション全体で使用される包括的なエラー型
///
/// レコードストアと画像リゾルバーの全操作はこの型を `Result` で返す。
#[derive(Debug, Clone, Error)]
pub enum AppError {
    // 入力エラー
    #[error("Validation failed: {0}")]
    Validation(DomainError),

    #[error("Domain error: {0}")]
    Domain(DomainError),

    // リモートAPIエラー
    #[error("Remote call failed ({operation}): {message}")]
    RemoteCall { operation: String, message: String },

    #[error("Resource not found: {0}")]
    NotFound(String),

    // ストレージエラー
    #[error("Upload failed: {0}")]
    Upload(String),

    #[error("Image resolution failed: {0}")]
    Resolution(String),

    // 認証エラー
    #[error("Authentication failed: {0}")]
    Authentication(String),

    // システムエラー
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<DomainError> for AppError {
    fn from(error: DomainError) -> Self {
        if error.is_validation() {
            AppError::Validation(error)
        } else {
            AppError::Domain(error)
        }
    }
}

/// エラーの分類
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    /// 呼び出し側の入力に起因するエラー
    Client,
    /// リモートサービス側のエラー
    Remote,
    /// ローカルの設定・実装に起因するエラー
    Internal,
}

/// エラーの重要度
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// エラーメタデータ
#[derive(Debug, Clone)]
pub struct ErrorMetadata {
    pub code: &'static str,
    pub category: ErrorCategory,
    pub severity: ErrorSeverity,
}

impl AppError {
    pub fn remote(operation: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::RemoteCall {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// エラーメタデータを取得
    pub fn metadata(&self) -> ErrorMetadata {
        let (code, category, severity) = match self {
            AppError::Validation(_) => ("VALIDATION_ERROR", ErrorCategory::Client, ErrorSeverity::Info),
            AppError::Domain(_) => ("DOMAIN_ERROR", ErrorCategory::Internal, ErrorSeverity::Error),
            AppError::RemoteCall { .. } => {
                ("REMOTE_CALL_ERROR", ErrorCategory::Remote, ErrorSeverity::Error)
            }
            AppError::NotFound(_) => ("NOT_FOUND", ErrorCategory::Client, ErrorSeverity::Info),
            AppError::Upload(_) => ("UPLOAD_ERROR", ErrorCategory::Remote, ErrorSeverity::Error),
            AppError::Resolution(_) => {
                ("RESOLUTION_ERROR", ErrorCategory::Remote, ErrorSeverity::Warning)
            }
            AppError::Authentication(_) => {
                ("AUTHENTICATION_ERROR", ErrorCategory::Client, ErrorSeverity::Warning)
            }
            AppError::Configuration(_) => {
                ("CONFIGURATION_ERROR", ErrorCategory::Internal, ErrorSeverity::Critical)
            }
            AppError::Serialization(_) => {
                ("SERIALIZATION_ERROR", ErrorCategory::Internal, ErrorSeverity::Error)
            }
        };

        ErrorMetadata {
            code,
            category,
            severity,
        }
    }

    /// 入力エラーかどうか（リモート呼び出しは発生していない）
    pub fn is_validation(&self) -> bool {
        matches!(self, AppError::Validation(_))
    }

    /// リモート側の失敗かどうか
    pub fn is_remote(&self) -> bool {
        self.metadata().category == ErrorCategory::Remote
    }

    /// ユーザー向けメッセージを取得
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(DomainError::MissingField(field)) => {
                format!("{field} を入力してください")
            }
            AppError::Validation(_) => "入力データが無効です".to_string(),
            AppError::NotFound(_) => "対象のデータが見つかりません".to_string(),
            AppError::RemoteCall { .. } => {
                "サーバーとの通信に失敗しました。変更は保存されていません".to_string()
            }
            AppError::Upload(_) => "画像のアップロードに失敗しました".to_string(),
            AppError::Authentication(_) => "認証に失敗しました".to_string(),
            _ => "予期しないエラーが発生しました".to_string(),
        }
    }
}
