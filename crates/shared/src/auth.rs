use crate::errors::AppError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// 認証済みユーザーのセッション
/// ログインとトークン更新は外部の認証サービスに委譲する
#[derive(Clone, Serialize, Deserialize)]
pub struct Session {
    pub username: String,
    pub access_token: String,
}

impl Session {
    pub fn new(username: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            access_token: access_token.into(),
        }
    }
}

// アクセストークンはログに出さない
impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("username", &self.username)
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// 認証サービス
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// 現在のセッション（ユーザー名）を取得
    async fn current_session(&self) -> Result<Session, AppError>;

    /// サインアウト
    async fn sign_out(&self) -> Result<(), AppError>;
}

/// 固定のセッションを返す認証サービス
/// サインアウト後は `AppError::Authentication` を返す。テストとローカル開発用
pub struct StaticIdentityProvider {
    session: Session,
    signed_out: AtomicBool,
}

impl StaticIdentityProvider {
    pub fn new(session: Session) -> Self {
        Self {
            session,
            signed_out: AtomicBool::new(false),
        }
    }

    pub fn is_signed_out(&self) -> bool {
        self.signed_out.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentityProvider {
    async fn current_session(&self) -> Result<Session, AppError> {
        if self.is_signed_out() {
            return Err(AppError::Authentication("no active session".to_string()));
        }
        Ok(self.session.clone())
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        if self.signed_out.swap(true, Ordering::SeqCst) {
            return Err(AppError::Authentication("already signed out".to_string()));
        }
        Ok(())
    }
}
