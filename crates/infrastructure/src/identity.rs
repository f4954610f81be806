use async_trait::async_trait;
use aws_sdk_cognitoidentityprovider::config::Region;
use aws_sdk_cognitoidentityprovider::Client as CognitoClient;
use shared::{AppError, Config, IdentityProvider, Session};
use tracing::info;

/// Cognito ユーザープールのセッション
/// サインイン済みのアクセストークンを受け取り、ユーザー名の取得とサインアウトだけを行う
pub struct CognitoIdentityProvider {
    client: CognitoClient,
    access_token: String,
}

impl CognitoIdentityProvider {
    pub async fn new(config: &Config, access_token: impl Into<String>) -> Self {
        let aws_config = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.aws_region.clone()))
            .load()
            .await;

        Self {
            client: CognitoClient::new(&aws_config),
            access_token: access_token.into(),
        }
    }
}

#[async_trait]
impl IdentityProvider for CognitoIdentityProvider {
    async fn current_session(&self) -> Result<Session, AppError> {
        let user = self
            .client
            .get_user()
            .access_token(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Authentication(format!("Cognito GetUser エラー: {e}")))?;

        Ok(Session::new(user.username(), self.access_token.clone()))
    }

    async fn sign_out(&self) -> Result<(), AppError> {
        self.client
            .global_sign_out()
            .access_token(&self.access_token)
            .send()
            .await
            .map_err(|e| AppError::Authentication(format!("Cognito GlobalSignOut エラー: {e}")))?;

        info!("サインアウトしました");
        Ok(())
    }
}
