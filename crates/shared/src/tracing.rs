use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// トレーシングサブスクライバーを初期化
/// RUST_LOG が未設定の場合は info レベルで出力する
pub fn init_tracing() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // 構造化ログ（JSON形式）で出力
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false).json())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init()?;

    Ok(())
}
