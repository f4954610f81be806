use crate::errors::AppError;
use std::future::Future;
use std::time::Instant;
use tracing::{debug, error, instrument, warn};

/// リモートAPI呼び出しをトレースする
/// 所要時間と成否を構造化ログに残し、結果はそのまま返す
#[instrument(skip(operation))]
pub async fn trace_remote_call<T, F, Fut>(
    service: &str,
    operation_name: &str,
    operation: F,
) -> Result<T, AppError>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let start_time = Instant::now();
    let result = operation().await;
    let duration_ms = u64::try_from(start_time.elapsed().as_millis()).unwrap_or(u64::MAX);

    match &result {
        Ok(_) => {
            debug!(
                service = service,
                operation = operation_name,
                duration_ms = duration_ms,
                "Remote call completed successfully"
            );
        }
        Err(e) => {
            warn!(
                service = service,
                operation = operation_name,
                duration_ms = duration_ms,
                error = %e,
                "Remote call failed"
            );
        }
    }

    result
}

/// エラーを観測用シンクに記録する
/// 呼び出し側はエラーを握りつぶさず、記録した上で返すこと
pub fn record_error(error: &AppError, context: &str) {
    let metadata = error.metadata();
    error!(
        error = %error,
        code = metadata.code,
        severity = ?metadata.severity,
        context = context,
        "Error recorded"
    );
}
