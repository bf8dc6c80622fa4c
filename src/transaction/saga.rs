use async_trait::async_trait;
use sqlx::PgPool;
use tracing::{error, info};

use crate::error::Result;

/// A named undo step for saga-style multi-step transactions.
///
/// Compensation is best-effort by contract: a failing compensation is logged
/// and skipped so the error that triggered the undo remains the one the
/// caller sees. Consumers must not assume a full rollback happened.
#[async_trait]
pub trait CompensationAction: Send + Sync {
    fn description(&self) -> &str;

    /// Undo the corresponding saga step. Runs on its own connection, outside
    /// the failing transaction.
    async fn execute(&self, pool: &PgPool) -> Result<()>;
}

/// Run compensations in reverse registration order, logging failures.
pub(crate) async fn run_compensations(
    pool: &PgPool,
    compensations: &[std::sync::Arc<dyn CompensationAction>],
) {
    for compensation in compensations.iter().rev() {
        info!(step = %compensation.description(), "executing compensation");
        if let Err(err) = compensation.execute(pool).await {
            error!(
                step = %compensation.description(),
                "compensation failed, continuing: {err}"
            );
        }
    }
}
