//! Embedded SQL migrations, run once at process start via `refinery`.

use deadpool_postgres::Pool;
use tracing::info;

use crate::error::StoreError;

mod embedded {
    refinery::embed_migrations!("migrations");
}

pub async fn run_pending_migrations(pool: &Pool) -> Result<(), StoreError> {
    let mut conn = pool.get().await?;
    let client: &mut tokio_postgres::Client = &mut conn;
    let report = embedded::migrations::runner()
        .run_async(client)
        .await
        .map_err(|e| StoreError::Migration(e.to_string()))?;
    info!(applied = report.applied_migrations().len(), "store_migrations_applied");
    Ok(())
}
