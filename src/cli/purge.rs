use chrono::Utc;
use tracing::info;

use crate::{
    database::{DatabaseOptions, PostgresConnection},
    repos::TokenRepo,
};

/// Delete every token that can no longer be redeemed.
pub async fn purge_expired_tokens(opts: DatabaseOptions) -> anyhow::Result<()> {
    let connection = PostgresConnection::connect(&opts).await?;

    let deleted = connection.delete_expired_tokens(Utc::now()).await?;
    info!(deleted, "Purged expired tokens.");

    Ok(())
}
