use std::{ops::Deref, time::Duration};

use anyhow::Context;
use sqlx::{postgres::PgPoolOptions, PgPool};

pub struct DatabaseOptions {
    pub pool_size: u32,
    pub timeout_seconds: u8,
    pub url: String,
}

#[derive(Clone)]
pub struct PostgresConnection(PgPool);

impl PostgresConnection {
    pub fn new(pool: PgPool) -> Self {
        Self(pool)
    }

    /// Open a connection pool to the application database.
    pub async fn connect(opts: &DatabaseOptions) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(opts.pool_size)
            .acquire_timeout(Duration::from_secs(opts.timeout_seconds.into()))
            .connect(&opts.url)
            .await
            .context("Failed to connect to the database.")?;

        Ok(Self::new(pool))
    }
}

impl Deref for PostgresConnection {
    type Target = PgPool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
