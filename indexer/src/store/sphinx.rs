use std::time::Duration;

use indexer_config::shared::IndexConnectionConfig;
use secrecy::ExposeSecret;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow, MySqlSslMode};
use sqlx::Row;
use tracing::{debug, info};

use crate::error::{ErrorKind, IndexerError, IndexerResult};
use crate::indexer_error;
use crate::store::base::IndexStore;
use crate::store::sphinxql;
use crate::types::{ReleaseId, ReleaseRecord};

/// Index store backed by a Sphinx (or Manticore) real-time index.
///
/// Statements are SphinxQL over the MySQL wire protocol through a bounded [`MySqlPool`]. Every
/// call acquires a connection and returns it to the pool on any exit path.
#[derive(Debug, Clone)]
pub struct SphinxIndexStore {
    pool: MySqlPool,
    index_name: String,
}

impl SphinxIndexStore {
    /// Creates the connection pool for the configured index.
    ///
    /// Connections are opened lazily, so this does not contact the server. Use
    /// [`IndexStore::count`] to verify reachability.
    pub fn new(config: &IndexConnectionConfig) -> IndexerResult<Self> {
        let index_name = sphinxql::index_identifier(&config.index_name)?.to_string();

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_millis(config.acquire_timeout_ms))
            .connect_lazy_with(connect_options(config));

        info!(
            host = %config.host,
            port = config.port,
            index = %index_name,
            max_connections = config.max_connections,
            "created index connection pool"
        );

        Ok(Self { pool, index_name })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Closes all pooled connections.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn execute(&self, statement: &str) -> IndexerResult<()> {
        debug!(statement, "executing index statement");

        sqlx::raw_sql(statement)
            .execute(&self.pool)
            .await
            .map_err(|err| index_error(err, statement))?;

        Ok(())
    }
}

impl IndexStore for SphinxIndexStore {
    fn name() -> &'static str {
        "sphinx"
    }

    async fn replace(&self, record: &ReleaseRecord) -> IndexerResult<()> {
        let statement = sphinxql::replace_statement(&self.index_name, record)?;
        self.execute(&statement).await
    }

    async fn delete(&self, id: ReleaseId) -> IndexerResult<()> {
        let statement = sphinxql::delete_statement(&self.index_name, id);
        self.execute(&statement).await
    }

    async fn count(&self) -> IndexerResult<u64> {
        let statement = sphinxql::count_statement(&self.index_name);

        let row = sqlx::raw_sql(&statement)
            .fetch_one(&self.pool)
            .await
            .map_err(|err| index_error(err, &statement))?;

        decode_count(&row).map_err(|err| index_error(err, &statement))
    }
}

/// Builds connect options accepted by SphinxQL.
///
/// The session setup sqlx runs on connect (`SET sql_mode`, `SET time_zone`, `SET NAMES`) is not
/// understood by searchd and is turned off.
fn connect_options(config: &IndexConnectionConfig) -> MySqlConnectOptions {
    let mut options = MySqlConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .ssl_mode(MySqlSslMode::Disabled)
        .statement_cache_capacity(0)
        .pipes_as_concat(false)
        .no_engine_substitution(false)
        .timezone(None::<String>)
        .set_names(false);

    if let Some(username) = &config.username {
        options = options.username(username);
    }

    if let Some(password) = &config.password {
        options = options.password(password.expose_secret());
    }

    options
}

/// Reads the single count column, which searchd reports as signed or unsigned depending on the
/// version.
fn decode_count(row: &MySqlRow) -> Result<u64, sqlx::Error> {
    if let Ok(count) = row.try_get::<u64, _>(0) {
        return Ok(count);
    }

    let count = row.try_get::<i64, _>(0)?;
    Ok(count.max(0) as u64)
}

fn index_error(err: sqlx::Error, statement: &str) -> IndexerError {
    let kind = match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolClosed
        | sqlx::Error::PoolTimedOut => ErrorKind::IndexConnectionFailed,
        _ => ErrorKind::IndexQueryFailed,
    };

    indexer_error!(
        kind,
        "Index statement failed",
        format!("{statement}: {err}"),
        source: err
    )
}
