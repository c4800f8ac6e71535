use std::future::Future;

use indexer_config::shared::SourceConnectionConfig;
use secrecy::ExposeSecret;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions, MySqlSslMode};
use tracing::debug;

use crate::error::IndexerResult;

pub const GROUPS_TABLE: &str = "groups";
pub const SECTIONS_TABLE: &str = "sections";

const GROUPS_QUERY: &str = "SELECT CAST(groupid AS SIGNED), groupname FROM `groups`";
const SECTIONS_QUERY: &str = "SELECT CAST(sectionid AS SIGNED), sectionname FROM sections";

/// Source of the `(id, name)` rows of the reference tables.
pub trait ReferenceSource {
    fn fetch_groups(&self) -> impl Future<Output = IndexerResult<Vec<(i64, String)>>> + Send;

    fn fetch_sections(&self) -> impl Future<Output = IndexerResult<Vec<(i64, String)>>> + Send;
}

/// Reads the reference tables from the source MySQL database.
///
/// Each fetch opens a single-connection pool, reads the whole table and closes the pool again,
/// so no connection to the source is held while events are consumed.
#[derive(Debug, Clone)]
pub struct MySqlReferenceSource {
    config: SourceConnectionConfig,
}

impl MySqlReferenceSource {
    pub fn new(config: SourceConnectionConfig) -> Self {
        Self { config }
    }

    fn connect_options(&self) -> MySqlConnectOptions {
        let ssl_mode = if self.config.tls.enabled {
            MySqlSslMode::VerifyIdentity
        } else {
            MySqlSslMode::Preferred
        };

        let mut options = MySqlConnectOptions::new()
            .host(&self.config.host)
            .port(self.config.port)
            .username(&self.config.username)
            .database(&self.config.name)
            .ssl_mode(ssl_mode);

        if self.config.tls.enabled {
            options =
                options.ssl_ca_from_pem(self.config.tls.trusted_root_certs.clone().into_bytes());
        }

        if let Some(password) = &self.config.password {
            options = options.password(password.expose_secret());
        }

        options
    }

    async fn fetch(&self, query: &'static str) -> IndexerResult<Vec<(i64, String)>> {
        let pool = MySqlPoolOptions::new()
            .max_connections(1)
            .connect_with(self.connect_options())
            .await?;

        debug!(query, "reading reference table");
        let rows = sqlx::query_as::<_, (i64, Option<String>)>(query)
            .fetch_all(&pool)
            .await;

        pool.close().await;

        Ok(rows?
            .into_iter()
            .map(|(id, name)| (id, name.unwrap_or_default()))
            .collect())
    }
}

impl ReferenceSource for MySqlReferenceSource {
    async fn fetch_groups(&self) -> IndexerResult<Vec<(i64, String)>> {
        self.fetch(GROUPS_QUERY).await
    }

    async fn fetch_sections(&self) -> IndexerResult<Vec<(i64, String)>> {
        self.fetch(SECTIONS_QUERY).await
    }
}
