use serde::{Deserialize, Serialize};
use sqlx::postgres::PgConnectOptions as SqlxConnectOptions;
use tokio_postgres::Config as TokioPgConnectOptions;

use crate::SerializableSecretString;

/// Static PostgreSQL connection options that ensure sane defaults.
///
/// Applied to all connections so that timestamp and encoding behavior is
/// consistent across installations.
pub struct DefaultPgConnectionOptions;

impl DefaultPgConnectionOptions {
    /// Returns the options as a string suitable for the tokio-postgres
    /// `options` parameter.
    pub fn to_options_string() -> String {
        "-c datestyle=ISO -c intervalstyle=postgres -c client_encoding=UTF8".to_string()
    }

    /// Returns the options as key-value pairs suitable for sqlx.
    pub fn to_key_value_pairs() -> Vec<(String, String)> {
        vec![
            ("datestyle".to_string(), "ISO".to_string()),
            ("intervalstyle".to_string(), "postgres".to_string()),
            ("client_encoding".to_string(), "UTF8".to_string()),
        ]
    }
}

/// Configuration for connecting to a Postgres database.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct PgConnectionConfig {
    /// Hostname or IP address of the Postgres server.
    pub host: String,
    /// Port number on which the Postgres server is listening.
    pub port: u16,
    /// Name of the Postgres database to connect to.
    pub name: String,
    /// Username for authenticating with the Postgres server.
    pub username: String,
    /// Password for the specified user. Sensitive and redacted in debug output.
    pub password: Option<SerializableSecretString>,
}

/// Converts [`PgConnectionConfig`] into crate-specific connect options.
///
/// Two Postgres client crates are in use: sqlx for queries against both
/// stores and tokio-postgres for the LISTEN/NOTIFY subscription. Connection
/// parameters are kept centralized in [`PgConnectionConfig`] and this trait is
/// implemented once per client crate.
pub trait IntoConnectOptions<Output> {
    /// Creates connection options for the configured database.
    fn with_db(&self) -> Output;
}

impl IntoConnectOptions<SqlxConnectOptions> for PgConnectionConfig {
    fn with_db(&self) -> SqlxConnectOptions {
        let mut options = SqlxConnectOptions::new_without_pgpass()
            .host(&self.host)
            .port(self.port)
            .username(&self.username)
            .database(&self.name)
            .options(DefaultPgConnectionOptions::to_key_value_pairs());

        if let Some(password) = &self.password {
            options = options.password(password.expose_secret());
        }

        options
    }
}

impl IntoConnectOptions<TokioPgConnectOptions> for PgConnectionConfig {
    fn with_db(&self) -> TokioPgConnectOptions {
        let mut config = TokioPgConnectOptions::new();
        config
            .host(self.host.clone())
            .port(self.port)
            .user(self.username.clone())
            .dbname(self.name.clone())
            .options(DefaultPgConnectionOptions::to_options_string());

        if let Some(password) = &self.password {
            config.password(password.expose_secret());
        }

        config
    }
}
