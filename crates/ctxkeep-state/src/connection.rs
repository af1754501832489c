//! SurrealDB connection setup
//!
//! Supports remote (WebSocket) servers, an explicit URL, local `surrealkv`
//! persistence and in-memory databases for tests.

use surrealdb::engine::any::Any;
use surrealdb::opt::auth::{Database, Root};
use surrealdb::Surreal;
use tracing::{info, instrument};

use crate::error::StorageError;
use crate::storage_traits::StorageResult;

/// Default namespace for ctxkeep tables
pub const DEFAULT_NAMESPACE: &str = "ctxkeep";
/// Default database name
pub const DEFAULT_DATABASE: &str = "main";
/// Local persistence directory used when nothing else is configured
pub const DEFAULT_LOCAL_PATH: &str = ".ctxkeep/db";

/// Credentials for a remote server, taken from `SURREALDB_ENDPOINT`,
/// `SURREALDB_USERNAME` and `SURREALDB_PASSWORD`. `SURREALDB_NAMESPACE`,
/// `SURREALDB_DATABASE` and `SURREALDB_ROOT=true` are optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub username: String,
    pub password: String,
    pub namespace: String,
    pub database: String,
    /// Sign in as a root user instead of a database user.
    pub root: bool,
}

impl RemoteConfig {
    /// `None` unless all three required variables are set.
    pub fn from_env() -> Option<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Option<Self> {
        Some(Self {
            endpoint: get("SURREALDB_ENDPOINT")?,
            username: get("SURREALDB_USERNAME")?,
            password: get("SURREALDB_PASSWORD")?,
            namespace: get("SURREALDB_NAMESPACE").unwrap_or_else(|| DEFAULT_NAMESPACE.into()),
            database: get("SURREALDB_DATABASE").unwrap_or_else(|| DEFAULT_DATABASE.into()),
            root: get("SURREALDB_ROOT").is_some_and(|v| v.eq_ignore_ascii_case("true")),
        })
    }
}

/// Connect to an in-memory database.
pub async fn connect_in_memory() -> StorageResult<Surreal<Any>> {
    connect_url("mem://").await
}

/// Connect to `url` and select the default namespace and database.
pub async fn connect_url(url: &str) -> StorageResult<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(url)
        .await
        .map_err(|e| StorageError::Connection(format!("Failed to connect to {}: {}", url, e)))?;

    db.use_ns(DEFAULT_NAMESPACE)
        .use_db(DEFAULT_DATABASE)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;

    Ok(db)
}

/// Connect to a remote server and sign in.
#[instrument(skip(config), fields(endpoint = %config.endpoint, root = config.root))]
pub async fn connect_remote(config: &RemoteConfig) -> StorageResult<Surreal<Any>> {
    let db = surrealdb::engine::any::connect(config.endpoint.as_str())
        .await
        .map_err(|e| {
            StorageError::Connection(format!("Failed to connect to {}: {}", config.endpoint, e))
        })?;

    let signed_in = if config.root {
        db.signin(Root {
            username: &config.username,
            password: &config.password,
        })
        .await
    } else {
        db.signin(Database {
            namespace: &config.namespace,
            database: &config.database,
            username: &config.username,
            password: &config.password,
        })
        .await
    };
    signed_in.map_err(|e| StorageError::Connection(format!("Authentication failed: {}", e)))?;

    db.use_ns(&config.namespace)
        .use_db(&config.database)
        .await
        .map_err(|e| StorageError::Connection(e.to_string()))?;
    info!(namespace = %config.namespace, database = %config.database, "connected");
    Ok(db)
}

/// Connect using environment variables
///
/// If SURREALDB_ENDPOINT is set, connects to that server with credentials.
/// If SURREALDB_URL is set, connects to that URL.
/// Otherwise, falls back to local persistence in `.ctxkeep/db`.
#[instrument(skip_all)]
pub async fn connect_from_env() -> StorageResult<Surreal<Any>> {
    if let Some(config) = RemoteConfig::from_env() {
        return connect_remote(&config).await;
    }

    if let Ok(url) = std::env::var("SURREALDB_URL") {
        info!("SURREALDB_URL found, connecting to {}", url);
        return connect_url(&url).await;
    }

    std::fs::create_dir_all(DEFAULT_LOCAL_PATH).map_err(|e| {
        StorageError::Connection(format!(
            "Failed to create database directory {}: {}",
            DEFAULT_LOCAL_PATH, e
        ))
    })?;
    let url = format!("surrealkv://{}", DEFAULT_LOCAL_PATH);
    info!("No server config found, using local persistence: {}", url);
    connect_url(&url).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn remote_config_requires_endpoint_and_credentials() {
        let partial = lookup(&[
            ("SURREALDB_ENDPOINT", "wss://db.example"),
            ("SURREALDB_USERNAME", "user"),
        ]);
        assert!(RemoteConfig::from_lookup(partial).is_none());
    }

    #[test]
    fn remote_config_fills_defaults() {
        let config = RemoteConfig::from_lookup(lookup(&[
            ("SURREALDB_ENDPOINT", "wss://db.example"),
            ("SURREALDB_USERNAME", "user"),
            ("SURREALDB_PASSWORD", "pw"),
            ("SURREALDB_ROOT", "TRUE"),
        ]))
        .unwrap();
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.database, DEFAULT_DATABASE);
        assert!(config.root);
    }
}
