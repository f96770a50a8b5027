use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for connecting to Azure SQL / MSSQL via an ADO.NET connection string.
///
/// Set the `MSSQL_CONNECTION_STRING` environment variable.  Example:
/// ```text
/// server=tcp:myserver.database.windows.net,1433;database=mydb;user id=myuser;password=mypassword;encrypt=true;trustservercertificate=false
/// ```
#[derive(Debug, Clone)]
pub struct MssqlConfig {
    pub connection_string: String,
}

/// Configuration for connecting to Azure Cosmos DB.
///
/// Required environment variables:
/// - `COSMOS_ENDPOINT` - e.g. `https://myaccount.documents.azure.com:443/`
/// - `COSMOS_KEY` - Primary or secondary account key (key-based auth).
///
/// Optional:
/// - `COSMOS_DEFAULT_DATABASE` - database name used when callers omit the `database`
///   parameter in tool calls.
#[derive(Debug, Clone)]
pub struct CosmosConfig {
    pub endpoint: String,
    pub key: Option<String>,
    pub default_database: Option<String>,
}

/// Data-store configuration assembled from environment variables at startup.
///
/// Both stores are optional: a process that only proxies to child servers
/// needs neither, and commands report a missing store when invoked.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub mssql: Option<MssqlConfig>,
    pub cosmos: Option<CosmosConfig>,
}

impl Config {
    /// Build configuration from the current process environment.
    pub fn from_env() -> Self {
        let mssql = env::var("MSSQL_CONNECTION_STRING").ok().map(|conn| {
            tracing::info!("MSSQL connection string found - sql commands are usable");
            MssqlConfig {
                connection_string: conn,
            }
        });

        let cosmos = env::var("COSMOS_ENDPOINT").ok().map(|endpoint| {
            let key = env::var("COSMOS_KEY").ok();
            let default_database = env::var("COSMOS_DEFAULT_DATABASE").ok();
            if key.is_some() {
                tracing::info!("Cosmos DB endpoint + account key found - cosmos commands are usable");
            } else {
                tracing::warn!(
                    "COSMOS_ENDPOINT is set but COSMOS_KEY is missing - \
                     cosmos commands will return an error until COSMOS_KEY is configured"
                );
            }
            CosmosConfig {
                endpoint,
                key,
                default_database,
            }
        });

        if mssql.is_none() && cosmos.is_none() {
            tracing::debug!("no data store configured; only proxied servers will be functional");
        }

        Config { mssql, cosmos }
    }

    /// Convenience: return a reference to the MSSQL config or an error.
    pub fn require_mssql(&self) -> Result<&MssqlConfig> {
        self.mssql
            .as_ref()
            .context("MSSQL is not configured (MSSQL_CONNECTION_STRING not set)")
    }

    /// Convenience: return a reference to the Cosmos config or an error.
    pub fn require_cosmos(&self) -> Result<&CosmosConfig> {
        self.cosmos
            .as_ref()
            .context("Cosmos DB is not configured (COSMOS_ENDPOINT not set)")
    }
}

/// How the server presents its tools.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ServerMode {
    /// One `azure` tool routes every request.
    Single,
    /// One routing tool per service namespace and registry server.
    #[default]
    Namespace,
    /// Every command as its own tool, plus one routing tool per registry server.
    All,
}

/// Options that decide which tools the server exposes and how it routes.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub mode: ServerMode,
    /// Namespace allow-list; empty means every namespace.
    pub namespaces: Vec<String>,
    pub read_only: bool,
    /// Executable spawned for command-group children. `None` means this one.
    pub entry_point: Option<PathBuf>,
    pub call_timeout: Duration,
    pub sampling_timeout: Duration,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            mode: ServerMode::default(),
            namespaces: Vec::new(),
            read_only: false,
            entry_point: None,
            call_timeout: Duration::from_secs(120),
            sampling_timeout: Duration::from_secs(60),
        }
    }
}

/// Resolve the executable for child servers, falling back to the running
/// binary when `configured` is unset or blank.
pub fn resolve_entry_point(configured: Option<&PathBuf>) -> Result<PathBuf> {
    match configured {
        Some(path) if !path.as_os_str().to_string_lossy().trim().is_empty() => Ok(path.clone()),
        _ => env::current_exe().context("Failed to resolve the current executable path"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_entry_point_falls_back_to_current_exe() {
        let current = env::current_exe().unwrap();
        assert_eq!(resolve_entry_point(None).unwrap(), current);
        assert_eq!(resolve_entry_point(Some(&PathBuf::from("   "))).unwrap(), current);
        assert_eq!(
            resolve_entry_point(Some(&PathBuf::from("/opt/azmcp"))).unwrap(),
            PathBuf::from("/opt/azmcp")
        );
    }

    #[test]
    fn require_reports_missing_stores() {
        let config = Config::default();
        assert!(config.require_mssql().is_err());
        assert!(config
            .require_cosmos()
            .unwrap_err()
            .to_string()
            .contains("COSMOS_ENDPOINT"));
    }

    #[test]
    fn namespace_mode_is_default() {
        let options = ServerOptions::default();
        assert_eq!(options.mode, ServerMode::Namespace);
        assert!(options.namespaces.is_empty());
    }
}
