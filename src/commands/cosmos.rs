use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use azure_core::credentials::Secret;
use azure_data_cosmos::{CosmosClient, Query};
use futures::TryStreamExt;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::{options_schema, parse_options, Command, CommandFactory, CommandMetadata};
use crate::config::{Config, CosmosConfig};

/// Default number of items returned when the caller does not specify `max_items`.
pub const DEFAULT_MAX_ITEMS: u32 = 100;
/// Hard upper limit on items to prevent runaway reads.
pub const HARD_MAX_ITEMS: u32 = 5_000;

/// Options for `cosmos database list`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct DatabaseListOptions {}

/// Options for `cosmos container list`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ContainerListOptions {
    /// Cosmos DB database name.  If omitted the server falls back to
    /// `COSMOS_DEFAULT_DATABASE`.
    pub database: Option<String>,
}

/// Options for `cosmos item query`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct ItemQueryOptions {
    /// SQL-API query string, e.g. `"SELECT * FROM c WHERE c.active = true"`.
    pub query: String,
    /// Container to query.
    pub container: String,
    /// Cosmos DB database name.  Falls back to `COSMOS_DEFAULT_DATABASE` when
    /// omitted.
    pub database: Option<String>,
    /// Partition key value for single-partition queries.  Omit (or set to
    /// `null`) to issue a cross-partition query.
    pub partition_key: Option<String>,
    /// Maximum number of items to return (default: 100, maximum: 5 000).
    pub max_items: Option<u32>,
}

pub fn register(factory: &mut CommandFactory, config: &Arc<Config>) -> crate::error::Result<()> {
    let cosmos = factory.add_group(
        "",
        "cosmos",
        "Azure Cosmos DB operations - list databases and containers and query items with the SQL API.",
    )?;
    let database = factory.add_group(&cosmos, "database", "Cosmos DB database operations.")?;
    let container = factory.add_group(&cosmos, "container", "Cosmos DB container operations.")?;
    let item = factory.add_group(&cosmos, "item", "Cosmos DB item operations.")?;

    factory.add_command(&database, "list", Arc::new(DatabaseListCommand(config.clone())))?;
    factory.add_command(&container, "list", Arc::new(ContainerListCommand(config.clone())))?;
    factory.add_command(&item, "query", Arc::new(ItemQueryCommand(config.clone())))?;
    Ok(())
}

fn resolve_database(cfg: &CosmosConfig, database: Option<&str>) -> Result<String> {
    database
        .or(cfg.default_database.as_deref())
        .map(str::to_string)
        .context("database parameter is required when COSMOS_DEFAULT_DATABASE is not set")
}

pub struct DatabaseListCommand(Arc<Config>);

#[async_trait]
impl Command for DatabaseListCommand {
    fn description(&self) -> &str {
        "List all databases in the Azure Cosmos DB account."
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            open_world: true,
            ..CommandMetadata::read_only("List Cosmos DB databases")
        }
    }

    fn input_schema(&self) -> Map<String, Value> {
        options_schema::<DatabaseListOptions>()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value> {
        let _options: DatabaseListOptions = parse_options(arguments)?;
        list_databases(self.0.require_cosmos()?).await
    }
}

pub struct ContainerListCommand(Arc<Config>);

#[async_trait]
impl Command for ContainerListCommand {
    fn description(&self) -> &str {
        "List all containers in an Azure Cosmos DB database.  \
         `database` defaults to COSMOS_DEFAULT_DATABASE when omitted."
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            open_world: true,
            ..CommandMetadata::read_only("List Cosmos DB containers")
        }
    }

    fn input_schema(&self) -> Map<String, Value> {
        options_schema::<ContainerListOptions>()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value> {
        let options: ContainerListOptions = parse_options(arguments)?;
        let cfg = self.0.require_cosmos()?;
        let database = resolve_database(cfg, options.database.as_deref())?;
        list_containers(cfg, &database).await
    }
}

pub struct ItemQueryCommand(Arc<Config>);

#[async_trait]
impl Command for ItemQueryCommand {
    fn description(&self) -> &str {
        "Query items in an Azure Cosmos DB container using a Cosmos SQL-API \
         query string.  Results are capped at max_items (default 100, maximum 5 000)."
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            open_world: true,
            ..CommandMetadata::read_only("Query Cosmos DB items")
        }
    }

    fn input_schema(&self) -> Map<String, Value> {
        options_schema::<ItemQueryOptions>()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value> {
        let options: ItemQueryOptions = parse_options(arguments)?;
        let cfg = self.0.require_cosmos()?;
        let database = resolve_database(cfg, options.database.as_deref())?;
        query_items(
            cfg,
            &database,
            &options.container,
            &options.query,
            options.partition_key.as_deref(),
            options.max_items.unwrap_or(DEFAULT_MAX_ITEMS),
        )
        .await
    }
}

/// Build a `CosmosClient` from the supplied configuration.
///
/// Key-based authentication is used when `COSMOS_KEY` is set.
fn build_client(cfg: &CosmosConfig) -> Result<CosmosClient> {
    if let Some(key) = &cfg.key {
        CosmosClient::with_key(&cfg.endpoint, Secret::from(key.clone()), None)
            .context("Failed to create Cosmos DB client with account key")
    } else {
        bail!("Cosmos DB authentication requires COSMOS_KEY to be set.")
    }
}

/// Returns a JSON array of database name strings.
async fn list_databases(cfg: &CosmosConfig) -> Result<Value> {
    let client = build_client(cfg)?;

    let mut pager = client
        .query_databases(Query::from("SELECT * FROM c"), None)
        .context("Failed to initiate list-databases query")?;

    let mut names = Vec::new();
    while let Some(db) = pager
        .try_next()
        .await
        .context("Error iterating database list")?
    {
        names.push(Value::String(db.id.clone()));
    }

    Ok(Value::Array(names))
}

/// Returns a JSON array of container name strings.
async fn list_containers(cfg: &CosmosConfig, database: &str) -> Result<Value> {
    let client = build_client(cfg)?;
    let db = client.database_client(database);

    let mut pager = db
        .query_containers(Query::from("SELECT * FROM c"), None)
        .context("Failed to initiate list-containers query")?;

    let mut names = Vec::new();
    while let Some(container) = pager
        .try_next()
        .await
        .context("Error iterating container list")?
    {
        names.push(Value::String(container.id.to_string()));
    }

    Ok(Value::Array(names))
}

/// `partition_key` scopes the query to a single logical partition; `None`
/// runs a cross-partition query.
async fn query_items(
    cfg: &CosmosConfig,
    database: &str,
    container: &str,
    sql: &str,
    partition_key: Option<&str>,
    max_items: u32,
) -> Result<Value> {
    let max_items = max_items.min(HARD_MAX_ITEMS);
    let client = build_client(cfg)?;
    let container_client = client.database_client(database).container_client(container);

    let pk: azure_data_cosmos::PartitionKey = match partition_key {
        Some(key) => azure_data_cosmos::PartitionKey::from(key.to_string()),
        None => azure_data_cosmos::PartitionKey::EMPTY,
    };

    let mut pager = container_client
        .query_items::<Value>(sql, pk, None)
        .context("Failed to initiate Cosmos DB items query")?;

    let mut items = Vec::new();
    while let Some(item) = pager
        .try_next()
        .await
        .context("Error iterating Cosmos DB query results")?
    {
        items.push(item);
        if items.len() >= max_items as usize {
            break;
        }
    }

    Ok(Value::Array(items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::required_options;

    fn config(default_database: Option<&str>) -> Arc<Config> {
        Arc::new(Config {
            mssql: None,
            cosmos: Some(CosmosConfig {
                endpoint: "https://example.documents.azure.com:443/".into(),
                key: Some("dGVzdGtleQ==".into()),
                default_database: default_database.map(str::to_string),
            }),
        })
    }

    #[test]
    fn item_query_requires_query_and_container() {
        let command = ItemQueryCommand(config(None));
        let mut required = required_options(&command.input_schema());
        required.sort();
        assert_eq!(required, vec!["container", "query"]);
    }

    #[test]
    fn database_falls_back_to_configured_default() {
        let cfg = config(Some("mydb"));
        let cosmos = cfg.require_cosmos().unwrap();
        assert_eq!(resolve_database(cosmos, None).unwrap(), "mydb");
        assert_eq!(resolve_database(cosmos, Some("other")).unwrap(), "other");
    }

    #[test]
    fn missing_database_without_default_is_an_error() {
        let cfg = config(None);
        assert!(resolve_database(cfg.require_cosmos().unwrap(), None).is_err());
    }

    #[tokio::test]
    async fn commands_fail_cleanly_when_cosmos_is_not_configured() {
        let command = DatabaseListCommand(Arc::new(Config::default()));
        let err = command.execute(Map::new()).await.unwrap_err();
        assert!(err.to_string().contains("Cosmos DB is not configured"));
    }
}
