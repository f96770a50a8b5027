use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use tiberius::{Client, ColumnData, Config as TdsConfig, Query};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

use super::{options_schema, parse_options, Command, CommandFactory, CommandMetadata};
use crate::config::{Config, MssqlConfig};

/// Default number of rows returned when the caller does not specify `max_rows`.
pub const DEFAULT_MAX_ROWS: u64 = 500;
/// Hard upper limit on rows to prevent runaway reads.
pub const HARD_MAX_ROWS: u64 = 10_000;

/// Options for `sql table list`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct TableListOptions {}

/// Options for `sql query execute`.
#[derive(Debug, Deserialize, JsonSchema)]
pub struct QueryExecuteOptions {
    /// SQL query to execute.  Results are capped to `max_rows` rows.
    pub query: String,
    /// Maximum number of rows to return (default: 500, maximum: 10 000).
    pub max_rows: Option<u64>,
}

pub fn register(factory: &mut CommandFactory, config: &Arc<Config>) -> crate::error::Result<()> {
    let sql = factory.add_group(
        "",
        "sql",
        "Azure SQL Database operations - list tables and run queries over TDS.",
    )?;
    let table = factory.add_group(&sql, "table", "Azure SQL table operations.")?;
    let query = factory.add_group(&sql, "query", "Azure SQL query operations.")?;

    factory.add_command(&table, "list", Arc::new(TableListCommand(config.clone())))?;
    factory.add_command(&query, "execute", Arc::new(QueryExecuteCommand(config.clone())))?;
    Ok(())
}

pub struct TableListCommand(Arc<Config>);

#[async_trait]
impl Command for TableListCommand {
    fn description(&self) -> &str {
        "List all user tables in the Azure SQL database."
    }

    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            open_world: true,
            ..CommandMetadata::read_only("List SQL tables")
        }
    }

    fn input_schema(&self) -> Map<String, Value> {
        options_schema::<TableListOptions>()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value> {
        let _options: TableListOptions = parse_options(arguments)?;
        list_tables(self.0.require_mssql()?).await
    }
}

pub struct QueryExecuteCommand(Arc<Config>);

#[async_trait]
impl Command for QueryExecuteCommand {
    fn description(&self) -> &str {
        "Execute a SQL query against Azure SQL.  Results are returned as a JSON \
         array of row objects, capped at max_rows (default 500, maximum 10 000)."
    }

    // Arbitrary SQL may write.
    fn metadata(&self) -> CommandMetadata {
        CommandMetadata {
            title: "Execute SQL query".into(),
            read_only: false,
            destructive: true,
            idempotent: false,
            open_world: true,
        }
    }

    fn input_schema(&self) -> Map<String, Value> {
        options_schema::<QueryExecuteOptions>()
    }

    async fn execute(&self, arguments: Map<String, Value>) -> Result<Value> {
        let options: QueryExecuteOptions = parse_options(arguments)?;
        execute_query(
            self.0.require_mssql()?,
            &options.query,
            options.max_rows.unwrap_or(DEFAULT_MAX_ROWS),
        )
        .await
    }
}

async fn connect(cfg: &MssqlConfig) -> Result<Client<Compat<TcpStream>>> {
    let config = TdsConfig::from_ado_string(&cfg.connection_string)
        .context("Failed to parse MSSQL connection string")?;

    let tcp = TcpStream::connect(config.get_addr())
        .await
        .with_context(|| format!("Failed to connect to MSSQL at {}", config.get_addr()))?;

    tcp.set_nodelay(true)
        .context("Failed to set TCP_NODELAY on MSSQL connection")?;

    Client::connect(config, tcp.compat_write())
        .await
        .context("MSSQL handshake/login failed")
}

fn float(value: f64) -> Value {
    serde_json::Number::from_f64(value)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

fn debug_string<T: std::fmt::Debug>(value: &T) -> Value {
    Value::String(format!("{value:?}"))
}

fn column_data_to_json(data: &ColumnData<'static>) -> Value {
    let value = match data {
        ColumnData::U8(v) => v.map(Value::from),
        ColumnData::I16(v) => v.map(Value::from),
        ColumnData::I32(v) => v.map(Value::from),
        ColumnData::I64(v) => v.map(Value::from),
        ColumnData::F32(v) => v.map(|n| float(f64::from(n))),
        ColumnData::F64(v) => v.map(float),
        ColumnData::Bit(v) => v.map(Value::Bool),
        ColumnData::String(v) => v.as_deref().map(|s| Value::String(s.to_string())),
        ColumnData::Guid(v) => v.map(|g| Value::String(g.to_string())),
        ColumnData::Numeric(v) => v.map(|n| Value::String(n.to_string())),
        ColumnData::Binary(v) => v
            .as_deref()
            .map(|b| Value::String(b.iter().map(|byte| format!("{byte:02x}")).collect())),
        // tiberius has no Display for temporal types; cast to varchar in SQL
        // (CONVERT(varchar, column, 127)) for ISO 8601.
        ColumnData::DateTime(v) => v.as_ref().map(debug_string),
        ColumnData::SmallDateTime(v) => v.as_ref().map(debug_string),
        ColumnData::Time(v) => v.as_ref().map(debug_string),
        ColumnData::Date(v) => v.as_ref().map(debug_string),
        ColumnData::DateTime2(v) => v.as_ref().map(debug_string),
        ColumnData::DateTimeOffset(v) => v.as_ref().map(debug_string),
        ColumnData::Xml(v) => v.as_deref().map(|x| Value::String(x.to_string())),
    };
    value.unwrap_or(Value::Null)
}

/// Returns a JSON array of objects with `schema` and `table_name` fields.
async fn list_tables(cfg: &MssqlConfig) -> Result<Value> {
    let mut client = connect(cfg).await?;

    let rows = client
        .query(
            "SELECT TABLE_SCHEMA, TABLE_NAME \
             FROM INFORMATION_SCHEMA.TABLES \
             WHERE TABLE_TYPE = 'BASE TABLE' \
             ORDER BY TABLE_SCHEMA, TABLE_NAME",
            &[],
        )
        .await
        .context("Failed to query INFORMATION_SCHEMA.TABLES")?
        .into_first_result()
        .await
        .context("Failed to collect table list results")?;

    let tables = rows
        .iter()
        .map(|row| {
            let schema: &str = row.get("TABLE_SCHEMA").unwrap_or("");
            let name: &str = row.get("TABLE_NAME").unwrap_or("");
            serde_json::json!({ "schema": schema, "table_name": name })
        })
        .collect();

    Ok(Value::Array(tables))
}

/// Wrap `sql` in `SELECT TOP (n) * FROM (…)` so a single call cannot read
/// millions of rows.
fn limit_query(sql: &str, max_rows: u64) -> String {
    let max_rows = max_rows.min(HARD_MAX_ROWS);
    format!("SELECT TOP ({max_rows}) * FROM ({sql}) AS __mcp_query__")
}

async fn execute_query(cfg: &MssqlConfig, sql: &str, max_rows: u64) -> Result<Value> {
    let mut client = connect(cfg).await?;

    let rows = Query::new(limit_query(sql, max_rows))
        .query(&mut client)
        .await
        .context("Failed to execute SQL query")?
        .into_first_result()
        .await
        .context("Failed to collect query results")?;

    let result = rows
        .iter()
        .map(|row| {
            let object: Map<String, Value> = row
                .cells()
                .map(|(col, data)| (col.name().to_string(), column_data_to_json(data)))
                .collect();
            Value::Object(object)
        })
        .collect();

    Ok(Value::Array(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::borrow::Cow;
    use tiberius::numeric::Numeric;

    #[test]
    fn null_columns_become_json_null() {
        assert_eq!(column_data_to_json(&ColumnData::I32(None)), Value::Null);
        assert_eq!(column_data_to_json(&ColumnData::String(None)), Value::Null);
        assert_eq!(column_data_to_json(&ColumnData::Bit(None)), Value::Null);
    }

    #[test]
    fn scalar_columns_convert() {
        assert_eq!(column_data_to_json(&ColumnData::I32(Some(42))), Value::from(42_i32));
        assert_eq!(column_data_to_json(&ColumnData::Bit(Some(true))), Value::Bool(true));
        assert_eq!(
            column_data_to_json(&ColumnData::String(Some(Cow::Borrowed("hello")))),
            Value::String("hello".into())
        );
        assert_eq!(
            column_data_to_json(&ColumnData::Binary(Some(Cow::Borrowed(&[0xde, 0xad][..])))),
            Value::String("dead".into())
        );
        assert!(column_data_to_json(&ColumnData::Numeric(Some(Numeric::new_with_scale(12345, 2)))).is_string());
    }

    #[test]
    fn query_is_capped_at_hard_limit() {
        assert_eq!(
            limit_query("SELECT 1 AS x", 50_000),
            "SELECT TOP (10000) * FROM (SELECT 1 AS x) AS __mcp_query__"
        );
    }

    #[test]
    fn execute_is_not_read_only() {
        let command = QueryExecuteCommand(Arc::new(Config::default()));
        assert!(!command.metadata().read_only);
        assert_eq!(
            crate::commands::required_options(&command.input_schema()),
            vec!["query".to_string()]
        );
    }
}
