//! Repository over a SQLite table

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use persistkit_core::config::Backend;
use persistkit_core::criteria::{plan, validate_sort, Criteria, QueryPlan};
use persistkit_core::errors::PersistError;
use persistkit_core::log_op_vacuous;
use persistkit_core::logging_facility::observe;
use persistkit_core::mapper::Mapper;
use persistkit_core::registry::EntityConfig;
use persistkit_core::repository::{ListQuery, Repository, SortSpec};
use persistkit_core::value::{EntityId, Record, ID_FIELD};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use tokio::sync::OnceCell;

use super::convert::{from_sql, to_sql};
use super::engine::SqliteEngine;
use super::schema_evolve::initialize_table;
use super::table::{quote_ident, TableSpec};
use super::where_clause::build_where;
use crate::errors::{for_entity, sql_err, Result};

const BACKEND: &str = "relational";

/// Relational repository; one row per entity, one column per attribute
///
/// The table is created (or evolved) on first use. Without an explicit
/// sort, `list` and `list_by_fields` return rows by identity ascending.
pub struct RelationalRepository {
    entity_key: String,
    mapper: Arc<dyn Mapper>,
    spec: Arc<TableSpec>,
    engine: SqliteEngine,
    columns: OnceCell<Arc<HashSet<String>>>,
}

impl RelationalRepository {
    pub fn new(entity_key: impl Into<String>, config: &EntityConfig, engine: SqliteEngine) -> Self {
        Self {
            entity_key: entity_key.into(),
            mapper: Arc::new(config.mapper()),
            spec: Arc::new(TableSpec::from_config(config)),
            engine,
            columns: OnceCell::new(),
        }
    }

    /// Declare foreign keys (local field → target table and column) at table creation
    pub fn with_foreign_keys(mut self, foreign_keys: BTreeMap<String, (String, String)>) -> Self {
        let spec = (*self.spec).clone().with_foreign_keys(foreign_keys);
        self.spec = Arc::new(spec);
        self
    }

    pub fn table(&self) -> &str {
        &self.spec.table
    }

    pub fn engine(&self) -> &SqliteEngine {
        &self.engine
    }

    async fn ensure_table(&self) -> Result<Arc<HashSet<String>>> {
        self.columns
            .get_or_try_init(|| async {
                let spec = self.spec.clone();
                let columns = self
                    .engine
                    .run("init_indexes", move |conn| initialize_table(conn, &spec))
                    .await
                    .map_err(|e| for_entity(e, &self.entity_key))?;
                tracing::debug!(
                    entity_key = %self.entity_key,
                    table = %self.spec.table,
                    "relational table ready"
                );
                Ok::<_, PersistError>(Arc::new(columns))
            })
            .await
            .cloned()
    }

    fn select_sql(&self) -> String {
        let columns: Vec<String> = self.spec.columns().iter().map(|c| quote_ident(c)).collect();
        format!("SELECT {} FROM {}", columns.join(", "), quote_ident(&self.spec.table))
    }

    fn order_sql(&self, sort: Option<&SortSpec>, columns: &HashSet<String>) -> Result<String> {
        let (column, descending) = match sort {
            Some(spec) => (spec.field.as_str(), spec.descending),
            None => (ID_FIELD, false),
        };
        if !columns.contains(column) {
            return Err(PersistError::UnknownColumn {
                table: self.spec.table.clone(),
                column: column.to_string(),
            });
        }
        let direction = if descending { "DESC" } else { "ASC" };
        if column == ID_FIELD {
            return Ok(format!(" ORDER BY {} {}", quote_ident(column), direction));
        }
        // Ties fall back to identity ascending
        Ok(format!(
            " ORDER BY {} {}, {} ASC",
            quote_ident(column),
            direction,
            quote_ident(ID_FIELD)
        ))
    }

    fn window(query: &ListQuery, params: &mut Vec<SqlValue>) -> &'static str {
        let limit = query.limit.map(|l| l as i64).unwrap_or(-1);
        params.push(SqlValue::Integer(limit));
        params.push(SqlValue::Integer(query.offset as i64));
        " LIMIT ? OFFSET ?"
    }

    fn bind(&self, column: &str, value: &Value) -> Result<SqlValue> {
        to_sql(column, self.spec.kind_of(column), value)
    }

    /// Lookup parameter for `column`, or `None` when `value` cannot be
    /// stored there and so cannot match any row
    fn lookup_param(&self, column: &str, value: &Value) -> Option<SqlValue> {
        match self.bind(column, value) {
            Ok(param) => Some(param),
            Err(err) => {
                tracing::debug!(
                    entity_key = %self.entity_key,
                    column,
                    error = %err,
                    "lookup value cannot match column"
                );
                None
            }
        }
    }

    async fn execute(&self, op: &'static str, sql: String, params: Vec<SqlValue>) -> Result<usize> {
        let entity = self.entity_key.clone();
        self.engine
            .run(op, move |conn| {
                conn.execute(&sql, params_from_iter(params.iter()))
                    .map_err(sql_err(op, &entity))
            })
            .await
    }

    async fn fetch(&self, op: &'static str, sql: String, params: Vec<SqlValue>) -> Result<Vec<Record>> {
        let entity = self.entity_key.clone();
        let spec = self.spec.clone();
        let rows = self
            .engine
            .run(op, move |conn| read_rows(conn, op, &entity, &spec, &sql, &params))
            .await?;
        rows.into_iter().map(|r| self.mapper.from_storage(r)).collect()
    }
}

/// Read every row of `sql`, one record per row, keyed by the table's schema columns
fn read_rows(
    conn: &Connection,
    op: &str,
    entity: &str,
    spec: &TableSpec,
    sql: &str,
    params: &[SqlValue],
) -> Result<Vec<Record>> {
    let columns = spec.columns();
    let mut stmt = conn.prepare(sql).map_err(sql_err(op, entity))?;
    let mut rows = stmt
        .query(params_from_iter(params.iter()))
        .map_err(sql_err(op, entity))?;

    let mut out = Vec::new();
    while let Some(row) = rows.next().map_err(sql_err(op, entity))? {
        let mut record = Record::new();
        for (i, column) in columns.iter().enumerate() {
            let raw = row.get_ref(i).map_err(sql_err(op, entity))?;
            record.insert(column.clone(), from_sql(column, spec.kind_of(column), raw)?);
        }
        out.push(record);
    }
    Ok(out)
}

#[async_trait]
impl Repository for RelationalRepository {
    fn entity_key(&self) -> &str {
        &self.entity_key
    }

    fn backend(&self) -> Backend {
        Backend::Relational
    }

    async fn init_indexes(&self) -> Result<()> {
        observe("init_indexes", &self.entity_key, BACKEND, async {
            self.ensure_table().await.map(|_| ())
        })
        .await
    }

    async fn add(&self, entity: Record) -> Result<()> {
        observe("add", &self.entity_key, BACKEND, async {
            let stored = self.mapper.to_storage(&entity)?;
            let columns = self.spec.columns();
            let params = columns
                .iter()
                .map(|c| self.bind(c, stored.get(c).unwrap_or(&Value::Null)))
                .collect::<Result<Vec<_>>>()?;
            self.ensure_table().await?;

            let quoted: Vec<String> = columns.iter().map(|c| quote_ident(c)).collect();
            let sql = format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&self.spec.table),
                quoted.join(", "),
                vec!["?"; columns.len()].join(", ")
            );
            self.execute("add", sql, params).await?;
            Ok(())
        })
        .await
    }

    async fn get(&self, id: &EntityId) -> Result<Option<Record>> {
        observe("get", &self.entity_key, BACKEND, async {
            let Some(param) = self.lookup_param(ID_FIELD, id) else {
                return Ok(None);
            };
            self.ensure_table().await?;
            let sql = format!("{} WHERE {} = ? LIMIT 1", self.select_sql(), quote_ident(ID_FIELD));
            Ok(self.fetch("get", sql, vec![param]).await?.into_iter().next())
        })
        .await
    }

    async fn list(&self, query: &ListQuery) -> Result<Vec<Record>> {
        observe("list", &self.entity_key, BACKEND, async {
            validate_sort(query.sort.as_ref(), self.mapper.as_ref())?;
            let columns = self.ensure_table().await?;

            let mut params = Vec::new();
            let mut sql = self.select_sql();
            sql.push_str(&self.order_sql(query.sort.as_ref(), &columns)?);
            sql.push_str(Self::window(query, &mut params));
            self.fetch("list", sql, params).await
        })
        .await
    }

    async fn update(&self, entity: Record) -> Result<()> {
        observe("update", &self.entity_key, BACKEND, async {
            let id = self.mapper.identity_of(&entity)?;
            let stored = self.mapper.to_storage(&entity)?;
            let data_columns: Vec<String> = self
                .spec
                .columns()
                .into_iter()
                .filter(|c| c != ID_FIELD)
                .collect();
            let mut params = data_columns
                .iter()
                .map(|c| self.bind(c, stored.get(c).unwrap_or(&Value::Null)))
                .collect::<Result<Vec<_>>>()?;
            let Some(id_param) = self.lookup_param(ID_FIELD, &id) else {
                return Ok(());
            };
            params.push(id_param);
            self.ensure_table().await?;

            if data_columns.is_empty() {
                return Ok(());
            }
            let assignments: Vec<String> = data_columns
                .iter()
                .map(|c| format!("{} = ?", quote_ident(c)))
                .collect();
            let sql = format!(
                "UPDATE {} SET {} WHERE {} = ?",
                quote_ident(&self.spec.table),
                assignments.join(", "),
                quote_ident(ID_FIELD)
            );
            let changed = self.execute("update", sql, params).await?;
            if changed == 0 {
                tracing::debug!(entity_key = %self.entity_key, id = %id, "update matched nothing");
            }
            Ok(())
        })
        .await
    }

    async fn delete(&self, id: &EntityId) -> Result<()> {
        observe("delete", &self.entity_key, BACKEND, async {
            let Some(param) = self.lookup_param(ID_FIELD, id) else {
                return Ok(());
            };
            self.ensure_table().await?;
            let sql = format!(
                "DELETE FROM {} WHERE {} = ?",
                quote_ident(&self.spec.table),
                quote_ident(ID_FIELD)
            );
            self.execute("delete", sql, vec![param]).await?;
            Ok(())
        })
        .await
    }

    async fn get_by_index(&self, index: &str, value: &Value) -> Result<Option<Record>> {
        observe("get_by_index", &self.entity_key, BACKEND, async {
            let Some(attribute) = self.spec.unique.get(index) else {
                return Ok(None);
            };
            if value.is_null() {
                return Ok(None);
            }
            let Some(param) = self.lookup_param(attribute, value) else {
                return Ok(None);
            };
            self.ensure_table().await?;
            let sql = format!("{} WHERE {} = ? LIMIT 1", self.select_sql(), quote_ident(attribute));
            Ok(self.fetch("get_by_index", sql, vec![param]).await?.into_iter().next())
        })
        .await
    }

    async fn list_by_fields(&self, criteria: &Criteria, query: &ListQuery) -> Result<Vec<Record>> {
        observe("list_by_fields", &self.entity_key, BACKEND, async {
            let criteria = match plan(criteria, query.sort.as_ref(), self.mapper.as_ref())? {
                QueryPlan::Vacuous => {
                    log_op_vacuous!("list_by_fields", entity_key = self.entity_key.as_str(), backend = BACKEND);
                    return Ok(Vec::new());
                }
                QueryPlan::Filter(c) => c,
            };
            let columns = self.ensure_table().await?;
            let clause = build_where(criteria, &self.spec, &columns)?;

            let mut params = clause.params;
            let mut sql = format!("{} WHERE {}", self.select_sql(), clause.sql);
            sql.push_str(&self.order_sql(query.sort.as_ref(), &columns)?);
            sql.push_str(Self::window(query, &mut params));
            self.fetch("list_by_fields", sql, params).await
        })
        .await
    }
}
