//! In-process remote store.
//!
//! Implements the same filter, ordering and upsert semantics as the REST
//! store over tables held in memory. Backs offline runs (seeded from a JSON
//! fixture) and the test suite.

use async_trait::async_trait;
use chrono::Utc;
use color_eyre::{eyre::eyre, Result};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use super::client::{RemoteError, RemoteStore};
use super::query::{Filter, FilterOp, Query};
use super::rest::check_single;

type Row = Map<String, Value>;

#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<HashMap<String, Vec<Row>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Load tables from a JSON object of `{ "table": [rows...] }`.
  pub fn from_fixture(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path)
      .map_err(|e| eyre!("Failed to read fixture {}: {}", path.display(), e))?;
    let tables: HashMap<String, Vec<Row>> = serde_json::from_str(&contents)
      .map_err(|e| eyre!("Failed to parse fixture {}: {}", path.display(), e))?;

    Ok(Self {
      tables: Mutex::new(tables),
    })
  }

  /// Append rows to a table as-is.
  pub fn seed(&self, table: &str, rows: Vec<Value>) {
    let mut tables = self.lock();
    let entry = tables.entry(table.to_string()).or_default();
    entry.extend(rows.into_iter().filter_map(|r| match r {
      Value::Object(row) => Some(row),
      _ => None,
    }));
  }

  /// Snapshot of every row in a table.
  pub fn rows(&self, table: &str) -> Vec<Value> {
    self
      .lock()
      .get(table)
      .map(|rows| rows.iter().cloned().map(Value::Object).collect())
      .unwrap_or_default()
  }

  fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Row>>> {
    // Rows are plain data; a panic mid-write cannot leave them half-built
    self.tables.lock().unwrap_or_else(|e| e.into_inner())
  }
}

fn compare(a: &Value, b: &Value) -> Option<Ordering> {
  match (a, b) {
    (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
    (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
    (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
    (Value::Null, Value::Null) => Some(Ordering::Equal),
    _ => None,
  }
}

fn equal(a: &Value, b: &Value) -> bool {
  compare(a, b) == Some(Ordering::Equal)
}

fn matches(row: &Row, filter: &Filter) -> bool {
  let value = row.get(&filter.column).unwrap_or(&Value::Null);
  match filter.op {
    FilterOp::Eq => equal(value, &filter.value),
    FilterOp::Neq => !equal(value, &filter.value),
    FilterOp::Gt => compare(value, &filter.value) == Some(Ordering::Greater),
    FilterOp::Gte => matches!(
      compare(value, &filter.value),
      Some(Ordering::Greater | Ordering::Equal)
    ),
    FilterOp::Lt => compare(value, &filter.value) == Some(Ordering::Less),
    FilterOp::Lte => matches!(
      compare(value, &filter.value),
      Some(Ordering::Less | Ordering::Equal)
    ),
    FilterOp::In => match &filter.value {
      Value::Array(options) => options.iter().any(|o| equal(value, o)),
      other => equal(value, other),
    },
  }
}

fn matches_all(row: &Row, filters: &[Filter]) -> bool {
  filters.iter().all(|f| matches(row, f))
}

fn into_object(table: &str, row: Value) -> Result<Row, RemoteError> {
  match row {
    Value::Object(row) => Ok(row),
    other => Err(RemoteError::InvalidRequest(format!(
      "row for {} is not an object: {}",
      table, other
    ))),
  }
}

/// Fill the columns the database would default on insert.
fn with_defaults(mut row: Row) -> Row {
  row
    .entry("id")
    .or_insert_with(|| Value::String(uuid::Uuid::new_v4().to_string()));
  row
    .entry("created_at")
    .or_insert_with(|| Value::String(Utc::now().to_rfc3339()));
  row
}

fn merge(target: &mut Row, patch: Row) {
  for (key, value) in patch {
    target.insert(key, value);
  }
}

#[async_trait]
impl RemoteStore for MemoryStore {
  async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
    let tables = self.lock();
    let mut rows: Vec<&Row> = tables
      .get(&query.table)
      .map(|rows| rows.iter().filter(|r| matches_all(r, &query.filters)).collect())
      .unwrap_or_default();

    if let Some(order) = &query.order {
      rows.sort_by(|a, b| {
        let left = a.get(&order.column).unwrap_or(&Value::Null);
        let right = b.get(&order.column).unwrap_or(&Value::Null);
        // Nulls sort last in either direction
        let ordering = match (left.is_null(), right.is_null()) {
          (true, true) => return Ordering::Equal,
          (true, false) => return Ordering::Greater,
          (false, true) => return Ordering::Less,
          _ => compare(left, right).unwrap_or(Ordering::Equal),
        };
        if order.ascending {
          ordering
        } else {
          ordering.reverse()
        }
      });
    }

    let limit = query.limit.unwrap_or(usize::MAX);
    let selected: Vec<Value> = rows
      .into_iter()
      .take(limit)
      .map(|row| match &query.columns {
        Some(columns) => Value::Object(
          columns
            .iter()
            .filter_map(|c| row.get(c).map(|v| (c.clone(), v.clone())))
            .collect(),
        ),
        None => Value::Object(row.clone()),
      })
      .collect();

    check_single(query, selected)
  }

  async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
    let new_rows = rows
      .into_iter()
      .map(|r| into_object(table, r).map(with_defaults))
      .collect::<Result<Vec<_>, _>>()?;

    let mut tables = self.lock();
    let existing = tables.entry(table.to_string()).or_default();
    for row in &new_rows {
      let id = row.get("id").unwrap_or(&Value::Null);
      if existing
        .iter()
        .any(|r| equal(r.get("id").unwrap_or(&Value::Null), id))
      {
        return Err(RemoteError::Http {
          status: 409,
          message: format!("duplicate key value violates unique constraint on {}.id", table),
        });
      }
    }
    existing.extend(new_rows.iter().cloned());

    Ok(new_rows.into_iter().map(Value::Object).collect())
  }

  async fn update(
    &self,
    table: &str,
    filters: &[Filter],
    patch: Value,
  ) -> Result<Vec<Value>, RemoteError> {
    if filters.is_empty() {
      return Err(RemoteError::InvalidRequest(format!(
        "refusing unfiltered update of {}",
        table
      )));
    }
    let patch = into_object(table, patch)?;

    let mut tables = self.lock();
    let mut updated = Vec::new();
    if let Some(rows) = tables.get_mut(table) {
      for row in rows.iter_mut().filter(|r| matches_all(r, filters)) {
        merge(row, patch.clone());
        updated.push(Value::Object(row.clone()));
      }
    }
    Ok(updated)
  }

  async fn upsert(
    &self,
    table: &str,
    rows: Vec<Value>,
    on_conflict: &[&str],
  ) -> Result<Vec<Value>, RemoteError> {
    let keys: Vec<&str> = if on_conflict.is_empty() {
      vec!["id"]
    } else {
      on_conflict.to_vec()
    };
    let new_rows = rows
      .into_iter()
      .map(|r| into_object(table, r))
      .collect::<Result<Vec<_>, _>>()?;

    let mut tables = self.lock();
    let existing = tables.entry(table.to_string()).or_default();
    let mut affected = Vec::with_capacity(new_rows.len());

    for row in new_rows {
      let conflict = existing.iter_mut().find(|current| {
        keys.iter().all(|k| match row.get(*k) {
          Some(v) => equal(current.get(*k).unwrap_or(&Value::Null), v),
          None => false,
        })
      });

      match conflict {
        Some(current) => {
          merge(current, row);
          affected.push(Value::Object(current.clone()));
        }
        None => {
          let row = with_defaults(row);
          affected.push(Value::Object(row.clone()));
          existing.push(row);
        }
      }
    }

    Ok(affected)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn facts_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.seed(
      "kpi_daily_facts",
      vec![
        json!({"id": "1", "tenant_id": "acme", "kpi_date": "2024-03-02", "value": 10}),
        json!({"id": "2", "tenant_id": "acme", "kpi_date": "2024-03-01", "value": 7.5}),
        json!({"id": "3", "tenant_id": "globex", "kpi_date": "2024-03-03", "value": 1}),
        json!({"id": "4", "tenant_id": "acme", "kpi_date": null, "value": 2}),
      ],
    );
    store
  }

  #[tokio::test]
  async fn test_select_filters_orders_and_limits() {
    let store = facts_store();
    let query = Query::table("kpi_daily_facts")
      .eq("tenant_id", "acme")
      .order_by("kpi_date", true)
      .limit(2);

    let rows = store.select(&query).await.unwrap();
    let ids: Vec<&str> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["2", "1"]);
  }

  #[tokio::test]
  async fn test_select_range_and_projection() {
    let store = facts_store();
    let query = Query::table("kpi_daily_facts")
      .select(&["tenant_id"])
      .gte("kpi_date", "2024-03-02");

    let rows = store.select(&query).await.unwrap();
    assert_eq!(rows, vec![json!({"tenant_id": "acme"}), json!({"tenant_id": "globex"})]);
  }

  #[tokio::test]
  async fn test_numbers_compare_across_int_and_float() {
    let store = facts_store();
    let query = Query::table("kpi_daily_facts").filter("value", FilterOp::Gt, 7);
    let rows = store.select(&query).await.unwrap();
    assert_eq!(rows.len(), 2);
  }

  #[tokio::test]
  async fn test_single_rejects_multiple_rows() {
    let store = facts_store();
    let query = Query::table("kpi_daily_facts").eq("tenant_id", "acme").single();
    let err = store.select(&query).await.unwrap_err();
    assert!(matches!(err, RemoteError::Http { status: 406, .. }));
  }

  #[tokio::test]
  async fn test_missing_table_selects_nothing() {
    let store = MemoryStore::new();
    let rows = store.select(&Query::table("workspaces")).await.unwrap();
    assert!(rows.is_empty());
  }

  #[tokio::test]
  async fn test_insert_assigns_id_and_rejects_duplicates() {
    let store = MemoryStore::new();
    let inserted = store
      .insert("workspaces", vec![json!({"name": "Alpha"})])
      .await
      .unwrap();
    let id = inserted[0]["id"].clone();
    assert!(id.is_string());
    assert!(inserted[0]["created_at"].is_string());

    let err = store
      .insert("workspaces", vec![json!({"id": id, "name": "Beta"})])
      .await
      .unwrap_err();
    assert!(matches!(err, RemoteError::Http { status: 409, .. }));
  }

  #[tokio::test]
  async fn test_update_merges_matching_rows() {
    let store = facts_store();
    let updated = store
      .update("kpi_daily_facts", &[Filter::eq("id", "3")], json!({"value": 99}))
      .await
      .unwrap();
    assert_eq!(updated.len(), 1);
    assert_eq!(updated[0]["value"], json!(99));
    assert_eq!(updated[0]["tenant_id"], json!("globex"));
  }

  #[tokio::test]
  async fn test_upsert_on_composite_key() {
    let store = MemoryStore::new();
    let row = json!({"tenant_id": "acme", "kpi_key": "sessions", "target_value": 100});
    store
      .upsert("kpi_thresholds", vec![row.clone()], &["tenant_id", "kpi_key"])
      .await
      .unwrap();
    store
      .upsert(
        "kpi_thresholds",
        vec![json!({"tenant_id": "acme", "kpi_key": "sessions", "target_value": 120})],
        &["tenant_id", "kpi_key"],
      )
      .await
      .unwrap();

    let rows = store.rows("kpi_thresholds");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["target_value"], json!(120));
  }

  #[test]
  fn test_fixture_loading() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("seed.json");
    std::fs::write(&path, r#"{"workspaces": [{"id": "w1", "name": "Alpha"}]}"#).unwrap();

    let store = MemoryStore::from_fixture(&path).unwrap();
    assert_eq!(store.rows("workspaces").len(), 1);
  }
}
