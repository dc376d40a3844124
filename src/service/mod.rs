//! Entity access functions over the remote store.
//!
//! Reads go through the [`Executor`] and degrade to an empty default;
//! writes run once and hand their error back. Upserts keyed by a natural
//! composite key are the exception: repeating them is a no-op, so they are
//! retried too.

mod ga4;
mod jira;
mod kpi;
mod reports;
mod workspaces;

use color_eyre::{eyre::eyre, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::future::Future;
use std::sync::Arc;
use tracing::info;

use crate::cache::{self, BackgroundTasks, SnapshotCache};
use crate::config::Config;
use crate::error::StoreError;
use crate::executor::{Executor, RetryPolicy};
use crate::remote::{
  IdentityProvider, MemoryStore, Query, RemoteError, RemoteStore, RestIdentity, RestStore,
  StaticIdentity,
};

/// Facade over the remote store, the retry executor and the snapshot cache.
#[derive(Clone)]
pub struct DataService {
  store: Arc<dyn RemoteStore>,
  identity: Arc<dyn IdentityProvider>,
  executor: Executor,
  cache: SnapshotCache,
}

impl DataService {
  pub fn new(
    store: Arc<dyn RemoteStore>,
    identity: Arc<dyn IdentityProvider>,
    executor: Executor,
    cache: SnapshotCache,
  ) -> Self {
    Self {
      store,
      identity,
      executor,
      cache,
    }
  }

  /// Wire up the store, identity and cache described by `config`.
  ///
  /// `user` pins the identity (otherwise PULSE_USER_ID, then the session
  /// token is asked).
  pub fn from_config(config: &Config, user: Option<String>) -> Result<Self> {
    let user = user.or_else(Config::get_user_id);

    let (store, identity): (Arc<dyn RemoteStore>, Arc<dyn IdentityProvider>) =
      match (&config.remote.fixture, &config.remote.url) {
        (Some(fixture), _) => {
          info!(fixture = %fixture.display(), "serving store from fixture");
          let store: Arc<dyn RemoteStore> = Arc::new(MemoryStore::from_fixture(fixture)?);
          let identity: Arc<dyn IdentityProvider> = Arc::new(StaticIdentity(user));
          (store, identity)
        }
        (None, Some(url)) => {
          let api_key = Config::get_api_key()?;
          let token = Config::get_access_token();
          let store: Arc<dyn RemoteStore> =
            Arc::new(RestStore::new(url, api_key.clone(), token.clone())?);
          let identity: Arc<dyn IdentityProvider> = match user {
            Some(id) => Arc::new(StaticIdentity(Some(id))),
            None => Arc::new(RestIdentity::new(url, api_key, token)),
          };
          (store, identity)
        }
        (None, None) => return Err(eyre!("remote.url or remote.fixture must be set")),
      };

    let executor = Executor::new(config.retry.policy()?);
    let cache = SnapshotCache::new(cache::open_storage(&config.cache)?, BackgroundTasks::new());

    Ok(Self::new(store, identity, executor, cache))
  }

  pub fn cache(&self) -> &SnapshotCache {
    &self.cache
  }

  async fn current_user(&self) -> Option<String> {
    self.identity.current_user_id().await
  }

  /// Resolve the signed-in user for a write.
  async fn require_user(&self) -> Result<String, StoreError> {
    self.current_user().await.ok_or(StoreError::AuthRequired)
  }

  fn policy(&self) -> RetryPolicy {
    self.executor.policy()
  }

  async fn read_list<T>(&self, policy: &RetryPolicy, label: &str, query: Query) -> Vec<T>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let store = self.store.clone();
    self
      .executor
      .run_with(policy, label, Vec::new(), move || {
        fetch_rows(store.clone(), query.clone())
      })
      .await
  }

  async fn read_one<T>(&self, policy: &RetryPolicy, label: &str, query: Query) -> Option<T>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let store = self.store.clone();
    self
      .executor
      .run_with(policy, label, None, move || {
        let rows = fetch_rows::<T>(store.clone(), query.clone());
        async move { Ok(rows.await?.into_iter().next()) }
      })
      .await
  }

  /// Insert a single row, once.
  async fn insert_one<T>(&self, table: &str, row: Map<String, Value>) -> Result<T, StoreError>
  where
    T: DeserializeOwned,
  {
    let rows = self.store.insert(table, vec![Value::Object(row)]).await?;
    first_row(table, rows)
  }

  /// Upsert rows keyed by `on_conflict`, retried under the default policy.
  async fn upsert_rows<T>(
    &self,
    label: &str,
    table: &'static str,
    rows: Vec<Map<String, Value>>,
    on_conflict: &'static [&'static str],
  ) -> Result<Vec<T>, StoreError>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let store = self.store.clone();
    let rows: Vec<Value> = rows.into_iter().map(Value::Object).collect();
    self
      .executor
      .try_run(label, move || {
        let store = store.clone();
        let rows = rows.clone();
        async move {
          let stored = store.upsert(table, rows, on_conflict).await?;
          decode_rows(table, stored)
        }
      })
      .await
  }
}

/// A select that decodes every row into `T`.
fn fetch_rows<T>(
  store: Arc<dyn RemoteStore>,
  query: Query,
) -> impl Future<Output = Result<Vec<T>, StoreError>> + Send + 'static
where
  T: DeserializeOwned + Send + 'static,
{
  async move {
    let rows = store.select(&query).await?;
    decode_rows(&query.table, rows)
  }
}

/// Decode rows, failing closed on the first shape mismatch.
fn decode_rows<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Result<Vec<T>, StoreError> {
  rows
    .into_iter()
    .map(serde_json::from_value)
    .collect::<Result<Vec<T>, _>>()
    .map_err(|source| StoreError::Decode {
      table: table.to_string(),
      source,
    })
}

fn first_row<T: DeserializeOwned>(table: &str, rows: Vec<Value>) -> Result<T, StoreError> {
  decode_rows(table, rows)?
    .into_iter()
    .next()
    .ok_or_else(|| RemoteError::Empty(table.to_string()).into())
}

/// Serialize a payload into a row object without its `id`.
fn to_row<T: Serialize>(table: &str, value: &T) -> Result<Map<String, Value>, StoreError> {
  let value = serde_json::to_value(value).map_err(|source| StoreError::Decode {
    table: table.to_string(),
    source,
  })?;
  match value {
    Value::Object(mut row) => {
      row.remove("id");
      Ok(row)
    }
    other => Err(
      RemoteError::InvalidRequest(format!("payload for {} is not an object: {}", table, other))
        .into(),
    ),
  }
}

#[cfg(test)]
pub(crate) mod tests {
  use super::*;
  use crate::cache::MemoryStorage;
  use crate::remote::testing::ScriptedStore;
  use std::time::Duration;

  /// Service over a scripted store with a fast retry policy and no backoff.
  pub(crate) fn service(store: Arc<ScriptedStore>, user: Option<&str>) -> DataService {
    let policy = RetryPolicy::new(2, Duration::from_millis(200), Duration::ZERO).unwrap();
    DataService::new(
      store,
      Arc::new(StaticIdentity(user.map(String::from))),
      Executor::new(policy),
      SnapshotCache::new(Arc::new(MemoryStorage::new()), BackgroundTasks::new()),
    )
  }

  #[test]
  fn test_to_row_strips_id() {
    let row = to_row("t", &serde_json::json!({"id": "x", "name": "n"})).unwrap();
    assert!(!row.contains_key("id"));
    assert_eq!(row["name"], "n");
  }

  #[test]
  fn test_decode_fails_closed_on_shape_mismatch() {
    #[derive(Debug, serde::Deserialize)]
    struct Row {
      #[allow(dead_code)]
      count: u32,
    }

    let err = decode_rows::<Row>("t", vec![serde_json::json!({"count": "many"})]).unwrap_err();
    assert!(matches!(err, StoreError::Decode { .. }));
  }

  #[tokio::test(start_paused = true)]
  async fn test_slow_store_read_times_out_to_default() {
    let store = ScriptedStore::new();
    store.set_delay(Duration::from_millis(500));
    let service = service(store.clone(), None);
    let started = tokio::time::Instant::now();

    assert!(service.tenant_thresholds("acme").await.is_empty());
    assert_eq!(store.selects(), 2);
    assert!(started.elapsed() >= Duration::from_millis(400));
  }

  #[test]
  fn test_from_config_with_fixture() {
    let dir = tempfile::tempdir().unwrap();
    let fixture = dir.path().join("seed.json");
    std::fs::write(&fixture, r#"{"workspaces": []}"#).unwrap();

    let yaml = format!(
      "remote:\n  fixture: {}\ncache:\n  backend: memory\n",
      fixture.display()
    );
    let config: Config = serde_yaml::from_str(&yaml).unwrap();
    assert!(DataService::from_config(&config, Some("u1".to_string())).is_ok());
  }
}
