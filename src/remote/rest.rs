//! PostgREST-backed remote store (the hosted database's REST surface).

use async_trait::async_trait;
use color_eyre::{eyre::eyre, Result};
use reqwest::{Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;
use url::Url;

use super::client::{RemoteError, RemoteStore};
use super::query::{Filter, FilterOp, Query};

/// Remote store client speaking the PostgREST dialect.
#[derive(Clone)]
pub struct RestStore {
  http: reqwest::Client,
  base: Url,
  api_key: String,
  access_token: Option<String>,
}

impl RestStore {
  pub fn new(base_url: &str, api_key: String, access_token: Option<String>) -> Result<Self> {
    let base = parse_base(base_url)?;
    let http = reqwest::Client::builder()
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self {
      http,
      base,
      api_key,
      access_token,
    })
  }

  fn table_url(&self, table: &str) -> Result<Url, RemoteError> {
    self
      .base
      .join(&format!("rest/v1/{}", table))
      .map_err(|e| RemoteError::InvalidRequest(format!("bad table name {}: {}", table, e)))
  }

  fn request(&self, method: Method, url: Url) -> RequestBuilder {
    let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
    self
      .http
      .request(method, url)
      .header("apikey", &self.api_key)
      .bearer_auth(bearer)
  }

  async fn send(&self, table: &str, request: RequestBuilder) -> Result<Vec<Value>, RemoteError> {
    let response = request
      .send()
      .await
      .map_err(|e| RemoteError::Transport(e.to_string()))?;
    debug!(table, status = response.status().as_u16(), "remote response");
    read_rows(response).await
  }
}

/// Parse the project URL, making sure relative joins keep its path.
fn parse_base(base_url: &str) -> Result<Url> {
  let normalized = if base_url.ends_with('/') {
    base_url.to_string()
  } else {
    format!("{}/", base_url)
  };
  Url::parse(&normalized).map_err(|e| eyre!("Invalid remote store URL {}: {}", base_url, e))
}

#[derive(Deserialize)]
struct ErrorBody {
  message: Option<String>,
}

async fn read_rows(response: Response) -> Result<Vec<Value>, RemoteError> {
  let status = response.status();
  if !status.is_success() {
    let body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&body)
      .ok()
      .and_then(|b| b.message)
      .unwrap_or(body);
    return Err(RemoteError::Http {
      status: status.as_u16(),
      message,
    });
  }

  let body: Value = response
    .json()
    .await
    .map_err(|e| RemoteError::Transport(format!("invalid response body: {}", e)))?;

  match body {
    Value::Array(rows) => Ok(rows),
    Value::Null => Ok(Vec::new()),
    row => Ok(vec![row]),
  }
}

/// A single lookup may match zero rows (absent) but never more than one.
pub(crate) fn check_single(query: &Query, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
  if query.single && rows.len() > 1 {
    return Err(RemoteError::Http {
      status: 406,
      message: format!(
        "{} rows returned from {} where at most one was expected",
        rows.len(),
        query.table
      ),
    });
  }
  Ok(rows)
}

/// Render a filter value the way PostgREST expects it in a query string.
fn encode_value(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Null => "null".to_string(),
    Value::Array(items) => {
      let inner: Vec<String> = items
        .iter()
        .map(|item| {
          let raw = encode_value(item);
          if raw.contains([',', '(', ')', '"', '\\']) {
            format!("\"{}\"", raw.replace('\\', "\\\\").replace('"', "\\\""))
          } else {
            raw
          }
        })
        .collect();
      format!("({})", inner.join(","))
    }
    other => other.to_string(),
  }
}

fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
  filters
    .iter()
    .map(|f| {
      let op = match (f.op, &f.value) {
        (FilterOp::Eq, Value::Null) => "is",
        (op, _) => op.as_str(),
      };
      (f.column.clone(), format!("{}.{}", op, encode_value(&f.value)))
    })
    .collect()
}

/// Query-string pairs for a select.
pub(crate) fn select_pairs(query: &Query) -> Vec<(String, String)> {
  let columns = query
    .columns
    .as_ref()
    .map(|c| c.join(","))
    .unwrap_or_else(|| "*".to_string());

  let mut pairs = vec![("select".to_string(), columns)];
  pairs.extend(filter_pairs(&query.filters));

  if let Some(order) = &query.order {
    let direction = if order.ascending { "asc" } else { "desc" };
    pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
  }
  if let Some(limit) = query.limit {
    pairs.push(("limit".to_string(), limit.to_string()));
  }
  pairs
}

#[async_trait]
impl RemoteStore for RestStore {
  async fn select(&self, query: &Query) -> Result<Vec<Value>, RemoteError> {
    let mut url = self.table_url(&query.table)?;
    url.query_pairs_mut().extend_pairs(select_pairs(query));

    let rows = self
      .send(&query.table, self.request(Method::GET, url))
      .await?;
    check_single(query, rows)
  }

  async fn insert(&self, table: &str, rows: Vec<Value>) -> Result<Vec<Value>, RemoteError> {
    let url = self.table_url(table)?;
    let request = self
      .request(Method::POST, url)
      .header("Prefer", "return=representation")
      .json(&rows);
    self.send(table, request).await
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

    let mut url = self.table_url(table)?;
    url.query_pairs_mut().extend_pairs(filter_pairs(filters));
    let request = self
      .request(Method::PATCH, url)
      .header("Prefer", "return=representation")
      .json(&patch);
    self.send(table, request).await
  }

  async fn upsert(
    &self,
    table: &str,
    rows: Vec<Value>,
    on_conflict: &[&str],
  ) -> Result<Vec<Value>, RemoteError> {
    let mut url = self.table_url(table)?;
    if !on_conflict.is_empty() {
      url
        .query_pairs_mut()
        .append_pair("on_conflict", &on_conflict.join(","));
    }
    let request = self
      .request(Method::POST, url)
      .header("Prefer", "resolution=merge-duplicates,return=representation")
      .json(&rows);
    self.send(table, request).await
  }
}
