use chrono::{NaiveDate, TimeDelta, Utc};
use serde::Deserialize;

use super::{to_row, DataService};
use crate::error::StoreError;
use crate::remote::Query;
use crate::types::{CsvUploadLog, KpiDefinition, KpiFact, KpiThreshold};

const FACTS: &str = "kpi_daily_facts";
const DICTIONARY: &str = "kpi_dictionary";
const THRESHOLDS: &str = "kpi_thresholds";
const UPLOAD_LOG: &str = "csv_upload_log";
const TEMPLATE_HEADERS: &str = "csv_template_headers";

/// Headers used when no template is configured remotely.
const DEFAULT_TEMPLATE_HEADERS: [&str; 3] = ["tenant_id", "site_id", "kpi_date"];

#[derive(Deserialize)]
struct TenantRow {
  #[serde(default)]
  tenant_id: Option<String>,
}

#[derive(Deserialize)]
struct HeaderRow {
  column_name: String,
}

impl DataService {
  /// Distinct tenants that have facts, in first-seen order.
  pub async fn available_tenants(&self) -> Vec<String> {
    let query = Query::table(FACTS).select(&["tenant_id"]);
    let rows: Vec<TenantRow> = self.read_list(&self.policy(), "Get Tenants", query).await;

    let mut tenants: Vec<String> = Vec::new();
    for tenant in rows.into_iter().filter_map(|r| r.tenant_id) {
      if !tenant.is_empty() && !tenants.contains(&tenant) {
        tenants.push(tenant);
      }
    }
    tenants
  }

  /// Every fact of a tenant, oldest day first.
  pub async fn tenant_facts(&self, tenant_id: &str) -> Vec<KpiFact> {
    let query = Query::table(FACTS)
      .eq("tenant_id", tenant_id)
      .order_by("kpi_date", true);
    let label = format!("Get Facts: {}", tenant_id);

    self.read_list(&self.policy(), &label, query).await
  }

  /// Facts of the last `days` days (counted from today, UTC).
  pub async fn facts_for_range(&self, tenant_id: &str, days: i64) -> Vec<KpiFact> {
    let today = Utc::now().date_naive();
    match TimeDelta::try_days(days).and_then(|span| today.checked_sub_signed(span)) {
      Some(start) => self.facts_since(tenant_id, start).await,
      // Lower bound falls off the calendar: every fact is in range
      None if days > 0 => self.tenant_facts(tenant_id).await,
      None => Vec::new(),
    }
  }

  pub async fn facts_since(&self, tenant_id: &str, start: NaiveDate) -> Vec<KpiFact> {
    let query = Query::table(FACTS)
      .eq("tenant_id", tenant_id)
      .gte("kpi_date", start.format("%Y-%m-%d").to_string())
      .order_by("kpi_date", true);
    let label = format!("Get Facts Range: {}", tenant_id);

    self.read_list(&self.policy(), &label, query).await
  }

  /// Upsert facts keyed by (tenant, site, source, day). Ids are dropped.
  pub async fn bulk_ingest_facts(&self, facts: &[KpiFact]) -> Result<(), StoreError> {
    if facts.is_empty() {
      return Ok(());
    }
    let rows = facts
      .iter()
      .map(|f| to_row(FACTS, f))
      .collect::<Result<Vec<_>, _>>()?;

    self
      .upsert_rows::<KpiFact>(
        "Ingest Facts",
        FACTS,
        rows,
        &["tenant_id", "site_id", "source", "kpi_date"],
      )
      .await
      .map(|_| ())
  }

  /// KPI definitions, optionally restricted to `keys`.
  pub async fn kpi_dictionary(&self, keys: &[String]) -> Vec<KpiDefinition> {
    let mut query = Query::table(DICTIONARY);
    if !keys.is_empty() {
      query = query.is_in("kpi_key", keys.iter().cloned());
    }

    self.read_list(&self.policy(), "Get Dictionary", query).await
  }

  /// Upsert a definition keyed by its KPI key.
  pub async fn save_kpi_definition(&self, definition: &KpiDefinition) -> Result<(), StoreError> {
    let row = to_row(DICTIONARY, definition)?;
    self
      .upsert_rows::<KpiDefinition>("Save KPI Definition", DICTIONARY, vec![row], &["kpi_key"])
      .await
      .map(|_| ())
  }

  pub async fn tenant_thresholds(&self, tenant_id: &str) -> Vec<KpiThreshold> {
    let query = Query::table(THRESHOLDS).eq("tenant_id", tenant_id);
    self.read_list(&self.policy(), "Get Thresholds", query).await
  }

  /// Upsert thresholds keyed by (tenant, KPI key). Ids are dropped.
  pub async fn save_thresholds(&self, thresholds: &[KpiThreshold]) -> Result<(), StoreError> {
    if thresholds.is_empty() {
      return Ok(());
    }
    let rows = thresholds
      .iter()
      .map(|t| to_row(THRESHOLDS, t))
      .collect::<Result<Vec<_>, _>>()?;

    self
      .upsert_rows::<KpiThreshold>("Save Thresholds", THRESHOLDS, rows, &["tenant_id", "kpi_key"])
      .await
      .map(|_| ())
  }

  pub async fn log_upload(&self, log: &CsvUploadLog) -> Result<(), StoreError> {
    let row = to_row(UPLOAD_LOG, log)?;
    self
      .insert_one::<CsvUploadLog>(UPLOAD_LOG, row)
      .await
      .map(|_| ())
  }

  /// Column headers of the CSV upload template.
  pub async fn csv_template_headers(&self) -> Vec<String> {
    let query = Query::table(TEMPLATE_HEADERS).select(&["column_name"]);
    let rows: Vec<HeaderRow> = self.read_list(&self.policy(), "Get Headers", query).await;

    if rows.is_empty() {
      return DEFAULT_TEMPLATE_HEADERS.iter().map(|h| h.to_string()).collect();
    }
    rows.into_iter().map(|r| r.column_name).collect()
  }
}
