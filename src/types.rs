//! Entity records moved through the access layer.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::cache::Cacheable;

/// A project workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workspace {
  pub id: String,
  #[serde(default)]
  pub user_id: Option<String>,
  #[serde(default)]
  pub name: String,
  #[serde(rename = "type", default)]
  pub kind: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

impl Cacheable for Workspace {
  fn slot() -> &'static str {
    "productpulse_workspaces_cache"
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkspace {
  pub name: String,
  #[serde(rename = "type")]
  pub kind: String,
  pub description: String,
}

/// Partial update; unset fields are left untouched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceUpdate {
  #[serde(skip_serializing_if = "Option::is_none")]
  pub name: Option<String>,
  #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
  pub kind: Option<String>,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

/// Google Analytics 4 property binding for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ga4Settings {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub property_id: String,
  pub property_name: String,
  #[serde(default)]
  pub account_id: Option<String>,
  #[serde(default)]
  pub account_name: Option<String>,
  #[serde(default)]
  pub selected_metrics: Vec<String>,
  #[serde(default)]
  pub sync_schedule: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ga4SyncHistory {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub property_id: String,
  pub status: String,
  #[serde(default)]
  pub rows_synced: u64,
  #[serde(default)]
  pub synced_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JiraConnection {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub jira_base_url: String,
  pub project_key: String,
  #[serde(default)]
  pub email: Option<String>,
  #[serde(default)]
  pub is_active: bool,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

/// Maps a logical field name (e.g. "story_points") to a Jira custom field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomFieldMapping {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub jira_connection_id: String,
  pub field_name: String,
  pub jira_field_id: String,
}

/// One day of KPI values for a tenant, site and source.
///
/// Metric columns vary per tenant (they follow the CSV template headers),
/// so everything beyond the key columns is kept as-is in `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiFact {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub tenant_id: String,
  pub site_id: String,
  pub source: String,
  pub kpi_date: NaiveDate,
  #[serde(flatten)]
  pub metrics: BTreeMap<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiDefinition {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub kpi_key: String,
  pub kpi_name: String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub formula: String,
  #[serde(default)]
  pub owner: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThresholdType {
  #[serde(rename = ">")]
  Above,
  #[serde(rename = "<")]
  Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertPriority {
  High,
  Medium,
  Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiThreshold {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub tenant_id: String,
  pub kpi_key: String,
  pub target_value: f64,
  pub warning_threshold: f64,
  pub failure_threshold: f64,
  pub threshold_type: ThresholdType,
  pub alert_priority: AlertPriority,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseReport {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub user_id: Option<String>,
  pub title: String,
  #[serde(default)]
  pub version: Option<String>,
  #[serde(default)]
  pub summary: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CsvUploadLog {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub id: Option<String>,
  pub tenant_id: String,
  pub file_name: String,
  pub rows_ingested: u64,
  pub status: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub uploaded_at: Option<DateTime<Utc>>,
}
