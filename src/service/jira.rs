use serde::Deserialize;
use std::time::Duration;

use super::{to_row, DataService};
use crate::error::StoreError;
use crate::remote::{Query, RemoteError};
use crate::types::{CustomFieldMapping, JiraConnection};

const CONNECTIONS: &str = "jira_connections";
const FIELD_MAPPINGS: &str = "jira_custom_field_mappings";

#[derive(Deserialize)]
struct FieldIdRow {
  jira_field_id: String,
}

impl DataService {
  /// Most recent active Jira connection of the signed-in user.
  pub async fn jira_connection(&self) -> Option<JiraConnection> {
    let user_id = self.current_user().await?;
    let policy = self
      .policy()
      .with_attempts(1)
      .with_timeout(Duration::from_secs(10));
    let query = Query::table(CONNECTIONS)
      .eq("user_id", user_id)
      .eq("is_active", true)
      .order_by("created_at", false)
      .limit(1)
      .single();

    self.read_one(&policy, "Get Jira Connection", query).await
  }

  /// Upsert on (user, base url, project key); saved connections are active.
  pub async fn save_jira_connection(
    &self,
    connection: &JiraConnection,
  ) -> Result<JiraConnection, StoreError> {
    let user_id = self.require_user().await?;
    let mut row = to_row(CONNECTIONS, connection)?;
    row.insert("user_id".to_string(), user_id.into());
    row.insert("is_active".to_string(), true.into());

    self
      .upsert_rows(
        "Save Jira Connection",
        CONNECTIONS,
        vec![row],
        &["user_id", "jira_base_url", "project_key"],
      )
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| RemoteError::Empty(CONNECTIONS.to_string()).into())
  }

  /// Upsert on (connection, field name).
  pub async fn save_custom_field_mapping(
    &self,
    mapping: &CustomFieldMapping,
  ) -> Result<(), StoreError> {
    let row = to_row(FIELD_MAPPINGS, mapping)?;
    self
      .upsert_rows::<CustomFieldMapping>(
        "Save Custom Field Mapping",
        FIELD_MAPPINGS,
        vec![row],
        &["jira_connection_id", "field_name"],
      )
      .await
      .map(|_| ())
  }

  /// Jira field id mapped to `field_name` for a connection.
  pub async fn custom_field_mapping(&self, connection_id: &str, field_name: &str) -> Option<String> {
    let query = Query::table(FIELD_MAPPINGS)
      .select(&["jira_field_id"])
      .eq("jira_connection_id", connection_id)
      .eq("field_name", field_name)
      .single();

    self
      .read_one::<FieldIdRow>(&self.policy(), "Get Custom Field Mapping", query)
      .await
      .map(|row| row.jira_field_id)
      .filter(|id| !id.is_empty())
  }
}
