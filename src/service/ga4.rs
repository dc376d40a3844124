use std::time::Duration;

use super::{to_row, DataService};
use crate::error::StoreError;
use crate::remote::{Query, RemoteError};
use crate::types::{Ga4Settings, Ga4SyncHistory};

const SETTINGS: &str = "user_ga4_settings";
const SYNC_HISTORY: &str = "ga4_sync_history";

impl DataService {
  /// GA4 settings of the signed-in user; `None` when signed out or unset.
  pub async fn ga4_settings(&self) -> Option<Ga4Settings> {
    let user_id = self.current_user().await?;
    let policy = self
      .policy()
      .with_attempts(1)
      .with_timeout(Duration::from_secs(8));
    let query = Query::table(SETTINGS).eq("user_id", user_id).single();

    self.read_one(&policy, "Get GA4 Settings", query).await
  }

  /// Upsert on (user, property).
  pub async fn save_ga4_settings(&self, settings: &Ga4Settings) -> Result<Ga4Settings, StoreError> {
    let user_id = self.require_user().await?;
    let mut row = to_row(SETTINGS, settings)?;
    row.insert("user_id".to_string(), user_id.into());

    self
      .upsert_rows(
        "Save GA4 Settings",
        SETTINGS,
        vec![row],
        &["user_id", "property_id"],
      )
      .await?
      .into_iter()
      .next()
      .ok_or_else(|| RemoteError::Empty(SETTINGS.to_string()).into())
  }

  pub async fn log_ga4_sync(&self, history: &Ga4SyncHistory) -> Result<(), StoreError> {
    let user_id = self.require_user().await?;
    let mut row = to_row(SYNC_HISTORY, history)?;
    row.insert("user_id".to_string(), user_id.into());

    self
      .insert_one::<Ga4SyncHistory>(SYNC_HISTORY, row)
      .await
      .map(|_| ())
  }
}
