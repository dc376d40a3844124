use super::{to_row, DataService};
use crate::error::StoreError;
use crate::remote::Query;
use crate::types::ReleaseReport;

const REPORTS: &str = "release_reports";

impl DataService {
  /// Release reports of the signed-in user, newest first.
  pub async fn release_reports(&self) -> Vec<ReleaseReport> {
    let Some(user_id) = self.current_user().await else {
      return Vec::new();
    };
    let query = Query::table(REPORTS)
      .eq("user_id", user_id)
      .order_by("created_at", false);

    self
      .read_list(&self.policy(), "Get Release Reports", query)
      .await
  }

  pub async fn save_release_report(
    &self,
    report: &ReleaseReport,
  ) -> Result<ReleaseReport, StoreError> {
    let user_id = self.require_user().await?;
    let mut row = to_row(REPORTS, report)?;
    row.insert("user_id".to_string(), user_id.into());
    self.insert_one(REPORTS, row).await
  }
}
