use std::time::Duration;

use super::{fetch_rows, first_row, to_row, DataService};
use crate::cache::CacheResult;
use crate::error::StoreError;
use crate::remote::{Filter, Query};
use crate::types::{NewWorkspace, Workspace, WorkspaceUpdate};

const WORKSPACES: &str = "workspaces";

impl DataService {
  /// Workspace listing, served from the local snapshot when there is one.
  pub async fn workspaces(&self) -> CacheResult<Vec<Workspace>> {
    let this = self.clone();
    self
      .cache
      .load(move || async move { this.fetch_workspaces().await })
      .await
  }

  /// Authoritative workspace listing, newest first. `None` when every
  /// attempt failed.
  pub async fn fetch_workspaces(&self) -> Option<Vec<Workspace>> {
    let policy = self
      .policy()
      .with_attempts(3)
      .with_timeout(Duration::from_secs(15));
    let store = self.store.clone();
    let query = Query::table(WORKSPACES).order_by("created_at", false);

    self
      .executor
      .run_with(&policy, "Get Workspaces", None, move || {
        let rows = fetch_rows::<Workspace>(store.clone(), query.clone());
        async move { rows.await.map(Some) }
      })
      .await
  }

  pub async fn create_workspace(&self, workspace: &NewWorkspace) -> Result<Workspace, StoreError> {
    let user_id = self.require_user().await?;
    let mut row = to_row(WORKSPACES, workspace)?;
    row.insert("user_id".to_string(), user_id.into());
    self.insert_one(WORKSPACES, row).await
  }

  pub async fn update_workspace(
    &self,
    id: &str,
    update: &WorkspaceUpdate,
  ) -> Result<Workspace, StoreError> {
    let patch = to_row(WORKSPACES, update)?;
    let rows = self
      .store
      .update(WORKSPACES, &[Filter::eq("id", id)], patch.into())
      .await?;
    first_row(WORKSPACES, rows)
  }
}

#[cfg(test)]
mod tests {
  use crate::cache::CacheSource;
  use crate::error::StoreError;
  use crate::remote::testing::ScriptedStore;
  use crate::remote::RemoteError;
  use crate::service::tests::service;
  use crate::types::{NewWorkspace, Workspace, WorkspaceUpdate};
  use serde_json::json;

  fn workspace(id: &str, name: &str) -> Workspace {
    Workspace {
      id: id.to_string(),
      user_id: None,
      name: name.to_string(),
      kind: String::new(),
      description: String::new(),
      created_at: None,
    }
  }

  #[tokio::test]
  async fn test_empty_snapshot_fetches_and_persists() {
    let store = ScriptedStore::new();
    store.inner.seed("workspaces", vec![json!({"id": "w1"})]);
    let service = service(store.clone(), Some("u1"));

    let result = service.workspaces().await;

    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data.len(), 1);
    assert_eq!(result.data[0].id, "w1");
    assert_eq!(service.cache().snapshot::<Workspace>(), result.data);
  }

  #[tokio::test]
  async fn test_snapshot_served_and_refreshed() {
    let store = ScriptedStore::new();
    store.inner.seed(
      "workspaces",
      vec![json!({"id": "w2", "name": "Beta", "created_at": "2024-02-01T00:00:00Z"})],
    );
    let service = service(store.clone(), Some("u1"));
    service.cache().store(&[workspace("w1", "Alpha")]).unwrap();

    let result = service.workspaces().await;
    assert_eq!(result.source, CacheSource::Snapshot);
    assert_eq!(result.data, vec![workspace("w1", "Alpha")]);

    service.cache().tasks().join_all().await;
    let refreshed = service.cache().snapshot::<Workspace>();
    assert_eq!(refreshed.len(), 1);
    assert_eq!(refreshed[0].id, "w2");
  }

  #[tokio::test]
  async fn test_failed_refresh_leaves_snapshot_alone() {
    let store = ScriptedStore::new();
    store.go_offline();
    let service = service(store.clone(), Some("u1"));
    let before = vec![workspace("w1", "Alpha")];
    service.cache().store(&before).unwrap();

    let result = service.workspaces().await;
    service.cache().tasks().join_all().await;

    assert_eq!(result.data, before);
    assert_eq!(service.cache().snapshot::<Workspace>(), before);
    // Listing uses its own three-attempt budget
    assert_eq!(store.selects(), 3);
  }

  #[tokio::test]
  async fn test_listing_newest_first() {
    let store = ScriptedStore::new();
    store.inner.seed(
      "workspaces",
      vec![
        json!({"id": "old", "name": "Old", "created_at": "2024-01-01T00:00:00Z"}),
        json!({"id": "new", "name": "New", "created_at": "2024-06-01T00:00:00Z"}),
      ],
    );
    let service = service(store, None);

    let listed = service.fetch_workspaces().await.unwrap();
    let ids: Vec<&str> = listed.iter().map(|w| w.id.as_str()).collect();
    assert_eq!(ids, vec!["new", "old"]);
  }

  #[tokio::test]
  async fn test_create_workspace_stamps_owner() {
    let store = ScriptedStore::new();
    let service = service(store.clone(), Some("u1"));

    let created = service
      .create_workspace(&NewWorkspace {
        name: "Alpha".to_string(),
        kind: "web".to_string(),
        description: "Marketing site".to_string(),
      })
      .await
      .unwrap();

    assert_eq!(created.user_id.as_deref(), Some("u1"));
    assert_eq!(created.kind, "web");
    assert!(!created.id.is_empty());
    assert_eq!(store.inner.rows("workspaces").len(), 1);
  }

  #[tokio::test]
  async fn test_create_workspace_requires_identity() {
    let store = ScriptedStore::new();
    let service = service(store.clone(), None);

    let err = service
      .create_workspace(&NewWorkspace {
        name: "Alpha".to_string(),
        kind: "web".to_string(),
        description: String::new(),
      })
      .await
      .unwrap_err();

    assert!(matches!(err, StoreError::AuthRequired));
    assert_eq!(store.calls(), 0);
  }

  #[tokio::test]
  async fn test_create_workspace_is_not_retried() {
    let store = ScriptedStore::new();
    store.fail_next(1);
    let service = service(store.clone(), Some("u1"));

    let err = service
      .create_workspace(&NewWorkspace {
        name: "Alpha".to_string(),
        kind: "web".to_string(),
        description: String::new(),
      })
      .await
      .unwrap_err();

    assert!(matches!(err, StoreError::Remote(RemoteError::Transport(_))));
    assert_eq!(store.writes(), 1);
    assert!(store.inner.rows("workspaces").is_empty());
  }

  #[tokio::test]
  async fn test_update_workspace() {
    let store = ScriptedStore::new();
    store
      .inner
      .seed("workspaces", vec![json!({"id": "w1", "name": "Alpha", "type": "web"})]);
    let service = service(store, None);

    let updated = service
      .update_workspace(
        "w1",
        &WorkspaceUpdate {
          name: Some("Alpha v2".to_string()),
          ..Default::default()
        },
      )
      .await
      .unwrap();
    assert_eq!(updated.name, "Alpha v2");
    assert_eq!(updated.kind, "web");

    let missing = service
      .update_workspace("nope", &WorkspaceUpdate::default())
      .await
      .unwrap_err();
    assert!(matches!(missing, StoreError::Remote(RemoteError::Empty(_))));
  }
}
