//! Sync API endpoints
//!
//! Exposes the sync manager over HTTP. Sync operations always answer 200 with
//! a `SyncResult`; its `success` flag and `error` carry the outcome.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::error::{AppError, Result};
use crate::state::AppState;
use crate::sync::{CloudSaveInfo, DataConflict, SaveData, SyncManagerStatus, SyncResult};

/// Create the sync router
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/push", post(push_save))
        .route("/resolve", post(resolve_conflicts))
        .route("/pull", get(pull_save))
        .route("/saves", get(list_saves))
        .route("/saves/:id", delete(delete_save))
        .route("/status", get(get_status))
        .route("/provider", put(set_provider))
}

/// Manual resolution request
#[derive(Debug, Deserialize)]
pub struct ResolveRequest {
    pub save: SaveData,
    pub decisions: Vec<DataConflict>,
}

#[derive(Debug, Deserialize)]
pub struct SetProviderRequest {
    pub name: String,
}

/// Push a local save
async fn push_save(State(state): State<AppState>, Json(save): Json<SaveData>) -> Json<SyncResult> {
    Json(state.manager().push(&save).await)
}

/// Complete a push that is waiting on manual decisions
async fn resolve_conflicts(
    State(state): State<AppState>,
    Json(req): Json<ResolveRequest>,
) -> Json<SyncResult> {
    Json(state.manager().resolve_and_push(&req.save, &req.decisions).await)
}

/// Fetch the latest cloud save
async fn pull_save(State(state): State<AppState>) -> Json<SyncResult> {
    Json(state.manager().pull().await)
}

async fn list_saves(State(state): State<AppState>) -> Json<Vec<CloudSaveInfo>> {
    Json(state.manager().list_cloud_saves().await)
}

async fn delete_save(State(state): State<AppState>, Path(id): Path<String>) -> Result<StatusCode> {
    if state.manager().delete_cloud_save(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Save not found: {}", id)))
    }
}

async fn get_status(State(state): State<AppState>) -> Json<SyncManagerStatus> {
    Json(state.manager().status().await)
}

/// Switch the active provider
async fn set_provider(
    State(state): State<AppState>,
    Json(req): Json<SetProviderRequest>,
) -> Result<Json<SyncManagerStatus>> {
    state.manager().set_active_provider(&req.name).await?;
    Ok(Json(state.manager().status().await))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, SyncConfig};
    use crate::providers::LocalStoreProvider;
    use crate::routes;
    use crate::sync::{ConflictStrategy, Resolution, SyncManager};
    use axum_test::TestServer;
    use chrono::{Duration, Utc};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tempfile::TempDir;

    async fn setup(strategy: ConflictStrategy) -> (TestServer, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let manager = SyncManager::new(SyncConfig {
            conflict_resolution: strategy,
            ..SyncConfig::default()
        });
        manager
            .register_provider("local", Arc::new(LocalStoreProvider::new(temp_dir.path().join("saves"), 10)))
            .await;

        // A provider whose directory sits under a regular file is never available
        let blocker = temp_dir.path().join("blocker");
        std::fs::write(&blocker, b"x").unwrap();
        manager
            .register_provider(
                "offline",
                Arc::new(LocalStoreProvider::new(blocker.join("saves"), 10).with_name("offline")),
            )
            .await;

        let state = AppState::new(Config::default(), manager);
        let server = TestServer::new(routes::app(state)).unwrap();
        (server, temp_dir)
    }

    fn save_json(money: i64, age_minutes: i64) -> Value {
        json!({
            "gameData": {"player": {"name": "Ada", "money": money, "level": 4, "expeditionsCompleted": 1}},
            "lastSaved": Utc::now() - Duration::minutes(age_minutes),
        })
    }

    #[tokio::test]
    async fn test_health() {
        let (server, _dir) = setup(ConflictStrategy::NewestWins).await;

        let response = server.get("/health").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["service"], "cloudsave-server");
        assert_eq!(body["status"], "healthy");
    }

    #[tokio::test]
    async fn test_push_then_pull() {
        let (server, _dir) = setup(ConflictStrategy::NewestWins).await;

        let pushed: SyncResult = server.post("/api/v1/sync/push").json(&save_json(250, 0)).await.json();
        assert!(pushed.success);

        let pulled: SyncResult = server.get("/api/v1/sync/pull").await.json();
        assert!(pulled.success);
        assert_eq!(pulled.save.unwrap().field("player.money"), Some(&json!(250)));
    }

    #[tokio::test]
    async fn test_pull_without_saves() {
        let (server, _dir) = setup(ConflictStrategy::NewestWins).await;

        let response = server.get("/api/v1/sync/pull").await;
        response.assert_status_ok();
        let body: Value = response.json();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "no cloud save found");
    }

    #[tokio::test]
    async fn test_manual_resolution_flow() {
        let (server, _dir) = setup(ConflictStrategy::Manual).await;
        server.post("/api/v1/sync/push").json(&save_json(4000, 30)).await;

        let local = save_json(5000, 0);
        let blocked: SyncResult = server.post("/api/v1/sync/push").json(&local).await.json();
        assert!(!blocked.success);
        assert_eq!(blocked.conflicts.len(), 1);

        let decisions: Vec<DataConflict> = blocked
            .conflicts
            .into_iter()
            .map(|c| c.with_resolution(Resolution::Merge))
            .collect();
        let resolved: SyncResult = server
            .post("/api/v1/sync/resolve")
            .json(&json!({"save": local, "decisions": decisions}))
            .await
            .json();

        assert!(resolved.success);
        assert_eq!(resolved.resolved_changes, 1);
        assert_eq!(resolved.save.unwrap().field("player.money"), Some(&json!(5000)));
    }

    #[tokio::test]
    async fn test_list_and_delete_saves() {
        let (server, _dir) = setup(ConflictStrategy::NewestWins).await;
        server.post("/api/v1/sync/push").json(&save_json(1, 0)).await;

        let saves: Vec<CloudSaveInfo> = server.get("/api/v1/sync/saves").await.json();
        assert_eq!(saves.len(), 1);
        assert_eq!(saves[0].metadata.player_name.as_deref(), Some("Ada"));

        let path = format!("/api/v1/sync/saves/{}", saves[0].id);
        server.delete(&path).await.assert_status(StatusCode::NO_CONTENT);
        server.delete(&path).await.assert_status(StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_status_and_provider_switch() {
        let (server, _dir) = setup(ConflictStrategy::NewestWins).await;

        let status: SyncManagerStatus = server.get("/api/v1/sync/status").await.json();
        assert_eq!(status.active_provider.as_deref(), Some("local"));
        assert_eq!(status.available_providers, ["local", "offline"]);

        server
            .put("/api/v1/sync/provider")
            .json(&json!({"name": "offline"}))
            .await
            .assert_status(StatusCode::SERVICE_UNAVAILABLE);
        server
            .put("/api/v1/sync/provider")
            .json(&json!({"name": "dropbox"}))
            .await
            .assert_status(StatusCode::NOT_FOUND);

        let status: SyncManagerStatus = server
            .put("/api/v1/sync/provider")
            .json(&json!({"name": "local"}))
            .await
            .json();
        assert_eq!(status.active_provider.as_deref(), Some("local"));
    }
}
