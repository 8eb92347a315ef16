//! Sync manager
//!
//! Orchestrates a sync session against the active provider:
//! download the cloud save, detect and resolve conflicts, merge, upload.
//!
//! At most one push or pull runs at a time per manager. A second call while
//! one is in flight fails immediately with a busy error; nothing is queued.
//! Every operation reports through [`SyncResult`] and never returns an error
//! or panics into the caller.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use tokio::sync::RwLock;

use super::conflict::{apply_decisions, ConflictDetector, ConflictResolver};
use super::merge::merge;
use super::types::{CloudSaveInfo, DataConflict, SaveData, SyncManagerStatus, SyncResult};
use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::providers::SyncProvider;

/// Clears the busy flag when dropped, on every exit path
struct SyncGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

struct RegisteredProvider {
    name: String,
    provider: Arc<dyn SyncProvider>,
}

/// Coordinates sync operations across registered providers
pub struct SyncManager {
    config: SyncConfig,
    detector: ConflictDetector,
    resolver: Box<dyn ConflictResolver>,
    providers: RwLock<Vec<RegisteredProvider>>,
    active: RwLock<Option<String>>,
    in_progress: AtomicBool,
}

impl SyncManager {
    /// Create a manager with no providers registered
    pub fn new(config: SyncConfig) -> Self {
        let detector = ConflictDetector::new(config.monitored_fields.iter().cloned());
        let resolver = config.conflict_resolution.resolver();

        Self {
            config,
            detector,
            resolver,
            providers: RwLock::new(Vec::new()),
            active: RwLock::new(None),
            in_progress: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Whether a push or pull is currently running
    pub fn is_syncing(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Register a provider under `name`, replacing any previous one.
    ///
    /// The first provider registered becomes active.
    pub async fn register_provider(&self, name: impl Into<String>, provider: Arc<dyn SyncProvider>) {
        let name = name.into();
        {
            let mut providers = self.providers.write().await;
            if let Some(existing) = providers.iter_mut().find(|p| p.name == name) {
                existing.provider = provider;
            } else {
                providers.push(RegisteredProvider {
                    name: name.clone(),
                    provider,
                });
            }
        }

        let mut active = self.active.write().await;
        if active.is_none() {
            tracing::info!(provider = %name, "Registered provider is now active");
            *active = Some(name);
        } else {
            tracing::info!(provider = %name, "Registered provider");
        }
    }

    /// Switch the active provider after a successful availability probe.
    ///
    /// On failure the previous provider stays active.
    pub async fn set_active_provider(&self, name: &str) -> Result<(), SyncError> {
        let provider = self
            .find_provider(name)
            .await
            .ok_or_else(|| SyncError::UnknownProvider(name.to_string()))?;

        if !provider.is_available().await {
            tracing::warn!(provider = %name, "Provider unavailable, keeping current provider");
            return Err(SyncError::ProviderUnavailable(name.to_string()));
        }

        *self.active.write().await = Some(name.to_string());
        tracing::info!(provider = %name, "Switched active provider");
        Ok(())
    }

    /// Name of the active provider, if any
    pub async fn active_provider_name(&self) -> Option<String> {
        self.active.read().await.clone()
    }

    pub async fn status(&self) -> SyncManagerStatus {
        let available_providers = self
            .providers
            .read()
            .await
            .iter()
            .map(|p| p.name.clone())
            .collect();

        SyncManagerStatus {
            enabled: self.config.enabled,
            active_provider: self.active_provider_name().await,
            in_progress: self.is_syncing(),
            available_providers,
        }
    }

    /// Reconcile `local` with the cloud save and upload the result
    pub async fn push(&self, local: &SaveData) -> SyncResult {
        self.run_exclusive("push", self.try_push(local, None)).await
    }

    /// Finish a push that stopped on unresolved conflicts.
    ///
    /// Conflicts are re-detected against the current cloud save and take
    /// their resolution from `decisions` by field. The merge only happens if
    /// every conflict is resolved.
    pub async fn resolve_and_push(&self, local: &SaveData, decisions: &[DataConflict]) -> SyncResult {
        self.run_exclusive("resolve", self.try_push(local, Some(decisions)))
            .await
    }

    /// Fetch the latest cloud save without touching local state
    pub async fn pull(&self) -> SyncResult {
        self.run_exclusive("pull", self.try_pull()).await
    }

    /// List saves on the active provider; empty on any failure
    pub async fn list_cloud_saves(&self) -> Vec<CloudSaveInfo> {
        let Some(provider) = self.active_provider().await else {
            tracing::warn!("Cannot list cloud saves: no active provider");
            return Vec::new();
        };

        match provider.list_saves().await {
            Ok(saves) => saves,
            Err(e) => {
                tracing::warn!(provider = %provider.name(), error = %e, "Failed to list cloud saves");
                Vec::new()
            }
        }
    }

    /// Delete a save on the active provider; `false` on any failure
    pub async fn delete_cloud_save(&self, id: &str) -> bool {
        let Some(provider) = self.active_provider().await else {
            tracing::warn!("Cannot delete cloud save: no active provider");
            return false;
        };

        match provider.delete(id).await {
            Ok(deleted) => deleted,
            Err(e) => {
                tracing::warn!(provider = %provider.name(), id = %id, error = %e, "Failed to delete cloud save");
                false
            }
        }
    }

    async fn find_provider(&self, name: &str) -> Option<Arc<dyn SyncProvider>> {
        self.providers
            .read()
            .await
            .iter()
            .find(|p| p.name == name)
            .map(|p| Arc::clone(&p.provider))
    }

    async fn active_provider(&self) -> Option<Arc<dyn SyncProvider>> {
        let name = self.active_provider_name().await?;
        self.find_provider(&name).await
    }

    /// The active provider, if set and currently reachable
    async fn usable_provider(&self) -> Result<Arc<dyn SyncProvider>, SyncError> {
        let provider = self.active_provider().await.ok_or(SyncError::NoActiveProvider)?;

        if !provider.is_available().await {
            tracing::warn!(provider = %provider.name(), "Active provider failed availability probe");
            return Err(SyncError::NoActiveProvider);
        }

        Ok(provider)
    }

    fn begin_sync(&self) -> Result<SyncGuard<'_>, SyncError> {
        self.in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| SyncError::Busy)?;
        Ok(SyncGuard {
            flag: &self.in_progress,
        })
    }

    /// Run one sync operation under the busy guard, folding every failure
    /// (including a panicking provider) into a `SyncResult`
    async fn run_exclusive<F>(&self, operation: &'static str, work: F) -> SyncResult
    where
        F: Future<Output = Result<SyncResult, SyncError>>,
    {
        if !self.config.enabled {
            return SyncResult::failed(SyncError::Disabled);
        }

        let _guard = match self.begin_sync() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::warn!(operation, "Rejected sync: {}", e);
                return SyncResult::failed(e);
            }
        };

        match AssertUnwindSafe(work).catch_unwind().await {
            Ok(Ok(result)) => {
                tracing::info!(
                    operation,
                    success = result.success,
                    conflicts = result.conflicts.len(),
                    resolved = result.resolved_changes,
                    "Sync finished"
                );
                result
            }
            Ok(Err(e)) => {
                tracing::warn!(operation, "Sync failed: {}", e);
                SyncResult::failed(e)
            }
            Err(_) => {
                tracing::error!(operation, "Sync aborted by a panicking provider");
                SyncResult::failed(format!("{} aborted: provider panicked", operation))
            }
        }
    }

    async fn try_push(
        &self,
        local: &SaveData,
        decisions: Option<&[DataConflict]>,
    ) -> Result<SyncResult, SyncError> {
        let provider = self.usable_provider().await?;

        let Some(remote) = provider.download().await? else {
            let receipt = provider.upload(local).await?;
            tracing::info!(provider = %provider.name(), id = %receipt.cloud_id, "No cloud save, uploaded local save");
            return Ok(SyncResult::succeeded(local.clone(), Vec::new(), 0));
        };

        let detected = self.detector.detect(local, &remote.data);
        if detected.is_empty() {
            let receipt = provider.upload(local).await?;
            tracing::info!(provider = %provider.name(), id = %receipt.cloud_id, "No conflicts, uploaded local save");
            return Ok(SyncResult::succeeded(local.clone(), Vec::new(), 0));
        }

        tracing::debug!(count = detected.len(), remote_id = %remote.id, "Detected conflicts");

        let conflicts = match decisions {
            Some(decisions) => apply_decisions(detected, decisions),
            None => self.resolver.resolve(detected),
        };

        let unresolved = conflicts.iter().filter(|c| !c.is_resolved()).count();
        if unresolved > 0 {
            return Ok(SyncResult::blocked(
                SyncError::ManualResolutionRequired(unresolved),
                conflicts,
            ));
        }

        let outcome = merge(local, &conflicts);
        let receipt = provider.upload(&outcome.save).await?;
        tracing::info!(
            provider = %provider.name(),
            id = %receipt.cloud_id,
            applied = outcome.applied,
            "Uploaded merged save"
        );

        Ok(SyncResult::succeeded(outcome.save, conflicts, outcome.applied))
    }

    async fn try_pull(&self) -> Result<SyncResult, SyncError> {
        let provider = self.usable_provider().await?;
        let remote = provider.download().await?.ok_or(SyncError::NoCloudSave)?;

        tracing::debug!(provider = %provider.name(), id = %remote.id, "Pulled cloud save");
        Ok(SyncResult::succeeded(remote.data, Vec::new(), 0))
    }
}
