//! Connectivity state machine
//!
//! An [`OfflineStore`] wraps a protocol backend and tracks whether the mail
//! store is Online, Offline, or Resyncing. It orchestrates connect and
//! disconnect, drives journal replay on reconnect, and owns the registry of
//! open folders used both for folder lookup and for the offline-sync
//! prefetch sweep on Online -> Offline transitions.
//!
//! Scheduling: the store is driven from whatever task the surrounding
//! application uses for folder operations and is not reentrant-safe against
//! concurrent invocation from multiple tasks; callers serialize externally.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::{Arc, PoisonError, RwLock, Weak};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use crate::backend::{FolderBackend, FolderInfo, FolderLookup, Session, StoreBackend};
use crate::error::OfflineError;
use crate::folder::OfflineFolder;
use crate::journal::Journal;
use crate::progress::ProgressSink;

/// Connectivity status of a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Online,
    Offline,
    /// Transient state while the offline journal is being replayed.
    Resyncing,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Online => write!(f, "online"),
            Status::Offline => write!(f, "offline"),
            Status::Resyncing => write!(f, "resyncing"),
        }
    }
}

/// Serde-able point-in-time view of a store, for status surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub status: Status,
    /// Whether any offline operations are waiting to be replayed
    pub pending_replay: bool,
    pub taken_at: DateTime<Utc>,
}

/// Tri-state connectivity orchestrator wrapping a [`StoreBackend`].
pub struct OfflineStore {
    backend: Arc<dyn StoreBackend>,
    session: Arc<dyn Session>,
    status: RwLock<Status>,
    /// Present iff the backend can work offline
    journal: Option<Arc<AsyncMutex<Journal>>>,
    folders: RwLock<HashMap<String, Arc<OfflineFolder>>>,
    weak_self: Weak<OfflineStore>,
}

impl OfflineStore {
    /// Create a store. The journal is opened at `journal_path` only when the
    /// backend supports offline operation; initial status is derived from
    /// session network availability.
    pub fn new(
        backend: Arc<dyn StoreBackend>,
        session: Arc<dyn Session>,
        journal_path: impl AsRef<Path>,
    ) -> Result<Arc<Self>, OfflineError> {
        let journal = if backend.can_work_offline() {
            Some(Arc::new(AsyncMutex::new(Journal::open(
                journal_path,
                session.clone(),
            )?)))
        } else {
            None
        };

        let initial = if session.network_available() {
            Status::Online
        } else {
            Status::Offline
        };
        debug!("store created with initial status {}", initial);

        Ok(Arc::new_cyclic(|weak| Self {
            backend,
            session,
            status: RwLock::new(initial),
            journal,
            folders: RwLock::new(HashMap::new()),
            weak_self: weak.clone(),
        }))
    }

    fn cached_status(&self) -> Status {
        *self.status.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn store_status(&self, status: Status) {
        *self.status.write().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Current status, with a self-healing read: a store cached as Online
    /// while the service is still connecting and the session has no network
    /// is corrected to Offline. A pure read-path correction, not a
    /// transition; no backend hook runs.
    pub fn status(&self) -> Status {
        let cached = self.cached_status();
        if cached == Status::Online
            && self.session.is_connecting()
            && !self.session.network_available()
        {
            self.store_status(Status::Offline);
            return Status::Offline;
        }
        cached
    }

    /// Whether the backend keeps enough local state to operate offline.
    pub fn can_work_offline(&self) -> bool {
        self.backend.can_work_offline()
    }

    /// Fails unless status is exactly Online.
    pub fn check_online(&self) -> Result<(), OfflineError> {
        match self.status() {
            Status::Online => Ok(()),
            other => Err(OfflineError::ServiceUnavailable(format!(
                "operation requires an online store, status is {}",
                other
            ))),
        }
    }

    /// The journal, when this store persists offline operations.
    pub fn journal(&self) -> Option<Arc<AsyncMutex<Journal>>> {
        self.journal.clone()
    }

    /// Serde-able snapshot for status surfaces.
    pub async fn status_snapshot(&self) -> StatusSnapshot {
        let pending_replay = match &self.journal {
            Some(journal) => !journal.lock().await.is_empty(),
            None => false,
        };
        StatusSnapshot {
            status: self.status(),
            pending_replay,
            taken_at: Utc::now(),
        }
    }

    /// Folder resolution via the backend variant matching the current
    /// status (offline resolution may hit the local cache only).
    async fn resolve_backend(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        match self.status() {
            Status::Online => self.backend.folder_online(name).await,
            Status::Offline => self.backend.folder_offline(name).await,
            Status::Resyncing => self.backend.folder_resyncing(name).await,
        }
    }

    /// Resolve a folder by full name, wrapping it in a dispatcher and
    /// caching it in the open-folder registry.
    pub async fn folder(&self, name: &str) -> Result<Arc<OfflineFolder>, OfflineError> {
        {
            let folders = self.folders.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(folder) = folders.get(name) {
                return Ok(folder.clone());
            }
        }

        let backend = self.resolve_backend(name).await?;
        let folder = OfflineFolder::new(name, backend, self.weak_self.clone());

        let mut folders = self.folders.write().unwrap_or_else(PoisonError::into_inner);
        Ok(folders.entry(name.to_string()).or_insert(folder).clone())
    }

    /// Folder metadata via the backend variant matching the current status.
    pub async fn folder_info(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        match self.status() {
            Status::Online => self.backend.folder_info_online(name).await,
            Status::Offline => self.backend.folder_info_offline(name).await,
            Status::Resyncing => self.backend.folder_info_resyncing(name).await,
        }
    }

    /// Folders currently in the open registry.
    pub fn open_folders(&self) -> Vec<Arc<OfflineFolder>> {
        self.folders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Connect the store, replaying the offline journal first if it has
    /// pending records. See [`Self::connect_with_progress`].
    pub async fn connect(&self) -> Result<(), OfflineError> {
        self.connect_with_progress(&ProgressSink::disabled()).await
    }

    /// Connect the store. While not Offline, the underlying network connect
    /// is attempted first; a failure there is cleared if the store has
    /// meanwhile healed to Offline (degraded mode). With a non-empty journal
    /// the store flips to Resyncing, replays, flips back to Online, and then
    /// runs one full disconnect-reconnect cycle so backend post-resync
    /// bookkeeping (folder re-subscription and the like) stays consistent.
    pub async fn connect_with_progress(&self, progress: &ProgressSink) -> Result<(), OfflineError> {
        if self.status() != Status::Offline {
            if let Err(e) = self.backend.open_connection().await {
                if self.status() == Status::Offline {
                    debug!("network connect failed but store is offline, continuing: {}", e);
                } else {
                    return Err(e);
                }
            }
        }

        match self.status() {
            Status::Online | Status::Resyncing => {
                self.backend.connect_online().await?;

                let journal = match &self.journal {
                    // Extra strong reference so a reentrant disconnect from a
                    // backend callback cannot free the journal mid-replay.
                    Some(journal) => journal.clone(),
                    None => return Ok(()),
                };

                if journal.lock().await.is_empty() {
                    return Ok(());
                }

                info!("pending offline operations found, resyncing");
                self.store_status(Status::Resyncing);
                let replayed = {
                    let mut guard = journal.lock().await;
                    guard.replay(self, progress).await
                };
                drop(journal);
                self.store_status(Status::Online);
                replayed?;

                self.disconnect(true).await?;
                Box::pin(self.connect_with_progress(progress)).await
            }
            Status::Offline => self.backend.connect_offline().await,
        }
    }

    /// Disconnect using the hook matching the current status, then run
    /// generic teardown (the open-folder registry is released). A hook
    /// failure aborts before teardown.
    pub async fn disconnect(&self, clean: bool) -> Result<(), OfflineError> {
        match self.status() {
            Status::Online | Status::Resyncing => self.backend.disconnect_online(clean).await?,
            Status::Offline => self.backend.disconnect_offline(clean).await?,
        }

        self.folders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        Ok(())
    }

    /// Abort an in-flight connect. Status falls back to Offline first so a
    /// half-connected store cannot be observed as Online.
    pub fn cancel_connect(&self) {
        self.store_status(Status::Offline);
        self.backend.cancel_connection();
    }

    /// Transition to `new_status`. A no-op (zero backend calls) when the
    /// status is unchanged. Going Online -> Offline, every open folder that
    /// opted into offline sync first gets a best-effort full prefetch; then
    /// the store is synchronized, cleanly disconnected (failure aborts the
    /// whole change), the status field updated, and the store reconnected
    /// under the new status.
    pub async fn set_status(
        &self,
        new_status: Status,
        progress: &ProgressSink,
    ) -> Result<(), OfflineError> {
        let current = self.status();
        if new_status == current {
            return Ok(());
        }
        info!("store status change {} -> {}", current, new_status);

        if current == Status::Online && new_status == Status::Offline {
            let sweep: Vec<Arc<OfflineFolder>> = self
                .open_folders()
                .into_iter()
                .filter(|folder| folder.offline_sync_enabled())
                .collect();
            for folder in sweep {
                if let Err(e) = folder.prepare_for_offline(None, progress).await {
                    warn!(
                        "offline prefetch of {} failed, continuing status change: {}",
                        folder.name(),
                        e
                    );
                }
            }
        }

        self.backend.synchronize().await?;
        self.disconnect(true).await?;
        self.store_status(new_status);
        self.connect_with_progress(progress).await
    }
}

#[async_trait]
impl FolderLookup for OfflineStore {
    /// Replay-time folder resolution. A failure here is mapped to
    /// `FolderUnavailable` so replay can skip the record and continue.
    async fn lookup(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        {
            let folders = self.folders.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(folder) = folders.get(name) {
                return Ok(folder.backend());
            }
        }
        self.resolve_backend(name)
            .await
            .map_err(|e| OfflineError::FolderUnavailable(format!("{}: {}", name, e)))
    }
}
