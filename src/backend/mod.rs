//! Backend capability traits
//!
//! The offline core performs no network I/O of its own. Concrete protocol
//! backends (IMAP, NNTP, ...) plug in through these traits, supplying one
//! implementation per connectivity state for each mutating operation plus a
//! handful of capability-level hooks used directly by journal replay.
//!
//! Per-status variants have default bodies that log a loud integration error
//! and succeed: a backend that forgot to implement a variant is a backend
//! bug, not a caller-visible failure.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::error;

use crate::error::OfflineError;
use crate::store::Status;

/// A message materialized from the local cache, with the metadata needed to
/// re-append it to the server during replay.
#[derive(Debug, Clone)]
pub struct CachedMessage {
    /// Client-local temporary uid the message was stored under
    pub uid: String,
    /// IMAP-style flag strings ("\\Seen", ...)
    pub flags: Vec<String>,
    /// Server-side internal date to preserve on append
    pub internal_date: Option<DateTime<Utc>>,
    /// Full raw message bytes
    pub raw: Vec<u8>,
}

/// A temporary-to-permanent uid assignment reported by the backend after a
/// replayed transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UidMapping {
    pub old: String,
    pub new: String,
}

/// Folder metadata as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct FolderInfo {
    pub name: String,
    pub total_messages: u32,
    pub unseen_messages: u32,
}

/// The hosting session: network observability and the user-warning sink.
pub trait Session: Send + Sync {
    /// Whether the session currently has network connectivity. Consulted at
    /// store construction to derive the initial status, and by the
    /// self-healing `status()` read.
    fn network_available(&self) -> bool;

    /// Whether the underlying service is mid-connect. Consulted by the
    /// self-healing `status()` read.
    fn is_connecting(&self) -> bool;

    /// Surface a warning to the user (broken journal, skipped records).
    fn notify_user(&self, message: &str);
}

/// Store-level capabilities consumed from a backend.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// The underlying network connect, independent of the offline layer.
    async fn open_connection(&self) -> Result<(), OfflineError>;

    /// Cancel an in-flight `open_connection`.
    fn cancel_connection(&self);

    /// Post-connect hook while Online or Resyncing.
    async fn connect_online(&self) -> Result<(), OfflineError>;

    /// Post-connect hook while Offline (degraded mode).
    async fn connect_offline(&self) -> Result<(), OfflineError>;

    /// Pre-teardown hook while Online or Resyncing.
    async fn disconnect_online(&self, clean: bool) -> Result<(), OfflineError>;

    /// Pre-teardown hook while Offline.
    async fn disconnect_offline(&self, clean: bool) -> Result<(), OfflineError>;

    /// Flush store-level state to disk.
    async fn synchronize(&self) -> Result<(), OfflineError>;

    /// Resolve a folder by full name. Shared implementation behind the
    /// per-status variants; backends that resolve the same way in every
    /// state implement only this.
    async fn folder(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError>;

    async fn folder_online(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        self.folder(name).await
    }

    /// Offline resolution may differ (local cache only, no server probe).
    async fn folder_offline(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        self.folder(name).await
    }

    async fn folder_resyncing(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError> {
        self.folder(name).await
    }

    /// Folder metadata by full name. Shared implementation behind the
    /// per-status variants.
    async fn folder_info(&self, name: &str) -> Result<FolderInfo, OfflineError>;

    async fn folder_info_online(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        self.folder_info(name).await
    }

    async fn folder_info_offline(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        self.folder_info(name).await
    }

    async fn folder_info_resyncing(&self, name: &str) -> Result<FolderInfo, OfflineError> {
        self.folder_info(name).await
    }

    /// False if the backend keeps no local cache.
    fn can_work_offline(&self) -> bool;
}

/// Folder-level capabilities consumed from a backend.
///
/// The `*_online`/`*_offline`/`*_resyncing` triples are the per-status
/// dispatch variants selected by [`crate::folder::OfflineFolder`]. The
/// remaining methods are capability-level hooks invoked directly by journal
/// replay and prefetch, bypassing status routing.
#[async_trait]
pub trait FolderBackend: Send + Sync {
    async fn sync_online(&self, expunge: bool) -> Result<(), OfflineError> {
        let _ = expunge;
        unimplemented_variant("sync", Status::Online);
        Ok(())
    }

    async fn sync_offline(&self, expunge: bool) -> Result<(), OfflineError> {
        let _ = expunge;
        unimplemented_variant("sync", Status::Offline);
        Ok(())
    }

    async fn sync_resyncing(&self, expunge: bool) -> Result<(), OfflineError> {
        let _ = expunge;
        unimplemented_variant("sync", Status::Resyncing);
        Ok(())
    }

    async fn expunge_uids_online(&self, uids: &[String]) -> Result<(), OfflineError> {
        let _ = uids;
        unimplemented_variant("expunge_uids", Status::Online);
        Ok(())
    }

    async fn expunge_uids_offline(&self, uids: &[String]) -> Result<(), OfflineError> {
        let _ = uids;
        unimplemented_variant("expunge_uids", Status::Offline);
        Ok(())
    }

    async fn expunge_uids_resyncing(&self, uids: &[String]) -> Result<(), OfflineError> {
        let _ = uids;
        unimplemented_variant("expunge_uids", Status::Resyncing);
        Ok(())
    }

    async fn append_online(&self, uid: &str, raw: &[u8]) -> Result<(), OfflineError> {
        let _ = (uid, raw);
        unimplemented_variant("append", Status::Online);
        Ok(())
    }

    async fn append_offline(&self, uid: &str, raw: &[u8]) -> Result<(), OfflineError> {
        let _ = (uid, raw);
        unimplemented_variant("append", Status::Offline);
        Ok(())
    }

    async fn append_resyncing(&self, uid: &str, raw: &[u8]) -> Result<(), OfflineError> {
        let _ = (uid, raw);
        unimplemented_variant("append", Status::Resyncing);
        Ok(())
    }

    async fn transfer_online(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<(), OfflineError> {
        let _ = (dest, uids, delete_originals);
        unimplemented_variant("transfer", Status::Online);
        Ok(())
    }

    async fn transfer_offline(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<(), OfflineError> {
        let _ = (dest, uids, delete_originals);
        unimplemented_variant("transfer", Status::Offline);
        Ok(())
    }

    async fn transfer_resyncing(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<(), OfflineError> {
        let _ = (dest, uids, delete_originals);
        unimplemented_variant("transfer", Status::Resyncing);
        Ok(())
    }

    /// Online-only refresh of folder metadata. There is deliberately no
    /// offline or resyncing variant.
    async fn refresh_info_online(&self) -> Result<(), OfflineError> {
        unimplemented_variant("refresh_info", Status::Online);
        Ok(())
    }

    /// Replay hook: expunge these uids on the server.
    async fn expunge_uids(&self, uids: &[String]) -> Result<(), OfflineError>;

    /// Replay hook: fetch the locally cached message for a temporary uid.
    /// `Ok(None)` means the message no longer exists locally (appended, then
    /// deleted, while offline) and the record should be skipped silently.
    async fn cached_message(&self, uid: &str) -> Result<Option<CachedMessage>, OfflineError>;

    /// Replay hook: append a cached message to the server. Returns the
    /// server-assigned permanent uid when the backend reports one.
    async fn append_raw(&self, message: CachedMessage) -> Result<Option<String>, OfflineError>;

    /// Replay hook: move/copy uids to another folder. Returns a remap pair
    /// for every uid granted a new permanent identifier.
    async fn transfer_uids(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<Vec<UidMapping>, OfflineError>;

    /// Materialize one remote message body in the local cache.
    async fn cache_message(&self, uid: &str) -> Result<(), OfflineError>;

    /// Enumerate uids in this folder, optionally restricted by a backend
    /// search expression. `None` means all uids.
    async fn list_uids(&self, expression: Option<&str>) -> Result<Vec<String>, OfflineError>;

    /// Flush folder-level state (called when replay releases its handles).
    async fn synchronize(&self) -> Result<(), OfflineError>;

    /// Whether this folder opted into offline sync.
    fn offline_sync_enabled(&self) -> bool {
        false
    }
}

/// Folder-name resolution used by journal replay. Implemented by
/// [`crate::store::OfflineStore`].
#[async_trait]
pub trait FolderLookup: Send + Sync {
    async fn lookup(&self, name: &str) -> Result<Arc<dyn FolderBackend>, OfflineError>;
}

fn unimplemented_variant(operation: &str, status: Status) {
    error!(
        "backend integration error: no {} implementation for status {:?}",
        operation, status
    );
}
