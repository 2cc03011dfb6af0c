//! Per-status folder operation dispatcher
//!
//! Every mutating folder operation is routed to the backend implementation
//! matching the owning store's status at the instant of the call. Status is
//! never cached between calls: a flip between two operations is observed by
//! the second one. While Offline, the dispatcher records intent in the
//! journal before invoking the offline variant.
//!
//! Also drives bulk message-body prefetch for offline use, both explicitly
//! (`prepare_for_offline`) and as a fire-and-forget background task when a
//! folder reports newly added messages.

use std::sync::{Arc, Weak};
use tracing::{debug, warn};

use crate::backend::FolderBackend;
use crate::config;
use crate::error::OfflineError;
use crate::journal::JournalRecord;
use crate::progress::ProgressSink;
use crate::store::{OfflineStore, Status};

/// Dispatcher wrapping one backend folder, owned by an [`OfflineStore`].
pub struct OfflineFolder {
    name: String,
    backend: Arc<dyn FolderBackend>,
    store: Weak<OfflineStore>,
    weak_self: Weak<OfflineFolder>,
}

impl OfflineFolder {
    pub(crate) fn new(
        name: &str,
        backend: Arc<dyn FolderBackend>,
        store: Weak<OfflineStore>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            name: name.to_string(),
            backend,
            store,
            weak_self: weak.clone(),
        })
    }

    /// Full folder name, as used in journal records.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The wrapped backend folder (used by replay, which bypasses status
    /// routing).
    pub fn backend(&self) -> Arc<dyn FolderBackend> {
        self.backend.clone()
    }

    fn store(&self) -> Result<Arc<OfflineStore>, OfflineError> {
        self.store
            .upgrade()
            .ok_or_else(|| OfflineError::Backend("owning store was dropped".to_string()))
    }

    /// Status resolved fresh for this call.
    fn current_status(&self) -> Result<Status, OfflineError> {
        Ok(self.store()?.status())
    }

    /// Record intent in the store's journal. Only called while Offline.
    async fn journal_log(&self, record: JournalRecord) -> Result<(), OfflineError> {
        if let Some(journal) = self.store()?.journal() {
            journal.lock().await.log(&record);
        }
        Ok(())
    }

    /// Refresh folder metadata. Deliberately a no-op unless Online; there is
    /// no offline or resyncing refresh.
    pub async fn refresh_info(&self) -> Result<(), OfflineError> {
        match self.current_status()? {
            Status::Online => self.backend.refresh_info_online().await,
            status => {
                debug!("refresh_info on {} skipped while {}", self.name, status);
                Ok(())
            }
        }
    }

    /// Synchronize folder contents, optionally expunging deleted messages.
    pub async fn sync(&self, expunge: bool) -> Result<(), OfflineError> {
        match self.current_status()? {
            Status::Online => self.backend.sync_online(expunge).await,
            Status::Offline => self.backend.sync_offline(expunge).await,
            Status::Resyncing => self.backend.sync_resyncing(expunge).await,
        }
    }

    /// Expunge all messages marked deleted (a sync with expunge forced on).
    pub async fn expunge(&self) -> Result<(), OfflineError> {
        self.sync(true).await
    }

    /// Expunge specific uids. Journalled while Offline.
    pub async fn expunge_uids(&self, uids: &[String]) -> Result<(), OfflineError> {
        match self.current_status()? {
            Status::Online => self.backend.expunge_uids_online(uids).await,
            Status::Offline => {
                self.journal_log(JournalRecord::Expunge {
                    folder: self.name.clone(),
                    uids: uids.to_vec(),
                })
                .await?;
                self.backend.expunge_uids_offline(uids).await
            }
            Status::Resyncing => self.backend.expunge_uids_resyncing(uids).await,
        }
    }

    /// Append a message under a client-assigned uid (a temporary uid while
    /// offline; see [`crate::journal::temporary_uid`]). Journalled while
    /// Offline.
    pub async fn append_message(&self, uid: &str, raw: &[u8]) -> Result<(), OfflineError> {
        match self.current_status()? {
            Status::Online => self.backend.append_online(uid, raw).await,
            Status::Offline => {
                self.journal_log(JournalRecord::Append {
                    folder: self.name.clone(),
                    uid: uid.to_string(),
                })
                .await?;
                self.backend.append_offline(uid, raw).await
            }
            Status::Resyncing => self.backend.append_resyncing(uid, raw).await,
        }
    }

    /// Move or copy uids to another folder. Journalled while Offline.
    pub async fn transfer_messages_to(
        &self,
        dest: &str,
        uids: &[String],
        delete_originals: bool,
    ) -> Result<(), OfflineError> {
        match self.current_status()? {
            Status::Online => {
                self.backend
                    .transfer_online(dest, uids, delete_originals)
                    .await
            }
            Status::Offline => {
                self.journal_log(JournalRecord::Transfer {
                    source: self.name.clone(),
                    dest: dest.to_string(),
                    uids: uids.to_vec(),
                    delete_originals,
                })
                .await?;
                self.backend
                    .transfer_offline(dest, uids, delete_originals)
                    .await
            }
            Status::Resyncing => {
                self.backend
                    .transfer_resyncing(dest, uids, delete_originals)
                    .await
            }
        }
    }

    /// Materialize one remote message body in the local cache.
    pub async fn cache_message(&self, uid: &str) -> Result<(), OfflineError> {
        self.backend.cache_message(uid).await
    }

    /// Whether this folder participates in offline sync, either by its own
    /// flag or the store-wide configuration option.
    pub fn offline_sync_enabled(&self) -> bool {
        self.backend.offline_sync_enabled() || config::offline_sync_all()
    }

    /// Cache message bodies for offline use: every uid matching
    /// `expression`, or the whole folder when no expression is given.
    /// Stops at the first per-uid failure. Progress is 0-100 over the uid
    /// list; cancellation is polled between uids.
    pub async fn prepare_for_offline(
        &self,
        expression: Option<&str>,
        progress: &ProgressSink,
    ) -> Result<(), OfflineError> {
        let uids = self.backend.list_uids(expression).await?;
        debug!("prefetching {} messages from {}", uids.len(), self.name);
        progress.report("prefetch", 0);

        let granularity = config::prefetch_progress_granularity();
        let mut last_reported = 0u8;
        let total = uids.len();
        for (done, uid) in uids.iter().enumerate() {
            if progress.is_cancelled() {
                return Err(OfflineError::Cancelled(format!(
                    "offline prefetch of {}",
                    self.name
                )));
            }
            self.backend.cache_message(uid).await?;
            let percent = (((done + 1) * 100) / total) as u8;
            if percent == 100 || percent >= last_reported.saturating_add(granularity) {
                progress.report("prefetch", percent);
                last_reported = percent;
            }
        }
        Ok(())
    }

    /// Background auto-prefetch: called when the folder signals added
    /// messages. If offline sync is enabled, queues one task that prefetches
    /// exactly `new_uids` (best-effort per uid), or runs a full
    /// `prepare_for_offline` when no precise change set is available. The
    /// task owns its own strong folder reference and uid snapshot; this call
    /// returns immediately.
    pub fn notify_messages_added(&self, new_uids: Option<Vec<String>>) {
        if !self.offline_sync_enabled() {
            return;
        }

        let folder = match self.weak_self.upgrade() {
            Some(folder) => folder,
            None => return,
        };
        tokio::spawn(async move {
            match new_uids {
                Some(uids) => {
                    debug!("auto-prefetch of {} new messages in {}", uids.len(), folder.name);
                    for uid in uids {
                        if let Err(e) = folder.backend.cache_message(&uid).await {
                            warn!("auto-prefetch of {} in {} failed: {}", uid, folder.name, e);
                        }
                    }
                }
                None => {
                    if let Err(e) = folder
                        .prepare_for_offline(None, &ProgressSink::disabled())
                        .await
                    {
                        warn!("auto-prefetch of {} failed: {}", folder.name, e);
                    }
                }
            }
        });
    }
}
