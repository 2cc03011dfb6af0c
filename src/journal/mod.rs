//! Offline operation journal
//!
//! A write-ahead log of mutating folder operations performed while not fully
//! online. Records are appended strictly in call order and replayed in that
//! same order against live backend folders once connectivity returns.
//!
//! Failure model:
//! - A write failure disables the journal for the rest of the session: the
//!   handle is dropped, the user is warned once, and later `log` calls are
//!   no-ops. It is never retried automatically.
//! - During replay, a missing target folder is tolerated per record (warn,
//!   skip); a decode error or backend error stops the remaining replay.
//! - The journal file is truncated to zero length after every replay
//!   attempt, success or failure.

mod record;
mod remap;

pub use record::JournalRecord;
pub use remap::{temporary_uid, UidRemap};

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{FolderBackend, FolderLookup, Session};
use crate::error::OfflineError;
use crate::progress::ProgressSink;

/// Outcome of a completed replay.
#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    /// Records whose mutation was dispatched to the backend
    pub replayed: u32,
    /// Records skipped (unresolvable folder, locally deleted message)
    pub skipped: u32,
    pub finished_at: DateTime<Utc>,
}

/// Durable log of deferred mutating operations, plus the temporary-to-
/// permanent uid remap table populated by replay.
pub struct Journal {
    path: PathBuf,
    /// None once the journal is broken for the session
    file: Option<File>,
    broken: bool,
    remap: UidRemap,
    session: Arc<dyn Session>,
}

impl Journal {
    /// Open (creating if absent) the backing file in append+read mode.
    ///
    /// Seeks to end-of-file explicitly; append semantics alone are not
    /// reliable on every platform.
    pub fn open(path: impl AsRef<Path>, session: Arc<dyn Session>) -> Result<Self, OfflineError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| OfflineError::Io(format!("journal dir {:?}: {}", parent, e)))?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| OfflineError::Io(format!("journal open {:?}: {}", path, e)))?;
        file.seek(SeekFrom::End(0))
            .map_err(|e| OfflineError::Io(format!("journal seek {:?}: {}", path, e)))?;

        debug!("opened journal at {:?}", path);

        Ok(Self {
            path,
            file: Some(file),
            broken: false,
            remap: UidRemap::new(),
            session,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether a write failure has disabled this journal for the session.
    pub fn is_broken(&self) -> bool {
        self.broken
    }

    /// True iff the backing file is empty (a broken journal reports empty).
    pub fn is_empty(&self) -> bool {
        match &self.file {
            Some(file) => file.metadata().map(|m| m.len() == 0).unwrap_or(true),
            None => true,
        }
    }

    /// Append one record.
    ///
    /// Fire-and-forget from the operation's point of view: a write failure
    /// is not surfaced to the caller, but it permanently disables the
    /// journal for this session and warns the user once.
    pub fn log(&mut self, record: &JournalRecord) {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => return,
        };

        let mut buf = Vec::new();
        record.encode(&mut buf);

        if let Err(e) = file.write_all(&buf).and_then(|_| file.flush()) {
            warn!("journal write failed, disabling offline journal: {}", e);
            self.session.notify_user(
                "Recording of offline operations failed; further offline changes \
                 will not be replayed when you reconnect.",
            );
            self.file = None;
            self.broken = true;
            return;
        }

        debug!("journalled {} record ({} bytes)", record.kind(), buf.len());
    }

    /// Record a temporary-to-permanent uid assignment.
    pub fn uid_remap_add(&mut self, old: impl Into<String>, new: impl Into<String>) {
        self.remap.add(old, new);
    }

    /// Translate a temporary uid replayed earlier in this session.
    pub fn uid_remap_lookup(&self, old: &str) -> Option<&str> {
        self.remap.lookup(old)
    }

    pub fn remap(&self) -> &UidRemap {
        &self.remap
    }

    /// Replay every journalled record, in log order, against live folders
    /// resolved through `lookup`.
    ///
    /// Progress is reported 0-100 proportional to bytes consumed and
    /// cancellation is polled between records. Whatever way the loop exits,
    /// all folder handles resolved during replay are synchronized and
    /// released and the journal file is truncated to zero length.
    pub async fn replay(
        &mut self,
        lookup: &dyn FolderLookup,
        progress: &ProgressSink,
    ) -> Result<ReplaySummary, OfflineError> {
        let file = match self.file.as_mut() {
            Some(file) => file,
            None => {
                return Err(OfflineError::Io(
                    "journal is disabled for this session".to_string(),
                ))
            }
        };

        let total = file
            .seek(SeekFrom::End(0))
            .map_err(|e| OfflineError::Io(format!("journal size: {}", e)))?;
        file.seek(SeekFrom::Start(0))
            .map_err(|e| OfflineError::Io(format!("journal rewind: {}", e)))?;

        info!("replaying offline journal ({} bytes)", total);
        progress.report("replay", 0);

        let mut folders: HashMap<String, Arc<dyn FolderBackend>> = HashMap::new();
        let mut fatal: Option<OfflineError> = None;
        let mut replayed: u32 = 0;
        let mut skipped: u32 = 0;

        loop {
            if fatal.is_some() {
                break;
            }
            if progress.is_cancelled() {
                info!("journal replay cancelled");
                break;
            }

            let record = match JournalRecord::decode(&mut *file) {
                Ok(Some(record)) => record,
                Ok(None) => break,
                Err(e) => {
                    // Whole-replay abort: already-processed records have
                    // taken effect, the rest of the log is unreadable.
                    fatal = Some(e);
                    break;
                }
            };

            if total > 0 {
                let consumed = file.stream_position().unwrap_or(total);
                progress.report("replay", ((consumed * 100) / total) as u8);
            }

            match record {
                JournalRecord::Terminator => break,

                JournalRecord::Expunge { folder, uids } => {
                    let handle = match resolve(&mut folders, lookup, &folder).await {
                        Some(handle) => handle,
                        None => {
                            skipped += 1;
                            continue;
                        }
                    };
                    match handle.expunge_uids(&uids).await {
                        Ok(()) => replayed += 1,
                        Err(e) => fatal = Some(e),
                    }
                }

                JournalRecord::Append { folder, uid } => {
                    let handle = match resolve(&mut folders, lookup, &folder).await {
                        Some(handle) => handle,
                        None => {
                            skipped += 1;
                            continue;
                        }
                    };
                    match handle.cached_message(&uid).await {
                        Ok(Some(message)) => match handle.append_raw(message).await {
                            Ok(Some(new_uid)) => {
                                self.remap.add(uid, new_uid);
                                replayed += 1;
                            }
                            Ok(None) => replayed += 1,
                            Err(e) => fatal = Some(e),
                        },
                        // Appended, then deleted, while offline. An expected
                        // race, not a failure.
                        Ok(None) => {
                            debug!("message {} gone from local cache, skipping append", uid);
                            skipped += 1;
                        }
                        Err(e) => fatal = Some(e),
                    }
                }

                JournalRecord::Transfer {
                    source,
                    dest,
                    uids,
                    delete_originals,
                } => {
                    let handle = match resolve(&mut folders, lookup, &source).await {
                        Some(handle) => handle,
                        None => {
                            skipped += 1;
                            continue;
                        }
                    };
                    match handle.transfer_uids(&dest, &uids, delete_originals).await {
                        Ok(mappings) => {
                            for mapping in mappings {
                                self.remap.add(mapping.old, mapping.new);
                            }
                            replayed += 1;
                        }
                        Err(e) => fatal = Some(e),
                    }
                }
            }
        }

        // Exit path shared by every outcome: flush and release the folder
        // handles resolved during replay, then truncate the log.
        for (name, handle) in folders.drain() {
            if let Err(e) = handle.synchronize().await {
                warn!("post-replay synchronize of {} failed: {}", name, e);
            }
        }
        self.truncate();
        progress.report("replay", 100);

        match fatal {
            Some(e) => {
                warn!("journal replay stopped: {}", e);
                Err(e)
            }
            None => {
                info!(
                    "journal replay finished: {} replayed, {} skipped",
                    replayed, skipped
                );
                Ok(ReplaySummary {
                    replayed,
                    skipped,
                    finished_at: Utc::now(),
                })
            }
        }
    }

    /// Truncate the backing file to zero length.
    fn truncate(&mut self) {
        if let Some(file) = self.file.as_mut() {
            let result = file
                .set_len(0)
                .and_then(|_| file.seek(SeekFrom::End(0)).map(|_| ()));
            if let Err(e) = result {
                warn!("journal truncation failed, disabling journal: {}", e);
                self.file = None;
                self.broken = true;
            }
        }
    }
}

/// Resolve a folder name through the store's lookup capability, caching the
/// handle for the duration of replay. Resolution failure is per-record
/// tolerant: warn and return None so the caller skips that record.
async fn resolve(
    cache: &mut HashMap<String, Arc<dyn FolderBackend>>,
    lookup: &dyn FolderLookup,
    name: &str,
) -> Option<Arc<dyn FolderBackend>> {
    if let Some(handle) = cache.get(name) {
        return Some(handle.clone());
    }
    match lookup.lookup(name).await {
        Ok(handle) => {
            cache.insert(name.to_string(), handle.clone());
            Some(handle)
        }
        Err(e) => {
            warn!("folder {} unavailable during replay, skipping record: {}", name, e);
            None
        }
    }
}
