//! mail-offline - Offline operation journal and connectivity core
//!
//! Lets a mail client keep working while disconnected from its server:
//! mutating folder operations performed offline are durably recorded in a
//! journal, then replayed in order against the server once connectivity
//! returns, with client-local temporary uids remapped to server-assigned
//! permanent ones.
//!
//! ## Module Organization
//!
//! - `journal/`: write-ahead log of deferred operations, replay, uid remap
//! - `store/`: connectivity state machine (Online / Offline / Resyncing)
//! - `folder/`: per-status dispatch of folder operations, offline prefetch
//! - `backend/`: capability traits implemented by protocol backends
//! - `progress`: progress reporting and cooperative cancellation
//! - `config`: configuration management
//!
//! The core performs no network I/O itself; concrete protocol backends
//! (IMAP, NNTP, ...) supply per-status hooks through the `backend` traits.

pub mod backend;
pub mod config;
pub mod error;
pub mod folder;
pub mod journal;
pub mod progress;
pub mod store;

pub use backend::{
    CachedMessage, FolderBackend, FolderInfo, FolderLookup, Session, StoreBackend, UidMapping,
};
pub use error::OfflineError;
pub use folder::OfflineFolder;
pub use journal::{temporary_uid, Journal, JournalRecord, ReplaySummary, UidRemap};
pub use progress::{ProgressEvent, ProgressMonitor, ProgressSink};
pub use store::{OfflineStore, Status, StatusSnapshot};
