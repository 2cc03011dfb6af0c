use serde::Serialize;

/// Error taxonomy for the offline core.
///
/// `Io` and `Decode` originate in the journal file; `FolderUnavailable` is
/// only produced (and absorbed) during replay; `ServiceUnavailable` is the
/// "you must be online for this" check failure; `Backend` wraps whatever the
/// protocol backend surfaced, unchanged.
#[derive(Debug, thiserror::Error)]
pub enum OfflineError {
    #[error("Journal I/O error: {0}")]
    Io(String),

    #[error("Journal decode error: {0}")]
    Decode(String),

    #[error("Folder unavailable: {0}")]
    FolderUnavailable(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),
}

// Serialize as a plain string so frontends can display errors directly.
impl Serialize for OfflineError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<std::io::Error> for OfflineError {
    fn from(e: std::io::Error) -> Self {
        OfflineError::Io(e.to_string())
    }
}
