//! Journal record binary codec
//!
//! On-disk layout (little-endian, no file header):
//!
//! ```text
//! u32 tag                     0=Terminator 1=Expunge 2=Append 3=Transfer
//! string  = u32 byte length followed by that many raw UTF-8 bytes
//! Expunge  : string folder; u32 count; count x string uid
//! Append   : string folder; string uid
//! Transfer : string source; string dest; u32 count; count x string uid;
//!            u32 delete_originals (0/1)
//! ```

use std::io::Read;

use crate::error::OfflineError;

const TAG_TERMINATOR: u32 = 0;
const TAG_EXPUNGE: u32 = 1;
const TAG_APPEND: u32 = 2;
const TAG_TRANSFER: u32 = 3;

/// Sanity cap on any single length field. A corrupt journal must surface a
/// decode error, not a multi-gigabyte allocation.
const MAX_FIELD_LEN: u32 = 16 * 1024 * 1024;

/// One deferred mutating operation, recorded while offline and replayed on
/// reconnect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JournalRecord {
    /// Explicit end-of-log marker; ends replay cleanly.
    Terminator,

    /// Expunge these uids from a folder.
    Expunge { folder: String, uids: Vec<String> },

    /// A message was appended locally under a temporary uid.
    Append { folder: String, uid: String },

    /// Move or copy uids between folders.
    Transfer {
        source: String,
        dest: String,
        uids: Vec<String>,
        delete_originals: bool,
    },
}

impl JournalRecord {
    /// Serialize this record onto `buf`.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Self::Terminator => put_u32(buf, TAG_TERMINATOR),
            Self::Expunge { folder, uids } => {
                put_u32(buf, TAG_EXPUNGE);
                put_string(buf, folder);
                put_u32(buf, uids.len() as u32);
                for uid in uids {
                    put_string(buf, uid);
                }
            }
            Self::Append { folder, uid } => {
                put_u32(buf, TAG_APPEND);
                put_string(buf, folder);
                put_string(buf, uid);
            }
            Self::Transfer {
                source,
                dest,
                uids,
                delete_originals,
            } => {
                put_u32(buf, TAG_TRANSFER);
                put_string(buf, source);
                put_string(buf, dest);
                put_u32(buf, uids.len() as u32);
                for uid in uids {
                    put_string(buf, uid);
                }
                put_u32(buf, *delete_originals as u32);
            }
        }
    }

    /// Decode the next record from `reader`.
    ///
    /// Returns `Ok(None)` on clean end-of-stream at a record boundary. A
    /// truncated record, unknown tag, oversized length field, or invalid
    /// UTF-8 is a [`OfflineError::Decode`].
    pub fn decode(reader: &mut impl Read) -> Result<Option<JournalRecord>, OfflineError> {
        let tag = match try_read_u32(reader)? {
            Some(tag) => tag,
            None => return Ok(None),
        };

        match tag {
            TAG_TERMINATOR => Ok(Some(Self::Terminator)),
            TAG_EXPUNGE => {
                let folder = read_string(reader)?;
                let uids = read_uid_list(reader)?;
                Ok(Some(Self::Expunge { folder, uids }))
            }
            TAG_APPEND => {
                let folder = read_string(reader)?;
                let uid = read_string(reader)?;
                Ok(Some(Self::Append { folder, uid }))
            }
            TAG_TRANSFER => {
                let source = read_string(reader)?;
                let dest = read_string(reader)?;
                let uids = read_uid_list(reader)?;
                let delete_originals = read_u32(reader)? != 0;
                Ok(Some(Self::Transfer {
                    source,
                    dest,
                    uids,
                    delete_originals,
                }))
            }
            other => Err(OfflineError::Decode(format!(
                "unknown journal record tag {}",
                other
            ))),
        }
    }

    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Terminator => "terminator",
            Self::Expunge { .. } => "expunge",
            Self::Append { .. } => "append",
            Self::Transfer { .. } => "transfer",
        }
    }
}

fn put_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

fn put_string(buf: &mut Vec<u8>, value: &str) {
    put_u32(buf, value.len() as u32);
    buf.extend_from_slice(value.as_bytes());
}

/// Read a u32, distinguishing clean EOF (no bytes at all) from a torn field.
fn try_read_u32(reader: &mut impl Read) -> Result<Option<u32>, OfflineError> {
    let mut bytes = [0u8; 4];
    let mut filled = 0;
    while filled < 4 {
        let n = reader
            .read(&mut bytes[filled..])
            .map_err(|e| OfflineError::Decode(format!("journal read failed: {}", e)))?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(OfflineError::Decode(
                "journal truncated mid-field".to_string(),
            ));
        }
        filled += n;
    }
    Ok(Some(u32::from_le_bytes(bytes)))
}

fn read_u32(reader: &mut impl Read) -> Result<u32, OfflineError> {
    try_read_u32(reader)?.ok_or_else(|| OfflineError::Decode("journal truncated".to_string()))
}

fn read_string(reader: &mut impl Read) -> Result<String, OfflineError> {
    let len = read_u32(reader)?;
    if len > MAX_FIELD_LEN {
        return Err(OfflineError::Decode(format!(
            "journal string length {} exceeds cap",
            len
        )));
    }
    let mut bytes = vec![0u8; len as usize];
    reader
        .read_exact(&mut bytes)
        .map_err(|e| OfflineError::Decode(format!("journal truncated in string: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| OfflineError::Decode(format!("journal string not UTF-8: {}", e)))
}

fn read_uid_list(reader: &mut impl Read) -> Result<Vec<String>, OfflineError> {
    let count = read_u32(reader)?;
    if count > MAX_FIELD_LEN {
        return Err(OfflineError::Decode(format!(
            "journal uid count {} exceeds cap",
            count
        )));
    }
    let mut uids = Vec::with_capacity(count as usize);
    for _ in 0..count {
        uids.push(read_string(reader)?);
    }
    Ok(uids)
}
