use std::io::{self, Read, Write};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use chrono::{DateTime, Utc};
use shared::types::Subscriber;

/// Identifies a subscriber file
pub const MAGIC_NUMBER: u32 = 201_705_019;
pub const FILE_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum FileError {
    #[error("unrecognized subscriber file type (magic {found}, expected {})", MAGIC_NUMBER)]
    BadMagic { found: u32 },

    #[error("unrecognized subscriber file version {found}, expected {}", FILE_VERSION)]
    BadVersion { found: u32 },

    #[error("subscriber file is truncated or malformed: {0}")]
    Truncated(String),

    #[error("subscriber file I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Serialize the whole set: magic, version, count, then each entry.
pub fn encode<W: Write>(mut w: W, subscribers: &[Subscriber]) -> Result<(), FileError> {
    w.write_u32::<BigEndian>(MAGIC_NUMBER)?;
    w.write_u32::<BigEndian>(FILE_VERSION)?;
    w.write_u32::<BigEndian>(subscribers.len() as u32)?;

    for sub in subscribers {
        let url = sub.callback_url.as_bytes();
        w.write_u32::<BigEndian>(url.len() as u32)?;
        w.write_all(url)?;
        w.write_i64::<BigEndian>(sub.expires_at.timestamp())?;
        w.write_u32::<BigEndian>(sub.expires_at.timestamp_subsec_nanos())?;
    }

    w.flush()?;
    Ok(())
}

pub fn decode<R: Read>(mut r: R) -> Result<Vec<Subscriber>, FileError> {
    let magic = r.read_u32::<BigEndian>().map_err(truncated)?;
    if magic != MAGIC_NUMBER {
        return Err(FileError::BadMagic { found: magic });
    }

    let version = r.read_u32::<BigEndian>().map_err(truncated)?;
    if version != FILE_VERSION {
        return Err(FileError::BadVersion { found: version });
    }

    let count = r.read_u32::<BigEndian>().map_err(truncated)?;
    let mut subscribers = Vec::new();

    for idx in 0..count {
        let len = r.read_u32::<BigEndian>().map_err(truncated)? as usize;
        let mut url = Vec::new();
        (&mut r).take(len as u64).read_to_end(&mut url)?;
        if url.len() != len {
            return Err(FileError::Truncated(format!("entry {} callback URL cut short", idx)));
        }
        let callback_url = String::from_utf8(url)
            .map_err(|e| FileError::Truncated(format!("entry {}: {}", idx, e)))?;

        let secs = r.read_i64::<BigEndian>().map_err(truncated)?;
        let nanos = r.read_u32::<BigEndian>().map_err(truncated)?;
        let expires_at = DateTime::<Utc>::from_timestamp(secs, nanos)
            .ok_or_else(|| FileError::Truncated(format!("entry {}: timestamp out of range", idx)))?;

        subscribers.push(Subscriber { callback_url, expires_at });
    }

    let mut rest = [0u8; 1];
    if r.read(&mut rest)? != 0 {
        return Err(FileError::Truncated("trailing data after last entry".to_string()));
    }

    Ok(subscribers)
}

fn truncated(e: io::Error) -> FileError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        FileError::Truncated(e.to_string())
    } else {
        FileError::Io(e)
    }
}
