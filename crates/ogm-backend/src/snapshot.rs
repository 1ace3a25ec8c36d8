use std::fs;
use std::io::Write;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{BackendError, BackendResult};

/// Snapshot file magic.
const MAGIC: &[u8; 4] = b"OGMS";

/// Current snapshot format version.
const VERSION: u32 = 1;

/// Header size: magic + version + length + CRC.
const HEADER_SIZE: usize = 16;

/// Write `value` to `path` as a framed snapshot.
///
/// On-disk format:
/// ```text
/// [4 bytes: magic "OGMS"]
/// [4 bytes: format version (little-endian u32)]
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode)]
/// ```
///
/// The file is written to a temporary sibling and renamed into place, so a
/// crash mid-write leaves the previous snapshot intact.
pub fn write_snapshot<T: Serialize>(path: &Path, value: &T) -> BackendResult<()> {
    let payload = bincode::serialize(value).map_err(|e| BackendError::Serialization(e.to_string()))?;
    let length = u32::try_from(payload.len())
        .map_err(|_| BackendError::Serialization("snapshot exceeds 4 GiB".into()))?;
    let crc = crc32fast::hash(&payload);

    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    tmp.write_all(MAGIC)?;
    tmp.write_all(&VERSION.to_le_bytes())?;
    tmp.write_all(&length.to_le_bytes())?;
    tmp.write_all(&crc.to_le_bytes())?;
    tmp.write_all(&payload)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| BackendError::Io(e.error))?;

    debug!(path = %path.display(), len = payload.len(), "snapshot written");
    Ok(())
}

/// Read a snapshot written by [`write_snapshot`]. Returns `None` if the file
/// does not exist.
pub fn read_snapshot<T: DeserializeOwned>(path: &Path) -> BackendResult<Option<T>> {
    let bytes = match fs::read(path) {
        Ok(b) => b,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let corrupt = |reason: &str| BackendError::CorruptSnapshot {
        path: path.display().to_string(),
        reason: reason.to_string(),
    };

    if bytes.len() < HEADER_SIZE || &bytes[..4] != MAGIC {
        return Err(corrupt("missing snapshot header"));
    }
    let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    let version = word(4);
    let length = word(8) as usize;
    let expected_crc = word(12);

    if version != VERSION {
        return Err(corrupt(&format!("unsupported version {version}")));
    }
    if bytes.len() != HEADER_SIZE + length {
        return Err(corrupt("length does not match file size"));
    }
    let payload = &bytes[HEADER_SIZE..];
    let actual_crc = crc32fast::hash(payload);
    if actual_crc != expected_crc {
        warn!(path = %path.display(), expected_crc, actual_crc, "snapshot CRC mismatch");
        return Err(corrupt("CRC mismatch"));
    }

    let value = bincode::deserialize(payload).map_err(|e| BackendError::Serialization(e.to_string()))?;
    Ok(Some(value))
}
