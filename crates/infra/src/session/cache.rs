//! Encrypted on-disk snapshot of partition sessions.
//!
//! File layout: a 4-byte big-endian length followed by that many bytes of
//! base64 text. Decoded, the text is `IV (16 bytes) || AES-256-CTR
//! ciphertext` of `{"sessions": {"<partition>": {"<header>": "<value>"}}}`.
//! The key is the SHA-256 digest of the passphrase.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};
use twinline_common::EncryptionService;
use twinline_domain::CacheError;

use crate::errors::{cache_crypto_error, cache_io_error};

const LENGTH_PREFIX: usize = 4;

/// Header snapshots keyed by partition id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedSessions {
    pub sessions: BTreeMap<String, HashMap<String, String>>,
}

impl CachedSessions {
    /// Whether no partition session is cached.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

/// Serialize, encrypt and frame `sessions`.
pub fn encode(sessions: &CachedSessions, passphrase: &str) -> Result<Vec<u8>, CacheError> {
    let json = serde_json::to_vec(sessions).map_err(|err| CacheError::Encode(err.to_string()))?;
    let encoded = EncryptionService::from_passphrase(passphrase).encrypt_to_string(&json);

    let length = u32::try_from(encoded.len())
        .map_err(|_| CacheError::Encode(format!("payload of {} bytes is too large", encoded.len())))?;
    let mut frame = Vec::with_capacity(LENGTH_PREFIX + encoded.len());
    frame.extend_from_slice(&length.to_be_bytes());
    frame.extend_from_slice(encoded.as_bytes());
    Ok(frame)
}

/// Unframe, decrypt and parse a cache file's contents.
///
/// A wrong passphrase decrypts to garbage, which fails JSON parsing and is
/// reported as [`CacheError::Decode`].
pub fn decode(frame: &[u8], passphrase: &str) -> Result<CachedSessions, CacheError> {
    let Some((prefix, rest)) = frame.split_first_chunk::<LENGTH_PREFIX>() else {
        return Err(CacheError::Truncated { expected: LENGTH_PREFIX, actual: frame.len() });
    };
    let length = u32::from_be_bytes(*prefix) as usize;
    if rest.len() < length {
        return Err(CacheError::Truncated {
            expected: LENGTH_PREFIX + length,
            actual: frame.len(),
        });
    }

    let encoded = std::str::from_utf8(&rest[..length])
        .map_err(|err| CacheError::Decode(format!("payload is not base64 text: {err}")))?;
    let plaintext = EncryptionService::from_passphrase(passphrase)
        .decrypt_from_string(encoded)
        .map_err(cache_crypto_error)?;

    serde_json::from_slice(&plaintext).map_err(|err| {
        CacheError::Decode(format!("wrong passphrase or corrupted session document: {err}"))
    })
}

/// Write `sessions` to `path`, replacing any previous file.
pub async fn write(path: &Path, passphrase: &str, sessions: &CachedSessions) -> Result<(), CacheError> {
    let frame = encode(sessions, passphrase)?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(|err| cache_io_error(parent, &err))?;
    }

    let temp_path = path.with_extension("tmp");
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(&temp_path).await.map_err(|err| cache_io_error(&temp_path, &err))?;
    file.write_all(&frame).await.map_err(|err| cache_io_error(&temp_path, &err))?;
    file.sync_all().await.map_err(|err| cache_io_error(&temp_path, &err))?;
    drop(file);

    fs::rename(&temp_path, path).await.map_err(|err| cache_io_error(path, &err))?;

    info!(path = %path.display(), partitions = sessions.sessions.len(), "stored session cache");
    Ok(())
}

/// Read the cache at `path`; `None` when the file does not exist.
pub async fn read(path: &Path, passphrase: &str) -> Result<Option<CachedSessions>, CacheError> {
    let frame = match fs::read(path).await {
        Ok(frame) => frame,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no session cache yet");
            return Ok(None);
        }
        Err(err) => return Err(cache_io_error(path, &err)),
    };

    let sessions = decode(&frame, passphrase)?;
    debug!(path = %path.display(), partitions = sessions.sessions.len(), "read session cache");
    Ok(Some(sessions))
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use tempfile::TempDir;

    use super::*;

    fn sample() -> CachedSessions {
        let headers = HashMap::from([("authorization".to_string(), "Bearer tok-1".to_string())]);
        CachedSessions {
            sessions: BTreeMap::from([
                ("vmware".to_string(), headers.clone()),
                ("cerberus".to_string(), headers),
            ]),
        }
    }

    #[test]
    fn frame_is_length_prefixed_base64() {
        let frame = encode(&sample(), "pw").unwrap();
        let length = u32::from_be_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(length, frame.len() - 4);

        let raw = STANDARD.decode(&frame[4..]).unwrap();
        assert!(raw.len() > twinline_common::crypto::IV_LEN);
    }

    #[test]
    fn decode_roundtrips_with_same_passphrase() {
        let frame = encode(&sample(), "pw").unwrap();
        assert_eq!(decode(&frame, "pw").unwrap(), sample());
    }

    #[test]
    fn wrong_passphrase_is_a_decode_error() {
        let frame = encode(&sample(), "pw").unwrap();
        assert!(matches!(decode(&frame, "other"), Err(CacheError::Decode(_))));
    }

    #[test]
    fn truncated_frames_are_rejected() {
        assert_eq!(decode(&[0, 0], "pw"), Err(CacheError::Truncated { expected: 4, actual: 2 }));

        let frame = encode(&sample(), "pw").unwrap();
        let cut = &frame[..frame.len() - 10];
        assert!(matches!(decode(cut, "pw"), Err(CacheError::Truncated { .. })));
    }

    #[test]
    fn ciphertext_shorter_than_iv_is_rejected() {
        let short = STANDARD.encode([1u8; 8]);
        let mut frame = (short.len() as u32).to_be_bytes().to_vec();
        frame.extend_from_slice(short.as_bytes());
        assert!(matches!(decode(&frame, "pw"), Err(CacheError::Decrypt(_))));
    }

    #[tokio::test]
    async fn missing_file_reads_as_none() {
        let dir = TempDir::new().unwrap();
        let sessions = read(&dir.path().join("absent.bin"), "pw").await.unwrap();
        assert!(sessions.is_none());
    }

    #[tokio::test]
    async fn write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sessions.bin");

        write(&path, "pw", &sample()).await.unwrap();
        assert_eq!(read(&path, "pw").await.unwrap(), Some(sample()));
        assert!(!path.with_extension("tmp").exists());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&path).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }
    }
}
