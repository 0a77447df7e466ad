//! Versioned artifact persistence
//!
//! Artifacts are written as canonical JSON next to a `.hash` file holding the
//! BLAKE3 digest of the exact bytes on disk. Loading re-hashes the file and
//! refuses content that no longer matches.

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info};

use crate::canon::{digest_hex, to_canonical_json};
use crate::encoder::FittedEncoderState;
use crate::errors::{FeatureError, Result};

/// File holding the raw column order of the training data
pub const COLUMN_ORDER_FILE: &str = "column_order.json";

/// Sibling digest file of an artifact
pub fn hash_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".hash");
    PathBuf::from(name)
}

/// Write `value` as canonical JSON plus its digest; returns the digest
pub fn write_artifact<T: Serialize>(path: &Path, value: &T) -> Result<String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let json = to_canonical_json(value)?;
    let digest = digest_hex(&json);
    fs::write(path, &json)?;
    fs::write(hash_path(path), &digest)?;

    debug!(path = %path.display(), bytes = json.len(), %digest, "wrote artifact");
    Ok(digest)
}

/// Read an artifact, checking its digest when a `.hash` file is present
pub fn read_artifact<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = fs::read_to_string(path)?;

    let digest_file = hash_path(path);
    if digest_file.exists() {
        let expected = fs::read_to_string(&digest_file)?.trim().to_string();
        let found = digest_hex(&json);
        if expected != found {
            return Err(FeatureError::HashMismatch {
                path: path.display().to_string(),
                expected,
                found,
            });
        }
    }

    Ok(serde_json::from_str(&json)?)
}

/// `dataprocessor_{id}.json` inside `dir`
pub fn encoder_path(dir: &Path, processor_id: u32) -> PathBuf {
    dir.join(format!("dataprocessor_{}.json", processor_id))
}

pub fn save_encoder(dir: &Path, processor_id: u32, state: &FittedEncoderState) -> Result<PathBuf> {
    let path = encoder_path(dir, processor_id);
    let digest = write_artifact(&path, state)?;
    info!(path = %path.display(), %digest, "saved encoder state");
    Ok(path)
}

/// Load and validate a persisted encoder state
pub fn load_encoder(dir: &Path, processor_id: u32) -> Result<FittedEncoderState> {
    let state: FittedEncoderState = read_artifact(&encoder_path(dir, processor_id))?;
    state.validate()?;
    Ok(state)
}

pub fn save_column_order(dir: &Path, columns: &[String]) -> Result<PathBuf> {
    let path = dir.join(COLUMN_ORDER_FILE);
    write_artifact(&path, &columns)?;
    Ok(path)
}

pub fn load_column_order(dir: &Path) -> Result<Vec<String>> {
    read_artifact(&dir.join(COLUMN_ORDER_FILE))
}
