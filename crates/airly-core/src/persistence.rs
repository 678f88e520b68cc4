// ── Duration persistence ──
//
// Local per-unit timed-mode durations survive restarts in a small JSON
// document. Writes go to a sibling temp file that is renamed over the
// target, so a crash mid-write never leaves a truncated store.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::error::CoreError;
use crate::model::TimedMode;
use crate::store::DurationMap;

const STORE_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct StoreRecord {
    version: u32,
    key: String,
    /// unit id -> mode name -> minutes
    data: BTreeMap<String, BTreeMap<String, Value>>,
}

/// JSON-file store for local mode durations.
pub struct DurationStore {
    path: PathBuf,
    key: String,
    write_lock: Mutex<()>,
}

impl DurationStore {
    /// Store at `dir/airly.<instance>.time_values.json`.
    pub fn new(dir: impl AsRef<Path>, instance_id: &str) -> Self {
        let key = format!("airly.{instance_id}.time_values");
        Self {
            path: dir.as_ref().join(format!("{key}.json")),
            key,
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every stored duration. A missing file is an empty store.
    /// Unknown mode names and non-numeric values are skipped.
    pub async fn load(&self) -> Result<DurationMap, CoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored durations");
                return Ok(DurationMap::new());
            }
            Err(e) => return Err(e.into()),
        };

        let record: StoreRecord = serde_json::from_str(&raw)?;
        if record.version != STORE_VERSION {
            warn!(version = record.version, "unexpected duration store version, reading anyway");
        }

        let mut out = DurationMap::new();
        for (unit_id, modes) in record.data {
            let mut durations = BTreeMap::new();
            for (name, value) in modes {
                let Ok(mode) = name.parse::<TimedMode>() else {
                    warn!(unit = %unit_id, mode = %name, "skipping unknown stored mode");
                    continue;
                };
                match value.as_u64().and_then(|m| u32::try_from(m).ok()) {
                    Some(minutes) if minutes > 0 => {
                        durations.insert(mode, minutes);
                    }
                    _ => warn!(unit = %unit_id, %mode, "skipping invalid stored duration"),
                }
            }
            if !durations.is_empty() {
                out.insert(unit_id, durations);
            }
        }
        Ok(out)
    }

    /// Replace the stored document with `durations`.
    pub async fn save(&self, durations: &DurationMap) -> Result<(), CoreError> {
        let data = durations
            .iter()
            .map(|(unit_id, modes)| {
                let modes = modes
                    .iter()
                    .map(|(mode, minutes)| (mode.to_string(), Value::from(*minutes)))
                    .collect();
                (unit_id.clone(), modes)
            })
            .collect();
        let record = StoreRecord {
            version: STORE_VERSION,
            key: self.key.clone(),
            data,
        };
        let body = serde_json::to_vec_pretty(&record)?;

        let _guard = self.write_lock.lock().await;
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &body).await?;
        tokio::fs::rename(&tmp, &self.path).await?;

        debug!(path = %self.path.display(), units = durations.len(), "durations saved");
        Ok(())
    }
}
