//! Directory-backed persister
//!
//! Layout under the store root:
//!
//! ```text
//! plane/master               id of the master node, empty when cleared
//! plane/nodes/<node-id>.json one checksummed record per node
//! plane/change.log           JSON lines: node arrivals, terminal statuses, master changes
//! ```
//!
//! Every file write goes to a uniquely named temp file, is fsynced, then
//! renamed into place, so several nodes may share one directory. A record
//! whose checksum or JSON is broken loads as a garbled record with no
//! status rather than failing the whole load.
//!
//! Master changes are read-check-write with no lock across persisters.
//! `ClearMaster` re-reads `plane/master` just before its rename, but a
//! `SetMaster` from another node landing inside that last step can still
//! be wiped. The next election cycle re-publishes the surviving master.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::errors::{PersistenceError, PersistenceResult};
use super::SyncRecordPersister;
use crate::ha::{Delta, ManagementNodeSyncRecord, ManagementPlaneSyncRecord, MasterChange};
use crate::observability::HaEvent;

const PLANE_DIR: &str = "plane";
const NODES_DIR: &str = "nodes";
const MASTER_FILE: &str = "master";
const CHANGE_LOG_FILE: &str = "change.log";
const RECORD_EXTENSION: &str = "json";

/// On-disk wrapper around one node record
#[derive(Debug, Serialize, Deserialize)]
struct RecordEnvelope {
    crc32: u32,
    record: String,
}

/// One line of `plane/change.log`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    /// RFC 3339 wall-clock time of the write
    pub at: String,
    pub event: String,
    pub node_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Persister over a shared directory
#[derive(Debug)]
pub struct FilePersister {
    plane_dir: PathBuf,
    running: AtomicBool,
    write_lock: Mutex<()>,
}

impl FilePersister {
    /// Open (creating if needed) the plane directories under `store_dir`.
    pub fn open(store_dir: &Path) -> PersistenceResult<Self> {
        let plane_dir = store_dir.join(PLANE_DIR);
        fs::create_dir_all(plane_dir.join(NODES_DIR))?;
        Ok(Self {
            plane_dir,
            running: AtomicBool::new(true),
            write_lock: Mutex::new(()),
        })
    }

    pub fn plane_dir(&self) -> &Path {
        &self.plane_dir
    }

    fn nodes_dir(&self) -> PathBuf {
        self.plane_dir.join(NODES_DIR)
    }

    fn master_path(&self) -> PathBuf {
        self.plane_dir.join(MASTER_FILE)
    }

    fn change_log_path(&self) -> PathBuf {
        self.plane_dir.join(CHANGE_LOG_FILE)
    }

    fn record_path(&self, node_id: &str) -> PathBuf {
        self.nodes_dir()
            .join(format!("{}.{}", encode_node_id(node_id), RECORD_EXTENSION))
    }

    /// All change log entries, oldest first. Unparseable lines are skipped.
    pub fn change_log_entries(&self) -> PersistenceResult<Vec<ChangeLogEntry>> {
        let content = match fs::read_to_string(self.change_log_path()) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        Ok(content
            .lines()
            .filter_map(|line| serde_json::from_str(line).ok())
            .collect())
    }

    fn read_master(&self) -> PersistenceResult<Option<String>> {
        match fs::read_to_string(self.master_path()) {
            Ok(content) => {
                let id = content.trim();
                Ok(if id.is_empty() { None } else { Some(id.to_string()) })
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_master(&self, master: Option<&str>) -> PersistenceResult<()> {
        write_atomic(&self.master_path(), master.unwrap_or("").as_bytes())?;
        Ok(())
    }

    fn read_records(&self) -> PersistenceResult<Vec<ManagementNodeSyncRecord>> {
        let entries = match fs::read_dir(self.nodes_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(RECORD_EXTENSION) {
                continue;
            }
            let Some(node_id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(decode_node_id)
            else {
                continue;
            };

            let bytes = match fs::read(&path) {
                Ok(bytes) => bytes,
                // removed between listing and reading
                Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match decode_record(&bytes) {
                Some(record) => records.push(record),
                None => {
                    HaEvent::PersisterRecordGarbled.emit(&[("node_id", &node_id)]);
                    records.push(ManagementNodeSyncRecord::garbled(node_id));
                }
            }
        }
        Ok(records)
    }

    fn write_record(&self, record: &ManagementNodeSyncRecord) -> PersistenceResult<()> {
        let path = self.record_path(&record.node_id);
        let existed = path.exists();

        write_atomic(&path, &encode_record(record)?)?;

        if !existed {
            self.append_change(
                "NODE_ADDED",
                &record.node_id,
                record.status.map(|s| s.to_string()),
            )?;
        } else if let Some(status) = record.status.filter(|s| s.is_terminal()) {
            self.append_change("NODE_STATUS", &record.node_id, Some(status.to_string()))?;
        }
        Ok(())
    }

    fn remove_record(&self, node_id: &str) -> PersistenceResult<()> {
        match fs::remove_file(self.record_path(node_id)) {
            Ok(()) => self.append_change("NODE_REMOVED", node_id, None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn apply_master_change(&self, change: &MasterChange) -> PersistenceResult<()> {
        match change {
            MasterChange::NoChange => Ok(()),
            MasterChange::SetMaster(node_id) => {
                let previous = self.read_master()?;
                if previous.as_deref() == Some(node_id.as_str()) {
                    return Ok(());
                }
                self.write_master(Some(node_id))?;
                self.append_change("MASTER_CHANGED", node_id, previous.map(|p| format!("from {}", p)))
            }
            MasterChange::ClearMaster(node_id) => {
                if self.read_master()?.as_deref() != Some(node_id.as_str()) {
                    return Ok(());
                }
                // re-checked right before the rename; another node may have taken over
                let cleared = write_atomic_if(&self.master_path(), b"", || {
                    Ok(self.read_master()?.as_deref() == Some(node_id.as_str()))
                })?;
                if !cleared {
                    return Ok(());
                }
                self.append_change("MASTER_CLEARED", node_id, None)
            }
        }
    }

    fn append_change(&self, event: &str, node_id: &str, detail: Option<String>) -> PersistenceResult<()> {
        let entry = ChangeLogEntry {
            at: Utc::now().to_rfc3339(),
            event: event.to_string(),
            node_id: node_id.to_string(),
            detail,
        };
        let mut line = serde_json::to_string(&entry)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.change_log_path())?;
        file.write_all(line.as_bytes())?;
        file.sync_data()?;
        Ok(())
    }
}

impl SyncRecordPersister for FilePersister {
    fn load_sync_record(&self) -> PersistenceResult<ManagementPlaneSyncRecord> {
        if !self.is_running() {
            return Err(PersistenceError::NotRunning);
        }

        let master = self.read_master()?;
        let builder = self
            .read_records()?
            .into_iter()
            .fold(ManagementPlaneSyncRecord::builder(), |b, r| b.node(r));
        Ok(builder.master_node_id(master).build())
    }

    fn delta(&self, delta: &Delta) -> PersistenceResult<()> {
        if !self.is_running() {
            HaEvent::PersisterDeltaDropped.emit(&[("reason", "not running")]);
            return Ok(());
        }

        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        for record in &delta.nodes {
            self.write_record(record)?;
        }
        for node_id in &delta.removed_node_ids {
            self.remove_record(node_id)?;
        }
        self.apply_master_change(&delta.master_change)
    }

    fn wait_for_writes_completed(&self, _timeout: Duration) -> PersistenceResult<()> {
        // `delta` returns only after fsync and rename.
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());
        Ok(())
    }

    fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

fn encode_record(record: &ManagementNodeSyncRecord) -> PersistenceResult<Vec<u8>> {
    let payload = serde_json::to_string(record)?;
    let envelope = RecordEnvelope {
        crc32: crc32fast::hash(payload.as_bytes()),
        record: payload,
    };
    Ok(serde_json::to_vec_pretty(&envelope)?)
}

fn decode_record(bytes: &[u8]) -> Option<ManagementNodeSyncRecord> {
    let envelope: RecordEnvelope = serde_json::from_slice(bytes).ok()?;
    if crc32fast::hash(envelope.record.as_bytes()) != envelope.crc32 {
        return None;
    }
    serde_json::from_str(&envelope.record).ok()
}

/// Write via temp file, fsync, rename, then fsync the directory.
fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    write_atomic_if(path, bytes, || Ok(true)).map(|_| ())
}

/// Like `write_atomic`, but `still_wanted` runs after the temp file is
/// synced and before the rename. Returns whether the rename happened.
fn write_atomic_if<F>(path: &Path, bytes: &[u8], still_wanted: F) -> io::Result<bool>
where
    F: FnOnce() -> PersistenceResult<bool>,
{
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("record");
    let temp_path = parent.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4()));

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(bytes)?;
        file.sync_all()?;
        let wanted = still_wanted().map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
        if wanted {
            fs::rename(&temp_path, path)?;
        }
        Ok(wanted)
    })();

    match result {
        Ok(true) => {}
        Ok(false) => {
            let _ = fs::remove_file(&temp_path);
            return Ok(false);
        }
        Err(e) => {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    if let Ok(dir) = File::open(parent) {
        let _ = dir.sync_all();
    }
    Ok(true)
}

fn is_plain_id_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'-' || b == b'_'
}

/// Percent-encode everything outside `[A-Za-z0-9_-]`.
fn encode_node_id(node_id: &str) -> String {
    let mut out = String::with_capacity(node_id.len());
    for b in node_id.bytes() {
        if is_plain_id_byte(b) {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn decode_node_id(encoded: &str) -> Option<String> {
    let bytes = encoded.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = encoded.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}
