//! Debounced, crash-safe persistence.
//!
//! Saves are enqueued to a single background worker; the latest snapshot for a key replaces any
//! snapshot still pending, and a key is only written once its debounce interval has passed
//! without further saves.  Writes go to a temp file in the target directory, get fsynced, and
//! are renamed over the target, so a crash leaves either the old file or the new one, never a
//! torn one.
//!
//! Keys are file stems: a device serial, or [SCENARIOS_KEY] for the scenario store.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, warn};

/// Key under which the scenario store is persisted.
pub const SCENARIOS_KEY: &str = "scenarios";

/// Quiet period before a pending snapshot is flushed.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(100);

enum Op {
    Save { key: String, json: String },
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

struct Pending {
    json: String,
    deadline: Instant,
}

/// Handle to the persistence worker.
pub struct PersistenceEngine {
    dir: PathBuf,
    tx: mpsc::UnboundedSender<Op>,
    worker: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl PersistenceEngine {
    /// Creates the storage directory and spawns the I/O worker.  Must be called from within a
    /// tokio runtime.
    pub fn new(dir: impl Into<PathBuf>, debounce: Duration) -> io::Result<PersistenceEngine> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = tokio::spawn(run_worker(dir.clone(), debounce, rx));
        Ok(PersistenceEngine {
            dir,
            tx,
            worker: std::sync::Mutex::new(Some(worker)),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Enqueues a snapshot.  The most recently enqueued snapshot for a key is the one that
    /// eventually reaches disk.
    pub fn save(&self, key: &str, json: String) {
        let _ = self.tx.send(Op::Save {
            key: key.to_owned(),
            json,
        });
    }

    /// Synchronous read, used at startup before the server runs.
    pub fn load(&self, key: &str) -> Option<String> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(json) => Some(json),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                warn!(key, error = %e, "failed to read persisted state");
                None
            }
        }
    }

    /// Writes every pending snapshot now, without shutting down.
    pub async fn flush(&self) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Op::Flush(ack)).is_ok() {
            let _ = done.await;
        }
    }

    /// Flushes all pending writes and stops the worker, waiting at most `timeout`.
    pub async fn shutdown(&self, timeout: Duration) {
        let (ack, done) = oneshot::channel();
        if self.tx.send(Op::Shutdown(ack)).is_ok()
            && tokio::time::timeout(timeout, done).await.is_err()
        {
            warn!("persistence worker did not flush within {:?}", timeout);
        }
        if let Some(worker) = self.worker.lock().unwrap().take() {
            worker.abort();
        }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key))
    }
}

async fn run_worker(dir: PathBuf, debounce: Duration, mut rx: mpsc::UnboundedReceiver<Op>) {
    let mut pending: HashMap<String, Pending> = HashMap::new();

    loop {
        let next_deadline = pending.values().map(|p| p.deadline).min();

        tokio::select! {
            op = rx.recv() => match op {
                Some(Op::Save { key, json }) => {
                    // Replace any unwritten snapshot and re-arm the timer.
                    pending.insert(key, Pending { json, deadline: Instant::now() + debounce });
                }
                Some(Op::Flush(ack)) => {
                    write_all(&dir, &mut pending).await;
                    let _ = ack.send(());
                }
                Some(Op::Shutdown(ack)) => {
                    write_all(&dir, &mut pending).await;
                    let _ = ack.send(());
                    return;
                }
                None => {
                    write_all(&dir, &mut pending).await;
                    return;
                }
            },
            _ = sleep_until_or_forever(next_deadline) => {
                let now = Instant::now();
                let due: Vec<String> = pending
                    .iter()
                    .filter(|(_, p)| p.deadline <= now)
                    .map(|(k, _)| k.clone())
                    .collect();
                for key in due {
                    if let Some(p) = pending.remove(&key) {
                        write_one(&dir, &key, &p.json).await;
                    }
                }
            }
        }
    }
}

async fn sleep_until_or_forever(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

async fn write_all(dir: &Path, pending: &mut HashMap<String, Pending>) {
    for (key, p) in pending.drain() {
        write_one(dir, &key, &p.json).await;
    }
}

async fn write_one(dir: &Path, key: &str, json: &str) {
    if let Err(first) = write_atomic(dir, key, json).await {
        warn!(key, error = %first, "state write failed, retrying");
        if let Err(second) = write_atomic(dir, key, json).await {
            error!(key, error = %second, "state write failed twice, giving up");
            return;
        }
    }
    debug!(key, "persisted state");
}

/// temp file + fsync + rename, all in the target's directory.
async fn write_atomic(dir: &Path, key: &str, json: &str) -> io::Result<()> {
    let tmp = dir.join(format!(".{}.json.tmp", key));
    let target = dir.join(format!("{}.json", key));

    let mut file = tokio::fs::File::create(&tmp).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&tmp, &target).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn debounced_saves_collapse_to_the_last_snapshot() {
        let tmp = tempfile::tempdir().unwrap();
        let engine =
            PersistenceEngine::new(tmp.path(), Duration::from_millis(50)).unwrap();

        for label in ["A", "B", "C", "D", "E"] {
            engine.save("d073d5000001", format!("{{\"label\":\"{}\"}}", label));
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        tokio::time::sleep(Duration::from_millis(200)).await;

        let files: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(files.len(), 1, "expected a single file, got {:?}", files);

        let json = engine.load("d073d5000001").unwrap();
        assert_eq!(json, "{\"label\":\"E\"}");

        engine.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_writes() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = PersistenceEngine::new(tmp.path(), Duration::from_secs(60)).unwrap();

        engine.save("d073d5000002", "{\"label\":\"pending\"}".into());
        // Debounce is a minute out; shutdown must not wait for it.
        engine.shutdown(Duration::from_secs(1)).await;

        let json = std::fs::read_to_string(tmp.path().join("d073d5000002.json")).unwrap();
        assert_eq!(json, "{\"label\":\"pending\"}");
    }

    #[tokio::test]
    async fn separate_keys_get_separate_files() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = PersistenceEngine::new(tmp.path(), Duration::from_millis(10)).unwrap();

        engine.save("d073d5000003", "{}".into());
        engine.save(SCENARIOS_KEY, "{\"global\":null}".into());
        engine.flush().await;

        assert!(tmp.path().join("d073d5000003.json").exists());
        assert!(tmp.path().join("scenarios.json").exists());
        engine.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn load_missing_key_is_none() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = PersistenceEngine::new(tmp.path(), DEFAULT_DEBOUNCE).unwrap();
        assert!(engine.load("d073d5ffffff").is_none());
        engine.shutdown(Duration::from_secs(1)).await;
    }

    #[tokio::test]
    async fn no_temp_files_survive_a_flush() {
        let tmp = tempfile::tempdir().unwrap();
        let engine = PersistenceEngine::new(tmp.path(), Duration::from_millis(10)).unwrap();
        engine.save("d073d5000004", "{}".into());
        engine.flush().await;
        let leftovers: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {:?}", leftovers);
        engine.shutdown(Duration::from_secs(1)).await;
    }
}
