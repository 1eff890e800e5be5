//! File handle cache and its arbiter
//!
//! Any thread may read the cache. Only the arbiter, a single dedicated worker
//! thread, opens, replaces or closes the handles in it. Callers whose cached
//! handle is missing or stale send a `Request` over a bounded queue and block
//! on a private reply slot until the arbiter answers.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use std::thread::{self, JoinHandle};

use tracing::{debug, info, warn};

use crate::error::LogError;

/// Name of the arbiter's worker thread
pub const ARBITER_THREAD_NAME: &str = "subjectlog-arbiter";

/// An open log file
#[derive(Debug)]
pub struct FileHandle {
    path: PathBuf,
    file: Mutex<File>,
}

impl FileHandle {
    /// Create the parent directory if needed and open `path` for appending
    fn open(path: PathBuf) -> Result<Self, LogError> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).map_err(|source| LogError::CreateDir {
                path: dir.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| LogError::OpenFile {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append `record` followed by a newline as a single write
    pub fn write_line(&self, record: &[u8]) -> Result<(), LogError> {
        let mut line = Vec::with_capacity(record.len() + 1);
        line.extend_from_slice(record);
        line.push(b'\n');

        let mut file = self.file.lock().unwrap_or_else(|e| e.into_inner());
        file.write_all(&line).map_err(|source| LogError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

/// Live file handle per subject
#[derive(Debug, Default)]
pub struct HandleCache {
    handles: RwLock<HashMap<String, Arc<FileHandle>>>,
}

impl HandleCache {
    /// Get the cached handle for a subject
    pub fn get(&self, subject: &str) -> Option<Arc<FileHandle>> {
        self.handles
            .read()
            .ok()
            .and_then(|h| h.get(subject).cloned())
    }

    /// Path of the cached handle for a subject
    pub fn path_of(&self, subject: &str) -> Option<PathBuf> {
        self.get(subject).map(|h| h.path().to_path_buf())
    }

    /// Number of open handles
    pub fn len(&self) -> usize {
        self.handles.read().map(|h| h.len()).unwrap_or(0)
    }

    fn install(&self, subject: String, handle: Arc<FileHandle>) {
        if let Ok(mut handles) = self.handles.write() {
            handles.insert(subject, handle);
        }
    }

    fn evict(&self, subject: &str) -> Option<Arc<FileHandle>> {
        self.handles.write().ok().and_then(|mut h| h.remove(subject))
    }

    fn clear(&self) {
        if let Ok(mut handles) = self.handles.write() {
            handles.clear();
        }
    }
}

/// "Give me the live handle for `path` under `subject`"
struct Request {
    subject: String,
    path: PathBuf,
    reply: flume::Sender<Result<Arc<FileHandle>, LogError>>,
}

/// Handle to the arbiter worker
pub struct Arbiter {
    requests: Mutex<Option<flume::Sender<Request>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Arbiter {
    /// Start the worker that owns every mutation of `cache`
    ///
    /// # Arguments
    /// * `cache` - The cache the worker will maintain
    /// * `capacity` - Maximum number of queued requests before senders block
    pub fn spawn(cache: Arc<HandleCache>, capacity: usize) -> Result<Self, LogError> {
        let (sender, receiver) = flume::bounded(capacity);

        let worker = thread::Builder::new()
            .name(ARBITER_THREAD_NAME.to_string())
            .spawn(move || run(&cache, receiver))
            .map_err(LogError::Spawn)?;

        Ok(Self {
            requests: Mutex::new(Some(sender)),
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Ask the worker for the live handle of `subject` at `path`
    ///
    /// Blocks until the worker replies.
    pub fn resolve(&self, subject: &str, path: PathBuf) -> Result<Arc<FileHandle>, LogError> {
        let sender = self
            .requests
            .lock()
            .ok()
            .and_then(|s| s.as_ref().cloned())
            .ok_or(LogError::EngineStopped)?;

        let (reply, response) = flume::bounded(1);
        sender
            .send(Request {
                subject: subject.to_string(),
                path,
                reply,
            })
            .map_err(|_| LogError::EngineStopped)?;

        response.recv().map_err(|_| LogError::EngineStopped)?
    }

    /// Check if the worker still accepts requests
    pub fn is_running(&self) -> bool {
        self.requests.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Stop accepting requests and wait for the worker to close every handle
    pub fn shutdown(&self) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.take();
        }

        let worker = self.worker.lock().ok().and_then(|mut w| w.take());
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("Log arbiter thread panicked");
            }
        }
    }
}

impl Drop for Arbiter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(cache: &HandleCache, requests: flume::Receiver<Request>) {
    info!("Log arbiter started");

    for request in requests.iter() {
        let result = rotate(cache, &request.subject, request.path);
        // The requester may have given up; nothing to do then
        let _ = request.reply.send(result);
    }

    cache.clear();
    info!("Log arbiter stopped");
}

fn rotate(
    cache: &HandleCache,
    subject: &str,
    path: PathBuf,
) -> Result<Arc<FileHandle>, LogError> {
    // An earlier request in the queue may already have done the work
    if let Some(current) = cache.get(subject) {
        if current.path() == path {
            return Ok(current);
        }
    }

    if let Some(stale) = cache.evict(subject) {
        debug!(
            subject,
            from = %stale.path().display(),
            to = %path.display(),
            "Rotating log file"
        );
    }

    let handle = Arc::new(FileHandle::open(path)?);
    cache.install(subject.to_string(), Arc::clone(&handle));
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn start() -> (Arc<HandleCache>, Arbiter) {
        let cache = Arc::new(HandleCache::default());
        let arbiter = Arbiter::spawn(Arc::clone(&cache), 8).unwrap();
        (cache, arbiter)
    }

    #[test]
    fn test_resolve_opens_and_caches() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, arbiter) = start();
        let path = temp_dir.path().join("teste").join("teste-2022101222.log");

        let handle = arbiter.resolve("teste", path.clone()).unwrap();

        assert_eq!(handle.path(), path);
        assert!(path.exists());
        assert_eq!(cache.path_of("teste"), Some(path));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_resolve_same_path_reuses_handle() {
        let temp_dir = TempDir::new().unwrap();
        let (_cache, arbiter) = start();
        let path = temp_dir.path().join("a").join("a-1.log");

        let first = arbiter.resolve("a", path.clone()).unwrap();
        let second = arbiter.resolve("a", path).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_resolve_new_path_replaces_handle() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, arbiter) = start();
        let old_path = temp_dir.path().join("a").join("a-2022101222.log");
        let new_path = temp_dir.path().join("a").join("a-2022101223.log");

        arbiter.resolve("a", old_path).unwrap();
        let handle = arbiter.resolve("a", new_path.clone()).unwrap();

        assert_eq!(handle.path(), new_path);
        assert_eq!(cache.path_of("a"), Some(new_path));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_subjects_get_separate_handles() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, arbiter) = start();

        let a = arbiter.resolve("a", temp_dir.path().join("a/a.log")).unwrap();
        let b = arbiter.resolve("b", temp_dir.path().join("b/b.log")).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_failed_open_leaves_no_handle() {
        let temp_dir = TempDir::new().unwrap();
        let blocker = temp_dir.path().join("blocker");
        fs::write(&blocker, b"not a directory").unwrap();
        let (cache, arbiter) = start();

        arbiter
            .resolve("a", temp_dir.path().join("a/a-1.log"))
            .unwrap();
        let result = arbiter.resolve("a", blocker.join("a").join("a-2.log"));

        assert!(matches!(result, Err(LogError::CreateDir { .. })));
        assert!(cache.get("a").is_none());
    }

    #[test]
    fn test_write_line_appends() {
        let temp_dir = TempDir::new().unwrap();
        let (_cache, arbiter) = start();
        let path = temp_dir.path().join("w/w.log");

        let handle = arbiter.resolve("w", path.clone()).unwrap();
        handle.write_line(br#"{"a":1}"#).unwrap();
        handle.write_line(br#"{"a":2}"#).unwrap();

        let content = fs::read_to_string(path).unwrap();
        assert_eq!(content, "{\"a\":1}\n{\"a\":2}\n");
    }

    #[test]
    fn test_shutdown_closes_everything() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, arbiter) = start();
        arbiter.resolve("a", temp_dir.path().join("a/a.log")).unwrap();

        arbiter.shutdown();

        assert!(!arbiter.is_running());
        assert_eq!(cache.len(), 0);
        assert!(matches!(
            arbiter.resolve("a", temp_dir.path().join("a/a.log")),
            Err(LogError::EngineStopped)
        ));
    }

    #[test]
    fn test_concurrent_resolves_share_one_handle() {
        let temp_dir = TempDir::new().unwrap();
        let (cache, arbiter) = start();
        let arbiter = Arc::new(arbiter);
        let path = temp_dir.path().join("c/c.log");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let arbiter = Arc::clone(&arbiter);
                let path = path.clone();
                thread::spawn(move || arbiter.resolve("c", path).unwrap())
            })
            .collect();
        let resolved: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        for handle in &resolved[1..] {
            assert!(Arc::ptr_eq(&resolved[0], handle));
        }
        assert_eq!(cache.len(), 1);
    }
}
