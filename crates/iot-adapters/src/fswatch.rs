//! # Filesystem Watcher
//!
//! Publishes an event for every change observed under the watched paths:
//!
//! | Change | Event |
//! |---|---|
//! | file or directory created | `fs.create` |
//! | contents written | `fs.write` |
//! | removed | `fs.remove` |
//! | renamed or moved | `fs.rename` |
//! | permissions or other metadata changed | `fs.chmod` |
//!
//! Events carry no identifiers; the payload is the absolute path as a string.
//! Notifications are forwarded from the `notify` backend to a worker thread,
//! which publishes them in the order they were observed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use crossbeam_channel::{unbounded, Receiver};
use lazy_static::lazy_static;
use notify::event::ModifyKind;
use notify::{Config, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use serde_json::json;
use shared_bus::{define, with_data, with_data_type, Builder, Context, Publisher};
use thiserror::Error;
use tracing::{debug, warn};

lazy_static! {
    static ref FS_CREATE: Builder = define("fs.create", "file created", [path_data_type()]);
    static ref FS_WRITE: Builder = define("fs.write", "file written", [path_data_type()]);
    static ref FS_REMOVE: Builder = define("fs.remove", "file removed", [path_data_type()]);
    static ref FS_RENAME: Builder = define("fs.rename", "file renamed", [path_data_type()]);
    static ref FS_CHMOD: Builder = define("fs.chmod", "file permissions changed", [path_data_type()]);
}

fn path_data_type() -> shared_bus::EventOption {
    with_data_type(json!("/var/lib/gateway/config.json"))
}

#[derive(Debug, Error)]
pub enum WatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),
    #[error("watcher initialization failed: {0}")]
    Init(String),
    #[error("invalid path {path}: {reason}")]
    InvalidPath { path: PathBuf, reason: String },
}

/// The builder for a change of kind `kind`, if that kind is published.
fn builder_for(kind: &EventKind) -> Option<&'static Builder> {
    match kind {
        EventKind::Create(_) => Some(&*FS_CREATE),
        EventKind::Remove(_) => Some(&*FS_REMOVE),
        EventKind::Modify(ModifyKind::Name(_)) => Some(&*FS_RENAME),
        EventKind::Modify(ModifyKind::Metadata(_)) => Some(&*FS_CHMOD),
        EventKind::Modify(_) => Some(&*FS_WRITE),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => None,
    }
}

/// Watches paths and publishes `fs.*` events.
///
/// Dropping the watcher stops the backend; the worker thread exits once the
/// notifications already received are published.
pub struct FsWatcher {
    watcher: Mutex<RecommendedWatcher>,
    watched: Mutex<BTreeSet<PathBuf>>,
}

impl FsWatcher {
    /// Start a watcher publishing to `publisher`. Events are created from
    /// `ctx`; once it is done, nothing more is published.
    pub fn new(ctx: &Context, publisher: Arc<dyn Publisher>) -> Result<Self, WatchError> {
        let (raw_tx, raw_rx) = unbounded::<notify::Event>();

        let watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    let _ = raw_tx.send(event);
                }
                Err(e) => warn!(error = %e, "Filesystem notification failed"),
            },
            Config::default(),
        )
        .map_err(|e| WatchError::Init(e.to_string()))?;

        let ctx = ctx.clone();
        thread::Builder::new()
            .name("fswatch".into())
            .spawn(move || forward(ctx, raw_rx, publisher))
            .map_err(|e| WatchError::Init(e.to_string()))?;

        Ok(Self {
            watcher: Mutex::new(watcher),
            watched: Mutex::new(BTreeSet::new()),
        })
    }

    /// Watch `path`, recursively when it is a directory.
    pub fn watch(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        let path = absolute(path.as_ref())?;
        self.watcher.lock().watch(&path, RecursiveMode::Recursive)?;
        debug!(path = %path.display(), "Watching path");
        self.watched.lock().insert(path);
        Ok(())
    }

    /// Stop watching `path`.
    pub fn unwatch(&self, path: impl AsRef<Path>) -> Result<(), WatchError> {
        let path = absolute(path.as_ref())?;
        self.watcher.lock().unwatch(&path)?;
        debug!(path = %path.display(), "Stopped watching path");
        self.watched.lock().remove(&path);
        Ok(())
    }

    /// The paths currently watched.
    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().iter().cloned().collect()
    }
}

fn absolute(path: &Path) -> Result<PathBuf, WatchError> {
    std::path::absolute(path).map_err(|e| WatchError::InvalidPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

fn forward(ctx: Context, raw: Receiver<notify::Event>, publisher: Arc<dyn Publisher>) {
    for change in raw.iter() {
        if ctx.is_done() {
            break;
        }
        let Some(builder) = builder_for(&change.kind) else {
            continue;
        };
        for path in &change.paths {
            let path = std::path::absolute(path).unwrap_or_else(|_| path.clone());
            publisher.publish(builder.new_event(&ctx, [with_data(path.to_string_lossy().into_owned())]));
        }
    }
    debug!("Filesystem watcher stopped");
}
