//! Hot reload - watches the extensions directory and reloads on change

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{RecursiveMode, Watcher, recommended_watcher};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::discover::discover;
use crate::error::RuntimeError;
use crate::events::RuntimeEvent;
use crate::host::ExtensionHost;

/// Watches the host's extensions directory and hot-reloads loaded
/// extensions whose files change.
///
/// Changes are debounced: a burst of writes triggers one reload per
/// affected extension once the directory goes quiet. Extensions that
/// are not currently loaded are ignored; loading is always explicit.
pub struct ExtensionWatcher {
    host: ExtensionHost,
    shutdown: CancellationToken,
    _watcher: notify::RecommendedWatcher,
}

impl ExtensionWatcher {
    /// Start watching the host's extensions directory.
    ///
    /// Creates the directory if it does not exist yet so that the first
    /// manifest dropped into it is picked up.
    pub fn new(host: ExtensionHost) -> Result<Self, RuntimeError> {
        let root = host.config().extensions_dir.clone();
        let debounce = host.config().watch_debounce;

        if !root.exists() {
            std::fs::create_dir_all(&root)?;
        }

        let (tx, rx) = mpsc::channel::<notify::Result<notify::Event>>(100);
        let mut watcher = recommended_watcher(move |event| {
            // Runs on the notify thread, not the runtime
            let _ = tx.blocking_send(event);
        })?;
        watcher.watch(&root, RecursiveMode::Recursive)?;
        debug!(root = %root.display(), "Watching extensions directory");

        let shutdown = CancellationToken::new();
        tokio::spawn(watch_loop(
            host.clone(),
            root,
            rx,
            debounce,
            shutdown.clone(),
        ));

        Ok(Self {
            host,
            shutdown,
            _watcher: watcher,
        })
    }

    /// Rescan the directory and reload every loaded extension that has
    /// a manifest on disk, without waiting for a file event
    pub async fn resync(&self) {
        let root = self.host.config().extensions_dir.clone();
        let names: BTreeSet<String> = match discover(&root, self.host.loaders()) {
            Ok(discovery) => discovery.extensions.into_iter().map(|d| d.name).collect(),
            Err(e) => {
                warn!(error = %e, "Rescan failed, nothing to resync");
                BTreeSet::new()
            }
        };
        reload_names(&self.host, names).await;
    }

    /// Stop the watch loop. Dropping the watcher does the same.
    pub fn stop(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for ExtensionWatcher {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn watch_loop(
    host: ExtensionHost,
    root: PathBuf,
    mut rx: mpsc::Receiver<notify::Result<notify::Event>>,
    debounce: Duration,
    shutdown: CancellationToken,
) {
    loop {
        let first = tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };

        let mut touched: BTreeSet<PathBuf> = BTreeSet::new();
        collect_paths(&mut touched, first);

        // Quiet period: keep draining until no event arrives for a full
        // debounce window
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                next = tokio::time::timeout(debounce, rx.recv()) => match next {
                    Ok(Some(event)) => collect_paths(&mut touched, event),
                    Ok(None) => return,
                    Err(_) => break,
                },
            }
        }

        let names = changed_names(&host, &root, &touched);
        if names.is_empty() {
            continue;
        }
        debug!(count = names.len(), "Directory settled, reloading changed extensions");
        reload_names(&host, names).await;
    }
    debug!("Extension watcher stopped");
}

fn collect_paths(touched: &mut BTreeSet<PathBuf>, event: notify::Result<notify::Event>) {
    match event {
        Ok(event) => touched.extend(event.paths),
        Err(e) => warn!(error = %e, "File watch error"),
    }
}

/// Map touched paths to extension names. A fresh discovery pass
/// resolves manifests whose declared name differs from their file
/// name; paths that no longer resolve fall back to the file stem.
fn changed_names(
    host: &ExtensionHost,
    root: &Path,
    touched: &BTreeSet<PathBuf>,
) -> BTreeSet<String> {
    let mut by_component: HashMap<PathBuf, String> = HashMap::new();
    match discover(root, host.loaders()) {
        Ok(discovery) => {
            for found in discovery.extensions {
                if let Some(component) = owner_component(root, &found.path) {
                    by_component.insert(component, found.name);
                }
            }
        }
        Err(e) => warn!(error = %e, "Rescan failed, falling back to path names"),
    }

    let mut names = BTreeSet::new();
    for path in touched {
        let Some(component) = owner_component(root, path) else {
            continue;
        };
        if let Some(name) = by_component.get(&component) {
            names.insert(name.clone());
        } else if let Some(stem) = component.file_stem().and_then(|s| s.to_str()) {
            names.insert(stem.to_string());
        }
    }
    names
}

/// First path component under the watch root, as an absolute path
fn owner_component(root: &Path, path: &Path) -> Option<PathBuf> {
    let rel = path.strip_prefix(root).ok()?;
    let first = rel.components().next()?;
    Some(root.join(first.as_os_str()))
}

async fn reload_names(host: &ExtensionHost, names: BTreeSet<String>) {
    for name in names {
        if !host.is_loaded(&name) {
            debug!(extension = %name, "Changed on disk but not loaded, ignoring");
            continue;
        }
        match host.reload(&name).await {
            Ok(()) => {
                info!(extension = %name, "Hot reloaded");
                host.emit_event(RuntimeEvent::HotReload { name });
            }
            Err(e) => {
                warn!(extension = %name, error = %e, "Hot reload failed");
            }
        }
    }
}
