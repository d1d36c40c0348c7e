//! Extension discovery - scanning a directory for manifests
//!
//! Two on-disk shapes are accepted: a single manifest file
//! `<name>.<ext>`, or a directory `<name>/` holding an entry manifest
//! named `index.<ext>`, `main.<ext>`, or `plugin.<ext>`. The file
//! extension selects a [`ManifestLoader`]; TOML and JSON loaders are
//! built in and embedders can supply more.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use arbor_extension_api::ExtensionManifest;

use crate::error::ValidationError;

/// Entry-file stems probed inside extension directories, in order
const ENTRY_STEMS: &[&str] = &["index", "main", "plugin"];

/// Parses manifest files of one on-disk format
pub trait ManifestLoader: Send + Sync {
    /// File extensions (without the dot) this loader handles
    fn extensions(&self) -> &'static [&'static str];

    /// Parse a manifest file
    fn load(&self, path: &Path) -> Result<ExtensionManifest, ValidationError>;
}

/// Loader for `.toml` manifests
pub struct TomlManifestLoader;

impl ManifestLoader for TomlManifestLoader {
    fn extensions(&self) -> &'static [&'static str] {
        &["toml"]
    }

    fn load(&self, path: &Path) -> Result<ExtensionManifest, ValidationError> {
        let content = read_manifest(path)?;
        toml::from_str(&content).map_err(|e| ValidationError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

/// Loader for `.json` manifests
pub struct JsonManifestLoader;

impl ManifestLoader for JsonManifestLoader {
    fn extensions(&self) -> &'static [&'static str] {
        &["json"]
    }

    fn load(&self, path: &Path) -> Result<ExtensionManifest, ValidationError> {
        let content = read_manifest(path)?;
        serde_json::from_str(&content).map_err(|e| ValidationError::Malformed {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }
}

fn read_manifest(path: &Path) -> Result<String, ValidationError> {
    fs::read_to_string(path).map_err(|e| ValidationError::Malformed {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// The built-in loader set (TOML first, then JSON)
pub fn default_loaders() -> Vec<Box<dyn ManifestLoader>> {
    vec![Box::new(TomlManifestLoader), Box::new(JsonManifestLoader)]
}

/// One manifest found on disk
#[derive(Debug, Clone)]
pub struct DiscoveredExtension {
    /// Resolved name: the manifest's own `name` when non-empty,
    /// otherwise derived from the file stem or directory name
    pub name: String,
    /// Path of the manifest file itself
    pub path: PathBuf,
    /// The parsed manifest
    pub manifest: ExtensionManifest,
}

/// Everything one scan produced
#[derive(Debug, Default)]
pub struct Discovery {
    /// Successfully parsed manifests, in scan order
    pub extensions: Vec<DiscoveredExtension>,
    /// Manifests that failed to parse, keyed by path-derived name
    pub errors: Vec<(String, ValidationError)>,
}

/// Scan a directory for extension manifests.
///
/// A missing root yields an empty [`Discovery`]; malformed manifests
/// land in `errors` without aborting the scan. Entries are visited in
/// file-name order so repeated scans are deterministic.
pub fn discover(root: &Path, loaders: &[Box<dyn ManifestLoader>]) -> std::io::Result<Discovery> {
    let mut discovery = Discovery::default();

    if !root.exists() {
        debug!(root = %root.display(), "extensions directory missing, nothing to discover");
        return Ok(discovery);
    }

    let mut entries: Vec<_> = fs::read_dir(root)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }

        if path.is_dir() {
            match find_entry_file(&path, loaders) {
                Some(manifest_path) => {
                    record(&mut discovery, &file_name, &manifest_path, loaders);
                }
                None => {
                    debug!(
                        path = %path.display(),
                        "directory has no entry manifest, skipping"
                    );
                }
            }
        } else if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            // Files without a registered loader (READMEs etc.) are skipped
            if loader_for(&path, loaders).is_some() {
                let stem = stem.to_string();
                record(&mut discovery, &stem, &path, loaders);
            }
        }
    }

    Ok(discovery)
}

fn record(
    discovery: &mut Discovery,
    fallback_name: &str,
    manifest_path: &Path,
    loaders: &[Box<dyn ManifestLoader>],
) {
    let Some(loader) = loader_for(manifest_path, loaders) else {
        return;
    };

    match loader.load(manifest_path) {
        Ok(mut manifest) => {
            if manifest.name.is_empty() {
                manifest.name = fallback_name.to_string();
            }
            let name = manifest.name.clone();
            if discovery.extensions.iter().any(|d| d.name == name) {
                warn!(
                    extension = %name,
                    path = %manifest_path.display(),
                    "duplicate extension name on disk, keeping the first"
                );
                return;
            }
            debug!(
                extension = %name,
                path = %manifest_path.display(),
                "discovered extension manifest"
            );
            discovery.extensions.push(DiscoveredExtension {
                name,
                path: manifest_path.to_path_buf(),
                manifest,
            });
        }
        Err(e) => {
            warn!(
                extension = %fallback_name,
                path = %manifest_path.display(),
                error = %e,
                "failed to parse extension manifest"
            );
            discovery.errors.push((fallback_name.to_string(), e));
        }
    }
}

fn find_entry_file(dir: &Path, loaders: &[Box<dyn ManifestLoader>]) -> Option<PathBuf> {
    for stem in ENTRY_STEMS {
        for loader in loaders {
            for ext in loader.extensions() {
                let candidate = dir.join(format!("{stem}.{ext}"));
                if candidate.is_file() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

fn loader_for<'a>(
    path: &Path,
    loaders: &'a [Box<dyn ManifestLoader>],
) -> Option<&'a dyn ManifestLoader> {
    let ext = path.extension()?.to_str()?;
    loaders
        .iter()
        .find(|l| l.extensions().iter().any(|e| *e == ext))
        .map(|l| l.as_ref())
}
