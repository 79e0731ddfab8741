//! Module discovery.
//!
//! Scans a modules directory for one folder per module, each carrying a
//! `module.toml` manifest. Folders are visited in lexicographic order so
//! discovery order — and with it the dispatch order — is stable across runs
//! and platforms. A folder without a usable manifest is skipped with a
//! diagnostic, never a fatal error.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::domain::manifest::{MANIFEST_FILE, ModuleManifest};

/// Load-time configuration diagnostic.
///
/// Collected instead of failing the load: one bad module folder must not take
/// the rest of the system down.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigDiagnostic {
    pub subject: String,
    pub message: String,
}

impl ConfigDiagnostic {
    pub fn new(subject: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to read modules directory `{path}`: {source}")]
    UnreadableDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result of scanning the modules directory.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Parsed manifests in discovery order.
    pub manifests: Vec<ModuleManifest>,
    /// Folders skipped and why.
    pub diagnostics: Vec<ConfigDiagnostic>,
}

/// Scan `dir` for module folders.
pub fn discover(dir: &Path) -> Result<Discovery, LoaderError> {
    let entries = fs::read_dir(dir).map_err(|source| LoaderError::UnreadableDirectory {
        path: dir.to_path_buf(),
        source,
    })?;

    let mut folders: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    folders.sort();

    let mut discovery = Discovery::default();

    for folder in folders {
        let folder_name = folder
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| folder.display().to_string());
        let manifest_path = folder.join(MANIFEST_FILE);

        let document = match fs::read_to_string(&manifest_path) {
            Ok(document) => document,
            Err(error) => {
                warn!(
                    module_folder = %folder_name,
                    error = %error,
                    "Skipping module folder without a readable manifest"
                );
                discovery.diagnostics.push(ConfigDiagnostic::new(
                    folder_name,
                    format!("missing or unreadable {MANIFEST_FILE}: {error}"),
                ));
                continue;
            }
        };

        match ModuleManifest::from_toml(&document) {
            Ok(manifest) => {
                info!(
                    module = %manifest.name,
                    kind = %manifest.kind,
                    version = %manifest.version,
                    "Discovered module"
                );
                discovery.manifests.push(manifest);
            }
            Err(error) => {
                warn!(
                    module_folder = %folder_name,
                    error = %error,
                    "Skipping module folder with invalid manifest"
                );
                discovery.diagnostics.push(ConfigDiagnostic::new(
                    folder_name,
                    format!("invalid manifest: {error}"),
                ));
            }
        }
    }

    Ok(discovery)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn write_module(root: &Path, folder: &str, manifest: &str) {
        let dir = root.join(folder);
        fs::create_dir_all(&dir).expect("module dir");
        fs::write(dir.join(MANIFEST_FILE), manifest).expect("manifest file");
    }

    #[test]
    fn discovers_modules_in_lexicographic_order() {
        let root = TempDir::new().expect("tempdir");
        write_module(
            root.path(),
            "zeta",
            "[module]\nname = \"zeta\"\nkind = \"core\"\nversion = \"1.0.0\"\n",
        );
        write_module(
            root.path(),
            "alpha",
            "[module]\nname = \"alpha\"\nkind = \"core\"\nversion = \"1.0.0\"\n",
        );

        let discovery = discover(root.path()).expect("discovery");
        let names: Vec<&str> = discovery
            .manifests
            .iter()
            .map(|manifest| manifest.name.as_str())
            .collect();

        assert_eq!(names, vec!["alpha", "zeta"]);
        assert!(discovery.diagnostics.is_empty());
    }

    #[test]
    fn missing_manifest_is_a_diagnostic_not_an_error() {
        let root = TempDir::new().expect("tempdir");
        fs::create_dir_all(root.path().join("empty")).expect("module dir");
        write_module(
            root.path(),
            "good",
            "[module]\nname = \"good\"\nkind = \"core\"\nversion = \"1.0.0\"\n",
        );

        let discovery = discover(root.path()).expect("discovery");
        assert_eq!(discovery.manifests.len(), 1);
        assert_eq!(discovery.diagnostics.len(), 1);
        assert_eq!(discovery.diagnostics[0].subject, "empty");
    }

    #[test]
    fn invalid_manifest_is_skipped_with_diagnostic() {
        let root = TempDir::new().expect("tempdir");
        write_module(root.path(), "broken", "not toml at all [");

        let discovery = discover(root.path()).expect("discovery");
        assert!(discovery.manifests.is_empty());
        assert_eq!(discovery.diagnostics.len(), 1);
    }

    #[test]
    fn unreadable_root_is_an_error() {
        let result = discover(Path::new("/definitely/not/here"));
        assert!(matches!(
            result,
            Err(LoaderError::UnreadableDirectory { .. })
        ));
    }
}
