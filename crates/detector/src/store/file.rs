//! Filesystem-backed function spec store.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tracing::{info, warn};

use vigil_core::{AnomalyFunctionSpec, DetectorError, FunctionId, Result};

use super::SpecStore;

/// Outcome of loading a single spec file.
#[derive(Debug)]
pub struct LoadResult {
    /// Path to the file that was loaded.
    pub path: PathBuf,
    /// Status of the load attempt.
    pub status: LoadStatus,
}

/// Status of a single file load attempt.
#[derive(Debug)]
pub enum LoadStatus {
    /// Spec was successfully loaded.
    Loaded { function_id: FunctionId },
    /// File was skipped (dotfile, non-YAML, etc.).
    Skipped { reason: String },
    /// Parse or validation error occurred.
    Failed { error: String },
}

/// Loads one function spec per `*.yml` / `*.yaml` file from a directory tree.
///
/// Dotfiles and non-YAML files are skipped. Parse errors and duplicate ids
/// are reported per file and do not abort the scan. Each [`load_all`]
/// replaces the in-memory set wholesale.
///
/// [`load_all`]: FileSpecStore::load_all
pub struct FileSpecStore {
    specs_dir: PathBuf,
    specs: RwLock<BTreeMap<FunctionId, AnomalyFunctionSpec>>,
}

impl FileSpecStore {
    pub fn new(specs_dir: PathBuf) -> Self {
        Self {
            specs_dir,
            specs: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn specs_dir(&self) -> &Path {
        &self.specs_dir
    }

    /// Recursively scan the specs directory and load all YAML files.
    pub fn load_all(&self) -> Result<Vec<LoadResult>> {
        let mut results = Vec::new();
        let mut loaded = BTreeMap::new();
        scan_dir(&self.specs_dir, &mut loaded, &mut results)?;

        let count = loaded.len();
        let mut specs = self
            .specs
            .write()
            .map_err(|e| DetectorError::Persistence(format!("spec store lock: {e}")))?;
        *specs = loaded;

        info!(path = %self.specs_dir.display(), count, "loaded function specs");
        Ok(results)
    }

    /// Parse a single YAML spec file.
    pub fn load_file(path: &Path) -> Result<AnomalyFunctionSpec> {
        let contents = fs::read_to_string(path)?;
        let spec: AnomalyFunctionSpec = serde_yaml::from_str(&contents)
            .map_err(|e| DetectorError::Serialize(format!("{}: {}", path.display(), e)))?;

        if spec.collection.trim().is_empty() {
            return Err(DetectorError::Validation(format!(
                "function {} has no collection",
                spec.id
            )));
        }
        Ok(spec)
    }
}

fn scan_dir(
    dir: &Path,
    loaded: &mut BTreeMap<FunctionId, AnomalyFunctionSpec>,
    results: &mut Vec<LoadResult>,
) -> Result<()> {
    let mut paths = match fs::read_dir(dir) {
        Ok(entries) => entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<Vec<_>>>()?,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "cannot read specs directory");
            return Ok(());
        }
    };
    paths.sort();

    for path in paths {
        if path.is_dir() {
            if !is_hidden(&path) {
                scan_dir(&path, loaded, results)?;
            }
            continue;
        }

        let status = match skip_reason(&path) {
            Some(reason) => LoadStatus::Skipped {
                reason: reason.to_string(),
            },
            None => load_into(&path, loaded),
        };
        results.push(LoadResult { path, status });
    }

    Ok(())
}

fn is_hidden(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('.'))
}

fn skip_reason(path: &Path) -> Option<&'static str> {
    if is_hidden(path) {
        return Some("dotfile");
    }
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml" | "yaml") => None,
        _ => Some("not a YAML file"),
    }
}

/// Parse one spec file into `loaded`; the first file wins on duplicate ids.
fn load_into(path: &Path, loaded: &mut BTreeMap<FunctionId, AnomalyFunctionSpec>) -> LoadStatus {
    match FileSpecStore::load_file(path) {
        Ok(spec) if loaded.contains_key(&spec.id) => {
            warn!(function_id = spec.id, path = %path.display(), "duplicate function id");
            LoadStatus::Failed {
                error: format!("duplicate function id {}", spec.id),
            }
        }
        Ok(spec) => {
            let function_id = spec.id;
            info!(function_id, function_type = %spec.function_type, path = %path.display(), "loaded function spec");
            loaded.insert(function_id, spec);
            LoadStatus::Loaded { function_id }
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load function spec");
            LoadStatus::Failed {
                error: e.to_string(),
            }
        }
    }
}

impl SpecStore for FileSpecStore {
    fn find_by_id(&self, id: FunctionId) -> Result<Option<AnomalyFunctionSpec>> {
        let specs = self
            .specs
            .read()
            .map_err(|e| DetectorError::Persistence(format!("spec store lock: {e}")))?;
        Ok(specs.get(&id).cloned())
    }

    fn find_all(&self) -> Result<Vec<AnomalyFunctionSpec>> {
        let specs = self
            .specs
            .read()
            .map_err(|e| DetectorError::Persistence(format!("spec store lock: {e}")))?;
        Ok(specs.values().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;
    use vigil_core::TimeUnit;

    use super::*;

    const PAGE_VIEWS_YAML: &str = r#"
id: 1
type: THRESHOLD
metric: pageViews
collection: web
cron: "0 */15 * * * *"
window_size: 1
window_unit: DAYS
bucket_size: 1
bucket_unit: HOURS
explore_dimensions: country,browser
properties:
  max: "5000"
"#;

    fn temp_store() -> (TempDir, FileSpecStore) {
        let dir = TempDir::new().expect("create tempdir");
        let store = FileSpecStore::new(dir.path().to_path_buf());
        (dir, store)
    }

    #[test]
    fn load_spec_from_file() {
        let (dir, _store) = temp_store();
        let path = dir.path().join("page-views.yml");
        fs::write(&path, PAGE_VIEWS_YAML).unwrap();

        let spec = FileSpecStore::load_file(&path).unwrap();
        assert_eq!(spec.id, 1);
        assert_eq!(spec.window_unit, TimeUnit::Days);
        assert_eq!(spec.explore_dimension_names(), vec!["country", "browser"]);
        assert_eq!(spec.properties["max"], "5000");
    }

    #[test]
    fn load_all_skips_dotfiles_and_non_yaml() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join("one.yml"), PAGE_VIEWS_YAML).unwrap();
        fs::write(dir.path().join(".hidden.yml"), PAGE_VIEWS_YAML).unwrap();
        fs::write(dir.path().join("readme.txt"), "not a spec").unwrap();

        let results = store.load_all().unwrap();
        let loaded = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Loaded { .. }))
            .count();
        let skipped = results
            .iter()
            .filter(|r| matches!(r.status, LoadStatus::Skipped { .. }))
            .count();

        assert_eq!(loaded, 1);
        assert_eq!(skipped, 2);
        assert!(store.find_by_id(1).unwrap().is_some());
    }

    #[test]
    fn load_all_recurses_and_reports_failures() {
        let (dir, store) = temp_store();
        let nested = dir.path().join("team-a");
        fs::create_dir(&nested).unwrap();
        fs::write(nested.join("views.yaml"), PAGE_VIEWS_YAML.replace("id: 1", "id: 2")).unwrap();
        fs::write(dir.path().join("broken.yml"), "id: [not, a, number").unwrap();

        let results = store.load_all().unwrap();
        assert!(results
            .iter()
            .any(|r| matches!(r.status, LoadStatus::Failed { .. })));
        assert_eq!(store.find_all().unwrap().len(), 1);
        assert!(store.find_by_id(2).unwrap().is_some());
    }

    #[test]
    fn duplicate_ids_keep_first_file() {
        let (dir, store) = temp_store();
        fs::write(dir.path().join("a.yml"), PAGE_VIEWS_YAML).unwrap();
        fs::write(dir.path().join("b.yml"), PAGE_VIEWS_YAML.replace("pageViews", "clicks")).unwrap();

        let results = store.load_all().unwrap();
        let failed: Vec<_> = results
            .iter()
            .filter_map(|r| match &r.status {
                LoadStatus::Failed { error } => Some(error.clone()),
                _ => None,
            })
            .collect();

        assert_eq!(failed, vec!["duplicate function id 1".to_string()]);
        assert_eq!(store.find_by_id(1).unwrap().unwrap().metric, "pageViews");
    }

    #[test]
    fn missing_directory_loads_nothing() {
        let store = FileSpecStore::new(PathBuf::from("/nonexistent/vigil/specs"));
        assert!(store.load_all().unwrap().is_empty());
        assert!(store.find_all().unwrap().is_empty());
    }

    #[test]
    fn hidden_directories_are_not_scanned() {
        let (dir, store) = temp_store();
        let hidden = dir.path().join(".drafts");
        fs::create_dir(&hidden).unwrap();
        fs::write(hidden.join("draft.yml"), PAGE_VIEWS_YAML).unwrap();

        assert!(store.load_all().unwrap().is_empty());
        assert!(store.find_by_id(1).unwrap().is_none());
    }
}
