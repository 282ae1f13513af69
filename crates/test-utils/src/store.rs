//! Helpers for comparing Zarr stores on disk.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use walkdir::WalkDir;

/// Attributes that legitimately differ between two writes of the same data.
pub const VOLATILE_ATTRIBUTES: &[&str] = &["date_created"];

/// Every regular file under `root`, keyed by `/`-separated relative path.
pub fn store_files(root: &Path) -> BTreeMap<String, Vec<u8>> {
    let mut files = BTreeMap::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => panic!("failed to walk {}: {}", root.display(), e),
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map(|p| {
                p.components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect::<Vec<_>>()
                    .join("/")
            })
            .unwrap_or_default();
        let bytes = match std::fs::read(entry.path()) {
            Ok(bytes) => bytes,
            Err(e) => panic!("failed to read {}: {}", entry.path().display(), e),
        };
        files.insert(relative, bytes);
    }
    files
}

/// Names of the arrays directly under the store root (directories holding
/// a `zarr.json` with `node_type: array`).
pub fn array_names(root: &Path) -> Vec<String> {
    let mut names: Vec<String> = store_files(root)
        .into_iter()
        .filter_map(|(path, bytes)| {
            let name = path.strip_suffix("/zarr.json")?;
            if name.contains('/') {
                return None;
            }
            let json: Value = serde_json::from_slice(&bytes).ok()?;
            (json.get("node_type")? == "array").then(|| name.to_string())
        })
        .collect();
    names.sort();
    names
}

/// Parsed `zarr.json` of the node at `root/node` (`""` for the root group).
pub fn read_metadata(root: &Path, node: &str) -> Value {
    let path = if node.is_empty() {
        root.join("zarr.json")
    } else {
        root.join(node).join("zarr.json")
    };
    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) => panic!("failed to read {}: {}", path.display(), e),
    };
    match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => panic!("invalid JSON in {}: {}", path.display(), e),
    }
}

/// Assert two stores hold identical files, ignoring [`VOLATILE_ATTRIBUTES`]
/// in metadata documents.
pub fn assert_stores_equivalent(left: &Path, right: &Path) {
    let left_files = store_files(left);
    let right_files = store_files(right);

    let left_keys: Vec<_> = left_files.keys().collect();
    let right_keys: Vec<_> = right_files.keys().collect();
    assert_eq!(left_keys, right_keys, "stores contain different files");

    for (path, left_bytes) in &left_files {
        let right_bytes = &right_files[path];
        if path.ends_with("zarr.json") {
            assert_eq!(
                strip_volatile(left_bytes),
                strip_volatile(right_bytes),
                "metadata differs in {}",
                path
            );
        } else {
            assert!(left_bytes == right_bytes, "chunk bytes differ in {}", path);
        }
    }
}

fn strip_volatile(bytes: &[u8]) -> Value {
    let mut value: Value = match serde_json::from_slice(bytes) {
        Ok(value) => value,
        Err(e) => panic!("invalid metadata JSON: {}", e),
    };
    if let Some(attrs) = value.get_mut("attributes").and_then(Value::as_object_mut) {
        for key in VOLATILE_ATTRIBUTES {
            attrs.remove(*key);
        }
    }
    value
}
