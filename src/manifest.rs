//! Reading and rewriting `package.json` manifests.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};

use crate::error::{Error, Result};

/// File name of a package manifest.
pub const MANIFEST_FILE: &str = "package.json";

/// A parsed `package.json`, with key order preserved.
pub type Manifest = Map<String, Value>;

/// Returns the manifest path inside `directory`.
pub fn manifest_path(directory: impl AsRef<Path>) -> PathBuf {
    directory.as_ref().join(MANIFEST_FILE)
}

/// Reads the manifest in `directory`.
pub fn read_package_json(directory: impl AsRef<Path>) -> Result<Manifest> {
    read_manifest_file(&manifest_path(directory))
}

/// Reads the manifest in the current working directory.
pub fn read_root_package_json() -> Result<Manifest> {
    let cwd = std::env::current_dir()?;
    read_package_json(cwd)
}

/// Reads the manifest in `directory`, passes it through `transform` and
/// writes the result back to the same file.
///
/// The file is left untouched if `transform` returns an error.
pub fn update_package_config<F>(directory: impl AsRef<Path>, transform: F) -> Result<()>
where
    F: FnOnce(Manifest) -> Result<Manifest>,
{
    let path = manifest_path(directory);
    let manifest = read_manifest_file(&path)?;
    let updated = transform(manifest)?;
    write_package_json(&path, &updated)?;

    tracing::debug!(path = %path.display(), "rewrote manifest");
    Ok(())
}

/// Serializes `manifest` to `path` with 2-space indentation and a trailing newline.
pub fn write_package_json(path: &Path, manifest: &Manifest) -> Result<()> {
    let mut json = serde_json::to_string_pretty(manifest).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;
    json.push('\n');

    std::fs::write(path, json).map_err(|e| Error::ManifestIo {
        path: path.to_path_buf(),
        source: e,
    })
}

fn read_manifest_file(path: &Path) -> Result<Manifest> {
    let content = std::fs::read_to_string(path).map_err(|e| Error::ManifestIo {
        path: path.to_path_buf(),
        source: e,
    })?;

    let value: Value = serde_json::from_str(&content).map_err(|e| Error::Parse {
        path: path.to_path_buf(),
        source: e,
    })?;

    match value {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidManifest(format!(
            "{} must contain a JSON object, found {}",
            path.display(),
            json_kind(&other)
        ))),
    }
}

/// Returns the object stored under `key`, inserting an empty one if absent.
pub(crate) fn object_entry<'a>(manifest: &'a mut Manifest, key: &str) -> Result<&'a mut Manifest> {
    let entry = manifest
        .entry(key.to_string())
        .or_insert_with(|| Value::Object(Map::new()));

    match entry {
        Value::Object(map) => Ok(map),
        other => Err(Error::InvalidManifest(format!(
            "`{}` must be an object, found {}",
            key,
            json_kind(other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
