//! Loading test documents from YAML or JSON files

use std::fs;
use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use tracing::debug;

use crate::errors::{PipelineError, Result};
use super::model::Document;

/// Maximum document size (10 MB); YAML parsing can expand memory several times over
const MAX_DOCUMENT_FILE_SIZE: u64 = 10 * 1024 * 1024;

/// Load, inject the process environment, and check every reference
pub fn load_document(path: &Path) -> Result<Document> {
    let env: IndexMap<String, String> = std::env::vars().collect();
    let document = load_document_with_env(path, env)?;
    document.validate()?;
    Ok(document)
}

/// Load with an explicit environment snapshot; references are not validated
pub fn load_document_with_env(path: &Path, env: IndexMap<String, String>) -> Result<Document> {
    let metadata = fs::metadata(path)
        .map_err(|e| PipelineError::document(format!("cannot read {}: {}", path.display(), e)))?;

    let file_size = metadata.len();
    if file_size > MAX_DOCUMENT_FILE_SIZE {
        return Err(PipelineError::document(format!(
            "document too large: {} bytes (max {} bytes)",
            file_size, MAX_DOCUMENT_FILE_SIZE
        )));
    }

    let content = fs::read_to_string(path)?;
    let root = parse_document(&content, path)?;

    let root_dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));

    debug!(path = %path.display(), bytes = file_size, "document loaded");
    Document::from_value(root, env, root_dir)
}

/// Parse by extension; anything that is not `.json` goes through YAML, which
/// also accepts JSON
fn parse_document(content: &str, path: &Path) -> Result<JsonValue> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let root: JsonValue = if extension == "json" {
        serde_json::from_str(content)?
    } else {
        serde_yaml::from_str(content)?
    };

    if root.is_null() {
        return Err(PipelineError::document(format!("{} is empty", path.display())));
    }
    Ok(root)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp(name: &str, content: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut f = fs::File::create(&path).unwrap();
        f.write_all(content.as_bytes()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_load_yaml_document() {
        let (_dir, path) = write_temp(
            "api.yaml",
            r#"
base: localhost:8000
login:
  username: admin
tests:
  list:
    request:
      uri: /items
    response:
      - status: 200
        body:
          ok: true
pipelines:
  - [list]
"#,
        );
        let doc = load_document_with_env(&path, IndexMap::new()).unwrap();
        assert_eq!(doc.base, "localhost:8000");
        assert_eq!(doc.login["username"], "admin");
        assert_eq!(doc.tests["list"].response[0].status, Some(200));
        assert_eq!(doc.root_dir, path.parent().unwrap());
        doc.validate().unwrap();
    }

    #[test]
    fn test_load_json_document() {
        let (_dir, path) = write_temp(
            "api.json",
            r#"{"base": "http://h", "tests": {"t": {"request": {"uri": "/"}}}, "pipelines": [["t"]]}"#,
        );
        let doc = load_document_with_env(&path, IndexMap::new()).unwrap();
        assert_eq!(doc.pipelines.len(), 1);
    }

    #[test]
    fn test_invalid_yaml() {
        let (_dir, path) = write_temp("bad.yaml", "tests: [");
        let err = load_document_with_env(&path, IndexMap::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Yaml(_)));
        assert!(err.to_string().starts_with("YAML error:"));
    }

    #[test]
    fn test_invalid_json() {
        let (_dir, path) = write_temp("bad.json", "{\"tests\": ");
        let err = load_document_with_env(&path, IndexMap::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Json(_)));
    }

    #[test]
    fn test_empty_document() {
        let (_dir, path) = write_temp("empty.yaml", "");
        assert!(load_document_with_env(&path, IndexMap::new()).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = load_document_with_env(Path::new("/definitely/not/here.yaml"), IndexMap::new()).unwrap_err();
        assert!(err.to_string().contains("cannot read"));
    }
}
