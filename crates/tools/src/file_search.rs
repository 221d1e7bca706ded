//! `file_search`: glob a directory.

use std::path::Path;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use async_trait::async_trait;
use protocol::{ParamSpec, ParamType, ParameterSchema};
use runtime::{HandlerError, Params, ToolDescriptor, ToolHandler};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{Error, Result};

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "file_search",
        "Search for files in a directory",
        ParameterSchema::new()
            .field(
                "directory",
                ParamSpec::new(ParamType::String).with_description("Directory to search in"),
            )
            .field(
                "pattern",
                ParamSpec::new(ParamType::String).with_description("Search pattern (glob format)"),
            ),
        Arc::new(FileSearch),
    )
}

struct FileSearch;

#[async_trait]
impl ToolHandler for FileSearch {
    async fn call(&self, params: Params) -> std::result::Result<Value, HandlerError> {
        let directory = params.str("directory").unwrap_or(".").to_string();
        let pattern = params.str("pattern").unwrap_or("*").to_string();

        let files = tokio::task::spawn_blocking(move || search(Path::new(&directory), &pattern))
            .await
            .map_err(Error::from)??;
        let count = files.len();
        Ok(json!({ "files": files, "count": count }))
    }
}

#[derive(Debug, Serialize)]
struct FileEntry {
    path: String,
    name: String,
    is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    size: Option<u64>,
    /// Seconds since the Unix epoch.
    #[serde(skip_serializing_if = "Option::is_none")]
    modified: Option<f64>,
}

fn search(directory: &Path, pattern: &str) -> Result<Vec<FileEntry>> {
    if !directory.exists() {
        return Err(Error::NotFound(directory.display().to_string()));
    }
    if Path::new(pattern).is_absolute() {
        return Err(Error::AbsolutePattern(pattern.to_string()));
    }

    let base = glob::Pattern::escape(&directory.to_string_lossy());
    let full = Path::new(&base).join(pattern);

    let mut files = Vec::new();
    for path in glob::glob(&full.to_string_lossy())?.flatten() {
        match file_entry(&path) {
            Ok(entry) => files.push(entry),
            Err(e) => tracing::warn!(path = %path.display(), "skipping unreadable entry: {e}"),
        }
    }
    Ok(files)
}

fn file_entry(path: &Path) -> std::io::Result<FileEntry> {
    let metadata = std::fs::metadata(path)?;
    let modified = metadata
        .modified()
        .ok()
        .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
        .map(|elapsed| elapsed.as_secs_f64());

    Ok(FileEntry {
        path: path.display().to_string(),
        name: path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default(),
        is_dir: metadata.is_dir(),
        size: metadata.is_file().then(|| metadata.len()),
        modified,
    })
}
