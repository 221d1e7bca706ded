//! `code_analysis`: line metrics for a file, or a census of a directory tree.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use protocol::{ParamSpec, ParamType, ParameterSchema};
use runtime::{HandlerError, Params, ToolDescriptor, ToolHandler};
use serde_json::{Map, Value, json};
use walkdir::WalkDir;

use crate::{Error, Result};

const COMMENT_PREFIXES: [&str; 5] = ["#", "//", "/*", "*", "*/"];
const SCRIPT_EXTENSIONS: [&str; 4] = [".js", ".ts", ".jsx", ".tsx"];

pub fn descriptor() -> ToolDescriptor {
    ToolDescriptor::new(
        "code_analysis",
        "Analyze code in a file or directory",
        ParameterSchema::new()
            .field(
                "path",
                ParamSpec::new(ParamType::String)
                    .required()
                    .with_description("Path to file or directory to analyze"),
            )
            .field(
                "analysis_type",
                ParamSpec::new(ParamType::String).with_description(
                    "Type of analysis to perform (syntax, complexity, dependencies)",
                ),
            ),
        Arc::new(CodeAnalysis),
    )
}

struct CodeAnalysis;

#[async_trait]
impl ToolHandler for CodeAnalysis {
    async fn call(&self, params: Params) -> std::result::Result<Value, HandlerError> {
        let path = params.str("path").unwrap_or_default().to_string();
        let analysis: AnalysisType = params.str("analysis_type").unwrap_or("syntax").parse()?;

        let report = tokio::task::spawn_blocking(move || analyze(Path::new(&path), analysis))
            .await
            .map_err(Error::from)??;
        Ok(report)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisType {
    Syntax,
    Complexity,
    Dependencies,
}

impl FromStr for AnalysisType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "syntax" => Ok(Self::Syntax),
            "complexity" => Ok(Self::Complexity),
            "dependencies" => Ok(Self::Dependencies),
            other => Err(Error::UnsupportedAnalysis(other.to_string())),
        }
    }
}

fn analyze(path: &Path, analysis: AnalysisType) -> Result<Value> {
    if !path.exists() {
        return Err(Error::NotFound(path.display().to_string()));
    }
    let metadata = std::fs::metadata(path)?;
    if metadata.is_file() {
        analyze_file(path, metadata.len(), analysis)
    } else if metadata.is_dir() {
        Ok(analyze_directory(path))
    } else {
        Err(Error::UnknownPathType(path.display().to_string()))
    }
}

fn analyze_file(path: &Path, size: u64, analysis: AnalysisType) -> Result<Value> {
    let bytes = std::fs::read(path)?;
    let content = String::from_utf8_lossy(&bytes);
    let lines: Vec<&str> = content.lines().collect();
    let extension = extension(path);

    let mut report = Map::new();
    report.insert("file".into(), json!(path.display().to_string()));
    report.insert("size".into(), json!(size));
    report.insert("lines".into(), json!(lines.len()));
    report.insert("extension".into(), json!(extension));

    match analysis {
        AnalysisType::Syntax => {
            let (mut empty, mut comments, mut code) = (0usize, 0usize, 0usize);
            for line in &lines {
                let line = line.trim();
                if line.is_empty() {
                    empty += 1;
                } else if is_comment(line) {
                    comments += 1;
                } else {
                    code += 1;
                }
            }
            report.insert("empty_lines".into(), json!(empty));
            report.insert("comment_lines".into(), json!(comments));
            report.insert("code_lines".into(), json!(code));
        }
        AnalysisType::Complexity => {
            let lengths: Vec<usize> = lines.iter().map(|line| line.chars().count()).collect();
            let total: usize = lengths.iter().sum();
            let functions = lines
                .iter()
                .filter(|line| line.contains("def ") || line.contains("function "))
                .count();
            report.insert(
                "avg_line_length".into(),
                json!(total as f64 / lines.len().max(1) as f64),
            );
            report.insert(
                "max_line_length".into(),
                json!(lengths.iter().copied().max().unwrap_or(0)),
            );
            report.insert("function_count".into(), json!(functions));
        }
        AnalysisType::Dependencies => {
            if let Some(imports) = imports(&extension, &lines) {
                report.insert("imports".into(), json!(imports));
            }
        }
    }

    Ok(Value::Object(report))
}

/// Import lines for languages we know how to read; `None` for the rest.
fn imports(extension: &str, lines: &[&str]) -> Option<Vec<String>> {
    let keep: fn(&str) -> bool = if extension == ".py" {
        |line| line.trim().starts_with("import ") || line.trim().starts_with("from ")
    } else if SCRIPT_EXTENSIONS.contains(&extension) {
        |line| line.contains("import ") || line.contains("require(")
    } else {
        return None;
    };
    Some(
        lines
            .iter()
            .filter(|line| keep(line))
            .map(|line| line.trim().to_string())
            .collect(),
    )
}

fn analyze_directory(path: &Path) -> Value {
    let mut file_types: BTreeMap<String, u64> = BTreeMap::new();
    let mut file_count = 0u64;
    let mut total_size = 0u64;

    for entry in WalkDir::new(path).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(path = %path.display(), "skipping entry: {e}");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        file_count += 1;
        total_size += entry.metadata().map(|m| m.len()).unwrap_or(0);
        *file_types.entry(extension(entry.path())).or_default() += 1;
    }

    json!({
        "directory": path.display().to_string(),
        "file_count": file_count,
        "total_size": total_size,
        "file_types": file_types,
    })
}

fn is_comment(trimmed: &str) -> bool {
    COMMENT_PREFIXES
        .iter()
        .any(|prefix| trimmed.starts_with(prefix))
}

/// Lowercased extension with its leading dot, or empty.
fn extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}
