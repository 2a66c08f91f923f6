//! On-disk dataset primitives.
//!
//! Every writer goes through write-then-rename so readers and resumed runs
//! never observe a partial file. Unit files are independent and idempotent;
//! presence of a unit file is the resume signal.

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{PipelineError, Result};

/// Output encodings for dataset files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Jsonl,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Jsonl => "jsonl",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

/// Serialize `records` in the chosen format.
pub fn encode_records<T: Serialize>(records: &[T], format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(records)?),
        OutputFormat::Jsonl => {
            let mut out = String::new();
            for record in records {
                out.push_str(&serde_json::to_string(record)?);
                out.push('\n');
            }
            Ok(out)
        }
    }
}

/// Write `content` to `path` atomically (temp file in the same directory,
/// then rename).
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&parent)?;

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| PipelineError::Config(format!("bad output path {}", path.display())))?;
    let tmp = parent.join(format!(".{}.tmp", file_name));
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

/// Write a slice of records as one unit file.
pub fn write_records<T: Serialize>(path: &Path, records: &[T], format: OutputFormat) -> Result<()> {
    write_atomic(path, &encode_records(records, format)?)
}

/// Write a single JSON document (summaries, single plans).
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    write_atomic(path, &serde_json::to_string_pretty(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn atomic_write_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unit.json");
        write_atomic(&path, "{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn jsonl_is_one_record_per_line() {
        let records = vec![serde_json::json!({"a": 1}), serde_json::json!({"a": 2})];
        let encoded = encode_records(&records, OutputFormat::Jsonl).unwrap();
        let lines: Vec<_> = encoded.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], r#"{"a":1}"#);
    }

    #[test]
    fn json_is_a_pretty_array() {
        let records = vec![serde_json::json!({"a": 1})];
        let encoded = encode_records(&records, OutputFormat::Json).unwrap();
        assert!(encoded.trim_start().starts_with('['));
    }
}
