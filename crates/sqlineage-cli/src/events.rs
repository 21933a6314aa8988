//! Worker event files
//!
//! A `.json` file holds one event or an array of events. A `.jsonl` or
//! `.ndjson` file holds one event per line. Directories are walked
//! recursively in path order.

use anyhow::{Context, Result};
use sqlineage_core::WorkerEvent;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const EXTENSIONS: &[&str] = &["json", "jsonl", "ndjson"];

/// Collect event files under `path`, sorted
pub fn event_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        anyhow::bail!("Event path not found: {}", path.display());
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path).sort_by_file_name() {
        let entry = entry.with_context(|| format!("Failed to walk {}", path.display()))?;
        let is_event_file = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| EXTENSIONS.contains(&ext));
        if entry.file_type().is_file() && is_event_file {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Parse every event in one file, in file order
pub fn read_events(path: &Path) -> Result<Vec<WorkerEvent>> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let extension = path.extension().and_then(|e| e.to_str());
    let line_delimited = matches!(extension, Some("jsonl" | "ndjson"));

    if line_delimited {
        return contents
            .lines()
            .enumerate()
            .filter(|(_, line)| !line.trim().is_empty())
            .map(|(i, line)| {
                WorkerEvent::from_json(line)
                    .with_context(|| format!("{}:{}: invalid worker event", path.display(), i + 1))
            })
            .collect();
    }

    let value: serde_json::Value = serde_json::from_str(&contents)
        .with_context(|| format!("{}: invalid JSON", path.display()))?;
    let values = match value {
        serde_json::Value::Array(items) => items,
        single => vec![single],
    };

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            serde_json::from_value(value).with_context(|| {
                format!("{}: event #{} is not a worker event", path.display(), i)
            })
        })
        .collect()
}

/// Every event under the given paths, files in order
pub fn load_events(paths: &[PathBuf]) -> Result<Vec<WorkerEvent>> {
    let mut events = Vec::new();
    for path in paths {
        for file in event_files(path)? {
            tracing::debug!(file = %file.display(), "reading worker events");
            events.extend(read_events(&file)?);
        }
    }
    Ok(events)
}
