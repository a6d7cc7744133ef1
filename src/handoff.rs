//! Hand-off persistence: JSON documents written for the desktop automation
//! tooling that drives the chat client.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;

/// Document name for the configured chat send roster.
pub const SENDER_LIST: &str = "sender_list";
/// Document name for the friend-add roster.
pub const FRIEND_ADD_LIST: &str = "make_list";

/// Writes `<dir>/<name>.json` as pretty JSON, creating parent directories and
/// overwriting any previous hand-off. Returns the written path.
pub fn write_json_list<T: Serialize>(dir: &Path, name: &str, records: &[T]) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("failed to create directory: {}", dir.display()))?;
    let path = dir.join(format!("{name}.json"));
    let payload = serde_json::to_string_pretty(records)
        .with_context(|| format!("failed to encode {name}"))?;
    fs::write(&path, payload).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Contact, SenderContact};
    use tempfile::TempDir;

    #[test]
    fn writes_pretty_json_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("handoff");

        let first = vec![SenderContact::from_contact(Contact {
            id: "1".to_string(),
            name: "Kim".to_string(),
            ..Contact::default()
        })];
        let path = write_json_list(&nested, SENDER_LIST, &first).unwrap();
        assert_eq!(path, nested.join("sender_list.json"));
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("\"Name\": \"Kim\""));
        assert!(body.contains("\"isConfigured\": false"));

        let second: Vec<SenderContact> = Vec::new();
        write_json_list(&nested, SENDER_LIST, &second).unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[]");
    }
}
