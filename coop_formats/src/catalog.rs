use std::fs;
use std::path::{Path, PathBuf};

use log::warn;
use serde::Serialize;
use walkdir::WalkDir;

use crate::section::SectionFile;

/// One selectable mission description on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissionFileEntry {
    pub path: PathBuf,
    /// Path relative to the scanned folder, used for menu labels.
    pub display_name: String,
}

/// Walk the missions folder (optionally restricted to a sub-folder)
/// and keep the `.mis` files staged on the configured map. Unreadable
/// or unparsable files are skipped, not fatal.
pub fn scan_missions(
    root: &Path,
    subfolder: Option<&str>,
    map_name: &str,
) -> Vec<MissionFileEntry> {
    let scan_root = match subfolder {
        Some(sub) => root.join(sub),
        None => root.to_path_buf(),
    };

    let mut entries = Vec::new();
    for entry in WalkDir::new(&scan_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|e| e.to_str()) != Some("mis") {
            continue;
        }

        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) => {
                warn!("skipping unreadable mission {}: {err}", path.display());
                continue;
            }
        };
        let file = match SectionFile::parse(&text) {
            Ok(file) => file,
            Err(err) => {
                warn!("skipping unparsable mission {}: {err}", path.display());
                continue;
            }
        };

        if file.value_of("MAIN", "MAP") != Ok(map_name) {
            continue;
        }

        let display_name = path
            .strip_prefix(&scan_root)
            .unwrap_or(path)
            .to_string_lossy()
            .replace('\\', "/");
        entries.push(MissionFileEntry {
            path: path.to_path_buf(),
            display_name,
        });
    }

    entries
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_mission(dir: &Path, name: &str, map: &str) {
        let text = format!("[MAIN]\n  MAP {map}\n[AirGroups]\n  G.01\n");
        fs::write(dir.join(name), text).expect("write mission");
    }

    #[test]
    fn keeps_only_missions_on_the_configured_map() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_mission(dir.path(), "channel.mis", "Land$English_Channel_1940");
        write_mission(dir.path(), "elsewhere.mis", "Land$Other_Map");
        fs::write(dir.path().join("notes.txt"), "not a mission").unwrap();

        let entries = scan_missions(dir.path(), None, "Land$English_Channel_1940");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "channel.mis");
    }

    #[test]
    fn scans_only_the_requested_subfolder() {
        let dir = tempfile::tempdir().expect("tempdir");
        let sub = dir.path().join("coop");
        fs::create_dir(&sub).unwrap();
        write_mission(dir.path(), "top.mis", "Map$A");
        write_mission(&sub, "nested.mis", "Map$A");

        let entries = scan_missions(dir.path(), Some("coop"), "Map$A");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].display_name, "nested.mis");
    }

    #[test]
    fn malformed_files_are_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_mission(dir.path(), "good.mis", "Map$A");
        // Parsable but missing MAIN.MAP: filtered out rather than fatal.
        fs::write(dir.path().join("bad.mis"), "[AirGroups]\n  G.01\n").unwrap();

        let entries = scan_missions(dir.path(), None, "Map$A");
        assert_eq!(entries.len(), 1);
    }
}
