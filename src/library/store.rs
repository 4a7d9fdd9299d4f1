// src/library/store.rs
// 光谱库的 JSON 持久化（带版本号）
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::LibraryError;
use crate::library::entry::{Library, LibraryEntry};

pub const LIBRARY_SCHEMA_VERSION: u32 = 1;
/// File name used by "save as default" and loaded on start-up.
pub const DEFAULT_LIBRARY_FILE: &str = "rbase_specdictcur.json";

#[derive(Deserialize)]
struct VersionProbe {
    version: u32,
}

#[derive(Serialize, Deserialize)]
struct StoredEntry {
    key: String,
    #[serde(flatten)]
    entry: LibraryEntry,
}

#[derive(Serialize, Deserialize)]
struct LibraryFile {
    version: u32,
    entries: Vec<StoredEntry>,
}

pub fn from_json(text: &str) -> Result<Library, LibraryError> {
    let probe: VersionProbe = serde_json::from_str(text)?;
    if probe.version != LIBRARY_SCHEMA_VERSION {
        return Err(LibraryError::UnsupportedVersion {
            found: probe.version,
            expected: LIBRARY_SCHEMA_VERSION,
        });
    }
    let file: LibraryFile = serde_json::from_str(text)?;
    Ok(file.entries.into_iter().map(|s| (s.key, s.entry)).collect())
}

pub fn to_json(library: &Library) -> Result<String, LibraryError> {
    let file = LibraryFile {
        version: LIBRARY_SCHEMA_VERSION,
        entries: library
            .iter()
            .map(|(key, entry)| StoredEntry {
                key: key.clone(),
                entry: entry.clone(),
            })
            .collect(),
    };
    Ok(serde_json::to_string_pretty(&file)?)
}

pub fn load_library(path: impl AsRef<Path>) -> Result<Library, LibraryError> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path)?;
    let library = from_json(&text)?;
    info!("library loaded: {} ({} entries)", path.display(), library.len());
    Ok(library)
}

pub fn save_library(library: &Library, path: impl AsRef<Path>) -> Result<(), LibraryError> {
    let path = path.as_ref();
    let mut writer = BufWriter::new(File::create(path)?);
    writer.write_all(to_json(library)?.as_bytes())?;
    writer.flush()?;
    info!("library saved: {} ({} entries)", path.display(), library.len());
    Ok(())
}
