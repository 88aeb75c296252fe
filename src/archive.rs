use crate::error::ProjectError;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::io::{Cursor, Read, Write};
use zip::write::SimpleFileOptions;
use zip::ZipArchive;

pub const MANIFEST_ENTRY: &str = "project.json";

/// Image extensions tried after the declared one.
pub const IMAGE_FALLBACK_EXTENSIONS: &[&str] = &["png", "jpg", "svg"];
pub const DEFAULT_SOUND_EXTENSION: &str = "wav";

/// The contents of a project container: the parsed manifest plus every other entry.
#[derive(Debug, Clone)]
pub struct Archive {
    pub manifest: Value,
    entries: HashMap<String, Vec<u8>>,
}

impl Archive {
    pub fn read(bytes: &[u8]) -> Result<Self, ProjectError> {
        let mut zip = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| ProjectError::malformed(format!("Not a valid project archive: {}.", e)))?;

        let manifest_text = {
            let mut entry = zip
                .by_name(MANIFEST_ENTRY)
                .map_err(|_| ProjectError::malformed("project.json not found in archive."))?;
            let mut raw = Vec::new();
            entry.read_to_end(&mut raw)?;
            String::from_utf8_lossy(&raw).into_owned()
        };
        let manifest = parse_manifest(&manifest_text)?;

        let mut entries = HashMap::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i)?;
            let name = entry.name().to_string();
            if name == MANIFEST_ENTRY || name.ends_with('/') {
                continue;
            }
            let mut bytes = Vec::new();
            entry.read_to_end(&mut bytes)?;
            entries.insert(name, bytes);
        }

        Ok(Self { manifest, entries })
    }

    pub fn entry(&self, name: &str) -> Option<&[u8]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Finds `<id>.<ext>` trying each candidate extension in order.
    pub fn resolve_asset(&self, id: i64, candidates: &[String]) -> Result<(String, &[u8]), ProjectError> {
        let mut tried = Vec::new();
        for ext in candidates {
            let name = format!("{}.{}", id, ext);
            if let Some(bytes) = self.entry(&name) {
                return Ok((ext.clone(), bytes));
            }
            tried.push(name);
        }
        Err(ProjectError::AssetNotFound { id, tried })
    }
}

/// Declared extension first, then the fixed image fallbacks, without repeats.
pub fn image_candidates(declared: &str) -> Vec<String> {
    let mut out = Vec::new();
    let declared = declared.trim().to_ascii_lowercase();
    if !declared.is_empty() {
        out.push(declared);
    }
    for ext in IMAGE_FALLBACK_EXTENSIONS {
        if !out.iter().any(|e| e == ext) {
            out.push((*ext).to_string());
        }
    }
    out
}

pub fn sound_candidates(declared: &str) -> Vec<String> {
    let declared = declared.trim().to_ascii_lowercase();
    let mut out = Vec::new();
    if !declared.is_empty() {
        out.push(declared);
    }
    if !out.iter().any(|e| e == DEFAULT_SOUND_EXTENSION) {
        out.push(DEFAULT_SOUND_EXTENSION.to_string());
    }
    out
}

/// Extension after the last `.` of an md5-style file name; the whole string when there is no dot.
pub fn extension_of(md5ext: &str) -> String {
    md5ext
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

/// Parses the manifest, tolerating comments and trailing commas.
pub fn parse_manifest(text: &str) -> Result<Value, ProjectError> {
    let text = text.trim_start_matches('\u{feff}');
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        return Ok(value);
    }
    json5::from_str::<Value>(text)
        .map_err(|e| ProjectError::malformed(format!("Invalid project.json: {}.", e)))
}

/// Writes a container with `project.json` first, then the assets in name order.
pub fn write_archive(manifest: &Value, assets: &BTreeMap<String, Vec<u8>>) -> Result<Vec<u8>, ProjectError> {
    let mut buffer = Cursor::new(Vec::<u8>::new());
    let mut zip = zip::ZipWriter::new(&mut buffer);
    let opts = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Deflated);

    zip.start_file(MANIFEST_ENTRY, opts)?;
    let manifest_bytes = serde_json::to_vec(manifest)
        .map_err(|e| ProjectError::malformed(format!("Could not serialize project.json: {}.", e)))?;
    zip.write_all(&manifest_bytes)?;

    for (name, bytes) in assets {
        zip.start_file(name.as_str(), opts)?;
        zip.write_all(bytes)?;
    }
    zip.finish()?;
    Ok(buffer.into_inner())
}
