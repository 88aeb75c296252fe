use crate::archive::{image_candidates, sound_candidates, Archive};
use crate::error::ProjectError;
use crate::model::{AssetData, Costume, Payload, PixelSize, Project, Role, Sound};
use std::io::Cursor;
use std::sync::Arc;
use xmltree::Element;

pub const PEN_LAYER_EXTENSION: &str = "png";
const TEXT_LAYER_FALLBACK_EXTENSION: &str = "png";

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCostume {
    pub bytes: Arc<[u8]>,
    pub extension: String,
    /// Cached decoded size, if a decode has already completed.
    pub pixel_size: Option<PixelSize>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedSound {
    pub bytes: Arc<[u8]>,
    pub extension: String,
}

/// Loads the costume's payload (and text layer) from the archive if still unresolved.
pub fn resolve_costume(archive: &Archive, costume: &mut Costume) -> Result<ResolvedCostume, ProjectError> {
    if let Payload::Unresolved(asset) = &costume.payload {
        let (extension, bytes) = archive.resolve_asset(asset.id, &image_candidates(&asset.declared_extension))?;
        costume.payload = Payload::Resolved(AssetData::new(extension, bytes.to_vec()));
    }
    let base_extension = costume
        .payload
        .data()
        .map(|data| data.extension.clone())
        .unwrap_or_default();

    if let Some(Payload::Unresolved(layer)) = &costume.text_layer {
        let mut candidates: Vec<String> = Vec::new();
        for ext in [layer.declared_extension.as_str(), base_extension.as_str(), TEXT_LAYER_FALLBACK_EXTENSION] {
            if !ext.is_empty() && !candidates.iter().any(|c| c == ext) {
                candidates.push(ext.to_string());
            }
        }
        let (extension, bytes) = archive.resolve_asset(layer.id, &candidates)?;
        costume.text_layer = Some(Payload::Resolved(AssetData::new(extension, bytes.to_vec())));
    }

    match costume.payload.data() {
        Some(data) => Ok(ResolvedCostume {
            bytes: data.bytes.clone(),
            extension: data.extension.clone(),
            pixel_size: *costume.size.get(),
        }),
        None => Err(ProjectError::AssetNotFound {
            id: -1,
            tried: Vec::new(),
        }),
    }
}

pub fn resolve_sound(archive: &Archive, sound: &mut Sound) -> Result<ResolvedSound, ProjectError> {
    if let Payload::Unresolved(asset) = &sound.payload {
        let (extension, bytes) = archive.resolve_asset(asset.id, &sound_candidates(&asset.declared_extension))?;
        sound.payload = Payload::Resolved(AssetData::new(extension, bytes.to_vec()));
    }
    match sound.payload.data() {
        Some(data) => Ok(ResolvedSound {
            bytes: data.bytes.clone(),
            extension: data.extension.clone(),
        }),
        None => Err(ProjectError::AssetNotFound {
            id: -1,
            tried: Vec::new(),
        }),
    }
}

/// Resolves every costume, text layer and sound in the project. The first missing
/// asset aborts; the pen layer is optional and only picked up when present.
pub fn resolve_payloads(project: &mut Project, archive: &Archive) -> Result<usize, ProjectError> {
    let mut resolved = 0usize;
    for s in project.scriptables_mut() {
        for costume in s.costumes.iter_mut() {
            resolve_costume(archive, costume)?;
            resolved += 1;
        }
        for sound in s.sounds.iter_mut() {
            resolve_sound(archive, sound)?;
            resolved += 1;
        }
        if let Role::Stage(info) = &mut s.role {
            if info.pen_layer_id >= 0 {
                let name = format!("{}.{}", info.pen_layer_id, PEN_LAYER_EXTENSION);
                if let Some(bytes) = archive.entry(&name) {
                    info.pen_layer = Some(Arc::from(bytes));
                }
            }
        }
    }
    Ok(resolved)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostumeIds {
    pub base: i64,
    pub text_layer: Option<i64>,
}

/// Archive ids for one save, indexed like `Project::scriptables()`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveIds {
    pub costumes: Vec<Vec<CostumeIds>>,
    pub sounds: Vec<Vec<i64>>,
    pub pen_layer: Option<i64>,
}

/// Numbers costumes and sounds densely from 0 in project order.
///
/// Costumes and sounds have separate id spaces. A text layer takes the id right
/// after its costume; the pen layer comes after every costume.
pub fn assign_save_ids(project: &Project) -> SaveIds {
    let mut ids = SaveIds::default();
    let mut next_costume = 0i64;
    let mut next_sound = 0i64;
    for s in project.scriptables() {
        let mut costumes = Vec::with_capacity(s.costumes.len());
        for costume in &s.costumes {
            let base = next_costume;
            next_costume += 1;
            let text_layer = costume.text_layer.as_ref().map(|_| {
                let id = next_costume;
                next_costume += 1;
                id
            });
            costumes.push(CostumeIds { base, text_layer });
        }
        ids.costumes.push(costumes);

        let sounds = s
            .sounds
            .iter()
            .map(|_| {
                let id = next_sound;
                next_sound += 1;
                id
            })
            .collect();
        ids.sounds.push(sounds);
    }
    if project
        .stage
        .stage_info()
        .map(|info| info.pen_layer.is_some())
        .unwrap_or(false)
    {
        ids.pen_layer = Some(next_costume);
    }
    ids
}

/// Natural pixel dimensions of an image payload.
pub fn measure(extension: &str, bytes: &[u8]) -> Result<PixelSize, ProjectError> {
    if extension.eq_ignore_ascii_case("svg") {
        return measure_svg(bytes);
    }
    let decode_error = |message: String| ProjectError::ImageDecode {
        extension: extension.to_string(),
        message,
    };
    let (width, height) = image::ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| decode_error(e.to_string()))?
        .into_dimensions()
        .map_err(|e| decode_error(e.to_string()))?;
    Ok(PixelSize { width, height })
}

/// Width and height attributes first, then the viewBox.
fn measure_svg(bytes: &[u8]) -> Result<PixelSize, ProjectError> {
    let root = Element::parse(bytes).map_err(|e| ProjectError::ImageDecode {
        extension: "svg".to_string(),
        message: e.to_string(),
    })?;

    let width = parse_svg_length(root.attributes.get("width").map(|s| s.as_str()));
    let height = parse_svg_length(root.attributes.get("height").map(|s| s.as_str()));
    if let (Some(w), Some(h)) = (width, height) {
        return Ok(to_pixels(w, h));
    }

    if let Some(view_box) = root.attributes.get("viewBox") {
        if let Some((w, h)) = parse_view_box(view_box) {
            return Ok(to_pixels(w, h));
        }
    }

    Err(ProjectError::ImageDecode {
        extension: "svg".to_string(),
        message: "SVG has neither width/height nor a usable viewBox.".to_string(),
    })
}

fn to_pixels(width: f64, height: f64) -> PixelSize {
    PixelSize {
        width: width.ceil().max(1.0) as u32,
        height: height.ceil().max(1.0) as u32,
    }
}

fn parse_view_box(view_box: &str) -> Option<(f64, f64)> {
    let parts = view_box
        .split(|c: char| c.is_whitespace() || c == ',')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    if parts.len() != 4 {
        return None;
    }
    let width = parts[2].parse::<f64>().ok()?;
    let height = parts[3].parse::<f64>().ok()?;
    if width <= 0.0 || height <= 0.0 {
        return None;
    }
    Some((width, height))
}

/// Leading number of an SVG length such as `480px` or `12.5`; percentages are rejected.
fn parse_svg_length(value: Option<&str>) -> Option<f64> {
    let s = value?.trim();
    if s.ends_with('%') {
        return None;
    }
    let end = s
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    let n = s[..end].parse::<f64>().ok()?;
    if n > 0.0 {
        Some(n)
    } else {
        None
    }
}
