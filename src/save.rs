use crate::archive::write_archive;
use crate::assets::{assign_save_ids, CostumeIds, SaveIds, PEN_LAYER_EXTENSION};
use crate::error::ProjectError;
use crate::model::{
    AssetData, Child, Costume, List, Payload, Project, Role, Scriptable, ScriptableId, Sound, Variable,
    NO_PEN_LAYER, STAGE_NAME,
};
use crate::script::number_value;
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashSet};

/// Serializes the project into a new archive.
pub fn save_project(project: &Project) -> Result<Vec<u8>, ProjectError> {
    let (manifest, assets) = flatten(project)?;
    write_archive(&manifest, &assets)
}

/// The manifest and the asset entries a save would write.
pub fn flatten(project: &Project) -> Result<(Value, BTreeMap<String, Vec<u8>>), ProjectError> {
    let ids = assign_save_ids(project);
    let mut assets = BTreeMap::new();

    let mut sprite_values = Vec::with_capacity(project.sprites.len());
    for (i, sprite) in project.sprites.iter().enumerate() {
        let mut obj = scriptable_fields(sprite, &ids, i + 1, &mut assets)?;
        if let Role::Sprite(info) = &sprite.role {
            obj.insert("scratchX".to_string(), number_value(info.x));
            obj.insert("scratchY".to_string(), number_value(info.y));
            obj.insert("scale".to_string(), number_value(info.scale));
            obj.insert("direction".to_string(), number_value(info.direction));
            obj.insert("rotationStyle".to_string(), json!(info.rotation_style));
            obj.insert("isDraggable".to_string(), json!(info.is_draggable));
            obj.insert("indexInLibrary".to_string(), json!(i + 1));
            obj.insert("visible".to_string(), json!(info.visible));
            obj.insert("spriteInfo".to_string(), strip_ui_fields(&info.sprite_info));
        }
        sprite_values.push((sprite.id, Value::Object(obj)));
    }

    let mut root = scriptable_fields(&project.stage, &ids, 0, &mut assets)?;
    root.insert("objName".to_string(), json!(STAGE_NAME));
    if let Role::Stage(info) = &project.stage.role {
        match (&info.pen_layer, ids.pen_layer) {
            (Some(bytes), Some(id)) => {
                root.insert(
                    "penLayerMD5".to_string(),
                    json!(md5_name(bytes, PEN_LAYER_EXTENSION)),
                );
                root.insert("penLayerID".to_string(), json!(id));
                assets.insert(format!("{}.{}", id, PEN_LAYER_EXTENSION), bytes.to_vec());
            }
            _ => {
                root.insert("penLayerMD5".to_string(), json!(info.pen_layer_md5));
                root.insert("penLayerID".to_string(), json!(NO_PEN_LAYER));
            }
        }
        root.insert("tempoBPM".to_string(), number_value(info.tempo_bpm));
        root.insert("videoAlpha".to_string(), number_value(info.video_alpha));

        let mut stage_info = match strip_ui_fields(&Value::Object(info.info.clone())) {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        stage_info.insert("spriteCount".to_string(), json!(project.sprites.len()));
        stage_info.insert("scriptCount".to_string(), json!(project.script_count()));
        root.insert("info".to_string(), Value::Object(stage_info));
    }

    root.insert(
        "children".to_string(),
        Value::Array(ordered_children(&project.children, sprite_values)),
    );

    Ok((Value::Object(root), assets))
}

/// Children in their stored order; sprites missing from it are appended.
fn ordered_children(children: &[Child], sprites: Vec<(ScriptableId, Value)>) -> Vec<Value> {
    let mut sprites: Vec<Option<(ScriptableId, Value)>> = sprites.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(children.len());
    for child in children {
        match child {
            Child::Sprite(id) => {
                let slot = sprites
                    .iter_mut()
                    .find(|slot| matches!(slot, Some((sid, _)) if *sid == *id));
                if let Some(slot) = slot {
                    if let Some((_, value)) = slot.take() {
                        out.push(value);
                    }
                }
            }
            Child::Other(value) => out.push(strip_ui_fields(value)),
        }
    }
    out.extend(sprites.into_iter().flatten().map(|(_, value)| value));
    out
}

fn scriptable_fields(
    s: &Scriptable,
    ids: &SaveIds,
    scope_index: usize,
    assets: &mut BTreeMap<String, Vec<u8>>,
) -> Result<Map<String, Value>, ProjectError> {
    let mut obj = match strip_ui_fields(&Value::Object(s.extra.clone())) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    obj.insert("objName".to_string(), json!(s.name.get()));
    obj.insert("variables".to_string(), Value::Array(variable_values(&s.variables)));
    obj.insert("lists".to_string(), Value::Array(list_values(&s.lists)));
    obj.insert(
        "scripts".to_string(),
        Value::Array(s.scripts.iter().map(|script| script.to_value()).collect()),
    );
    obj.insert(
        "scriptComments".to_string(),
        Value::Array(s.script_comments.iter().map(strip_ui_fields).collect()),
    );

    let costume_ids = ids.costumes.get(scope_index).map(Vec::as_slice).unwrap_or(&[]);
    let mut costumes = Vec::with_capacity(s.costumes.len());
    for (costume, cid) in s.costumes.iter().zip(costume_ids) {
        costumes.push(costume_value(costume, *cid, assets)?);
    }
    obj.insert("costumes".to_string(), Value::Array(costumes));
    let current = (*s.current_costume_index.get()).min(s.costumes.len().saturating_sub(1));
    obj.insert("currentCostumeIndex".to_string(), json!(current));

    let sound_ids = ids.sounds.get(scope_index).map(Vec::as_slice).unwrap_or(&[]);
    let mut sounds = Vec::with_capacity(s.sounds.len());
    for (sound, sid) in s.sounds.iter().zip(sound_ids) {
        sounds.push(sound_value(sound, *sid, assets)?);
    }
    obj.insert("sounds".to_string(), Value::Array(sounds));
    Ok(obj)
}

/// Drops empty and repeated names; the first declaration wins.
fn variable_values(variables: &[Variable]) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for v in variables {
        let name = v.name.get();
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        let mut obj = extra_object(&v.extra);
        obj.insert("name".to_string(), json!(name));
        obj.insert("value".to_string(), v.value.clone());
        obj.insert("isPersistent".to_string(), json!(v.is_persistent));
        out.push(Value::Object(obj));
    }
    out
}

fn list_values(lists: &[List]) -> Vec<Value> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for l in lists {
        let name = l.name.get();
        if name.is_empty() || !seen.insert(name.clone()) {
            continue;
        }
        let mut obj = extra_object(&l.extra);
        obj.insert("listName".to_string(), json!(name));
        obj.insert("contents".to_string(), Value::Array(l.contents.clone()));
        obj.insert("isPersistent".to_string(), json!(l.is_persistent));
        obj.insert("x".to_string(), number_value(l.layout.x));
        obj.insert("y".to_string(), number_value(l.layout.y));
        obj.insert("width".to_string(), number_value(l.layout.width));
        obj.insert("height".to_string(), number_value(l.layout.height));
        obj.insert("visible".to_string(), json!(l.layout.visible));
        out.push(Value::Object(obj));
    }
    out
}

fn costume_value(
    costume: &Costume,
    ids: CostumeIds,
    assets: &mut BTreeMap<String, Vec<u8>>,
) -> Result<Value, ProjectError> {
    let data = payload_data(&costume.payload)?;
    let mut obj = extra_object(&costume.extra);
    obj.insert("costumeName".to_string(), json!(costume.name.get()));
    obj.insert("baseLayerID".to_string(), json!(ids.base));
    obj.insert(
        "baseLayerMD5".to_string(),
        json!(md5_name(&data.bytes, &data.extension)),
    );
    obj.insert(
        "bitmapResolution".to_string(),
        number_value(costume.bitmap_resolution),
    );
    obj.insert(
        "rotationCenterX".to_string(),
        number_value(costume.rotation_center_x),
    );
    obj.insert(
        "rotationCenterY".to_string(),
        number_value(costume.rotation_center_y),
    );
    assets.insert(format!("{}.{}", ids.base, data.extension), data.bytes.to_vec());

    match (&costume.text_layer, ids.text_layer) {
        (Some(layer), Some(id)) => {
            let layer = payload_data(layer)?;
            obj.insert("textLayerID".to_string(), json!(id));
            obj.insert(
                "textLayerMD5".to_string(),
                json!(md5_name(&layer.bytes, &layer.extension)),
            );
            assets.insert(format!("{}.{}", id, layer.extension), layer.bytes.to_vec());
        }
        _ => {
            obj.insert("textLayerID".to_string(), json!(-1));
        }
    }
    Ok(Value::Object(obj))
}

fn sound_value(sound: &Sound, id: i64, assets: &mut BTreeMap<String, Vec<u8>>) -> Result<Value, ProjectError> {
    let data = payload_data(&sound.payload)?;
    let mut obj = extra_object(&sound.extra);
    obj.insert("soundName".to_string(), json!(sound.name.get()));
    obj.insert("soundID".to_string(), json!(id));
    obj.insert("md5".to_string(), json!(md5_name(&data.bytes, &data.extension)));
    assets.insert(format!("{}.{}", id, data.extension), data.bytes.to_vec());
    Ok(Value::Object(obj))
}

fn payload_data(payload: &Payload) -> Result<&AssetData, ProjectError> {
    match payload {
        Payload::Resolved(data) => Ok(data),
        Payload::Unresolved(asset) => Err(ProjectError::AssetNotFound {
            id: asset.id,
            tried: Vec::new(),
        }),
    }
}

fn md5_name(bytes: &[u8], extension: &str) -> String {
    format!("{:x}.{}", md5::compute(bytes), extension)
}

fn extra_object(extra: &Map<String, Value>) -> Map<String, Value> {
    match strip_ui_fields(&Value::Object(extra.clone())) {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Removes `_`-prefixed keys at every depth.
pub fn strip_ui_fields(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !k.starts_with('_'))
                .map(|(k, v)| (k.clone(), strip_ui_fields(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(strip_ui_fields).collect()),
        other => other.clone(),
    }
}
