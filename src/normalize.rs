use crate::archive::{extension_of, DEFAULT_SOUND_EXTENSION};
use crate::error::ProjectError;
use crate::model::{
    AssetRef, Child, Costume, List, ListBox, Payload, Project, Role, Scriptable, ScriptableId,
    Sound, SpriteInfo, StageInfo, Variable, DEFAULT_PEN_LAYER_MD5, STAGE_NAME,
};
use crate::observable::Observable;
use crate::script::Script;
use serde_json::{json, Map, Value};
use std::cmp::Ordering;

const SCRIPTABLE_KEYS: &[&str] = &[
    "objName",
    "variables",
    "lists",
    "scripts",
    "scriptComments",
    "costumes",
    "currentCostumeIndex",
    "sounds",
];
const STAGE_KEYS: &[&str] = &[
    "children",
    "sprites",
    "penLayerMD5",
    "penLayerID",
    "tempoBPM",
    "videoAlpha",
    "info",
];
const SPRITE_KEYS: &[&str] = &[
    "indexInLibrary",
    "scratchX",
    "scratchY",
    "scale",
    "direction",
    "rotationStyle",
    "isDraggable",
    "visible",
    "spriteInfo",
];
const VARIABLE_KEYS: &[&str] = &["name", "value", "isPersistent"];
const LIST_KEYS: &[&str] = &[
    "listName",
    "contents",
    "isPersistent",
    "x",
    "y",
    "width",
    "height",
    "visible",
];
const COSTUME_KEYS: &[&str] = &[
    "costumeName",
    "baseLayerID",
    "baseLayerMD5",
    "bitmapResolution",
    "rotationCenterX",
    "rotationCenterY",
    "textLayerID",
    "textLayerMD5",
];
const SOUND_KEYS: &[&str] = &["soundName", "soundID", "md5"];

/// Sentinel `textLayerID` meaning the costume has no text layer.
const NO_TEXT_LAYER: i64 = -1;

/// Builds the project graph from a parsed manifest.
///
/// Asset payloads are left unresolved; they still point at archive entries.
pub fn normalize(manifest: &Value) -> Result<Project, ProjectError> {
    let root = manifest
        .as_object()
        .ok_or_else(|| ProjectError::malformed("project.json root is not an object."))?;

    let raw_children = root
        .get("children")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut library_order = Vec::new();
    for (position, child) in raw_children.iter().enumerate() {
        if is_sprite(child) {
            library_order.push(position);
        }
    }
    library_order.sort_by(|a, b| {
        library_index(&raw_children[*a])
            .partial_cmp(&library_index(&raw_children[*b]))
            .unwrap_or(Ordering::Equal)
    });

    let stage_info = read_stage_info(root);
    let stage = read_scriptable(root, ScriptableId(0), STAGE_NAME.to_string(), Role::Stage(stage_info))?;
    let mut project = Project::with_stage(stage);

    let mut ids_by_position = vec![None; raw_children.len()];
    for position in library_order {
        let raw = &raw_children[position];
        let obj = raw
            .as_object()
            .ok_or_else(|| ProjectError::malformed("Sprite entry is not an object."))?;
        let id = project.allocate_id();
        let name = obj
            .get("objName")
            .map(value_to_name)
            .unwrap_or_default();
        let sprite = read_scriptable(obj, id, name, Role::Sprite(read_sprite_info(obj)))?;
        ids_by_position[position] = Some(id);
        project.sprites.push(sprite);
    }

    for (position, child) in raw_children.into_iter().enumerate() {
        match ids_by_position[position] {
            Some(id) => project.children.push(Child::Sprite(id)),
            None => project.children.push(Child::Other(child)),
        }
    }

    Ok(project)
}

fn is_sprite(child: &Value) -> bool {
    match child.get("objName") {
        Some(Value::String(s)) => !s.is_empty(),
        Some(Value::Null) | None => false,
        Some(_) => true,
    }
}

/// Sprites without an index sort after every indexed sprite.
fn library_index(child: &Value) -> f64 {
    child
        .get("indexInLibrary")
        .and_then(Value::as_f64)
        .filter(|v| !v.is_nan())
        .unwrap_or(f64::INFINITY)
}

fn read_stage_info(root: &Map<String, Value>) -> StageInfo {
    let defaults = StageInfo::default();
    StageInfo {
        pen_layer_md5: root
            .get("penLayerMD5")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_PEN_LAYER_MD5)
            .to_string(),
        pen_layer_id: root
            .get("penLayerID")
            .and_then(Value::as_i64)
            .unwrap_or(defaults.pen_layer_id),
        pen_layer: None,
        tempo_bpm: f64_field(root, "tempoBPM", defaults.tempo_bpm),
        video_alpha: f64_field(root, "videoAlpha", defaults.video_alpha),
        info: root
            .get("info")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or(defaults.info),
    }
}

fn read_sprite_info(obj: &Map<String, Value>) -> SpriteInfo {
    let defaults = SpriteInfo::default();
    SpriteInfo {
        index_in_library: f64_field(obj, "indexInLibrary", defaults.index_in_library),
        x: f64_field(obj, "scratchX", defaults.x),
        y: f64_field(obj, "scratchY", defaults.y),
        scale: f64_field(obj, "scale", defaults.scale),
        direction: f64_field(obj, "direction", defaults.direction),
        rotation_style: obj
            .get("rotationStyle")
            .and_then(Value::as_str)
            .map(ToString::to_string)
            .unwrap_or(defaults.rotation_style),
        is_draggable: bool_field(obj, "isDraggable", defaults.is_draggable),
        visible: bool_field(obj, "visible", defaults.visible),
        sprite_info: obj.get("spriteInfo").cloned().unwrap_or(defaults.sprite_info),
    }
}

fn read_scriptable(
    obj: &Map<String, Value>,
    id: ScriptableId,
    name: String,
    role: Role,
) -> Result<Scriptable, ProjectError> {
    let role_keys = if matches!(role, Role::Stage(_)) {
        STAGE_KEYS
    } else {
        SPRITE_KEYS
    };
    let mut s = Scriptable::new(id, name, role);

    let mut scripts = array_field(obj, "scripts")
        .iter()
        .map(Script::from_value)
        .collect::<Result<Vec<_>, _>>()?;
    scripts.sort_by(|a, b| a.position_cmp(b));
    s.scripts = scripts;
    s.script_comments = array_field(obj, "scriptComments").to_vec();

    s.variables = array_field(obj, "variables")
        .iter()
        .filter_map(Value::as_object)
        .map(read_variable)
        .collect();
    s.lists = array_field(obj, "lists")
        .iter()
        .filter_map(Value::as_object)
        .map(read_list)
        .collect();
    s.costumes = array_field(obj, "costumes")
        .iter()
        .filter_map(Value::as_object)
        .map(read_costume)
        .collect();
    s.sounds = array_field(obj, "sounds")
        .iter()
        .filter_map(Value::as_object)
        .map(read_sound)
        .collect();

    let index = obj
        .get("currentCostumeIndex")
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite() && *v >= 0.0 && (*v as usize) < s.costumes.len())
        .map(|v| v as usize)
        .unwrap_or(0);
    s.current_costume_index = Observable::new(index);

    s.extra = extra_fields(obj, &[SCRIPTABLE_KEYS, role_keys]);
    Ok(s)
}

fn read_variable(obj: &Map<String, Value>) -> Variable {
    Variable {
        name: Observable::new(obj.get("name").map(value_to_name).unwrap_or_default()),
        value: obj.get("value").cloned().unwrap_or(json!(0)),
        is_persistent: bool_field(obj, "isPersistent", false),
        extra: extra_fields(obj, &[VARIABLE_KEYS]),
    }
}

fn read_list(obj: &Map<String, Value>) -> List {
    let defaults = ListBox::default();
    List {
        name: Observable::new(obj.get("listName").map(value_to_name).unwrap_or_default()),
        contents: array_field(obj, "contents").to_vec(),
        is_persistent: bool_field(obj, "isPersistent", false),
        layout: ListBox {
            x: f64_field(obj, "x", defaults.x),
            y: f64_field(obj, "y", defaults.y),
            width: f64_field(obj, "width", defaults.width),
            height: f64_field(obj, "height", defaults.height),
            visible: bool_field(obj, "visible", defaults.visible),
        },
        extra: extra_fields(obj, &[LIST_KEYS]),
    }
}

fn read_costume(obj: &Map<String, Value>) -> Costume {
    let declared = obj
        .get("baseLayerMD5")
        .and_then(Value::as_str)
        .map(extension_of)
        .unwrap_or_default();
    let base = AssetRef {
        id: obj.get("baseLayerID").and_then(Value::as_i64).unwrap_or(NO_TEXT_LAYER),
        declared_extension: declared.clone(),
    };
    let text_layer = obj
        .get("textLayerID")
        .and_then(Value::as_i64)
        .filter(|id| *id != NO_TEXT_LAYER)
        .map(|id| {
            let text_declared = obj
                .get("textLayerMD5")
                .and_then(Value::as_str)
                .map(extension_of)
                .filter(|ext| !ext.is_empty())
                .unwrap_or_else(|| declared.clone());
            Payload::Unresolved(AssetRef {
                id,
                declared_extension: text_declared,
            })
        });
    Costume {
        name: Observable::new(obj.get("costumeName").map(value_to_name).unwrap_or_default()),
        payload: Payload::Unresolved(base),
        text_layer,
        bitmap_resolution: f64_field(obj, "bitmapResolution", 1.0),
        rotation_center_x: f64_field(obj, "rotationCenterX", 0.0),
        rotation_center_y: f64_field(obj, "rotationCenterY", 0.0),
        size: Observable::new(None),
        center_on_decode: false,
        extra: extra_fields(obj, &[COSTUME_KEYS]),
    }
}

fn read_sound(obj: &Map<String, Value>) -> Sound {
    let declared = obj
        .get("md5")
        .and_then(Value::as_str)
        .map(extension_of)
        .filter(|ext| !ext.is_empty())
        .unwrap_or_else(|| DEFAULT_SOUND_EXTENSION.to_string());
    Sound {
        name: Observable::new(obj.get("soundName").map(value_to_name).unwrap_or_default()),
        payload: Payload::Unresolved(AssetRef {
            id: obj.get("soundID").and_then(Value::as_i64).unwrap_or(-1),
            declared_extension: declared,
        }),
        extra: extra_fields(obj, &[SOUND_KEYS]),
    }
}

/// Every field not in `known`, minus UI-only `_` fields.
fn extra_fields(obj: &Map<String, Value>, known: &[&[&str]]) -> Map<String, Value> {
    obj.iter()
        .filter(|(k, _)| !k.starts_with('_') && !known.iter().any(|keys| keys.contains(&k.as_str())))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn array_field<'a>(obj: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    obj.get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

fn f64_field(obj: &Map<String, Value>, key: &str, default: f64) -> f64 {
    obj.get(key).and_then(Value::as_f64).unwrap_or(default)
}

fn bool_field(obj: &Map<String, Value>, key: &str, default: bool) -> bool {
    match obj.get(key) {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => default,
    }
}

fn value_to_name(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manifest() -> Value {
        json!({
            "objName": "Stage",
            "tempoBPM": 90,
            "penLayerID": 4,
            "_hasErrors": true,
            "customStageField": "kept",
            "variables": [{"name": "score", "value": 0, "isPersistent": false}],
            "children": [
                {"objName": "Dog", "indexInLibrary": 2, "scripts": [], "costumes": []},
                {"target": "Stage", "cmd": "getVar:", "param": "score", "label": "score"},
                {"objName": "Cat", "indexInLibrary": 1, "currentCostumeIndex": 5,
                 "costumes": [{"costumeName": "c1", "baseLayerID": 1, "baseLayerMD5": "abc.svg",
                               "textLayerID": -1, "rotationCenterX": 3}],
                 "scripts": [[40, 10, [["say:", "b"]]], [0, 10, [["say:", "a"]]], [99, 0, [["say:", "top"]]]]}
            ],
            "costumes": [{"costumeName": "backdrop1", "baseLayerID": 0, "baseLayerMD5": "def.png"}],
            "sounds": [{"soundName": "pop", "soundID": 0, "md5": "123.wav", "rate": 22050}]
        })
    }

    #[test]
    fn partitions_and_orders_sprites_by_library_index() {
        let project = normalize(&manifest()).unwrap();
        assert_eq!(project.sprite_names(), vec!["Cat", "Dog"]);
        assert_eq!(project.children.len(), 3);
        assert_eq!(project.children[0], Child::Sprite(ScriptableId(2)));
        assert!(matches!(project.children[1], Child::Other(_)));
        assert_eq!(project.children[2], Child::Sprite(ScriptableId(1)));
    }

    #[test]
    fn equal_library_indices_keep_array_order() {
        let raw = json!({"children": [
            {"objName": "B", "indexInLibrary": 1},
            {"objName": "A", "indexInLibrary": 1},
            {"objName": "C"}
        ]});
        let project = normalize(&raw).unwrap();
        assert_eq!(project.sprite_names(), vec!["B", "A", "C"]);
    }

    #[test]
    fn fills_missing_collections() {
        let project = normalize(&json!({"children": [{"objName": "Empty"}]})).unwrap();
        let sprite = &project.sprites[0];
        assert!(sprite.scripts.is_empty());
        assert!(sprite.variables.is_empty());
        assert!(sprite.lists.is_empty());
        assert!(sprite.costumes.is_empty());
        assert!(sprite.sounds.is_empty());
        assert_eq!(*sprite.current_costume_index.get(), 0);
    }

    #[test]
    fn clamps_out_of_range_costume_index() {
        let project = normalize(&manifest()).unwrap();
        assert_eq!(*project.sprites[0].current_costume_index.get(), 0);
    }

    #[test]
    fn sorts_scripts_top_to_bottom_then_left_to_right() {
        let project = normalize(&manifest()).unwrap();
        let said = project.sprites[0]
            .scripts
            .iter()
            .map(|s| s.blocks[0].literal_str(0).unwrap().to_string())
            .collect::<Vec<_>>();
        assert_eq!(said, vec!["top", "a", "b"]);
    }

    #[test]
    fn keeps_unknown_fields_and_drops_ui_fields() {
        let project = normalize(&manifest()).unwrap();
        assert_eq!(project.stage.extra.get("customStageField"), Some(&json!("kept")));
        assert!(!project.stage.extra.contains_key("_hasErrors"));
        assert!(!project.stage.extra.contains_key("children"));
        let sound = &project.stage.sounds[0];
        assert_eq!(sound.extra.get("rate"), Some(&json!(22050)));
    }

    #[test]
    fn stage_fields_are_read() {
        let project = normalize(&manifest()).unwrap();
        let info = project.stage.stage_info().unwrap();
        assert_eq!(info.tempo_bpm, 90.0);
        assert_eq!(info.pen_layer_id, 4);
        assert_eq!(info.video_alpha, 0.5);
        assert_eq!(project.stage.name.get(), "Stage");
    }

    #[test]
    fn absent_pen_layer_id_means_no_pen_layer() {
        let project = normalize(&json!({"objName": "Stage", "children": []})).unwrap();
        let info = project.stage.stage_info().unwrap();
        assert_eq!(info.pen_layer_id, crate::model::NO_PEN_LAYER);
    }

    #[test]
    fn asset_references_carry_declared_extension() {
        let project = normalize(&manifest()).unwrap();
        let costume = &project.sprites[0].costumes[0];
        assert_eq!(
            costume.payload,
            Payload::Unresolved(AssetRef {
                id: 1,
                declared_extension: "svg".to_string()
            })
        );
        assert!(costume.text_layer.is_none());
        assert_eq!(costume.rotation_center_x, 3.0);
        assert_eq!(
            project.stage.sounds[0].payload,
            Payload::Unresolved(AssetRef {
                id: 0,
                declared_extension: "wav".to_string()
            })
        );
    }

    #[test]
    fn text_layer_reference_uses_base_extension_by_default() {
        let raw = json!({"costumes": [
            {"costumeName": "t", "baseLayerID": 0, "baseLayerMD5": "x.jpg", "textLayerID": 1}
        ]});
        let project = normalize(&raw).unwrap();
        assert_eq!(
            project.stage.costumes[0].text_layer,
            Some(Payload::Unresolved(AssetRef {
                id: 1,
                declared_extension: "jpg".to_string()
            }))
        );
    }

    #[test]
    fn non_object_root_is_malformed() {
        assert!(matches!(
            normalize(&json!([1, 2])),
            Err(ProjectError::MalformedArchive { .. })
        ));
    }
}
