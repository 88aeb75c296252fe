use crate::codec;
use crate::observable::Observable;
use crate::script::Script;
use serde_json::{json, Map, Value};
use std::sync::Arc;

pub const DEFAULT_PEN_LAYER_MD5: &str = "5c81a336fab8be57adc039a8a2b33ca9.png";
pub const STAGE_NAME: &str = "Stage";

const DEFAULT_BACKDROP_SVG: &str = "<svg version='1.1' xmlns='http://www.w3.org/2000/svg' xmlns:xlink='http://www.w3.org/1999/xlink' width='480px' height='360px'><path fill='#ffffff' d='M 0 0 L 480 0 L 480 360 L 0 360 Z' /></svg>";
const DEFAULT_TURTLE_SVG: &str = "<svg version='1.1' xmlns='http://www.w3.org/2000/svg' xmlns:xlink='http://www.w3.org/1999/xlink' width='25px' height='20px'><path style='fill:#007de0;stroke:#033042;stroke-width:1;stroke-linejoin:round;' d='M 0,0 20,8 0,16 6,8 Z' /></svg>";

/// Identity of a scriptable within one loaded project. The stage is always 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScriptableId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelSize {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: Observable<String>,
    pub value: Value,
    pub is_persistent: bool,
    pub extra: Map<String, Value>,
}

impl Variable {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Observable::new(name.into()),
            value: json!(0),
            is_persistent: false,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub visible: bool,
}

impl Default for ListBox {
    fn default() -> Self {
        Self {
            x: 5.0,
            y: 5.0,
            width: 102.0,
            height: 202.0,
            visible: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct List {
    pub name: Observable<String>,
    pub contents: Vec<Value>,
    pub is_persistent: bool,
    pub layout: ListBox,
    pub extra: Map<String, Value>,
}

impl List {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Observable::new(name.into()),
            contents: Vec::new(),
            is_persistent: false,
            layout: ListBox::default(),
            extra: Map::new(),
        }
    }
}

/// Where an asset's id points inside the archive it was loaded from.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetRef {
    pub id: i64,
    pub declared_extension: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssetData {
    pub extension: String,
    pub bytes: Arc<[u8]>,
}

impl AssetData {
    pub fn new(extension: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            extension: extension.into().to_ascii_lowercase(),
            bytes: bytes.into(),
        }
    }
}

/// Payload of a costume or sound: either still inside the archive or loaded.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Unresolved(AssetRef),
    Resolved(AssetData),
}

impl Payload {
    pub fn data(&self) -> Option<&AssetData> {
        match self {
            Payload::Resolved(data) => Some(data),
            Payload::Unresolved(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Costume {
    pub name: Observable<String>,
    pub payload: Payload,
    pub text_layer: Option<Payload>,
    pub bitmap_resolution: f64,
    pub rotation_center_x: f64,
    pub rotation_center_y: f64,
    /// Decoded pixel dimensions, filled lazily.
    pub size: Observable<Option<PixelSize>>,
    /// Set on costumes created in memory; their rotation center follows the decoded size.
    pub center_on_decode: bool,
    pub extra: Map<String, Value>,
}

impl Costume {
    pub fn new(name: impl Into<String>, extension: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: Observable::new(name.into()),
            payload: Payload::Resolved(AssetData::new(extension, bytes)),
            text_layer: None,
            bitmap_resolution: 1.0,
            rotation_center_x: 0.0,
            rotation_center_y: 0.0,
            size: Observable::new(None),
            center_on_decode: true,
            extra: Map::new(),
        }
    }

    pub fn data_uri(&self) -> Option<String> {
        let data = self.payload.data()?;
        Some(codec::to_data_uri(&codec::image_mime(&data.extension), &data.bytes))
    }

    pub fn apply_size(&mut self, size: PixelSize) {
        if self.center_on_decode {
            self.rotation_center_x = f64::from(size.width) / 2.0;
            self.rotation_center_y = f64::from(size.height) / 2.0;
        }
        self.size.set(Some(size));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sound {
    pub name: Observable<String>,
    pub payload: Payload,
    pub extra: Map<String, Value>,
}

impl Sound {
    pub fn new(name: impl Into<String>, extension: &str, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: Observable::new(name.into()),
            payload: Payload::Resolved(AssetData::new(extension, bytes)),
            extra: Map::new(),
        }
    }

    /// Source for an audio element.
    pub fn data_uri(&self) -> Option<String> {
        let data = self.payload.data()?;
        Some(codec::to_data_uri(&codec::audio_mime(&data.extension), &data.bytes))
    }
}

/// `penLayerID` of a stage that carries no pen layer image.
pub const NO_PEN_LAYER: i64 = -1;

#[derive(Debug, Clone, PartialEq)]
pub struct StageInfo {
    pub pen_layer_md5: String,
    pub pen_layer_id: i64,
    pub pen_layer: Option<Arc<[u8]>>,
    pub tempo_bpm: f64,
    pub video_alpha: f64,
    pub info: Map<String, Value>,
}

impl Default for StageInfo {
    fn default() -> Self {
        let mut info = Map::new();
        info.insert("videoOn".to_string(), json!(false));
        Self {
            pen_layer_md5: DEFAULT_PEN_LAYER_MD5.to_string(),
            pen_layer_id: NO_PEN_LAYER,
            pen_layer: None,
            tempo_bpm: 60.0,
            video_alpha: 0.5,
            info,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SpriteInfo {
    pub index_in_library: f64,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub direction: f64,
    pub rotation_style: String,
    pub is_draggable: bool,
    pub visible: bool,
    pub sprite_info: Value,
}

impl Default for SpriteInfo {
    fn default() -> Self {
        Self {
            index_in_library: 1.0,
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            direction: 90.0,
            rotation_style: "normal".to_string(),
            is_draggable: false,
            visible: true,
            sprite_info: json!({}),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Role {
    Stage(StageInfo),
    Sprite(SpriteInfo),
}

/// Owner of variables, lists, scripts, costumes and sounds: the stage or one sprite.
#[derive(Debug, Clone, PartialEq)]
pub struct Scriptable {
    pub id: ScriptableId,
    pub name: Observable<String>,
    pub role: Role,
    pub variables: Vec<Variable>,
    pub lists: Vec<List>,
    pub scripts: Vec<Script>,
    pub script_comments: Vec<Value>,
    pub costumes: Vec<Costume>,
    pub current_costume_index: Observable<usize>,
    pub sounds: Vec<Sound>,
    pub extra: Map<String, Value>,
}

impl Scriptable {
    pub fn new(id: ScriptableId, name: impl Into<String>, role: Role) -> Self {
        Self {
            id,
            name: Observable::new(name.into()),
            role,
            variables: Vec::new(),
            lists: Vec::new(),
            scripts: Vec::new(),
            script_comments: Vec::new(),
            costumes: Vec::new(),
            current_costume_index: Observable::new(0),
            sounds: Vec::new(),
            extra: Map::new(),
        }
    }

    pub fn is_stage(&self) -> bool {
        matches!(self.role, Role::Stage(_))
    }

    pub fn sprite_info(&self) -> Option<&SpriteInfo> {
        match &self.role {
            Role::Sprite(info) => Some(info),
            Role::Stage(_) => None,
        }
    }

    pub fn stage_info(&self) -> Option<&StageInfo> {
        match &self.role {
            Role::Stage(info) => Some(info),
            Role::Sprite(_) => None,
        }
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.get().clone()).collect()
    }

    pub fn list_names(&self) -> Vec<String> {
        self.lists.iter().map(|l| l.name.get().clone()).collect()
    }

    pub fn find_variable(&self, name: &str) -> Option<&Variable> {
        self.variables.iter().find(|v| v.name.get() == name)
    }

    pub fn find_list(&self, name: &str) -> Option<&List> {
        self.lists.iter().find(|l| l.name.get() == name)
    }
}

/// A child of the stage in manifest order: a sprite, or an object passed through untouched.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Sprite(ScriptableId),
    Other(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Project {
    pub stage: Scriptable,
    /// Sprites in library order.
    pub sprites: Vec<Scriptable>,
    pub children: Vec<Child>,
    next_id: u32,
}

impl Project {
    pub fn with_stage(stage: Scriptable) -> Self {
        Self {
            stage,
            sprites: Vec::new(),
            children: Vec::new(),
            next_id: 1,
        }
    }

    /// A blank project: a white backdrop and one turtle sprite.
    pub fn new() -> Self {
        let mut stage = Scriptable::new(
            ScriptableId(0),
            STAGE_NAME,
            Role::Stage(StageInfo::default()),
        );
        let mut backdrop = Costume::new("backdrop1", "svg", DEFAULT_BACKDROP_SVG.as_bytes());
        backdrop.center_on_decode = false;
        backdrop.rotation_center_x = 240.0;
        backdrop.rotation_center_y = 180.0;
        backdrop.size = Observable::new(Some(PixelSize {
            width: 480,
            height: 360,
        }));
        stage.costumes.push(backdrop);

        let mut project = Self::with_stage(stage);
        let id = project.allocate_id();
        let mut turtle = Scriptable::new(id, "turtle", Role::Sprite(SpriteInfo::default()));
        let mut costume = Costume::new("turtle", "svg", DEFAULT_TURTLE_SVG.as_bytes());
        costume.center_on_decode = false;
        costume.rotation_center_x = 8.0;
        costume.rotation_center_y = 8.0;
        costume.size = Observable::new(Some(PixelSize {
            width: 25,
            height: 20,
        }));
        turtle.costumes.push(costume);
        project.add_sprite(turtle);
        project
    }

    pub fn allocate_id(&mut self) -> ScriptableId {
        let id = ScriptableId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Appends a sprite to the library and to the stage's children.
    pub fn add_sprite(&mut self, sprite: Scriptable) {
        if sprite.id.0 >= self.next_id {
            self.next_id = sprite.id.0 + 1;
        }
        self.children.push(Child::Sprite(sprite.id));
        self.sprites.push(sprite);
    }

    pub fn remove_sprite(&mut self, id: ScriptableId) -> Option<Scriptable> {
        let index = self.sprites.iter().position(|s| s.id == id)?;
        self.children
            .retain(|child| !matches!(child, Child::Sprite(existing) if *existing == id));
        Some(self.sprites.remove(index))
    }

    /// The stage followed by every sprite in library order.
    pub fn scriptables(&self) -> impl Iterator<Item = &Scriptable> {
        std::iter::once(&self.stage).chain(self.sprites.iter())
    }

    pub fn scriptables_mut(&mut self) -> impl Iterator<Item = &mut Scriptable> {
        std::iter::once(&mut self.stage).chain(self.sprites.iter_mut())
    }

    pub fn scriptable(&self, id: ScriptableId) -> Option<&Scriptable> {
        self.scriptables().find(|s| s.id == id)
    }

    pub fn scriptable_mut(&mut self, id: ScriptableId) -> Option<&mut Scriptable> {
        self.scriptables_mut().find(|s| s.id == id)
    }

    pub fn sprite_by_name(&self, name: &str) -> Option<&Scriptable> {
        self.sprites.iter().find(|s| s.name.get() == name)
    }

    pub fn sprite_names(&self) -> Vec<String> {
        self.sprites.iter().map(|s| s.name.get().clone()).collect()
    }

    pub fn script_count(&self) -> usize {
        self.scriptables().map(|s| s.scripts.len()).sum()
    }
}

impl Default for Project {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_project_has_stage_and_turtle() {
        let project = Project::new();
        assert!(project.stage.is_stage());
        assert_eq!(project.stage.name.get(), "Stage");
        assert_eq!(project.sprite_names(), vec!["turtle"]);
        assert_eq!(project.children, vec![Child::Sprite(ScriptableId(1))]);
        assert_eq!(project.stage.costumes[0].name.get(), "backdrop1");
    }

    #[test]
    fn scriptables_visits_stage_first() {
        let mut project = Project::new();
        let id = project.allocate_id();
        project.add_sprite(Scriptable::new(id, "Cat", Role::Sprite(SpriteInfo::default())));
        let names = project
            .scriptables()
            .map(|s| s.name.get().clone())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["Stage", "turtle", "Cat"]);
    }

    #[test]
    fn remove_sprite_drops_child_slot() {
        let mut project = Project::new();
        let removed = project.remove_sprite(ScriptableId(1)).unwrap();
        assert_eq!(removed.name.get(), "turtle");
        assert!(project.sprites.is_empty());
        assert!(project.children.is_empty());
    }

    #[test]
    fn new_costume_centers_on_decoded_size() {
        let mut costume = Costume::new("c", "PNG", vec![1u8, 2, 3]);
        assert_eq!(costume.payload.data().unwrap().extension, "png");
        costume.apply_size(PixelSize {
            width: 40,
            height: 30,
        });
        assert_eq!(costume.rotation_center_x, 20.0);
        assert_eq!(costume.rotation_center_y, 15.0);
        assert_eq!(*costume.size.get(), Some(PixelSize { width: 40, height: 30 }));
    }

    #[test]
    fn sound_data_uri_uses_audio_mime() {
        let sound = Sound::new("pop", "wav", vec![0u8; 3]);
        assert_eq!(sound.data_uri().unwrap(), "data:audio/wav;base64,AAAA");
    }
}
