use crate::error::ProjectError;
use serde_json::{json, Value};
use std::cmp::Ordering;

/// Attributes `getAttribute:of:` reads from the target itself rather than from a variable.
const BUILTIN_ATTRIBUTES: &[&str] = &[
    "x position",
    "y position",
    "direction",
    "costume #",
    "costume name",
    "size",
    "volume",
    "backdrop #",
    "backdrop name",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefKind {
    Variable,
    List,
    Parameter,
    Custom,
}

impl RefKind {
    pub fn label(self) -> &'static str {
        match self {
            RefKind::Variable => "variable",
            RefKind::List => "list",
            RefKind::Parameter => "parameter",
            RefKind::Custom => "custom",
        }
    }
}

/// One identifier occurrence inside a script tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    pub kind: RefKind,
    pub name: String,
    pub target: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Literal(Value),
    Block(Box<Block>),
    Stack(Vec<Block>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub selector: String,
    pub args: Vec<Arg>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Script {
    pub x: f64,
    pub y: f64,
    pub blocks: Vec<Block>,
}

impl Block {
    pub fn new(selector: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            selector: selector.into(),
            args,
        }
    }

    pub fn from_value(value: &Value) -> Result<Self, ProjectError> {
        let items = value
            .as_array()
            .ok_or_else(|| ProjectError::malformed(format!("Block is not an array: {}", value)))?;
        let selector = items
            .first()
            .and_then(Value::as_str)
            .ok_or_else(|| ProjectError::malformed(format!("Block has no selector: {}", value)))?
            .to_string();
        let literal_args = selector == "procDef";
        let mut args = Vec::with_capacity(items.len().saturating_sub(1));
        for item in &items[1..] {
            if literal_args {
                args.push(Arg::Literal(item.clone()));
            } else {
                args.push(arg_from_value(item)?);
            }
        }
        Ok(Self { selector, args })
    }

    pub fn to_value(&self) -> Value {
        let mut out = Vec::with_capacity(self.args.len() + 1);
        out.push(Value::String(self.selector.clone()));
        for arg in &self.args {
            out.push(match arg {
                Arg::Literal(v) => v.clone(),
                Arg::Block(block) => block.to_value(),
                Arg::Stack(blocks) => Value::Array(blocks.iter().map(Block::to_value).collect()),
            });
        }
        Value::Array(out)
    }

    pub fn literal_str(&self, index: usize) -> Option<&str> {
        match self.args.get(index) {
            Some(Arg::Literal(Value::String(s))) => Some(s.as_str()),
            _ => None,
        }
    }
}

fn arg_from_value(value: &Value) -> Result<Arg, ProjectError> {
    let Some(items) = value.as_array() else {
        return Ok(Arg::Literal(value.clone()));
    };
    if items.is_empty() {
        return Ok(Arg::Stack(Vec::new()));
    }
    if items[0].is_string() {
        return Ok(Arg::Block(Box::new(Block::from_value(value)?)));
    }
    if items.iter().all(Value::is_array) {
        let blocks = items
            .iter()
            .map(Block::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Arg::Stack(blocks));
    }
    Ok(Arg::Literal(value.clone()))
}

impl Script {
    pub fn new(x: f64, y: f64, blocks: Vec<Block>) -> Self {
        Self { x, y, blocks }
    }

    pub fn from_value(value: &Value) -> Result<Self, ProjectError> {
        let items = value
            .as_array()
            .filter(|items| items.len() >= 3)
            .ok_or_else(|| ProjectError::malformed(format!("Script is not [x, y, blocks]: {}", value)))?;
        let x = items[0].as_f64().unwrap_or(0.0);
        let y = items[1].as_f64().unwrap_or(0.0);
        let blocks = items[2]
            .as_array()
            .ok_or_else(|| ProjectError::malformed("Script body is not an array."))?
            .iter()
            .map(Block::from_value)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { x, y, blocks })
    }

    pub fn to_value(&self) -> Value {
        json!([
            number_value(self.x),
            number_value(self.y),
            self.blocks.iter().map(Block::to_value).collect::<Vec<_>>()
        ])
    }

    /// Canvas order: top to bottom, then left to right.
    pub fn position_cmp(&self, other: &Script) -> Ordering {
        self.y
            .partial_cmp(&other.y)
            .unwrap_or(Ordering::Equal)
            .then(self.x.partial_cmp(&other.x).unwrap_or(Ordering::Equal))
    }

    pub fn first_block(&self) -> Option<&Block> {
        self.blocks.first()
    }
}

pub fn number_value(v: f64) -> Value {
    if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.0e15 {
        json!(v as i64)
    } else {
        json!(v)
    }
}

fn reference_site(selector: &str) -> Option<(RefKind, usize)> {
    let site = match selector {
        "readVariable" | "setVar:to:" | "changeVar:by:" | "showVariable:" | "hideVariable:" => {
            (RefKind::Variable, 0)
        }
        "contentsOfList:" | "lineCountOfList:" | "showList:" | "hideList:" | "list:contains:" => {
            (RefKind::List, 0)
        }
        "append:toList:" | "deleteLine:ofList:" | "getLine:ofList:" | "setLine:ofList:to:" => {
            (RefKind::List, 1)
        }
        "insert:at:ofList:" => (RefKind::List, 2),
        "getParam" => (RefKind::Parameter, 0),
        "call" => (RefKind::Custom, 0),
        _ => return None,
    };
    Some(site)
}

/// Returns a copy of `script` with every identifier reference passed through `mapping`.
///
/// `mapping(kind, name, target)` returns the replacement name, or `None` to keep the
/// original. `target` is set when the reference names another scriptable explicitly.
pub fn rewrite<F>(script: &Script, mapping: &mut F) -> Script
where
    F: FnMut(RefKind, &str, Option<&str>) -> Option<String>,
{
    Script {
        x: script.x,
        y: script.y,
        blocks: rewrite_blocks(&script.blocks, mapping),
    }
}

pub fn rewrite_blocks<F>(blocks: &[Block], mapping: &mut F) -> Vec<Block>
where
    F: FnMut(RefKind, &str, Option<&str>) -> Option<String>,
{
    blocks.iter().map(|b| rewrite_block(b, mapping)).collect()
}

fn rewrite_block<F>(block: &Block, mapping: &mut F) -> Block
where
    F: FnMut(RefKind, &str, Option<&str>) -> Option<String>,
{
    let mut args = block.args.clone();
    match block.selector.as_str() {
        "procDef" => {
            map_literal(&mut args, 0, RefKind::Custom, None, mapping);
            if let Some(Arg::Literal(Value::Array(names))) = args.get_mut(1) {
                for name in names.iter_mut() {
                    if let Value::String(raw) = name {
                        if let Some(mapped) = mapping(RefKind::Parameter, raw.as_str(), None) {
                            *raw = mapped;
                        }
                    }
                }
            }
        }
        "getAttribute:of:" => {
            let target = block.literal_str(1).map(ToString::to_string);
            let is_variable = block
                .literal_str(0)
                .map(|attr| !BUILTIN_ATTRIBUTES.contains(&attr))
                .unwrap_or(false);
            if let (true, Some(target)) = (is_variable, target) {
                map_literal(&mut args, 0, RefKind::Variable, Some(target.as_str()), mapping);
            }
        }
        selector => {
            if let Some((kind, index)) = reference_site(selector) {
                map_literal(&mut args, index, kind, None, mapping);
            }
        }
    }

    let args = args
        .into_iter()
        .map(|arg| match arg {
            Arg::Block(inner) => Arg::Block(Box::new(rewrite_block(&inner, mapping))),
            Arg::Stack(inner) => Arg::Stack(rewrite_blocks(&inner, mapping)),
            literal => literal,
        })
        .collect();
    Block {
        selector: block.selector.clone(),
        args,
    }
}

fn map_literal<F>(args: &mut [Arg], index: usize, kind: RefKind, target: Option<&str>, mapping: &mut F)
where
    F: FnMut(RefKind, &str, Option<&str>) -> Option<String>,
{
    if let Some(Arg::Literal(Value::String(name))) = args.get_mut(index) {
        if let Some(mapped) = mapping(kind, name.as_str(), target) {
            *name = mapped;
        }
    }
}

/// Every reference in the script, in traversal order.
pub fn references(script: &Script) -> Vec<Reference> {
    let mut out = Vec::new();
    let mut record = |kind: RefKind, name: &str, target: Option<&str>| {
        out.push(Reference {
            kind,
            name: name.to_string(),
            target: target.map(ToString::to_string),
        });
        None
    };
    rewrite(script, &mut record);
    out
}
