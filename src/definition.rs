use crate::error::ProjectError;
use crate::script::{Arg, Script};
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;

/// Whitespace and control character runs inside a custom block spec.
const SPEC_WHITESPACE_PATTERN: &str = r"[\s\p{Cc}]+";

/// Spec used for a custom block whose spec is blank.
pub const BLANK_SPEC: &str = "block";

/// A `procDef` header: the spec string plus the parameter names bound to its input slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Definition {
    pub signature: String,
    pub params: Vec<String>,
}

/// Reads `procDef` headers and canonicalizes custom block specs.
///
/// Built once per resolution run and passed to whoever needs it.
#[derive(Debug, Clone)]
pub struct DefinitionParser {
    whitespace: Regex,
}

impl DefinitionParser {
    pub fn new() -> Self {
        Self {
            whitespace: Regex::new(SPEC_WHITESPACE_PATTERN).expect("spec whitespace pattern is valid"),
        }
    }

    /// Collapses whitespace runs to one space and trims the ends.
    pub fn collapse(&self, text: &str) -> String {
        self.whitespace.replace_all(text, " ").trim().to_string()
    }

    /// The spec a definition and its call sites share once cleaned.
    pub fn canonical_signature(&self, spec: &str) -> String {
        let collapsed = self.collapse(spec);
        if collapsed.is_empty() {
            BLANK_SPEC.to_string()
        } else {
            collapsed
        }
    }

    /// Reads the definition header when the script starts with `procDef`.
    pub fn parse_header(&self, script: &Script) -> Option<Definition> {
        let first = script.first_block()?;
        if first.selector != "procDef" {
            return None;
        }
        Some(Definition {
            signature: first.literal_str(0)?.to_string(),
            params: string_list(first.args.get(1)),
        })
    }

    /// Collects the definitions of one scriptable, keyed by canonical signature.
    ///
    /// Specs that differ only in whitespace are the same block. The same block may
    /// be defined more than once as long as every copy binds the same parameter
    /// names; otherwise a call site could bind to either list.
    pub fn collect(&self, scripts: &[Script]) -> Result<BTreeMap<String, Definition>, ProjectError> {
        let mut grouped: BTreeMap<String, Vec<Definition>> = BTreeMap::new();
        for script in scripts {
            if let Some(definition) = self.parse_header(script) {
                grouped
                    .entry(self.canonical_signature(&definition.signature))
                    .or_default()
                    .push(definition);
            }
        }

        let mut out = BTreeMap::new();
        for (signature, candidates) in grouped {
            let mut distinct: Vec<Vec<String>> = Vec::new();
            for candidate in &candidates {
                let params: Vec<String> = candidate.params.iter().map(|p| self.collapse(p)).collect();
                if !distinct.contains(&params) {
                    distinct.push(params);
                }
            }
            if distinct.len() > 1 {
                return Err(ProjectError::AmbiguousDefinition {
                    signature,
                    candidates: distinct.len(),
                });
            }
            if let Some(first) = candidates.into_iter().next() {
                out.insert(signature, first);
            }
        }
        Ok(out)
    }
}

impl Default for DefinitionParser {
    fn default() -> Self {
        Self::new()
    }
}

fn string_list(arg: Option<&Arg>) -> Vec<String> {
    match arg {
        Some(Arg::Literal(Value::Array(items))) => items
            .iter()
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        _ => Vec::new(),
    }
}
