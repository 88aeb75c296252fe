//! Scope-aware identifier canonicalization.
//!
//! The stage is the global scope and each sprite a local scope nested inside it.
//! Variables and lists are checked independently; parameters are scoped to the
//! custom block definition that declares them. Processing visits the stage first,
//! so the global names are final before any sprite is looked at and a local name
//! always yields to a global one.

use crate::definition::{DefinitionParser, BLANK_SPEC};
use crate::error::ProjectError;
use crate::model::{Child, List, Project, ScriptableId, Variable, STAGE_NAME};
use crate::script::{references, rewrite, Arg, RefKind};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

pub const MAX_SUFFIX_ATTEMPTS: usize = 10_000;

/// Target name the manifest uses for the stage in `getAttribute:of:` blocks.
const STAGE_TARGET: &str = "_stage_";

/// Canonical form of `raw` that is absent from both seen sets.
///
/// Whitespace runs collapse to one space and the ends are trimmed; an empty result
/// becomes a per-kind default. Collisions append the lowest free integer from 2.
pub fn clean_name(
    kind: RefKind,
    raw: &str,
    local_seen: &HashSet<String>,
    global_seen: &HashSet<String>,
) -> Result<String, ProjectError> {
    clean_name_bounded(kind, raw, local_seen, global_seen, MAX_SUFFIX_ATTEMPTS)
}

pub fn clean_name_bounded(
    kind: RefKind,
    raw: &str,
    local_seen: &HashSet<String>,
    global_seen: &HashSet<String>,
    max_attempts: usize,
) -> Result<String, ProjectError> {
    let mut base = collapse_whitespace(raw);
    if base.is_empty() {
        base = default_name(kind).to_string();
    }
    let taken = |candidate: &str| local_seen.contains(candidate) || global_seen.contains(candidate);
    if !taken(&base) {
        return Ok(base);
    }
    for suffix in 2..(2 + max_attempts) {
        let candidate = format!("{}{}", base, suffix);
        if !taken(&candidate) {
            return Ok(candidate);
        }
    }
    Err(ProjectError::NameCollisionUnresolvable {
        kind: kind.label().to_string(),
        name: base,
        attempts: max_attempts,
    })
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split(|c: char| c.is_whitespace() || c.is_control())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

fn default_name(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Variable => "var",
        RefKind::List => "list",
        RefKind::Parameter => "arg",
        RefKind::Custom => BLANK_SPEC,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rename {
    pub kind: RefKind,
    pub from: String,
    pub to: String,
}

/// What resolution did to one scriptable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeReport {
    pub id: ScriptableId,
    pub name: String,
    pub created_variables: Vec<String>,
    pub created_lists: Vec<String>,
    pub renames: Vec<Rename>,
}

impl ScopeReport {
    pub fn is_clean(&self) -> bool {
        self.created_variables.is_empty() && self.created_lists.is_empty() && self.renames.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameReport {
    pub scopes: Vec<ScopeReport>,
    pub renamed_watchers: usize,
}

impl NameReport {
    pub fn is_clean(&self) -> bool {
        self.renamed_watchers == 0 && self.scopes.iter().all(ScopeReport::is_clean)
    }

    pub fn rename_count(&self) -> usize {
        self.scopes.iter().map(|s| s.renames.len()).sum()
    }

    pub fn created_count(&self) -> usize {
        self.scopes
            .iter()
            .map(|s| s.created_variables.len() + s.created_lists.len())
            .sum()
    }
}

/// Raw name to canonical name tables for one scriptable.
#[derive(Debug, Clone, Default)]
struct ScopeMapping {
    variables: HashMap<String, String>,
    lists: HashMap<String, String>,
    /// Keyed by canonical definition signature.
    parameters: HashMap<String, ParameterTable>,
    custom: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
struct ParameterTable {
    /// Keyed by the whitespace-collapsed raw name, so copies of a definition
    /// that differ only in whitespace share one table.
    by_raw: HashMap<String, String>,
    /// Canonical names in declaration order.
    declared: Vec<String>,
}

impl ScopeMapping {
    fn lookup(&self, kind: RefKind, name: &str) -> Option<&String> {
        match kind {
            RefKind::Variable => self.variables.get(name),
            RefKind::List => self.lists.get(name),
            RefKind::Parameter | RefKind::Custom => None,
        }
    }
}

/// Declares implicitly referenced variables and lists, canonicalizes every
/// declared identifier, and rewrites all scripts and watchers to match.
pub fn resolve_names(project: &mut Project, parser: &DefinitionParser) -> Result<NameReport, ProjectError> {
    let empty = HashSet::new();
    let mut stage_raw_variables: HashSet<String> = HashSet::new();
    let mut stage_raw_lists: HashSet<String> = HashSet::new();
    let mut stage_seen_variables: HashSet<String> = HashSet::new();
    let mut stage_seen_lists: HashSet<String> = HashSet::new();

    let mut mappings = Vec::new();
    let mut report = NameReport::default();

    for s in project.scriptables_mut() {
        let is_stage = s.is_stage();
        let mut scope = ScopeReport {
            id: s.id,
            name: s.name.get().clone(),
            created_variables: Vec::new(),
            created_lists: Vec::new(),
            renames: Vec::new(),
        };
        let mut mapping = ScopeMapping::default();

        // Discovery: declare on first use, as the editor historically did for
        // scripts dragged between sprites.
        let mut raw_variables: HashSet<String> = s.variable_names().into_iter().collect();
        let mut raw_lists: HashSet<String> = s.list_names().into_iter().collect();
        for script in &s.scripts {
            for reference in references(script) {
                if reference.target.is_some() {
                    continue;
                }
                let name = reference.name;
                match reference.kind {
                    RefKind::Variable => {
                        if !raw_variables.contains(&name) && !stage_raw_variables.contains(&name) {
                            s.variables.push(Variable::new(name.clone()));
                            scope.created_variables.push(name.clone());
                            raw_variables.insert(name);
                        }
                    }
                    RefKind::List => {
                        if !raw_lists.contains(&name) && !stage_raw_lists.contains(&name) {
                            s.lists.push(List::new(name.clone()));
                            scope.created_lists.push(name.clone());
                            raw_lists.insert(name);
                        }
                    }
                    RefKind::Custom => {
                        if !mapping.custom.contains_key(&name) {
                            let cleaned = parser.canonical_signature(&name);
                            if cleaned != name {
                                scope.renames.push(Rename {
                                    kind: RefKind::Custom,
                                    from: name.clone(),
                                    to: cleaned.clone(),
                                });
                            }
                            mapping.custom.insert(name, cleaned);
                        }
                    }
                    RefKind::Parameter => {}
                }
            }
        }
        if is_stage {
            stage_raw_variables = raw_variables;
            stage_raw_lists = raw_lists;
        }

        // Canonicalization: variables and lists are separate namespaces.
        let (global_variables, global_lists) = if is_stage {
            (&empty, &empty)
        } else {
            (&stage_seen_variables, &stage_seen_lists)
        };
        let mut seen_variables = HashSet::new();
        for variable in s.variables.iter_mut() {
            let raw = variable.name.get().clone();
            let canonical = clean_name(RefKind::Variable, &raw, &seen_variables, global_variables)?;
            seen_variables.insert(canonical.clone());
            mapping
                .variables
                .entry(raw.clone())
                .or_insert_with(|| canonical.clone());
            if canonical != raw {
                scope.renames.push(Rename {
                    kind: RefKind::Variable,
                    from: raw,
                    to: canonical.clone(),
                });
                variable.name.set(canonical);
            }
        }
        let mut seen_lists = HashSet::new();
        for list in s.lists.iter_mut() {
            let raw = list.name.get().clone();
            let canonical = clean_name(RefKind::List, &raw, &seen_lists, global_lists)?;
            seen_lists.insert(canonical.clone());
            mapping
                .lists
                .entry(raw.clone())
                .or_insert_with(|| canonical.clone());
            if canonical != raw {
                scope.renames.push(Rename {
                    kind: RefKind::List,
                    from: raw,
                    to: canonical.clone(),
                });
                list.name.set(canonical);
            }
        }
        if is_stage {
            stage_seen_variables = seen_variables;
            stage_seen_lists = seen_lists;
        }

        // Parameters: one seen set per definition.
        for (signature, definition) in parser.collect(&s.scripts)? {
            let mut seen = HashSet::new();
            let mut table = ParameterTable::default();
            for raw in definition.params {
                let canonical = clean_name(RefKind::Parameter, &raw, &seen, &empty)?;
                seen.insert(canonical.clone());
                if canonical != raw {
                    scope.renames.push(Rename {
                        kind: RefKind::Parameter,
                        from: raw.clone(),
                        to: canonical.clone(),
                    });
                }
                table.declared.push(canonical.clone());
                table.by_raw.entry(parser.collapse(&raw)).or_insert(canonical);
            }
            mapping.parameters.insert(signature, table);
        }

        mappings.push(mapping);
        report.scopes.push(scope);
    }

    let mut scope_index: HashMap<String, usize> = HashMap::new();
    scope_index.insert(STAGE_TARGET.to_string(), 0);
    scope_index.insert(STAGE_NAME.to_string(), 0);
    for (i, name) in project.sprite_names().into_iter().enumerate() {
        scope_index.entry(name).or_insert(i + 1);
    }

    for (i, s) in project.scriptables_mut().enumerate() {
        let own = &mappings[i];
        let global = &mappings[0];
        let mut rewritten = Vec::with_capacity(s.scripts.len());
        for script in &s.scripts {
            let params = parser
                .parse_header(script)
                .and_then(|definition| {
                    own.parameters
                        .get(&parser.canonical_signature(&definition.signature))
                });
            let mut map = |kind: RefKind, name: &str, target: Option<&str>| -> Option<String> {
                match kind {
                    RefKind::Parameter => params
                        .and_then(|p| p.by_raw.get(&parser.collapse(name)))
                        .cloned(),
                    RefKind::Custom => own.custom.get(name).cloned(),
                    RefKind::Variable | RefKind::List => {
                        let scope = match target {
                            Some(target) => &mappings[*scope_index.get(target)?],
                            None => own,
                        };
                        scope
                            .lookup(kind, name)
                            .or_else(|| global.lookup(kind, name))
                            .cloned()
                    }
                }
            };
            let mut script = rewrite(script, &mut map);
            if let (Some(table), Some(header)) = (params, script.blocks.first_mut()) {
                // Duplicate raw names map to one entry; the header keeps them distinct.
                if let Some(names) = header.args.get_mut(1) {
                    *names = Arg::Literal(Value::Array(
                        table.declared.iter().cloned().map(Value::String).collect(),
                    ));
                }
            }
            rewritten.push(script);
        }
        s.scripts = rewritten;
    }

    for child in project.children.iter_mut() {
        if let Child::Other(watcher) = child {
            if rename_watcher(watcher, &mappings, &scope_index) {
                report.renamed_watchers += 1;
            }
        }
    }

    Ok(report)
}

/// Points a variable watcher at its canonical name and recomputes its label.
///
/// Returns whether the watcher changed.
fn rename_watcher(watcher: &mut Value, mappings: &[ScopeMapping], scope_index: &HashMap<String, usize>) -> bool {
    let Some(obj) = watcher.as_object_mut() else {
        return false;
    };
    if obj.get("cmd").and_then(Value::as_str) != Some("getVar:") {
        return false;
    }
    let Some(target) = obj.get("target").and_then(Value::as_str).map(ToString::to_string) else {
        return false;
    };
    let Some(index) = scope_index.get(&target) else {
        return false;
    };
    let Some(param) = obj.get("param").and_then(Value::as_str).map(ToString::to_string) else {
        return false;
    };
    let canonical = mappings[*index]
        .variables
        .get(&param)
        .cloned()
        .unwrap_or_else(|| param.clone());
    let label = if *index == 0 {
        canonical.clone()
    } else {
        format!("{}: {}", target, canonical)
    };
    if canonical == param && obj.get("label").and_then(Value::as_str) == Some(label.as_str()) {
        return false;
    }
    obj.insert("param".to_string(), Value::String(canonical));
    obj.insert("label".to_string(), Value::String(label));
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;
    use crate::script::Script;
    use serde_json::json;

    fn resolved(manifest: Value) -> (Project, NameReport) {
        let mut project = normalize(&manifest).unwrap();
        let report = resolve_names(&mut project, &DefinitionParser::new()).unwrap();
        (project, report)
    }

    fn script_json(script: &Script) -> Value {
        script.to_value()
    }

    #[test]
    fn clean_name_collapses_whitespace() {
        let none = HashSet::new();
        assert_eq!(
            clean_name(RefKind::Variable, "  my \t  score\n", &none, &none).unwrap(),
            "my score"
        );
    }

    #[test]
    fn clean_name_substitutes_default_for_empty() {
        let none = HashSet::new();
        assert_eq!(clean_name(RefKind::Variable, "   ", &none, &none).unwrap(), "var");
        assert_eq!(clean_name(RefKind::List, "", &none, &none).unwrap(), "list");
        assert_eq!(clean_name(RefKind::Parameter, "", &none, &none).unwrap(), "arg");
    }

    #[test]
    fn clean_name_picks_lowest_free_suffix() {
        let local: HashSet<String> = ["score".to_string(), "score3".to_string()].into_iter().collect();
        let global: HashSet<String> = ["score2".to_string()].into_iter().collect();
        assert_eq!(
            clean_name(RefKind::Variable, "score", &local, &global).unwrap(),
            "score4"
        );
    }

    #[test]
    fn clean_name_gives_up_after_bounded_attempts() {
        let local: HashSet<String> = ["x", "x2", "x3"].iter().map(|s| s.to_string()).collect();
        let err = clean_name_bounded(RefKind::Variable, "x", &local, &HashSet::new(), 2).unwrap_err();
        assert!(matches!(err, ProjectError::NameCollisionUnresolvable { attempts: 2, .. }));
    }

    #[test]
    fn local_variable_yields_to_global() {
        let (project, _) = resolved(json!({
            "variables": [{"name": "score", "value": 0}],
            "scripts": [[0, 0, [["whenGreenFlag"], ["setVar:to:", "score", 0]]]],
            "children": [{
                "objName": "Cat",
                "variables": [{"name": "score", "value": 5}],
                "scripts": [[0, 0, [["whenGreenFlag"], ["changeVar:by:", "score", 1]]]]
            }]
        }));
        assert_eq!(project.stage.variable_names(), vec!["score"]);
        assert_eq!(project.sprites[0].variable_names(), vec!["score2"]);
        assert_eq!(
            script_json(&project.sprites[0].scripts[0]),
            json!([0, 0, [["whenGreenFlag"], ["changeVar:by:", "score2", 1]]])
        );
        assert_eq!(
            script_json(&project.stage.scripts[0]),
            json!([0, 0, [["whenGreenFlag"], ["setVar:to:", "score", 0]]])
        );
    }

    #[test]
    fn undeclared_list_is_created_on_referencing_sprite() {
        let (project, report) = resolved(json!({
            "children": [{
                "objName": "Dog",
                "scripts": [[0, 0, [["append:toList:", 10, "high-scores"]]]]
            }]
        }));
        let dog = &project.sprites[0];
        assert_eq!(dog.list_names(), vec!["high-scores"]);
        assert!(project.stage.lists.is_empty());
        assert_eq!(report.scopes[1].created_lists, vec!["high-scores"]);
        assert_eq!(
            script_json(&dog.scripts[0]),
            json!([0, 0, [["append:toList:", 10, "high-scores"]]])
        );
    }

    #[test]
    fn references_to_globals_are_not_redeclared() {
        let (project, report) = resolved(json!({
            "variables": [{"name": "lives", "value": 3}],
            "lists": [{"listName": "log", "contents": []}],
            "children": [{
                "objName": "Cat",
                "scripts": [[0, 0, [["setVar:to:", "lives", ["lineCountOfList:", "log"]]]]]
            }]
        }));
        assert!(project.sprites[0].variables.is_empty());
        assert!(project.sprites[0].lists.is_empty());
        assert_eq!(report.created_count(), 0);
    }

    #[test]
    fn variables_and_lists_may_share_a_name() {
        let (project, report) = resolved(json!({
            "variables": [{"name": "items"}],
            "lists": [{"listName": "items"}]
        }));
        assert_eq!(project.stage.variable_names(), vec!["items"]);
        assert_eq!(project.stage.list_names(), vec!["items"]);
        assert!(report.is_clean());
    }

    #[test]
    fn duplicate_global_declarations_are_suffixed() {
        let (project, _) = resolved(json!({
            "variables": [{"name": "a"}, {"name": "a"}, {"name": " a "}],
            "scripts": [[0, 0, [["readVariable", "a"]]]]
        }));
        assert_eq!(project.stage.variable_names(), vec!["a", "a2", "a3"]);
        assert_eq!(script_json(&project.stage.scripts[0]), json!([0, 0, [["readVariable", "a"]]]));
    }

    #[test]
    fn parameters_are_isolated_per_definition() {
        let (project, report) = resolved(json!({
            "children": [{
                "objName": "Cat",
                "variables": [{"name": "n"}],
                "scripts": [
                    [0, 0, [["procDef", "jump %n", ["n"], [0], false], ["changeYBy:", ["getParam", "n", "r"]]]],
                    [0, 100, [["procDef", "walk %n", ["n"], [0], false], ["forward:", ["getParam", "n", "r"]]]]
                ]
            }]
        }));
        let cat = &project.sprites[0];
        assert_eq!(
            script_json(&cat.scripts[0]),
            json!([0, 0, [["procDef", "jump %n", ["n"], [0], false], ["changeYBy:", ["getParam", "n", "r"]]]])
        );
        assert_eq!(
            script_json(&cat.scripts[1]),
            json!([0, 100, [["procDef", "walk %n", ["n"], [0], false], ["forward:", ["getParam", "n", "r"]]]])
        );
        assert!(report.is_clean());
    }

    #[test]
    fn duplicate_parameters_within_definition_are_suffixed() {
        let (project, _) = resolved(json!({
            "scripts": [[0, 0, [
                ["procDef", "add %n %n", ["x", "x"], [0, 0], false],
                ["say:", ["getParam", "x", "r"]]
            ]]]
        }));
        assert_eq!(
            script_json(&project.stage.scripts[0]),
            json!([0, 0, [["procDef", "add %n %n", ["x", "x2"], [0, 0], false], ["say:", ["getParam", "x", "r"]]]])
        );
    }

    #[test]
    fn custom_block_specs_are_cleaned_at_definition_and_call() {
        let (project, report) = resolved(json!({
            "scripts": [
                [0, 0, [["procDef", "jump  %n   high", ["h"], [0], false]]],
                [0, 50, [["whenGreenFlag"], ["call", "jump  %n   high", 5]]]
            ]
        }));
        assert_eq!(
            script_json(&project.stage.scripts[0]),
            json!([0, 0, [["procDef", "jump %n high", ["h"], [0], false]]])
        );
        assert_eq!(
            script_json(&project.stage.scripts[1]),
            json!([0, 50, [["whenGreenFlag"], ["call", "jump %n high", 5]]])
        );
        assert_eq!(report.rename_count(), 1);
    }

    #[test]
    fn ambiguous_definition_aborts_resolution() {
        let mut project = normalize(&json!({
            "scripts": [
                [0, 0, [["procDef", "go %n", ["a"], [0], false]]],
                [0, 50, [["procDef", "go %n", ["b"], [0], false]]]
            ]
        }))
        .unwrap();
        let err = resolve_names(&mut project, &DefinitionParser::new()).unwrap_err();
        assert_eq!(
            err,
            ProjectError::AmbiguousDefinition {
                signature: "go %n".to_string(),
                candidates: 2
            }
        );
    }

    #[test]
    fn explicit_target_uses_that_sprites_mapping() {
        let (project, _) = resolved(json!({
            "scripts": [[0, 0, [["say:", ["getAttribute:of:", "hp", "Cat"]]]]],
            "variables": [{"name": "hp"}],
            "children": [{"objName": "Cat", "variables": [{"name": "hp"}]}]
        }));
        assert_eq!(project.sprites[0].variable_names(), vec!["hp2"]);
        assert_eq!(
            script_json(&project.stage.scripts[0]),
            json!([0, 0, [["say:", ["getAttribute:of:", "hp2", "Cat"]]]])
        );
    }

    #[test]
    fn watchers_follow_renamed_variables() {
        let (project, report) = resolved(json!({
            "variables": [{"name": "hp"}],
            "children": [
                {"objName": "Cat", "variables": [{"name": "hp"}]},
                {"target": "Cat", "cmd": "getVar:", "param": "hp", "label": "Cat: hp"},
                {"target": "Stage", "cmd": "getVar:", "param": "hp", "label": "hp"}
            ]
        }));
        assert_eq!(report.renamed_watchers, 1);
        match &project.children[1] {
            Child::Other(w) => {
                assert_eq!(w["param"], "hp2");
                assert_eq!(w["label"], "Cat: hp2");
            }
            other => panic!("expected watcher, got {:?}", other),
        }
        match &project.children[2] {
            Child::Other(w) => assert_eq!(w["param"], "hp"),
            other => panic!("expected watcher, got {:?}", other),
        }
    }

    #[test]
    fn stale_watcher_labels_are_recomputed() {
        let (project, report) = resolved(json!({
            "variables": [{"name": "score"}],
            "children": [
                {"target": "Stage", "cmd": "getVar:", "param": "score", "label": "Cat: score"},
                {"objName": "Cat", "variables": [{"name": "lives"}]},
                {"target": "Cat", "cmd": "getVar:", "param": "lives"}
            ]
        }));
        assert_eq!(report.renamed_watchers, 2);
        match &project.children[0] {
            Child::Other(w) => {
                assert_eq!(w["param"], "score");
                assert_eq!(w["label"], "score");
            }
            other => panic!("expected watcher, got {:?}", other),
        }
        match &project.children[2] {
            Child::Other(w) => assert_eq!(w["label"], "Cat: lives"),
            other => panic!("expected watcher, got {:?}", other),
        }
    }

    #[test]
    fn whitespace_variant_definitions_resolve_twice() {
        let (mut project, _) = resolved(json!({
            "children": [{
                "objName": "Cat",
                "scripts": [
                    [0, 0, [["procDef", "jump  %n", ["h "], [0], false],
                            ["changeYposBy:", ["getParam", "h ", "r"]]]],
                    [0, 90, [["procDef", "jump %n", ["h"], [0], false],
                             ["changeYposBy:", ["getParam", "h", "r"]]]],
                    [0, 180, [["call", "jump   %n", 10]]]
                ]
            }]
        }));
        let cat = &project.sprites[0];
        for script in &cat.scripts[..2] {
            assert_eq!(
                script_json(script)[2][0],
                json!(["procDef", "jump %n", ["h"], [0], false])
            );
            assert_eq!(script_json(script)[2][1], json!(["changeYposBy:", ["getParam", "h", "r"]]));
        }
        assert_eq!(script_json(&cat.scripts[2])[2][0], json!(["call", "jump %n", 10]));

        let again = resolve_names(&mut project, &DefinitionParser::new()).unwrap();
        assert!(again.is_clean(), "second pass changed names: {:?}", again);
    }

    #[test]
    fn whitespace_variant_definitions_with_different_params_are_ambiguous() {
        let mut project = normalize(&json!({
            "children": [{
                "objName": "Cat",
                "scripts": [
                    [0, 0, [["procDef", "jump  %n", ["a"], [0], false]]],
                    [0, 90, [["procDef", "jump %n", ["b"], [0], false]]]
                ]
            }]
        }))
        .unwrap();
        assert_eq!(
            resolve_names(&mut project, &DefinitionParser::new()),
            Err(ProjectError::AmbiguousDefinition {
                signature: "jump %n".to_string(),
                candidates: 2,
            })
        );
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let (mut project, first) = resolved(json!({
            "variables": [{"name": "score"}, {"name": "score"}],
            "children": [{
                "objName": "Cat",
                "variables": [{"name": "score"}],
                "scripts": [[0, 0, [
                    ["procDef", "f %s", ["p", "p"], [""], false],
                    ["setVar:to:", "score", ["getParam", "p", "r"]],
                    ["append:toList:", 1, "new list"],
                    ["changeVar:by:", "fresh", 1]
                ]]]
            }]
        }));
        assert!(!first.is_clean());
        let snapshot = project.clone();
        let second = resolve_names(&mut project, &DefinitionParser::new()).unwrap();
        assert!(second.is_clean(), "second pass changed things: {:?}", second);
        assert_eq!(project, snapshot);
    }

    #[test]
    fn renames_notify_name_subscribers() {
        use std::cell::RefCell;
        use std::rc::Rc;

        let mut project = normalize(&json!({
            "variables": [{"name": "x"}],
            "children": [{"objName": "Cat", "variables": [{"name": "x"}]}]
        }))
        .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        project.sprites[0].variables[0]
            .name
            .subscribe(move |name: &String| sink.borrow_mut().push(name.clone()));
        resolve_names(&mut project, &DefinitionParser::new()).unwrap();
        assert_eq!(*seen.borrow(), vec!["x2"]);
    }
}
