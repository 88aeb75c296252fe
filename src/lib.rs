pub mod archive;
pub mod assets;
pub mod codec;
pub mod definition;
pub mod error;
pub mod model;
pub mod names;
pub mod normalize;
pub mod observable;
pub mod save;
pub mod script;

#[cfg(not(target_arch = "wasm32"))]
pub mod cli;

#[cfg(not(target_arch = "wasm32"))]
pub mod decode;

#[cfg(all(target_arch = "wasm32", feature = "wasm-bindings"))]
pub mod wasm;

#[cfg(not(target_arch = "wasm32"))]
use anyhow::{Context, Result};
use archive::Archive;
use definition::DefinitionParser;
use error::ProjectError;
use model::Project;
use names::NameReport;
#[cfg(not(target_arch = "wasm32"))]
use std::path::{Path, PathBuf};

pub use save::save_project;

type LoadProgressCallback<'a> = dyn FnMut(usize, usize, &str) + 'a;

const LOAD_STEPS: usize = 4;

/// Reads an archive into a fully resolved project graph.
///
/// Nothing is returned until every step has succeeded.
pub fn load_project(bytes: &[u8]) -> Result<(Project, NameReport), ProjectError> {
    load_project_with_progress(bytes, Option::<&mut fn(usize, usize, &str)>::None)
}

pub fn load_project_with_progress<F>(
    bytes: &[u8],
    progress: Option<&mut F>,
) -> Result<(Project, NameReport), ProjectError>
where
    F: FnMut(usize, usize, &str),
{
    let mut progress = progress.map(|cb| cb as &mut LoadProgressCallback<'_>);

    report_progress(&mut progress, 1, LOAD_STEPS, "Reading archive");
    let archive = Archive::read(bytes)?;

    report_progress(&mut progress, 2, LOAD_STEPS, "Normalizing project");
    let mut project = normalize::normalize(&archive.manifest)?;

    report_progress(&mut progress, 3, LOAD_STEPS, "Resolving names");
    let parser = DefinitionParser::new();
    let report = names::resolve_names(&mut project, &parser)?;

    report_progress(&mut progress, 4, LOAD_STEPS, "Resolving assets");
    assets::resolve_payloads(&mut project, &archive)?;

    Ok((project, report))
}

fn report_progress(progress: &mut Option<&mut LoadProgressCallback<'_>>, step: usize, total: usize, label: &str) {
    if let Some(cb) = progress.as_deref_mut() {
        cb(step, total, label);
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub fn load_project_file(path: &Path) -> Result<(Project, NameReport)> {
    let path = canonicalize_file(path)?;
    let bytes = std::fs::read(&path).with_context(|| format!("Failed to read '{}'.", path.display()))?;
    load_project(&bytes).with_context(|| format!("Failed to load project '{}'.", path.display()))
}

/// Writes through a temporary file next to `path`, then renames it into place.
#[cfg(not(target_arch = "wasm32"))]
pub fn save_project_file(project: &Project, path: &Path) -> Result<()> {
    let bytes = save_project(project)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    std::fs::create_dir_all(&dir)?;
    let mut temp = tempfile::NamedTempFile::new_in(&dir)
        .with_context(|| format!("Failed to create temporary file in '{}'.", dir.display()))?;
    std::io::Write::write_all(&mut temp, &bytes)?;
    temp.persist(path)
        .map_err(|e| e.error)
        .with_context(|| format!("Failed to write '{}'.", path.display()))?;
    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
pub fn canonicalize_file(path: &Path) -> Result<PathBuf> {
    if !path.exists() || !path.is_file() {
        return Err(anyhow::anyhow!("Input file not found: '{}'.", path.display()));
    }
    Ok(path.canonicalize()?)
}

#[cfg(not(target_arch = "wasm32"))]
pub fn run_cli(args: &cli::Args) -> Result<()> {
    let total_stages = 2 + usize::from(args.measure) + usize::from(args.output.is_some());
    let progress = CliProgress::new("Load", total_stages);
    let mut stage = 0usize;

    stage += 1;
    progress.emit(stage, "Resolving input path");
    let input = canonicalize_file(&args.input)?;
    let bytes = std::fs::read(&input).with_context(|| format!("Failed to read '{}'.", input.display()))?;

    stage += 1;
    let load_stage = stage;
    let mut load_cb = |step: usize, total: usize, label: &str| {
        progress.emit_with_total(load_stage - 1 + step, load_stage - 1 + total, label);
    };
    let (mut project, report) = load_project_with_progress(&bytes, Some(&mut load_cb))
        .with_context(|| format!("Failed to load project '{}'.", input.display()))?;

    if args.measure {
        stage += 1;
        progress.emit(stage, "Decoding costume sizes");
        let options = decode::DecodeOptions {
            poll_interval: std::time::Duration::from_millis(args.poll_interval_ms),
            timeout: std::time::Duration::from_millis(args.decode_timeout_ms),
        };
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_time()
            .build()
            .context("Failed to start async runtime.")?;
        let decoded = runtime.block_on(decode::decode_costume_sizes(&mut project, options))?;
        if decoded.stale > 0 {
            eprintln!("warning: {} decoded sizes were stale and dropped", decoded.stale);
        }
        for (owner, index, err) in &decoded.failures {
            let name = project
                .scriptable(*owner)
                .map(|s| s.name.get().clone())
                .unwrap_or_default();
            eprintln!("warning: costume {} of '{}': {}", index, name, err);
        }
    }

    if args.summary {
        print_summary(&project, &report);
    }

    if let Some(output) = &args.output {
        stage += 1;
        progress.emit(stage, "Writing archive");
        save_project_file(&project, output)?;
    }

    Ok(())
}

#[cfg(not(target_arch = "wasm32"))]
fn print_summary(project: &Project, report: &NameReport) {
    for s in project.scriptables() {
        println!(
            "{}: {} variables, {} lists, {} scripts, {} costumes, {} sounds",
            s.name.get(),
            s.variables.len(),
            s.lists.len(),
            s.scripts.len(),
            s.costumes.len(),
            s.sounds.len()
        );
        for costume in &s.costumes {
            if let Some(size) = costume.size.get() {
                println!("  costume '{}' {}x{}", costume.name.get(), size.width, size.height);
            }
        }
    }
    for scope in &report.scopes {
        for name in &scope.created_variables {
            println!("{}: declared variable '{}'", scope.name, name);
        }
        for name in &scope.created_lists {
            println!("{}: declared list '{}'", scope.name, name);
        }
        for rename in &scope.renames {
            println!(
                "{}: renamed {} '{}' -> '{}'",
                scope.name,
                rename.kind.label(),
                rename.from,
                rename.to
            );
        }
    }
    if report.renamed_watchers > 0 {
        println!("{} watchers renamed", report.renamed_watchers);
    }
}

#[cfg(not(target_arch = "wasm32"))]
struct CliProgress {
    prefix: &'static str,
    total: usize,
}

#[cfg(not(target_arch = "wasm32"))]
impl CliProgress {
    fn new(prefix: &'static str, total: usize) -> Self {
        Self {
            prefix,
            total: total.max(1),
        }
    }

    fn emit(&self, step: usize, label: &str) {
        self.emit_with_total(step, self.total, label);
    }

    fn emit_with_total(&self, step: usize, total: usize, label: &str) {
        let total = total.max(1);
        let step = step.clamp(1, total);
        let bar = render_progress_bar(step, total, 14);
        eprintln!("[{}] {}... ({}/{}) {}", self.prefix, label, step, total, bar);
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn render_progress_bar(step: usize, total: usize, width: usize) -> String {
    let width = width.max(1);
    let filled = ((step * width) + (total / 2)) / total;
    let mut s = String::with_capacity(width + 2);
    s.push('[');
    for i in 0..width {
        s.push(if i < filled { '=' } else { '-' });
    }
    s.push(']');
    s
}
