//! VL-019: CLI subcommands: init, validate, compile, render, status, stale, clean.

use crate::cache::{eventlog, staleness};
use crate::core::compiler::CompileSettings;
use crate::core::locator::DirLocator;
use crate::core::{parser, types};
use crate::runtime::context::RenderContext;
use crate::runtime::engine::Engine;
use crate::runtime::hooks::NoHooks;
use clap::Subcommand;
use std::path::{Path, PathBuf};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new vellum project
    Init {
        /// Directory to initialize (default: current)
        #[arg(default_value = ".")]
        path: PathBuf,
    },

    /// Validate vellum.yaml
    Validate {
        /// Path to vellum.yaml
        #[arg(short, long, default_value = "vellum.yaml")]
        file: PathBuf,
    },

    /// Compile a template into its cached stage1/stage2 pair
    Compile {
        /// Template name
        name: String,

        /// Path to vellum.yaml
        #[arg(short, long, default_value = "vellum.yaml")]
        file: PathBuf,
    },

    /// Render a template to stdout, compiling it first if needed
    Render {
        /// Template name
        name: String,

        /// Path to vellum.yaml
        #[arg(short, long, default_value = "vellum.yaml")]
        file: PathBuf,

        /// Page data (YAML or JSON mapping)
        #[arg(short, long)]
        data: Option<PathBuf>,
    },

    /// Show compiled templates and whether they are fresh
    Status {
        /// Path to vellum.yaml
        #[arg(short, long, default_value = "vellum.yaml")]
        file: PathBuf,
    },

    /// List compiled templates whose sources changed
    Stale {
        /// Path to vellum.yaml
        #[arg(short, long, default_value = "vellum.yaml")]
        file: PathBuf,

        /// Exit non-zero if anything is stale (for CI)
        #[arg(long)]
        check: bool,
    },

    /// Remove all compiled artifacts
    Clean {
        /// Path to vellum.yaml
        #[arg(short, long, default_value = "vellum.yaml")]
        file: PathBuf,
    },
}

/// Dispatch a CLI command.
pub fn dispatch(cmd: Commands) -> Result<(), String> {
    match cmd {
        Commands::Init { path } => cmd_init(&path),
        Commands::Validate { file } => cmd_validate(&file),
        Commands::Compile { name, file } => cmd_compile(&file, &name),
        Commands::Render { name, file, data } => cmd_render(&file, &name, data.as_deref()),
        Commands::Status { file } => cmd_status(&file),
        Commands::Stale { file, check } => cmd_stale(&file, check),
        Commands::Clean { file } => cmd_clean(&file),
    }
}

fn cmd_init(path: &Path) -> Result<(), String> {
    let config_path = path.join("vellum.yaml");
    if config_path.exists() {
        return Err(format!("{} already exists", config_path.display()));
    }

    let set_dir = path.join("templates").join("default");
    let cache_dir = path.join("cache");
    for dir in [&set_dir, &cache_dir] {
        std::fs::create_dir_all(dir)
            .map_err(|e| format!("cannot create dir {}: {}", dir.display(), e))?;
    }

    let config = format!(
        r#"version: "1.0"
template_dir: templates
template: default
default_template: default
cache_dir: cache
max_include_depth: {}
host_marker: {}
constants:
  SITE_NAME: "My site"
"#,
        types::DEFAULT_MAX_INCLUDE_DEPTH,
        types::DEFAULT_HOST_MARKER
    );
    std::fs::write(&config_path, config)
        .map_err(|e| format!("cannot write {}: {}", config_path.display(), e))?;

    let index = set_dir.join("index.tpl");
    std::fs::write(
        &index,
        "{! starter page }\n<h1>{SITE_NAME}</h1>\n{loop ITEMS}\n<p>{ITEMS}</p>\n{/loop ITEMS}\n",
    )
    .map_err(|e| format!("cannot write {}: {}", index.display(), e))?;

    println!("Initialized vellum project at {}", path.display());
    println!("  Created: {}", config_path.display());
    println!("  Created: {}", index.display());
    println!("  Created: {}/", cache_dir.display());
    Ok(())
}

fn cmd_validate(file: &Path) -> Result<(), String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);

    if errors.is_empty() {
        println!(
            "OK: template set '{}' (fallback '{}'), {} constants",
            config.template,
            config.default_template,
            config.constants.len()
        );
        Ok(())
    } else {
        for e in &errors {
            eprintln!("  ERROR: {}", e);
        }
        Err(format!("{} validation error(s)", errors.len()))
    }
}

/// Parse and validate a config file, returning errors if invalid.
fn parse_and_validate(file: &Path) -> Result<types::VellumConfig, String> {
    let config = parser::parse_config_file(file)?;
    let errors = parser::validate_config(&config);
    if errors.is_empty() {
        return Ok(config);
    }
    for e in &errors {
        eprintln!("  ERROR: {}", e);
    }
    Err("validation failed".to_string())
}

/// Directory relative config paths are resolved against.
fn project_base(file: &Path) -> PathBuf {
    match file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

/// Engine for a config file, with the event log wired up when enabled.
fn project_engine(file: &Path) -> Result<(types::VellumConfig, Engine<DirLocator>), String> {
    let config = parse_and_validate(file)?;
    let locator = DirLocator::from_config(&config, &project_base(file));
    let log = eventlog::event_log_path(locator.cache_dir());
    let mut engine = Engine::new(locator, CompileSettings::from_config(&config));
    if config.event_log {
        engine = engine.with_event_log(&log);
    }
    Ok((config, engine))
}

fn cache_dir(file: &Path) -> Result<PathBuf, String> {
    let config = parse_and_validate(file)?;
    Ok(project_base(file).join(&config.cache_dir))
}

fn cmd_compile(file: &Path, name: &str) -> Result<(), String> {
    let (_, engine) = project_engine(file)?;
    let report = engine.compile(name)?;

    println!(
        "Compiled {}: {} dependencies, {} diagnostics",
        report.template,
        report.dependencies.len(),
        report.diagnostics.len()
    );
    for (path, _) in report.dependencies.iter() {
        println!("  dep: {}", path.display());
    }
    for d in &report.diagnostics {
        println!("  WARN: {}", d);
    }
    println!("  stage1: {}", report.stage1.display());
    println!("  stage2: {}", report.stage2.display());
    Ok(())
}

/// Read page data from a YAML or JSON file. Must be a mapping.
fn load_data(path: &Path) -> Result<serde_json::Map<String, types::Value>, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    let is_json = path.extension().is_some_and(|ext| ext == "json");
    let value: types::Value = if is_json {
        serde_json::from_str(&content)
            .map_err(|e| format!("JSON parse error {}: {}", path.display(), e))?
    } else {
        serde_yaml_ng::from_str(&content)
            .map_err(|e| format!("YAML parse error {}: {}", path.display(), e))?
    };
    match value {
        types::Value::Object(map) => Ok(map),
        types::Value::Null => Ok(serde_json::Map::new()),
        _ => Err(format!("{}: page data must be a mapping", path.display())),
    }
}

/// Render a template with optional page data.
fn render_template(file: &Path, name: &str, data: Option<&Path>) -> Result<String, String> {
    let (config, engine) = project_engine(file)?;
    let data = match data {
        Some(path) => load_data(path)?,
        None => serde_json::Map::new(),
    };
    let mut ctx = RenderContext::with_data(data);
    ctx.define_marker(&config.host_marker);
    engine.render(name, &mut ctx, &mut NoHooks)
}

fn cmd_render(file: &Path, name: &str, data: Option<&Path>) -> Result<(), String> {
    let out = render_template(file, name, data)?;
    print!("{}", out);
    Ok(())
}

fn cmd_status(file: &Path) -> Result<(), String> {
    let cache_dir = cache_dir(file)?;
    if !cache_dir.exists() {
        println!("No compiled templates. Run `vellum compile` or `vellum render` first.");
        return Ok(());
    }
    let entries = staleness::scan_cache(&cache_dir)?;
    if entries.is_empty() {
        println!("No compiled templates. Run `vellum compile` or `vellum render` first.");
        return Ok(());
    }

    for entry in &entries {
        let name = entry.template.as_deref().unwrap_or("?");
        match &entry.stale {
            None => println!("  fresh  {} ({} deps)", name, entry.dependencies),
            Some(reason) => println!("  STALE  {}: {}", name, reason),
        }
    }
    let stale = entries.iter().filter(|e| !e.is_fresh()).count();
    println!();
    println!("{} compiled, {} stale.", entries.len(), stale);
    Ok(())
}

fn cmd_stale(file: &Path, check: bool) -> Result<(), String> {
    let cache_dir = cache_dir(file)?;
    let entries = if cache_dir.exists() {
        staleness::scan_cache(&cache_dir)?
    } else {
        Vec::new()
    };

    let stale: Vec<_> = entries.iter().filter(|e| !e.is_fresh()).collect();
    for entry in &stale {
        let reason = entry
            .stale
            .as_ref()
            .map(|r| r.to_string())
            .unwrap_or_default();
        println!(
            "{}: {}",
            entry.template.as_deref().unwrap_or("?"),
            reason
        );
    }

    if stale.is_empty() {
        println!("No stale templates.");
    } else if check {
        return Err(format!("{} stale template(s)", stale.len()));
    }
    Ok(())
}

fn cmd_clean(file: &Path) -> Result<(), String> {
    let cache_dir = cache_dir(file)?;
    let removed = clean_cache(&cache_dir)?;
    println!("Removed {} artifact(s) from {}", removed, cache_dir.display());
    Ok(())
}

/// Delete every compiled artifact (stage1, stage2, leftover temp files).
fn clean_cache(cache_dir: &Path) -> Result<usize, String> {
    if !cache_dir.exists() {
        return Ok(0);
    }
    let mut removed = 0;
    for pattern in ["tpl-*", ".vellum-*.tmp"] {
        let full = cache_dir.join(pattern);
        let full = full
            .to_str()
            .ok_or_else(|| format!("non-UTF-8 cache path {}", cache_dir.display()))?;
        let paths = glob::glob(full).map_err(|e| format!("bad pattern {}: {}", full, e))?;
        for path in paths.flatten() {
            if path.is_file() {
                std::fs::remove_file(&path)
                    .map_err(|e| format!("cannot remove {}: {}", path.display(), e))?;
                removed += 1;
            }
        }
    }
    Ok(removed)
}
