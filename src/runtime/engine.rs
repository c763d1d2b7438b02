//! VL-013: Engine: the load protocol and rendering entry point.
//!
//! load(name):
//!   locate → raw: text program
//!          → compiled: stage1 missing → compile
//!                      stage1 unreadable / stale / stage2 mismatch → drop stage1, rebuild once
//!                      otherwise → stage2
//! render(name): load → link → execute

use super::context::RenderContext;
use super::executor::{self, Includer};
use super::hooks::HookRegistry;
use crate::cache::eventlog;
use crate::cache::staleness::{self, StaleReason};
use crate::core::compiler::{self, CompileSettings};
use crate::core::fileio;
use crate::core::locator::TemplateLocator;
use crate::core::state;
use crate::core::types::{BuildEvent, CompileReport, Location, Program};
use std::fmt;
use std::path::{Path, PathBuf};

/// How a program was obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Cached artifacts were up to date.
    Fresh,
    /// No artifacts existed; compiled now.
    Compiled,
    /// Artifacts were stale; recompiled.
    Rebuilt { reason: String },
    /// Raw file, loaded as text.
    Raw,
}

impl fmt::Display for LoadOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fresh => write!(f, "fresh"),
            Self::Compiled => write!(f, "compiled"),
            Self::Rebuilt { reason } => write!(f, "rebuilt ({})", reason),
            Self::Raw => write!(f, "raw"),
        }
    }
}

/// A loaded program and how it was obtained.
#[derive(Debug, Clone)]
pub struct Loaded {
    pub program: Program,
    pub outcome: LoadOutcome,
}

/// Template engine over a locator.
pub struct Engine<L: TemplateLocator> {
    locator: L,
    settings: CompileSettings,
    event_log: Option<PathBuf>,
}

impl<L: TemplateLocator> Engine<L> {
    pub fn new(locator: L, settings: CompileSettings) -> Self {
        Self {
            locator,
            settings,
            event_log: None,
        }
    }

    /// Record compiles and rebuilds in a JSONL event log.
    pub fn with_event_log(mut self, path: &Path) -> Self {
        self.event_log = Some(path.to_path_buf());
        self
    }

    pub fn locator(&self) -> &L {
        &self.locator
    }

    pub fn settings(&self) -> &CompileSettings {
        &self.settings
    }

    /// Where a template's stage1 artifact lives. None for raw templates.
    pub fn get_template(&self, name: &str) -> Result<Option<PathBuf>, String> {
        match self.locator.locate(name)? {
            Location::Raw(_) => Ok(None),
            Location::Compiled { output, .. } => Ok(Some(output)),
        }
    }

    /// Locate and compile a template unconditionally.
    pub fn compile(&self, name: &str) -> Result<CompileReport, String> {
        match self.locator.locate(name)? {
            Location::Raw(path) => Err(format!(
                "template '{}' is a raw file ({}) and is not compiled",
                name,
                path.display()
            )),
            Location::Compiled { source, output } => self.compile_at(name, &source, &output),
        }
    }

    fn compile_at(&self, name: &str, source: &Path, output: &Path) -> Result<CompileReport, String> {
        let report = compiler::compile(&self.locator, &self.settings, name, source, output)?;
        self.record(BuildEvent::TemplateCompiled {
            template: name.to_string(),
            dependencies: report.dependencies.len(),
            diagnostics: report.diagnostics.len(),
        });
        Ok(report)
    }

    /// Load a template's program, compiling or rebuilding as needed.
    pub fn load(&self, name: &str) -> Result<Loaded, String> {
        let (source, output) = match self.locator.locate(name)? {
            Location::Raw(path) => {
                return Ok(Loaded {
                    program: Program::raw(name, fileio::read_file(&path)?),
                    outcome: LoadOutcome::Raw,
                })
            }
            Location::Compiled { source, output } => (source, output),
        };

        let stage1 = match state::load_stage1(&output) {
            Ok(Some(stage1)) => stage1,
            Ok(None) => {
                self.compile_at(name, &source, &output)?;
                return Ok(Loaded {
                    program: load_pair(&output)?,
                    outcome: LoadOutcome::Compiled,
                });
            }
            Err(e) => {
                let reason = StaleReason::Unreadable {
                    path: output.clone(),
                    detail: e,
                };
                return self.rebuild(name, &output, reason.to_string());
            }
        };

        if let Some(reason) = staleness::check_stage1(&stage1) {
            return self.rebuild(name, &output, reason.to_string());
        }
        match state::load_stage2(&stage1) {
            Ok(program) => Ok(Loaded {
                program,
                outcome: LoadOutcome::Fresh,
            }),
            Err(e) => self.rebuild(name, &output, e),
        }
    }

    /// Drop the stale stage1, re-locate, and compile once.
    fn rebuild(&self, name: &str, output: &Path, reason: String) -> Result<Loaded, String> {
        tracing::info!(template = name, reason = %reason, "rebuilding template");
        state::remove_stage1(output)?;
        self.record(BuildEvent::TemplateRebuilt {
            template: name.to_string(),
            reason: reason.clone(),
        });

        let (source, output) = match self.locator.locate(name)? {
            Location::Compiled { source, output } => (source, output),
            Location::Raw(path) => {
                return Ok(Loaded {
                    program: Program::raw(name, fileio::read_file(&path)?),
                    outcome: LoadOutcome::Raw,
                })
            }
        };
        self.compile_at(name, &source, &output)?;
        Ok(Loaded {
            program: load_pair(&output)?,
            outcome: LoadOutcome::Rebuilt { reason },
        })
    }

    /// Render a template to a string.
    pub fn render(
        &self,
        name: &str,
        ctx: &mut RenderContext,
        hooks: &mut dyn HookRegistry,
    ) -> Result<String, String> {
        let mut out = String::new();
        self.render_into(name, ctx, hooks, &mut out, 0)?;
        Ok(out)
    }

    fn render_into(
        &self,
        name: &str,
        ctx: &mut RenderContext,
        hooks: &mut dyn HookRegistry,
        out: &mut String,
        depth: usize,
    ) -> Result<(), String> {
        if depth > self.settings.max_include_depth {
            return Err(format!(
                "include_var depth exceeded the maximum of {} at '{}'",
                self.settings.max_include_depth, name
            ));
        }
        let loaded = self.load(name)?;
        tracing::debug!(template = name, outcome = %loaded.outcome, depth, "rendering");
        let nodes = executor::link(&loaded.program.ops)
            .map_err(|e| format!("malformed program for template '{}': {}", name, e))?;
        executor::execute(&nodes, ctx, hooks, self, out, depth)
    }

    fn record(&self, event: BuildEvent) {
        if let Some(path) = &self.event_log {
            if let Err(e) = eventlog::append_event(path, event) {
                tracing::warn!("event log: {}", e);
            }
        }
    }
}

impl<L: TemplateLocator> Includer for Engine<L> {
    fn include(
        &self,
        name: &str,
        ctx: &mut RenderContext,
        hooks: &mut dyn HookRegistry,
        out: &mut String,
        depth: usize,
    ) -> Result<(), String> {
        self.render_into(name, ctx, hooks, out, depth)
    }
}

/// Read back a freshly published pair.
fn load_pair(output: &Path) -> Result<Program, String> {
    let stage1 = state::load_stage1(output)?
        .ok_or_else(|| format!("stage1 {} vanished after compile", output.display()))?;
    state::load_stage2(&stage1)
}
