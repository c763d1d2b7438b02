//! VL-018: Template compiler: include expansion, translation, artifact publish.
//!
//! source → pass 1 (includes + dependency set) → pass 2 (fragments) → block
//! structure check → stage2 + stage1

use super::codegen;
use super::include;
use super::locator::TemplateLocator;
use super::scope::ConstantTable;
use super::state;
use super::types::{CompileReport, Diagnostic, DiagnosticKind, Program, VellumConfig};
use crate::runtime::executor;
use std::path::Path;

/// Settings shared by every compile of a project.
#[derive(Debug, Clone)]
pub struct CompileSettings {
    pub host_marker: String,
    pub constants: ConstantTable,
    pub max_include_depth: usize,
}

impl CompileSettings {
    pub fn from_config(config: &VellumConfig) -> Self {
        Self {
            host_marker: config.host_marker.clone(),
            constants: ConstantTable::with_builtins(&config.host_marker, &config.constants),
            max_include_depth: config.max_include_depth,
        }
    }
}

impl Default for CompileSettings {
    fn default() -> Self {
        let marker = super::types::DEFAULT_HOST_MARKER;
        Self {
            host_marker: marker.to_string(),
            constants: ConstantTable::with_builtins(marker, &indexmap::IndexMap::new()),
            max_include_depth: super::types::DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }
}

/// Compile a template from memory into a program, without touching the cache.
pub fn translate_program(
    name: &str,
    merged: &str,
    settings: &CompileSettings,
) -> (Program, Vec<Diagnostic>) {
    let translation = codegen::translate(merged, &settings.constants, &settings.host_marker);
    let mut diagnostics = translation.diagnostics;
    if let Err(e) = executor::link(&translation.ops) {
        tracing::warn!(template = name, "unbalanced blocks: {}", e);
        diagnostics.push(Diagnostic {
            kind: DiagnosticKind::Unbalanced,
            statement: String::new(),
            message: e,
        });
    }
    let program = Program {
        template: name.to_string(),
        ops: translation.ops,
    };
    (program, diagnostics)
}

/// Compile `source` for template `name` and publish the artifact pair at `output`.
pub fn compile(
    locator: &dyn TemplateLocator,
    settings: &CompileSettings,
    name: &str,
    source: &Path,
    output: &Path,
) -> Result<CompileReport, String> {
    tracing::debug!(template = name, source = %source.display(), "pass 1: includes");
    let (merged, dependencies) =
        include::expand_template(locator, source, settings.max_include_depth)?;

    tracing::debug!(template = name, bytes = merged.len(), "pass 2: statements");
    let (program, diagnostics) = translate_program(name, &merged, settings);

    let stage1 = state::save_artifacts(output, &program, &dependencies)?;
    tracing::info!(
        template = name,
        dependencies = dependencies.len(),
        diagnostics = diagnostics.len(),
        output = %output.display(),
        "compiled template"
    );

    Ok(CompileReport {
        template: name.to_string(),
        dependencies,
        diagnostics,
        stage1: output.to_path_buf(),
        stage2: stage1.stage2,
    })
}
