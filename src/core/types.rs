//! VL-001: Core types shared by the compiler, the build cache, and the runtime.
//!
//! Defines the `vellum.yaml` configuration, template locations, dependency sets,
//! compiled program fragments, cache artifacts, and build events. Everything that
//! lands on disk derives Serialize/Deserialize.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Runtime data value. Page data, constants, and loop elements all share it.
pub type Value = serde_json::Value;

// ============================================================================
// Top-level vellum.yaml
// ============================================================================

/// Project configuration: where templates live and how they are compiled.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VellumConfig {
    /// Schema version (must be "1.0")
    pub version: String,

    /// Root directory holding template sets
    #[serde(default = "default_template_dir")]
    pub template_dir: PathBuf,

    /// Active template set
    #[serde(default = "default_set")]
    pub template: String,

    /// Template set consulted when the active set lacks a template
    #[serde(default = "default_set")]
    pub default_template: String,

    /// Directory for compiled stage1/stage2 artifacts
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Include nesting limit (cycle protection)
    #[serde(default = "default_max_include_depth")]
    pub max_include_depth: usize,

    /// Marker the host must define before compiled templates render
    #[serde(default = "default_host_marker")]
    pub host_marker: String,

    /// Compile-time named constants
    #[serde(default)]
    pub constants: IndexMap<String, Value>,

    /// Append build events to `cache_dir/events.jsonl`
    #[serde(default = "default_true")]
    pub event_log: bool,
}

fn default_template_dir() -> PathBuf {
    PathBuf::from("templates")
}

fn default_set() -> String {
    "default".to_string()
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("cache")
}

/// Default include nesting limit. More than enough for any sane template tree.
pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 50;

fn default_max_include_depth() -> usize {
    DEFAULT_MAX_INCLUDE_DEPTH
}

/// Default host marker name.
pub const DEFAULT_HOST_MARKER: &str = "VELLUM";

fn default_host_marker() -> String {
    DEFAULT_HOST_MARKER.to_string()
}

fn default_true() -> bool {
    true
}

// ============================================================================
// Template locations
// ============================================================================

/// Where a template name resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Location {
    /// A raw file, inlined or emitted verbatim, never compiled.
    Raw(PathBuf),
    /// A template source and the stage1 artifact path it compiles to.
    Compiled { source: PathBuf, output: PathBuf },
}

// ============================================================================
// Dependency set
// ============================================================================

/// File → modification time (ns since the Unix epoch) recorded at compile time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DependencySet(IndexMap<PathBuf, u64>);

impl DependencySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file's modification time. Re-recording keeps the first position.
    pub fn record(&mut self, path: &Path, mtime: u64) {
        self.0.insert(path.to_path_buf(), mtime);
    }

    pub fn get(&self, path: &Path) -> Option<u64> {
        self.0.get(path).copied()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &u64)> {
        self.0.iter()
    }

    /// Render each entry as the literal check it stands for.
    pub fn checks(&self) -> Vec<String> {
        self.0
            .iter()
            .map(|(path, mtime)| format!("mtime({:?}) > {}", path.display().to_string(), mtime))
            .collect()
    }
}

// ============================================================================
// Variables and operands
// ============================================================================

/// Which part of the render context a variable lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Partition {
    /// Page-visible data
    Data,
    /// Loop-local bindings
    Loop,
    /// Host-only definitions, never read back by templates
    Host,
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => write!(f, "DATA"),
            Self::Loop => write!(f, "LOOP"),
            Self::Host => write!(f, "HOST"),
        }
    }
}

/// A variable reference: partition plus nested-field path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VarPath {
    pub partition: Partition,
    pub segments: Vec<String>,
}

impl fmt::Display for VarPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.partition)?;
        for seg in &self.segments {
            write!(f, "[{}]", seg)?;
        }
        Ok(())
    }
}

/// Classification of a value token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    String,
    Constant,
    Variable,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer => write!(f, "integer"),
            Self::String => write!(f, "string"),
            Self::Constant => write!(f, "constant"),
            Self::Variable => write!(f, "variable"),
        }
    }
}

/// A translated value token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Operand {
    Integer { value: Value },
    String { value: String },
    Constant { name: String, value: Value },
    Variable { path: VarPath },
}

impl Operand {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Integer { .. } => ValueKind::Integer,
            Self::String { .. } => ValueKind::String,
            Self::Constant { .. } => ValueKind::Constant,
            Self::Variable { .. } => ValueKind::Variable,
        }
    }
}

// ============================================================================
// Compiled program
// ============================================================================

/// Comparison operator used by `if`/`elseif` with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CmpOp {
    Eq,
    Ne,
}

impl fmt::Display for CmpOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eq => write!(f, "=="),
            Self::Ne => write!(f, "!="),
        }
    }
}

/// Condition of an `if`/`elseif` block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "test", rename_all = "snake_case")]
pub enum Condition {
    /// Set and non-empty (or, negated, unset or empty).
    Present { var: VarPath, negated: bool },
    /// Set-guarded comparison against a literal, constant, or another variable.
    Compare {
        var: VarPath,
        op: CmpOp,
        value: Operand,
    },
}

/// Hook arguments as decided at compile time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookArgs {
    None,
    Single(Operand),
    List(Vec<Operand>),
}

/// One compiled code fragment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    /// Abort this program (no output) unless the host defined `marker`.
    Guard { marker: String },
    /// Start a fresh loop save-stack for this program.
    InitLoopStack,
    Text { text: String },
    Echo { value: Operand },
    Assign { target: VarPath, value: Operand },
    IncludeVar { name: VarPath },
    LoopStart { var: VarPath, source: VarPath },
    LoopEnd { var: VarPath },
    If { cond: Condition },
    ElseIf { cond: Condition },
    Else,
    EndIf,
    Hook { name: String, args: HookArgs },
}

/// A compiled template body: the stage2 artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    /// Template name the program was compiled for
    pub template: String,

    /// Fragments in source order
    pub ops: Vec<Op>,
}

impl Program {
    /// A raw file as a program: its text, nothing else.
    pub fn raw(template: &str, text: String) -> Self {
        Self {
            template: template.to_string(),
            ops: vec![Op::Text { text }],
        }
    }
}

// ============================================================================
// Diagnostics
// ============================================================================

/// Kind of non-fatal compile finding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
    Deprecated,
    MissingArgument,
    Unbalanced,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Deprecated => write!(f, "deprecated"),
            Self::MissingArgument => write!(f, "missing-argument"),
            Self::Unbalanced => write!(f, "unbalanced"),
        }
    }
}

/// A warning produced while compiling. Compilation continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    /// Source text of the offending statement, braces included
    pub statement: String,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.kind, self.statement, self.message)
    }
}

// ============================================================================
// Cache artifacts
// ============================================================================

/// The stage1 artifact: dependency checks guarding a stage2 body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stage1 {
    /// Schema version
    pub schema: String,

    /// Template name to re-locate on rebuild
    pub template: String,

    /// When the pair was compiled
    pub generated_at: String,

    /// Generator version
    pub generator: String,

    /// Recorded modification times of every file the body was built from
    pub dependencies: DependencySet,

    /// Path of the stage2 body
    pub stage2: PathBuf,

    /// BLAKE3 hash of the stage2 body this stage1 was published with
    pub stage2_hash: String,
}

/// Result of one compile.
#[derive(Debug, Clone)]
pub struct CompileReport {
    pub template: String,
    pub dependencies: DependencySet,
    pub diagnostics: Vec<Diagnostic>,
    pub stage1: PathBuf,
    pub stage2: PathBuf,
}

// ============================================================================
// Build events
// ============================================================================

/// Build event for the JSONL event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BuildEvent {
    TemplateCompiled {
        template: String,
        dependencies: usize,
        diagnostics: usize,
    },
    TemplateRebuilt {
        template: String,
        reason: String,
    },
}

/// Timestamped event wrapper.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimestampedEvent {
    pub ts: String,
    #[serde(flatten)]
    pub event: BuildEvent,
}

// ============================================================================
// Tests
// ============================================================================
