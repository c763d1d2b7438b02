//! VL-007: Statement translation (compile pass 2).
//!
//! Each bracketed statement is parsed into a [`Statement`] and emitted as code
//! fragments ([`Op`]). The emitter owns the [`LoopScope`], so every occurrence of
//! a statement is translated against the loops that enclose it at that point.
//!
//! | statement                     | fragments                                 |
//! |-------------------------------|-------------------------------------------|
//! | `{! comment}`                 | none                                      |
//! | `{include_var V}`             | `IncludeVar`                              |
//! | `{var N value}`               | `Assign` into page data                   |
//! | `{define N value}`            | `Assign` into host-only data              |
//! | `{loop V}` / `{/loop V}`      | `LoopStart` / `LoopEnd`                   |
//! | `{if [not] X [value]}`        | `If`, likewise `elseif`, `else`, `/if`    |
//! | `{hook NAME args...}`         | `Hook`                                    |
//! | `{X}`                         | `Echo`                                    |
//! | `{assign ..}` `{include_once ..}` | deprecation notice + diagnostic       |

use super::lexer::{self, RawStatement, Segment};
use super::scope::{self, ConstantTable, LoopScope};
use super::types::{
    CmpOp, Condition, Diagnostic, DiagnosticKind, HookArgs, Op, Partition, VarPath,
};

/// Inline notice for deprecated statements; `%` is replaced by the keyword.
pub const DEPRECATED_NOTICE: &str =
    "[Template statement \"%\" has been deprecated; please read the template upgrade notes]";

/// Inline warning for a `/loop` without argument.
pub const MISSING_LOOP_ARGUMENT: &str = "[Template warning: missing argument for /loop statement]";

/// A parsed template statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Comment,
    /// Recognized but no longer supported (`assign`, `include_once`).
    Deprecated { keyword: String },
    IncludeVar { var: String },
    Var { name: String, value: String },
    Define { name: String, value: String },
    Loop { var: String },
    EndLoop { var: Option<String> },
    If(Branch),
    ElseIf(Branch),
    Else,
    EndIf,
    Hook { name: String, args: Vec<String> },
    Echo { value: String },
    /// A known statement lacking a required argument.
    Incomplete {
        keyword: String,
        expected: &'static str,
    },
}

/// Condition part of `if`/`elseif`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub negated: bool,
    pub var: String,
    pub value: Option<String>,
}

/// Parse a raw statement into its variant.
pub fn parse_statement(raw: &RawStatement<'_>) -> Statement {
    let keyword = raw.keyword();
    let args: &[&str] = raw.tokens.get(1..).unwrap_or(&[]);
    let incomplete = |expected| Statement::Incomplete {
        keyword: keyword.clone(),
        expected,
    };

    match keyword.as_str() {
        k if k.starts_with('!') => Statement::Comment,
        "include_once" | "assign" => Statement::Deprecated {
            keyword: keyword.clone(),
        },
        "include_var" => match args.first() {
            Some(var) => Statement::IncludeVar {
                var: var.to_string(),
            },
            None => incomplete("a variable"),
        },
        "var" | "define" => match args.split_first() {
            Some((name, rest)) if !rest.is_empty() => {
                let name = name.to_string();
                let value = rest.join(" ");
                if keyword == "var" {
                    Statement::Var { name, value }
                } else {
                    Statement::Define { name, value }
                }
            }
            _ => incomplete("a name and a value"),
        },
        "loop" => match args.first() {
            Some(var) => Statement::Loop {
                var: var.to_string(),
            },
            None => incomplete("a loop variable"),
        },
        "/loop" => Statement::EndLoop {
            var: args.first().map(|v| v.to_string()),
        },
        "if" | "elseif" => {
            let (negated, rest) = match args.split_first() {
                Some((first, rest)) if first.eq_ignore_ascii_case("not") => (true, rest),
                _ => (false, args),
            };
            match rest.split_first() {
                Some((var, value)) => {
                    let branch = Branch {
                        negated,
                        var: var.to_string(),
                        value: (!value.is_empty()).then(|| value.join(" ")),
                    };
                    if keyword == "if" {
                        Statement::If(branch)
                    } else {
                        Statement::ElseIf(branch)
                    }
                }
                None => incomplete("a condition"),
            }
        }
        "else" => Statement::Else,
        "/if" => Statement::EndIf,
        "hook" => match args.split_first() {
            Some((name, rest)) => Statement::Hook {
                name: name.to_string(),
                args: rest.iter().map(|a| a.to_string()).collect(),
            },
            None => incomplete("a hook name"),
        },
        _ => Statement::Echo {
            value: raw.tokens.join(" "),
        },
    }
}

/// Output of pass 2.
#[derive(Debug, Clone)]
pub struct Translation {
    pub ops: Vec<Op>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Translate merged template text into a fragment list.
pub fn translate(merged: &str, constants: &ConstantTable, host_marker: &str) -> Translation {
    let mut emitter = Emitter::new(constants, host_marker);
    for segment in lexer::tokenize(merged) {
        match segment {
            Segment::Text(text) => emitter.text(text),
            Segment::Statement(raw) => emitter.statement(&raw),
        }
    }
    emitter.finish()
}

/// Emits fragments statement by statement, tracking active loops.
pub struct Emitter<'c> {
    constants: &'c ConstantTable,
    scope: LoopScope,
    ops: Vec<Op>,
    diagnostics: Vec<Diagnostic>,
}

impl<'c> Emitter<'c> {
    /// Start a program: host guard, then a fresh loop save-stack.
    pub fn new(constants: &'c ConstantTable, host_marker: &str) -> Self {
        Self {
            constants,
            scope: LoopScope::new(),
            ops: vec![
                Op::Guard {
                    marker: host_marker.to_string(),
                },
                Op::InitLoopStack,
            ],
            diagnostics: Vec::new(),
        }
    }

    pub fn scope(&self) -> &LoopScope {
        &self.scope
    }

    /// Literal text, merged into a preceding text fragment.
    pub fn text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Op::Text { text: prev }) = self.ops.last_mut() {
            prev.push_str(text);
            return;
        }
        self.ops.push(Op::Text {
            text: text.to_string(),
        });
    }

    pub fn statement(&mut self, raw: &RawStatement<'_>) {
        let stmt = parse_statement(raw);
        self.emit(&stmt, raw.source);
    }

    /// Emit the fragments for one parsed statement.
    pub fn emit(&mut self, stmt: &Statement, source: &str) {
        match stmt {
            Statement::Comment => {}
            Statement::Deprecated { keyword } => {
                self.warn(
                    DiagnosticKind::Deprecated,
                    source,
                    format!("'{}' is deprecated", keyword),
                );
                self.text(&DEPRECATED_NOTICE.replace('%', keyword));
            }
            Statement::IncludeVar { var } => {
                let name = scope::variable(&self.scope, var);
                self.ops.push(Op::IncludeVar { name });
            }
            Statement::Var { name, value } => self.assign(Partition::Data, name, value),
            Statement::Define { name, value } => self.assign(Partition::Host, name, value),
            Statement::Loop { var } => {
                let segments = scope::parse_path(var);
                let source_path = VarPath {
                    partition: scope::resolve_scope(&self.scope, &segments),
                    segments: segments.clone(),
                };
                self.scope.push(segments.clone());
                self.ops.push(Op::LoopStart {
                    var: loop_path(segments),
                    source: source_path,
                });
            }
            Statement::EndLoop { var: Some(var) } => {
                let segments = scope::parse_path(var);
                let problem = match self.scope.innermost() {
                    Some(inner) if inner != segments.as_slice() => Some(format!(
                        "closes '{}' while '{}' is the innermost loop",
                        var,
                        inner.join(scope::FIELD_SEPARATOR)
                    )),
                    None => Some(format!("closes '{}' but no loop is open", var)),
                    _ => None,
                };
                if let Some(message) = problem {
                    self.warn(DiagnosticKind::Unbalanced, source, message);
                }
                self.scope.pop(Some(&segments));
                self.ops.push(Op::LoopEnd {
                    var: loop_path(segments),
                });
            }
            Statement::EndLoop { var: None } => {
                self.warn(
                    DiagnosticKind::MissingArgument,
                    source,
                    "missing argument for /loop; closing the innermost loop".to_string(),
                );
                self.text(MISSING_LOOP_ARGUMENT);
                let segments = self.scope.pop(None).unwrap_or_default();
                self.ops.push(Op::LoopEnd {
                    var: loop_path(segments),
                });
            }
            Statement::If(branch) => {
                let cond = self.condition(branch);
                self.ops.push(Op::If { cond });
            }
            Statement::ElseIf(branch) => {
                let cond = self.condition(branch);
                self.ops.push(Op::ElseIf { cond });
            }
            Statement::Else => self.ops.push(Op::Else),
            Statement::EndIf => self.ops.push(Op::EndIf),
            Statement::Hook { name, args } => {
                let mut operands: Vec<_> = args
                    .iter()
                    .map(|a| scope::classify_value(&self.scope, self.constants, a).0)
                    .collect();
                let args = match operands.len() {
                    0 => HookArgs::None,
                    1 => HookArgs::Single(operands.remove(0)),
                    _ => HookArgs::List(operands),
                };
                self.ops.push(Op::Hook {
                    name: name.clone(),
                    args,
                });
            }
            Statement::Echo { value } => {
                let (value, _) = scope::classify_value(&self.scope, self.constants, value);
                self.ops.push(Op::Echo { value });
            }
            Statement::Incomplete { keyword, expected } => {
                self.warn(
                    DiagnosticKind::MissingArgument,
                    source,
                    format!("{} statement needs {}", keyword, expected),
                );
                self.text(&format!(
                    "[Template warning: missing argument for {} statement]",
                    keyword
                ));
            }
        }
    }

    fn assign(&mut self, partition: Partition, name: &str, value: &str) {
        let target = scope::variable_in(partition, name);
        let (value, _) = scope::classify_value(&self.scope, self.constants, value);
        self.ops.push(Op::Assign { target, value });
    }

    fn condition(&self, branch: &Branch) -> Condition {
        let var = scope::variable(&self.scope, &branch.var);
        match &branch.value {
            None => Condition::Present {
                var,
                negated: branch.negated,
            },
            Some(raw) => Condition::Compare {
                var,
                op: if branch.negated { CmpOp::Ne } else { CmpOp::Eq },
                value: scope::classify_value(&self.scope, self.constants, raw).0,
            },
        }
    }

    fn warn(&mut self, kind: DiagnosticKind, statement: &str, message: String) {
        tracing::warn!(%kind, statement, "{}", message);
        self.diagnostics.push(Diagnostic {
            kind,
            statement: statement.to_string(),
            message,
        });
    }

    pub fn finish(self) -> Translation {
        Translation {
            ops: self.ops,
            diagnostics: self.diagnostics,
        }
    }
}

fn loop_path(segments: Vec<String>) -> VarPath {
    VarPath {
        partition: Partition::Loop,
        segments,
    }
}
