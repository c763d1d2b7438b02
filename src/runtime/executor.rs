//! VL-011: Executor: links a compiled fragment list into blocks and runs it.
//!
//! link: Op list → Node tree (loop and if blocks), failing on broken structure
//! execute: Node tree + RenderContext + hooks → output text

use super::context::RenderContext;
use super::hooks::{HookArg, HookRegistry};
use super::value;
use crate::core::types::{CmpOp, Condition, HookArgs, Op, Operand, Value, VarPath};
use std::mem;

/// A linked program node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Guard {
        marker: String,
    },
    InitLoopStack,
    Text(String),
    Echo(Operand),
    Assign {
        target: VarPath,
        value: Operand,
    },
    IncludeVar(VarPath),
    Loop {
        var: VarPath,
        source: VarPath,
        body: Vec<Node>,
    },
    Cond {
        branches: Vec<(Condition, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    Hook {
        name: String,
        args: HookArgs,
    },
}

/// Open block while linking.
enum Frame {
    Loop {
        var: VarPath,
        source: VarPath,
        body: Vec<Node>,
    },
    /// `current` is `None` once `else` has been seen.
    Cond {
        done: Vec<(Condition, Vec<Node>)>,
        current: Option<Condition>,
        body: Vec<Node>,
    },
}

impl Frame {
    fn body(&mut self) -> &mut Vec<Node> {
        match self {
            Frame::Loop { body, .. } | Frame::Cond { body, .. } => body,
        }
    }
}

struct Linker {
    root: Vec<Node>,
    stack: Vec<Frame>,
}

impl Linker {
    fn push(&mut self, node: Node) {
        match self.stack.last_mut() {
            Some(frame) => frame.body().push(node),
            None => self.root.push(node),
        }
    }

    fn open_cond(&mut self) -> Result<(&mut Vec<(Condition, Vec<Node>)>, &mut Option<Condition>, &mut Vec<Node>), String> {
        match self.stack.last_mut() {
            Some(Frame::Cond {
                done,
                current,
                body,
            }) => Ok((done, current, body)),
            Some(Frame::Loop { var, .. }) => Err(format!(
                "branch inside loop {} before the loop was closed",
                var
            )),
            None => Err("branch without a matching if".to_string()),
        }
    }
}

/// Build the block tree for a fragment list.
pub fn link(ops: &[Op]) -> Result<Vec<Node>, String> {
    let mut linker = Linker {
        root: Vec::new(),
        stack: Vec::new(),
    };

    for (i, op) in ops.iter().enumerate() {
        match op {
            Op::Guard { marker } => linker.push(Node::Guard {
                marker: marker.clone(),
            }),
            Op::InitLoopStack => linker.push(Node::InitLoopStack),
            Op::Text { text } => linker.push(Node::Text(text.clone())),
            Op::Echo { value } => linker.push(Node::Echo(value.clone())),
            Op::Assign { target, value } => linker.push(Node::Assign {
                target: target.clone(),
                value: value.clone(),
            }),
            Op::IncludeVar { name } => linker.push(Node::IncludeVar(name.clone())),
            Op::Hook { name, args } => linker.push(Node::Hook {
                name: name.clone(),
                args: args.clone(),
            }),
            Op::LoopStart { var, source } => linker.stack.push(Frame::Loop {
                var: var.clone(),
                source: source.clone(),
                body: Vec::new(),
            }),
            Op::LoopEnd { var: end } => match linker.stack.pop() {
                // a mismatched name still closes the innermost loop
                Some(Frame::Loop { var, source, body }) => {
                    if var != *end {
                        tracing::debug!(open = %var, close = %end, "loop closed by another name");
                    }
                    linker.push(Node::Loop { var, source, body });
                }
                Some(Frame::Cond { .. }) => {
                    return Err(format!("op {}: loop end for {} inside an open if block", i, end))
                }
                None => return Err(format!("op {}: loop end for {} without a loop", i, end)),
            },
            Op::If { cond } => linker.stack.push(Frame::Cond {
                done: Vec::new(),
                current: Some(cond.clone()),
                body: Vec::new(),
            }),
            Op::ElseIf { cond } => {
                let (done, current, body) = linker.open_cond().map_err(|e| format!("op {}: elseif: {}", i, e))?;
                let previous = current
                    .take()
                    .ok_or_else(|| format!("op {}: elseif after else", i))?;
                done.push((previous, mem::take(body)));
                *current = Some(cond.clone());
            }
            Op::Else => {
                let (done, current, body) = linker.open_cond().map_err(|e| format!("op {}: else: {}", i, e))?;
                let previous = current
                    .take()
                    .ok_or_else(|| format!("op {}: duplicate else", i))?;
                done.push((previous, mem::take(body)));
            }
            Op::EndIf => match linker.stack.pop() {
                Some(Frame::Cond {
                    mut done,
                    current,
                    body,
                }) => {
                    let otherwise = match current {
                        Some(cond) => {
                            done.push((cond, body));
                            None
                        }
                        None => Some(body),
                    };
                    linker.push(Node::Cond {
                        branches: done,
                        otherwise,
                    });
                }
                Some(Frame::Loop { var, .. }) => {
                    return Err(format!("op {}: /if inside loop {} before the loop was closed", i, var))
                }
                None => return Err(format!("op {}: /if without a matching if", i)),
            },
        }
    }

    match linker.stack.last() {
        None => Ok(linker.root),
        Some(Frame::Loop { var, .. }) => Err(format!("unclosed loop {}", var)),
        Some(Frame::Cond { .. }) => Err("unclosed if block".to_string()),
    }
}

/// Resolves `{include_var}` targets while a program runs.
pub trait Includer {
    fn include(
        &self,
        name: &str,
        ctx: &mut RenderContext,
        hooks: &mut dyn HookRegistry,
        out: &mut String,
        depth: usize,
    ) -> Result<(), String>;
}

/// Includer that refuses every include.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIncludes;

impl Includer for NoIncludes {
    fn include(
        &self,
        name: &str,
        _ctx: &mut RenderContext,
        _hooks: &mut dyn HookRegistry,
        _out: &mut String,
        _depth: usize,
    ) -> Result<(), String> {
        Err(format!("cannot include '{}': no template source configured", name))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    /// Guard failed; stop this program.
    Halt,
}

struct Runner<'r> {
    ctx: &'r mut RenderContext,
    hooks: &'r mut dyn HookRegistry,
    includer: &'r dyn Includer,
    out: &'r mut String,
    depth: usize,
    /// Caller's loop save-stack, restored when this program ends
    outer_stack: Option<Vec<Option<Value>>>,
}

/// Run a linked program, appending its output to `out`.
pub fn execute(
    nodes: &[Node],
    ctx: &mut RenderContext,
    hooks: &mut dyn HookRegistry,
    includer: &dyn Includer,
    out: &mut String,
    depth: usize,
) -> Result<(), String> {
    let mut runner = Runner {
        ctx,
        hooks,
        includer,
        out,
        depth,
        outer_stack: None,
    };
    let result = runner.block(nodes);
    if let Some(previous) = runner.outer_stack.take() {
        runner.ctx.end_loop_stack(previous);
    }
    result.map(|_| ())
}

impl Runner<'_> {
    fn block(&mut self, nodes: &[Node]) -> Result<Flow, String> {
        for node in nodes {
            if self.node(node)? == Flow::Halt {
                return Ok(Flow::Halt);
            }
        }
        Ok(Flow::Continue)
    }

    fn node(&mut self, node: &Node) -> Result<Flow, String> {
        match node {
            Node::Guard { marker } => {
                if !self.ctx.has_marker(marker) {
                    tracing::debug!(marker = %marker, "host marker not defined, skipping program");
                    return Ok(Flow::Halt);
                }
            }
            Node::InitLoopStack => {
                let previous = self.ctx.begin_loop_stack();
                if self.outer_stack.is_none() {
                    self.outer_stack = Some(previous);
                }
            }
            Node::Text(text) => self.out.push_str(text),
            Node::Echo(operand) => {
                if let Some(v) = self.operand(operand) {
                    self.out.push_str(&value::render(&v));
                }
            }
            Node::Assign { target, value } => {
                let v = self.operand(value).unwrap_or(Value::Null);
                self.ctx.assign(target, v);
            }
            Node::IncludeVar(path) => {
                let name = self
                    .ctx
                    .lookup_set(path)
                    .map(value::render)
                    .filter(|n| !n.is_empty())
                    .ok_or_else(|| format!("include_var: {} does not name a template", path))?;
                self.includer
                    .include(&name, self.ctx, self.hooks, self.out, self.depth + 1)?;
            }
            Node::Loop { var, source, body } => return self.run_loop(var, source, body),
            Node::Cond {
                branches,
                otherwise,
            } => {
                let taken = branches
                    .iter()
                    .find(|(cond, _)| self.test(cond))
                    .map(|(_, body)| body)
                    .or(otherwise.as_ref());
                if let Some(body) = taken {
                    return self.block(body);
                }
            }
            Node::Hook { name, args } => {
                if self.hooks.contains(name) {
                    let arg = match args {
                        HookArgs::None => HookArg::None,
                        HookArgs::Single(op) => HookArg::Single(self.operand_or_null(op)),
                        HookArgs::List(ops) => {
                            HookArg::List(ops.iter().map(|op| self.operand_or_null(op)).collect())
                        }
                    };
                    if let Some(v) = self.hooks.call(name, arg) {
                        self.out.push_str(&value::render(&v));
                    }
                }
            }
        }
        Ok(Flow::Continue)
    }

    fn run_loop(&mut self, var: &VarPath, source: &VarPath, body: &[Node]) -> Result<Flow, String> {
        let saved = self.ctx.lookup(var).cloned();
        self.ctx.push_saved(saved);

        let items = self.ctx.lookup_set(source).and_then(value::elements);
        let mut flow = Flow::Continue;
        for item in items.unwrap_or_default() {
            self.ctx.assign(var, item);
            flow = self.block(body)?;
            if flow == Flow::Halt {
                break;
            }
        }

        self.ctx.unassign(var);
        if let Some(previous) = self.ctx.pop_saved() {
            self.ctx.assign(var, previous);
        }
        Ok(flow)
    }

    fn operand(&self, operand: &Operand) -> Option<Value> {
        match operand {
            Operand::Integer { value } | Operand::Constant { value, .. } => Some(value.clone()),
            Operand::String { value } => Some(Value::String(value.clone())),
            Operand::Variable { path } => self.ctx.lookup_set(path).cloned(),
        }
    }

    fn operand_or_null(&self, operand: &Operand) -> Value {
        self.operand(operand).unwrap_or(Value::Null)
    }

    fn test(&self, cond: &Condition) -> bool {
        match cond {
            Condition::Present { var, negated } => {
                let present = self
                    .ctx
                    .lookup_set(var)
                    .is_some_and(|v| !value::is_empty(v));
                present != *negated
            }
            Condition::Compare { var, op, value: rhs } => {
                let Some(left) = self.ctx.lookup_set(var) else {
                    return false;
                };
                let Some(right) = self.operand(rhs) else {
                    return false;
                };
                let equal = value::loose_eq(left, &right);
                match op {
                    CmpOp::Eq => equal,
                    CmpOp::Ne => !equal,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::codegen;
    use crate::core::scope::ConstantTable;
    use crate::runtime::hooks::{Hooks, NoHooks};
    use serde_json::json;
    use std::collections::HashMap;

    fn ctx_with(data: Value) -> RenderContext {
        let mut ctx = RenderContext::with_data(data.as_object().cloned().unwrap_or_default());
        ctx.define_marker("VELLUM");
        ctx
    }

    fn nodes(src: &str) -> Vec<Node> {
        let t = codegen::translate(src, &ConstantTable::new(), "VELLUM");
        link(&t.ops).unwrap()
    }

    fn render(src: &str, ctx: &mut RenderContext) -> String {
        let mut out = String::new();
        execute(&nodes(src), ctx, &mut NoHooks, &NoIncludes, &mut out, 0).unwrap();
        out
    }

    /// In-memory includer for `{include_var}` tests.
    struct MapIncluder(HashMap<&'static str, &'static str>);

    impl Includer for MapIncluder {
        fn include(
            &self,
            name: &str,
            ctx: &mut RenderContext,
            hooks: &mut dyn HookRegistry,
            out: &mut String,
            depth: usize,
        ) -> Result<(), String> {
            let src = self.0.get(name).ok_or_else(|| format!("unknown {}", name))?;
            execute(&nodes(src), ctx, hooks, self, out, depth)
        }
    }

    #[test]
    fn test_vl011_link_nesting() {
        let linked = nodes("a{loop L}{if X}b{else}c{/if}{/loop L}");
        assert_eq!(linked.len(), 4);
        match &linked[3] {
            Node::Loop { body, .. } => match &body[0] {
                Node::Cond {
                    branches,
                    otherwise,
                } => {
                    assert_eq!(branches.len(), 1);
                    assert_eq!(otherwise.as_ref().map(|o| o.len()), Some(1));
                }
                other => panic!("unexpected {:?}", other),
            },
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_vl011_link_rejects_broken_structure() {
        for src in [
            "{loop L}",
            "{if X}",
            "{/if}",
            "{else}",
            "{if X}{else}{else}{/if}",
            "{if X}{else}{elseif Y}{/if}",
            "{loop L}{if X}{/loop L}{/if}",
            "{if X}{loop L}{/if}{/loop L}",
        ] {
            let t = codegen::translate(src, &ConstantTable::new(), "VELLUM");
            assert!(link(&t.ops).is_err(), "{} should not link", src);
        }
    }

    #[test]
    fn test_vl011_guard_without_marker() {
        let mut ctx = RenderContext::new();
        ctx.set("X", json!("x"));
        assert_eq!(render("hello {X}", &mut ctx), "");
        ctx.define_marker("VELLUM");
        assert_eq!(render("hello {X}", &mut ctx), "hello x");
    }

    #[test]
    fn test_vl011_loop_over_list() {
        let mut ctx = ctx_with(json!({"L": ["a", "b", "c"]}));
        assert_eq!(render("{loop L}{L}{/loop L}", &mut ctx), "abc");
    }

    #[test]
    fn test_vl011_loop_over_map_values() {
        let mut ctx = ctx_with(json!({"U": {"x": {"n": 1}, "y": {"n": 2}}}));
        assert_eq!(render("{loop U}[{U->n}]{/loop U}", &mut ctx), "[1][2]");
    }

    #[test]
    fn test_vl011_loop_over_map_keeps_insertion_order() {
        let mut ctx = ctx_with(json!({"F": {"9": "nine", "10": "ten", "b": "B", "a": "A"}}));
        assert_eq!(render("{loop F}{F},{/loop F}", &mut ctx), "nine,ten,B,A,");
    }

    #[test]
    fn test_vl011_loop_over_scalar_or_unset() {
        let mut ctx = ctx_with(json!({"S": "text"}));
        assert_eq!(render("<{loop S}x{/loop S}{loop N}y{/loop N}>", &mut ctx), "<>");
    }

    #[test]
    fn test_vl011_shadowed_loop_restores_binding() {
        let mut ctx = ctx_with(json!({"A": [["inner"]]}));
        assert_eq!(
            render("{loop A}{loop A}{A}{/loop A}{A}{/loop A}", &mut ctx),
            "inner[\"inner\"]"
        );
        assert_eq!(ctx.loop_stack_depth(), 0);
    }

    #[test]
    fn test_vl011_loop_binding_cleared_after_loop() {
        let mut ctx = ctx_with(json!({"L": [1, 2]}));
        assert_eq!(render("{loop L}{L}{/loop L}-{L}", &mut ctx), "12-[1,2]");
    }

    #[test]
    fn test_vl011_conditions() {
        let mut ctx = ctx_with(json!({"X": "x", "E": "", "Z": "0", "N": 3, "M": "3"}));
        assert_eq!(render("{if X}yes{/if}", &mut ctx), "yes");
        assert_eq!(render("{if not X}yes{else}no{/if}", &mut ctx), "no");
        assert_eq!(render("{if not Q}yes{else}no{/if}", &mut ctx), "yes");
        assert_eq!(render("{if E}a{elseif Z}b{elseif X}c{else}d{/if}", &mut ctx), "c");
        assert_eq!(render("{if N 3}eq{/if}", &mut ctx), "eq");
        assert_eq!(render("{if N M}eq{/if}", &mut ctx), "eq");
        assert_eq!(render("{if not N 4}ne{/if}", &mut ctx), "ne");
        assert_eq!(render("{if X \"x\"}s{/if}", &mut ctx), "s");
    }

    #[test]
    fn test_vl011_compare_requires_set_operands() {
        let mut ctx = ctx_with(json!({"N": 3}));
        // unset left side never matches, not even with `not`
        assert_eq!(render("{if not Q 1}a{else}b{/if}", &mut ctx), "b");
        // unset variable on the right side never matches
        assert_eq!(render("{if not N Q}a{else}b{/if}", &mut ctx), "b");
    }

    #[test]
    fn test_vl011_var_assignment() {
        let mut ctx = ctx_with(json!({"L": [{"id": 7}]}));
        let out = render("{loop L}{var last L->id}{/loop L}{last}", &mut ctx);
        assert_eq!(out, "7");
        assert_eq!(ctx.data()["last"], json!(7));
    }

    #[test]
    fn test_vl011_define_is_not_visible() {
        let mut ctx = ctx_with(json!({}));
        let out = render("{define mode \"dark\"}[{mode}]{if mode}seen{/if}", &mut ctx);
        assert_eq!(out, "[]");
        assert_eq!(ctx.host()["mode"], json!("dark"));
    }

    #[test]
    fn test_vl011_hooks_single_and_list() {
        let mut hooks = Hooks::new();
        hooks.register("show", |arg| match arg {
            HookArg::None => Some(json!("none")),
            HookArg::Single(v) => Some(json!(format!("one:{}", value::render(&v)))),
            HookArg::List(vs) => Some(json!(format!("list:{}", vs.len()))),
        });
        let mut ctx = ctx_with(json!({"A": "a"}));
        let mut out = String::new();
        let linked = nodes("{hook show}|{hook show A}|{hook show A 2 \"s\"}|{hook missing A}");
        execute(&linked, &mut ctx, &mut hooks, &NoIncludes, &mut out, 0).unwrap();
        assert_eq!(out, "none|one:a|list:3|");
    }

    #[test]
    fn test_vl011_include_var() {
        let includer = MapIncluder(HashMap::from([("row", "<{R->name}>")]));
        let mut ctx = ctx_with(json!({"R": [{"name": "a", "tpl": "row"}, {"name": "b", "tpl": "row"}]}));
        let mut out = String::new();
        let linked = nodes("{loop R}{include_var R->tpl}{/loop R}");
        execute(&linked, &mut ctx, &mut NoHooks, &includer, &mut out, 0).unwrap();
        // the included program sees the page data, not the includer's loop bindings
        assert_eq!(out, "<><>");
    }

    #[test]
    fn test_vl011_include_var_unset_is_error() {
        let mut ctx = ctx_with(json!({}));
        let mut out = String::new();
        let result = execute(&nodes("{include_var T}"), &mut ctx, &mut NoHooks, &NoIncludes, &mut out, 0);
        assert!(result.unwrap_err().contains("does not name a template"));
    }

    #[test]
    fn test_vl011_nested_program_keeps_outer_save_stack() {
        let includer = MapIncluder(HashMap::from([("inner", "{loop I}{I}{/loop I}")]));
        let mut ctx = ctx_with(json!({"O": ["o"], "I": [1, 2], "T": "inner"}));
        let mut out = String::new();
        let linked = nodes("{loop O}{include_var T}{O}{/loop O}");
        execute(&linked, &mut ctx, &mut NoHooks, &includer, &mut out, 0).unwrap();
        assert_eq!(out, "12o");
        assert_eq!(ctx.loop_stack_depth(), 0);
    }

    #[test]
    fn test_vl011_constants_render() {
        let mut constants = ConstantTable::new();
        constants.insert("SITE", json!("forum"));
        let t = codegen::translate("{SITE}/{7}/{\"lit\"}", &constants, "VELLUM");
        let mut ctx = ctx_with(json!({"SITE": "shadowed"}));
        let mut out = String::new();
        execute(&link(&t.ops).unwrap(), &mut ctx, &mut NoHooks, &NoIncludes, &mut out, 0).unwrap();
        assert_eq!(out, "forum/7/lit");
    }
}
