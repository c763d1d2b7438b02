//! Vellum: two-pass template compiler.
//!
//! Pass 1 inlines `{include}` statements and records every file touched. Pass 2
//! translates `{...}` statements into a compiled program. Programs are cached as
//! a stage1/stage2 pair and rebuilt when any recorded dependency changes.

pub mod cache;
pub mod cli;
pub mod core;
pub mod runtime;
