//! Compiler core: types, configuration, include expansion, translation, artifacts.

pub mod codegen;
pub mod compiler;
pub mod fileio;
pub mod include;
pub mod lexer;
pub mod locator;
pub mod parser;
pub mod scope;
pub mod state;
pub mod types;
