//! The sandboxed script language: syntax, values and evaluation.

pub mod ast;
pub mod builtins;
pub mod format;
pub mod host;
pub mod interpreter;
pub mod lexer;
pub mod methods;
pub mod modules;
pub mod ops;
pub mod parser;
pub mod scope;
pub mod value;
