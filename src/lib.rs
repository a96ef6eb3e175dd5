//! halo-sql-template：用模板拼接 SQL，并把模板中引用的值收集为 `$n` 位置参数。
//!
//! 模板语法是 go `text/template` 的子集；`{{ .Name | __sql_arg__ }}` 不会把值写进 SQL，
//! 而是把值追加到参数列表，并在 SQL 中留下对应的占位符。

pub mod args;
#[cfg(test)]
mod args_tests;
mod data;
pub mod engine;
#[cfg(test)]
mod engine_tests;
pub mod exec;
pub mod funcs;
mod lexer;
pub mod marker;
mod node;
pub mod parse;
#[cfg(test)]
mod parse_tests;
pub mod placeholder;
mod string_builder;
pub mod value;

pub use crate::args::{Args, ArgsRef};
pub use crate::engine::{
    DEFAULT_MAX_DEPTH, DEFAULT_TEMPLATE_NAME, Engine, RegisterError, RenderError, Template, render,
};
pub use crate::exec::{ExecError, ExecErrorKind};
pub use crate::funcs::{FuncError, Function};
pub use crate::marker::{SQL_ARG_FUNC, SqlArg};
pub use crate::parse::{ParseError, ParseErrorKind};
pub use crate::placeholder::Placeholder;
pub use crate::value::SqlValue;
pub use serde_json::Value;

/// 推荐的便捷命名空间：允许 `use halo_space::sqltemplate::{...}` 形式导入。
pub mod sqltemplate {
    pub use crate::*;
}
