//! Args：按求值顺序收集参数，并为每个参数生成 `$n` 占位符。
//!
//! 一个 `Args` 只服务于一次渲染；它只会追加，不会修改已有参数。

use crate::placeholder::Placeholder;
use crate::value::SqlValue;
use std::cell::RefCell;
use std::rc::Rc;

/// 一次渲染中被 `__sql_arg__` 与执行方共享的收集器。
pub type ArgsRef = Rc<RefCell<Args>>;

/// Args 存储一次渲染中收集到的 SQL 参数。
///
/// 参数个数就是下一个占位符的计数器：第 n 次 `record` 返回 n。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    arg_values: Vec<SqlValue>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record：追加一个参数，返回它的 1-based 位置。
    pub fn record(&mut self, arg: impl Into<SqlValue>) -> usize {
        self.arg_values.push(arg.into());
        self.arg_values.len()
    }

    /// Add：追加一个参数并返回对应的占位符文本（`$1/$2/...`）。
    pub fn add(&mut self, arg: impl Into<SqlValue>) -> String {
        let mut s = String::new();
        Placeholder(self.record(arg)).write_to(&mut s);
        s
    }

    /// Value：按 `$<n>` 前缀查找参数值，`placeholder` 可以带后缀（如 `"$1::text"`）。
    pub fn value(&self, placeholder: &str) -> Option<&SqlValue> {
        let (p, _) = Placeholder::parse_prefix(placeholder)?;
        self.arg_values.get(p.index() - 1)
    }

    pub fn len(&self) -> usize {
        self.arg_values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arg_values.is_empty()
    }

    /// 按插入顺序返回当前所有参数。
    pub fn values(&self) -> &[SqlValue] {
        &self.arg_values
    }

    pub fn snapshot(&self) -> Vec<SqlValue> {
        self.arg_values.clone()
    }

    pub fn into_values(self) -> Vec<SqlValue> {
        self.arg_values
    }
}
