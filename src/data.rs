//! 模板数据（`serde_json::Value`）的真值判断、打印与比较。

use serde_json::{Number, Value};
use std::cmp::Ordering;

/// 对齐 go 模板的真值：`false`、`0`、`nil`、空字符串/数组/对象为假。
pub(crate) fn is_true(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(m) => !m.is_empty(),
    }
}

pub(crate) fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int",
        Value::String(_) => "string",
        Value::Array(_) => "slice",
        Value::Object(_) => "map",
    }
}

/// 动作输出：顶层 `nil` 打印为 `<no value>`，其余按 [`write_value`]。
pub(crate) fn write_action_value(v: &Value, out: &mut String) {
    if v.is_null() {
        out.push_str("<no value>");
    } else {
        write_value(v, out);
    }
}

/// 按 go `%v` 的习惯打印：字符串原样，数组 `[a b]`，对象 `map[k:v]`。
pub(crate) fn write_value(v: &Value, out: &mut String) {
    match v {
        Value::Null => out.push_str("<nil>"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(s),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push_str("map[");
            for (i, (k, item)) in map.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                out.push_str(k);
                out.push(':');
                write_value(item, out);
            }
            out.push(']');
        }
    }
}

pub(crate) fn to_display(v: &Value) -> String {
    let mut s = String::new();
    write_value(v, &mut s);
    s
}

/// 整数值（浮点数不算）。
pub(crate) fn as_int(v: &Value) -> Option<i128> {
    match v {
        Value::Number(n) => n
            .as_i64()
            .map(i128::from)
            .or_else(|| n.as_u64().map(i128::from)),
        _ => None,
    }
}

fn compare_numbers(a: &Number, b: &Number) -> Option<Ordering> {
    let int = |n: &Number| n.as_i64().map(i128::from).or_else(|| n.as_u64().map(i128::from));
    match (int(a), int(b)) {
        (Some(x), Some(y)) => Some(x.cmp(&y)),
        _ => a.as_f64()?.partial_cmp(&b.as_f64()?),
    }
}

/// 比较两个基本类型的值；类型不兼容或不可比较时返回 `None`。
///
/// 数字之间不区分整数与浮点：JSON 数字没有静态类型，`f64` 的 `2.0`
/// 序列化后也是浮点，所以 `lt 1 1.5` 按数值比较。
pub(crate) fn compare(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => compare_numbers(x, y),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        _ => None,
    }
}

/// `eq` 的语义：`nil` 可以与任意值比较（只等于 `nil`），数组/对象不可比较。
///
/// 与 `compare` 一样按数值比较数字，`eq 2 2.0` 为真，不会报类型不兼容。
pub(crate) fn equal(a: &Value, b: &Value) -> Option<bool> {
    match (a, b) {
        (Value::Null, _) | (_, Value::Null) => Some(a.is_null() && b.is_null()),
        (Value::Array(_) | Value::Object(_), _) | (_, Value::Array(_) | Value::Object(_)) => None,
        _ => compare(a, b).map(|o| o == Ordering::Equal),
    }
}
