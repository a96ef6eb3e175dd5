//! 模板函数：`Function` trait、函数错误与内置函数（对齐 go `text/template` 的 builtins）。

use crate::data::{self, as_int, compare, equal, is_true, to_display, type_name};
use crate::string_builder::StringBuilder;
use serde_json::Value;
use std::cmp::Ordering;

/// 模板函数返回的错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FuncError {
    #[error("wrong number of args: got {got}, want {want}")]
    ArgCount { got: usize, want: usize },
    #[error("wrong number of args: got {got}, want at least {min}")]
    TooFewArgs { got: usize, min: usize },
    #[error("incompatible types for comparison")]
    Incomparable,
    #[error("len of type {0}")]
    NoLen(&'static str),
    #[error("can't index item of type {0}")]
    NotIndexable(&'static str),
    #[error("index out of range: {0}")]
    OutOfRange(i128),
    #[error("cannot index {container} with {index}")]
    BadIndex {
        container: &'static str,
        index: &'static str,
    },
    #[error("{0}")]
    Custom(String),
}

impl FuncError {
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }
}

/// 可在模板里调用的函数：参数按求值顺序传入（pipeline 的上一级结果在最后）。
pub trait Function {
    fn call(&self, args: &[Value]) -> Result<Value, FuncError>;
}

impl<F> Function for F
where
    F: Fn(&[Value]) -> Result<Value, FuncError>,
{
    fn call(&self, args: &[Value]) -> Result<Value, FuncError> {
        self(args)
    }
}

pub(crate) type Builtin = fn(&[Value]) -> Result<Value, FuncError>;

/// 内置函数表；`and`/`or` 在执行器里短路求值，这里的实现只在整体传参时使用。
pub(crate) const BUILTINS: &[(&str, Builtin)] = &[
    ("and", and),
    ("or", or),
    ("not", not),
    ("len", len),
    ("index", index),
    ("eq", eq),
    ("ne", ne),
    ("lt", lt),
    ("le", le),
    ("gt", gt),
    ("ge", ge),
    ("print", print),
    ("println", println),
    ("printf", printf),
];

pub(crate) fn is_builtin(name: &str) -> bool {
    BUILTINS.iter().any(|(n, _)| *n == name)
}

fn want(args: &[Value], n: usize) -> Result<(), FuncError> {
    if args.len() != n {
        return Err(FuncError::ArgCount {
            got: args.len(),
            want: n,
        });
    }
    Ok(())
}

fn at_least(args: &[Value], min: usize) -> Result<(), FuncError> {
    if args.len() < min {
        return Err(FuncError::TooFewArgs {
            got: args.len(),
            min,
        });
    }
    Ok(())
}

fn and(args: &[Value]) -> Result<Value, FuncError> {
    at_least(args, 1)?;
    let pick = args.iter().find(|v| !is_true(v)).unwrap_or(&args[args.len() - 1]);
    Ok(pick.clone())
}

fn or(args: &[Value]) -> Result<Value, FuncError> {
    at_least(args, 1)?;
    let pick = args.iter().find(|v| is_true(v)).unwrap_or(&args[args.len() - 1]);
    Ok(pick.clone())
}

fn not(args: &[Value]) -> Result<Value, FuncError> {
    want(args, 1)?;
    Ok(Value::Bool(!is_true(&args[0])))
}

fn len(args: &[Value]) -> Result<Value, FuncError> {
    want(args, 1)?;
    let n = match &args[0] {
        Value::String(s) => s.len(),
        Value::Array(a) => a.len(),
        Value::Object(m) => m.len(),
        other => return Err(FuncError::NoLen(type_name(other))),
    };
    Ok(Value::from(n))
}

/// `index x 1 2` 等价于 `x[1][2]`；对象中不存在的键返回 `nil`。
fn index(args: &[Value]) -> Result<Value, FuncError> {
    at_least(args, 1)?;
    let mut item = args[0].clone();
    for idx in &args[1..] {
        item = match (item, idx) {
            (Value::Array(mut items), _) => {
                let i = as_int(idx).ok_or(FuncError::BadIndex {
                    container: "slice",
                    index: type_name(idx),
                })?;
                if i < 0 || i >= items.len() as i128 {
                    return Err(FuncError::OutOfRange(i));
                }
                items.swap_remove(i as usize)
            }
            (Value::Object(mut map), Value::String(key)) => map.remove(key).unwrap_or(Value::Null),
            (Value::Object(_), other) => {
                return Err(FuncError::BadIndex {
                    container: "map",
                    index: type_name(other),
                });
            }
            (other, _) => return Err(FuncError::NotIndexable(type_name(&other))),
        };
    }
    Ok(item)
}

/// `eq a b c` 为真当且仅当 `a == b || a == c`。
fn eq(args: &[Value]) -> Result<Value, FuncError> {
    at_least(args, 2)?;
    for other in &args[1..] {
        if equal(&args[0], other).ok_or(FuncError::Incomparable)? {
            return Ok(Value::Bool(true));
        }
    }
    Ok(Value::Bool(false))
}

fn ne(args: &[Value]) -> Result<Value, FuncError> {
    want(args, 2)?;
    let same = equal(&args[0], &args[1]).ok_or(FuncError::Incomparable)?;
    Ok(Value::Bool(!same))
}

fn ordered(args: &[Value], accept: fn(Ordering) -> bool) -> Result<Value, FuncError> {
    want(args, 2)?;
    if args[0].is_null() || args[1].is_null() {
        return Err(FuncError::Incomparable);
    }
    let ord = compare(&args[0], &args[1]).ok_or(FuncError::Incomparable)?;
    Ok(Value::Bool(accept(ord)))
}

fn lt(args: &[Value]) -> Result<Value, FuncError> {
    ordered(args, Ordering::is_lt)
}

fn le(args: &[Value]) -> Result<Value, FuncError> {
    ordered(args, Ordering::is_le)
}

fn gt(args: &[Value]) -> Result<Value, FuncError> {
    ordered(args, Ordering::is_gt)
}

fn ge(args: &[Value]) -> Result<Value, FuncError> {
    ordered(args, Ordering::is_ge)
}

/// 对齐 go `fmt.Sprint`：相邻两个操作数都不是字符串时才插入空格。
fn print(args: &[Value]) -> Result<Value, FuncError> {
    let mut out = String::new();
    for (i, v) in args.iter().enumerate() {
        if i > 0 && !v.is_string() && !args[i - 1].is_string() {
            out.push(' ');
        }
        data::write_value(v, &mut out);
    }
    Ok(Value::String(out))
}

/// 对齐 go `fmt.Sprintln`：总是以空格分隔，并以换行结尾。
fn println(args: &[Value]) -> Result<Value, FuncError> {
    let parts: Vec<String> = args.iter().map(to_display).collect();
    let mut out = StringBuilder::new();
    out.write_joined(&parts, " ");
    out.write_char('\n');
    Ok(Value::String(out.into_string()))
}

/// `printf`：支持 `%v %s %d %q %t %f %%`，不支持宽度与精度标记。
fn printf(args: &[Value]) -> Result<Value, FuncError> {
    at_least(args, 1)?;
    let Value::String(format) = &args[0] else {
        return Err(FuncError::custom(format!(
            "format must be a string, got {}",
            type_name(&args[0])
        )));
    };

    let mut out = StringBuilder::new();
    let mut rest = args[1..].iter();
    let mut chars = format.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.write_char(c);
            continue;
        }
        let Some(verb) = chars.next() else {
            out.write_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.write_char('%');
            continue;
        }
        let Some(arg) = rest.next() else {
            out.write_str(&format!("%!{verb}(MISSING)"));
            continue;
        };
        match (verb, arg) {
            ('v', v) => data::write_value(v, out.as_mut_string()),
            ('s', Value::String(s)) => out.write_str(s),
            ('d', v) if as_int(v).is_some() => out.write_str(&to_display(v)),
            ('q', Value::String(s)) => out.write_str(&format!("{s:?}")),
            ('t', Value::Bool(b)) => out.write_str(&b.to_string()),
            ('f', Value::Number(n)) => {
                out.write_str(&format!("{:.6}", n.as_f64().unwrap_or_default()))
            }
            (verb, v) => out.write_str(&format!("%!{verb}({}={})", type_name(v), to_display(v))),
        }
    }

    let extra: Vec<String> = rest
        .map(|v| format!("{}={}", type_name(v), to_display(v)))
        .collect();
    if !extra.is_empty() {
        out.write_str("%!(EXTRA ");
        out.write_joined(&extra, ", ");
        out.write_char(')');
    }
    Ok(Value::String(out.into_string()))
}
