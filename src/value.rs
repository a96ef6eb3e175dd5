//! SQL 参数值类型。

use serde_json::Value;
use std::borrow::Cow;

/// SQL 参数值。
///
/// 模板上下文里的数组/对象经过 `__sql_arg__` 时整体作为一个参数，保存在 `Json` 中。
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(Cow<'static, str>),
    Json(Value),
}

impl SqlValue {
    /// 将 `Option<T>` 映射为 `SqlValue`：`None => Null`，`Some(v) => v.into()`。
    pub fn from_option<T: Into<SqlValue>>(v: Option<T>) -> Self {
        match v {
            Some(v) => v.into(),
            None => Self::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<()> for SqlValue {
    fn from(_: ()) -> Self {
        Self::Null
    }
}

impl From<bool> for SqlValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

macro_rules! from_scalar {
    ($variant:ident as $target:ty: $($t:ty),+) => {
        $(
            impl From<$t> for SqlValue {
                fn from(v: $t) -> Self {
                    Self::$variant(<$target>::from(v))
                }
            }
        )+
    };
}

from_scalar!(I64 as i64: i8, i16, i32, i64);
from_scalar!(U64 as u64: u8, u16, u32, u64);
from_scalar!(F64 as f64: f32, f64);

impl From<String> for SqlValue {
    fn from(v: String) -> Self {
        Self::String(Cow::Owned(v))
    }
}

impl From<&'static str> for SqlValue {
    fn from(v: &'static str) -> Self {
        Self::String(Cow::Borrowed(v))
    }
}

impl From<Cow<'static, str>> for SqlValue {
    fn from(v: Cow<'static, str>) -> Self {
        Self::String(v)
    }
}

/// JSON 标量映射为对应的 SQL 标量；整数优先落在 `I64`，超出范围时用 `U64`。
impl From<Value> for SqlValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::I64(i)
                } else if let Some(u) = n.as_u64() {
                    Self::U64(u)
                } else {
                    Self::F64(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            Value::String(s) => Self::String(Cow::Owned(s)),
            v @ (Value::Array(_) | Value::Object(_)) => Self::Json(v),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::SqlValue;
    use serde_json::json;

    #[test]
    fn from_option_some() {
        assert_eq!(SqlValue::from_option(Some(123_i64)), SqlValue::I64(123));
    }

    #[test]
    fn from_option_none() {
        assert_eq!(SqlValue::from_option::<i64>(None), SqlValue::Null);
    }

    #[test]
    fn from_unit_is_null() {
        let v: SqlValue = ().into();
        assert!(v.is_null());
    }

    #[test]
    fn from_string_borrowed_and_owned() {
        let a: SqlValue = "abc".into();
        let b: SqlValue = String::from("abc").into();
        assert_eq!(a, b);
    }

    #[test]
    fn from_json_scalars() {
        assert_eq!(SqlValue::from(json!(null)), SqlValue::Null);
        assert_eq!(SqlValue::from(json!(true)), SqlValue::Bool(true));
        assert_eq!(SqlValue::from(json!(-5)), SqlValue::I64(-5));
        assert_eq!(SqlValue::from(json!(u64::MAX)), SqlValue::U64(u64::MAX));
        assert_eq!(SqlValue::from(json!(1.5)), SqlValue::F64(1.5));
        assert_eq!(SqlValue::from(json!("x")), SqlValue::from("x"));
    }

    #[test]
    fn from_json_composite_stays_json() {
        let v = json!([1, 2, 3]);
        assert_eq!(SqlValue::from(v.clone()), SqlValue::Json(v));
    }
}
