//! `__sql_arg__`：把值收进 [`Args`] 并在 SQL 中留下 `$n` 占位符。
//!
//! 每次渲染都会新建一个 `Args` 和绑定到它的 `SqlArg`，二者共享同一个
//! [`ArgsRef`]；不存在全局的收集器。

use crate::args::ArgsRef;
use crate::funcs::{FuncError, Function};
use crate::placeholder::Placeholder;
use serde_json::Value;

/// 模板中用于提取参数的函数名（保留名，不能被用户函数占用）。
pub const SQL_ARG_FUNC: &str = "__sql_arg__";

/// 绑定到一次渲染的参数收集函数。
#[derive(Debug, Clone)]
pub struct SqlArg {
    args: ArgsRef,
}

impl SqlArg {
    pub fn new(args: ArgsRef) -> Self {
        Self { args }
    }
}

impl Function for SqlArg {
    /// 接受任意类型的单个值；每次调用都会生成新的序号，相同的值也不会复用占位符。
    fn call(&self, args: &[Value]) -> Result<Value, FuncError> {
        let [value] = args else {
            return Err(FuncError::ArgCount {
                got: args.len(),
                want: 1,
            });
        };
        // 收集器只在这里被可变借用；重入意味着执行器的不变量被破坏，直接 panic。
        let index = self.args.borrow_mut().record(value.clone());
        tracing::trace!(index, "recorded sql arg");
        Ok(Value::String(Placeholder(index).to_string()))
    }
}
