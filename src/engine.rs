//! Engine / Template / render：解析模板并渲染为 `(sql, args)`。
//!
//! `Engine` 与 `Template` 只保存函数表和语法树，不保存任何参数状态；
//! 每次 `execute` 都会新建 `Args` 并把 `__sql_arg__` 绑定到它，
//! 所以同一个 `Template` 可以在多个线程里并发执行。

use crate::args::{Args, ArgsRef};
use crate::exec::{self, ExecError, ExecErrorKind, FuncMap};
use crate::funcs::{self, FuncError, Function};
use crate::marker::{SQL_ARG_FUNC, SqlArg};
use crate::node::TreeSet;
use crate::parse::{self, ParseError};
use crate::value::SqlValue;
use serde::Serialize;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

/// 未指定名字时的模板名（出现在错误信息中）。
pub const DEFAULT_TEMPLATE_NAME: &str = "sql";

/// 执行时控制块（`if`/`with`/`range`）与 `template`/`block` 调用合计的默认最大嵌套深度。
pub const DEFAULT_MAX_DEPTH: usize = 100;

type SharedFunc = Arc<dyn Function + Send + Sync>;

/// 渲染失败：模板本身有语法错误，或执行时数据与模板不匹配。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RenderError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Exec(#[from] ExecError),
}

impl RenderError {
    pub fn is_parse(&self) -> bool {
        matches!(self, Self::Parse(_))
    }

    pub fn is_exec(&self) -> bool {
        matches!(self, Self::Exec(_))
    }
}

/// 注册用户函数失败。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegisterError {
    #[error("function name {0:?} is reserved")]
    Reserved(String),
    #[error("function name {0:?} is not a valid identifier")]
    InvalidName(String),
}

/// 模板引擎配置：用户函数与执行深度限制。
#[derive(Clone)]
pub struct Engine {
    funcs: HashMap<String, SharedFunc>,
    max_depth: usize,
}

impl Default for Engine {
    fn default() -> Self {
        Self {
            funcs: HashMap::new(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.funcs.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("Engine")
            .field("funcs", &names)
            .field("max_depth", &self.max_depth)
            .finish()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    /// AddFunc：注册一个可在模板中调用的函数。
    ///
    /// 内置函数名与 `__sql_arg__` 是保留名；重复注册同名函数会覆盖旧的实现。
    pub fn add_func<F>(&mut self, name: impl Into<String>, f: F) -> Result<&mut Self, RegisterError>
    where
        F: Fn(&[Value]) -> Result<Value, FuncError> + Send + Sync + 'static,
    {
        let name = name.into();
        if name == SQL_ARG_FUNC || funcs::is_builtin(&name) {
            return Err(RegisterError::Reserved(name));
        }
        if !is_identifier(&name) {
            return Err(RegisterError::InvalidName(name));
        }
        self.funcs.insert(name, Arc::new(f));
        Ok(self)
    }

    pub fn set_max_depth(&mut self, depth: usize) -> &mut Self {
        self.max_depth = depth;
        self
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    fn is_func(&self, name: &str) -> bool {
        name == SQL_ARG_FUNC || funcs::is_builtin(name) || self.funcs.contains_key(name)
    }

    /// Parse：以默认名字解析模板。
    pub fn parse(&self, source: &str) -> Result<Template, ParseError> {
        self.parse_named(DEFAULT_TEMPLATE_NAME, source)
    }

    /// ParseNamed：解析模板；`name` 出现在错误信息中，也可被 `{{template}}` 引用。
    pub fn parse_named(&self, name: &str, source: &str) -> Result<Template, ParseError> {
        let set = parse::parse(name, source, &|n| self.is_func(n)).inspect_err(|e| {
            tracing::debug!(template = name, error = %e, "failed to parse sql template");
        })?;
        tracing::debug!(template = name, defines = set.defs.len(), "parsed sql template");
        Ok(Template {
            set,
            funcs: self.funcs.clone(),
            max_depth: self.max_depth,
        })
    }

    /// Render：解析并执行模板，返回带 `$n` 占位符的 SQL 与按顺序排列的参数。
    pub fn render<T>(&self, source: &str, data: &T) -> Result<(String, Vec<SqlValue>), RenderError>
    where
        T: Serialize + ?Sized,
    {
        let tmpl = self.parse(source)?;
        Ok(tmpl.execute(data)?)
    }
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c == '_' || c.is_alphabetic())
        && chars.all(|c| c == '_' || c.is_alphanumeric())
}

/// 解析后的模板，可重复执行。
#[derive(Clone)]
pub struct Template {
    set: TreeSet,
    funcs: HashMap<String, SharedFunc>,
    max_depth: usize,
}

impl std::fmt::Debug for Template {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut defines: Vec<&str> = self.set.defs.keys().map(String::as_str).collect();
        defines.sort_unstable();
        f.debug_struct("Template")
            .field("name", &self.set.name)
            .field("defines", &defines)
            .finish()
    }
}

impl Template {
    pub fn name(&self) -> &str {
        &self.set.name
    }

    /// Execute：在 `data` 上执行模板，`data` 可以是任意可序列化的结构体或 map。
    pub fn execute<T>(&self, data: &T) -> Result<(String, Vec<SqlValue>), ExecError>
    where
        T: Serialize + ?Sized,
    {
        let value = serde_json::to_value(data).map_err(|e| {
            ExecError::new(self.name(), 0, ExecErrorKind::InvalidContext(e.to_string()))
        })?;
        self.execute_value(&value)
    }

    /// ExecuteValue：在已经是 `serde_json::Value` 的数据上执行模板。
    pub fn execute_value(&self, data: &Value) -> Result<(String, Vec<SqlValue>), ExecError> {
        let args: ArgsRef = Rc::new(RefCell::new(Args::new()));
        let marker = SqlArg::new(Rc::clone(&args));

        let mut table: FuncMap<'_> =
            HashMap::with_capacity(funcs::BUILTINS.len() + self.funcs.len() + 1);
        for (name, f) in funcs::BUILTINS {
            table.insert(*name, f as &dyn Function);
        }
        for (name, f) in &self.funcs {
            table.insert(name.as_str(), &**f as &dyn Function);
        }
        table.insert(SQL_ARG_FUNC, &marker);

        let sql = exec::execute(&self.set, &table, data, self.max_depth).inspect_err(|e| {
            tracing::debug!(template = self.name(), error = %e, "failed to execute sql template");
        })?;
        drop(table);

        let values = args.take().into_values();
        tracing::debug!(template = self.name(), args = values.len(), "rendered sql template");
        Ok((sql, values))
    }
}

/// Render：用默认配置渲染模板，每次调用都使用全新的参数收集器。
///
/// ```
/// use halo_space::SqlValue;
/// use serde_json::json;
///
/// let (sql, args) = halo_space::render(
///     "SELECT * FROM t WHERE a = {{ .A | __sql_arg__ }} AND b = {{ .B | __sql_arg__ }}",
///     &json!({"A": "x", "B": 5}),
/// )
/// .unwrap();
/// assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
/// assert_eq!(args, vec![SqlValue::from("x"), SqlValue::I64(5)]);
/// ```
pub fn render<T>(source: &str, data: &T) -> Result<(String, Vec<SqlValue>), RenderError>
where
    T: Serialize + ?Sized,
{
    Engine::new().render(source, data)
}
