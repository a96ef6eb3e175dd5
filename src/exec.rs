//! 模板执行：在数据上下文上遍历语法树，把文本写入输出缓冲区。
//!
//! 求值顺序决定了 `__sql_arg__` 生成的 `$n` 编号，这里固定为深度优先、从左到右：
//!
//! - pipeline 的各级命令依次求值，上一级的结果作为下一级的最后一个参数；
//! - 函数调用前，参数按书写顺序从左到右求值；
//! - `and`/`or` 在能确定结果时停止求值，被跳过的参数不会记录参数；
//! - `if`/`with` 只执行被选中的分支；`range` 按迭代顺序逐次执行循环体（对象按键排序）；
//! - `template`/`block` 在调用处立即展开执行，而不是按其定义在源文本中的位置。

use crate::data::{self, as_int, is_true, type_name};
use crate::funcs::{FuncError, Function};
use crate::node::{Branch, Command, List, Node, Operand, Pipe, TreeSet};
use crate::string_builder::StringBuilder;
use serde_json::Value;
use std::collections::HashMap;

/// 一次执行可见的函数表（内置函数、用户函数与 `__sql_arg__`）。
pub(crate) type FuncMap<'f> = HashMap<&'f str, &'f dyn Function>;

/// 模板执行错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template: {template}:{line}: {kind}")]
pub struct ExecError {
    pub template: String,
    pub line: usize,
    pub kind: ExecErrorKind,
}

impl ExecError {
    pub(crate) fn new(template: impl Into<String>, line: usize, kind: ExecErrorKind) -> Self {
        Self {
            template: template.into(),
            line,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecErrorKind {
    #[error("map has no entry for key {0:?}")]
    MissingKey(String),
    #[error("nil pointer evaluating field {0:?}")]
    NilPointer(String),
    #[error("can't evaluate field {field} in type {type_name}")]
    CannotEvaluateField {
        field: String,
        type_name: &'static str,
    },
    #[error("can't give argument to non-function {0}")]
    NotAFunction(String),
    #[error("error calling {name}: {source}")]
    Func { name: String, source: FuncError },
    #[error("function {0:?} not defined")]
    UndefinedFunction(String),
    #[error("undefined variable {0:?}")]
    UndefinedVariable(String),
    #[error("range can't iterate over {0}")]
    CannotRange(&'static str),
    #[error("can't use {0} to iterate over more than one variable")]
    RangeTooManyVars(String),
    #[error("no such template {0:?}")]
    UndefinedTemplate(String),
    #[error("exceeded maximum nesting depth ({0})")]
    DepthExceeded(usize),
    #[error("invalid data context: {0}")]
    InvalidContext(String),
}

/// 执行 `set` 的入口模板，返回渲染后的文本。
pub(crate) fn execute(
    set: &TreeSet,
    funcs: &FuncMap<'_>,
    data: &Value,
    max_depth: usize,
) -> Result<String, ExecError> {
    let mut state = State {
        set,
        funcs,
        out: StringBuilder::new(),
        vars: vec![("$".to_string(), data.clone())],
        template: &set.name,
        depth: 0,
        max_depth,
    };
    state.walk_list(data, &set.root)?;
    Ok(state.out.into_string())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Normal,
    Break,
    Continue,
}

struct State<'a, 'f> {
    set: &'a TreeSet,
    funcs: &'a FuncMap<'f>,
    out: StringBuilder,
    vars: Vec<(String, Value)>,
    template: &'a str,
    depth: usize,
    max_depth: usize,
}

impl<'a> State<'a, '_> {
    fn error(&self, line: usize, kind: ExecErrorKind) -> ExecError {
        ExecError::new(self.template, line, kind)
    }

    fn walk_list(&mut self, dot: &Value, list: &'a List) -> Result<Flow, ExecError> {
        for node in list {
            let flow = self.walk(dot, node)?;
            if flow != Flow::Normal {
                return Ok(flow);
            }
        }
        Ok(Flow::Normal)
    }

    fn walk(&mut self, dot: &Value, node: &'a Node) -> Result<Flow, ExecError> {
        match node {
            Node::Text(s) => self.out.write_str(s),
            Node::Action(pipe) => {
                let v = self.eval_pipeline(dot, pipe)?;
                if pipe.decl.is_empty() {
                    data::write_action_value(&v, self.out.as_mut_string());
                }
            }
            Node::If(branch) => return self.walk_if(dot, branch, false),
            Node::With(branch) => return self.walk_if(dot, branch, true),
            Node::Range(branch) => return self.walk_range(dot, branch),
            Node::Template { name, pipe, line } => {
                self.walk_template(dot, name, pipe.as_ref(), *line)?
            }
            Node::Break => return Ok(Flow::Break),
            Node::Continue => return Ok(Flow::Continue),
        }
        Ok(Flow::Normal)
    }

    /// 控制块与 `template` 调用共用同一个深度计数，上限为 `max_depth`。
    fn descend(&mut self, line: usize) -> Result<(), ExecError> {
        if self.depth >= self.max_depth {
            return Err(self.error(line, ExecErrorKind::DepthExceeded(self.max_depth)));
        }
        self.depth += 1;
        Ok(())
    }

    /// `if` 与 `with`：`with` 在真分支里把 `.` 设为 pipeline 的值。
    fn walk_if(&mut self, dot: &Value, b: &'a Branch, is_with: bool) -> Result<Flow, ExecError> {
        self.descend(b.pipe.line)?;
        let mark = self.vars.len();
        let v = self.eval_pipeline(dot, &b.pipe)?;
        let flow = if is_true(&v) {
            let dot = if is_with { &v } else { dot };
            self.walk_list(dot, &b.list)?
        } else if let Some(else_list) = &b.else_list {
            self.walk_list(dot, else_list)?
        } else {
            Flow::Normal
        };
        self.vars.truncate(mark);
        self.depth -= 1;
        Ok(flow)
    }

    /// 声明的变量先绑定为整个被迭代的值，`else` 分支里也可见；每次迭代再覆盖为当前元素。
    fn walk_range(&mut self, dot: &Value, b: &'a Branch) -> Result<Flow, ExecError> {
        let line = b.pipe.line;
        self.descend(line)?;
        let mark = self.vars.len();
        let v = self.eval_pipeline(dot, &b.pipe)?;
        let mut ran = false;

        match v {
            Value::Array(items) => {
                for (i, elem) in items.into_iter().enumerate() {
                    ran = true;
                    if self.range_once(b, Value::from(i), elem)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Object(map) => {
                for (key, elem) in map {
                    ran = true;
                    if self.range_once(b, Value::String(key), elem)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Number(_) => {
                let Some(count) = as_int(&v) else {
                    return Err(self.error(line, ExecErrorKind::CannotRange(type_name(&v))));
                };
                if b.pipe.decl.len() > 1 {
                    return Err(self.error(line, ExecErrorKind::RangeTooManyVars(v.to_string())));
                }
                // 负数不迭代。
                for i in 0..count.max(0) {
                    ran = true;
                    let i = Value::from(i as u64);
                    if self.range_once(b, i.clone(), i)? == Flow::Break {
                        break;
                    }
                }
            }
            Value::Null => {}
            other => {
                return Err(self.error(line, ExecErrorKind::CannotRange(type_name(&other))));
            }
        }

        let flow = match &b.else_list {
            Some(else_list) if !ran => self.walk_list(dot, else_list)?,
            _ => Flow::Normal,
        };
        self.vars.truncate(mark);
        self.depth -= 1;
        Ok(flow)
    }

    /// 执行一次循环体；`$i, $e` 只在本次迭代内可见。
    fn range_once(&mut self, b: &'a Branch, key: Value, elem: Value) -> Result<Flow, ExecError> {
        let mark = self.vars.len();
        let line = b.pipe.line;
        match b.pipe.decl.as_slice() {
            [e] => self.bind(e, elem.clone(), b.pipe.is_assign, line)?,
            [k, e] => {
                self.bind(k, key, b.pipe.is_assign, line)?;
                self.bind(e, elem.clone(), b.pipe.is_assign, line)?;
            }
            _ => {}
        }
        let flow = self.walk_list(&elem, &b.list)?;
        self.vars.truncate(mark);
        Ok(flow)
    }

    /// `template` 在调用处展开：新的 `.` 与 `$` 为 pipeline 的值，变量作用域独立。
    fn walk_template(
        &mut self,
        dot: &Value,
        name: &'a str,
        pipe: Option<&'a Pipe>,
        line: usize,
    ) -> Result<(), ExecError> {
        let set = self.set;
        let Some(list) = set.lookup(name) else {
            return Err(self.error(line, ExecErrorKind::UndefinedTemplate(name.to_string())));
        };
        self.descend(line)?;
        let new_dot = match pipe {
            Some(p) => self.eval_pipeline(dot, p)?,
            None => Value::Null,
        };

        let vars = std::mem::replace(&mut self.vars, vec![("$".to_string(), new_dot.clone())]);
        let template = std::mem::replace(&mut self.template, name);
        let result = self.walk_list(&new_dot, list);
        self.depth -= 1;
        self.template = template;
        self.vars = vars;
        result.map(|_| ())
    }

    fn bind(&mut self, name: &str, value: Value, is_assign: bool, line: usize) -> Result<(), ExecError> {
        if !is_assign {
            self.vars.push((name.to_string(), value));
            return Ok(());
        }
        if let Some((_, slot)) = self.vars.iter_mut().rev().find(|(n, _)| n == name) {
            *slot = value;
            return Ok(());
        }
        Err(self.error(line, ExecErrorKind::UndefinedVariable(name.to_string())))
    }

    fn eval_pipeline(&mut self, dot: &Value, pipe: &Pipe) -> Result<Value, ExecError> {
        let v = self.eval_commands(dot, pipe)?;
        for name in &pipe.decl {
            self.bind(name, v.clone(), pipe.is_assign, pipe.line)?;
        }
        Ok(v)
    }

    fn eval_commands(&mut self, dot: &Value, pipe: &Pipe) -> Result<Value, ExecError> {
        let mut last: Option<Value> = None;
        for cmd in &pipe.cmds {
            last = Some(self.eval_command(dot, cmd, last.take(), pipe.line)?);
        }
        Ok(last.unwrap_or(Value::Null))
    }

    fn eval_command(
        &mut self,
        dot: &Value,
        cmd: &Command,
        fin: Option<Value>,
        line: usize,
    ) -> Result<Value, ExecError> {
        let Some((first, rest)) = cmd.args.split_first() else {
            return Ok(Value::Null);
        };
        match first {
            Operand::Ident(name) => self.call(dot, name, rest, fin, line),
            other => {
                if !rest.is_empty() || fin.is_some() {
                    return Err(self.error(line, ExecErrorKind::NotAFunction(other.describe())));
                }
                self.eval_operand(dot, other, line)
            }
        }
    }

    fn call(
        &mut self,
        dot: &Value,
        name: &str,
        operands: &[Operand],
        fin: Option<Value>,
        line: usize,
    ) -> Result<Value, ExecError> {
        if name == "and" || name == "or" {
            return self.call_logic(dot, name, operands, fin, line);
        }

        let funcs = self.funcs;
        let Some(&f) = funcs.get(name) else {
            return Err(self.error(line, ExecErrorKind::UndefinedFunction(name.to_string())));
        };
        let mut args = Vec::with_capacity(operands.len() + 1);
        for op in operands {
            args.push(self.eval_operand(dot, op, line)?);
        }
        args.extend(fin);
        f.call(&args).map_err(|source| {
            self.error(line, ExecErrorKind::Func {
                name: name.to_string(),
                source,
            })
        })
    }

    /// `and` 返回第一个假值（`or` 返回第一个真值），否则返回最后一个参数；决定结果后不再求值。
    fn call_logic(
        &mut self,
        dot: &Value,
        name: &str,
        operands: &[Operand],
        fin: Option<Value>,
        line: usize,
    ) -> Result<Value, ExecError> {
        let stop_on = name == "or";
        let got = operands.len() + usize::from(fin.is_some());
        if got == 0 {
            return Err(self.error(line, ExecErrorKind::Func {
                name: name.to_string(),
                source: FuncError::TooFewArgs { got, min: 1 },
            }));
        }

        let mut last = Value::Null;
        for op in operands {
            last = self.eval_operand(dot, op, line)?;
            if is_true(&last) == stop_on {
                return Ok(last);
            }
        }
        Ok(fin.unwrap_or(last))
    }

    fn eval_operand(&mut self, dot: &Value, op: &Operand, line: usize) -> Result<Value, ExecError> {
        match op {
            Operand::Dot => Ok(dot.clone()),
            Operand::Field(fields) => self.field_chain(dot, fields, line),
            Operand::Variable { name, fields } => {
                let v = self.lookup_var(name, line)?;
                self.field_chain(v, fields, line)
            }
            Operand::Ident(name) => self.call(dot, name, &[], None, line),
            Operand::Pipe { pipe, fields } => {
                let v = self.eval_commands(dot, pipe)?;
                self.field_chain(&v, fields, line)
            }
            Operand::String(s) => Ok(Value::String(s.clone())),
            Operand::Number(n) => Ok(Value::Number(n.clone())),
            Operand::Bool(b) => Ok(Value::Bool(*b)),
            Operand::Nil => Ok(Value::Null),
        }
    }

    fn lookup_var(&self, name: &str, line: usize) -> Result<&Value, ExecError> {
        self.vars
            .iter()
            .rev()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .ok_or_else(|| self.error(line, ExecErrorKind::UndefinedVariable(name.to_string())))
    }

    fn field_chain(&self, base: &Value, fields: &[String], line: usize) -> Result<Value, ExecError> {
        let mut cur = base;
        for field in fields {
            cur = match cur {
                Value::Object(map) => map
                    .get(field)
                    .ok_or_else(|| self.error(line, ExecErrorKind::MissingKey(field.clone())))?,
                Value::Null => {
                    return Err(self.error(line, ExecErrorKind::NilPointer(field.clone())));
                }
                other => {
                    return Err(self.error(line, ExecErrorKind::CannotEvaluateField {
                        field: field.clone(),
                        type_name: type_name(other),
                    }));
                }
            };
        }
        Ok(cur.clone())
    }
}
