//! 解析后的模板语法树。

use std::collections::HashMap;

pub(crate) type List = Vec<Node>;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Text(String),
    /// `{{ pipeline }}`
    Action(Pipe),
    If(Branch),
    With(Branch),
    Range(Branch),
    /// `{{ template "name" pipeline }}`
    Template {
        name: String,
        pipe: Option<Pipe>,
        line: usize,
    },
    Break,
    Continue,
}

/// `if`/`with`/`range` 共用的结构。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Branch {
    pub(crate) pipe: Pipe,
    pub(crate) list: List,
    pub(crate) else_list: Option<List>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Pipe {
    pub(crate) line: usize,
    /// 声明/赋值的变量名（含 `$` 前缀）。
    pub(crate) decl: Vec<String>,
    pub(crate) is_assign: bool,
    pub(crate) cmds: Vec<Command>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Command {
    pub(crate) args: Vec<Operand>,
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Operand {
    Dot,
    Field(Vec<String>),
    Variable { name: String, fields: Vec<String> },
    /// 函数名。
    Ident(String),
    /// `(pipeline).A.B`
    Pipe { pipe: Box<Pipe>, fields: Vec<String> },
    String(String),
    Number(serde_json::Number),
    Bool(bool),
    Nil,
}

impl Operand {
    /// 用于错误信息的简短描述。
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Dot => ".".to_string(),
            Self::Field(f) => format!(".{}", f.join(".")),
            Self::Variable { name, fields } if fields.is_empty() => name.clone(),
            Self::Variable { name, fields } => format!("{name}.{}", fields.join(".")),
            Self::Ident(s) => s.clone(),
            Self::Pipe { .. } => "(...)".to_string(),
            Self::String(s) => format!("{s:?}"),
            Self::Number(n) => n.to_string(),
            Self::Bool(b) => b.to_string(),
            Self::Nil => "nil".to_string(),
        }
    }
}

/// 一次解析得到的全部模板：入口模板加上 `define`/`block` 定义的具名模板。
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TreeSet {
    pub(crate) name: String,
    pub(crate) root: List,
    pub(crate) defs: HashMap<String, List>,
}

impl TreeSet {
    pub(crate) fn lookup(&self, name: &str) -> Option<&List> {
        if name == self.name {
            return Some(&self.root);
        }
        self.defs.get(name)
    }
}
