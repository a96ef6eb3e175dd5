//! 模板解析：把 `lexer` 切出的片段组装为语法树（对齐 go `text/template/parse` 的子集）。
//!
//! 解析阶段只做语法与名字检查（函数、变量是否已定义），不会执行任何函数，
//! 因此解析失败时不会产生任何参数。

use crate::lexer::{self, Item, Token};
use crate::node::{Branch, Command, List, Node, Operand, Pipe, TreeSet};
use serde_json::Number;
use std::collections::HashMap;

/// 控制块、具名模板体与括号 pipeline 的最大嵌套层数。
pub const MAX_NESTING: usize = 100;

/// 模板语法错误。
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("template: {template}:{line}: {kind}")]
pub struct ParseError {
    pub template: String,
    pub line: usize,
    pub kind: ParseErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseErrorKind {
    #[error("unclosed action")]
    UnclosedAction,
    #[error("unclosed comment")]
    UnclosedComment,
    #[error("comment ends before closing delimiter")]
    CommentNotClosedByDelim,
    #[error("unterminated quoted string")]
    UnterminatedString,
    #[error("invalid escape sequence \\{0}")]
    BadEscape(char),
    #[error("unexpected {0:?} in action")]
    UnexpectedChar(char),
    #[error("unexpected {token} in {context}")]
    UnexpectedToken { token: String, context: String },
    #[error("unexpected {0}")]
    UnexpectedDirective(&'static str),
    #[error("unexpected EOF")]
    UnexpectedEof,
    #[error("missing value for {0}")]
    MissingValue(String),
    #[error("empty command")]
    EmptyCommand,
    #[error("non executable command in pipeline stage {0}")]
    NonExecutable(usize),
    #[error("unclosed left paren")]
    UnclosedParen,
    #[error("unexpected right paren")]
    UnexpectedRightParen,
    #[error("too many declarations in {0}")]
    TooManyDecls(String),
    #[error("bad number syntax: {0:?}")]
    BadNumber(String),
    #[error("function {0:?} not defined")]
    UndefinedFunction(String),
    #[error("undefined variable {0:?}")]
    UndefinedVariable(String),
    #[error("{0} outside range")]
    OutsideRange(&'static str),
    #[error("template {0:?} redefined")]
    Redefined(String),
    #[error("max nesting depth {0} exceeded")]
    TooDeep(usize),
}

/// 解析 `source`，`is_func` 用于判断某个标识符是否是已注册的函数。
pub(crate) fn parse(
    name: &str,
    source: &str,
    is_func: &dyn Fn(&str) -> bool,
) -> Result<TreeSet, ParseError> {
    let items = lexer::split_items(source).map_err(|(line, kind)| ParseError {
        template: name.to_string(),
        line,
        kind,
    })?;

    let mut p = Parser {
        name,
        items,
        pos: 0,
        line: 1,
        is_func,
        vars: vec!["$".to_string()],
        range_depth: 0,
        nesting: 0,
        defs: HashMap::new(),
    };
    let (root, _) = p.parse_list(true)?;
    Ok(TreeSet {
        name: name.to_string(),
        root,
        defs: p.defs,
    })
}

/// `parse_list` 停下来的原因。
enum Stop {
    Eof,
    End,
    Else { rest: Vec<Token> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Control {
    If,
    With,
    Range,
}

impl Control {
    fn keyword(self) -> &'static str {
        match self {
            Self::If => "if",
            Self::With => "with",
            Self::Range => "range",
        }
    }
}

struct Parser<'s, 'f> {
    name: &'s str,
    items: Vec<Item<'s>>,
    pos: usize,
    line: usize,
    is_func: &'f dyn Fn(&str) -> bool,
    vars: Vec<String>,
    range_depth: usize,
    nesting: usize,
    defs: HashMap<String, List>,
}

impl Parser<'_, '_> {
    fn error(&self, kind: ParseErrorKind) -> ParseError {
        ParseError {
            template: self.name.to_string(),
            line: self.line,
            kind,
        }
    }

    fn unexpected(&self, tokens: &[Token], context: &str) -> ParseError {
        let token = tokens
            .first()
            .map(Token::describe)
            .unwrap_or_else(|| "end of action".to_string());
        self.error(ParseErrorKind::UnexpectedToken {
            token,
            context: context.to_string(),
        })
    }

    /// 在加深一层嵌套的情况下执行 `f`，超过 [`MAX_NESTING`] 时报错。
    fn nested<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.error(ParseErrorKind::TooDeep(MAX_NESTING)));
        }
        self.nesting += 1;
        let result = f(self);
        self.nesting -= 1;
        result
    }

    /// 解析到 `{{end}}`/`{{else}}` 或输入结束；`top` 表示模板最外层。
    fn parse_list(&mut self, top: bool) -> Result<(List, Stop), ParseError> {
        let mut list = Vec::new();

        while let Some(item) = self.items.get(self.pos).cloned() {
            self.pos += 1;
            let (body, line) = match item {
                Item::Text(t) => {
                    list.push(Node::Text(t.to_string()));
                    continue;
                }
                Item::Action { body, line } => (body, line),
            };

            self.line = line;
            let tokens = lexer::lex_action(body).map_err(|k| self.error(k))?;
            let keyword = match tokens.first() {
                Some(Token::Ident(kw)) => kw.as_str(),
                Some(_) => "",
                None => {
                    return Err(self.error(ParseErrorKind::MissingValue("command".to_string())));
                }
            };

            match keyword {
                "end" => {
                    if tokens.len() > 1 {
                        return Err(self.unexpected(&tokens[1..], "end"));
                    }
                    if top {
                        return Err(self.error(ParseErrorKind::UnexpectedDirective("{{end}}")));
                    }
                    return Ok((list, Stop::End));
                }
                "else" => {
                    if top {
                        return Err(self.error(ParseErrorKind::UnexpectedDirective("{{else}}")));
                    }
                    return Ok((list, Stop::Else {
                        rest: tokens[1..].to_vec(),
                    }));
                }
                "if" => list.push(self.nested(|p| p.parse_control(Control::If, &tokens[1..]))?),
                "with" => list.push(self.nested(|p| p.parse_control(Control::With, &tokens[1..]))?),
                "range" => {
                    list.push(self.nested(|p| p.parse_control(Control::Range, &tokens[1..]))?)
                }
                "define" => {
                    if !top {
                        return Err(self.unexpected(&tokens, "nested block"));
                    }
                    self.parse_define(&tokens[1..])?;
                }
                "template" => list.push(self.parse_template(&tokens[1..], false)?),
                "block" => list.push(self.parse_template(&tokens[1..], true)?),
                "break" | "continue" => {
                    if tokens.len() > 1 {
                        return Err(self.unexpected(&tokens[1..], keyword));
                    }
                    let (node, directive) = if keyword == "break" {
                        (Node::Break, "{{break}}")
                    } else {
                        (Node::Continue, "{{continue}}")
                    };
                    if self.range_depth == 0 {
                        return Err(self.error(ParseErrorKind::OutsideRange(directive)));
                    }
                    list.push(node);
                }
                _ => list.push(Node::Action(self.parse_pipe(&tokens, "command", 1)?)),
            }
        }

        if top {
            Ok((list, Stop::Eof))
        } else {
            Err(self.error(ParseErrorKind::UnexpectedEof))
        }
    }

    fn parse_control(&mut self, kind: Control, tokens: &[Token]) -> Result<Node, ParseError> {
        let saved = self.vars.len();
        let max_decl = if kind == Control::Range { 2 } else { 1 };
        let pipe = self.parse_pipe(tokens, kind.keyword(), max_decl)?;
        let after_pipe = self.vars.len();

        if kind == Control::Range {
            self.range_depth += 1;
        }
        let body = self.parse_list(false);
        if kind == Control::Range {
            self.range_depth -= 1;
        }
        let (list, stop) = body?;
        self.vars.truncate(after_pipe);

        let else_list = match stop {
            Stop::End => None,
            Stop::Eof => return Err(self.error(ParseErrorKind::UnexpectedEof)),
            Stop::Else { rest } => match rest.first() {
                None => match self.parse_list(false)? {
                    (else_list, Stop::End) => Some(else_list),
                    _ => return Err(self.error(ParseErrorKind::UnexpectedDirective("{{else}}"))),
                },
                // `{{else if ...}}` / `{{else with ...}}`：嵌套控制块与外层共享同一个 `{{end}}`。
                Some(Token::Ident(kw)) if kind != Control::Range && kw == kind.keyword() => {
                    Some(vec![self.nested(|p| p.parse_control(kind, &rest[1..]))?])
                }
                Some(_) => return Err(self.unexpected(&rest, "else")),
            },
        };
        self.vars.truncate(saved);

        let branch = Branch {
            pipe,
            list,
            else_list,
        };
        Ok(match kind {
            Control::If => Node::If(branch),
            Control::With => Node::With(branch),
            Control::Range => Node::Range(branch),
        })
    }

    fn parse_define(&mut self, tokens: &[Token]) -> Result<(), ParseError> {
        let [Token::String(name)] = tokens else {
            return Err(self.unexpected(tokens, "define clause"));
        };
        let body = self.parse_named_body()?;
        self.insert_def(name.clone(), body)
    }

    /// `template "name" [pipeline]`；`block` 额外把后续内容定义为同名模板。
    fn parse_template(&mut self, tokens: &[Token], is_block: bool) -> Result<Node, ParseError> {
        let context = if is_block { "block clause" } else { "template clause" };
        let Some(Token::String(name)) = tokens.first() else {
            return Err(self.unexpected(tokens, context));
        };
        let line = self.line;
        let pipe = if tokens.len() > 1 {
            Some(self.parse_pipe(&tokens[1..], context, 0)?)
        } else {
            None
        };
        if is_block {
            let body = self.parse_named_body()?;
            self.insert_def(name.clone(), body)?;
        }
        Ok(Node::Template {
            name: name.clone(),
            pipe,
            line,
        })
    }

    /// 具名模板有独立的变量作用域（只有 `$`），并且不在任何 range 之内。
    fn parse_named_body(&mut self) -> Result<List, ParseError> {
        let vars = std::mem::replace(&mut self.vars, vec!["$".to_string()]);
        let range_depth = std::mem::take(&mut self.range_depth);
        let result = self.nested(|p| p.parse_list(false));
        self.vars = vars;
        self.range_depth = range_depth;

        match result? {
            (list, Stop::End) => Ok(list),
            _ => Err(self.error(ParseErrorKind::UnexpectedDirective("{{else}}"))),
        }
    }

    fn insert_def(&mut self, name: String, body: List) -> Result<(), ParseError> {
        if name == self.name || self.defs.contains_key(&name) {
            return Err(self.error(ParseErrorKind::Redefined(name)));
        }
        self.defs.insert(name, body);
        Ok(())
    }

    /// 解析一个完整的 pipeline，`max_decl` 为允许声明的变量个数。
    fn parse_pipe(
        &mut self,
        tokens: &[Token],
        context: &str,
        max_decl: usize,
    ) -> Result<Pipe, ParseError> {
        let (decl, is_assign, consumed) = self.parse_decl(tokens, context, max_decl)?;
        let rest = &tokens[consumed..];
        if rest.is_empty() {
            return Err(self.error(ParseErrorKind::MissingValue(context.to_string())));
        }

        let mut pos = 0usize;
        let cmds = self.parse_cmds(rest, &mut pos, false)?;
        if pos < rest.len() {
            return Err(self.unexpected(&rest[pos..], context));
        }

        if !is_assign {
            self.vars.extend(decl.iter().cloned());
        }
        Ok(Pipe {
            line: self.line,
            decl,
            is_assign,
            cmds,
        })
    }

    /// 识别 `$x :=`、`$x =`、`$i, $e :=` 前缀，返回变量名、是否赋值、消耗的 token 数。
    fn parse_decl(
        &self,
        tokens: &[Token],
        context: &str,
        max_decl: usize,
    ) -> Result<(Vec<String>, bool, usize), ParseError> {
        let bare = |t: Option<&Token>| match t {
            Some(Token::Variable { name, fields }) if fields.is_empty() => Some(name.clone()),
            _ => None,
        };

        let Some(first) = bare(tokens.first()) else {
            return Ok((Vec::new(), false, 0));
        };
        let (names, op_at) = match tokens.get(1) {
            Some(Token::Comma) => match (bare(tokens.get(2)), tokens.get(3)) {
                (Some(second), Some(Token::Declare | Token::Assign)) => {
                    (vec![first, second], 3)
                }
                _ => return Err(self.unexpected(&tokens[1..], context)),
            },
            Some(Token::Declare | Token::Assign) => (vec![first], 1),
            _ => return Ok((Vec::new(), false, 0)),
        };

        if names.len() > max_decl {
            return Err(self.error(ParseErrorKind::TooManyDecls(context.to_string())));
        }
        let is_assign = tokens[op_at] == Token::Assign;
        if is_assign
            && let Some(missing) = names.iter().find(|n| !self.vars.contains(*n))
        {
            return Err(self.error(ParseErrorKind::UndefinedVariable(missing.clone())));
        }
        Ok((names, is_assign, op_at + 1))
    }

    fn parse_cmds(
        &mut self,
        tokens: &[Token],
        pos: &mut usize,
        in_paren: bool,
    ) -> Result<Vec<Command>, ParseError> {
        let mut cmds = Vec::new();
        loop {
            let cmd = self.parse_command(tokens, pos, in_paren)?;
            if !cmds.is_empty()
                && matches!(
                    cmd.args.first(),
                    Some(
                        Operand::Dot
                            | Operand::Nil
                            | Operand::Bool(_)
                            | Operand::Number(_)
                            | Operand::String(_)
                    )
                )
            {
                return Err(self.error(ParseErrorKind::NonExecutable(cmds.len() + 1)));
            }
            cmds.push(cmd);

            if tokens.get(*pos) == Some(&Token::Pipe) {
                *pos += 1;
                continue;
            }
            return Ok(cmds);
        }
    }

    fn parse_command(
        &mut self,
        tokens: &[Token],
        pos: &mut usize,
        in_paren: bool,
    ) -> Result<Command, ParseError> {
        let mut args = Vec::new();
        loop {
            match tokens.get(*pos) {
                None | Some(Token::Pipe) => break,
                Some(Token::RightParen) if in_paren => break,
                Some(Token::RightParen) => {
                    return Err(self.error(ParseErrorKind::UnexpectedRightParen));
                }
                Some(_) => args.push(self.parse_operand(tokens, pos)?),
            }
        }
        if args.is_empty() {
            return Err(self.error(ParseErrorKind::EmptyCommand));
        }
        Ok(Command { args })
    }

    fn parse_operand(&mut self, tokens: &[Token], pos: &mut usize) -> Result<Operand, ParseError> {
        let token = &tokens[*pos];
        *pos += 1;

        Ok(match token {
            Token::Dot => Operand::Dot,
            Token::Field(fields) => Operand::Field(fields.clone()),
            Token::Variable { name, fields } => {
                if !self.vars.contains(name) {
                    return Err(self.error(ParseErrorKind::UndefinedVariable(name.clone())));
                }
                Operand::Variable {
                    name: name.clone(),
                    fields: fields.clone(),
                }
            }
            Token::Ident(name) => {
                if !(self.is_func)(name) {
                    return Err(self.error(ParseErrorKind::UndefinedFunction(name.clone())));
                }
                Operand::Ident(name.clone())
            }
            Token::String(s) => Operand::String(s.clone()),
            Token::Number(text) => Operand::Number(
                parse_number(text).ok_or_else(|| self.error(ParseErrorKind::BadNumber(text.clone())))?,
            ),
            Token::Bool(b) => Operand::Bool(*b),
            Token::Nil => Operand::Nil,
            Token::LeftParen => {
                let cmds = self.nested(|p| p.parse_cmds(tokens, pos, true))?;
                if tokens.get(*pos) != Some(&Token::RightParen) {
                    return Err(self.error(ParseErrorKind::UnclosedParen));
                }
                *pos += 1;
                let fields = match tokens.get(*pos) {
                    Some(Token::Chain(fields)) => {
                        *pos += 1;
                        fields.clone()
                    }
                    _ => Vec::new(),
                };
                Operand::Pipe {
                    pipe: Box::new(Pipe {
                        line: self.line,
                        decl: Vec::new(),
                        is_assign: false,
                        cmds,
                    }),
                    fields,
                }
            }
            other => {
                return Err(self.error(ParseErrorKind::UnexpectedToken {
                    token: other.describe(),
                    context: "operand".to_string(),
                }));
            }
        })
    }
}

/// 数字字面量：十进制/十六进制/八进制/二进制整数与浮点数，允许 `_` 分隔。
fn parse_number(text: &str) -> Option<Number> {
    let clean = text.replace('_', "");
    let (negative, digits) = match clean.strip_prefix('-') {
        Some(d) => (true, d),
        None => (false, clean.strip_prefix('+').unwrap_or(clean.as_str())),
    };

    let radix = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .iter()
        .find_map(|&(prefix, radix)| digits.strip_prefix(prefix).map(|d| (d, radix)));
    let int = match radix {
        Some((d, radix)) => Some(u64::from_str_radix(d, radix).ok()?),
        None => digits.parse::<u64>().ok(),
    };

    if let Some(u) = int {
        return if negative {
            i64::try_from(-(u as i128)).ok().map(Number::from)
        } else {
            Some(Number::from(u))
        };
    }
    clean.parse::<f64>().ok().and_then(Number::from_f64)
}
