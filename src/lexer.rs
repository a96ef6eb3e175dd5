//! 模板词法：把源文本切成文本段与动作段，再把动作内部切成 token。
//!
//! 语法对齐 go `text/template` 的子集：`{{ }}` 定界符、`{{- ` / ` -}}` 去空白标记、
//! `{{/* */}}` 注释。

use crate::parse::ParseErrorKind;

const LEFT_DELIM: &str = "{{";
const RIGHT_DELIM: &str = "}}";
const LEFT_COMMENT: &str = "/*";
const RIGHT_COMMENT: &str = "*/";

/// 源文本切分后的片段。
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Item<'a> {
    Text(&'a str),
    Action { body: &'a str, line: usize },
}

/// 动作内部的 token。
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Dot,
    /// `.A.B`
    Field(Vec<String>),
    /// 紧跟在 `)` 之后的 `.A.B`
    Chain(Vec<String>),
    /// `$`、`$x`、`$x.A`
    Variable {
        name: String,
        fields: Vec<String>,
    },
    Ident(String),
    String(String),
    Number(String),
    Bool(bool),
    Nil,
    Pipe,
    LeftParen,
    RightParen,
    Declare,
    Assign,
    Comma,
}

impl Token {
    pub(crate) fn describe(&self) -> String {
        match self {
            Self::Dot => "<.>".to_string(),
            Self::Field(f) | Self::Chain(f) => format!("<.{}>", f.join(".")),
            Self::Variable { name, fields } if fields.is_empty() => format!("<{name}>"),
            Self::Variable { name, fields } => format!("<{name}.{}>", fields.join(".")),
            Self::Ident(s) => format!("<{s}>"),
            Self::String(s) => format!("{s:?}"),
            Self::Number(s) => s.clone(),
            Self::Bool(b) => b.to_string(),
            Self::Nil => "nil".to_string(),
            Self::Pipe => "<|>".to_string(),
            Self::LeftParen => "<(>".to_string(),
            Self::RightParen => "<)>".to_string(),
            Self::Declare => "<:=>".to_string(),
            Self::Assign => "<=>".to_string(),
            Self::Comma => "<,>".to_string(),
        }
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_ident_start(c: char) -> bool {
    c == '_' || c.is_alphabetic()
}

fn is_ident_char(c: char) -> bool {
    c == '_' || c.is_alphanumeric()
}

fn line_at(source: &str, offset: usize) -> usize {
    source[..offset].bytes().filter(|&b| b == b'\n').count() + 1
}

/// 把源文本切成文本段与动作段；注释被丢弃，去空白标记在这里生效。
///
/// 失败时返回出错位置所在行号与错误类型。
pub(crate) fn split_items(source: &str) -> Result<Vec<Item<'_>>, (usize, ParseErrorKind)> {
    let mut items = Vec::new();
    let mut cursor = 0usize;

    while let Some(rel) = source[cursor..].find(LEFT_DELIM) {
        let open = cursor + rel;
        let line = line_at(source, open);
        let mut text = &source[cursor..open];
        let mut body_start = open + LEFT_DELIM.len();

        let after = &source[body_start..];
        let trim_left = after.starts_with('-') && after[1..].starts_with(is_space);
        if trim_left {
            text = text.trim_end_matches(is_space);
            body_start += 1;
        }
        if !text.is_empty() {
            items.push(Item::Text(text));
        }

        let end = find_action_end(source, body_start, trim_left).map_err(|kind| (line, kind))?;
        if !end.comment {
            let body = &source[body_start..end.close];
            let body = if end.trim_right { &body[..body.len() - 1] } else { body };
            items.push(Item::Action { body, line });
        }

        cursor = end.close + RIGHT_DELIM.len();
        if end.trim_right {
            let rest = &source[cursor..];
            cursor += rest.len() - rest.trim_start_matches(is_space).len();
        }
    }

    if cursor < source.len() {
        items.push(Item::Text(&source[cursor..]));
    }
    Ok(items)
}

/// 动作的结束位置。
struct ActionEnd {
    /// `}}` 的位置。
    close: usize,
    /// 是否带右侧去空白标记（` -}}`）。
    trim_right: bool,
    comment: bool,
}

/// 从 `from` 开始查找动作的结束定界符，跳过字符串字面量。
///
/// 注释必须紧跟 `{{`（或 `{{- ` 中的那个空白字符），并且紧跟着 `}}` 或 ` -}}` 结束。
fn find_action_end(source: &str, from: usize, trim_left: bool) -> Result<ActionEnd, ParseErrorKind> {
    let start = from + usize::from(trim_left);
    if source[start..].starts_with(LEFT_COMMENT) {
        let comment_start = start + LEFT_COMMENT.len();
        let Some(end) = source[comment_start..].find(RIGHT_COMMENT) else {
            return Err(ParseErrorKind::UnclosedComment);
        };
        let after = comment_start + end + RIGHT_COMMENT.len();
        let tail = &source[after..];
        if tail.starts_with(RIGHT_DELIM) {
            return Ok(ActionEnd {
                close: after,
                trim_right: false,
                comment: true,
            });
        }
        if tail.starts_with(is_space) && tail[1..].starts_with("-}}") {
            return Ok(ActionEnd {
                close: after + 2,
                trim_right: true,
                comment: true,
            });
        }
        return Err(ParseErrorKind::CommentNotClosedByDelim);
    }

    let bytes = source.as_bytes();
    let mut i = from;
    let mut quote: Option<u8> = None;
    while i < bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == b'\\' && q != b'`' {
                    i += 2;
                    continue;
                }
                if b == q {
                    quote = None;
                } else if b == b'\n' && q != b'`' {
                    return Err(ParseErrorKind::UnterminatedString);
                }
            }
            None => match b {
                b'"' | b'`' | b'\'' => quote = Some(b),
                b'}' if bytes.get(i + 1) == Some(&b'}') => {
                    let trim_right =
                        i >= from + 2 && bytes[i - 1] == b'-' && is_space(bytes[i - 2] as char);
                    return Ok(ActionEnd {
                        close: i,
                        trim_right,
                        comment: false,
                    });
                }
                _ => {}
            },
        }
        i += 1;
    }

    if quote.is_some() {
        return Err(ParseErrorKind::UnterminatedString);
    }
    Err(ParseErrorKind::UnclosedAction)
}

/// 把单个动作的内部文本切分为 token。
pub(crate) fn lex_action(body: &str) -> Result<Vec<Token>, ParseErrorKind> {
    let chars: Vec<char> = body.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if is_space(c) => i += 1,
            '|' => {
                tokens.push(Token::Pipe);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LeftParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RightParen);
                i += 1;
                if chars.get(i) == Some(&'.') && chars.get(i + 1).copied().is_some_and(is_ident_start)
                {
                    let (fields, next) = lex_fields(&chars, i);
                    tokens.push(Token::Chain(fields));
                    i = next;
                }
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            ':' => {
                if chars.get(i + 1) != Some(&'=') {
                    return Err(ParseErrorKind::UnexpectedChar(':'));
                }
                tokens.push(Token::Declare);
                i += 2;
            }
            '=' => {
                tokens.push(Token::Assign);
                i += 1;
            }
            '"' => {
                let (s, next) = lex_quote(&chars, i)?;
                tokens.push(Token::String(s));
                i = next;
            }
            '`' => {
                let start = i + 1;
                let Some(len) = chars[start..].iter().position(|&c| c == '`') else {
                    return Err(ParseErrorKind::UnterminatedString);
                };
                tokens.push(Token::String(chars[start..start + len].iter().collect()));
                i = start + len + 1;
            }
            '.' => {
                let next = chars.get(i + 1).copied();
                if next.is_some_and(is_ident_start) {
                    let (fields, end) = lex_fields(&chars, i);
                    tokens.push(Token::Field(fields));
                    i = end;
                } else if next.is_some_and(|c| c.is_ascii_digit()) {
                    let (n, end) = lex_number(&chars, i);
                    tokens.push(Token::Number(n));
                    i = end;
                } else {
                    tokens.push(Token::Dot);
                    i += 1;
                }
            }
            '$' => {
                let start = i;
                i += 1;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let name: String = chars[start..i].iter().collect();
                let mut fields = Vec::new();
                if chars.get(i) == Some(&'.') && chars.get(i + 1).copied().is_some_and(is_ident_start)
                {
                    let (f, end) = lex_fields(&chars, i);
                    fields = f;
                    i = end;
                }
                tokens.push(Token::Variable { name, fields });
            }
            '+' | '-' | '0'..='9' => {
                let (n, end) = lex_number(&chars, i);
                tokens.push(Token::Number(n));
                i = end;
            }
            c if is_ident_start(c) => {
                let start = i;
                while i < chars.len() && is_ident_char(chars[i]) {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Bool(true),
                    "false" => Token::Bool(false),
                    "nil" => Token::Nil,
                    _ => Token::Ident(word),
                });
            }
            other => return Err(ParseErrorKind::UnexpectedChar(other)),
        }
    }

    Ok(tokens)
}

/// `chars[start]` 为 `.`，读取 `.A.B.C` 直到链结束。
fn lex_fields(chars: &[char], start: usize) -> (Vec<String>, usize) {
    let mut fields = Vec::new();
    let mut i = start;
    while chars.get(i) == Some(&'.') && chars.get(i + 1).copied().is_some_and(is_ident_start) {
        let s = i + 1;
        i = s;
        while i < chars.len() && is_ident_char(chars[i]) {
            i += 1;
        }
        fields.push(chars[s..i].iter().collect());
    }
    (fields, i)
}

fn lex_number(chars: &[char], start: usize) -> (String, usize) {
    let mut i = start;
    if matches!(chars.get(i), Some('+') | Some('-')) {
        i += 1;
    }
    while i < chars.len() {
        let c = chars[i];
        let signed_exponent = matches!(c, '+' | '-')
            && matches!(chars.get(i - 1), Some('e') | Some('E') | Some('p') | Some('P'))
            && !chars[start..i].iter().any(|c| matches!(c, 'x' | 'X'));
        if c.is_ascii_alphanumeric() || c == '.' || c == '_' || signed_exponent {
            i += 1;
        } else {
            break;
        }
    }
    (chars[start..i].iter().collect(), i)
}

fn lex_quote(chars: &[char], start: usize) -> Result<(String, usize), ParseErrorKind> {
    let mut out = String::new();
    let mut i = start + 1;
    while i < chars.len() {
        match chars[i] {
            '"' => return Ok((out, i + 1)),
            '\\' => {
                let Some(&esc) = chars.get(i + 1) else {
                    return Err(ParseErrorKind::UnterminatedString);
                };
                i += 2;
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    '0' => out.push('\0'),
                    '\\' => out.push('\\'),
                    '"' => out.push('"'),
                    '\'' => out.push('\''),
                    'x' | 'u' => {
                        let width = if esc == 'x' { 2 } else { 4 };
                        let hex: String = chars.get(i..i + width).unwrap_or(&[]).iter().collect();
                        let decoded = (hex.len() == width)
                            .then(|| u32::from_str_radix(&hex, 16).ok())
                            .flatten()
                            .and_then(char::from_u32)
                            .ok_or(ParseErrorKind::BadEscape(esc))?;
                        out.push(decoded);
                        i += width;
                    }
                    other => return Err(ParseErrorKind::BadEscape(other)),
                }
            }
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ParseErrorKind::UnterminatedString)
}
