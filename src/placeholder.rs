//! PostgreSQL 风格的位置占位符：`$1, $2, ...`。

use std::fmt;

/// 1-based 位置占位符。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Placeholder(pub usize);

impl Placeholder {
    pub fn index(self) -> usize {
        self.0
    }

    pub(crate) fn write_to(self, out: &mut String) {
        out.push('$');
        out.push_str(&self.0.to_string());
    }

    /// 解析以 `$<digits>` 开头的字符串，返回占位符与剩余部分（`$0` 不是合法占位符）。
    pub fn parse_prefix(s: &str) -> Option<(Self, &str)> {
        let digits = s.strip_prefix('$')?;
        let end = digits
            .as_bytes()
            .iter()
            .take_while(|b| b.is_ascii_digit())
            .count();
        if end == 0 {
            return None;
        }
        let n: usize = digits[..end].parse().ok()?;
        if n == 0 {
            return None;
        }
        Some((Self(n), &digits[end..]))
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", self.0)
    }
}
