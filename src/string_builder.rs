//! 模板输出缓冲区。

#[derive(Debug, Default, Clone)]
pub(crate) struct StringBuilder {
    buf: String,
}

impl StringBuilder {
    pub(crate) fn new() -> Self {
        Self { buf: String::new() }
    }

    pub(crate) fn write_str(&mut self, s: &str) {
        self.buf.push_str(s);
    }

    pub(crate) fn write_char(&mut self, c: char) {
        self.buf.push(c);
    }

    /// 写入 `items`，两两之间插入 `sep`。
    pub(crate) fn write_joined(&mut self, items: &[String], sep: &str) {
        for (i, s) in items.iter().enumerate() {
            if i > 0 {
                self.buf.push_str(sep);
            }
            self.buf.push_str(s);
        }
    }

    pub(crate) fn as_mut_string(&mut self) -> &mut String {
        &mut self.buf
    }

    pub(crate) fn into_string(self) -> String {
        self.buf
    }
}
