/// Single-line text buffer edited only at its end.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct LineBuffer {
    text: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_text(text: &str) -> Self {
        Self {
            text: normalize_single_line(text),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_text(self) -> String {
        self.text
    }

    pub fn push(&mut self, ch: char) {
        let mut buffer = [0u8; 4];
        self.push_str(ch.encode_utf8(&mut buffer));
    }

    /// Appends `text` with newlines and tabs flattened to single spaces.
    pub fn push_str(&mut self, text: &str) {
        let normalized = normalize_single_line(text);
        if normalized.is_empty() {
            return;
        }
        self.text.push_str(&normalized);
    }

    /// Removes the last character. Returns false when the buffer was empty.
    pub fn pop(&mut self) -> bool {
        self.text.pop().is_some()
    }
}

fn normalize_single_line(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_was_break = false;

    for ch in text.chars() {
        match ch {
            '\n' | '\r' | '\t' => {
                if !last_was_break {
                    out.push(' ');
                }
                last_was_break = true;
            }
            other => {
                out.push(other);
                last_was_break = false;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_and_pop_work_on_unicode() {
        let mut buffer = LineBuffer::new();
        buffer.push_str("ab");
        buffer.push('λ');
        assert_eq!(buffer.as_str(), "abλ");
        assert!(buffer.pop());
        assert_eq!(buffer.as_str(), "ab");
    }

    #[test]
    fn pop_on_empty_buffer_is_a_no_op() {
        let mut buffer = LineBuffer::new();
        assert!(!buffer.pop());
        assert_eq!(buffer.as_str(), "");
    }

    #[test]
    fn pasted_line_breaks_become_single_spaces() {
        let mut buffer = LineBuffer::from_text("nix");
        buffer.push_str("\r\nflake\tcheck");
        assert_eq!(buffer.as_str(), "nix flake check");
    }

    #[test]
    fn typed_spaces_are_kept() {
        let mut buffer = LineBuffer::new();
        buffer.push('a');
        buffer.push(' ');
        buffer.push(' ');
        buffer.push('b');
        assert_eq!(buffer.into_text(), "a  b");
    }
}
