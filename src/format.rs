//! Full-document formatter for the `jevt.json` field.
//!
//! The input is re-indented token by token instead of being decoded into a
//! `serde_json::Value`. Member order, duplicate keys, string escapes and
//! number text all come out exactly as they went in, and nesting depth is
//! only bounded by memory.

const INDENT: &[u8] = b"  ";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Container {
    Object,
    Array,
}

impl Container {
    fn close(self) -> u8 {
        match self {
            Container::Object => b'}',
            Container::Array => b']',
        }
    }
}

/// Re-indent a raw JSON document with a two-space indent.
///
/// Whitespace between tokens is replaced, everything else is copied.
/// Returns `None` if `raw` is not a single valid JSON value.
pub fn pretty_print(raw: &[u8]) -> Option<String> {
    let mut indenter = Indenter::new(raw);
    indenter.run()?;
    String::from_utf8(indenter.out).ok()
}

struct Indenter<'a> {
    src: &'a [u8],
    pos: usize,
    out: Vec<u8>,
    open: Vec<Container>,
}

impl<'a> Indenter<'a> {
    fn new(src: &'a [u8]) -> Self {
        Indenter {
            src,
            pos: 0,
            out: Vec::with_capacity(src.len() + src.len() / 2),
            open: Vec::new(),
        }
    }

    fn run(&mut self) -> Option<()> {
        loop {
            self.value()?;

            // Close finished containers until the next element starts
            loop {
                self.skip_whitespace();
                let Some(&top) = self.open.last() else {
                    return (self.pos == self.src.len()).then_some(());
                };
                match self.bump()? {
                    b',' => {
                        self.out.push(b',');
                        self.newline();
                        if top == Container::Object {
                            self.member_key()?;
                        }
                        break;
                    }
                    byte if byte == top.close() => {
                        self.open.pop();
                        self.newline();
                        self.out.push(byte);
                    }
                    _ => return None,
                }
            }
        }
    }

    /// Copy one value. A non-empty container is opened and its first key is
    /// written; the loop continues with the first element instead of
    /// recursing.
    fn value(&mut self) -> Option<()> {
        loop {
            self.skip_whitespace();
            let container = match self.peek()? {
                b'{' => Container::Object,
                b'[' => Container::Array,
                b'"' => return self.string(),
                b't' => return self.literal(b"true"),
                b'f' => return self.literal(b"false"),
                b'n' => return self.literal(b"null"),
                b'-' | b'0'..=b'9' => return self.number(),
                _ => return None,
            };

            let open = self.bump()?;
            self.out.push(open);
            self.skip_whitespace();
            if self.peek()? == container.close() {
                self.pos += 1;
                self.out.push(container.close());
                return Some(());
            }

            self.open.push(container);
            self.newline();
            if container == Container::Object {
                self.member_key()?;
            }
        }
    }

    fn member_key(&mut self) -> Option<()> {
        self.skip_whitespace();
        if self.peek()? != b'"' {
            return None;
        }
        self.string()?;
        self.skip_whitespace();
        if self.bump()? != b':' {
            return None;
        }
        self.out.extend_from_slice(b": ");
        Some(())
    }

    /// Copy a string token verbatim, escapes included.
    fn string(&mut self) -> Option<()> {
        let start = self.pos;
        self.pos += 1;
        loop {
            match self.bump()? {
                b'"' => break,
                b'\\' => match self.bump()? {
                    b'"' | b'\\' | b'/' | b'b' | b'f' | b'n' | b'r' | b't' => {}
                    b'u' => {
                        for _ in 0..4 {
                            if !self.bump()?.is_ascii_hexdigit() {
                                return None;
                            }
                        }
                    }
                    _ => return None,
                },
                byte if byte < 0x20 => return None,
                _ => {}
            }
        }
        self.out.extend_from_slice(&self.src[start..self.pos]);
        Some(())
    }

    /// Copy a number token verbatim after checking its grammar.
    fn number(&mut self) -> Option<()> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.bump()? {
            b'0' => {}
            b'1'..=b'9' => self.digits(),
            _ => return None,
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            self.required_digits()?;
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            self.required_digits()?;
        }
        self.out.extend_from_slice(&self.src[start..self.pos]);
        Some(())
    }

    fn digits(&mut self) {
        while matches!(self.peek(), Some(b'0'..=b'9')) {
            self.pos += 1;
        }
    }

    fn required_digits(&mut self) -> Option<()> {
        let start = self.pos;
        self.digits();
        (self.pos > start).then_some(())
    }

    fn literal(&mut self, word: &[u8]) -> Option<()> {
        if !self.src[self.pos..].starts_with(word) {
            return None;
        }
        self.pos += word.len();
        self.out.extend_from_slice(word);
        Some(())
    }

    fn newline(&mut self) {
        self.out.push(b'\n');
        for _ in 0..self.open.len() {
            self.out.extend_from_slice(INDENT);
        }
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn peek(&self) -> Option<u8> {
        self.src.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let byte = self.peek()?;
        self.pos += 1;
        Some(byte)
    }
}
