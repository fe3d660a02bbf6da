//! Display markup for model responses.
//!
//! `**text**` becomes `<em>text</em>` and any other `*` becomes `<br/>`.
//! Delimiters are read left to right, `**` taking precedence over `*`, so
//! `***` is an emphasis delimiter followed by a line break. An emphasis that
//! is still open at the end of the input keeps its `**` as literal text.

pub const EMPHASIS_OPEN: &str = "<em>";
pub const EMPHASIS_CLOSE: &str = "</em>";
pub const LINE_BREAK: &str = "<br/>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Span {
    Text(String),
    Emphasis(Vec<Span>),
    LineBreak,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token<'a> {
    Text(&'a str),
    Double,
    Single,
}

fn tokenize(raw: &str) -> Vec<Token<'_>> {
    let mut out = Vec::new();
    let mut rest = raw;
    while let Some(pos) = rest.find('*') {
        if pos > 0 {
            out.push(Token::Text(&rest[..pos]));
        }
        rest = &rest[pos..];
        if rest.starts_with("**") {
            out.push(Token::Double);
            rest = &rest[2..];
        } else {
            out.push(Token::Single);
            rest = &rest[1..];
        }
    }
    if !rest.is_empty() {
        out.push(Token::Text(rest));
    }
    out
}

/// Parse raw response text into display spans.
pub fn parse(raw: &str) -> Vec<Span> {
    let mut top: Vec<Span> = Vec::new();
    // Spans collected since the currently open `**`, if any.
    let mut open: Option<Vec<Span>> = None;

    for token in tokenize(raw) {
        match token {
            Token::Text(t) => push_text(open.as_mut().unwrap_or(&mut top), t),
            Token::Single => open.as_mut().unwrap_or(&mut top).push(Span::LineBreak),
            Token::Double => match open.take() {
                Some(inner) => top.push(Span::Emphasis(inner)),
                None => open = Some(Vec::new()),
            },
        }
    }

    if let Some(inner) = open {
        push_text(&mut top, "**");
        for span in inner {
            match span {
                Span::Text(t) => push_text(&mut top, &t),
                other => top.push(other),
            }
        }
    }
    top
}

fn push_text(spans: &mut Vec<Span>, text: &str) {
    if let Some(Span::Text(last)) = spans.last_mut() {
        last.push_str(text);
    } else {
        spans.push(Span::Text(text.to_string()));
    }
}

/// Render spans back to markup.
pub fn to_markup(spans: &[Span]) -> String {
    let mut out = String::new();
    write_markup(&mut out, spans);
    out
}

fn write_markup(out: &mut String, spans: &[Span]) {
    for span in spans {
        match span {
            Span::Text(t) => out.push_str(t),
            Span::LineBreak => out.push_str(LINE_BREAK),
            Span::Emphasis(inner) => {
                out.push_str(EMPHASIS_OPEN);
                write_markup(out, inner);
                out.push_str(EMPHASIS_CLOSE);
            }
        }
    }
}

/// Format raw response text for display.
pub fn format_response(raw: &str) -> String {
    if !raw.contains('*') {
        return raw.to_string();
    }
    to_markup(&parse(raw))
}

/// One visible unit of formatted markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Glyph {
    Char { ch: char, emphasized: bool },
    LineBreak,
}

/// Reads markup back into glyphs, one character at a time.
///
/// Works on partially revealed text: a tag that is only half revealed is held
/// back until it either completes or turns out to be plain text.
#[derive(Debug, Default)]
pub struct MarkupReader {
    pending: String,
    emphasized: bool,
}

impl MarkupReader {
    pub fn push(&mut self, ch: char, out: &mut Vec<Glyph>) {
        if self.pending.is_empty() && ch != '<' {
            out.push(Glyph::Char {
                ch,
                emphasized: self.emphasized,
            });
            return;
        }

        self.pending.push(ch);
        match self.pending.as_str() {
            EMPHASIS_OPEN => self.emphasized = true,
            EMPHASIS_CLOSE => self.emphasized = false,
            LINE_BREAK => out.push(Glyph::LineBreak),
            p if [EMPHASIS_OPEN, EMPHASIS_CLOSE, LINE_BREAK]
                .iter()
                .any(|tag| tag.starts_with(p)) =>
            {
                return;
            }
            _ => {
                // Not a tag after all. The leading '<' is text; the rest may
                // start a real tag.
                let pending = std::mem::take(&mut self.pending);
                let mut chars = pending.chars();
                if let Some(first) = chars.next() {
                    out.push(Glyph::Char {
                        ch: first,
                        emphasized: self.emphasized,
                    });
                }
                for c in chars {
                    self.push(c, out);
                }
                return;
            }
        }
        self.pending.clear();
    }

    /// Flush a trailing partial tag as plain text.
    pub fn finish(&mut self, out: &mut Vec<Glyph>) {
        let emphasized = self.emphasized;
        out.extend(
            std::mem::take(&mut self.pending)
                .chars()
                .map(|ch| Glyph::Char { ch, emphasized }),
        );
    }
}

/// Glyphs for a finished markup string. A trailing partial tag is text.
pub fn read_markup(markup: &str) -> Vec<Glyph> {
    let mut reader = MarkupReader::default();
    let mut out = read_with(&mut reader, markup);
    reader.finish(&mut out);
    out
}

/// Glyphs for markup that is still being revealed. A trailing partial tag is
/// held back.
pub fn read_partial_markup(markup: &str) -> Vec<Glyph> {
    read_with(&mut MarkupReader::default(), markup)
}

fn read_with(reader: &mut MarkupReader, markup: &str) -> Vec<Glyph> {
    let mut out = Vec::with_capacity(markup.len());
    for ch in markup.chars() {
        reader.push(ch, &mut out);
    }
    out
}
