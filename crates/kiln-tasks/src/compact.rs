//! Compact stylesheet printer.
//!
//! Re-lays out minified CSS one rule per line:
//!
//! ```text
//! a, b { color: red; margin: 0; }
//! @media (max-width:600px) {
//! 	.nav { display: none; }
//! }
//! ```
//!
//! Numeric literals are rounded to a fixed precision. Every rule and
//! declaration start is recorded as a [`Segment`] so source maps of the
//! minified input can be carried over to the compact output.

/// Layout settings for the compact printer.
#[derive(Debug, Clone)]
pub struct CompactOptions {
    /// Indentation used inside at-rule blocks
    pub indent: String,

    /// Maximum digits after the decimal point
    pub precision: usize,
}

impl Default for CompactOptions {
    fn default() -> Self {
        Self {
            indent: "\t".to_string(),
            precision: 2,
        }
    }
}

/// Position of a printed item in both the input and the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Byte offset in the minified input
    pub input: usize,
    /// 0-based output line
    pub line: u32,
    /// 0-based output column
    pub column: u32,
}

/// Compact output with its segment table.
#[derive(Debug, Clone)]
pub struct Compacted {
    pub code: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug)]
enum Node<'a> {
    Block {
        prelude: &'a str,
        at: usize,
        children: Vec<Node<'a>>,
    },
    Item {
        text: &'a str,
        at: usize,
    },
}

/// Reformat minified CSS in compact style.
pub fn format(css: &str, options: &CompactOptions) -> Compacted {
    let mut pos = 0;
    let mut nodes = parse_items(css, &mut pos);

    // Stray closing braces at top level: skip and keep going.
    while pos < css.len() {
        pos += 1;
        nodes.extend(parse_items(css, &mut pos));
    }

    let mut printer = Printer {
        options,
        out: String::with_capacity(css.len() + css.len() / 4),
        segments: Vec::new(),
        line: 0,
        line_start: 0,
    };

    for node in &nodes {
        printer.top_level(node);
    }

    Compacted {
        code: printer.out,
        segments: printer.segments,
    }
}

fn parse_items<'a>(css: &'a str, pos: &mut usize) -> Vec<Node<'a>> {
    let bytes = css.as_bytes();
    let mut nodes = Vec::new();

    loop {
        while *pos < bytes.len() && bytes[*pos].is_ascii_whitespace() {
            *pos += 1;
        }
        if *pos >= bytes.len() || bytes[*pos] == b'}' {
            return nodes;
        }

        let start = *pos;
        let (end, stop) = scan_to_delimiter(bytes, start);
        let text = css[start..end].trim();

        match stop {
            Some(b'{') => {
                *pos = end + 1;
                let children = parse_items(css, pos);
                if *pos < bytes.len() {
                    // consume '}'
                    *pos += 1;
                }
                nodes.push(Node::Block {
                    prelude: text,
                    at: start,
                    children,
                });
            }
            Some(b';') => {
                *pos = end + 1;
                if !text.is_empty() {
                    nodes.push(Node::Item { text, at: start });
                }
            }
            _ => {
                *pos = end;
                if !text.is_empty() {
                    nodes.push(Node::Item { text, at: start });
                }
            }
        }
    }
}

/// Find the next `{`, `;` or `}` outside strings and parentheses.
fn scan_to_delimiter(bytes: &[u8], start: usize) -> (usize, Option<u8>) {
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    let mut i = start;

    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = quote {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == q {
                quote = None;
            }
        } else {
            match b {
                b'"' | b'\'' => quote = Some(b),
                b'(' | b'[' => depth += 1,
                b')' | b']' => depth = depth.saturating_sub(1),
                b'{' | b';' | b'}' if depth == 0 => return (i, Some(b)),
                _ => {}
            }
        }
        i += 1;
    }

    (bytes.len(), None)
}

struct Printer<'o> {
    options: &'o CompactOptions,
    out: String,
    segments: Vec<Segment>,
    line: u32,
    line_start: usize,
}

impl Printer<'_> {
    fn mark(&mut self, input: usize) {
        self.segments.push(Segment {
            input,
            line: self.line,
            column: (self.out.len() - self.line_start) as u32,
        });
    }

    fn newline(&mut self) {
        self.out.push('\n');
        self.line += 1;
        self.line_start = self.out.len();
    }

    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str(&self.options.indent);
        }
    }

    fn top_level(&mut self, node: &Node<'_>) {
        match node {
            Node::Item { text, at } => {
                self.mark(*at);
                self.out.push_str(text);
                self.out.push(';');
                self.newline();
            }
            Node::Block { .. } => self.block(node, 0),
        }
    }

    fn block(&mut self, node: &Node<'_>, depth: usize) {
        let Node::Block {
            prelude,
            at,
            children,
        } = node
        else {
            return;
        };

        self.indent(depth);
        self.mark(*at);
        self.out.push_str(&format_prelude(prelude));

        let nested = children.iter().any(|c| matches!(c, Node::Block { .. }));
        if !nested {
            self.out.push_str(" {");
            for child in children {
                if let Node::Item { text, at } = child {
                    self.out.push(' ');
                    self.mark(*at);
                    self.out
                        .push_str(&format_declaration(text, self.options.precision));
                    self.out.push(';');
                }
            }
            self.out.push_str(" }");
            self.newline();
            return;
        }

        self.out.push_str(" {");
        self.newline();
        for child in children {
            match child {
                Node::Block { .. } => self.block(child, depth + 1),
                Node::Item { text, at } => {
                    self.indent(depth + 1);
                    self.mark(*at);
                    self.out
                        .push_str(&format_declaration(text, self.options.precision));
                    self.out.push(';');
                    self.newline();
                }
            }
        }
        self.indent(depth);
        self.out.push('}');
        self.newline();
    }
}

/// Put a space after selector-list commas; at-rule preludes are left alone.
fn format_prelude(prelude: &str) -> String {
    if prelude.starts_with('@') {
        return prelude.to_string();
    }

    let mut out = String::with_capacity(prelude.len() + 8);
    let mut depth = 0usize;
    let mut quote: Option<char> = None;

    for c in prelude.chars() {
        out.push(c);
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None => match c {
                '"' | '\'' => quote = Some(c),
                '(' | '[' => depth += 1,
                ')' | ']' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => out.push(' '),
                _ => {}
            },
        }
    }

    out
}

/// `prop:value` becomes `prop: value` with numbers rounded.
fn format_declaration(decl: &str, precision: usize) -> String {
    let Some(colon) = decl.find(':') else {
        return decl.to_string();
    };

    let property = decl[..colon].trim();
    let value = decl[colon + 1..].trim();

    if property.starts_with("--") {
        return format!("{}: {}", property, value);
    }

    format!("{}: {}", property, round_numbers(value, precision))
}

/// Round decimal literals in a CSS value to `precision` places.
///
/// Strings and `url(...)` arguments are copied untouched.
pub fn round_numbers(value: &str, precision: usize) -> String {
    let bytes = value.as_bytes();
    let mut out = String::with_capacity(value.len());
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];

        if b == b'"' || b == b'\'' {
            let end = skip_string(bytes, i);
            out.push_str(&value[i..end]);
            i = end;
            continue;
        }

        if bytes.len() >= i + 4 && bytes[i..i + 4].eq_ignore_ascii_case(b"url(") {
            let end = value[i..].find(')').map(|p| i + p + 1).unwrap_or(bytes.len());
            out.push_str(&value[i..end]);
            i = end;
            continue;
        }

        let starts_number = (b.is_ascii_digit()
            || (b == b'.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit)))
            && !continues_word(bytes, i);

        if starts_number {
            let end = number_end(bytes, i);
            out.push_str(&round_literal(&value[i..end], precision));
            i = end;
            continue;
        }

        let len = utf8_len(b);
        out.push_str(&value[i..i + len]);
        i += len;
    }

    out
}

fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            b if b == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// Digits glued to an identifier (`h1`, `#fff0`, `translate3d`) are not numbers.
fn continues_word(bytes: &[u8], i: usize) -> bool {
    i > 0 && {
        let prev = bytes[i - 1];
        prev.is_ascii_alphabetic() || prev == b'_' || prev == b'#' || prev.is_ascii_digit()
    }
}

fn number_end(bytes: &[u8], start: usize) -> usize {
    let mut i = start;
    let mut seen_dot = false;
    while i < bytes.len() {
        match bytes[i] {
            b'0'..=b'9' => {}
            b'.' if !seen_dot && bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                seen_dot = true
            }
            _ => break,
        }
        i += 1;
    }
    i
}

fn round_literal(literal: &str, precision: usize) -> String {
    let Some(dot) = literal.find('.') else {
        return literal.to_string();
    };
    if literal.len() - dot - 1 <= precision {
        return literal.to_string();
    }
    let Ok(value) = literal.parse::<f64>() else {
        return literal.to_string();
    };

    // Ties round up, away from zero.
    let scale = 10f64.powi(precision as i32);
    let value = (value * scale).round() / scale;

    let mut rounded = format!("{:.*}", precision, value);
    if rounded.contains('.') {
        while rounded.ends_with('0') {
            rounded.pop();
        }
        if rounded.ends_with('.') {
            rounded.pop();
        }
    }

    // Keep the minified form of the input (".5" rather than "0.5").
    if literal.starts_with('.') && rounded.starts_with("0.") {
        rounded.remove(0);
    }

    rounded
}

fn utf8_len(first: u8) -> usize {
    match first {
        0x00..=0x7F => 1,
        0xC0..=0xDF => 2,
        0xE0..=0xEF => 3,
        _ => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn compact(css: &str) -> String {
        format(css, &CompactOptions::default()).code
    }

    #[test]
    fn one_rule_per_line() {
        assert_eq!(
            compact("a,b{color:red;margin:0}.c{padding:1px}"),
            "a, b { color: red; margin: 0; }\n.c { padding: 1px; }\n"
        );
    }

    #[test]
    fn nests_at_rules_with_tabs() {
        assert_eq!(
            compact("@media (max-width:600px){.nav{display:none}.a{color:blue}}"),
            "@media (max-width:600px) {\n\t.nav { display: none; }\n\t.a { color: blue; }\n}\n"
        );
    }

    #[test]
    fn keeps_top_level_statements() {
        assert_eq!(
            compact("@charset \"UTF-8\";a{color:red}"),
            "@charset \"UTF-8\";\na { color: red; }\n"
        );
    }

    #[test]
    fn does_not_split_inside_strings_or_urls() {
        assert_eq!(
            compact(r#"a:after{content:"{;}";background:url(data:image/png;base64,AA==)}"#),
            "a:after { content: \"{;}\"; background: url(data:image/png;base64,AA==); }\n"
        );
    }

    #[test]
    fn rounds_to_precision() {
        assert_eq!(round_numbers("33.333333%", 2), "33.33%");
        assert_eq!(round_numbers(".666667em .5em", 2), ".67em .5em");
        assert_eq!(round_numbers("1.005px 2.10px", 2), "1px 2.10px");
        assert_eq!(round_numbers("translate3d(1.23456px,0,0)", 2), "translate3d(1.23px,0,0)");
    }

    #[test]
    fn rounds_ties_up() {
        assert_eq!(round_numbers(".125em", 2), ".13em");
        assert_eq!(round_numbers("0.375em 2.5px", 2), "0.38em 2.5px");
        assert_eq!(round_numbers("-.125em", 2), "-.13em");
        assert_eq!(compact(".a{width:.125em}"), ".a { width: .13em; }\n");
    }

    #[test]
    fn leaves_identifiers_strings_and_colors_alone() {
        assert_eq!(round_numbers("#ff0033", 2), "#ff0033");
        assert_eq!(round_numbers("\"1.23456\"", 2), "\"1.23456\"");
        assert_eq!(round_numbers("url(img/a.1234.png)", 2), "url(img/a.1234.png)");
        assert_eq!(round_numbers("h1.12345", 2), "h1.12345");
    }

    #[test]
    fn records_segments_for_rules_and_declarations() {
        let out = format(
            "a{color:red}@media print{b{margin:0}}",
            &CompactOptions::default(),
        );

        assert_eq!(
            out.segments,
            vec![
                Segment { input: 0, line: 0, column: 0 },
                Segment { input: 2, line: 0, column: 4 },
                Segment { input: 12, line: 1, column: 0 },
                Segment { input: 25, line: 2, column: 1 },
                Segment { input: 27, line: 2, column: 5 },
            ]
        );
    }
}
