//! Include directive scanning.

use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;

/// How an include target is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncludeKind {
    /// Relative to the directory of the including file
    File,
    /// Relative to the include root
    Virtual,
}

impl IncludeKind {
    fn from_attr(attr: &str) -> Self {
        if attr.eq_ignore_ascii_case("virtual") {
            Self::Virtual
        } else {
            Self::File
        }
    }
}

/// A single include directive found in a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directive {
    /// Resolution mode
    pub kind: IncludeKind,

    /// Path as written in the directive
    pub target: String,

    /// Byte range of the whole directive in the source
    pub span: Range<usize>,

    /// 1-based line the directive starts on
    pub line: usize,
}

static DIRECTIVE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<!--\s*#\s*include\s+(file|virtual)\s*=\s*(?:"([^"]*)"|'([^']*)')\s*-->"#)
        .expect("Invalid include directive regex")
});

/// Find every include directive in `source`, in document order.
pub fn find_directives(source: &str) -> Vec<Directive> {
    DIRECTIVE_RE
        .captures_iter(source)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let kind = IncludeKind::from_attr(caps.get(1)?.as_str());
            let target = caps.get(2).or_else(|| caps.get(3))?.as_str().trim();
            Some(Directive {
                kind,
                target: target.to_string(),
                span: whole.range(),
                line: source[..whole.start()].matches('\n').count() + 1,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn finds_file_directive() {
        let src = "<body>\n<!--#include file=\"include/header.html\" -->\n</body>";
        let found = find_directives(src);

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, IncludeKind::File);
        assert_eq!(found[0].target, "include/header.html");
        assert_eq!(found[0].line, 2);
        assert_eq!(
            &src[found[0].span.clone()],
            "<!--#include file=\"include/header.html\" -->"
        );
    }

    #[test]
    fn accepts_virtual_and_single_quotes() {
        let found = find_directives("<!-- #include virtual='/parts/nav.html'-->");

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].kind, IncludeKind::Virtual);
        assert_eq!(found[0].target, "/parts/nav.html");
    }

    #[test]
    fn ignores_plain_comments() {
        let src = "<!-- include file=\"a.html\" --><!-- note -->";
        assert!(find_directives(src).is_empty());
    }

    #[test]
    fn keeps_document_order() {
        let src = "<!--#include file=\"a.html\" -->x<!--#include file=\"b.html\" -->";
        let targets: Vec<_> = find_directives(src).into_iter().map(|d| d.target).collect();
        assert_eq!(targets, vec!["a.html", "b.html"]);
    }
}
