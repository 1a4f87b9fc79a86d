//! Minimal markdown-to-HTML renderer for assistant replies
//!
//! Supports the subset the assistant actually emits: `#`/`##`/`###`
//! headings, unordered (`* `) and ordered (`1. `) lists, `---` rules,
//! `**bold**` spans, and paragraphs. Angle brackets are escaped BEFORE
//! any tags are synthesized, so model-provided text can never inject
//! markup; the ordering is load-bearing.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ListKind {
    Unordered,
    Ordered,
}

impl ListKind {
    fn tag(self) -> &'static str {
        match self {
            ListKind::Unordered => "ul",
            ListKind::Ordered => "ol",
        }
    }
}

/// Render a constrained markdown subset to HTML.
pub fn markdown_to_html(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }

    let sanitized = text.replace('<', "&lt;").replace('>', "&gt;");

    let mut html_lines: Vec<String> = Vec::new();
    let mut in_list: Option<ListKind> = None;

    for line in sanitized.split('\n') {
        // An open list is closed by the first line that is not an item
        // of either kind; the line is then processed normally.
        if let Some(kind) = in_list {
            if !is_list_item(line) {
                html_lines.push(format!("</{}>", kind.tag()));
                in_list = None;
            }
        }

        if line.trim() == "---" {
            html_lines.push("<hr/>".to_string());
        } else if let Some(rest) = line.strip_prefix("### ") {
            html_lines.push(format!("<h3>{rest}</h3>"));
        } else if let Some(rest) = line.strip_prefix("## ") {
            html_lines.push(format!("<h2>{rest}</h2>"));
        } else if let Some(rest) = line.strip_prefix("# ") {
            html_lines.push(format!("<h1>{rest}</h1>"));
        } else if let Some(rest) = line.strip_prefix("* ") {
            open_list(&mut html_lines, &mut in_list, ListKind::Unordered);
            html_lines.push(format!("<li>{rest}</li>"));
        } else if let Some(rest) = ordered_item(line) {
            open_list(&mut html_lines, &mut in_list, ListKind::Ordered);
            html_lines.push(format!("<li>{rest}</li>"));
        } else if !line.trim().is_empty() {
            html_lines.push(format!("<p>{line}</p>"));
        } else if html_lines.last().is_some_and(|l| !l.is_empty()) {
            // Collapse runs of blank lines into a single break
            html_lines.push(String::new());
        }
    }

    if let Some(kind) = in_list {
        html_lines.push(format!("</{}>", kind.tag()));
    }

    // Bold spans are rewritten last, per line, so they apply inside
    // already-synthesized tags but never across line boundaries.
    html_lines
        .iter()
        .map(|l| rewrite_bold(l))
        .collect::<Vec<_>>()
        .join("\n")
}

fn open_list(html_lines: &mut Vec<String>, in_list: &mut Option<ListKind>, kind: ListKind) {
    if *in_list != Some(kind) {
        if let Some(open) = *in_list {
            html_lines.push(format!("</{}>", open.tag()));
        }
        html_lines.push(format!("<{}>", kind.tag()));
        *in_list = Some(kind);
    }
}

/// Does the line continue a list of either kind? Any whitespace counts
/// after the marker, looser than the `* ` required to start an item.
fn is_list_item(line: &str) -> bool {
    if let Some(rest) = line.strip_prefix('*') {
        return rest.starts_with(char::is_whitespace);
    }
    ordered_item(line).is_some()
}

/// Strip an ordered-list marker (`digits`, `.`, one whitespace char),
/// returning the item text.
fn ordered_item(line: &str) -> Option<&str> {
    let after_digits = line.trim_start_matches(|c: char| c.is_ascii_digit());
    if after_digits.len() == line.len() {
        return None; // no digits
    }
    after_digits
        .strip_prefix('.')?
        .strip_prefix(char::is_whitespace)
}

/// Replace `**text**` pairs with `<strong>text</strong>`, leaving any
/// unmatched trailing `**` literal.
fn rewrite_bold(line: &str) -> String {
    let mut parts = line.split("**");
    let mut out = String::from(parts.next().unwrap_or_default());
    while let Some(open) = parts.next() {
        if let Some(after_close) = parts.next() {
            out.push_str("<strong>");
            out.push_str(open);
            out.push_str("</strong>");
            out.push_str(after_close);
        } else {
            out.push_str("**");
            out.push_str(open);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_heading_and_bold() {
        let html = markdown_to_html("# Title\n\nSome **bold** text");
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<strong>bold</strong>"));
        assert!(!html.contains("<p></p>"));
    }

    #[test]
    fn test_heading_levels() {
        assert_eq!(markdown_to_html("## Sub"), "<h2>Sub</h2>");
        assert_eq!(markdown_to_html("### Deep"), "<h3>Deep</h3>");
    }

    #[test]
    fn test_list_closed_once_before_paragraph() {
        let html = markdown_to_html("* a\n* b\nplain");
        assert_eq!(html, "<ul>\n<li>a</li>\n<li>b</li>\n</ul>\n<p>plain</p>");
    }

    #[test]
    fn test_list_closed_at_end_of_input() {
        let html = markdown_to_html("1. one\n2. two");
        assert_eq!(html, "<ol>\n<li>one</li>\n<li>two</li>\n</ol>");
    }

    #[test]
    fn test_list_kind_switch_closes_previous() {
        let html = markdown_to_html("* a\n1. b");
        assert_eq!(html, "<ul>\n<li>a</li>\n</ul>\n<ol>\n<li>b</li>\n</ol>");
    }

    #[test]
    fn test_horizontal_rule() {
        assert_eq!(markdown_to_html("---"), "<hr/>");
        assert_eq!(markdown_to_html("  ---  "), "<hr/>");
    }

    #[test]
    fn test_escaping_blocks_injection() {
        let html = markdown_to_html("<script>alert(1)</script>");
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script"));
    }

    #[test]
    fn test_escaping_happens_before_tag_synthesis() {
        // The synthesized <h1> survives while the payload is escaped
        let html = markdown_to_html("# <b>hi</b>");
        assert_eq!(html, "<h1>&lt;b&gt;hi&lt;/b&gt;</h1>");
    }

    #[test]
    fn test_blank_lines_collapse() {
        let html = markdown_to_html("a\n\n\n\nb");
        assert_eq!(html, "<p>a</p>\n\n<p>b</p>");
    }

    #[test]
    fn test_unmatched_bold_stays_literal() {
        assert_eq!(markdown_to_html("a **b"), "<p>a **b</p>");
        assert_eq!(
            markdown_to_html("**x** and **y"),
            "<p><strong>x</strong> and **y</p>"
        );
    }

    #[test]
    fn test_bold_does_not_cross_lines() {
        let html = markdown_to_html("a **open\nclose** b");
        assert!(!html.contains("<strong>"));
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(markdown_to_html(""), "");
    }

    #[test]
    fn test_ordered_marker_requires_digits_and_dot() {
        assert_eq!(markdown_to_html(". x"), "<p>. x</p>");
        assert_eq!(markdown_to_html("12 x"), "<p>12 x</p>");
        assert_eq!(markdown_to_html("12. x"), "<ol>\n<li>x</li>\n</ol>");
    }

    proptest! {
        #[test]
        fn prop_never_emits_script_tag(input in ".*") {
            let html = markdown_to_html(&input);
            prop_assert!(!html.to_lowercase().contains("<script"));
        }

        #[test]
        fn prop_every_tagged_line_is_synthesized(input in ".*") {
            const KNOWN: &[&str] = &[
                "<h1>", "<h2>", "<h3>", "<p>", "<li>", "<hr/>",
                "<ul>", "</ul>", "<ol>", "</ol>",
            ];
            let html = markdown_to_html(&input);
            for line in html.split('\n') {
                if line.starts_with('<') {
                    prop_assert!(KNOWN.iter().any(|t| line.starts_with(t)),
                        "unexpected tag start: {line}");
                }
            }
        }
    }
}
