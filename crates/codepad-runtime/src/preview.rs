//! Sandboxed preview documents for the non-executable variants.

use crate::language::{ExecutionStrategy, LanguageDescriptor};
use serde::Serialize;

/// `sandbox` attribute value the consumer puts on the preview frame.
pub const SANDBOX: &str = "allow-scripts";

const CSS_SAMPLE: &str = r##"<h1>Heading</h1>
<p>A paragraph with <a href="#">a link</a> and <strong>strong text</strong>.</p>
<ul>
  <li>First item</li>
  <li>Second item</li>
</ul>
<button>Button</button>"##;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PreviewDocument {
    pub html: String,
    pub sandbox: &'static str,
}

/// Builds the preview for `code`, or `None` when the language is executable.
pub fn render(code: &str, language: &LanguageDescriptor) -> Option<PreviewDocument> {
    if language.strategy != ExecutionStrategy::Preview {
        return None;
    }

    let html = match language.id {
        "html" => render_html(code),
        "css" => wrap_document(&format!("<style>\n{}\n</style>", code), CSS_SAMPLE),
        "json" => render_json(code),
        "markdown" => wrap_document("", &render_markdown(code)),
        _ => wrap_document("", &format!("<pre>{}</pre>", escape_html(code))),
    };

    Some(PreviewDocument { html, sandbox: SANDBOX })
}

fn render_html(code: &str) -> String {
    let lowered = code.trim_start().to_ascii_lowercase();
    if lowered.starts_with("<!doctype") || lowered.starts_with("<html") {
        code.to_string()
    } else {
        wrap_document("", code)
    }
}

fn render_json(code: &str) -> String {
    let body = match serde_json::from_str::<serde_json::Value>(code) {
        Ok(value) => {
            let pretty = serde_json::to_string_pretty(&value).unwrap_or_else(|_| code.to_string());
            format!("<pre>{}</pre>", escape_html(&pretty))
        }
        Err(e) => format!("<pre class=\"error\">Invalid JSON: {}</pre>", escape_html(&e.to_string())),
    };
    wrap_document("<style>pre { font-family: monospace; } .error { color: #dc2626; }</style>", &body)
}

fn wrap_document(head: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n{}\n</head>\n<body>\n{}\n</body>\n</html>\n",
        head, body
    )
}

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[derive(PartialEq)]
enum Block {
    None,
    Paragraph,
    List,
    Code,
}

/// Line-based Markdown: headings, bullet lists, fenced code and paragraphs.
fn render_markdown(source: &str) -> String {
    let mut out = Vec::new();
    let mut block = Block::None;
    let mut paragraph: Vec<String> = Vec::new();

    let close = |block: &mut Block, paragraph: &mut Vec<String>, out: &mut Vec<String>| {
        match block {
            Block::Paragraph => out.push(format!("<p>{}</p>", paragraph.join(" "))),
            Block::List => out.push("</ul>".to_string()),
            Block::Code => out.push("</code></pre>".to_string()),
            Block::None => {}
        }
        paragraph.clear();
        *block = Block::None;
    };

    for line in source.lines() {
        let trimmed = line.trim();

        if block == Block::Code {
            if trimmed.starts_with("```") {
                close(&mut block, &mut paragraph, &mut out);
            } else {
                out.push(escape_html(line));
            }
            continue;
        }

        if trimmed.starts_with("```") {
            close(&mut block, &mut paragraph, &mut out);
            out.push("<pre><code>".to_string());
            block = Block::Code;
        } else if trimmed.is_empty() {
            close(&mut block, &mut paragraph, &mut out);
        } else if let Some((level, text)) = heading(trimmed) {
            close(&mut block, &mut paragraph, &mut out);
            out.push(format!("<h{0}>{1}</h{0}>", level, inline(text)));
        } else if let Some(item) = trimmed.strip_prefix("- ").or_else(|| trimmed.strip_prefix("* ")) {
            if block != Block::List {
                close(&mut block, &mut paragraph, &mut out);
                out.push("<ul>".to_string());
                block = Block::List;
            }
            out.push(format!("<li>{}</li>", inline(item)));
        } else {
            if block != Block::Paragraph {
                close(&mut block, &mut paragraph, &mut out);
                block = Block::Paragraph;
            }
            paragraph.push(inline(trimmed));
        }
    }
    close(&mut block, &mut paragraph, &mut out);

    out.join("\n")
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let level = line.chars().take_while(|c| *c == '#').count();
    if (1..=6).contains(&level) {
        line[level..].strip_prefix(' ').map(|text| (level, text.trim()))
    } else {
        None
    }
}

// Inline spans after escaping: `code`, **bold**, *em*.
fn inline(text: &str) -> String {
    let escaped = escape_html(text);
    let with_code = wrap_pairs(&escaped, "`", "code");
    let with_bold = wrap_pairs(&with_code, "**", "strong");
    wrap_pairs(&with_bold, "*", "em")
}

fn wrap_pairs(text: &str, marker: &str, tag: &str) -> String {
    let parts: Vec<&str> = text.split(marker).collect();
    if parts.len() < 3 {
        return text.to_string();
    }

    let mut out = String::with_capacity(text.len());
    let pairs = (parts.len() - 1) / 2;
    for (i, part) in parts.iter().enumerate() {
        if i > 0 {
            let open = i % 2 == 1;
            if i <= pairs * 2 {
                out.push_str(&format!("<{}{}>", if open { "" } else { "/" }, tag));
            } else {
                out.push_str(marker);
            }
        }
        out.push_str(part);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::LanguageRegistry;

    fn preview(code: &str, id: &str) -> PreviewDocument {
        let registry = LanguageRegistry::builtin();
        render(code, registry.find(id).unwrap()).unwrap()
    }

    #[test]
    fn test_executable_languages_have_no_preview() {
        let registry = LanguageRegistry::builtin();
        assert!(render("console.log(1)", registry.find("javascript").unwrap()).is_none());
    }

    #[test]
    fn test_html_fragment_is_wrapped() {
        let doc = preview("<h1>Hi</h1>", "html");
        assert!(doc.html.starts_with("<!DOCTYPE html>"));
        assert!(doc.html.contains("<body>\n<h1>Hi</h1>\n</body>"));
        assert_eq!(doc.sandbox, "allow-scripts");

        let full = "<!DOCTYPE html><html><body>x</body></html>";
        assert_eq!(preview(full, "html").html, full);
    }

    #[test]
    fn test_css_gets_sample_markup() {
        let doc = preview("h1 { color: red; }", "css");
        assert!(doc.html.contains("<style>\nh1 { color: red; }\n</style>"));
        assert!(doc.html.contains("<h1>Heading</h1>"));
    }

    #[test]
    fn test_json_pretty_or_error() {
        let doc = preview(r#"{"a":[1,2]}"#, "json");
        assert!(doc.html.contains("&quot;a&quot;: ["));

        let bad = preview("{nope", "json");
        assert!(bad.html.contains("Invalid JSON"));
    }

    #[test]
    fn test_markdown_blocks() {
        let doc = preview("# Title\n\nSome **bold** and `x < y`.\n\n- one\n- *two*\n\n```\n<tag>\n```", "md");

        assert!(doc.html.contains("<h1>Title</h1>"));
        assert!(doc.html.contains("<p>Some <strong>bold</strong> and <code>x &lt; y</code>.</p>"));
        assert!(doc.html.contains("<ul>\n<li>one</li>\n<li><em>two</em></li>\n</ul>"));
        assert!(doc.html.contains("<pre><code>\n&lt;tag&gt;\n</code></pre>"));
    }

    #[test]
    fn test_unpaired_marker_is_literal() {
        assert_eq!(inline("2 * 3"), "2 * 3");
        assert_eq!(inline("a *b* c*"), "a <em>b</em> c*");
    }
}
