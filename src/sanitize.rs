use scraper::{Html, Node};

/// Inline formatting tags kept as-is (without attributes).
const INLINE_TAGS: &[&str] = &["b", "i", "em", "strong"];

/// Elements removed together with everything inside them.
const DROPPED_TAGS: &[&str] = &[
    "script", "style", "template", "noscript", "iframe", "object", "embed", "svg", "math", "head",
    "title", "textarea", "select",
];

/// Elements that end the current paragraph on entry and on exit.
const BLOCK_TAGS: &[&str] = &[
    "p",
    "div",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "ul",
    "ol",
    "li",
    "dl",
    "dt",
    "dd",
    "blockquote",
    "section",
    "article",
    "header",
    "footer",
    "aside",
    "nav",
    "main",
    "figure",
    "figcaption",
    "address",
    "center",
    "pre",
    "hr",
    "table",
    "thead",
    "tbody",
    "tfoot",
    "tr",
    "body",
    "html",
];

/// Elements whose boundaries only separate words.
const SPACING_TAGS: &[&str] = &["td", "th"];

/// Reduces untrusted chapter HTML to a sequence of `<p>` blocks containing only text, `<br/>`
/// and `b`/`i`/`em`/`strong`, with no attributes. Never fails: whatever html5ever makes of
/// malformed input is flattened the same way.
pub fn sanitize(raw: &str) -> String {
    let fragment = Html::parse_fragment(raw);
    let mut writer = ParagraphWriter::default();

    // Explicit stack instead of recursion: nesting depth is attacker-controlled.
    let mut stack = vec![(fragment.tree.root(), false)];
    while let Some((node, leaving)) = stack.pop() {
        match node.value() {
            Node::Text(text) if !leaving => writer.text(text),
            Node::Element(element) => {
                let name = element.name();
                if leaving {
                    writer.leave(name);
                    continue;
                }
                if DROPPED_TAGS.contains(&name) {
                    continue;
                }
                writer.enter(name);
                stack.push((node, true));
                for child in node.children().rev() {
                    stack.push((child, false));
                }
            }
            Node::Document | Node::Fragment if !leaving => {
                for child in node.children().rev() {
                    stack.push((child, false));
                }
            }
            _ => {}
        }
    }

    writer.finish()
}

/// Escapes the five XML special characters for plain text placed in XML text or attributes.
/// Control characters XML cannot carry are dropped; tab, newline and carriage return are kept.
pub fn escape_xml(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        match ch {
            '\t' | '\n' | '\r' => out.push(ch),
            c if c.is_control() => {}
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

#[derive(Debug, Default)]
struct ParagraphWriter {
    paragraphs: Vec<String>,
    current: String,
    has_text: bool,
    pending_space: bool,
    /// Where a pending space goes: after the last text or closing tag, before any opening tags
    /// written since.
    space_at: usize,
    open_inline: Vec<&'static str>,
}

impl ParagraphWriter {
    fn enter(&mut self, name: &str) {
        if name == "br" {
            self.line_break();
        } else if let Some(tag) = inline_tag(name) {
            self.open_inline.push(tag);
            push_open_tag(&mut self.current, tag);
        } else if BLOCK_TAGS.contains(&name) {
            self.paragraph_break();
        } else if SPACING_TAGS.contains(&name) {
            self.pending_space = true;
        }
    }

    fn leave(&mut self, name: &str) {
        if let Some(tag) = inline_tag(name) {
            if self.open_inline.last() == Some(&tag) {
                self.open_inline.pop();
                if push_close_tag(&mut self.current, tag) {
                    self.space_at = self.current.len();
                }
            }
        } else if BLOCK_TAGS.contains(&name) {
            self.paragraph_break();
        } else if SPACING_TAGS.contains(&name) {
            self.pending_space = true;
        }
    }

    fn text(&mut self, text: &str) {
        for ch in text.chars() {
            if ch.is_whitespace() {
                self.pending_space = true;
                continue;
            }
            if ch.is_control() {
                continue;
            }
            if self.pending_space && self.has_text {
                self.current.insert(self.space_at, ' ');
            }
            self.pending_space = false;
            self.has_text = true;
            match ch {
                '&' => self.current.push_str("&amp;"),
                '<' => self.current.push_str("&lt;"),
                '>' => self.current.push_str("&gt;"),
                c => self.current.push(c),
            }
            self.space_at = self.current.len();
        }
    }

    fn line_break(&mut self) {
        if self.has_text {
            self.current.push_str("<br/>");
            self.pending_space = false;
            self.space_at = self.current.len();
        }
    }

    /// Closes the current paragraph. Inline tags still open are closed here and re-opened at
    /// the start of the next paragraph so every emitted block is balanced.
    fn paragraph_break(&mut self) {
        for tag in self.open_inline.iter().rev() {
            push_close_tag(&mut self.current, tag);
        }
        if self.has_text {
            self.paragraphs.push(format!("<p>{}</p>", self.current));
        }
        self.current.clear();
        self.has_text = false;
        self.pending_space = false;
        for tag in &self.open_inline {
            push_open_tag(&mut self.current, tag);
        }
        self.space_at = 0;
    }

    fn finish(mut self) -> String {
        self.paragraph_break();
        self.paragraphs.join("\n")
    }
}

fn inline_tag(name: &str) -> Option<&'static str> {
    INLINE_TAGS.iter().copied().find(|tag| *tag == name)
}

fn push_open_tag(out: &mut String, tag: &str) {
    out.push('<');
    out.push_str(tag);
    out.push('>');
}

/// Closes `tag`, or drops its opening tag when nothing was written inside it. Returns whether a
/// closing tag was written.
fn push_close_tag(out: &mut String, tag: &str) -> bool {
    let open = format!("<{tag}>");
    if out.ends_with(&open) {
        out.truncate(out.len() - open.len());
        return false;
    }
    out.push_str("</");
    out.push_str(tag);
    out.push('>');
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wraps_bare_text_in_a_paragraph() {
        assert_eq!(sanitize("Hello world"), "<p>Hello world</p>");
    }

    #[test]
    fn empty_and_blank_input_produce_nothing() {
        assert_eq!(sanitize(""), "");
        assert_eq!(sanitize("  \n\t "), "");
        assert_eq!(sanitize("<p> </p><div>\n</div><p><b></b></p>"), "");
    }

    #[test]
    fn converts_divs_to_paragraphs_and_unwraps_spans() {
        let out = sanitize(r#"<div class="x">One <span style="color:red">two</span></div><div>Three</div>"#);
        assert_eq!(out, "<p>One two</p>\n<p>Three</p>");
    }

    #[test]
    fn strips_every_attribute() {
        let out = sanitize(
            r#"<p onclick="alert(1)" style="display:none" id="a"><b class="c" onmouseover="x()">Bold</b> <em data-x="1">em</em></p>"#,
        );
        assert_eq!(out, "<p><b>Bold</b> <em>em</em></p>");
        assert!(!out.contains('='));
    }

    #[test]
    fn drops_script_and_style_with_their_content() {
        let out = sanitize(
            "<p>Before<script>alert('x')</script> after</p><style>p { color: red }</style><iframe src=\"https://evil\">frame text</iframe>",
        );
        assert_eq!(out, "<p>Before after</p>");
    }

    #[test]
    fn never_emits_disallowed_tags_however_deeply_nested() {
        let mut raw = String::new();
        for _ in 0..50 {
            raw.push_str("<div><section><a href=\"javascript:x()\">");
        }
        raw.push_str("<script>evil()</script><img src=x onerror=alert(1)>text<object data=x></object>");
        for _ in 0..50 {
            raw.push_str("</a></section></div>");
        }

        let out = sanitize(&raw);
        assert_eq!(out, "<p>text</p>");
        for tag in ["<script", "<img", "<a", "<object", "<section", "<div"] {
            assert!(!out.contains(tag), "found {tag} in {out}");
        }
    }

    #[test]
    fn promotes_text_of_unknown_elements() {
        let out = sanitize("<article><h2>Heading</h2><ul><li>first</li><li>second</li></ul><font>kept</font></article>");
        assert_eq!(
            out,
            "<p>Heading</p>\n<p>first</p>\n<p>second</p>\n<p>kept</p>"
        );
    }

    #[test]
    fn collapses_whitespace_runs() {
        let out = sanitize("<p>  a \n\n  b\t\tc  </p>");
        assert_eq!(out, "<p>a b c</p>");
    }

    #[test]
    fn normalizes_line_breaks() {
        let out = sanitize("<p>line one<br>line two<BR />line three</p><br><br>");
        assert_eq!(out, "<p>line one<br/>line two<br/>line three</p>");
    }

    #[test]
    fn keeps_markup_balanced_when_inline_spans_blocks() {
        let out = sanitize("<b>bold start<p>inside</p>tail</b>");
        assert_eq!(out, "<p><b>bold start</b></p>\n<p><b>inside</b></p>\n<p><b>tail</b></p>");
    }

    #[test]
    fn unclosed_and_malformed_markup_degrades_to_paragraphs() {
        let out = sanitize("<p>open <i>italic <b>both</p><div <<>> text");
        assert!(out.starts_with("<p>"));
        assert!(out.ends_with("</p>"));
        assert!(out.contains("open <i>italic <b>both</b></i>"));
    }

    #[test]
    fn escapes_text_so_entities_cannot_become_tags() {
        let out = sanitize("<p>&lt;script&gt;alert(1)&lt;/script&gt; &amp; more</p>");
        assert_eq!(out, "<p>&lt;script&gt;alert(1)&lt;/script&gt; &amp; more</p>");
        assert!(!out.contains("<script"));
    }

    #[test]
    fn output_always_starts_and_ends_with_a_paragraph() {
        for raw in ["text", "<b>x</b>", "a<p>b</p>c", "<br>x<br>", "<span>y</span>"] {
            let out = sanitize(raw);
            assert!(out.starts_with("<p>"), "{raw:?} -> {out:?}");
            assert!(out.ends_with("</p>"), "{raw:?} -> {out:?}");
        }
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = [
            "plain",
            "<div>a<div>b</div>c</div>",
            "<p>x <b>y</b> <i> z </i></p>",
            "<b>bold start<p>inside</p>tail</b>",
            "<p>a<br> b<br/></p>",
            "<p>&amp;&lt;&gt;\"'</p>",
            "<em><strong>nested</strong></em> text",
            "<table><tr><td>c1</td><td>c2</td></tr></table>",
            "<p onclick=x>hi<script>bad()</script></p><!-- comment -->",
            "Chương 1\u{a0}\u{a0}mở đầu",
        ];
        for raw in inputs {
            let once = sanitize(raw);
            let twice = sanitize(&once);
            assert_eq!(once, twice, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn survives_very_deep_nesting() {
        let depth = 2_000;
        let raw = format!("{}deep{}", "<span>".repeat(depth), "</span>".repeat(depth));
        assert_eq!(sanitize(&raw), "<p>deep</p>");
    }

    #[test]
    fn preserves_utf8_text() {
        assert_eq!(sanitize("<p>日本語のテスト</p>"), "<p>日本語のテスト</p>");
    }

    #[test]
    fn escape_xml_handles_all_five_characters() {
        assert_eq!(
            escape_xml(r#"<Tom & "Jerry's">"#),
            "&lt;Tom &amp; &quot;Jerry&apos;s&quot;&gt;"
        );
        assert_eq!(escape_xml("plain"), "plain");
    }

    #[test]
    fn escape_xml_drops_control_characters() {
        assert_eq!(escape_xml("Chương\u{1} 1\u{7f}\u{8}"), "Chương 1");
        assert_eq!(escape_xml("a\tb\nc"), "a\tb\nc");
    }
}
