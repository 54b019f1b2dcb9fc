//! Fixed EPUB artifacts rendered from book metadata.
//!
//! Every generator is pure. Titles and author are plain text and go through [`escape_xml`];
//! chapter bodies must already be sanitized.

use crate::formats::{BookMetadata, ChapterRecord};
use crate::sanitize::escape_xml;

pub const NAV_TITLE: &str = "Table of Contents";
/// Visible heading of the navigation document.
pub const NAV_HEADING: &str = "Mục lục";

pub fn chapter_stem(sequence_in_output: usize) -> String {
    format!("chapter{sequence_in_output}")
}

pub fn chapter_file_name(sequence_in_output: usize) -> String {
    format!("{}.xhtml", chapter_stem(sequence_in_output))
}

pub fn container_xml() -> String {
    r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#
    .to_string()
}

pub fn style_css() -> String {
    r#"@charset "utf-8";

body { font-family: Georgia, serif; font-size: 1em; line-height: 1.6; margin: 1em; color: #333; }
h1 { font-size: 1.5em; margin-bottom: 1em; text-align: center; }
p { margin: 0.8em 0; text-indent: 1.5em; text-align: justify; }
.chapter-content { margin-top: 2em; }
nav ol { list-style: none; padding-left: 0; }
"#
    .to_string()
}

/// `modified` is an RFC 3339 UTC timestamp with seconds precision (`2024-01-02T03:04:05Z`).
pub fn content_opf(meta: &BookMetadata, modified: &str) -> String {
    let lang = escape_xml(&meta.language);
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str(&format!(
        "<package xmlns=\"http://www.idpf.org/2007/opf\" version=\"3.0\" unique-identifier=\"BookId\" xml:lang=\"{lang}\">\n"
    ));
    out.push_str("  <metadata xmlns:dc=\"http://purl.org/dc/elements/1.1/\">\n");
    out.push_str(&format!(
        "    <dc:identifier id=\"BookId\">urn:uuid:{}</dc:identifier>\n",
        meta.identifier
    ));
    out.push_str(&format!(
        "    <dc:title>{}</dc:title>\n",
        escape_xml(&meta.title)
    ));
    out.push_str(&format!(
        "    <dc:creator>{}</dc:creator>\n",
        escape_xml(&meta.author)
    ));
    out.push_str(&format!("    <dc:language>{lang}</dc:language>\n"));
    out.push_str(&format!(
        "    <meta property=\"dcterms:modified\">{}</meta>\n",
        escape_xml(modified)
    ));
    out.push_str("  </metadata>\n");

    out.push_str("  <manifest>\n");
    for ch in &meta.chapters {
        let stem = chapter_stem(ch.sequence_in_output);
        out.push_str(&format!(
            "    <item id=\"{stem}\" href=\"{stem}.xhtml\" media-type=\"application/xhtml+xml\"/>\n"
        ));
    }
    out.push_str(
        "    <item id=\"nav\" href=\"nav.xhtml\" media-type=\"application/xhtml+xml\" properties=\"nav\"/>\n",
    );
    out.push_str("    <item id=\"ncx\" href=\"toc.ncx\" media-type=\"application/x-dtbncx+xml\"/>\n");
    out.push_str("    <item id=\"css\" href=\"style.css\" media-type=\"text/css\"/>\n");
    out.push_str("  </manifest>\n");

    out.push_str("  <spine toc=\"ncx\">\n");
    for ch in &meta.chapters {
        out.push_str(&format!(
            "    <itemref idref=\"{}\"/>\n",
            chapter_stem(ch.sequence_in_output)
        ));
    }
    out.push_str("  </spine>\n");
    out.push_str("</package>\n");
    out
}

pub fn nav_xhtml(meta: &BookMetadata) -> String {
    let lang = escape_xml(&meta.language);
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" xmlns:epub=\"http://www.idpf.org/2007/ops\" lang=\"{lang}\" xml:lang=\"{lang}\">\n"
    ));
    out.push_str("<head>\n");
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str(&format!("  <title>{NAV_TITLE}</title>\n"));
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\"/>\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str("  <nav epub:type=\"toc\" id=\"toc\">\n");
    out.push_str(&format!("    <h1>{NAV_HEADING}</h1>\n"));
    out.push_str("    <ol>\n");
    for ch in &meta.chapters {
        out.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            chapter_file_name(ch.sequence_in_output),
            escape_xml(&ch.title)
        ));
    }
    out.push_str("    </ol>\n");
    out.push_str("  </nav>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

pub fn toc_ncx(meta: &BookMetadata) -> String {
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<ncx xmlns=\"http://www.daisy.org/z3986/2005/ncx/\" version=\"2005-1\">\n");
    out.push_str("  <head>\n");
    out.push_str(&format!(
        "    <meta name=\"dtb:uid\" content=\"urn:uuid:{}\"/>\n",
        meta.identifier
    ));
    out.push_str("    <meta name=\"dtb:depth\" content=\"1\"/>\n");
    out.push_str("    <meta name=\"dtb:totalPageCount\" content=\"0\"/>\n");
    out.push_str("    <meta name=\"dtb:maxPageNumber\" content=\"0\"/>\n");
    out.push_str("  </head>\n");
    out.push_str(&format!(
        "  <docTitle><text>{}</text></docTitle>\n",
        escape_xml(&meta.title)
    ));
    out.push_str("  <navMap>\n");
    for ch in &meta.chapters {
        let play = ch.sequence_in_output + 1;
        out.push_str(&format!(
            "    <navPoint id=\"navPoint-{play}\" playOrder=\"{play}\">\n"
        ));
        out.push_str(&format!(
            "      <navLabel><text>{}</text></navLabel>\n",
            escape_xml(&ch.title)
        ));
        out.push_str(&format!(
            "      <content src=\"{}\"/>\n",
            chapter_file_name(ch.sequence_in_output)
        ));
        out.push_str("    </navPoint>\n");
    }
    out.push_str("  </navMap>\n");
    out.push_str("</ncx>\n");
    out
}

pub fn chapter_xhtml(chapter: &ChapterRecord, sanitized_body: &str, lang: &str) -> String {
    let lang = escape_xml(lang);
    let title = escape_xml(&chapter.title);
    let mut out = String::new();
    out.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    out.push_str("<!DOCTYPE html>\n");
    out.push_str(&format!(
        "<html xmlns=\"http://www.w3.org/1999/xhtml\" lang=\"{lang}\" xml:lang=\"{lang}\">\n"
    ));
    out.push_str("<head>\n");
    out.push_str("  <meta charset=\"utf-8\" />\n");
    out.push_str(&format!("  <title>{title}</title>\n"));
    out.push_str("  <link rel=\"stylesheet\" type=\"text/css\" href=\"style.css\"/>\n");
    out.push_str("</head>\n");
    out.push_str("<body>\n");
    out.push_str(&format!("  <h1>{title}</h1>\n"));
    out.push_str("  <div class=\"chapter-content\">\n");
    out.push_str(sanitized_body);
    if !sanitized_body.ends_with('\n') {
        out.push('\n');
    }
    out.push_str("  </div>\n");
    out.push_str("</body>\n");
    out.push_str("</html>\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(seq: usize, title: &str) -> ChapterRecord {
        ChapterRecord {
            title: title.to_owned(),
            body_markup: format!("<p>{title}</p>"),
            volume_index: 0,
            volume_title: "Tập 1".to_owned(),
            sequence_in_output: seq,
        }
    }

    fn meta(titles: &[&str]) -> BookMetadata {
        BookMetadata {
            title: "Book & <Title>".to_owned(),
            author: "O'Brien \"Author\"".to_owned(),
            identifier: uuid::Uuid::new_v4(),
            language: "vi".to_owned(),
            chapters: titles
                .iter()
                .enumerate()
                .map(|(i, t)| record(i, t))
                .collect(),
        }
    }

    #[test]
    fn content_opf_lists_chapters_in_sequence_order() {
        let meta = meta(&["A", "B", "C"]);
        let opf = content_opf(&meta, "2024-01-02T03:04:05Z");

        let spine_ids = opf
            .lines()
            .filter_map(|line| line.trim().strip_prefix("<itemref idref=\""))
            .map(|rest| rest.trim_end_matches("\"/>").to_owned())
            .collect::<Vec<_>>();
        assert_eq!(spine_ids, ["chapter0", "chapter1", "chapter2"]);

        for i in 0..3 {
            assert!(opf.contains(&format!(
                "<item id=\"chapter{i}\" href=\"chapter{i}.xhtml\" media-type=\"application/xhtml+xml\"/>"
            )));
        }
        assert!(opf.contains(&format!("urn:uuid:{}", meta.identifier)));
        assert!(opf.contains("<dc:language>vi</dc:language>"));
        assert!(opf.contains("<meta property=\"dcterms:modified\">2024-01-02T03:04:05Z</meta>"));
    }

    #[test]
    fn metadata_text_is_xml_escaped_everywhere() {
        let meta = meta(&["<i>x</i> & 'y'"]);

        let opf = content_opf(&meta, "2024-01-02T03:04:05Z");
        assert!(opf.contains("<dc:title>Book &amp; &lt;Title&gt;</dc:title>"));
        assert!(opf.contains("<dc:creator>O&apos;Brien &quot;Author&quot;</dc:creator>"));

        let nav = nav_xhtml(&meta);
        assert!(nav.contains("&lt;i&gt;x&lt;/i&gt; &amp; &apos;y&apos;"));
        assert!(!nav.contains("<i>x</i>"));

        let ncx = toc_ncx(&meta);
        assert!(ncx.contains("<docTitle><text>Book &amp; &lt;Title&gt;</text></docTitle>"));

        let xhtml = chapter_xhtml(&meta.chapters[0], "<p>body</p>", "vi");
        assert!(xhtml.contains("<h1>&lt;i&gt;x&lt;/i&gt; &amp; &apos;y&apos;</h1>"));
    }

    #[test]
    fn nav_and_ncx_agree_on_order_and_targets() {
        let meta = meta(&["A", "B", "C"]);
        let nav = nav_xhtml(&meta);
        let ncx = toc_ncx(&meta);

        let nav_targets = nav
            .lines()
            .filter_map(|line| line.trim().strip_prefix("<li><a href=\""))
            .map(|rest| rest.split('"').next().unwrap_or_default().to_owned())
            .collect::<Vec<_>>();
        let ncx_targets = ncx
            .lines()
            .filter_map(|line| line.trim().strip_prefix("<content src=\""))
            .map(|rest| rest.split('"').next().unwrap_or_default().to_owned())
            .collect::<Vec<_>>();
        assert_eq!(nav_targets, ["chapter0.xhtml", "chapter1.xhtml", "chapter2.xhtml"]);
        assert_eq!(nav_targets, ncx_targets);

        let a = nav.find(">A</a>").expect("A in nav");
        let b = nav.find(">B</a>").expect("B in nav");
        let c = nav.find(">C</a>").expect("C in nav");
        assert!(a < b && b < c);
        assert!(ncx.contains("<navPoint id=\"navPoint-3\" playOrder=\"3\">"));
        assert!(nav.contains("<title>Table of Contents</title>"));
        assert!(nav.contains("<h1>Mục lục</h1>"));
    }

    #[test]
    fn chapter_document_embeds_body_and_stylesheet() {
        let ch = record(4, "Chương 5");
        let xhtml = chapter_xhtml(&ch, "<p>Nội dung</p>", "vi");
        assert!(xhtml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xhtml.contains("<title>Chương 5</title>"));
        assert!(xhtml.contains("href=\"style.css\""));
        assert!(xhtml.contains("<div class=\"chapter-content\">\n<p>Nội dung</p>\n  </div>"));
        assert!(xhtml.contains("xml:lang=\"vi\""));
    }

    #[test]
    fn fixed_artifacts_do_not_depend_on_content() {
        assert!(container_xml().contains("full-path=\"OEBPS/content.opf\""));
        assert_eq!(style_css(), style_css());
        assert_eq!(chapter_file_name(7), "chapter7.xhtml");
    }
}
