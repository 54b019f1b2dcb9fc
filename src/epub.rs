use std::io::{Cursor, Write as _};

use anyhow::Context as _;
use chrono::Utc;
use zip::write::SimpleFileOptions;

use crate::formats::{Archive, BookMetadata, ChapterRecord};
use crate::sanitize::sanitize;
use crate::templates;

pub const MIMETYPE: &str = "application/epub+zip";
pub const DEFAULT_LANGUAGE: &str = "vi";

/// Builds a fresh metadata block for one archive. Every call gets a new identifier, so two
/// volumes of the same book never share one.
pub fn book_metadata(
    title: &str,
    author: &str,
    language: &str,
    chapters: Vec<ChapterRecord>,
) -> BookMetadata {
    let title = title.trim();
    let author = author.trim();
    let language = language.trim();
    BookMetadata {
        title: if title.is_empty() { "Untitled" } else { title }.to_owned(),
        author: if author.is_empty() { "Unknown" } else { author }.to_owned(),
        identifier: uuid::Uuid::new_v4(),
        language: if language.is_empty() {
            DEFAULT_LANGUAGE
        } else {
            language
        }
        .to_owned(),
        chapters,
    }
}

/// Packages one book into an in-memory EPUB.
///
/// Member order is fixed: `mimetype` (stored), container descriptor, package document, both
/// navigation documents, stylesheet, then `chapterN.xhtml` in sequence order (deflated).
pub fn package(meta: &BookMetadata) -> anyhow::Result<Archive> {
    validate(meta)?;

    let modified = Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let container_xml = templates::container_xml();
    let content_opf = templates::content_opf(meta, &modified);
    let nav_xhtml = templates::nav_xhtml(meta);
    let toc_ncx = templates::toc_ncx(meta);
    let css = templates::style_css();

    let mut zip = zip::ZipWriter::new(Cursor::new(Vec::new()));

    // Readers sniff the format from this entry, so it must come first and stay uncompressed.
    let mimetype_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Stored)
        .unix_permissions(0o644);
    zip.start_file("mimetype", mimetype_options)
        .context("epub start_file mimetype")?;
    zip.write_all(MIMETYPE.as_bytes())
        .context("epub write mimetype")?;

    let deflated_options = SimpleFileOptions::default()
        .compression_method(zip::CompressionMethod::Deflated)
        .unix_permissions(0o644);

    let fixed_members = [
        ("META-INF/container.xml", container_xml),
        ("OEBPS/content.opf", content_opf),
        ("OEBPS/nav.xhtml", nav_xhtml),
        ("OEBPS/toc.ncx", toc_ncx),
        ("OEBPS/style.css", css),
    ];
    for (name, contents) in &fixed_members {
        zip.start_file(*name, deflated_options)
            .with_context(|| format!("epub start_file {name}"))?;
        zip.write_all(contents.as_bytes())
            .with_context(|| format!("epub write {name}"))?;
    }

    for chapter in &meta.chapters {
        let body = sanitize(&chapter.body_markup);
        let xhtml = templates::chapter_xhtml(chapter, &body, &meta.language);
        let name = format!(
            "OEBPS/{}",
            templates::chapter_file_name(chapter.sequence_in_output)
        );

        zip.start_file(name.as_str(), deflated_options)
            .with_context(|| format!("epub start_file chapter: {name}"))?;
        zip.write_all(xhtml.as_bytes())
            .with_context(|| format!("epub write chapter: {name}"))?;
    }

    let cursor = zip.finish().context("epub finish zip")?;
    let archive = Archive::new(cursor.into_inner());
    tracing::debug!(
        title = %meta.title,
        chapters = meta.chapters.len(),
        bytes = archive.len(),
        "packaged epub"
    );
    Ok(archive)
}

fn validate(meta: &BookMetadata) -> anyhow::Result<()> {
    if meta.chapters.is_empty() {
        anyhow::bail!("refusing to package an epub without chapters: {}", meta.title);
    }
    for (position, chapter) in meta.chapters.iter().enumerate() {
        if chapter.sequence_in_output != position {
            anyhow::bail!(
                "chapter sequence is not dense: position {position} has sequence {} ({})",
                chapter.sequence_in_output,
                chapter.title
            );
        }
    }
    Ok(())
}
