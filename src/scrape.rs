use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use url::Url;

use crate::cli::{ChapterArgs, InfoArgs};
use crate::fetch::ChapterSource;
use crate::formats::{ChapterContent, ChapterLink, NovelInfo, Volume};

const USER_AGENT_VALUE: &str = "novelbind/0.1";
const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const NOVEL_TITLE: &str = ".series-name a";
const NOVEL_INFO_ITEM: &str = ".info-item";
const INFO_NAME: &str = ".info-name";
const INFO_VALUE: &str = ".info-value";
const VOLUME_SECTION: &str = "section.volume-list";
const VOLUME_TITLE: &str = ".sect-title";
const CHAPTER_LINK: &str = ".chapter-name a";
const CHAPTER_TITLE: &str = ".chapter-title";
const CHAPTER_CONTENT: &str = "#chapter-content";

/// Page furniture removed from a chapter body before it is handed over.
const UNWANTED_IN_CONTENT: &str = "script, style, iframe, img, .ads, .advertisement, .chapter-banners, .d-none";

const AUTHOR_LABELS: &[&str] = &["Tác giả", "Author"];

/// Single-chapter retrieval over plain HTTP.
#[derive(Debug, Clone)]
pub struct HttpChapterSource {
    client: reqwest::Client,
}

impl HttpChapterSource {
    pub fn new(request_timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            client: build_client(request_timeout)?,
        })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChapterSource for HttpChapterSource {
    async fn fetch_chapter(&self, url: &str) -> anyhow::Result<ChapterContent> {
        let html = get_html(&self.client, url).await?;
        parse_chapter_page(&html).with_context(|| format!("parse chapter page: {url}"))
    }
}

pub async fn info(args: InfoArgs) -> anyhow::Result<()> {
    let client = build_client(Duration::from_secs(args.timeout_secs))?;
    let info = fetch_novel_info(&client, &args.url).await?;
    print_json(&info)
}

pub async fn chapter(args: ChapterArgs) -> anyhow::Result<()> {
    let url = parse_http_url(&args.url).context("parse chapter url")?;
    let source = HttpChapterSource::new(Duration::from_secs(args.timeout_secs))?;
    let chapter = source.fetch_chapter(url.as_str()).await?;
    tracing::info!(title = %chapter.title, bytes = chapter.body_markup.len(), "chapter loaded");
    print_json(&chapter)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize json output")?;
    println!("{json}");
    Ok(())
}

pub fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw).with_context(|| format!("invalid url: {raw}"))?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http/https: {url}");
    }
    Ok(url)
}

pub fn build_client(request_timeout: Duration) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(request_timeout)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .context("build http client")
}

pub async fn fetch_novel_info(client: &reqwest::Client, url: &str) -> anyhow::Result<NovelInfo> {
    let page_url = parse_http_url(url).context("parse novel url")?;
    let html = get_html(client, page_url.as_str()).await?;
    let info = parse_novel_page(&html, &page_url)
        .with_context(|| format!("parse novel page: {page_url}"))?;
    tracing::info!(
        title = %info.title,
        volumes = info.volumes.len(),
        chapters = info.total_chapters(),
        "novel info loaded"
    );
    Ok(info)
}

async fn get_html(client: &reqwest::Client, url: &str) -> anyhow::Result<String> {
    let response = client
        .get(url)
        .header(USER_AGENT, USER_AGENT_VALUE)
        .header(ACCEPT, ACCEPT_HTML)
        .send()
        .await
        .with_context(|| format!("GET {url}"))?;

    let status = response.status();
    if !status.is_success() {
        anyhow::bail!("GET {url} failed ({status})");
    }
    response
        .text()
        .await
        .with_context(|| format!("read body: {url}"))
}

pub fn parse_novel_page(html: &str, page_url: &Url) -> anyhow::Result<NovelInfo> {
    let document = Html::parse_document(html);

    let title = select_first_text(&document, NOVEL_TITLE)?.unwrap_or_default();
    if title.is_empty() {
        anyhow::bail!("novel title not found ({NOVEL_TITLE})");
    }
    let author = extract_author(&document)?;

    let section_sel = selector(VOLUME_SECTION)?;
    let volume_title_sel = selector(VOLUME_TITLE)?;
    let chapter_link_sel = selector(CHAPTER_LINK)?;

    let mut volumes = Vec::new();
    for (index, section) in document.select(&section_sel).enumerate() {
        let volume_title = section
            .select(&volume_title_sel)
            .next()
            .map(element_text)
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| format!("Volume {}", index + 1));

        let mut chapters = Vec::new();
        for link in section.select(&chapter_link_sel) {
            let Some(href) = link.value().attr("href") else {
                continue;
            };
            let Ok(chapter_url) = page_url.join(href) else {
                tracing::debug!(href, "skipping unresolvable chapter link");
                continue;
            };
            chapters.push(ChapterLink {
                index: chapters.len(),
                title: element_text(link),
                url: chapter_url.to_string(),
            });
        }

        volumes.push(Volume {
            index,
            title: volume_title,
            chapters,
        });
    }

    Ok(NovelInfo {
        title,
        author,
        url: page_url.to_string(),
        volumes,
    })
}

fn extract_author(document: &Html) -> anyhow::Result<String> {
    let item_sel = selector(NOVEL_INFO_ITEM)?;
    let name_sel = selector(INFO_NAME)?;
    let value_sel = selector(INFO_VALUE)?;

    for item in document.select(&item_sel) {
        let (Some(name), Some(value)) = (
            item.select(&name_sel).next(),
            item.select(&value_sel).next(),
        ) else {
            continue;
        };
        let name = element_text(name);
        if AUTHOR_LABELS.iter().any(|label| name.contains(label)) {
            return Ok(element_text(value));
        }
    }
    Ok(String::new())
}

pub fn parse_chapter_page(html: &str) -> anyhow::Result<ChapterContent> {
    let mut document = Html::parse_document(html);
    let title = select_first_text(&document, CHAPTER_TITLE)?.unwrap_or_default();

    let content_sel = selector(CHAPTER_CONTENT)?;
    let content_id = document
        .select(&content_sel)
        .next()
        .map(|el| el.id())
        .ok_or_else(|| anyhow::anyhow!("chapter content not found ({CHAPTER_CONTENT})"))?;

    let mut doomed = Vec::new();
    {
        let content = document
            .tree
            .get(content_id)
            .and_then(ElementRef::wrap)
            .ok_or_else(|| anyhow::anyhow!("chapter content node vanished"))?;

        let unwanted_sel = selector(UNWANTED_IN_CONTENT)?;
        doomed.extend(content.select(&unwanted_sel).map(|el| el.id()));
        doomed.extend(
            content
                .descendants()
                .filter_map(ElementRef::wrap)
                .filter(|el| is_hidden_by_style(el))
                .map(|el| el.id()),
        );

        if let Some(first) = content.children().find_map(ElementRef::wrap)
            && duplicates_title(&element_text(first), &title)
        {
            doomed.push(first.id());
        }
    }
    for id in doomed {
        if let Some(mut node) = document.tree.get_mut(id) {
            node.detach();
        }
    }

    let body_markup = document
        .tree
        .get(content_id)
        .and_then(ElementRef::wrap)
        .map(|el| el.inner_html().trim().to_owned())
        .unwrap_or_default();

    Ok(ChapterContent { title, body_markup })
}

fn is_hidden_by_style(el: &ElementRef<'_>) -> bool {
    el.value().attr("style").is_some_and(|style| {
        let compact = style
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();
        compact.contains("display:none")
    })
}

/// A leading block repeating the chapter title (exactly, or containing it for long titles).
fn duplicates_title(first_text: &str, title: &str) -> bool {
    if title.is_empty() {
        return false;
    }
    first_text == title || (title.chars().count() > 20 && first_text.contains(title))
}

fn selector(css: &str) -> anyhow::Result<Selector> {
    Selector::parse(css).map_err(|err| anyhow::anyhow!("invalid selector {css:?}: {err}"))
}

fn select_first_text(document: &Html, css: &str) -> anyhow::Result<Option<String>> {
    let sel = selector(css)?;
    Ok(document.select(&sel).next().map(element_text))
}

fn element_text(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOVEL_HTML: &str = r#"<!doctype html>
<html><body>
  <span class="series-name"><a href="/truyen/1">Kẻ &amp; Thù</a></span>
  <div class="info-item"><span class="info-name">Thể loại:</span><span class="info-value">Fantasy</span></div>
  <div class="info-item"><span class="info-name">Tác giả:</span><span class="info-value"> Nguyễn  Văn A </span></div>
  <section class="volume-list">
    <header><span class="sect-title">Tập 1</span></header>
    <ul>
      <li><div class="chapter-name"><a href="/truyen/1/c1">Chương 1</a></div></li>
      <li><div class="chapter-name"><a href="c2">Chương 2</a></div></li>
    </ul>
  </section>
  <section class="volume-list">
    <header><span class="sect-title"></span></header>
    <ul><li><div class="chapter-name"><a href="https://other.example/c3">Chương 3</a></div></li></ul>
  </section>
</body></html>"#;

    #[test]
    fn parses_novel_page() -> anyhow::Result<()> {
        let url = Url::parse("https://docln.example/truyen/1-ke-thu")?;
        let info = parse_novel_page(NOVEL_HTML, &url)?;
        assert_eq!(info.title, "Kẻ & Thù");
        assert_eq!(info.author, "Nguyễn Văn A");
        assert_eq!(info.volumes.len(), 2);
        assert_eq!(info.volumes[0].title, "Tập 1");
        assert_eq!(info.volumes[1].title, "Volume 2");
        assert_eq!(info.total_chapters(), 3);

        let urls = info.volumes[0]
            .chapters
            .iter()
            .map(|c| c.url.as_str())
            .collect::<Vec<_>>();
        assert_eq!(
            urls,
            [
                "https://docln.example/truyen/1/c1",
                "https://docln.example/truyen/c2"
            ]
        );
        assert_eq!(info.volumes[0].chapters[1].index, 1);
        assert_eq!(info.volumes[1].chapters[0].url, "https://other.example/c3");
        Ok(())
    }

    #[test]
    fn novel_page_without_title_is_an_error() {
        let url = Url::parse("https://docln.example/x").unwrap();
        let err = parse_novel_page("<html><body>nothing</body></html>", &url).unwrap_err();
        assert!(err.to_string().contains("novel title not found"));
    }

    #[test]
    fn chapter_page_strips_furniture_and_duplicate_title() -> anyhow::Result<()> {
        let html = r#"<html><body>
  <div class="chapter-title">Chương 1: Khởi đầu</div>
  <div id="chapter-content">
    <p>Chương 1: Khởi đầu</p>
    <p>Đoạn một.</p>
    <div class="ads">quảng cáo</div>
    <script>track()</script>
    <p style="display: none">hidden</p>
    <img src="x.png">
    <p>Đoạn hai.</p>
  </div>
</body></html>"#;

        let chapter = parse_chapter_page(html)?;
        assert_eq!(chapter.title, "Chương 1: Khởi đầu");
        assert!(chapter.body_markup.contains("Đoạn một."));
        assert!(chapter.body_markup.contains("Đoạn hai."));
        for gone in ["quảng cáo", "track()", "hidden", "<img", "<p>Chương 1"] {
            assert!(!chapter.body_markup.contains(gone), "{gone} survived");
        }
        Ok(())
    }

    #[test]
    fn missing_chapter_content_is_an_error() {
        let err = parse_chapter_page("<html><body><p>no content</p></body></html>").unwrap_err();
        assert!(err.to_string().contains("chapter content not found"));
    }

    #[test]
    fn only_http_urls_are_accepted() {
        assert!(parse_http_url("https://docln.example/truyen/1").is_ok());
        let err = parse_http_url("ftp://docln.example/truyen/1").unwrap_err();
        assert!(err.to_string().contains("http/https"));
        assert!(parse_http_url("not a url").is_err());
    }

    #[test]
    fn duplicate_title_rules() {
        assert!(duplicates_title("Chương 1", "Chương 1"));
        assert!(!duplicates_title("Chương 1 - extra", "Chương 1"));
        let long = "A very long chapter title indeed";
        assert!(duplicates_title(&format!("Prefix {long}"), long));
        assert!(!duplicates_title("anything", ""));
    }
}
