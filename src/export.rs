use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use serde::Serialize;

use crate::cli::ExportArgs;
use crate::epub;
use crate::fetch::{BatchOptions, ChapterSource, fetch_all};
use crate::formats::{ChapterRecord, FetchOutcome, FetchRequest, NovelInfo, Progress, VolumeGroup};
use crate::scrape::{self, HttpChapterSource};
use crate::sink::{ArchiveSink, DirectorySink, epub_file_name, sanitize_filename};

const PHASE_FETCHING: &str = "Fetching chapters...";
const PHASE_PROCESSING: &str = "Processing content...";
const PHASE_GENERATING: &str = "Generating EPUB...";
const PHASE_DONE: &str = "Done!";
const PHASE_ERROR: &str = "Error";

const FETCH_SHARE: usize = 70;
const GENERATE_START: u32 = 85;
const GENERATE_SHARE: usize = 15;

pub async fn run(args: ExportArgs) -> anyhow::Result<()> {
    let per_item_timeout = Duration::from_secs(args.timeout_secs);
    let client = scrape::build_client(per_item_timeout)?;
    let novel = scrape::fetch_novel_info(&client, &args.url).await?;

    let selected_volumes = select_volumes(&novel, &args.volumes)?;
    let request = ExportRequest {
        novel,
        selected_volumes,
        split_by_volume: args.split_volumes,
    };
    let options = ExportOptions {
        batch: BatchOptions {
            concurrency_limit: args.concurrency,
            per_item_timeout,
        },
        language: args.lang,
    };
    let sink = DirectorySink::new(&args.out, args.force);
    let source: Arc<dyn ChapterSource> = Arc::new(HttpChapterSource::with_client(client));

    let mut job = ExportJob::new(request);
    let report = job.run(&options, source, &sink, &LogProgress).await?;

    for missing in &report.missing {
        tracing::warn!(
            volume = %missing.volume_title,
            chapter = %missing.title,
            url = %missing.url,
            error = %missing.error,
            "chapter missing from export"
        );
    }
    for file in &report.files {
        println!("{}", sink.out_dir().join(file).display());
    }
    Ok(())
}

/// Resolves `--volumes` against the novel. An empty list means every volume.
fn select_volumes(novel: &NovelInfo, requested: &[usize]) -> anyhow::Result<BTreeSet<usize>> {
    if requested.is_empty() {
        return Ok((0..novel.volumes.len()).collect());
    }
    let count = novel.volumes.len();
    if let Some(bad) = requested.iter().find(|index| **index >= count) {
        anyhow::bail!("volume {bad} does not exist (the novel has {count} volumes)");
    }
    Ok(requested.iter().copied().collect())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    Fetching,
    Assembling,
    Done,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub novel: NovelInfo,
    pub selected_volumes: BTreeSet<usize>,
    pub split_by_volume: bool,
}

#[derive(Debug, Clone)]
pub struct ExportOptions {
    pub batch: BatchOptions,
    pub language: String,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            batch: BatchOptions::default(),
            language: epub::DEFAULT_LANGUAGE.to_string(),
        }
    }
}

pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: &Progress);
}

/// Renders progress updates as log lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn report(&self, progress: &Progress) {
        tracing::info!(
            percent = progress.percent,
            detail = %progress.detail,
            "{}",
            progress.phase
        );
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MissingChapter {
    pub volume_title: String,
    pub title: String,
    pub url: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExportReport {
    pub files: Vec<String>,
    pub requested: usize,
    pub packaged: usize,
    pub missing: Vec<MissingChapter>,
}

impl ExportReport {
    pub fn summary(&self) -> String {
        let files = if self.files.len() == 1 {
            "1 EPUB".to_string()
        } else {
            format!("{} EPUBs", self.files.len())
        };
        if self.missing.is_empty() {
            format!("Created {files} with all {} chapters.", self.packaged)
        } else {
            format!(
                "Created {files}; {} of {} chapters missing.",
                self.missing.len(),
                self.requested
            )
        }
    }
}

/// One export operation: `Idle → Fetching → Assembling → Done | Failed`.
///
/// Done and Failed are terminal; a new export needs a new job.
#[derive(Debug)]
pub struct ExportJob {
    request: ExportRequest,
    state: ExportState,
}

/// A chapter picked for export, in reading order. Its position is the fetch index.
#[derive(Debug, Clone)]
struct SelectedChapter {
    volume_index: usize,
    volume_title: String,
    title: String,
    url: String,
}

impl ExportJob {
    pub fn new(request: ExportRequest) -> Self {
        Self {
            request,
            state: ExportState::Idle,
        }
    }

    pub fn state(&self) -> &ExportState {
        &self.state
    }

    pub async fn run(
        &mut self,
        options: &ExportOptions,
        source: Arc<dyn ChapterSource>,
        sink: &dyn ArchiveSink,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<ExportReport> {
        if self.state != ExportState::Idle {
            anyhow::bail!("export job already ran ({:?})", self.state);
        }

        match self.try_run(options, source, sink, progress).await {
            Ok(report) => {
                self.state = ExportState::Done;
                progress.report(&Progress::new(100, PHASE_DONE, report.summary()));
                Ok(report)
            }
            Err(err) => {
                let message = format!("{err:#}");
                tracing::error!(error = %message, "export failed");
                self.state = ExportState::Failed(message.clone());
                progress.report(&Progress::new(0, PHASE_ERROR, message));
                Err(err)
            }
        }
    }

    async fn try_run(
        &mut self,
        options: &ExportOptions,
        source: Arc<dyn ChapterSource>,
        sink: &dyn ArchiveSink,
        progress: &dyn ProgressSink,
    ) -> anyhow::Result<ExportReport> {
        if self.request.selected_volumes.is_empty() {
            anyhow::bail!("nothing selected: choose at least one volume");
        }
        let selected = select_chapters(&self.request.novel, &self.request.selected_volumes);
        if selected.is_empty() {
            anyhow::bail!("no chapters selected: the selected volumes are empty");
        }

        self.state = ExportState::Fetching;
        let total = selected.len();
        tracing::info!(
            title = %self.request.novel.title,
            chapters = total,
            volumes = self.request.selected_volumes.len(),
            split = self.request.split_by_volume,
            "export: fetch chapters"
        );
        progress.report(&Progress::new(0, PHASE_FETCHING, format!("0/{total}")));

        let requests = selected
            .iter()
            .enumerate()
            .map(|(index, chapter)| FetchRequest {
                index,
                source_url: chapter.url.clone(),
            })
            .collect::<Vec<_>>();
        let outcomes = fetch_all(requests, &options.batch, source, |done, total| {
            let percent = (done * FETCH_SHARE / total.max(1)) as u32;
            progress.report(&Progress::new(
                percent,
                PHASE_FETCHING,
                format!("{done}/{total}"),
            ));
        })
        .await;

        self.state = ExportState::Assembling;
        progress.report(&Progress::new(
            FETCH_SHARE as u32,
            PHASE_PROCESSING,
            format!("{total}/{total}"),
        ));

        let (records, missing) = collect_survivors(&selected, outcomes);
        if records.is_empty() {
            anyhow::bail!("all {total} selected chapters failed to download");
        }
        if !missing.is_empty() {
            tracing::warn!(
                missing = missing.len(),
                requested = total,
                "export: continuing without failed chapters"
            );
        }
        let packaged = records.len();

        progress.report(&Progress::new(GENERATE_START, PHASE_GENERATING, ""));
        let novel = &self.request.novel;
        let outputs = if self.request.split_by_volume {
            group_by_volume(records)
                .into_iter()
                .map(|group| {
                    (
                        format!("{} - {}", novel.title, group.volume_title),
                        Some(group.volume_title),
                        group.chapters,
                    )
                })
                .collect::<Vec<_>>()
        } else {
            let mut records = records;
            renumber(&mut records);
            vec![(novel.title.clone(), None, records)]
        };

        let mut files = Vec::with_capacity(outputs.len());
        let mut used_names = HashSet::new();
        let archive_count = outputs.len();
        for (position, (title, volume_title, chapters)) in outputs.into_iter().enumerate() {
            if let Some(volume_title) = &volume_title {
                let percent =
                    GENERATE_START + ((position + 1) * GENERATE_SHARE / archive_count) as u32;
                progress.report(&Progress::new(
                    percent,
                    PHASE_GENERATING,
                    format!("Volume: {volume_title}"),
                ));
            }

            tracing::info!(title = %title, chapters = chapters.len(), "export: package epub");
            let meta = epub::book_metadata(&title, &novel.author, &options.language, chapters);
            let archive =
                epub::package(&meta).with_context(|| format!("package epub: {}", meta.title))?;
            let filename = unique_file_name(&meta.title, &mut used_names);
            sink.save(archive, &filename)
                .with_context(|| format!("save epub: {filename}"))?;
            files.push(filename);
        }

        Ok(ExportReport {
            files,
            requested: total,
            packaged,
            missing,
        })
    }
}

/// Picks `"{title}.epub"`, or `"{title} (N).epub"` when an earlier archive of this export already
/// took the name. Names are compared case-insensitively.
fn unique_file_name(title: &str, used: &mut HashSet<String>) -> String {
    let mut filename = epub_file_name(title);
    let mut n = 2;
    while !used.insert(filename.to_lowercase()) {
        filename = format!("{} ({n}).epub", sanitize_filename(title));
        n += 1;
    }
    filename
}

fn select_chapters(novel: &NovelInfo, selected_volumes: &BTreeSet<usize>) -> Vec<SelectedChapter> {
    novel
        .volumes
        .iter()
        .enumerate()
        .filter(|(position, _)| selected_volumes.contains(position))
        .flat_map(|(position, volume)| {
            volume.chapters.iter().map(move |chapter| SelectedChapter {
                volume_index: position,
                volume_title: volume.title.clone(),
                title: chapter.title.clone(),
                url: chapter.url.clone(),
            })
        })
        .collect()
}

/// Joins outcomes back onto the selection. Failed chapters are left out; their sequence numbers
/// are provisional until the records are grouped into archives.
fn collect_survivors(
    selected: &[SelectedChapter],
    outcomes: Vec<FetchOutcome>,
) -> (Vec<ChapterRecord>, Vec<MissingChapter>) {
    let mut records = Vec::new();
    let mut missing = Vec::new();

    for outcome in outcomes {
        let Some(chapter) = selected.get(outcome.index) else {
            tracing::warn!(index = outcome.index, "fetch outcome without a selected chapter");
            continue;
        };
        match outcome.result {
            Ok(content) => {
                let title = [chapter.title.trim(), content.title.trim()]
                    .into_iter()
                    .find(|t| !t.is_empty())
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("Chapter {}", outcome.index + 1));
                records.push(ChapterRecord {
                    title,
                    body_markup: content.body_markup,
                    volume_index: chapter.volume_index,
                    volume_title: chapter.volume_title.clone(),
                    sequence_in_output: records.len(),
                });
            }
            Err(error) => missing.push(MissingChapter {
                volume_title: chapter.volume_title.clone(),
                title: chapter.title.clone(),
                url: chapter.url.clone(),
                error,
            }),
        }
    }

    (records, missing)
}

/// Groups records by volume in order of first appearance and renumbers each group from zero.
pub fn group_by_volume(records: Vec<ChapterRecord>) -> Vec<VolumeGroup> {
    let mut groups: Vec<VolumeGroup> = Vec::new();
    for record in records {
        match groups
            .iter_mut()
            .find(|group| group.volume_index == record.volume_index)
        {
            Some(group) => group.chapters.push(record),
            None => groups.push(VolumeGroup {
                volume_index: record.volume_index,
                volume_title: record.volume_title.clone(),
                chapters: vec![record],
            }),
        }
    }
    for group in &mut groups {
        renumber(&mut group.chapters);
    }
    groups.retain(|group| !group.chapters.is_empty());
    groups
}

fn renumber(chapters: &mut [ChapterRecord]) {
    for (position, chapter) in chapters.iter_mut().enumerate() {
        chapter.sequence_in_output = position;
    }
}
