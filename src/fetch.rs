use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::formats::{ChapterContent, FetchOutcome, FetchRequest};

pub const DEFAULT_CONCURRENCY_LIMIT: usize = 5;
pub const DEFAULT_PER_ITEM_TIMEOUT: Duration = Duration::from_secs(30);

/// Retrieves one chapter. Implementations own any cleanup needed when a call is dropped
/// mid-flight (timeouts drop the future).
#[async_trait]
pub trait ChapterSource: Send + Sync {
    async fn fetch_chapter(&self, url: &str) -> anyhow::Result<ChapterContent>;
}

#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub concurrency_limit: usize,
    pub per_item_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency_limit: DEFAULT_CONCURRENCY_LIMIT,
            per_item_timeout: DEFAULT_PER_ITEM_TIMEOUT,
        }
    }
}

/// Fetches every request through `source`, at most `concurrency_limit` at a time.
///
/// Requests are dispatched in consecutive windows; a window must fully settle before the next
/// one starts. A failing, timing-out or panicking item only produces an error outcome for its
/// own index. `on_progress(completed, total)` fires once per window. The result holds exactly one
/// outcome per request, sorted by index.
pub async fn fetch_all<F>(
    requests: Vec<FetchRequest>,
    options: &BatchOptions,
    source: Arc<dyn ChapterSource>,
    mut on_progress: F,
) -> Vec<FetchOutcome>
where
    F: FnMut(usize, usize),
{
    let total = requests.len();
    if total == 0 {
        return Vec::new();
    }

    let window_size = options.concurrency_limit.max(1);
    let timeout = options.per_item_timeout;
    tracing::debug!(
        total,
        window_size,
        timeout_ms = timeout.as_millis() as u64,
        "batch fetch: start"
    );

    // One slot per request position; each task only ever fills its own slot.
    let mut slots: Vec<Option<FetchOutcome>> = vec![None; total];
    let mut completed = 0usize;

    for (window_idx, window) in requests.chunks(window_size).enumerate() {
        let window_start = window_idx * window_size;
        let mut join_set = tokio::task::JoinSet::new();

        for (offset, request) in window.iter().enumerate() {
            let slot = window_start + offset;
            let source = Arc::clone(&source);
            let request = request.clone();
            join_set.spawn(async move {
                let result = match tokio::time::timeout(
                    timeout,
                    source.fetch_chapter(&request.source_url),
                )
                .await
                {
                    Ok(Ok(content)) => Ok(content),
                    Ok(Err(err)) => Err(format!("{err:#}")),
                    Err(_) => Err(format!(
                        "timed out after {}ms loading chapter",
                        timeout.as_millis()
                    )),
                };
                (slot, request, result)
            });
        }

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((slot, request, result)) => {
                    if let Err(error) = &result {
                        tracing::warn!(
                            index = request.index,
                            url = %request.source_url,
                            %error,
                            "chapter fetch failed"
                        );
                    }
                    slots[slot] = Some(FetchOutcome {
                        index: request.index,
                        result,
                    });
                }
                Err(err) => {
                    // The slot is unknown for a panicked task; it is filled below.
                    tracing::warn!(?err, "chapter fetch task aborted");
                }
            }
        }

        for (offset, request) in window.iter().enumerate() {
            let slot = &mut slots[window_start + offset];
            if slot.is_none() {
                *slot = Some(FetchOutcome {
                    index: request.index,
                    result: Err("chapter fetch task aborted".to_string()),
                });
            }
        }

        completed += window.len();
        on_progress(completed, total);
    }

    let mut outcomes = slots.into_iter().flatten().collect::<Vec<_>>();
    outcomes.sort_by_key(|outcome| outcome.index);

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    tracing::debug!(total, failed, "batch fetch: done");
    outcomes
}
