/// Batch orchestration: fetch, extract, persist.
///
/// Notices in the working set are independent units driven concurrently from
/// one task. Each completion is folded into the store and the whole store is
/// rewritten before the next completion is taken, so this task is the only
/// writer of the result file and an interrupted run loses only in-flight work.
use std::ops::Range;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};

use futures::{FutureExt, StreamExt};
use tracing::{error, info, warn};

use crate::cache::PageCache;
use crate::error::AppError;
use crate::extract::Extractor;
use crate::model::{ExtractedRecord, NoticeId, ResultStore};
use crate::schema::ExtractionSchema;
use crate::sink;

pub struct BatchRunner {
    cache: PageCache,
    extractor: Extractor,
    schema: ExtractionSchema,
    output: PathBuf,
    /// Max notices in flight. `None` submits the whole working set at once.
    concurrency: Option<usize>,
}

impl BatchRunner {
    pub fn new(
        cache: PageCache,
        extractor: Extractor,
        schema: ExtractionSchema,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            cache,
            extractor,
            schema,
            output: output.into(),
            concurrency: None,
        }
    }

    pub fn with_concurrency(mut self, limit: Option<usize>) -> Self {
        self.concurrency = limit;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Process `ids` and return the updated store.
    ///
    /// With an `existing` store only error-marked or unrecorded ids are
    /// processed and every other entry is carried over untouched. Without one,
    /// the whole range is processed into a fresh store.
    ///
    /// Per-notice failures become error markers; only a failure to write the
    /// result file aborts the run.
    pub async fn run(
        &self,
        ids: Range<NoticeId>,
        existing: Option<ResultStore>,
    ) -> Result<ResultStore, AppError> {
        let (mut store, pending) = match existing {
            Some(store) => {
                let pending = store.pending(ids.clone());
                (store, pending)
            }
            None => (ResultStore::new(), ids.clone().collect::<Vec<_>>()),
        };
        let total = pending.len();
        info!(
            start = ids.start,
            end = ids.end,
            pending = total,
            "starting alert notice batch"
        );

        sink::write_json(&store, &self.output).await?;
        if pending.is_empty() {
            info!("nothing to process");
            return Ok(store);
        }

        let limit = self.concurrency.unwrap_or(total).max(1);
        let mut completions = futures::stream::iter(pending)
            .map(|id| self.process_contained(id))
            .buffer_unordered(limit);

        let mut done = 0usize;
        while let Some((id, record)) = completions.next().await {
            done += 1;
            let failed = record.is_error();
            store.insert(id, record);
            sink::write_json(&store, &self.output).await?;
            info!(id, done, total, failed, "notice saved");
        }

        Ok(store)
    }

    /// Never fails: errors and panics for one notice become its error marker.
    async fn process_contained(&self, id: NoticeId) -> (NoticeId, ExtractedRecord) {
        match AssertUnwindSafe(self.process(id)).catch_unwind().await {
            Ok(Ok(record)) => (id, record),
            Ok(Err(e)) if e.is_network() => {
                warn!(id, error = %e, "failed to fetch notice");
                (id, ExtractedRecord::failed())
            }
            Ok(Err(e)) => {
                warn!(id, error = %e, "failed to extract information");
                (id, ExtractedRecord::failed())
            }
            Err(_) => {
                error!(id, "notice processing panicked");
                (id, ExtractedRecord::failed())
            }
        }
    }

    async fn process(&self, id: NoticeId) -> Result<ExtractedRecord, AppError> {
        let text = self.cache.get_or_fetch(id).await?;
        if text.is_empty() {
            info!(id, "notice page is empty, nothing to extract");
            return Ok(ExtractedRecord::empty());
        }

        info!(id, chars = text.len(), "extracting information");
        let fields = self.extractor.extract(&text, &self.schema).await?;
        Ok(ExtractedRecord::Success(fields))
    }
}
