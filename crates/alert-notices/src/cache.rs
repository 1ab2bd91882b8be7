/// On-disk page cache in front of the fetcher.
///
/// Layout: `<pages_dir>/<id>.txt`, one file per notice, holding the text the
/// fetcher produced. Entries never expire; published notices do not change.
///
/// Cache trouble degrades to a warning: an unreadable entry falls through to
/// the network and a failed write still returns the fetched text. Fetch errors
/// are never cached.
use std::io::ErrorKind;
use std::path::PathBuf;

use tracing::{debug, warn};

use crate::error::AppError;
use crate::fetch::Fetcher;
use crate::model::NoticeId;

pub struct PageCache {
    dir: PathBuf,
    fetcher: Fetcher,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>, fetcher: Fetcher) -> Self {
        Self {
            dir: dir.into(),
            fetcher,
        }
    }

    pub fn page_path(&self, id: NoticeId) -> PathBuf {
        self.dir.join(format!("{id}.txt"))
    }

    pub async fn get(&self, id: NoticeId) -> Option<String> {
        let path = self.page_path(id);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Some(text),
            Err(e) if e.kind() == ErrorKind::NotFound => None,
            Err(e) => {
                warn!(error = %e, path = %path.display(), "page cache read failed");
                None
            }
        }
    }

    pub async fn set(&self, id: NoticeId, text: &str) -> bool {
        let path = self.page_path(id);
        let tmp = path.with_extension("txt.tmp");
        let result = async {
            tokio::fs::create_dir_all(&self.dir).await?;
            tokio::fs::write(&tmp, text).await?;
            tokio::fs::rename(&tmp, &path).await
        }
        .await;
        result
            .inspect_err(|e| warn!(error = %e, path = %path.display(), "page cache write failed"))
            .is_ok()
    }

    pub async fn get_or_fetch(&self, id: NoticeId) -> Result<String, AppError> {
        if let Some(text) = self.get(id).await {
            debug!(id, "page cache hit");
            return Ok(text);
        }
        let text = self.fetcher.fetch(id).await?;
        self.set(id, &text).await;
        Ok(text)
    }
}
