//! Realtime invalidation.
//!
//! [`RealtimeListener`] turns change notifications for its owner into full
//! reloads of a view. Every matching event triggers one reload; bursts are
//! not coalesced. A lagged receiver reloads once and carries on, since a
//! full reload covers whatever was missed.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::name_cache::NameCache;
use super::pagination::PageController;
use super::view::{ApplyOutcome, TaskListView};
use crate::error::Result;
use crate::storage::{Backend, ChangeEvent, Table};

/// Something that can re-read its data set from the backend.
pub trait Reload: Send + Sync {
    fn reload(&self) -> impl Future<Output = Result<()>> + Send;
}

pub struct RealtimeListener<R> {
    owner_id: String,
    receiver: broadcast::Receiver<ChangeEvent>,
    target: R,
    cache: Option<NameCache>,
}

impl<R: Reload> RealtimeListener<R> {
    #[must_use]
    pub fn new(owner_id: impl Into<String>, receiver: broadcast::Receiver<ChangeEvent>, target: R) -> Self {
        Self {
            owner_id: owner_id.into(),
            receiver,
            target,
            cache: None,
        }
    }

    /// Drop cached project names when a project changes.
    #[must_use]
    pub fn with_name_cache(mut self, cache: NameCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Listen until the channel closes. Returns the number of reloads run.
    pub async fn run(mut self) -> usize {
        let mut reloads = 0;
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if event.owner_id != self.owner_id {
                        continue;
                    }
                    if event.table == Table::Projects {
                        if let Some(cache) = &self.cache {
                            cache.invalidate(&event.entity_id);
                        }
                    }
                    debug!(table = event.table.as_str(), entity = %event.entity_id, "change received");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "change listener lagged, reloading");
                    if let Some(cache) = &self.cache {
                        cache.clear();
                    }
                }
                Err(RecvError::Closed) => break,
            }

            reloads += 1;
            if let Err(e) = self.target.reload().await {
                warn!(error = %e, "reload failed");
            }
        }
        reloads
    }

    pub fn spawn(self) -> JoinHandle<usize>
    where
        R: 'static,
    {
        tokio::spawn(self.run())
    }
}

/// Reloads a shared [`TaskListView`] through the page controller.
pub struct ViewReloader<B> {
    backend: B,
    cache: NameCache,
    view: Arc<Mutex<TaskListView>>,
}

impl<B: Backend> ViewReloader<B> {
    #[must_use]
    pub fn new(backend: B, cache: NameCache, view: Arc<Mutex<TaskListView>>) -> Self {
        Self { backend, cache, view }
    }
}

impl<B: Backend> Reload for ViewReloader<B> {
    async fn reload(&self) -> Result<()> {
        let request = self
            .view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .request()
            .clone();

        let page = PageController::new(&self.backend, &self.cache)
            .fetch(&request)
            .await?;

        let outcome = self
            .view
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .apply_response(&request, page);
        if outcome != ApplyOutcome::Unchanged {
            debug!(?outcome, page = request.page, "view reloaded");
        }
        Ok(())
    }
}
