//! Best-effort multicast to attached pages.
//!
//! A page is anything that can present a notification: the daemon's own
//! terminal presenter or a `nudge page` process attached over the control
//! socket. `PageHub::broadcast` fans a request out to every page, waits for
//! all of them, and reports per-page outcomes without ever failing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{Error, Result};

pub const DEFAULT_NOTIFICATION_TITLE: &str = "AI Reminder";

/// Request delivered to a page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PageRequest {
    ShowNotification { title: String, message: String },
    PlaySound,
}

impl PageRequest {
    pub fn notification(message: impl Into<String>) -> Self {
        PageRequest::ShowNotification {
            title: DEFAULT_NOTIFICATION_TITLE.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait PageAgent: Send + Sync {
    /// Human-readable label used in logs
    fn label(&self) -> String;

    /// Present the request. `Error::PageClosed` detaches the page.
    async fn deliver(&self, request: &PageRequest) -> Result<()>;
}

pub type PageId = u64;

/// Outcome of one broadcast
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub failed: usize,
    pub detached: usize,
}

/// Registry of attached pages
#[derive(Default)]
pub struct PageHub {
    pages: RwLock<Vec<(PageId, Arc<dyn PageAgent>)>>,
    next_id: AtomicU64,
}

impl PageHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn attach(&self, page: Arc<dyn PageAgent>) -> PageId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(page = %page.label(), id, "page attached");
        self.pages.write().await.push((id, page));
        id
    }

    pub async fn detach(&self, id: PageId) -> bool {
        let mut pages = self.pages.write().await;
        let before = pages.len();
        pages.retain(|(page_id, _)| *page_id != id);
        before != pages.len()
    }

    /// Number of attached pages
    pub async fn count(&self) -> usize {
        self.pages.read().await.len()
    }

    /// Deliver `request` to every page
    pub async fn broadcast(&self, request: &PageRequest) -> BroadcastReport {
        let pages: Vec<(PageId, Arc<dyn PageAgent>)> = self.pages.read().await.clone();

        let outcomes = join_all(pages.iter().map(|(id, page)| async move {
            (*id, page.label(), page.deliver(request).await)
        }))
        .await;

        let mut report = BroadcastReport::default();
        let mut closed = Vec::new();
        for (id, label, outcome) in outcomes {
            match outcome {
                Ok(()) => report.delivered += 1,
                Err(Error::PageClosed(reason)) => {
                    tracing::debug!(page = %label, %reason, "page closed, detaching");
                    report.failed += 1;
                    closed.push(id);
                }
                Err(err) => {
                    tracing::info!(page = %label, %err, "could not deliver to page");
                    report.failed += 1;
                }
            }
        }

        if !closed.is_empty() {
            let mut pages = self.pages.write().await;
            pages.retain(|(id, _)| !closed.contains(id));
            report.detached = closed.len();
        }

        report
    }
}
