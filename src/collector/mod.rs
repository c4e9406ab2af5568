//! The pagination loop.
//!
//! One [`Collector::collect`] call drives a single search run through
//! `Idle -> Requesting -> Parsing -> (Waiting -> Requesting)* -> Terminated`.
//! Timeouts are retried in place; every other failure ends the run. Records
//! gathered before a failure are always returned alongside the error.

mod progress;

pub use progress::{Phase, Progress, ProgressSink, TracingProgress};

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::{PacingConfig, SearchConfig};
use crate::graphql::{FeatureFlagState, GraphqlRequest, OperationCatalog, RequestBuilder};
use crate::search::{self, SEARCH_OPERATION};
use crate::timeline::{Cursor, Record, TimelineParser};
use crate::transport::GraphqlTransport;
use crate::Error;

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// `limit` records collected.
    LimitReached,
    /// The page carried no cursor.
    EndOfTimeline,
    /// The page returned the cursor it was requested with.
    CursorStalled,
    /// A fatal error ended the run; see [`CollectionOutcome::error`].
    Failed,
    /// Cancelled between pages.
    Cancelled,
}

/// Result of one collection run. Always carries whatever was collected.
#[derive(Debug)]
pub struct CollectionOutcome {
    pub records: Vec<Record>,
    /// Responses received.
    pub pages: usize,
    pub stop: StopReason,
    /// Set when the run ended on an error; records are still valid.
    pub error: Option<Error>,
    /// Timed-out attempts that were retried.
    pub retries: u32,
    pub duration_ms: u64,
}

impl CollectionOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Mutable state of one run.
#[derive(Debug, Clone)]
pub struct CollectionState {
    accumulated: Vec<Record>,
    cursor: Option<Cursor>,
    limit: usize,
}

impl CollectionState {
    pub fn new(limit: usize) -> Self {
        Self {
            accumulated: Vec::new(),
            cursor: None,
            limit,
        }
    }

    /// Append records without exceeding the limit. Returns how many were kept.
    pub fn append(&mut self, records: Vec<Record>) -> usize {
        let room = self.limit.saturating_sub(self.accumulated.len());
        let kept = records.len().min(room);
        self.accumulated.extend(records.into_iter().take(kept));
        kept
    }

    pub fn is_full(&self) -> bool {
        self.accumulated.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.accumulated.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accumulated.is_empty()
    }

    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    fn into_records(self) -> Vec<Record> {
        self.accumulated
    }
}

/// Cooperative cancellation flag, checked between pages.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Drives search pagination against a discovered catalog.
pub struct Collector<'a> {
    catalog: &'a OperationCatalog,
    flags: &'a FeatureFlagState,
    pacing: PacingConfig,
    base_url: String,
    cancel: CancelToken,
}

/// Bookkeeping shared by one run's helpers.
struct Run<'p> {
    progress: &'p dyn ProgressSink,
    state: CollectionState,
    pages: usize,
    retries: u32,
    start: Instant,
}

impl Run<'_> {
    fn emit(&self, phase: Phase, message: impl Into<String>) {
        self.progress.report(&Progress {
            phase,
            current: self.state.len(),
            total: self.state.limit(),
            message: message.into(),
        });
    }

    fn finish(self, stop: StopReason, error: Option<Error>) -> CollectionOutcome {
        match &error {
            Some(e) => {
                warn!("collection stopped after {} records: {}", self.state.len(), e);
                self.emit(
                    Phase::TerminatedError,
                    format!("stopped with {} records: {}", self.state.len(), e),
                );
            }
            None => {
                info!("collection finished: {} records ({:?})", self.state.len(), stop);
                self.emit(
                    Phase::TerminatedSuccess,
                    format!("finished: {} records ({})", self.state.len(), describe(stop)),
                );
            }
        }
        CollectionOutcome {
            pages: self.pages,
            stop,
            error,
            retries: self.retries,
            duration_ms: self.start.elapsed().as_millis() as u64,
            records: self.state.into_records(),
        }
    }
}

fn describe(stop: StopReason) -> &'static str {
    match stop {
        StopReason::LimitReached => "limit reached",
        StopReason::EndOfTimeline => "end of timeline",
        StopReason::CursorStalled => "cursor did not advance",
        StopReason::Failed => "failed",
        StopReason::Cancelled => "cancelled",
    }
}

impl<'a> Collector<'a> {
    pub fn new(
        catalog: &'a OperationCatalog,
        flags: &'a FeatureFlagState,
        pacing: PacingConfig,
    ) -> Self {
        Self {
            catalog,
            flags,
            pacing,
            base_url: "https://x.com".into(),
            cancel: CancelToken::new(),
        }
    }

    /// Origin used for permalinks.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Use an externally held cancellation token.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Collect up to `search.limit` records.
    ///
    /// Never fails outright: fatal errors are returned in
    /// [`CollectionOutcome::error`] next to the records gathered so far.
    pub async fn collect<T>(
        &self,
        transport: &T,
        search: &SearchConfig,
        progress: &dyn ProgressSink,
    ) -> CollectionOutcome
    where
        T: GraphqlTransport + ?Sized,
    {
        let builder = RequestBuilder::new(self.catalog, self.flags);
        let parser = TimelineParser::new(search.tag.trim()).with_base_url(self.base_url.clone());
        let no_toggles = BTreeMap::new();

        let mut run = Run {
            progress,
            state: CollectionState::new(search.limit),
            pages: 0,
            retries: 0,
            start: Instant::now(),
        };
        run.emit(Phase::Idle, format!("query: {}", search::raw_query(search)));

        loop {
            if self.cancel.is_cancelled() {
                return run.finish(StopReason::Cancelled, None);
            }

            let variables = search::variables(search, run.state.cursor());
            let request = match builder.build(SEARCH_OPERATION, variables, &no_toggles) {
                Ok(request) => request,
                Err(e) => return run.finish(StopReason::Failed, Some(e)),
            };

            let raw = match self.execute(transport, &request, &mut run).await {
                Ok(Fetched::Page(raw)) => raw,
                Ok(Fetched::Cancelled) => return run.finish(StopReason::Cancelled, None),
                Err(e) => return run.finish(StopReason::Failed, Some(e)),
            };
            run.pages += 1;

            run.emit(Phase::Parsing, format!("parsing page {}", run.pages));
            let page = match parser.extract(&raw) {
                Ok(page) => page,
                Err(e) => return run.finish(StopReason::Failed, Some(e)),
            };
            let found = page.records.len();
            let kept = run.state.append(page.records);
            debug!(
                "page {}: {} records ({} kept, {} skipped), cursor: {}",
                run.pages,
                found,
                kept,
                page.skipped,
                page.cursor.as_deref().map(abbreviate).unwrap_or("none")
            );

            if run.state.is_full() {
                return run.finish(StopReason::LimitReached, None);
            }
            match page.cursor {
                None => return run.finish(StopReason::EndOfTimeline, None),
                Some(ref next) if run.state.cursor() == Some(next.as_str()) => {
                    return run.finish(StopReason::CursorStalled, None);
                }
                Some(next) => run.state.cursor = Some(next),
            }

            if self.cancel.is_cancelled() {
                return run.finish(StopReason::Cancelled, None);
            }
            run.emit(
                Phase::WaitingBackoff,
                format!("collected {} so far, next page shortly", run.state.len()),
            );
            tokio::time::sleep(self.pacing.page_delay()).await;
        }
    }

    /// Execute one page request, retrying timeouts up to `max_attempts`.
    ///
    /// Cancellation is honoured before every retry wait and every further attempt.
    async fn execute<T>(
        &self,
        transport: &T,
        request: &GraphqlRequest,
        run: &mut Run<'_>,
    ) -> crate::Result<Fetched>
    where
        T: GraphqlTransport + ?Sized,
    {
        let max_attempts = self.pacing.max_attempts.max(1);
        for attempt in 1..=max_attempts {
            if attempt > 1 && self.cancel.is_cancelled() {
                return Ok(Fetched::Cancelled);
            }
            run.emit(
                Phase::Requesting,
                format!(
                    "requesting page {} (attempt {}/{})",
                    run.pages + 1,
                    attempt,
                    max_attempts
                ),
            );
            match tokio::time::timeout(self.pacing.request_timeout(), transport.execute(request))
                .await
            {
                Ok(result) => return result.map(Fetched::Page),
                Err(_) => {
                    warn!(
                        "{} timed out (attempt {}/{})",
                        request.operation, attempt, max_attempts
                    );
                    if attempt < max_attempts {
                        run.retries += 1;
                        run.emit(
                            Phase::WaitingBackoff,
                            format!("request timed out, retrying ({}/{})", attempt, max_attempts),
                        );
                        if self.cancel.is_cancelled() {
                            return Ok(Fetched::Cancelled);
                        }
                        tokio::time::sleep(self.pacing.retry_delay()).await;
                    }
                }
            }
        }
        Err(Error::TransportTimeout {
            attempts: max_attempts,
        })
    }
}

/// Result of one page request that did not fail.
enum Fetched {
    Page(serde_json::Value),
    Cancelled,
}

fn abbreviate(cursor: &str) -> &str {
    match cursor.char_indices().nth(20) {
        Some((idx, _)) => &cursor[..idx],
        None => cursor,
    }
}
