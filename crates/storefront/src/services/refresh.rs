//! Scrape refresh orchestration.
//!
//! A refresh fans out one task per `(retailer, term)` pair onto a
//! [`JoinSet`] and waits for every task to finish. Each task walks the
//! [`TaskState`] machine:
//!
//! ```text
//! Pending -> Running -> Succeeded
//!            Running -> Failed(retryable, attempts left) -> Pending   (after backoff)
//!            Running -> Failed(otherwise)                -> Aborted
//! ```
//!
//! Tasks share nothing but the catalog store. A failing task never cancels or
//! delays its siblings, and the join always completes. The whole refresh runs
//! under one deadline: tasks still going when it passes are dropped (which
//! releases their page sessions) and reported as aborted. Dropping the refresh
//! future itself aborts every task in the set.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{Instrument, Span};

use tea_lovers_core::Store;

use crate::config::ScraperConfig;
use crate::db::{CatalogStore, UpsertOutcome};
use crate::models::{NewProduct, ScrapeResult};
use crate::scraping::{
    PageFetcher, RetailerConfig, RetailerScraper, ScrapeError, SelectorError, normalize_price,
    retailers,
};

// =============================================================================
// Task state machine
// =============================================================================

/// Lifecycle of one `(retailer, term)` task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed { retryable: bool },
    Aborted,
}

impl TaskState {
    /// Whether the task has finished for good.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Aborted)
    }

    /// Whether `self -> next` is a legal step.
    ///
    /// Any unfinished task may be aborted, which is how deadline cancellation
    /// lands.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Succeeded | Self::Failed { .. })
                | (Self::Failed { retryable: true }, Self::Pending)
                | (
                    Self::Pending | Self::Running | Self::Failed { .. },
                    Self::Aborted
                )
        )
    }
}

/// Attempted an illegal state change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid task transition {from:?} -> {to:?}")]
pub struct InvalidTransition {
    pub from: TaskState,
    pub to: TaskState,
}

/// One unit of scrape work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrapeTask {
    pub retailer: Store,
    pub term: String,
    pub attempts: u32,
    pub state: TaskState,
}

impl ScrapeTask {
    /// A task that has not started.
    #[must_use]
    pub const fn new(retailer: Store, term: String) -> Self {
        Self {
            retailer,
            term,
            attempts: 0,
            state: TaskState::Pending,
        }
    }

    /// Move to `next`, counting an attempt on every entry to `Running`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidTransition` and leaves the task unchanged if the step is illegal.
    pub fn advance(&mut self, next: TaskState) -> Result<(), InvalidTransition> {
        if !self.state.can_transition_to(next) {
            return Err(InvalidTransition {
                from: self.state,
                to: next,
            });
        }
        if next == TaskState::Running {
            self.attempts += 1;
        }
        self.state = next;
        Ok(())
    }
}

/// How often and how patiently a task retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// Fixed wait before the next attempt.
    pub backoff: Duration,
}

impl RetryPolicy {
    #[must_use]
    pub const fn from_config(config: &ScraperConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            backoff: config.retry_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ScraperConfig::default())
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Why a task ended `Aborted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// Every attempt failed with a transient error.
    RetriesExhausted,
    /// The page loaded but did not have the expected shape.
    Extraction,
    /// The page could not be loaded and retrying would not help.
    NonRetryable,
    /// The refresh deadline passed first.
    DeadlineExceeded,
    /// The task panicked.
    Panicked,
}

/// What one task did.
#[derive(Debug, Clone, Serialize)]
pub struct TaskOutcome {
    pub retailer: Store,
    pub term: String,
    pub attempts: u32,
    pub state: TaskState,
    pub abort_reason: Option<AbortReason>,
    /// Last error seen, if any.
    pub error: Option<String>,
    /// Normalized products from the successful attempt.
    pub products: Vec<NewProduct>,
    /// Products inserted into the catalog.
    pub created: usize,
    /// Products whose key was already present.
    pub existing: usize,
    /// Products the catalog failed to store.
    pub failed_writes: usize,
}

impl TaskOutcome {
    fn new(task: ScrapeTask) -> Self {
        Self {
            retailer: task.retailer,
            term: task.term,
            attempts: task.attempts,
            state: task.state,
            abort_reason: None,
            error: None,
            products: Vec::new(),
            created: 0,
            existing: 0,
            failed_writes: 0,
        }
    }

    fn panicked(retailer: Store, term: String) -> Self {
        let mut outcome = Self::new(ScrapeTask::new(retailer, term));
        outcome.state = TaskState::Aborted;
        outcome.abort_reason = Some(AbortReason::Panicked);
        outcome
    }

    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.state == TaskState::Succeeded
    }
}

/// Result of one refresh: every task's outcome, in term-then-retailer order.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub terms: Vec<String>,
    pub outcomes: Vec<TaskOutcome>,
    #[serde(serialize_with = "serialize_millis")]
    pub elapsed: Duration,
}

impl RefreshReport {
    /// Tasks that ended `Succeeded`.
    #[must_use]
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.succeeded()).count()
    }

    /// Tasks that ended `Aborted`.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    /// Products newly inserted across all tasks.
    #[must_use]
    pub fn created(&self) -> usize {
        self.outcomes.iter().map(|o| o.created).sum()
    }

    /// The term the caller should be shown first.
    #[must_use]
    pub fn first_term(&self) -> Option<&str> {
        self.terms.first().map(String::as_str)
    }

    /// The outcome for one task, if it ran.
    #[must_use]
    pub fn outcome(&self, retailer: Store, term: &str) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.retailer == retailer && o.term == term)
    }
}

fn serialize_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Split comma-separated search input into distinct trimmed terms, in order.
#[must_use]
pub fn parse_terms(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.to_lowercase()))
        .map(str::to_owned)
        .collect()
}

// =============================================================================
// Orchestrator
// =============================================================================

/// Runs refreshes for a fixed set of retailers against one catalog store.
pub struct RefreshOrchestrator<F, S> {
    scrapers: Vec<Arc<RetailerScraper<F>>>,
    catalog: Arc<S>,
    policy: RetryPolicy,
    deadline: Duration,
}

impl<F: PageFetcher, S: CatalogStore> RefreshOrchestrator<F, S> {
    /// Build scrapers for `retailers`, all sharing `fetcher`.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError` if any retailer's locators fail to compile.
    pub fn new(
        retailers: Vec<RetailerConfig>,
        fetcher: Arc<F>,
        catalog: Arc<S>,
        policy: RetryPolicy,
        deadline: Duration,
    ) -> Result<Self, SelectorError> {
        let scrapers = retailers
            .into_iter()
            .map(|config| RetailerScraper::new(config, Arc::clone(&fetcher)).map(Arc::new))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            scrapers,
            catalog,
            policy,
            deadline,
        })
    }

    /// Build from scraper settings: enabled retailers, overrides, retry and deadline.
    ///
    /// # Errors
    ///
    /// Returns `SelectorError` if any retailer's locators fail to compile.
    pub fn from_config(
        config: &ScraperConfig,
        fetcher: Arc<F>,
        catalog: Arc<S>,
    ) -> Result<Self, SelectorError> {
        Self::new(
            retailers::configured(config),
            fetcher,
            catalog,
            RetryPolicy::from_config(config),
            config.refresh_deadline,
        )
    }

    /// Retailers this orchestrator scrapes, in order.
    #[must_use]
    pub fn retailers(&self) -> Vec<Store> {
        self.scrapers.iter().map(|s| s.store()).collect()
    }

    /// Scrape every retailer for every term and wait for all tasks to finish.
    ///
    /// Never fails: per-task problems are reported in the outcomes.
    pub async fn refresh(&self, terms: &[String]) -> RefreshReport {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.deadline;
        let mut set = JoinSet::new();
        let mut pending = HashMap::new();

        tracing::info!(
            terms = terms.len(),
            retailers = self.scrapers.len(),
            "Starting catalog refresh"
        );

        for term in terms {
            for scraper in &self.scrapers {
                let store = scraper.store();
                let span = tracing::info_span!(
                    "scrape_task",
                    retailer = %store,
                    term = %term,
                    attempt = tracing::field::Empty,
                );
                let scraper = Arc::clone(scraper);
                let catalog = Arc::clone(&self.catalog);
                let policy = self.policy;
                let mut task = ScrapeTask::new(store, term.clone());

                let handle = set.spawn(
                    async move {
                        let mut progress = Progress::default();
                        let finished = tokio::time::timeout_at(
                            deadline,
                            run_task(&scraper, catalog.as_ref(), policy, &mut task, &mut progress),
                        )
                        .await;

                        if finished.is_err() {
                            tracing::warn!(
                                attempt = task.attempts,
                                "Refresh deadline passed, cancelling task"
                            );
                            progress.abort(&mut task, AbortReason::DeadlineExceeded);
                        }
                        progress.finish(task)
                    }
                    .instrument(span),
                );
                pending.insert(handle.id(), (store, term.clone()));
            }
        }

        let mut outcomes = Vec::with_capacity(set.len());
        while let Some(joined) = set.join_next_with_id().await {
            match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    outcomes.push(outcome);
                }
                Err(err) => {
                    if let Some((retailer, term)) = pending.remove(&err.id()) {
                        tracing::error!(
                            retailer = %retailer,
                            term = %term,
                            error = %err,
                            "Scrape task did not complete"
                        );
                        outcomes.push(TaskOutcome::panicked(retailer, term));
                    }
                }
            }
        }

        let order = |o: &TaskOutcome| {
            (
                terms.iter().position(|t| *t == o.term),
                self.scrapers.iter().position(|s| s.store() == o.retailer),
            )
        };
        outcomes.sort_by_key(order);

        let report = RefreshReport {
            terms: terms.to_vec(),
            outcomes,
            elapsed: started.elapsed(),
        };

        tracing::info!(
            succeeded = report.succeeded(),
            aborted = report.aborted(),
            created = report.created(),
            elapsed_ms = u64::try_from(report.elapsed.as_millis()).unwrap_or(u64::MAX),
            "Catalog refresh finished"
        );

        report
    }
}

/// Results gathered while a task runs; survives deadline cancellation.
#[derive(Debug, Default)]
struct Progress {
    abort_reason: Option<AbortReason>,
    error: Option<String>,
    products: Vec<NewProduct>,
    created: usize,
    existing: usize,
    failed_writes: usize,
}

impl Progress {
    fn abort(&mut self, task: &mut ScrapeTask, reason: AbortReason) {
        step(task, TaskState::Aborted);
        self.abort_reason = Some(reason);
    }

    fn finish(self, task: ScrapeTask) -> TaskOutcome {
        TaskOutcome {
            abort_reason: self.abort_reason,
            error: self.error,
            products: self.products,
            created: self.created,
            existing: self.existing,
            failed_writes: self.failed_writes,
            ..TaskOutcome::new(task)
        }
    }
}

fn step(task: &mut ScrapeTask, next: TaskState) {
    if let Err(err) = task.advance(next) {
        tracing::error!(error = %err, "Ignoring invalid task transition");
    }
}

/// Drive one task to a terminal state.
async fn run_task<F: PageFetcher, S: CatalogStore>(
    scraper: &RetailerScraper<F>,
    catalog: &S,
    policy: RetryPolicy,
    task: &mut ScrapeTask,
    progress: &mut Progress,
) {
    loop {
        step(task, TaskState::Running);
        Span::current().record("attempt", task.attempts);

        let err = match scraper.try_scrape(&task.term).await {
            Ok(results) => {
                progress.products = results.into_iter().map(normalize).collect();
                tracing::info!(products = progress.products.len(), "Scrape attempt succeeded");
                store_products(catalog, progress).await;
                step(task, TaskState::Succeeded);
                return;
            }
            Err(err) => err,
        };

        let retryable = err.is_retryable();
        progress.error = Some(err.to_string());
        step(task, TaskState::Failed { retryable });

        if retryable && task.attempts < policy.max_attempts {
            tracing::warn!(error = %err, backoff = ?policy.backoff, "Transient scrape failure, retrying");
            tokio::time::sleep(policy.backoff).await;
            step(task, TaskState::Pending);
            continue;
        }

        let reason = match err {
            ScrapeError::Extraction(_) => AbortReason::Extraction,
            ScrapeError::Fetch(_) if retryable => AbortReason::RetriesExhausted,
            ScrapeError::Fetch(_) => AbortReason::NonRetryable,
        };
        tracing::error!(error = %err, reason = ?reason, "Scrape task aborted");
        progress.abort(task, reason);
        return;
    }
}

fn normalize(result: ScrapeResult) -> NewProduct {
    NewProduct {
        store: result.store,
        price: normalize_price(&result.raw_price_text),
        name: result.raw_name,
    }
}

/// Upsert every product, counting outcomes. One failed write does not stop the rest.
async fn store_products<S: CatalogStore>(catalog: &S, progress: &mut Progress) {
    for product in &progress.products {
        match catalog.upsert_product(product).await {
            Ok(UpsertOutcome::Created(_)) => progress.created += 1,
            Ok(UpsertOutcome::Existing(_)) => progress.existing += 1,
            Err(err) => {
                progress.failed_writes += 1;
                tracing::error!(name = %product.name, error = %err, "Catalog upsert failed");
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_happy_path_transitions() {
        let mut task = ScrapeTask::new(Store::Tesco, "tea".to_string());
        task.advance(TaskState::Running).unwrap();
        task.advance(TaskState::Succeeded).unwrap();
        assert_eq!(task.attempts, 1);
        assert!(task.state.is_terminal());
    }

    #[test]
    fn test_retry_cycle_counts_attempts() {
        let mut task = ScrapeTask::new(Store::Asda, "milk".to_string());
        for _ in 0..2 {
            task.advance(TaskState::Running).unwrap();
            task.advance(TaskState::Failed { retryable: true }).unwrap();
            task.advance(TaskState::Pending).unwrap();
        }
        task.advance(TaskState::Running).unwrap();
        task.advance(TaskState::Succeeded).unwrap();
        assert_eq!(task.attempts, 3);
    }

    #[test]
    fn test_invalid_transitions_are_rejected() {
        let mut task = ScrapeTask::new(Store::Asda, "milk".to_string());
        let err = task.advance(TaskState::Succeeded).unwrap_err();
        assert_eq!(err.from, TaskState::Pending);
        assert_eq!(task.state, TaskState::Pending);

        task.advance(TaskState::Running).unwrap();
        task.advance(TaskState::Failed { retryable: false }).unwrap();
        assert!(task.advance(TaskState::Pending).is_err());
        task.advance(TaskState::Aborted).unwrap();
        assert!(task.advance(TaskState::Running).is_err());
    }

    #[test]
    fn test_terminal_states() {
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Aborted.is_terminal());
        assert!(!TaskState::Failed { retryable: true }.is_terminal());
        assert!(!TaskState::Pending.is_terminal());
    }

    #[test]
    fn test_parse_terms_trims_and_dedupes() {
        assert_eq!(
            parse_terms(" tea, milk ,,Tea, biscuits "),
            vec!["tea".to_string(), "milk".to_string(), "biscuits".to_string()]
        );
        assert!(parse_terms(" , ").is_empty());
    }

    #[test]
    fn test_normalize_funnels_price_text() {
        let product = normalize(ScrapeResult {
            store: Store::Morrisons,
            raw_name: "Yorkshire Tea".to_string(),
            raw_price_text: "36p".to_string(),
        });
        assert_eq!(product.price, tea_lovers_core::Price::from_pence(36));
    }
}
