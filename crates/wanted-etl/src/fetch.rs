//! Paginated fetcher: drains numbered pages under a page, session and
//! attempt budget.
//!
//! Pages are requested strictly in order. A failed request ends the current
//! attempt; the next attempt opens a fresh session and resumes at the page
//! that failed, so collected pages are never fetched twice and none are
//! skipped. Running out of attempts yields a partial outcome, not an error.

use serde_json::Value;
use tracing::{error, info, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::http::{FetchError, Session, SessionFactory, SessionSource};
use crate::progress::{self, FetchEventKind, ProgressSender};
use crate::types::Page;

pub const DEFAULT_MAX_PAGES: u32 = 20;
pub const DEFAULT_PAGES_PER_SESSION: u32 = 5;
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Loop bounds for a fetch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchBudget {
    max_pages: u32,
    max_pages_per_session: u32,
    max_attempts: u32,
}

impl FetchBudget {
    /// `max_pages` may be zero (nothing to fetch); the other two must not.
    pub fn new(
        max_pages: u32,
        max_pages_per_session: u32,
        max_attempts: u32,
    ) -> PipelineResult<Self> {
        if max_pages_per_session == 0 {
            return Err(PipelineError::Config(
                "max_pages_per_session must be at least 1".into(),
            ));
        }
        if max_attempts == 0 {
            return Err(PipelineError::Config(
                "max_attempts must be at least 1".into(),
            ));
        }
        Ok(Self {
            max_pages,
            max_pages_per_session,
            max_attempts,
        })
    }

    pub fn max_pages(&self) -> u32 {
        self.max_pages
    }

    pub fn max_pages_per_session(&self) -> u32 {
        self.max_pages_per_session
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for FetchBudget {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            max_pages_per_session: DEFAULT_PAGES_PER_SESSION,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

/// Result of a fetch run.
#[derive(Debug)]
pub struct FetchOutcome {
    /// Pages in ascending page order, without gaps.
    pub pages: Vec<Page>,
    /// True when every page up to `max_pages` was collected.
    pub complete: bool,
    pub attempts_used: u32,
    pub sessions_opened: u32,
    /// The error that ended each failed attempt, in order.
    pub failures: Vec<FetchError>,
}

/// Drains a paginated resource.
pub struct PageFetcher<S = SessionFactory> {
    url: String,
    factory: S,
    budget: FetchBudget,
    progress: Option<ProgressSender>,
    run_id: String,
}

impl<S: SessionSource> PageFetcher<S> {
    pub fn new(url: impl Into<String>, factory: S, budget: FetchBudget) -> Self {
        Self {
            url: url.into(),
            factory,
            budget,
            progress: None,
            run_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Publish progress events on `tx`.
    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn budget(&self) -> FetchBudget {
        self.budget
    }

    /// Fetch pages `1..=max_pages`.
    ///
    /// Request failures and sessions that could not be opened are recorded
    /// in [`FetchOutcome::failures`]; the pages collected so far are kept.
    pub async fn fetch_all(&self) -> PipelineResult<FetchOutcome> {
        let max_pages = self.budget.max_pages;
        let mut pages: Vec<Page> = Vec::new();
        let mut failures = Vec::new();
        let mut page_num: u32 = 1;
        let mut attempts_used = 0u32;
        let mut sessions_opened = 0u32;
        let mut seq = 0u64;

        while page_num <= max_pages && attempts_used < self.budget.max_attempts {
            attempts_used += 1;
            let attempt = attempts_used;
            info!(attempt, next_page = page_num, "starting fetch attempt");
            self.emit(
                &mut seq,
                FetchEventKind::AttemptStarted {
                    attempt,
                    next_page: page_num,
                },
            );

            let mut session = match self.open_session(&mut sessions_opened, &mut seq) {
                Ok(session) => session,
                Err(err) => {
                    let err = FetchError::Client {
                        page: page_num,
                        message: err.to_string(),
                    };
                    self.record_failure(attempt, err, &mut failures, &mut seq);
                    continue;
                }
            };
            let mut served = 0u32;

            while page_num <= max_pages {
                match session.get_json(&self.url, page_num).await {
                    Ok(payload) => {
                        let items = item_count(&payload);
                        info!(page = page_num, items, session = sessions_opened, "page fetched");
                        self.emit(
                            &mut seq,
                            FetchEventKind::PageFetched {
                                page: page_num,
                                items,
                                session: sessions_opened,
                            },
                        );
                        pages.push(Page::new(page_num, payload));
                        page_num += 1;
                        served += 1;

                        if served >= self.budget.max_pages_per_session && page_num <= max_pages {
                            let from = sessions_opened;
                            drop(session);
                            info!(session = from, "session page budget spent, closed");
                            session = match self.open_session(&mut sessions_opened, &mut seq) {
                                Ok(next) => next,
                                Err(err) => {
                                    let err = FetchError::Client {
                                        page: page_num,
                                        message: err.to_string(),
                                    };
                                    self.record_failure(attempt, err, &mut failures, &mut seq);
                                    break;
                                }
                            };
                            served = 0;
                            self.emit(
                                &mut seq,
                                FetchEventKind::SessionRotated {
                                    from,
                                    to: sessions_opened,
                                },
                            );
                        }
                    }
                    Err(err) => {
                        self.record_failure(attempt, err, &mut failures, &mut seq);
                        break;
                    }
                }
            }
            // Any live session closes here, at the end of the attempt.
        }

        let complete = page_num > max_pages;
        if !complete {
            warn!(
                collected = pages.len(),
                max_pages,
                attempts = attempts_used,
                "attempt budget exhausted, returning partial result"
            );
        }
        self.emit(
            &mut seq,
            FetchEventKind::FetchFinished {
                pages: pages.len(),
                complete,
                attempts: attempts_used,
            },
        );

        Ok(FetchOutcome {
            pages,
            complete,
            attempts_used,
            sessions_opened,
            failures,
        })
    }

    fn open_session(&self, opened: &mut u32, seq: &mut u64) -> PipelineResult<Session> {
        let session = self.factory.open()?;
        *opened += 1;
        tracing::debug!(session = *opened, "session opened");
        self.emit(seq, FetchEventKind::SessionOpened { session: *opened });
        Ok(session)
    }

    fn record_failure(
        &self,
        attempt: u32,
        err: FetchError,
        failures: &mut Vec<FetchError>,
        seq: &mut u64,
    ) {
        let page = err.page();
        error!(attempt, page, error = %err, "fetch attempt aborted");
        self.emit(
            seq,
            FetchEventKind::PageFailed {
                page,
                attempt,
                message: err.to_string(),
            },
        );
        failures.push(err);
    }

    fn emit(&self, seq: &mut u64, event: FetchEventKind) {
        progress::emit(&self.progress, &self.run_id, seq, event);
    }
}

fn item_count(payload: &Value) -> usize {
    payload
        .get("items")
        .and_then(Value::as_array)
        .map_or(0, Vec::len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::RetryPolicy;
    use serde_json::json;
    use std::collections::HashMap;
    use std::time::Duration;

    #[test]
    fn test_budget_rejects_zero_session_budget() {
        assert!(matches!(
            FetchBudget::new(3, 0, 1),
            Err(PipelineError::Config(_))
        ));
    }

    #[test]
    fn test_budget_rejects_zero_attempts() {
        assert!(FetchBudget::new(3, 1, 0).is_err());
    }

    #[test]
    fn test_budget_allows_zero_pages() {
        let budget = FetchBudget::new(0, 1, 1).unwrap();
        assert_eq!(budget.max_pages(), 0);
    }

    #[test]
    fn test_item_count() {
        assert_eq!(item_count(&json!({"items": [1, 2, 3]})), 3);
        assert_eq!(item_count(&json!({"items": "x"})), 0);
        assert_eq!(item_count(&json!({})), 0);
    }

    #[tokio::test]
    async fn test_zero_pages_is_complete_without_requests() {
        let factory = SessionFactory::new(
            &HashMap::new(),
            RetryPolicy::immediate(0),
            Duration::from_secs(1),
        )
        .unwrap();
        // Unroutable: any request would fail.
        let fetcher = PageFetcher::new(
            "http://127.0.0.1:9/never",
            factory,
            FetchBudget::new(0, 1, 1).unwrap(),
        );
        let outcome = fetcher.fetch_all().await.unwrap();
        assert!(outcome.complete);
        assert!(outcome.pages.is_empty());
        assert_eq!(outcome.attempts_used, 0);
        assert_eq!(outcome.sessions_opened, 0);
    }
}
