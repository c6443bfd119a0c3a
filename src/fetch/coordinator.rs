//! Resumable batch fetching with bounded retry passes.
//!
//! Every URL of a batch starts pending. Pass 1 walks the batch in order;
//! a fetched page is handed downstream immediately, a transient failure
//! parks the URL for the next pass, and a permanent failure skips it for
//! good. Passes 2..=`max_passes` walk only the parked URLs, separated by an
//! exponential backoff. Whatever is still parked afterwards is reported as
//! skipped, never dropped.

use super::{DocumentSource, FetchedPage};
use crate::error::{FetchError, FetchErrorKind};
use crate::models::{Article, SearchResult, Theme};
use crate::sites::SiteIdentityResolver;
use itertools::Itertools;
use rand::{Rng, rng};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep, timeout};
use tracing::{error, info, instrument, warn};

/// How many passes a batch gets and how long to wait between them.
///
/// The wait before pass `n` (for `n >= 2`) is
/// ```text
/// min(base_delay * 2^(n-2), max_delay) + random(0..=jitter)
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total passes, the initial walk included.
    pub max_passes: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_passes: 3,
            base_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            jitter: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// A policy with no waiting between passes.
    pub fn immediate(max_passes: usize) -> Self {
        RetryPolicy {
            max_passes,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: Duration::ZERO,
        }
    }

    /// Backoff before `pass`, without jitter.
    pub fn backoff(&self, pass: usize) -> Duration {
        if pass < 2 {
            return Duration::ZERO;
        }
        let exponent = u32::try_from(pass - 2).unwrap_or(u32::MAX).min(31);
        self.base_delay
            .saturating_mul(1 << exponent)
            .min(self.max_delay)
    }

    /// Backoff before `pass`, with jitter.
    pub fn delay_before(&self, pass: usize) -> Duration {
        let jitter_ms = u64::try_from(self.jitter.as_millis()).unwrap_or(u64::MAX);
        let jitter_ms: u64 = rng().random_range(0..=jitter_ms);
        self.backoff(pass) + Duration::from_millis(jitter_ms)
    }
}

/// Where a batch gets its URLs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchTarget {
    Urls(Vec<String>),
    /// Expand the job keyword through [`DocumentSource::search`].
    Search,
}

/// One batch: a theme/keyword pair and the URLs to fetch for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchJob {
    pub theme: Theme,
    pub keyword: String,
    pub target: BatchTarget,
}

impl BatchJob {
    pub fn urls<I, S>(theme: Theme, keyword: impl Into<String>, urls: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        BatchJob {
            theme,
            keyword: keyword.into(),
            target: BatchTarget::Urls(urls.into_iter().map(Into::into).collect()),
        }
    }

    pub fn search(theme: Theme, keyword: impl Into<String>) -> Self {
        BatchJob {
            theme,
            keyword: keyword.into(),
            target: BatchTarget::Search,
        }
    }
}

/// Result of a single fetch attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Fetched { canonical_url: String },
    Failed { kind: FetchErrorKind, error: String },
}

/// One call into the document source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FetchAttempt {
    pub url: String,
    pub pass: usize,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

impl FetchAttempt {
    pub fn succeeded(&self) -> bool {
        matches!(self.outcome, AttemptOutcome::Fetched { .. })
    }
}

/// Why a URL never produced an article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum SkipReason {
    /// Failed transiently on every pass.
    RetriesExhausted { passes: usize, last_error: String },
    /// Failed in a way retrying cannot fix.
    Permanent { error: String },
    /// The caller's deadline passed first.
    DeadlineExceeded,
    /// Fetched, but the article consumer was gone before it could take it.
    Undelivered,
    /// The article consumer went away before this URL was fetched.
    Cancelled,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedUrl {
    pub url: String,
    #[serde(flatten)]
    pub reason: SkipReason,
}

/// What happened to a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    /// URLs fetched and handed downstream.
    pub processed: usize,
    /// Passes actually started.
    pub passes: usize,
    pub attempts: Vec<FetchAttempt>,
    pub skipped: Vec<SkippedUrl>,
}

impl BatchReport {
    /// Attempts made for `url`, in order.
    pub fn attempts_for<'r>(&'r self, url: &'r str) -> impl Iterator<Item = &'r FetchAttempt> {
        self.attempts.iter().filter(move |a| a.url == url)
    }

    pub fn skipped_urls(&self) -> Vec<&str> {
        self.skipped.iter().map(|s| s.url.as_str()).collect()
    }

    /// Whether every URL of the batch was processed.
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }

    fn skip(&mut self, urls: impl IntoIterator<Item = String>, reason: SkipReason) {
        self.skipped.extend(urls.into_iter().map(|url| SkippedUrl {
            url,
            reason: reason.clone(),
        }));
    }
}

/// Drives a [`DocumentSource`] over a batch, one URL at a time.
#[derive(Debug)]
pub struct BatchCoordinator<'a, S> {
    source: &'a S,
    sites: &'a SiteIdentityResolver,
    policy: RetryPolicy,
    fetch_timeout: Duration,
}

enum PassEnd {
    /// Every URL of the pass was attempted.
    Walked,
    /// The deadline passed; the rest are skipped.
    Deadline,
    /// The receiver is gone; the rest are skipped.
    Cancelled,
}

impl<'a, S: DocumentSource> BatchCoordinator<'a, S> {
    pub fn new(source: &'a S, sites: &'a SiteIdentityResolver, policy: RetryPolicy) -> Self {
        BatchCoordinator {
            source,
            sites,
            policy,
            fetch_timeout: Duration::from_secs(120),
        }
    }

    /// Upper bound for a single fetch, on top of whatever the source enforces.
    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Fetch every URL of `job`, sending each article to `tx` as soon as it
    /// is loaded.
    ///
    /// Only a failed search expansion is an error; every per-URL failure
    /// ends up in the returned report instead.
    #[instrument(level = "info", skip_all, fields(theme = %job.theme, keyword = %job.keyword))]
    pub async fn run(
        &self,
        job: &BatchJob,
        deadline: Option<Instant>,
        tx: mpsc::Sender<SearchResult>,
    ) -> Result<BatchReport, FetchError> {
        let urls = match &job.target {
            BatchTarget::Urls(urls) => urls.clone(),
            BatchTarget::Search => self.source.search(&job.keyword).await?,
        };
        let mut pending: Vec<String> = urls
            .into_iter()
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .unique()
            .collect();
        info!(urls = pending.len(), max_passes = self.policy.max_passes, "Starting batch");

        let mut report = BatchReport::default();
        let mut last_errors: HashMap<String, FetchError> = HashMap::new();

        for pass in 1..=self.policy.max_passes {
            if pending.is_empty() {
                break;
            }
            if pass > 1 {
                let delay = self.policy.delay_before(pass);
                if deadline.is_some_and(|d| Instant::now() + delay >= d) {
                    warn!(pass, remaining = pending.len(), "Deadline reached before retry pass");
                    report.skip(pending, SkipReason::DeadlineExceeded);
                    return Ok(report);
                }
                warn!(pass, remaining = pending.len(), ?delay, "Retrying failed URLs");
                sleep(delay).await;
            }

            report.passes = pass;
            let (failed, end) = self
                .walk(job, pass, pending, deadline, &tx, &mut report, &mut last_errors)
                .await;
            match end {
                PassEnd::Walked => pending = failed,
                PassEnd::Deadline | PassEnd::Cancelled => return Ok(report),
            }
        }

        for url in pending {
            let last_error = last_errors
                .remove(&url)
                .map(|e| e.to_string())
                .unwrap_or_default();
            error!(%url, passes = report.passes, error = %last_error, "Giving up on URL");
            report.skipped.push(SkippedUrl {
                url,
                reason: SkipReason::RetriesExhausted {
                    passes: report.passes,
                    last_error,
                },
            });
        }

        info!(
            processed = report.processed,
            skipped = report.skipped.len(),
            passes = report.passes,
            "Finished batch"
        );
        Ok(report)
    }

    /// One pass over `urls`. Returns the URLs that failed transiently.
    #[allow(clippy::too_many_arguments)]
    async fn walk(
        &self,
        job: &BatchJob,
        pass: usize,
        urls: Vec<String>,
        deadline: Option<Instant>,
        tx: &mpsc::Sender<SearchResult>,
        report: &mut BatchReport,
        last_errors: &mut HashMap<String, FetchError>,
    ) -> (Vec<String>, PassEnd) {
        let mut failed = Vec::new();
        let mut queue = urls.into_iter();

        while let Some(url) = queue.next() {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                warn!(pass, %url, "Deadline reached; skipping the rest of the batch");
                report.skip(
                    failed.into_iter().chain([url]).chain(queue),
                    SkipReason::DeadlineExceeded,
                );
                return (Vec::new(), PassEnd::Deadline);
            }

            match self.fetch_one(&url).await {
                Ok(page) => {
                    info!(pass, %url, canonical_url = %page.canonical_url, "Fetched article");
                    report.attempts.push(FetchAttempt {
                        url: url.clone(),
                        pass,
                        outcome: AttemptOutcome::Fetched {
                            canonical_url: page.canonical_url.clone(),
                        },
                    });
                    let result = SearchResult {
                        theme: job.theme,
                        keyword: job.keyword.clone(),
                        article: Article {
                            publisher: self.sites.resolve(&page.canonical_url),
                            url: page.canonical_url,
                            html: page.html,
                        },
                    };
                    if tx.send(result).await.is_err() {
                        warn!(%url, "Article receiver dropped; stopping batch");
                        report.skip([url], SkipReason::Undelivered);
                        report.skip(failed.into_iter().chain(queue), SkipReason::Cancelled);
                        return (Vec::new(), PassEnd::Cancelled);
                    }
                    last_errors.remove(&url);
                    report.processed += 1;
                }
                Err(e) => {
                    report.attempts.push(FetchAttempt {
                        url: url.clone(),
                        pass,
                        outcome: AttemptOutcome::Failed {
                            kind: e.kind(),
                            error: e.to_string(),
                        },
                    });
                    if e.is_transient() {
                        warn!(pass, %url, kind = ?e.kind(), error = %e, "Fetch failed; will retry");
                        if matches!(e, FetchError::SessionInvalid { .. }) {
                            self.source.reset_session().await;
                        }
                        last_errors.insert(url.clone(), e);
                        failed.push(url);
                    } else {
                        error!(pass, %url, kind = ?e.kind(), error = %e, "Fetch failed permanently");
                        report.skipped.push(SkippedUrl {
                            url,
                            reason: SkipReason::Permanent {
                                error: e.to_string(),
                            },
                        });
                    }
                }
            }
        }
        (failed, PassEnd::Walked)
    }

    async fn fetch_one(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if let Err(e) = url::Url::parse(url) {
            return Err(FetchError::InvalidUrl {
                url: url.to_string(),
                reason: e.to_string(),
            });
        }
        match timeout(self.fetch_timeout, self.source.fetch(url)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout {
                url: url.to_string(),
            }),
        }
    }
}
