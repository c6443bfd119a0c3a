//! End-to-end harvesting: fetch a batch and extract a record per article.
//!
//! The coordinator and the extractor run concurrently inside one task,
//! connected by a bounded channel, so every article is parsed as soon as it
//! has been fetched while the next fetch is already under way.

use crate::error::FetchError;
use crate::extract::{Gap, RecordExtractor};
use crate::fetch::{BatchCoordinator, BatchJob, BatchReport, DocumentSource, RetryPolicy};
use crate::models::Record;
use crate::registry::InstructionRegistry;
use crate::selector::SelectorEngine;
use crate::sites::SiteIdentityResolver;
use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, instrument};

const CHANNEL_CAPACITY: usize = 8;

/// Outcome of one harvest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HarvestReport {
    pub batch: BatchReport,
    pub gaps: Vec<Gap>,
}

/// Owns every collaborator a harvest needs.
pub struct Harvester<S, E> {
    source: S,
    engine: E,
    registry: InstructionRegistry,
    sites: SiteIdentityResolver,
    policy: RetryPolicy,
    fetch_timeout: Duration,
}

impl<S: DocumentSource, E: SelectorEngine> Harvester<S, E> {
    pub fn new(
        source: S,
        engine: E,
        registry: InstructionRegistry,
        sites: SiteIdentityResolver,
    ) -> Self {
        Harvester {
            source,
            engine,
            registry,
            sites,
            policy: RetryPolicy::default(),
            fetch_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_fetch_timeout(mut self, fetch_timeout: Duration) -> Self {
        self.fetch_timeout = fetch_timeout;
        self
    }

    /// Run `job`, handing every extracted record to `sink` in fetch order.
    ///
    /// Fails only when the batch's search expansion fails.
    #[instrument(level = "info", skip_all, fields(theme = %job.theme, keyword = %job.keyword))]
    pub async fn harvest<F>(
        &self,
        job: &BatchJob,
        deadline: Option<Instant>,
        mut sink: F,
    ) -> Result<HarvestReport, FetchError>
    where
        F: FnMut(Record),
    {
        let coordinator = BatchCoordinator::new(&self.source, &self.sites, self.policy.clone())
            .with_fetch_timeout(self.fetch_timeout);
        let extractor = RecordExtractor::new(&self.registry, &self.engine);
        let (tx, mut rx) = mpsc::channel(CHANNEL_CAPACITY);

        let fetching = coordinator.run(job, deadline, tx);
        let extracting = async {
            let mut gaps = Vec::new();
            while let Some(result) = rx.recv().await {
                let extraction = extractor.extract_with_gaps(&result);
                gaps.extend(extraction.gaps);
                sink(extraction.record);
            }
            gaps
        };

        let (batch, gaps) = tokio::join!(fetching, extracting);
        let batch = batch?;
        info!(
            records = batch.processed,
            skipped = batch.skipped.len(),
            gaps = gaps.len(),
            "Harvest complete"
        );
        Ok(HarvestReport { batch, gaps })
    }

    /// [`Harvester::harvest`], collecting the records.
    pub async fn collect(
        &self,
        job: &BatchJob,
        deadline: Option<Instant>,
    ) -> Result<(Vec<Record>, HarvestReport), FetchError> {
        let mut records = Vec::new();
        let report = self.harvest(job, deadline, |record| records.push(record)).await?;
        Ok((records, report))
    }
}
