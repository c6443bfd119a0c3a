use article_harvest::error::FetchError;
use article_harvest::extract::{ConfigurationGap, Gap};
use article_harvest::fetch::{
    AttemptOutcome, BatchJob, DocumentSource, FetchedPage, RetryPolicy, SkipReason,
};
use article_harvest::models::{Publisher, Record, SchemaField, Theme};
use article_harvest::pipeline::Harvester;
use article_harvest::registry::{InstructionRegistry, InstructionSet, QueryGroup};
use article_harvest::selector::HtmlSelectorEngine;
use article_harvest::sites::SiteIdentityResolver;
use pretty_assertions::assert_eq;
use std::collections::HashMap;
use std::sync::Mutex;

/// Serves fixed pages and times out a configurable number of times per URL.
#[derive(Default)]
struct FakeSource {
    pages: HashMap<String, String>,
    timeouts_left: Mutex<HashMap<String, usize>>,
}

impl FakeSource {
    fn page(mut self, url: &str, html: &str) -> Self {
        self.pages.insert(url.to_string(), html.to_string());
        self
    }

    fn time_out(self, url: &str, times: usize) -> Self {
        self.timeouts_left
            .lock()
            .unwrap()
            .insert(url.to_string(), times);
        self
    }
}

impl DocumentSource for FakeSource {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        if let Some(left) = self.timeouts_left.lock().unwrap().get_mut(url) {
            if *left > 0 {
                *left -= 1;
                return Err(FetchError::Timeout {
                    url: url.to_string(),
                });
            }
        }
        Ok(FetchedPage {
            canonical_url: url.to_string(),
            html: self
                .pages
                .get(url)
                .cloned()
                .unwrap_or_else(|| "<html><body></body></html>".to_string()),
        })
    }

    async fn search(&self, keyword: &str) -> Result<Vec<String>, FetchError> {
        Err(FetchError::Search {
            keyword: keyword.to_string(),
            reason: "search disabled".to_string(),
        })
    }
}

fn harvester(source: FakeSource, registry: InstructionRegistry) -> Harvester<FakeSource, HtmlSelectorEngine> {
    Harvester::new(
        source,
        HtmlSelectorEngine::new(),
        registry,
        SiteIdentityResolver::builtin(),
    )
    .with_policy(RetryPolicy::immediate(3))
}

const FASTMARKETS_PAGE: &str = r#"
<html><body>
  <h1 class="Page-headline">Price Up</h1>
  <div class="RichTextArticleBody RichTextBody"><p>Tallow climbed.</p></div>
</body></html>"#;

#[tokio::test]
async fn headline_is_extracted_for_known_publisher() {
    let url = "https://www.fastmarkets.com/insights/price-up";
    let source = FakeSource::default().page(url, FASTMARKETS_PAGE);
    let harvester = harvester(source, InstructionRegistry::builtin().unwrap());

    let job = BatchJob::urls(Theme::FeedstockPrice, "tallow", [url]);
    let (records, report) = harvester.collect(&job, None).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].publisher, Publisher::Fastmarkets);
    assert_eq!(records[0].title.as_deref(), Some("Price Up"));
    assert!(report.batch.is_complete());
}

#[tokio::test]
async fn multi_query_group_joins_fragments_in_declared_order() {
    let url = "https://www.fastmarkets.com/insights/joined";
    let html = r#"
      <html><body>
        <div class="body"><p> A </p><p>B</p></div>
        <aside><p>C  </p></aside>
      </body></html>"#;
    let registry = InstructionRegistry::builder()
        .insert(
            Publisher::Fastmarkets,
            InstructionSet::new().with(
                SchemaField::Content,
                vec![QueryGroup::multi(["div.body p", "aside p"])],
            ),
        )
        .unwrap()
        .build();
    let harvester = harvester(FakeSource::default().page(url, html), registry);

    let job = BatchJob::urls(Theme::Supply, "tallow", [url]);
    let (records, _) = harvester.collect(&job, None).await.unwrap();

    assert_eq!(records[0].content.as_deref(), Some("A\nB\nC"));
}

#[tokio::test]
async fn unknown_publisher_keeps_identity_only() {
    let url = "https://blog.unlisted.example/post/1";
    let source = FakeSource::default().page(url, FASTMARKETS_PAGE);
    let harvester = harvester(source, InstructionRegistry::builtin().unwrap());

    let job = BatchJob::urls(Theme::Demand, "renewable diesel", [url]);
    let (records, report) = harvester.collect(&job, None).await.unwrap();

    assert_eq!(
        records,
        vec![Record {
            publisher: Publisher::Unknown,
            url: url.to_string(),
            theme: Theme::Demand,
            keyword: "renewable diesel".to_string(),
            title: None,
            date: None,
            author: None,
            content: None,
        }]
    );
    assert_eq!(
        report.gaps,
        vec![Gap::Configuration {
            publisher: Publisher::Unknown,
            url: url.to_string(),
            reason: ConfigurationGap::MissingInstructions,
        }]
    );
}

#[tokio::test]
async fn timed_out_url_succeeds_on_retry_pass() {
    let urls = [
        "https://www.fastmarkets.com/insights/1",
        "https://www.fastmarkets.com/insights/2",
        "https://www.fastmarkets.com/insights/3",
    ];
    let source = FakeSource::default().time_out(urls[1], 1);
    let harvester = harvester(source, InstructionRegistry::builtin().unwrap());

    let job = BatchJob::urls(Theme::Supply, "tallow", urls);
    let (records, report) = harvester.collect(&job, None).await.unwrap();

    assert_eq!(records.len(), 3);
    assert!(report.batch.skipped.is_empty());
    let second: Vec<_> = report.batch.attempts_for(urls[1]).collect();
    assert_eq!(second.len(), 2);
    assert!(matches!(second[0].outcome, AttemptOutcome::Failed { .. }));
    assert!(second[1].succeeded());
}

#[tokio::test]
async fn persistently_failing_url_is_reported_skipped() {
    let good = "https://www.fastmarkets.com/insights/good";
    let bad = "https://www.fastmarkets.com/insights/bad";
    let source = FakeSource::default().time_out(bad, usize::MAX);
    let harvester = harvester(source, InstructionRegistry::builtin().unwrap());

    let job = BatchJob::urls(Theme::Supply, "tallow", [good, bad]);
    let (records, report) = harvester.collect(&job, None).await.unwrap();

    assert_eq!(records.len(), 1);
    assert_eq!(records[0].url, good);
    assert_eq!(report.batch.skipped_urls(), vec![bad]);
    assert!(matches!(
        report.batch.skipped[0].reason,
        SkipReason::RetriesExhausted { passes: 3, .. }
    ));
}

#[tokio::test]
async fn failed_search_fails_the_harvest() {
    let harvester = harvester(FakeSource::default(), InstructionRegistry::builtin().unwrap());

    let job = BatchJob::search(Theme::Supply, "tallow");
    let err = harvester.collect(&job, None).await.unwrap_err();

    assert!(matches!(err, FetchError::Search { .. }));
}
