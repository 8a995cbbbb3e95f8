//! Crawl engine
//!
//! The engine composes fetching, extraction and the crawl state into the two
//! crawl shapes:
//!
//! - **Pagination**: fetch a page, extract records, follow the "next" link,
//!   until there is no next link, the page ceiling is reached, a link repeats,
//!   or the crawl is cancelled.
//! - **List-detail**: fetch a list page, resolve one detail link per item
//!   container, fetch the detail pages concurrently and extract one record
//!   set from each, returned in list order.
//!
//! Partial failures never abort a crawl; they are collected in the report.
//! Only a failed seed fetch is fatal.

use super::fetcher::{FetchResult, Fetcher};
use super::transport::{Headers, Transport};
use crate::extract::{extract, item_links, select_first_link, CompiledSelector, FieldSchema, FieldValue, Record};
use crate::state::{CrawlFailure, CrawlState, CrawlStatus, FailureReason};
use crate::url::CrawlBoundary;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Caller-supplied filter applied to every link before it is followed
///
/// Returning false rejects the link; it is reported as `Disallowed`.
pub type UrlPredicate = Arc<dyn Fn(&Url) -> bool + Send + Sync>;

/// Engine-wide settings shared by every crawl
#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Maximum number of detail fetches in flight
    pub concurrency: usize,

    /// Which hosts discovered links may lead to
    pub boundary: CrawlBoundary,

    /// Headers sent with every request unless a request overrides them
    pub headers: Headers,

    /// Per-attempt timeout unless a request overrides it
    pub timeout: Duration,

    /// Prefix every record with the URL (and page number) it came from
    pub annotate_source: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            concurrency: 4,
            boundary: CrawlBoundary::Any,
            headers: Headers::new(),
            timeout: Duration::from_secs(10),
            annotate_source: false,
        }
    }
}

/// A pagination crawl
#[derive(Debug, Clone)]
pub struct PaginationRequest {
    pub start_url: Url,
    pub schema: FieldSchema,
    pub next_selector: CompiledSelector,
    pub max_pages: u32,
    pub headers: Option<Headers>,
    pub timeout: Option<Duration>,
}

impl PaginationRequest {
    pub fn new(
        start_url: Url,
        schema: FieldSchema,
        next_selector: CompiledSelector,
        max_pages: u32,
    ) -> Self {
        Self {
            start_url,
            schema,
            next_selector,
            max_pages,
            headers: None,
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A list-detail crawl
#[derive(Debug, Clone)]
pub struct ListDetailRequest {
    pub list_url: Url,
    pub item_selector: CompiledSelector,
    pub link_selector: CompiledSelector,
    pub detail_schema: FieldSchema,
    pub max_items: usize,
    pub headers: Option<Headers>,
    pub timeout: Option<Duration>,
}

impl ListDetailRequest {
    pub fn new(
        list_url: Url,
        item_selector: CompiledSelector,
        link_selector: CompiledSelector,
        detail_schema: FieldSchema,
        max_items: usize,
    ) -> Self {
        Self {
            list_url,
            item_selector,
            link_selector,
            detail_schema,
            max_items,
            headers: None,
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = Some(headers);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Outcome of a pagination crawl
#[derive(Debug, Clone)]
pub struct PaginationReport {
    /// Records from every page, in page order then document order
    pub records: Vec<Record>,

    /// Pages fetched successfully, in order
    pub pages: Vec<Url>,

    pub pages_visited: u32,
    pub failures: Vec<CrawlFailure>,
    pub status: CrawlStatus,
}

/// Outcome of a list-detail crawl
#[derive(Debug, Clone)]
pub struct ListDetailReport {
    /// Records of the detail pages, in list order
    pub records: Vec<Record>,

    /// Item containers found on the list page
    pub items_found: usize,

    /// Detail pages fetched successfully
    pub details_fetched: usize,

    pub failures: Vec<CrawlFailure>,
    pub status: CrawlStatus,
}

/// Drives crawls over a shared fetcher
pub struct CrawlEngine<T> {
    fetcher: Arc<Fetcher<T>>,
    options: EngineOptions,
    predicate: Option<UrlPredicate>,
}

impl<T: Transport + 'static> CrawlEngine<T> {
    pub fn new(fetcher: Fetcher<T>, options: EngineOptions) -> Self {
        Self {
            fetcher: Arc::new(fetcher),
            options,
            predicate: None,
        }
    }

    /// Installs a link filter (e.g. a robots policy)
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&Url) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn fetcher(&self) -> &Fetcher<T> {
        &self.fetcher
    }

    /// Crawls a chain of "next" links starting at `request.start_url`
    ///
    /// # Termination
    ///
    /// | Condition | Status |
    /// |-----------|--------|
    /// | No next link on the last page | Completed |
    /// | `max_pages` pages fetched | Completed |
    /// | Next link already visited | Completed |
    /// | Next link outside the boundary or rejected | Completed |
    /// | A page after the seed failed | Completed |
    /// | Seed fetch failed | FatalSeedFailure |
    /// | Token cancelled | Cancelled |
    ///
    /// # Arguments
    ///
    /// * `request` - The start URL, schema, next-link selector and page ceiling
    /// * `cancel` - Cancels the crawl; records gathered so far are kept
    pub async fn crawl_pagination(
        &self,
        request: PaginationRequest,
        cancel: &CancellationToken,
    ) -> PaginationReport {
        let headers = request.headers.as_ref().unwrap_or(&self.options.headers);
        let timeout = request.timeout.unwrap_or(self.options.timeout);
        let seed = request.start_url.clone();

        let mut state = CrawlState::new();
        let mut status = CrawlStatus::Completed;
        state.enqueue(seed.clone());

        tracing::info!("Starting pagination crawl at {}", seed);

        while let Some(page_url) = state.next_url() {
            if cancel.is_cancelled() {
                status = CrawlStatus::Cancelled;
                break;
            }
            if state.pages_visited() >= request.max_pages {
                tracing::info!("Reached page ceiling of {}", request.max_pages);
                break;
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    status = CrawlStatus::Cancelled;
                    break;
                }
                result = self.fetcher.fetch(&page_url, headers, timeout) => result,
            };

            let document = match result {
                FetchResult::Success { document, .. } => document,
                FetchResult::Failure(err) => {
                    if state.pages_visited() == 0 {
                        tracing::error!("Seed page {} failed: {}", page_url, err);
                        status = CrawlStatus::FatalSeedFailure;
                    } else {
                        tracing::warn!("Stopping pagination at {}: {}", page_url, err);
                    }
                    state.record_failure(CrawlFailure::fetch(page_url, err));
                    break;
                }
            };

            // A redirect target counts as visited too
            state.mark_visited(document.url());

            let page_number = state.pages_visited() + 1;
            let records = extract(&document, &request.schema);
            tracing::info!(
                "Page {} ({}): {} records",
                page_number,
                page_url,
                records.len()
            );
            let records = records
                .into_iter()
                .map(|record| self.annotate(record, &page_url, Some(page_number)))
                .collect::<Vec<_>>();
            state.record_page(page_url, records);

            let Some(next) = select_first_link(&document, &request.next_selector) else {
                tracing::debug!("No next link on page {}", page_number);
                continue;
            };

            if state.pages_visited() >= request.max_pages {
                tracing::info!("Reached page ceiling of {}", request.max_pages);
                break;
            }
            if let Err(reason) = self.admit(&seed, &next) {
                tracing::info!("Not following {}: {}", next, reason);
                state.record_failure(CrawlFailure::new(next, reason));
                break;
            }
            if !state.enqueue(next.clone()) {
                tracing::info!("Next link {} was already visited, stopping", next);
            }
        }

        let pages_visited = state.pages_visited();
        let (pages, records, failures) = state.into_parts();
        tracing::info!(
            "Pagination crawl {}: {} pages, {} records, {} failures",
            status,
            pages_visited,
            records.len(),
            failures.len()
        );

        PaginationReport {
            records,
            pages,
            pages_visited,
            failures,
            status,
        }
    }

    /// Crawls the detail pages linked from a list page
    ///
    /// Detail fetches run concurrently, bounded by `concurrency`, and all go
    /// through the shared rate limiter. Records come back in list order
    /// regardless of completion order. A link shared by several items is
    /// fetched once.
    ///
    /// `max_items` bounds the detail links considered: links rejected by the
    /// boundary or the predicate count toward it, items without a link and
    /// repeated links do not.
    ///
    /// # Arguments
    ///
    /// * `request` - The list URL, item and link selectors, detail schema and item ceiling
    /// * `cancel` - Cancels the crawl; completed detail records are kept
    pub async fn crawl_list_detail(
        &self,
        request: ListDetailRequest,
        cancel: &CancellationToken,
    ) -> ListDetailReport {
        let headers = request
            .headers
            .clone()
            .unwrap_or_else(|| self.options.headers.clone());
        let timeout = request.timeout.unwrap_or(self.options.timeout);
        let list_url = request.list_url.clone();

        let mut state = CrawlState::new();
        tracing::info!("Starting list-detail crawl at {}", list_url);

        let list_result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.fetcher.fetch(&list_url, &headers, timeout) => Some(result),
        };

        let list_document = match list_result {
            None => return finish_list_detail(state, 0, true),
            Some(FetchResult::Success { document, .. }) => document,
            Some(FetchResult::Failure(err)) => {
                tracing::error!("List page {} failed: {}", list_url, err);
                state.record_failure(CrawlFailure::fetch(list_url, err));
                let (_, records, failures) = state.into_parts();
                return ListDetailReport {
                    records,
                    items_found: 0,
                    details_fetched: 0,
                    failures,
                    status: CrawlStatus::FatalSeedFailure,
                };
            }
        };

        state.mark_visited(&list_url);
        state.mark_visited(list_document.url());

        let links = item_links(&list_document, &request.item_selector, &request.link_selector);
        let items_found = links.len();
        tracing::info!("Found {} items on {}", items_found, list_url);

        let mut targets = Vec::new();
        for (index, link) in links.into_iter().enumerate() {
            if state.slot_count() >= request.max_items {
                tracing::info!("Reached item ceiling of {}", request.max_items);
                break;
            }
            let Some(link) = link else {
                tracing::debug!("Item {} has no detail link", index + 1);
                continue;
            };
            if let Err(reason) = self.admit(&list_url, &link) {
                tracing::info!("Not following {}: {}", link, reason);
                state.push_resolved_slot(link.clone(), Err(CrawlFailure::new(link, reason)));
                continue;
            }
            if !state.mark_visited(&link) {
                tracing::debug!("Skipping duplicate detail link {}", link);
                continue;
            }
            let slot = state.open_slot(link.clone());
            targets.push((slot, link));
        }

        let state = Arc::new(Mutex::new(state));
        let semaphore = Arc::new(Semaphore::new(self.options.concurrency.max(1)));
        let schema = Arc::new(request.detail_schema);
        let headers = Arc::new(headers);
        let mut tasks = JoinSet::new();
        let mut cancelled = false;

        for (slot, url) in targets {
            let permit = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                permit = Arc::clone(&semaphore).acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let fetcher = Arc::clone(&self.fetcher);
            let state = Arc::clone(&state);
            let schema = Arc::clone(&schema);
            let headers = Arc::clone(&headers);
            let cancel = cancel.clone();
            let annotate = self.options.annotate_source;

            tasks.spawn(async move {
                let _permit = permit;

                let result = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return,
                    result = fetcher.fetch(&url, &headers, timeout) => result,
                };

                let outcome = match result {
                    FetchResult::Success { document, .. } => {
                        let records = extract(&document, &schema)
                            .into_iter()
                            .map(|record| {
                                if annotate {
                                    record.prefixed(source_fields(&url, None))
                                } else {
                                    record
                                }
                            })
                            .collect();
                        Ok(records)
                    }
                    FetchResult::Failure(err) => {
                        tracing::warn!("Detail page {} failed: {}", url, err);
                        Err(CrawlFailure::fetch(url, err))
                    }
                };

                state.lock().await.fill_slot(slot, outcome);
            });
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!("Detail task failed: {}", e);
            }
        }
        let state = match Arc::try_unwrap(state) {
            Ok(state) => state.into_inner(),
            Err(shared) => std::mem::take(&mut *shared.lock().await),
        };

        // A token fired after every detail finished cancels nothing
        let cancelled = (cancelled || cancel.is_cancelled()) && state.unfilled_slots() > 0;
        finish_list_detail(state, items_found, cancelled)
    }

    /// Checks a discovered link against the boundary and the predicate
    fn admit(&self, seed: &Url, link: &Url) -> Result<(), FailureReason> {
        if !self.options.boundary.allows(seed, link) {
            return Err(FailureReason::OutsideBoundary);
        }
        if let Some(predicate) = &self.predicate {
            if !predicate(link) {
                return Err(FailureReason::Disallowed);
            }
        }
        Ok(())
    }

    fn annotate(&self, record: Record, url: &Url, page: Option<u32>) -> Record {
        if self.options.annotate_source {
            record.prefixed(source_fields(url, page))
        } else {
            record
        }
    }
}

fn source_fields(url: &Url, page: Option<u32>) -> Vec<(String, FieldValue)> {
    let mut fields = vec![("url".to_string(), FieldValue::Text(url.to_string()))];
    if let Some(page) = page {
        fields.push(("page".to_string(), FieldValue::Text(page.to_string())));
    }
    fields
}

fn finish_list_detail(mut state: CrawlState, items_found: usize, cancelled: bool) -> ListDetailReport {
    let details_fetched = state.succeeded_slots();
    state.drain_slots(cancelled);
    let (_, records, failures) = state.into_parts();
    let status = if cancelled {
        CrawlStatus::Cancelled
    } else {
        CrawlStatus::Completed
    };

    tracing::info!(
        "List-detail crawl {}: {} items, {} records, {} failures",
        status,
        items_found,
        records.len(),
        failures.len()
    );

    ListDetailReport {
        records,
        items_found,
        details_fetched,
        failures,
        status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crawler::rate_limit::RateLimiter;
    use crate::crawler::retry::RetryPolicy;
    use crate::crawler::transport::testing::{url, StaticSite};
    use crate::url::CrawlBoundary;
    use tokio::time::Instant;

    fn engine_with(site: StaticSite, options: EngineOptions) -> CrawlEngine<StaticSite> {
        let fetcher = Fetcher::new(site)
            .with_rate_limiter(RateLimiter::unlimited())
            .with_retry_policy(RetryPolicy::no_retry());
        CrawlEngine::new(fetcher, options)
    }

    fn engine(site: StaticSite) -> CrawlEngine<StaticSite> {
        engine_with(site, EngineOptions::default())
    }

    fn quote_page(text: &str, next: Option<&str>) -> String {
        let next = next
            .map(|href| format!(r#"<li class="next"><a href="{}">Next</a></li>"#, href))
            .unwrap_or_default();
        format!(
            r#"<html><body><div class="quote"><span class="text">{}</span></div><ul>{}</ul></body></html>"#,
            text, next
        )
    }

    fn pagination(start: &str, max_pages: u32) -> PaginationRequest {
        PaginationRequest::new(
            url(start),
            FieldSchema::nested(".quote", FieldSchema::flat([("text", ".text")]).unwrap()).unwrap(),
            CompiledSelector::parse("li.next a").unwrap(),
            max_pages,
        )
    }

    fn texts(records: &[Record], field: &str) -> Vec<String> {
        records
            .iter()
            .map(|r| r.text(field).unwrap_or_default().to_string())
            .collect()
    }

    fn three_page_site() -> StaticSite {
        StaticSite::new()
            .page("/page/1", &quote_page("A", Some("/page/2")))
            .page("/page/2", &quote_page("B", Some("/page/3")))
            .page("/page/3", &quote_page("C", None))
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_follows_chain_to_end() {
        let engine = engine(three_page_site());

        let report = engine
            .crawl_pagination(pagination("/page/1", 10), &CancellationToken::new())
            .await;

        assert_eq!(report.status, CrawlStatus::Completed);
        assert_eq!(report.pages_visited, 3);
        assert_eq!(texts(&report.records, "text"), vec!["A", "B", "C"]);
        assert_eq!(report.pages, vec![url("/page/1"), url("/page/2"), url("/page/3")]);
        assert!(report.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_respects_page_ceiling() {
        let engine = engine(three_page_site());

        let report = engine
            .crawl_pagination(pagination("/page/1", 2), &CancellationToken::new())
            .await;

        assert_eq!(report.status, CrawlStatus::Completed);
        assert_eq!(report.pages_visited, 2);
        assert_eq!(engine.fetcher().transport().hits("/page/3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_stops_on_cycle() {
        let site = StaticSite::new()
            .page("/page/1", &quote_page("A", Some("/page/2")))
            .page("/page/2", &quote_page("B", Some("/page/1/#top")));
        let engine = engine(site);

        let report = engine
            .crawl_pagination(pagination("/page/1", 10), &CancellationToken::new())
            .await;

        assert_eq!(report.status, CrawlStatus::Completed);
        assert_eq!(report.pages_visited, 2);
        assert_eq!(engine.fetcher().transport().hits("/page/1"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_seed_failure_is_fatal() {
        let engine = engine(StaticSite::new().status("/page/1", 404));

        let report = engine
            .crawl_pagination(pagination("/page/1", 10), &CancellationToken::new())
            .await;

        assert_eq!(report.status, CrawlStatus::FatalSeedFailure);
        assert_eq!(report.pages_visited, 0);
        assert!(report.records.is_empty());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, url("/page/1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_later_failure_keeps_records() {
        let site = StaticSite::new()
            .page("/page/1", &quote_page("A", Some("/page/2")))
            .status("/page/2", 500);
        let engine = engine(site);

        let report = engine
            .crawl_pagination(pagination("/page/1", 10), &CancellationToken::new())
            .await;

        assert_eq!(report.status, CrawlStatus::Completed);
        assert_eq!(report.pages_visited, 1);
        assert_eq!(texts(&report.records, "text"), vec!["A"]);
        assert_eq!(report.failures.len(), 1);
        assert!(matches!(
            report.failures[0].reason,
            FailureReason::Fetch(crate::FetchError::HttpStatus { status: 500, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_boundary_stops_crawl() {
        let site = StaticSite::new().page(
            "/page/1",
            &quote_page("A", Some("https://elsewhere.test/page/2")),
        );
        let options = EngineOptions {
            boundary: CrawlBoundary::SameDomain,
            ..EngineOptions::default()
        };
        let engine = engine_with(site, options);

        let report = engine
            .crawl_pagination(pagination("/page/1", 10), &CancellationToken::new())
            .await;

        assert_eq!(report.pages_visited, 1);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].reason, FailureReason::OutsideBoundary);
        assert_eq!(report.failures[0].url.host_str(), Some("elsewhere.test"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_annotates_source() {
        let options = EngineOptions {
            annotate_source: true,
            ..EngineOptions::default()
        };
        let engine = engine_with(three_page_site(), options);

        let report = engine
            .crawl_pagination(pagination("/page/1", 2), &CancellationToken::new())
            .await;

        let first = &report.records[0];
        assert_eq!(first.names().collect::<Vec<_>>(), vec!["url", "page", "text"]);
        assert_eq!(first.text("url"), Some("https://site.test/page/1"));
        assert_eq!(report.records[1].text("page"), Some("2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_cancelled_before_start() {
        let engine = engine(three_page_site());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let report = engine.crawl_pagination(pagination("/page/1", 10), &cancel).await;

        assert_eq!(report.status, CrawlStatus::Cancelled);
        assert_eq!(report.pages_visited, 0);
        assert_eq!(engine.fetcher().transport().total_hits(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_cancelled_mid_crawl_keeps_partial_records() {
        let site = StaticSite::new()
            .page("/page/1", &quote_page("A", Some("/page/2")))
            .slow_page("/page/2", Duration::from_secs(60), &quote_page("B", None));
        let engine = engine(site);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = engine.crawl_pagination(pagination("/page/1", 10), &cancel).await;

        assert_eq!(report.status, CrawlStatus::Cancelled);
        assert_eq!(texts(&report.records, "text"), vec!["A"]);
    }

    fn list_page(hrefs: &[&str]) -> String {
        let items: String = hrefs
            .iter()
            .map(|href| {
                if href.is_empty() {
                    r#"<li class="item"><span>no link</span></li>"#.to_string()
                } else {
                    format!(r#"<li class="item"><a href="{}">more</a></li>"#, href)
                }
            })
            .collect();
        format!("<html><body><ul>{}</ul></body></html>", items)
    }

    fn detail_page(title: &str) -> String {
        format!("<html><body><h1>{}</h1></body></html>", title)
    }

    fn list_detail(max_items: usize) -> ListDetailRequest {
        ListDetailRequest::new(
            url("/list"),
            CompiledSelector::parse("li.item").unwrap(),
            CompiledSelector::parse("a").unwrap(),
            FieldSchema::flat([("title", "h1")]).unwrap(),
            max_items,
        )
    }

    fn catalogue_site(count: usize) -> StaticSite {
        let hrefs: Vec<String> = (1..=count).map(|i| format!("/item/{}", i)).collect();
        let refs: Vec<&str> = hrefs.iter().map(String::as_str).collect();
        let mut site = StaticSite::new().page("/list", &list_page(&refs));
        for i in 1..=count {
            site = site.page(&format!("/item/{}", i), &detail_page(&format!("Item {}", i)));
        }
        site
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_reports_partial_failure_in_order() {
        let site = catalogue_site(5).status("/item/3", 404);
        let engine = engine(site);

        let report = engine
            .crawl_list_detail(list_detail(10), &CancellationToken::new())
            .await;

        assert_eq!(report.status, CrawlStatus::Completed);
        assert_eq!(report.items_found, 5);
        assert_eq!(report.details_fetched, 4);
        assert_eq!(
            texts(&report.records, "title"),
            vec!["Item 1", "Item 2", "Item 4", "Item 5"]
        );
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, url("/item/3"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_order_survives_out_of_order_completion() {
        let mut site = catalogue_site(5);
        for i in 1..=5u64 {
            site = site.slow_page(
                &format!("/item/{}", i),
                Duration::from_secs(6 - i),
                &detail_page(&format!("Item {}", i)),
            );
        }
        let options = EngineOptions {
            concurrency: 5,
            ..EngineOptions::default()
        };
        let engine = engine_with(site, options);

        let report = engine
            .crawl_list_detail(list_detail(10), &CancellationToken::new())
            .await;

        assert_eq!(
            texts(&report.records, "title"),
            vec!["Item 1", "Item 2", "Item 3", "Item 4", "Item 5"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_respects_item_ceiling() {
        let engine = engine(catalogue_site(5));

        let report = engine
            .crawl_list_detail(list_detail(2), &CancellationToken::new())
            .await;

        assert_eq!(texts(&report.records, "title"), vec!["Item 1", "Item 2"]);
        assert_eq!(engine.fetcher().transport().hits("/item/3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_skips_duplicates_and_linkless_items() {
        let site = StaticSite::new()
            .page("/list", &list_page(&["/item/1", "", "/item/1#reviews", "/item/2"]))
            .page("/item/1", &detail_page("Item 1"))
            .page("/item/2", &detail_page("Item 2"));
        let engine = engine(site);

        let report = engine
            .crawl_list_detail(list_detail(10), &CancellationToken::new())
            .await;

        assert_eq!(report.items_found, 4);
        assert_eq!(texts(&report.records, "title"), vec!["Item 1", "Item 2"]);
        assert_eq!(engine.fetcher().transport().hits("/item/1"), 1);
        assert!(report.failures.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_predicate_rejections_are_reported() {
        let engine = engine(catalogue_site(3)).with_predicate(|u: &Url| u.path() != "/item/2");

        let report = engine
            .crawl_list_detail(list_detail(10), &CancellationToken::new())
            .await;

        assert_eq!(texts(&report.records, "title"), vec!["Item 1", "Item 3"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].reason, FailureReason::Disallowed);
        assert_eq!(engine.fetcher().transport().hits("/item/2"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_rejected_links_count_toward_ceiling() {
        let engine = engine(catalogue_site(5)).with_predicate(|u: &Url| u.path() != "/item/1");

        let report = engine
            .crawl_list_detail(list_detail(2), &CancellationToken::new())
            .await;

        assert_eq!(texts(&report.records, "title"), vec!["Item 2"]);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].url, url("/item/1"));
        assert_eq!(engine.fetcher().transport().hits("/item/3"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_list_failure_is_fatal() {
        let engine = engine(StaticSite::new().status("/list", 503));

        let report = engine
            .crawl_list_detail(list_detail(10), &CancellationToken::new())
            .await;

        assert_eq!(report.status, CrawlStatus::FatalSeedFailure);
        assert!(report.records.is_empty());
        assert_eq!(report.failures.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_concurrency_is_bounded() {
        let mut site = catalogue_site(4);
        for i in 1..=4 {
            site = site.slow_page(
                &format!("/item/{}", i),
                Duration::from_secs(10),
                &detail_page(&format!("Item {}", i)),
            );
        }
        let options = EngineOptions {
            concurrency: 2,
            ..EngineOptions::default()
        };
        let engine = engine_with(site, options);
        let start = Instant::now();

        let report = engine
            .crawl_list_detail(list_detail(10), &CancellationToken::new())
            .await;

        assert_eq!(report.records.len(), 4);
        assert!(start.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_shares_rate_limit() {
        let fetcher = Fetcher::new(catalogue_site(4))
            .with_rate_limiter(RateLimiter::new(2.0))
            .with_retry_policy(RetryPolicy::no_retry());
        let engine = CrawlEngine::new(fetcher, EngineOptions::default());
        let start = Instant::now();

        let report = engine
            .crawl_list_detail(list_detail(10), &CancellationToken::new())
            .await;

        assert_eq!(report.records.len(), 4);
        // list page plus four details, 500ms apart
        assert!(start.elapsed() >= Duration::from_secs(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_cancellation_keeps_completed_details() {
        let site = catalogue_site(3).slow_page(
            "/item/3",
            Duration::from_secs(60),
            &detail_page("Item 3"),
        );
        let engine = engine(site);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(5)).await;
            trigger.cancel();
        });

        let report = engine.crawl_list_detail(list_detail(10), &cancel).await;

        assert_eq!(report.status, CrawlStatus::Cancelled);
        assert_eq!(texts(&report.records, "title"), vec!["Item 1", "Item 2"]);
        assert!(report.failures.is_empty());
    }

    /// Serves a site and fires a token once `path` has been served
    struct CancelAfter {
        site: StaticSite,
        path: &'static str,
        token: CancellationToken,
    }

    #[async_trait::async_trait]
    impl Transport for CancelAfter {
        async fn get(
            &self,
            target: &Url,
            headers: &Headers,
            timeout: Duration,
        ) -> Result<crate::crawler::transport::TransportResponse, crate::FetchError> {
            let response = self.site.get(target, headers, timeout).await;
            if target.path() == self.path {
                self.token.cancel();
            }
            response
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_list_detail_late_cancellation_keeps_completed_status() {
        let cancel = CancellationToken::new();
        let transport = CancelAfter {
            site: catalogue_site(1),
            path: "/item/1",
            token: cancel.clone(),
        };
        let fetcher = Fetcher::new(transport)
            .with_rate_limiter(RateLimiter::unlimited())
            .with_retry_policy(RetryPolicy::no_retry());
        let engine = CrawlEngine::new(fetcher, EngineOptions::default());

        let report = engine.crawl_list_detail(list_detail(10), &cancel).await;

        assert!(cancel.is_cancelled());
        assert_eq!(report.status, CrawlStatus::Completed);
        assert_eq!(texts(&report.records, "title"), vec!["Item 1"]);
        assert!(report.failures.is_empty());
    }
}
