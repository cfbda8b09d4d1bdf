use crate::config::types::Config;
use crate::fetch::client::{FetchError, LogQueryClient, Result};
use crate::fetch::pacer::{Pacer, TokioPacer};
use crate::fetch::types::{format_timestamp, Direction, LogFilter, LogPage, LogQueryRequest, TimeWindow};
use crate::sink::LogSink;
use chrono::DateTime;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-request constants and loop limits.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub owner_id: String,
    pub region: String,
    pub page_size: u32,
    pub direction: Direction,
    pub page_delay: Duration,
    /// Stop with `PageLimitExceeded` after this many pages. `None` disables the guard.
    pub max_pages: Option<usize>,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for FetchSettings {
    fn from(config: &Config) -> Self {
        Self {
            owner_id: config.query.owner_id.clone(),
            region: config.query.region.clone(),
            page_size: config.query.page_size,
            direction: config.query.direction,
            page_delay: config.pagination.page_delay,
            max_pages: config.pagination.max_pages,
        }
    }
}

/// Why a fetch session stopped.
#[derive(Debug)]
pub enum Termination {
    /// The server reported no further pages.
    Exhausted,
    /// A request or write failed. Records written before the failure are kept.
    Error(FetchError),
    /// The page guard tripped while the server still reported more data.
    PageLimitExceeded { limit: usize },
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Exhausted => write!(f, "exhausted"),
            Termination::Error(e) => write!(f, "error: {}", e),
            Termination::PageLimitExceeded { limit } => {
                write!(f, "page limit of {} exceeded", limit)
            }
        }
    }
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub total_records_written: usize,
    pub pages_fetched: usize,
    pub termination: Termination,
}

impl FetchOutcome {
    pub fn is_exhausted(&self) -> bool {
        matches!(self.termination, Termination::Exhausted)
    }
}

/// Drives the cursor-based pagination loop against a log query endpoint.
///
/// Pages are strictly sequential: the cursor for page k+1 comes from the
/// response to page k, and every record of a page reaches the sink before the
/// next request is issued.
pub struct PaginatedLogFetcher {
    client: Arc<dyn LogQueryClient>,
    pacer: Arc<dyn Pacer>,
    settings: FetchSettings,
}

impl PaginatedLogFetcher {
    pub fn new(client: Arc<dyn LogQueryClient>, settings: FetchSettings) -> Self {
        Self {
            client,
            pacer: Arc::new(TokioPacer),
            settings,
        }
    }

    pub fn with_pacer(mut self, pacer: Arc<dyn Pacer>) -> Self {
        self.pacer = pacer;
        self
    }

    pub fn settings(&self) -> &FetchSettings {
        &self.settings
    }

    /// Fetches every page of `window` matching `filter` into `sink`.
    pub async fn fetch(
        &self,
        window: &TimeWindow,
        filter: &LogFilter,
        sink: &mut dyn LogSink,
    ) -> FetchOutcome {
        let mut outcome = FetchOutcome {
            total_records_written: 0,
            pages_fetched: 0,
            termination: Termination::Exhausted,
        };

        info!(
            start = %format_timestamp(&window.start),
            end = %format_timestamp(&window.end),
            direction = ?self.settings.direction,
            "Starting log fetch"
        );

        if let Err(e) = sink.write_session_header(window) {
            error!(error = %e, "Failed to write session header");
            outcome.termination = Termination::Error(e.into());
            return outcome;
        }

        let termination = self.drain(window, filter, sink, &mut outcome).await;
        outcome.termination = termination;

        match &outcome.termination {
            Termination::Exhausted => info!(
                records = outcome.total_records_written,
                pages = outcome.pages_fetched,
                "Log fetch complete"
            ),
            Termination::Error(e) => error!(
                records = outcome.total_records_written,
                pages = outcome.pages_fetched,
                error = %e,
                "Log fetch stopped on error"
            ),
            Termination::PageLimitExceeded { limit } => warn!(
                records = outcome.total_records_written,
                limit = limit,
                "Log fetch stopped at page limit"
            ),
        }

        outcome
    }

    async fn drain(
        &self,
        window: &TimeWindow,
        filter: &LogFilter,
        sink: &mut dyn LogSink,
        outcome: &mut FetchOutcome,
    ) -> Termination {
        if let Some(limit @ 0) = self.settings.max_pages {
            return Termination::PageLimitExceeded { limit };
        }

        let mut request = self.first_request(window, filter);
        loop {
            debug!(
                page = outcome.pages_fetched + 1,
                start = %request.start,
                end = %request.end,
                "Requesting page"
            );

            let page = match self.client.query(&request).await {
                Ok(page) => page,
                Err(e) => return Termination::Error(e),
            };
            outcome.pages_fetched += 1;

            for record in &page.logs {
                if let Err(e) = sink.append_record(record) {
                    return Termination::Error(e.into());
                }
                outcome.total_records_written += 1;
            }

            info!(
                page = outcome.pages_fetched,
                records = page.logs.len(),
                has_more = page.has_more,
                "Fetched logs"
            );

            if !page.has_more {
                return Termination::Exhausted;
            }

            if let Some(limit) = self.settings.max_pages {
                if outcome.pages_fetched >= limit {
                    return Termination::PageLimitExceeded { limit };
                }
            }

            if let Err(e) = self.advance(&mut request, &page) {
                return Termination::Error(e);
            }

            self.pacer.pause(self.settings.page_delay).await;
        }
    }

    fn first_request(&self, window: &TimeWindow, filter: &LogFilter) -> LogQueryRequest {
        LogQueryRequest {
            start: format_timestamp(&window.start),
            end: format_timestamp(&window.end),
            filters: filter.clauses().to_vec(),
            owner_id: self.settings.owner_id.clone(),
            page_size: self.settings.page_size,
            region: self.settings.region.clone(),
            direction: self.settings.direction,
        }
    }

    /// Moves one edge of the cursor: `end` when walking backward, `start` when forward.
    fn advance(&self, request: &mut LogQueryRequest, page: &LogPage) -> Result<()> {
        match self.settings.direction {
            Direction::Backward => {
                request.end = checked_cursor("nextEndTime", page.next_end_time.as_deref())?;
            }
            Direction::Forward => {
                request.start = checked_cursor("nextStartTime", page.next_start_time.as_deref())?;
            }
        }
        Ok(())
    }
}

/// Returns the server's cursor unchanged once it is known to be RFC 3339.
fn checked_cursor(field: &'static str, value: Option<&str>) -> Result<String> {
    let value = value.ok_or(FetchError::MissingCursor { field })?;
    match DateTime::parse_from_rfc3339(value) {
        Ok(_) => Ok(value.to_string()),
        Err(_) => Err(FetchError::InvalidCursor {
            field,
            value: value.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::types::{format_record, format_session_header, LogRecord};
    use crate::sink::SinkError;
    use async_trait::async_trait;
    use chrono::Utc;
    use std::collections::VecDeque;
    use std::path::PathBuf;
    use std::sync::Mutex;

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn window() -> TimeWindow {
        TimeWindow::new(ts("2024-01-01T00:00:00Z"), ts("2024-01-02T00:00:00Z"))
    }

    fn filter() -> LogFilter {
        LogFilter::for_service("srv-test", &["app".to_string(), "request".to_string()])
    }

    fn records(prefix: &str, count: usize) -> Vec<LogRecord> {
        (0..count)
            .map(|i| LogRecord::new(format!("2024-01-01T00:00:{:02}Z", i), format!("{} {}", prefix, i)))
            .collect()
    }

    fn page(logs: Vec<LogRecord>, has_more: bool, next_end: Option<&str>) -> LogPage {
        LogPage {
            logs,
            next_start_time: Some("2024-01-01T00:00:00Z".to_string()),
            next_end_time: next_end.map(str::to_string),
            has_more,
        }
    }

    /// Replays canned responses and remembers every request it saw.
    #[derive(Default)]
    struct ScriptedClient {
        responses: Mutex<VecDeque<Result<LogPage>>>,
        requests: Mutex<Vec<LogQueryRequest>>,
    }

    impl ScriptedClient {
        fn new(responses: Vec<Result<LogPage>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests: Mutex::new(Vec::new()),
            })
        }

        fn requests(&self) -> Vec<LogQueryRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LogQueryClient for ScriptedClient {
        async fn query(&self, request: &LogQueryRequest) -> Result<LogPage> {
            self.requests.lock().unwrap().push(request.clone());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(LogPage::empty()))
        }
    }

    #[derive(Default)]
    struct RecordingPacer {
        pauses: Mutex<Vec<Duration>>,
    }

    #[async_trait]
    impl Pacer for RecordingPacer {
        async fn pause(&self, delay: Duration) {
            self.pauses.lock().unwrap().push(delay);
        }
    }

    #[derive(Default)]
    struct MemorySink {
        lines: Vec<String>,
        fail_after: Option<usize>,
    }

    impl LogSink for MemorySink {
        fn write_session_header(&mut self, window: &TimeWindow) -> std::result::Result<(), SinkError> {
            self.lines.push(format_session_header(window));
            Ok(())
        }

        fn append_record(&mut self, record: &LogRecord) -> std::result::Result<(), SinkError> {
            if self.fail_after == Some(self.lines.len() - 1) {
                return Err(SinkError::Write {
                    path: PathBuf::from("memory"),
                    source: std::io::Error::new(std::io::ErrorKind::Other, "disk full"),
                });
            }
            self.lines.push(format_record(record));
            Ok(())
        }
    }

    fn fetcher(client: Arc<ScriptedClient>, pacer: Arc<RecordingPacer>) -> PaginatedLogFetcher {
        let settings = FetchSettings {
            page_delay: Duration::from_millis(500),
            ..FetchSettings::default()
        };
        PaginatedLogFetcher::new(client, settings).with_pacer(pacer)
    }

    #[tokio::test]
    async fn test_drains_all_pages_until_exhausted() {
        let client = ScriptedClient::new(vec![
            Ok(page(records("a", 50), true, Some("2024-01-01T18:00:00Z"))),
            Ok(page(records("b", 50), true, Some("2024-01-01T12:00:00Z"))),
            Ok(page(records("c", 7), false, None)),
        ]);
        let pacer = Arc::new(RecordingPacer::default());
        let mut sink = MemorySink::default();

        let outcome = fetcher(client.clone(), pacer.clone())
            .fetch(&window(), &filter(), &mut sink)
            .await;

        assert!(outcome.is_exhausted());
        assert_eq!(outcome.total_records_written, 107);
        assert_eq!(outcome.pages_fetched, 3);
        assert_eq!(sink.lines.len(), 108);
        assert_eq!(sink.lines[1], "[2024-01-01T00:00:00Z] a 0\n");
        assert_eq!(sink.lines[107], "[2024-01-01T00:00:06Z] c 6\n");
    }

    #[tokio::test]
    async fn test_cursor_end_follows_next_end_time_and_start_is_fixed() {
        let client = ScriptedClient::new(vec![
            Ok(page(records("a", 2), true, Some("2024-01-01T18:00:00Z"))),
            Ok(page(records("b", 2), true, Some("2024-01-01T12:30:00.5Z"))),
            Ok(page(records("c", 2), false, None)),
        ]);
        let pacer = Arc::new(RecordingPacer::default());
        let mut sink = MemorySink::default();

        fetcher(client.clone(), pacer)
            .fetch(&window(), &filter(), &mut sink)
            .await;

        let requests = client.requests();
        assert_eq!(requests.len(), 3);
        assert_eq!(requests[0].end, "2024-01-02T00:00:00Z");
        assert_eq!(requests[1].end, "2024-01-01T18:00:00Z");
        assert_eq!(requests[2].end, "2024-01-01T12:30:00.5Z");
        for request in &requests {
            assert_eq!(request.start, "2024-01-01T00:00:00Z");
            assert_eq!(request.page_size, 50);
            assert_eq!(request.direction, Direction::Backward);
            assert_eq!(request.filters, filter().clauses().to_vec());
        }
    }

    #[tokio::test]
    async fn test_forward_direction_moves_start() {
        let client = ScriptedClient::new(vec![
            Ok(LogPage {
                logs: records("a", 1),
                next_start_time: Some("2024-01-01T06:00:00Z".to_string()),
                next_end_time: None,
                has_more: true,
            }),
            Ok(page(records("b", 1), false, None)),
        ]);
        let settings = FetchSettings {
            direction: Direction::Forward,
            ..FetchSettings::default()
        };
        let fetcher = PaginatedLogFetcher::new(client.clone(), settings)
            .with_pacer(Arc::new(RecordingPacer::default()));
        let mut sink = MemorySink::default();

        let outcome = fetcher.fetch(&window(), &filter(), &mut sink).await;

        assert!(outcome.is_exhausted());
        let requests = client.requests();
        assert_eq!(requests[1].start, "2024-01-01T06:00:00Z");
        assert_eq!(requests[1].end, "2024-01-02T00:00:00Z");
    }

    #[tokio::test]
    async fn test_empty_first_page_writes_only_header() {
        let client = ScriptedClient::new(vec![Ok(page(vec![], false, None))]);
        let pacer = Arc::new(RecordingPacer::default());
        let mut sink = MemorySink::default();

        let outcome = fetcher(client, pacer.clone())
            .fetch(&window(), &filter(), &mut sink)
            .await;

        assert!(outcome.is_exhausted());
        assert_eq!(outcome.total_records_written, 0);
        assert_eq!(sink.lines, vec![format_session_header(&window())]);
        assert!(pacer.pauses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_keeps_earlier_records() {
        let client = ScriptedClient::new(vec![
            Ok(page(records("a", 10), true, Some("2024-01-01T18:00:00Z"))),
            Err(FetchError::Server {
                status: 500,
                body: "boom".to_string(),
            }),
        ]);
        let pacer = Arc::new(RecordingPacer::default());
        let mut sink = MemorySink::default();

        let outcome = fetcher(client, pacer)
            .fetch(&window(), &filter(), &mut sink)
            .await;

        assert_eq!(outcome.total_records_written, 10);
        assert_eq!(outcome.pages_fetched, 1);
        assert!(matches!(
            outcome.termination,
            Termination::Error(FetchError::Server { status: 500, .. })
        ));
        assert_eq!(sink.lines.len(), 11);
    }

    #[tokio::test]
    async fn test_pacer_runs_between_every_pair_of_pages() {
        let client = ScriptedClient::new(vec![
            Ok(page(records("a", 1), true, Some("2024-01-01T18:00:00Z"))),
            Ok(page(records("b", 1), true, Some("2024-01-01T12:00:00Z"))),
            Ok(page(records("c", 1), true, Some("2024-01-01T06:00:00Z"))),
            Ok(page(records("d", 1), false, None)),
        ]);
        let pacer = Arc::new(RecordingPacer::default());
        let mut sink = MemorySink::default();

        fetcher(client, pacer.clone())
            .fetch(&window(), &filter(), &mut sink)
            .await;

        let pauses = pacer.pauses.lock().unwrap();
        assert_eq!(pauses.len(), 3);
        assert!(pauses.iter().all(|d| *d >= Duration::from_millis(500)));
    }

    #[tokio::test]
    async fn test_page_limit_stops_misbehaving_server() {
        let responses = (0..10)
            .map(|_| Ok(page(records("x", 1), true, Some("2024-01-01T18:00:00Z"))))
            .collect();
        let client = ScriptedClient::new(responses);
        let settings = FetchSettings {
            max_pages: Some(3),
            ..FetchSettings::default()
        };
        let pacer = Arc::new(RecordingPacer::default());
        let fetcher = PaginatedLogFetcher::new(client.clone(), settings).with_pacer(pacer.clone());
        let mut sink = MemorySink::default();

        let outcome = fetcher.fetch(&window(), &filter(), &mut sink).await;

        assert!(matches!(
            outcome.termination,
            Termination::PageLimitExceeded { limit: 3 }
        ));
        assert_eq!(outcome.pages_fetched, 3);
        assert_eq!(outcome.total_records_written, 3);
        assert_eq!(client.requests().len(), 3);
        // No pause after the last allowed page.
        assert_eq!(pacer.pauses.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_zero_page_limit_sends_no_request() {
        let client = ScriptedClient::new(vec![Ok(page(records("a", 1), false, None))]);
        let settings = FetchSettings {
            max_pages: Some(0),
            ..FetchSettings::default()
        };
        let pacer = Arc::new(RecordingPacer::default());
        let fetcher = PaginatedLogFetcher::new(client.clone(), settings).with_pacer(pacer.clone());
        let mut sink = MemorySink::default();

        let outcome = fetcher.fetch(&window(), &filter(), &mut sink).await;

        assert!(matches!(
            outcome.termination,
            Termination::PageLimitExceeded { limit: 0 }
        ));
        assert!(client.requests().is_empty());
        assert!(pacer.pauses.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_server_cursor_is_sent_back_verbatim() {
        let client = ScriptedClient::new(vec![
            Ok(page(records("a", 1), true, Some("2024-01-01T18:00:00.000Z"))),
            Ok(page(records("b", 1), true, Some("2024-01-01T12:00:00+00:00"))),
            Ok(page(records("c", 1), false, None)),
        ]);
        let mut sink = MemorySink::default();

        fetcher(client.clone(), Arc::new(RecordingPacer::default()))
            .fetch(&window(), &filter(), &mut sink)
            .await;

        let requests = client.requests();
        assert_eq!(requests[1].end, "2024-01-01T18:00:00.000Z");
        assert_eq!(requests[2].end, "2024-01-01T12:00:00+00:00");
    }

    #[tokio::test]
    async fn test_missing_cursor_with_more_pages_is_an_error() {
        let client = ScriptedClient::new(vec![Ok(page(records("a", 2), true, None))]);
        let mut sink = MemorySink::default();

        let outcome = fetcher(client.clone(), Arc::new(RecordingPacer::default()))
            .fetch(&window(), &filter(), &mut sink)
            .await;

        assert!(matches!(
            outcome.termination,
            Termination::Error(FetchError::MissingCursor { field: "nextEndTime" })
        ));
        assert_eq!(outcome.total_records_written, 2);
        assert_eq!(client.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_unparseable_cursor_is_an_error() {
        let client = ScriptedClient::new(vec![Ok(page(records("a", 1), true, Some("yesterday")))]);
        let mut sink = MemorySink::default();

        let outcome = fetcher(client, Arc::new(RecordingPacer::default()))
            .fetch(&window(), &filter(), &mut sink)
            .await;

        match outcome.termination {
            Termination::Error(FetchError::InvalidCursor { value, .. }) => assert_eq!(value, "yesterday"),
            other => panic!("unexpected termination: {}", other),
        }
    }

    #[tokio::test]
    async fn test_sink_failure_stops_fetch() {
        let client = ScriptedClient::new(vec![Ok(page(records("a", 5), false, None))]);
        let mut sink = MemorySink {
            fail_after: Some(3),
            ..MemorySink::default()
        };

        let outcome = fetcher(client, Arc::new(RecordingPacer::default()))
            .fetch(&window(), &filter(), &mut sink)
            .await;

        assert_eq!(outcome.total_records_written, 3);
        assert!(matches!(outcome.termination, Termination::Error(FetchError::Sink(_))));
    }

    #[test]
    fn test_settings_from_default_config() {
        let settings = FetchSettings::default();
        assert_eq!(settings.page_size, 50);
        assert_eq!(settings.region, "ohio");
        assert_eq!(settings.direction, Direction::Backward);
        assert_eq!(settings.page_delay, Duration::from_millis(500));
        assert_eq!(settings.max_pages, Some(10_000));
    }
}
