pub mod client;
pub mod fetcher;
pub mod pacer;
pub mod types;

pub use client::{bearer_header, FetchError, GraphqlLogClient, LogQueryClient};
pub use fetcher::{FetchOutcome, FetchSettings, PaginatedLogFetcher, Termination};
pub use pacer::{Pacer, TokioPacer};
pub use types::{Direction, LogFilter, LogPage, LogQueryRequest, LogRecord, TimeWindow};
