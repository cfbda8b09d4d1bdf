use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::warn;

/// GraphQL document sent with every page request.
pub const LOGS_QUERY: &str = r#"
query logs($query: LogQueryInput!) {
  logs(query: $query) {
    logs {
      id
      labels {
        label
        value
      }
      timestamp
      text
    }
    nextEndTime
    nextStartTime
    hasMore
  }
}
"#;

/// Requested time range for one fetch session.
///
/// `start < end` is not checked here; an inverted window just produces an
/// empty first page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterField {
    Service,
    LogType,
    Instance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilterOperator {
    Includes,
    Excludes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterClause {
    pub field: FilterField,
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

/// Filter criteria, fixed for a whole fetch session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogFilter {
    clauses: Vec<FilterClause>,
}

impl LogFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// One SERVICE clause for `service_id` and one LOG_TYPE clause for `log_types`.
    pub fn for_service(service_id: impl Into<String>, log_types: &[String]) -> Self {
        Self::new()
            .with_clause(FilterField::Service, FilterOperator::Includes, vec![service_id.into()])
            .with_clause(FilterField::LogType, FilterOperator::Includes, log_types.to_vec())
    }

    pub fn with_clause(
        mut self,
        field: FilterField,
        operator: FilterOperator,
        values: Vec<String>,
    ) -> Self {
        self.clauses.push(FilterClause {
            field,
            operator,
            values,
        });
        self
    }

    pub fn clauses(&self) -> &[FilterClause] {
        &self.clauses
    }
}

/// Pagination direction understood by the log API.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Direction {
    #[default]
    #[serde(alias = "backward")]
    Backward,
    #[serde(alias = "forward")]
    Forward,
}

/// Variables of a single page request.
///
/// `start` and `end` hold RFC 3339 text so a cursor returned by the server is
/// sent back exactly as received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogQueryRequest {
    pub start: String,
    pub end: String,
    pub filters: Vec<FilterClause>,
    pub owner_id: String,
    pub page_size: u32,
    pub region: String,
    pub direction: Direction,
}

#[derive(Debug, Serialize)]
pub struct GraphqlRequest<'a> {
    pub query: &'static str,
    pub variables: QueryVariables<'a>,
}

#[derive(Debug, Serialize)]
pub struct QueryVariables<'a> {
    pub query: &'a LogQueryRequest,
}

impl<'a> GraphqlRequest<'a> {
    pub fn logs(request: &'a LogQueryRequest) -> Self {
        Self {
            query: LOGS_QUERY,
            variables: QueryVariables { query: request },
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogLabel {
    #[serde(default, deserialize_with = "lenient_string")]
    pub label: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub value: String,
}

/// One log entry as returned by the API.
///
/// Only `timestamp` and `text` are written out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(default, deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(default, deserialize_with = "lenient")]
    pub labels: Vec<LogLabel>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub timestamp: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub text: String,
}

impl LogRecord {
    pub fn new(timestamp: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            text: text.into(),
            ..Default::default()
        }
    }
}

/// One page of results plus the continuation cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogPage {
    #[serde(default, deserialize_with = "lenient_records")]
    pub logs: Vec<LogRecord>,
    #[serde(default, deserialize_with = "lenient")]
    pub next_start_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub next_end_time: Option<String>,
    #[serde(default, deserialize_with = "lenient")]
    pub has_more: bool,
}

impl LogPage {
    /// The page reported for an unusable response body.
    pub fn empty() -> Self {
        Self::default()
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct GraphqlResponse {
    #[serde(default, deserialize_with = "lenient")]
    pub data: Option<LogsData>,
    #[serde(default, deserialize_with = "lenient")]
    pub errors: Vec<GraphqlError>,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsData {
    #[serde(default, deserialize_with = "lenient")]
    pub logs: Option<LogPage>,
}

#[derive(Debug, Deserialize)]
pub struct GraphqlError {
    #[serde(default, deserialize_with = "lenient_string")]
    pub message: String,
}

/// Falls back to `T::default()` for a null or wrongly typed value instead of
/// failing the surrounding document.
fn lenient<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned + Default,
{
    let value = Value::deserialize(deserializer)?;
    Ok(serde_json::from_value(value).unwrap_or_default())
}

/// Strings pass through, numbers and booleans are rendered, anything else is empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    })
}

/// Decodes each entry on its own so one unusable record cannot drop the page.
fn lenient_records<'de, D>(deserializer: D) -> Result<Vec<LogRecord>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        Value::Null => return Ok(Vec::new()),
        other => {
            warn!(kind = json_kind(&other), "Expected a list of log records, ignoring");
            return Ok(Vec::new());
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<LogRecord>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!(error = %e, "Skipping unreadable log record");
                None
            }
        })
        .collect())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// Renders `[<timestamp>] <text>\n`.
pub fn format_record(record: &LogRecord) -> String {
    format!("[{}] {}\n", record.timestamp, record.text)
}

/// Renders the delimiter written at the start of every fetch session.
pub fn format_session_header(window: &TimeWindow) -> String {
    format!(
        "=== LOGS FROM {} TO {} ===\n\n",
        format_timestamp(&window.start),
        format_timestamp(&window.end)
    )
}
