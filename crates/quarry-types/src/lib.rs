// crates/quarry-types/src/lib.rs
// Shared wire types for Quarry
// No runtime dependencies allowed here beyond serde

use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound on `max_results` accepted from callers
pub const MAX_RESULTS_LIMIT: usize = 100;

// ═══════════════════════════════════════
// REQUEST
// ═══════════════════════════════════════

/// Search engine time filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimeRange {
    Day,
    Week,
    Month,
    Year,
}

impl TimeRange {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Parse a time range, returning None for anything unrecognized
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "day" => Some(Self::Day),
            "week" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" => Some(Self::Year),
            _ => None,
        }
    }
}

/// A user query as submitted to the chat endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub query: String,
    /// Prior session for follow-up questions. A new one is minted when absent.
    #[serde(default)]
    pub session_id: Option<String>,
    /// Run the multi-step planned path
    #[serde(default)]
    pub pro_search: bool,
    #[serde(default)]
    pub time_range: Option<TimeRange>,
    /// Inclusive lower bound, `YYYY-MM-DD`
    #[serde(default)]
    pub start_date: Option<String>,
    /// Inclusive upper bound, `YYYY-MM-DD`
    #[serde(default)]
    pub end_date: Option<String>,
    /// Results requested per search query
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

fn default_max_results() -> usize {
    10
}

impl ChatRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
            pro_search: false,
            time_range: None,
            start_date: None,
            end_date: None,
            max_results: default_max_results(),
        }
    }

    pub fn with_pro_search(mut self, pro: bool) -> Self {
        self.pro_search = pro;
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Check caller-supplied fields before any provider is touched
    pub fn validate(&self) -> Result<(), String> {
        if self.query.trim().is_empty() {
            return Err("query must not be empty".to_string());
        }
        if self.max_results == 0 || self.max_results > MAX_RESULTS_LIMIT {
            return Err(format!(
                "max_results must be between 1 and {}, got {}",
                MAX_RESULTS_LIMIT, self.max_results
            ));
        }
        for (name, date) in [("start_date", &self.start_date), ("end_date", &self.end_date)] {
            if let Some(d) = date {
                if !is_iso_date(d) {
                    return Err(format!("{} must be YYYY-MM-DD, got {:?}", name, d));
                }
            }
        }
        Ok(())
    }
}

fn is_iso_date(s: &str) -> bool {
    let bytes = s.as_bytes();
    bytes.len() == 10
        && bytes[4] == b'-'
        && bytes[7] == b'-'
        && bytes
            .iter()
            .enumerate()
            .all(|(i, b)| i == 4 || i == 7 || b.is_ascii_digit())
}

// ═══════════════════════════════════════
// SEARCH RESULTS
// ═══════════════════════════════════════

/// One web search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
}

impl SearchHit {
    pub fn new(title: impl Into<String>, url: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            url: url.into(),
            content: content.into(),
            published_date: None,
        }
    }
}

/// Prompt-facing rendering of a hit
impl fmt::Display for SearchHit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Title: {}\nURL: {}\n Summary: {}", self.title, self.url, self.content)
    }
}

/// Hits plus image URLs for one query (or an aggregate of several)
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchBatch {
    #[serde(default)]
    pub hits: Vec<SearchHit>,
    #[serde(default)]
    pub images: Vec<String>,
}

// ═══════════════════════════════════════
// STREAM EVENTS
// ═══════════════════════════════════════

/// Event delivered to the caller while a query is answered.
///
/// Serialized as `{"event": "<kind>", "data": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum StreamEvent {
    /// Planned steps, in execution order
    #[serde(rename = "agent-query-plan")]
    Plan { steps: Vec<String> },

    /// Search queries generated for a step
    #[serde(rename = "agent-search-queries")]
    StepQueries { step_number: u32, queries: Vec<String> },

    /// Deduplicated hits gathered for a step
    #[serde(rename = "agent-read-results")]
    StepResults { step_number: u32, results: Vec<SearchHit> },

    /// All search steps are done; synthesis follows
    #[serde(rename = "agent-finish")]
    AgentFinishPlanning {},

    /// Answer synthesis is starting for this query
    #[serde(rename = "begin-stream")]
    BeginStream { query: String },

    /// Sources used for the answer
    #[serde(rename = "search-results")]
    SearchResults { results: Vec<SearchHit>, images: Vec<String> },

    #[serde(rename = "text-chunk")]
    TextDelta { text: String },

    #[serde(rename = "related-queries")]
    RelatedQueries { related_queries: Vec<String> },

    /// Full answer text, repeated once streaming is done
    #[serde(rename = "final-response")]
    FinalText { message: String },

    /// Always the last event of a request
    #[serde(rename = "stream-end")]
    StreamEnd { session_id: String },

    #[serde(rename = "error")]
    Error { detail: String },
}

impl StreamEvent {
    /// Wire name of the event kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Plan { .. } => "agent-query-plan",
            Self::StepQueries { .. } => "agent-search-queries",
            Self::StepResults { .. } => "agent-read-results",
            Self::AgentFinishPlanning {} => "agent-finish",
            Self::BeginStream { .. } => "begin-stream",
            Self::SearchResults { .. } => "search-results",
            Self::TextDelta { .. } => "text-chunk",
            Self::RelatedQueries { .. } => "related-queries",
            Self::FinalText { .. } => "final-response",
            Self::StreamEnd { .. } => "stream-end",
            Self::Error { .. } => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::StreamEnd { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ============================================================================
    // ChatRequest tests
    // ============================================================================

    #[test]
    fn test_chat_request_defaults() {
        let json = r#"{"query": "rust async"}"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.query, "rust async");
        assert!(!req.pro_search);
        assert_eq!(req.max_results, 10);
        assert!(req.session_id.is_none());
        assert!(req.time_range.is_none());
    }

    #[test]
    fn test_chat_request_full() {
        let json = r#"{
            "query": "Compare A and B",
            "session_id": "abc",
            "pro_search": true,
            "time_range": "week",
            "start_date": "2024-01-01",
            "end_date": "2024-06-30",
            "max_results": 25
        }"#;
        let req: ChatRequest = serde_json::from_str(json).unwrap();
        assert!(req.pro_search);
        assert_eq!(req.time_range, Some(TimeRange::Week));
        assert_eq!(req.max_results, 25);
        assert_eq!(req.start_date.as_deref(), Some("2024-01-01"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_input() {
        assert!(ChatRequest::new("   ").validate().is_err());

        let mut req = ChatRequest::new("q");
        req.max_results = 0;
        assert!(req.validate().is_err());
        req.max_results = 101;
        assert!(req.validate().is_err());

        let mut req = ChatRequest::new("q");
        req.start_date = Some("01/02/2024".into());
        assert!(req.validate().unwrap_err().contains("start_date"));
    }

    #[test]
    fn test_time_range_parse() {
        assert_eq!(TimeRange::parse("Month"), Some(TimeRange::Month));
        assert_eq!(TimeRange::parse("decade"), None);
        assert_eq!(TimeRange::Year.as_str(), "year");
    }

    // ============================================================================
    // SearchHit tests
    // ============================================================================

    #[test]
    fn test_search_hit_display() {
        let hit = SearchHit::new("Title", "https://a.example", "Body");
        assert_eq!(hit.to_string(), "Title: Title\nURL: https://a.example\n Summary: Body");
    }

    #[test]
    fn test_search_hit_omits_missing_date() {
        let hit = SearchHit::new("t", "u", "c");
        let json = serde_json::to_string(&hit).unwrap();
        assert!(!json.contains("published_date"));
    }

    // ============================================================================
    // StreamEvent tests
    // ============================================================================

    #[test]
    fn test_stream_event_wire_shape() {
        let event = StreamEvent::TextDelta { text: "hi".into() };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "text-chunk");
        assert_eq!(json["data"]["text"], "hi");
    }

    #[test]
    fn test_stream_event_kind_matches_serde_tag() {
        let events = vec![
            StreamEvent::Plan { steps: vec![] },
            StreamEvent::StepQueries { step_number: 0, queries: vec![] },
            StreamEvent::StepResults { step_number: 0, results: vec![] },
            StreamEvent::AgentFinishPlanning {},
            StreamEvent::BeginStream { query: "q".into() },
            StreamEvent::SearchResults { results: vec![], images: vec![] },
            StreamEvent::TextDelta { text: "t".into() },
            StreamEvent::RelatedQueries { related_queries: vec![] },
            StreamEvent::FinalText { message: "m".into() },
            StreamEvent::StreamEnd { session_id: "s".into() },
            StreamEvent::Error { detail: "d".into() },
        ];
        for event in events {
            let json = serde_json::to_value(&event).unwrap();
            assert_eq!(json["event"], event.kind());
            let back: StreamEvent = serde_json::from_value(json).unwrap();
            assert_eq!(back, event);
        }
    }

    #[test]
    fn test_only_stream_end_is_terminal() {
        assert!(StreamEvent::StreamEnd { session_id: "s".into() }.is_terminal());
        assert!(!StreamEvent::Error { detail: "x".into() }.is_terminal());
    }
}
