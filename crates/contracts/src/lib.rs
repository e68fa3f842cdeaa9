use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod role;

pub use role::{
    Capability, Role, RoleParse, UiFlagOverrides, UiFlags, aggregate_capabilities,
    capabilities_of, has_capability, highest_role, parse_role,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TraceStatus {
    Success,
    Error,
    Skipped,
}

impl TraceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TraceStatus::Success => "success",
            TraceStatus::Error => "error",
            TraceStatus::Skipped => "skipped",
        }
    }
}

/// One step of the process trace ("ledger") attached to an answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLine {
    pub step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TraceStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_provenance: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Map<String, Value>>,
}

/// A retrieved evidence snippet backing an answer or a stance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_external: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_id: Option<String>,
}

impl EvidenceItem {
    /// An item is externally sourced when the backend flags it as such or
    /// when it carries a URL at all.
    pub fn is_external(&self) -> bool {
        self.is_external == Some(true) || self.url.is_some()
    }
}

/// Two-stance comparison attached to an answer. Stance text is free-form
/// and is never redacted; only the evidence arrays are policy-governed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompareSummary {
    pub stance_a: String,
    pub stance_b: String,
    pub evidence_a: Vec<EvidenceItem>,
    pub evidence_b: Vec<EvidenceItem>,
}

/// Payload shape produced by the chat/debug/compare backend endpoints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_trace_summary: Option<Vec<TraceLine>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<Vec<EvidenceItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_summary: Option<CompareSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_applied: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_response_parses_with_all_sections_absent() {
        let response: ChatResponse =
            serde_json::from_value(serde_json::json!({ "answer": "ok" }))
                .expect("minimal response should parse");
        assert_eq!(response.answer, "ok");
        assert!(response.process_trace_summary.is_none());
        assert!(response.evidence.is_none());
        assert!(response.compare_summary.is_none());
        assert!(response.role_applied.is_none());
    }

    #[test]
    fn evidence_item_external_when_url_present_even_without_flag() {
        let item: EvidenceItem = serde_json::from_value(serde_json::json!({
            "text": "snippet",
            "url": "https://example.org/page"
        }))
        .expect("item should parse");
        assert!(item.is_external());

        let internal: EvidenceItem =
            serde_json::from_value(serde_json::json!({ "text": "snippet" }))
                .expect("item should parse");
        assert!(!internal.is_external());
    }

    #[test]
    fn trace_line_round_trips_safe_metadata() {
        let line: TraceLine = serde_json::from_value(serde_json::json!({
            "step": "retrieval",
            "duration_ms": 12,
            "status": "success",
            "metadata": { "index": "corpus_v2" }
        }))
        .expect("line should parse");
        let metadata = line.metadata.as_ref().expect("metadata should survive");
        assert_eq!(metadata.get("index"), Some(&serde_json::json!("corpus_v2")));
    }
}
