use serde_json::Map;
use vantage_contracts::{ChatResponse, CompareSummary, EvidenceItem, Role, TraceLine};

use crate::policy_for;

/// Metadata sub-keys that never leave the backend boundary. Matched
/// case-insensitively so a differently-cased key cannot slip through.
pub const INTERNAL_METADATA_KEYS: [&str; 3] = ["internal_id", "db_refs", "raw_output"];

const ELLIPSIS: &str = "...";

pub(crate) fn is_internal_metadata_key(key: &str) -> bool {
    INTERNAL_METADATA_KEYS
        .iter()
        .any(|internal| internal.eq_ignore_ascii_case(key))
}

/// Project the ledger down to what `role` may see: the first
/// `max_ledger_lines` lines in original order, with prompt and provenance
/// fields removed where policy hides them. Retained fields pass through
/// unchanged.
pub fn redact_ledger(lines: &[TraceLine], role: Role) -> Vec<TraceLine> {
    let policy = policy_for(role);
    let keep = policy.max_ledger_lines.unwrap_or(lines.len());

    lines
        .iter()
        .take(keep)
        .map(|line| {
            let mut out = line.clone();
            if !policy.show_raw_prompts {
                out.prompt = None;
            }
            if !policy.show_provenance {
                out.provenance = None;
                out.raw_provenance = None;
                if let Some(metadata) = out.metadata.as_mut() {
                    let retained: Map<_, _> = metadata
                        .iter()
                        .filter(|(key, _)| !is_internal_metadata_key(key))
                        .map(|(key, value)| (key.clone(), value.clone()))
                        .collect();
                    *metadata = retained;
                }
            }
            out
        })
        .collect()
}

/// Redact a single evidence item, or drop it entirely. External items are
/// dropped when the role may not see external evidence; otherwise the text
/// is capped at the label's snippet limit and, for external items, internal
/// cross-reference ids are stripped regardless of role.
pub fn redact_evidence_item(item: &EvidenceItem, role: Role) -> Option<EvidenceItem> {
    let policy = policy_for(role);
    let external = item.is_external();

    if external && !policy.allow_external_evidence {
        return None;
    }

    let mut out = item.clone();
    if external {
        out.chunk_id = None;
        out.memory_id = None;
    }

    let limit = policy.snippet_limit_for(item.label.as_deref());
    out.text = truncate_snippet(&out.text, limit);
    Some(out)
}

/// Map `redact_evidence_item` over the array. `None` means nothing
/// survived, so callers treat "no evidence" and "all evidence stripped"
/// uniformly.
pub fn redact_evidence(items: &[EvidenceItem], role: Role) -> Option<Vec<EvidenceItem>> {
    let out: Vec<EvidenceItem> = items
        .iter()
        .filter_map(|item| redact_evidence_item(item, role))
        .collect();
    if out.is_empty() { None } else { Some(out) }
}

/// Stance text passes through verbatim; only the evidence arrays are
/// policy-governed.
pub fn redact_compare_summary(summary: &CompareSummary, role: Role) -> CompareSummary {
    CompareSummary {
        stance_a: summary.stance_a.clone(),
        stance_b: summary.stance_b.clone(),
        evidence_a: redact_evidence(&summary.evidence_a, role).unwrap_or_default(),
        evidence_b: redact_evidence(&summary.evidence_b, role).unwrap_or_default(),
    }
}

/// Apply the full policy to a chat response and stamp the role that ran,
/// so downstream consumers can confirm which policy produced the payload.
pub fn redact_chat_response(response: &ChatResponse, role: Role) -> ChatResponse {
    ChatResponse {
        answer: response.answer.clone(),
        process_trace_summary: response
            .process_trace_summary
            .as_deref()
            .map(|lines| redact_ledger(lines, role)),
        evidence: response
            .evidence
            .as_deref()
            .and_then(|items| redact_evidence(items, role)),
        compare_summary: response
            .compare_summary
            .as_ref()
            .map(|summary| redact_compare_summary(summary, role)),
        role_applied: Some(role.as_str().to_string()),
    }
}

/// Cap `text` at `limit` characters. Truncated text ends in `...` and is
/// exactly `limit` characters long.
fn truncate_snippet(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    if limit <= ELLIPSIS.len() {
        return text.chars().take(limit).collect();
    }
    let mut out: String = text.chars().take(limit - ELLIPSIS.len()).collect();
    out.push_str(ELLIPSIS);
    out
}
