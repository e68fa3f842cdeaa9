use serde_json::{Map, Value};
use vantage_contracts::{ChatResponse, CompareSummary, EvidenceItem, Role, TraceLine};
use vantage_telemetry::OneShotTracker;

use crate::policy_for;
use crate::redact::{is_internal_metadata_key, redact_chat_response};

/// Telemetry event emitted when the backend shipped content the caller's
/// role is not entitled to.
pub const REDACTION_FAILURE_EVENT: &str = "redaction_failure";

/// Which response substructure violated policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedactionKind {
    Ledger,
    Evidence,
    Compare,
}

impl RedactionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RedactionKind::Ledger => "ledger",
            RedactionKind::Evidence => "evidence",
            RedactionKind::Compare => "compare",
        }
    }
}

/// A ledger is compliant when it fits the role's line cap and no retained
/// line carries a field the policy hides. The checks mirror `redact_ledger`
/// exactly, so a repaired payload always validates.
pub fn is_ledger_compliant(lines: &[TraceLine], role: Role) -> bool {
    let policy = policy_for(role);

    if let Some(max) = policy.max_ledger_lines
        && lines.len() > max
    {
        return false;
    }

    lines.iter().all(|line| {
        if !policy.show_raw_prompts && line.prompt.is_some() {
            return false;
        }
        if !policy.show_provenance {
            if line.provenance.is_some() || line.raw_provenance.is_some() {
                return false;
            }
            if let Some(metadata) = line.metadata.as_ref()
                && metadata.keys().any(|key| is_internal_metadata_key(key))
            {
                return false;
            }
        }
        true
    })
}

pub fn is_evidence_compliant(items: &[EvidenceItem], role: Role) -> bool {
    let policy = policy_for(role);

    items.iter().all(|item| {
        if item.is_external() {
            if !policy.allow_external_evidence {
                return false;
            }
            if item.chunk_id.is_some() || item.memory_id.is_some() {
                return false;
            }
        }
        item.text.chars().count() <= policy.snippet_limit_for(item.label.as_deref())
    })
}

pub fn is_compare_compliant(summary: &CompareSummary, role: Role) -> bool {
    is_evidence_compliant(&summary.evidence_a, role)
        && is_evidence_compliant(&summary.evidence_b, role)
}

/// `true` means the response is already safe to render as-is for `role`.
pub fn validate_redaction(response: &ChatResponse, role: Role) -> bool {
    violations(response, role).is_empty()
}

fn violations(response: &ChatResponse, role: Role) -> Vec<RedactionKind> {
    let mut out = Vec::new();

    if let Some(lines) = response.process_trace_summary.as_deref()
        && !is_ledger_compliant(lines, role)
    {
        out.push(RedactionKind::Ledger);
    }
    if let Some(items) = response.evidence.as_deref()
        && !is_evidence_compliant(items, role)
    {
        out.push(RedactionKind::Evidence);
    }
    if let Some(summary) = response.compare_summary.as_ref()
        && !is_compare_compliant(summary, role)
    {
        out.push(RedactionKind::Compare);
    }

    out
}

/// Defense-in-depth entry point: check the already-received response, emit
/// one report per violated kind, and return a policy-compliant payload
/// regardless of whether any report was delivered. Reporting must never
/// block content delivery.
pub fn redact_chat_response_with_telemetry(
    response: &ChatResponse,
    role: Role,
    tracker: &OneShotTracker,
) -> ChatResponse {
    for kind in violations(response, role) {
        tracing::warn!(
            role = role.as_str(),
            kind = kind.as_str(),
            "backend shipped under-redacted content; repairing client-side"
        );
        report_redaction_failure(tracker, role, kind);
    }

    redact_chat_response(response, role)
}

fn report_redaction_failure(tracker: &OneShotTracker, role: Role, kind: RedactionKind) {
    let mut properties = Map::new();
    properties.insert(
        "role".to_string(),
        Value::String(role.as_str().to_string()),
    );
    properties.insert(
        "kind".to_string(),
        Value::String(kind.as_str().to_string()),
    );
    tracker.track(REDACTION_FAILURE_EVENT, properties, Some(kind.as_str()));
}
