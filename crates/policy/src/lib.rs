use vantage_contracts::{Role, RoleParse, parse_role};

pub mod redact;
pub mod validate;

pub use redact::{
    INTERNAL_METADATA_KEYS, redact_chat_response, redact_compare_summary, redact_evidence,
    redact_evidence_item, redact_ledger,
};
pub use validate::{
    RedactionKind, is_compare_compliant, is_evidence_compliant, is_ledger_compliant,
    redact_chat_response_with_telemetry, validate_redaction,
};

/// Per-role redaction rules. Exactly one policy exists per role; all of
/// them are immutable constants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedactionPolicy {
    /// `None` means unbounded: the ledger is never truncated.
    pub max_ledger_lines: Option<usize>,
    pub show_raw_prompts: bool,
    pub show_provenance: bool,
    pub allow_external_evidence: bool,
    /// Per-label snippet caps, consulted before `default_snippet_limit`.
    pub snippet_limits_by_label: &'static [(&'static str, usize)],
    pub default_snippet_limit: usize,
}

impl RedactionPolicy {
    /// Applicable snippet cap for an item label, in characters.
    pub fn snippet_limit_for(&self, label: Option<&str>) -> usize {
        if let Some(label) = label {
            for (candidate, limit) in self.snippet_limits_by_label {
                if *candidate == label {
                    return *limit;
                }
            }
        }
        self.default_snippet_limit
    }
}

const GENERAL_POLICY: RedactionPolicy = RedactionPolicy {
    max_ledger_lines: Some(4),
    show_raw_prompts: false,
    show_provenance: false,
    allow_external_evidence: false,
    snippet_limits_by_label: &[],
    default_snippet_limit: 400,
};

const PRO_POLICY: RedactionPolicy = RedactionPolicy {
    max_ledger_lines: None,
    show_raw_prompts: false,
    show_provenance: false,
    allow_external_evidence: true,
    snippet_limits_by_label: &[("Wikipedia", 800)],
    default_snippet_limit: 1200,
};

const SCHOLARS_POLICY: RedactionPolicy = RedactionPolicy {
    max_ledger_lines: None,
    show_raw_prompts: false,
    show_provenance: true,
    allow_external_evidence: true,
    snippet_limits_by_label: &[("Wikipedia", 2000)],
    default_snippet_limit: 4000,
};

const ANALYTICS_POLICY: RedactionPolicy = RedactionPolicy {
    max_ledger_lines: None,
    show_raw_prompts: true,
    show_provenance: true,
    allow_external_evidence: true,
    snippet_limits_by_label: &[],
    default_snippet_limit: 8000,
};

// Ops holds no content capabilities; its view is capped like general's.
const OPS_POLICY: RedactionPolicy = RedactionPolicy {
    max_ledger_lines: Some(4),
    show_raw_prompts: false,
    show_provenance: false,
    allow_external_evidence: false,
    snippet_limits_by_label: &[],
    default_snippet_limit: 400,
};

pub const fn policy_for(role: Role) -> &'static RedactionPolicy {
    match role {
        Role::General => &GENERAL_POLICY,
        Role::Pro => &PRO_POLICY,
        Role::Scholars => &SCHOLARS_POLICY,
        Role::Analytics => &ANALYTICS_POLICY,
        Role::Ops => &OPS_POLICY,
    }
}

/// Policy lookup from a raw role string. Unrecognized strings fall back to
/// the most restrictive policy rather than erroring.
pub fn policy_for_declared(raw: &str) -> &'static RedactionPolicy {
    match parse_role(raw) {
        RoleParse::Known(role) => policy_for(role),
        RoleParse::Unknown => &GENERAL_POLICY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_role_string_gets_the_general_policy() {
        assert_eq!(policy_for_declared("not_a_real_role"), &GENERAL_POLICY);
        assert_eq!(policy_for_declared("pro"), &PRO_POLICY);
    }

    #[test]
    fn snippet_limit_prefers_label_entry_over_default() {
        let policy = policy_for(Role::Pro);
        assert_eq!(policy.snippet_limit_for(Some("Wikipedia")), 800);
        assert_eq!(policy.snippet_limit_for(Some("Archive")), 1200);
        assert_eq!(policy.snippet_limit_for(None), 1200);
    }

    #[test]
    fn ledger_caps_are_monotonic_with_ledger_capability() {
        assert_eq!(policy_for(Role::General).max_ledger_lines, Some(4));
        assert_eq!(policy_for(Role::Ops).max_ledger_lines, Some(4));
        for role in [Role::Pro, Role::Scholars, Role::Analytics] {
            assert_eq!(policy_for(role).max_ledger_lines, None);
        }
    }
}
