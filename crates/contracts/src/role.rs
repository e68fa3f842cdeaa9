use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Console role. Lowercase on the wire and in credential claims.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    General,
    Pro,
    Scholars,
    Analytics,
    Ops,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::General => "general",
            Role::Pro => "pro",
            Role::Scholars => "scholars",
            Role::Analytics => "analytics",
            Role::Ops => "ops",
        }
    }
}

/// Result of parsing a free-form role string. Credential claims carry
/// arbitrary strings; callers must handle `Unknown` explicitly rather than
/// assume a successfully-extracted claim names a real role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleParse {
    Known(Role),
    Unknown,
}

pub fn parse_role(raw: &str) -> RoleParse {
    match raw.trim() {
        "general" => RoleParse::Known(Role::General),
        "pro" => RoleParse::Known(Role::Pro),
        "scholars" => RoleParse::Known(Role::Scholars),
        "analytics" => RoleParse::Known(Role::Analytics),
        "ops" => RoleParse::Known(Role::Ops),
        _ => RoleParse::Unknown,
    }
}

/// Atomic named permission, independent of role naming.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Capability {
    ReadLedgerFull,
    ProposeHypothesis,
    ProposeAura,
    WriteGraph,
    ViewDebug,
}

impl Capability {
    pub fn as_str(self) -> &'static str {
        match self {
            Capability::ReadLedgerFull => "READ_LEDGER_FULL",
            Capability::ProposeHypothesis => "PROPOSE_HYPOTHESIS",
            Capability::ProposeAura => "PROPOSE_AURA",
            Capability::WriteGraph => "WRITE_GRAPH",
            Capability::ViewDebug => "VIEW_DEBUG",
        }
    }
}

/// Role priority, highest first. Privilege is not derivable from the grant
/// table alone (scholars and analytics share ledger access but differ on
/// write capabilities), so the order is fixed here rather than inferred.
/// `highest_role` returns the first declared role found in this list.
pub const ROLE_PRIORITY: [Role; 5] = [
    Role::Analytics,
    Role::Scholars,
    Role::Pro,
    Role::General,
    Role::Ops,
];

/// Static, total grant table. Unknown roles are handled by `parse_role`
/// before this is consulted, so every arm is a fixed slice.
pub const fn capabilities_of(role: Role) -> &'static [Capability] {
    match role {
        Role::General => &[],
        Role::Pro => &[
            Capability::ReadLedgerFull,
            Capability::ProposeHypothesis,
            Capability::ProposeAura,
        ],
        Role::Scholars => &[Capability::ReadLedgerFull],
        Role::Analytics => &[
            Capability::ReadLedgerFull,
            Capability::ProposeHypothesis,
            Capability::ProposeAura,
            Capability::WriteGraph,
        ],
        Role::Ops => &[Capability::ViewDebug],
    }
}

pub fn has_capability(role: Role, capability: Capability) -> bool {
    capabilities_of(role).contains(&capability)
}

/// Union of capabilities over every declared role string that parses to a
/// known role. Unknown strings contribute nothing and abort nothing.
pub fn aggregate_capabilities(roles: &[String]) -> HashSet<Capability> {
    let mut out = HashSet::new();
    for raw in roles {
        match parse_role(raw) {
            RoleParse::Known(role) => out.extend(capabilities_of(role).iter().copied()),
            RoleParse::Unknown => {}
        }
    }
    out
}

/// Primary role for a set of declared role strings: the first entry of
/// `ROLE_PRIORITY` present in the set. Empty or all-unknown input resolves
/// to `general`.
pub fn highest_role(roles: &[String]) -> Role {
    let mut declared = HashSet::new();
    for raw in roles {
        match parse_role(raw) {
            RoleParse::Known(role) => {
                declared.insert(role);
            }
            RoleParse::Unknown => {}
        }
    }

    for role in ROLE_PRIORITY {
        if declared.contains(&role) {
            return role;
        }
    }
    Role::General
}

/// Per-session UI feature flags, derived from the capability set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiFlags {
    pub show_ledger: bool,
    pub show_compare: bool,
    pub show_badges: bool,
    pub show_debug: bool,
    pub show_graph: bool,
    pub show_contradictions: bool,
    pub show_hypothesis: bool,
    pub show_aura: bool,
}

impl UiFlags {
    /// The ledger and badge panels exist for every role; how much they show
    /// is governed by redaction policy, not by flags. Everything else keys
    /// off a capability.
    pub fn for_capabilities(capabilities: &HashSet<Capability>) -> Self {
        let full_ledger = capabilities.contains(&Capability::ReadLedgerFull);
        Self {
            show_ledger: true,
            show_compare: full_ledger,
            show_badges: true,
            show_debug: capabilities.contains(&Capability::ViewDebug),
            show_graph: capabilities.contains(&Capability::WriteGraph),
            show_contradictions: full_ledger,
            show_hypothesis: capabilities.contains(&Capability::ProposeHypothesis),
            show_aura: capabilities.contains(&Capability::ProposeAura),
        }
    }

    /// Overlay server-provided overrides key-by-key. The server wins in
    /// either direction: it may kill a flag the capability set enables, or
    /// force one on (backend kill-switches take precedence).
    pub fn apply_overrides(self, overrides: &UiFlagOverrides) -> Self {
        Self {
            show_ledger: overrides.show_ledger.unwrap_or(self.show_ledger),
            show_compare: overrides.show_compare.unwrap_or(self.show_compare),
            show_badges: overrides.show_badges.unwrap_or(self.show_badges),
            show_debug: overrides.show_debug.unwrap_or(self.show_debug),
            show_graph: overrides.show_graph.unwrap_or(self.show_graph),
            show_contradictions: overrides
                .show_contradictions
                .unwrap_or(self.show_contradictions),
            show_hypothesis: overrides.show_hypothesis.unwrap_or(self.show_hypothesis),
            show_aura: overrides.show_aura.unwrap_or(self.show_aura),
        }
    }
}

/// Partial flag record sent by the server; absent keys leave the derived
/// value in place.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UiFlagOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_ledger: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_compare: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_badges: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_debug: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_graph: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_contradictions: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_hypothesis: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub show_aura: Option<bool>,
}
