use std::collections::HashSet;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine;
use serde::Deserialize;
use vantage_contracts::{
    Capability, Role, RoleParse, UiFlagOverrides, UiFlags, aggregate_capabilities, highest_role,
    parse_role,
};

pub mod config;

/// Decoded credential payload. The signature is never checked here; the
/// server is the enforcement point and this layer only extracts claims.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub roles: Vec<String>,
    pub exp: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    roles: Option<Vec<String>>,
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    exp: Option<u64>,
}

/// Decode the payload of a three-segment base64url credential. Fails
/// closed: any malformed input yields `None` with a local warning, never a
/// panic or an error surface.
pub fn parse_credential(token: &str) -> Option<Claims> {
    let segments: Vec<&str> = token.split('.').collect();
    if segments.len() != 3 {
        tracing::warn!(
            segments = segments.len(),
            "credential does not have three segments; treating as anonymous"
        );
        return None;
    }

    let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
    let payload = match engine.decode(segments[1]) {
        Ok(bytes) => bytes,
        Err(_) => {
            tracing::warn!("credential payload is not valid base64url");
            return None;
        }
    };

    let raw: RawClaims = match serde_json::from_slice(&payload) {
        Ok(raw) => raw,
        Err(_) => {
            tracing::warn!("credential payload is not valid JSON");
            return None;
        }
    };

    let sub = raw
        .sub
        .as_deref()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())?
        .to_string();

    let roles = match (raw.roles, raw.role) {
        (Some(roles), _) => roles
            .into_iter()
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .collect(),
        (None, Some(role)) if !role.trim().is_empty() => vec![role.trim().to_string()],
        _ => Vec::new(),
    };

    Some(Claims {
        sub,
        roles,
        exp: raw.exp,
    })
}

pub fn unix_epoch_secs_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs()
}

/// A missing `exp` claim means "never expires" at this layer; the server
/// enforces real lifetimes.
pub fn is_expired(claims: &Claims) -> bool {
    expired_at(claims, unix_epoch_secs_now())
}

pub fn expired_at(claims: &Claims, now_secs: u64) -> bool {
    claims.exp.is_some_and(|exp| exp < now_secs)
}

/// Role strings a set of claims entitles the caller to. Absent or expired
/// claims fall back to the floor role.
pub fn resolve_roles(claims: &Claims) -> Vec<String> {
    if is_expired(claims) {
        tracing::warn!(sub = %claims.sub, "credential expired; degrading to general");
        return vec![Role::General.as_str().to_string()];
    }
    if claims.roles.is_empty() {
        return vec![Role::General.as_str().to_string()];
    }
    claims.roles.clone()
}

/// Derive UI flags from the aggregate capability set, then overlay server
/// overrides key-by-key. Server values win in either direction.
pub fn resolve_ui_flags(roles: &[String], overrides: Option<&UiFlagOverrides>) -> UiFlags {
    let flags = UiFlags::for_capabilities(&aggregate_capabilities(roles));
    match overrides {
        Some(overrides) => flags.apply_overrides(overrides),
        None => flags,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    Token(&'a str),
    ApiKey(&'a str),
}

/// Effective session wired into every other component. Capabilities are
/// aggregated over ALL declared roles, never the primary role alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub roles: Vec<Role>,
    pub primary_role: Role,
    pub capabilities: HashSet<Capability>,
    pub ui_flags: UiFlags,
    pub authenticated: bool,
}

impl Session {
    /// Minimum-privilege session every failure path degrades to.
    pub fn anonymous() -> Self {
        session_from(vec![Role::General.as_str().to_string()], false)
    }
}

/// Compose credential parsing, expiry, role resolution, and flag
/// derivation. Every resolution failure returns the anonymous session;
/// authentication never degrades to an elevated or crashed state.
pub fn build_session(credential: Option<Credential<'_>>, declared_roles: &[String]) -> Session {
    match credential {
        None => Session::anonymous(),
        Some(Credential::Token(token)) => {
            let Some(claims) = parse_credential(token) else {
                return Session::anonymous();
            };
            if is_expired(&claims) {
                tracing::warn!(sub = %claims.sub, "credential expired; building anonymous session");
                return Session::anonymous();
            }
            let mut roles = resolve_roles(&claims);
            roles.extend(declared_roles.iter().cloned());
            session_from(roles, true)
        }
        Some(Credential::ApiKey(key)) => {
            if key.trim().is_empty() {
                return Session::anonymous();
            }
            // An opaque key carries no role claim; roles come from the
            // caller's declaration.
            session_from(declared_roles.to_vec(), true)
        }
    }
}

fn session_from(declared: Vec<String>, authenticated: bool) -> Session {
    let mut roles = Vec::new();
    for raw in &declared {
        match parse_role(raw) {
            RoleParse::Known(role) => {
                if !roles.contains(&role) {
                    roles.push(role);
                }
            }
            RoleParse::Unknown => {
                tracing::debug!(role = %raw, "ignoring unknown declared role");
            }
        }
    }
    if roles.is_empty() {
        roles.push(Role::General);
    }

    let capabilities = aggregate_capabilities(&declared);
    let ui_flags = UiFlags::for_capabilities(&capabilities);

    Session {
        primary_role: highest_role(&declared),
        roles,
        capabilities,
        ui_flags,
        authenticated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine;

    fn forge_token(payload: serde_json::Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let header = engine.encode(br#"{"alg":"RS256","typ":"JWT"}"#);
        let body = engine.encode(payload.to_string().as_bytes());
        format!("{header}.{body}.sig")
    }

    #[test]
    fn parse_credential_extracts_sub_roles_and_exp() {
        let token = forge_token(serde_json::json!({
            "sub": "user_1",
            "roles": ["pro", "ops", " "],
            "exp": 4_102_444_800u64
        }));
        let claims = parse_credential(&token).expect("claims should parse");
        assert_eq!(claims.sub, "user_1");
        assert_eq!(claims.roles, vec!["pro".to_string(), "ops".to_string()]);
        assert_eq!(claims.exp, Some(4_102_444_800));
    }

    #[test]
    fn parse_credential_accepts_singular_role_claim() {
        let token = forge_token(serde_json::json!({ "sub": "user_2", "role": "scholars" }));
        let claims = parse_credential(&token).expect("claims should parse");
        assert_eq!(claims.roles, vec!["scholars".to_string()]);
    }

    #[test]
    fn parse_credential_fails_closed_on_malformed_input() {
        assert!(parse_credential("").is_none());
        assert!(parse_credential("only.two").is_none());
        assert!(parse_credential("a.!!!not-base64!!!.c").is_none());

        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        let not_json = format!("h.{}.s", engine.encode(b"not json at all"));
        assert!(parse_credential(&not_json).is_none());

        let no_sub = forge_token(serde_json::json!({ "roles": ["pro"] }));
        assert!(parse_credential(&no_sub).is_none());
    }

    #[test]
    fn expiry_is_relative_to_the_given_clock_and_optional() {
        let claims = Claims {
            sub: "u".to_string(),
            roles: vec![],
            exp: Some(100),
        };
        assert!(!expired_at(&claims, 100));
        assert!(expired_at(&claims, 101));

        let eternal = Claims {
            sub: "u".to_string(),
            roles: vec![],
            exp: None,
        };
        assert!(!expired_at(&eternal, u64::MAX));
    }

    #[test]
    fn resolve_roles_falls_back_to_general() {
        let empty = Claims {
            sub: "u".to_string(),
            roles: vec![],
            exp: None,
        };
        assert_eq!(resolve_roles(&empty), vec!["general".to_string()]);

        let expired = Claims {
            sub: "u".to_string(),
            roles: vec!["analytics".to_string()],
            exp: Some(1),
        };
        assert_eq!(resolve_roles(&expired), vec!["general".to_string()]);
    }

    #[test]
    fn token_session_aggregates_over_every_declared_role() {
        let token = forge_token(serde_json::json!({
            "sub": "user_3",
            "roles": ["pro", "ops"]
        }));
        let session = build_session(Some(Credential::Token(&token)), &[]);

        assert!(session.authenticated);
        assert_eq!(session.primary_role, Role::Pro);
        assert_eq!(session.roles, vec![Role::Pro, Role::Ops]);
        // Capabilities come from the union, not the primary role alone.
        assert!(session.capabilities.contains(&Capability::ReadLedgerFull));
        assert!(session.capabilities.contains(&Capability::ViewDebug));
        assert!(session.ui_flags.show_debug);
        assert!(session.ui_flags.show_hypothesis);
    }

    #[test]
    fn expired_or_malformed_token_degrades_to_anonymous() {
        let expired = forge_token(serde_json::json!({
            "sub": "user_4",
            "roles": ["analytics"],
            "exp": 1
        }));
        assert_eq!(
            build_session(Some(Credential::Token(&expired)), &[]),
            Session::anonymous()
        );
        assert_eq!(
            build_session(Some(Credential::Token("garbage")), &[]),
            Session::anonymous()
        );
        assert_eq!(build_session(None, &[]), Session::anonymous());
    }

    #[test]
    fn api_key_session_uses_declared_roles() {
        let session = build_session(
            Some(Credential::ApiKey("vk_live_123")),
            &["scholars".to_string()],
        );
        assert!(session.authenticated);
        assert_eq!(session.primary_role, Role::Scholars);

        let blank = build_session(Some(Credential::ApiKey("   ")), &["pro".to_string()]);
        assert_eq!(blank, Session::anonymous());
    }

    #[test]
    fn unknown_declared_roles_are_ignored_not_fatal() {
        let session = build_session(
            Some(Credential::ApiKey("vk_live_123")),
            &["superuser".to_string(), "pro".to_string()],
        );
        assert_eq!(session.roles, vec![Role::Pro]);
        assert_eq!(session.primary_role, Role::Pro);
    }

    #[test]
    fn server_overrides_can_kill_or_elevate_flags() {
        let roles = vec!["general".to_string()];
        let overrides = UiFlagOverrides {
            show_compare: Some(true),
            show_ledger: Some(false),
            ..UiFlagOverrides::default()
        };
        let flags = resolve_ui_flags(&roles, Some(&overrides));
        assert!(flags.show_compare);
        assert!(!flags.show_ledger);

        let untouched = resolve_ui_flags(&roles, None);
        assert!(!untouched.show_compare);
        assert!(untouched.show_ledger);
    }
}
