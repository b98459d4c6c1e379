//! Per-project secret derivation and the versioned key-id.
//!
//! Each project signs with `HMAC-SHA256(master_secret,
//! "bradax-jwt-v1::" + lower(project_id))`. Derived secrets exist only in
//! memory; the single master secret is the only stored key material. The
//! `kid` header names the project and the derivation version so a future
//! `v2` can rotate without breaking the validation path.

use hmac::{Hmac, Mac};
use sha2::Sha256;

/// Domain-separation prefix for the v1 derivation.
const DERIVATION_CONTEXT: &str = "bradax-jwt-v1::";

/// The only key-id version this build issues or accepts.
pub const KID_VERSION: u8 = 1;

/// Derive the 32-byte signing secret for a project.
#[must_use]
pub fn derive_project_secret(master_secret: &[u8], project_id: &str) -> [u8; 32] {
    let mut mac = Hmac::<Sha256>::new_from_slice(master_secret)
        .expect("HMAC accepts keys of any length");
    mac.update(DERIVATION_CONTEXT.as_bytes());
    mac.update(project_id.to_lowercase().as_bytes());
    mac.finalize().into_bytes().into()
}

// ── Kid ────────────────────────────────────────────────────────────────

/// Parsed key-id of shape `p:<project_id>:v<n>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kid {
    /// Project the token was derived for.
    pub project_id: String,
    /// Derivation version.
    pub version: u8,
}

impl Kid {
    /// Key-id for a project under the current derivation version.
    #[must_use]
    pub fn current(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_lowercase(),
            version: KID_VERSION,
        }
    }

    /// Parse a `kid` header value. Returns `None` on any shape violation.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let rest = raw.strip_prefix("p:")?;
        let (project_id, version) = rest.rsplit_once(":v")?;
        if project_id.is_empty() {
            return None;
        }
        let version: u8 = version.parse().ok()?;
        Some(Self {
            project_id: project_id.to_string(),
            version,
        })
    }
}

impl std::fmt::Display for Kid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "p:{}:v{}", self.project_id, self.version)
    }
}

// ── Tests ──────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic_and_case_folded() {
        let master = b"0123456789abcdef0123456789abcdef";
        let a = derive_project_secret(master, "proj_a");
        let b = derive_project_secret(master, "PROJ_A");
        assert_eq!(a, b);
    }

    #[test]
    fn different_projects_get_different_secrets() {
        let master = b"0123456789abcdef0123456789abcdef";
        assert_ne!(
            derive_project_secret(master, "proj_a"),
            derive_project_secret(master, "proj_b")
        );
    }

    #[test]
    fn different_masters_get_different_secrets() {
        assert_ne!(
            derive_project_secret(b"master-one-master-one-master-one", "p"),
            derive_project_secret(b"master-two-master-two-master-two", "p")
        );
    }

    #[test]
    fn kid_round_trips() {
        let kid = Kid::current("proj_real_001");
        assert_eq!(kid.to_string(), "p:proj_real_001:v1");
        assert_eq!(Kid::parse("p:proj_real_001:v1"), Some(kid));
    }

    #[test]
    fn kid_with_colons_in_project_parses() {
        // rsplit keeps any ':' inside the project id intact.
        let kid = Kid::parse("p:team:alpha:v2").unwrap();
        assert_eq!(kid.project_id, "team:alpha");
        assert_eq!(kid.version, 2);
    }

    #[test]
    fn malformed_kids_rejected() {
        for raw in ["", "p:", "p::v1", "x:proj:v1", "p:proj:v", "p:proj:vX", "p:proj"] {
            assert!(Kid::parse(raw).is_none(), "accepted {raw:?}");
        }
    }
}
