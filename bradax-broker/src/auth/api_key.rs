//! Strict api-key verification.
//!
//! Presented keys are structured
//! `bradax_<project_id>_<org>_<hashfield>_<timestamp>` where `hashfield` is
//! the stored hash optionally followed by a suffix. Verification requires
//! the stored `api_key_hash` to be a **prefix** of `hashfield` — a substring
//! hit elsewhere in the field never passes, and there is no fallback.

use crate::stores::Project;

/// SDK key prefix.
pub const API_KEY_PREFIX: &str = "bradax";

/// Verify a presented api-key against the project's stored hash.
#[must_use]
pub fn verify(project: &Project, presented: &str) -> bool {
    let Some(rest) = presented.strip_prefix(API_KEY_PREFIX) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('_') else {
        return false;
    };
    // project_id may itself contain underscores; match it literally.
    let Some(rest) = rest.strip_prefix(project.project_id.as_str()) else {
        return false;
    };
    let Some(rest) = rest.strip_prefix('_') else {
        return false;
    };
    // The trailing segments are unambiguous from the right: timestamp, then
    // the hash field. Whatever remains in front is the org label.
    let Some((head, timestamp)) = rest.rsplit_once('_') else {
        return false;
    };
    if timestamp.is_empty() || !timestamp.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let Some((org, hash_field)) = head.rsplit_once('_') else {
        return false;
    };
    if org.is_empty() || hash_field.is_empty() {
        return false;
    }
    hash_field.starts_with(&project.api_key_hash)
}

// ── Tests ──────────────────────────────────────────────────────────────
