//! UserProfile domain model.

use crate::auth::AuthUser;
use crate::store::DocumentPath;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Collection holding one profile document per user id.
pub const PROFILE_COLLECTION: &str = "users";

/// One researcher's platform profile.
///
/// Counters are denormalized and recomputed elsewhere; the profile controller
/// only carries them. Missing fields in a stored document fall back to their
/// defaults so that older records still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProfile {
    pub uid: String,
    pub name: String,
    pub email: String,
    pub institution: String,
    pub department: String,
    pub position: String,
    pub role: String,
    pub orcid_id: Option<String>,
    pub research_interests: Vec<String>,

    pub article_count: u32,
    pub review_count: u32,
    pub reputation: i64,

    pub profile_complete: bool,
    /// Set once the name has been changed; further changes are rejected.
    pub has_changed_name: bool,
    /// Set once the institution has been changed; further changes are rejected.
    pub has_changed_institution: bool,

    /// Soft-delete marker. Deactivated profiles keep their data.
    pub is_deleted: bool,
    pub deleted_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    /// Synthesizes the record created on first authenticated load.
    ///
    /// Name and email come from the auth provider; everything else starts empty,
    /// so the profile begins incomplete.
    pub fn default_for(user: &AuthUser, now: DateTime<Utc>) -> Self {
        let name = user
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_default();

        let mut profile = Self {
            uid: user.uid.clone(),
            name,
            email: user.email.clone(),
            created_at: now,
            updated_at: now,
            ..Default::default()
        };
        profile.profile_complete = is_profile_complete(&profile);
        profile
    }

    pub fn path(&self) -> DocumentPath {
        profile_path(&self.uid)
    }
}

/// Store path of the profile belonging to `uid`.
pub fn profile_path(uid: &str) -> DocumentPath {
    DocumentPath::new(PROFILE_COLLECTION, uid)
}

/// A profile is complete once name, role and institution are all non-blank.
pub fn is_profile_complete(profile: &UserProfile) -> bool {
    [&profile.name, &profile.role, &profile.institution]
        .iter()
        .all(|field| !field.trim().is_empty())
}
