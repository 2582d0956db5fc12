//! Partial profile updates.

use super::model::{UserProfile, is_profile_complete};
use crate::error::Result;
use crate::store::{Fields, encode_fields};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A partial profile edit. `None` leaves the field untouched.
///
/// For `orcid_id`, an empty string clears the stored identifier.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub institution: Option<String>,
    pub department: Option<String>,
    pub position: Option<String>,
    pub role: Option<String>,
    pub orcid_id: Option<String>,
    pub research_interests: Option<Vec<String>>,
}

impl ProfileUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = Some(value.into());
        self
    }

    pub fn email(mut self, value: impl Into<String>) -> Self {
        self.email = Some(value.into());
        self
    }

    pub fn institution(mut self, value: impl Into<String>) -> Self {
        self.institution = Some(value.into());
        self
    }

    pub fn department(mut self, value: impl Into<String>) -> Self {
        self.department = Some(value.into());
        self
    }

    pub fn position(mut self, value: impl Into<String>) -> Self {
        self.position = Some(value.into());
        self
    }

    pub fn role(mut self, value: impl Into<String>) -> Self {
        self.role = Some(value.into());
        self
    }

    pub fn orcid_id(mut self, value: impl Into<String>) -> Self {
        self.orcid_id = Some(value.into());
        self
    }

    pub fn research_interests<I, S>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.research_interests = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.touched_fields().is_empty()
    }

    /// Overlays `newer` on top of `self`; per field, the newer value wins.
    pub fn merge(mut self, newer: ProfileUpdate) -> Self {
        fn overlay<T>(slot: &mut Option<T>, newer: Option<T>) {
            if newer.is_some() {
                *slot = newer;
            }
        }

        overlay(&mut self.name, newer.name);
        overlay(&mut self.email, newer.email);
        overlay(&mut self.institution, newer.institution);
        overlay(&mut self.department, newer.department);
        overlay(&mut self.position, newer.position);
        overlay(&mut self.role, newer.role);
        overlay(&mut self.orcid_id, newer.orcid_id);
        overlay(&mut self.research_interests, newer.research_interests);
        self
    }

    /// Stored (camelCase) names of the fields this update touches.
    pub fn touched_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.name.is_some() {
            fields.push("name");
        }
        if self.email.is_some() {
            fields.push("email");
        }
        if self.institution.is_some() {
            fields.push("institution");
        }
        if self.department.is_some() {
            fields.push("department");
        }
        if self.position.is_some() {
            fields.push("position");
        }
        if self.role.is_some() {
            fields.push("role");
        }
        if self.orcid_id.is_some() {
            fields.push("orcidId");
        }
        if self.research_interests.is_some() {
            fields.push("researchInterests");
        }
        fields
    }

    /// Produces the profile that results from applying this update at `now`.
    ///
    /// Values are trimmed, `updatedAt` is stamped, `profileComplete` is
    /// recomputed, and the one-time-change flags are raised when a non-empty
    /// name or institution is replaced by a different value. Filling in a
    /// blank field does not consume the one-time change.
    pub fn apply_to(&self, current: &UserProfile, now: DateTime<Utc>) -> UserProfile {
        let mut next = current.clone();

        if let Some(name) = &self.name {
            let name = name.trim();
            if !current.name.trim().is_empty() && current.name.trim() != name {
                next.has_changed_name = true;
            }
            next.name = name.to_string();
        }
        if let Some(institution) = &self.institution {
            let institution = institution.trim();
            if !current.institution.trim().is_empty() && current.institution.trim() != institution {
                next.has_changed_institution = true;
            }
            next.institution = institution.to_string();
        }
        if let Some(email) = &self.email {
            next.email = email.trim().to_string();
        }
        if let Some(department) = &self.department {
            next.department = department.trim().to_string();
        }
        if let Some(position) = &self.position {
            next.position = position.trim().to_string();
        }
        if let Some(role) = &self.role {
            next.role = role.trim().to_string();
        }
        if let Some(orcid) = &self.orcid_id {
            let orcid = orcid.trim();
            next.orcid_id = (!orcid.is_empty()).then(|| orcid.to_uppercase());
        }
        if let Some(interests) = &self.research_interests {
            next.research_interests = interests.iter().map(|i| i.trim().to_string()).collect();
        }

        next.updated_at = now;
        next.profile_complete = is_profile_complete(&next);
        next
    }

    /// Field map written to the store for this update.
    ///
    /// Contains the touched fields (taken from `applied`, so normalisation
    /// carries over) plus the bookkeeping fields every write refreshes.
    pub fn to_fields(&self, applied: &UserProfile) -> Result<Fields> {
        let full = encode_fields(applied)?;
        let mut fields = Fields::new();

        let bookkeeping = [
            "updatedAt",
            "profileComplete",
            "hasChangedName",
            "hasChangedInstitution",
        ];
        for key in self.touched_fields().into_iter().chain(bookkeeping) {
            if let Some(value) = full.get(key) {
                fields.insert(key.to_string(), value.clone());
            }
        }
        Ok(fields)
    }
}
