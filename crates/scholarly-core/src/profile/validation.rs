//! Field validation for profile edits.
//!
//! Validation runs before anything is buffered or written; failures are
//! returned to the caller synchronously and are never retried.

use super::model::UserProfile;
use super::update::ProfileUpdate;
use crate::error::{Result, ValidationErrors};
use once_cell::sync::Lazy;
use regex::Regex;

pub const MAX_NAME_LENGTH: usize = 100;
pub const MAX_RESEARCH_INTERESTS: usize = 20;
pub const MAX_RESEARCH_INTEREST_LENGTH: usize = 100;

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

static ORCID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{4}-\d{4}-\d{4}-\d{3}[\dX]$").expect("ORCID pattern is valid")
});

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email.trim())
}

/// Checks the `dddd-dddd-dddd-dddX` shape and the ISO 7064 mod 11-2 check digit.
pub fn is_valid_orcid(orcid: &str) -> bool {
    let orcid = orcid.trim().to_uppercase();
    if !ORCID_RE.is_match(&orcid) {
        return false;
    }

    let chars: Vec<char> = orcid.chars().filter(|c| *c != '-').collect();
    let Some((check, digits)) = chars.split_last() else {
        return false;
    };

    let mut total: u32 = 0;
    for digit in digits {
        let Some(value) = digit.to_digit(10) else {
            return false;
        };
        total = (total + value) * 2;
    }
    let result = (12 - total % 11) % 11;
    let expected = if result == 10 {
        'X'
    } else {
        char::from_digit(result, 10).unwrap_or('?')
    };
    *check == expected
}

/// Validates `update` against the profile it would be applied to.
///
/// `current` is `None` when no profile is loaded yet; the one-time-change
/// guards are skipped in that case.
pub fn validate_update(update: &ProfileUpdate, current: Option<&UserProfile>) -> Result<()> {
    let mut errors = ValidationErrors::new();

    if let Some(name) = &update.name {
        let name = name.trim();
        if name.is_empty() {
            errors.add("name", "Name is required");
        } else if name.chars().count() > MAX_NAME_LENGTH {
            errors.add(
                "name",
                format!("Name must be at most {} characters", MAX_NAME_LENGTH),
            );
        } else if let Some(current) = current {
            if current.has_changed_name && current.name.trim() != name {
                errors.add("name", "Name can only be changed once");
            }
        }
    }

    if let Some(institution) = &update.institution {
        let institution = institution.trim();
        if institution.is_empty() {
            errors.add("institution", "Institution is required");
        } else if let Some(current) = current {
            if current.has_changed_institution && current.institution.trim() != institution {
                errors.add("institution", "Institution can only be changed once");
            }
        }
    }

    if let Some(email) = &update.email {
        if !is_valid_email(email) {
            errors.add("email", "Please enter a valid email address");
        }
    }

    if let Some(orcid) = &update.orcid_id {
        if !orcid.trim().is_empty() && !is_valid_orcid(orcid) {
            errors.add("orcidId", "ORCID iD must look like 0000-0000-0000-0000");
        }
    }

    if let Some(interests) = &update.research_interests {
        if interests.len() > MAX_RESEARCH_INTERESTS {
            errors.add(
                "researchInterests",
                format!("At most {} research interests", MAX_RESEARCH_INTERESTS),
            );
        } else if interests.iter().any(|i| i.trim().is_empty()) {
            errors.add("researchInterests", "Research interests cannot be blank");
        } else if interests
            .iter()
            .any(|i| i.trim().chars().count() > MAX_RESEARCH_INTEREST_LENGTH)
        {
            errors.add(
                "researchInterests",
                format!(
                    "Each research interest must be at most {} characters",
                    MAX_RESEARCH_INTEREST_LENGTH
                ),
            );
        }
    }

    errors.into_result()
}
