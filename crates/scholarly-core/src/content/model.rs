//! Article and review records.

use crate::error::{Result, ValidationErrors};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ARTICLE_COLLECTION: &str = "articles";
pub const REVIEW_COLLECTION: &str = "reviews";

/// Field used to order listings, newest first.
pub const CREATED_AT_FIELD: &str = "createdAt";

pub const MAX_TITLE_LENGTH: usize = 300;
pub const MIN_REVIEW_LENGTH: usize = 50;
pub const MIN_RATING: u8 = 1;
pub const MAX_RATING: u8 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ArticleStatus {
    #[default]
    Submitted,
    UnderReview,
    Published,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ReviewDecision {
    Accept,
    MinorRevision,
    #[default]
    MajorRevision,
    Reject,
}

/// A submitted article. Owned by `author_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
    pub id: String,
    pub author_id: String,
    pub title: String,
    #[serde(default)]
    pub abstract_text: String,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub status: ArticleStatus,
    /// Stored as epoch milliseconds so that store ordering is numeric.
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// A review of an article. Owned by `reviewer_id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    pub reviewer_id: String,
    pub article_id: String,
    pub rating: u8,
    pub decision: ReviewDecision,
    pub content: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Input for a new article submission.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ArticleDraft {
    pub title: String,
    pub abstract_text: String,
    pub keywords: Vec<String>,
}

impl ArticleDraft {
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        let title = self.title.trim();
        if title.is_empty() {
            errors.add("title", "Title is required");
        } else if title.chars().count() > MAX_TITLE_LENGTH {
            errors.add(
                "title",
                format!("Title must be at most {} characters", MAX_TITLE_LENGTH),
            );
        }
        if self.abstract_text.trim().is_empty() {
            errors.add("abstractText", "Abstract is required");
        }
        errors.into_result()
    }

    pub fn into_article(self, id: String, author_id: String, now: DateTime<Utc>) -> Article {
        Article {
            id,
            author_id,
            title: self.title.trim().to_string(),
            abstract_text: self.abstract_text.trim().to_string(),
            keywords: self
                .keywords
                .into_iter()
                .map(|k| k.trim().to_string())
                .filter(|k| !k.is_empty())
                .collect(),
            status: ArticleStatus::Submitted,
            created_at: now,
        }
    }
}

/// Input for a new review.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReviewDraft {
    pub article_id: String,
    pub rating: u8,
    pub decision: ReviewDecision,
    pub content: String,
}

impl ReviewDraft {
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        if self.article_id.trim().is_empty() {
            errors.add("articleId", "Article is required");
        }
        if !(MIN_RATING..=MAX_RATING).contains(&self.rating) {
            errors.add(
                "rating",
                format!("Rating must be between {} and {}", MIN_RATING, MAX_RATING),
            );
        }
        if self.content.trim().chars().count() < MIN_REVIEW_LENGTH {
            errors.add(
                "content",
                format!("Review must be at least {} characters", MIN_REVIEW_LENGTH),
            );
        }
        errors.into_result()
    }

    pub fn into_review(self, id: String, reviewer_id: String, now: DateTime<Utc>) -> Review {
        Review {
            id,
            reviewer_id,
            article_id: self.article_id.trim().to_string(),
            rating: self.rating,
            decision: self.decision,
            content: self.content.trim().to_string(),
            created_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn long_text() -> String {
        "This manuscript is thorough but the evaluation section needs work.".to_string()
    }

    #[test]
    fn test_article_draft_validation() {
        assert!(ArticleDraft::default().validate().is_err());

        let draft = ArticleDraft {
            title: "On Computable Numbers".to_string(),
            abstract_text: "We study numbers.".to_string(),
            keywords: vec![" logic ".to_string(), "".to_string()],
        };
        assert!(draft.validate().is_ok());

        let article = draft.into_article("a1".into(), "u1".into(), Utc::now());
        assert_eq!(article.keywords, vec!["logic".to_string()]);
        assert_eq!(article.status, ArticleStatus::Submitted);
    }

    #[test]
    fn test_review_draft_validation() {
        let draft = ReviewDraft {
            article_id: "a1".to_string(),
            rating: 6,
            decision: ReviewDecision::Accept,
            content: "too short".to_string(),
        };
        let err = draft.validate().unwrap_err();
        let errors = err.validation_errors().unwrap();
        assert!(errors.contains("rating"));
        assert!(errors.contains("content"));

        let draft = ReviewDraft {
            rating: 4,
            content: long_text(),
            ..draft
        };
        assert!(draft.validate().is_ok());
    }

    #[test]
    fn test_created_at_is_stored_as_millis() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_123).unwrap();
        let article = ArticleDraft {
            title: "T".into(),
            abstract_text: "A".into(),
            keywords: vec![],
        }
        .into_article("a1".into(), "u1".into(), now);

        let value = serde_json::to_value(&article).unwrap();
        assert_eq!(value["createdAt"], serde_json::json!(1_700_000_000_123i64));
        assert_eq!(value["status"], serde_json::json!("submitted"));
    }
}
