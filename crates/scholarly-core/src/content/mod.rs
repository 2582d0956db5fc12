//! Articles and reviews referenced from a profile.
//!
//! These records are read-mostly: the profile view lists them page by page,
//! newest first, keyed by author or reviewer id.

mod model;

pub use model::{
    ARTICLE_COLLECTION, Article, ArticleDraft, ArticleStatus, CREATED_AT_FIELD, MAX_RATING,
    MIN_RATING, MIN_REVIEW_LENGTH, REVIEW_COLLECTION, Review, ReviewDecision, ReviewDraft,
};

use crate::store::Cursor;
use serde::Serialize;

/// One page of a listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Pass back to fetch the following page. `None` on the last page.
    pub next_cursor: Option<Cursor>,
    pub has_more: bool,
}

impl<T> Page<T> {
    pub fn empty() -> Self {
        Self {
            items: Vec::new(),
            next_cursor: None,
            has_more: false,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
