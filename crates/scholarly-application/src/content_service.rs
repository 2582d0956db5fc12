//! Articles and reviews shown on a profile.
//!
//! Listings are newest first and paged with a store cursor. One extra
//! document is requested per page to learn whether another page exists.

use crate::context::SessionContext;
use chrono::Utc;
use scholarly_core::auth::AuthUser;
use scholarly_core::content::{
    ARTICLE_COLLECTION, Article, ArticleDraft, CREATED_AT_FIELD, Page, REVIEW_COLLECTION, Review,
    ReviewDraft,
};
use scholarly_core::error::{Result, ScholarlyError};
use scholarly_core::profile::profile_path;
use scholarly_core::store::{
    Cursor, Direction, DocumentPath, DocumentStore, Fields, Query, SetOptions, encode_fields,
};
use serde::de::DeserializeOwned;
use serde_json::Value;

const AUTHOR_FIELD: &str = "authorId";
const REVIEWER_FIELD: &str = "reviewerId";

/// Denormalized counters stored on the profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContentCounters {
    pub articles: u32,
    pub reviews: u32,
}

pub struct ContentService {
    context: SessionContext,
    page_size: usize,
}

impl ContentService {
    pub fn new(context: SessionContext) -> Self {
        let page_size = context.config().content.page_size;
        Self { context, page_size }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub async fn list_articles(&self, author_id: &str, cursor: Option<Cursor>) -> Result<Page<Article>> {
        self.list(ARTICLE_COLLECTION, AUTHOR_FIELD, author_id, cursor)
            .await
    }

    pub async fn list_reviews(&self, reviewer_id: &str, cursor: Option<Cursor>) -> Result<Page<Review>> {
        self.list(REVIEW_COLLECTION, REVIEWER_FIELD, reviewer_id, cursor)
            .await
    }

    /// Stores a new article authored by the signed-in user.
    pub async fn submit_article(&self, draft: ArticleDraft) -> Result<Article> {
        draft.validate()?;
        let user = self.signed_in()?;
        let store = self.context.store()?;

        let article = draft.into_article(uuid::Uuid::new_v4().to_string(), user.uid.clone(), Utc::now());
        store
            .set(
                &DocumentPath::new(ARTICLE_COLLECTION, &article.id),
                encode_fields(&article)?,
                SetOptions::replace(),
            )
            .await?;
        tracing::info!(
            "[ContentService] Article submitted: id={}, author={}",
            article.id,
            user.uid
        );

        self.refresh_counters(&user.uid).await;
        Ok(article)
    }

    /// Stores a review by the signed-in user of someone else's article.
    pub async fn submit_review(&self, draft: ReviewDraft) -> Result<Review> {
        draft.validate()?;
        let user = self.signed_in()?;
        let store = self.context.store()?;

        let article_path = DocumentPath::new(ARTICLE_COLLECTION, draft.article_id.trim());
        let article: Article = store
            .get(&article_path)
            .await?
            .ok_or_else(|| ScholarlyError::not_found("Article", draft.article_id.trim()))?
            .decode()?;
        if article.author_id == user.uid {
            return Err(ScholarlyError::validation(
                "articleId",
                "You cannot review your own article",
            ));
        }

        let review = draft.into_review(uuid::Uuid::new_v4().to_string(), user.uid.clone(), Utc::now());
        store
            .set(
                &DocumentPath::new(REVIEW_COLLECTION, &review.id),
                encode_fields(&review)?,
                SetOptions::replace(),
            )
            .await?;
        tracing::info!(
            "[ContentService] Review submitted: id={}, article={}, reviewer={}",
            review.id,
            review.article_id,
            user.uid
        );

        self.refresh_counters(&user.uid).await;
        Ok(review)
    }

    /// Recounts the user's articles and reviews and writes both counters to
    /// their profile.
    pub async fn sync_counters(&self, uid: &str) -> Result<ContentCounters> {
        let store = self.context.store()?;
        let counters = ContentCounters {
            articles: count(store.as_ref(), ARTICLE_COLLECTION, AUTHOR_FIELD, uid).await?,
            reviews: count(store.as_ref(), REVIEW_COLLECTION, REVIEWER_FIELD, uid).await?,
        };

        let mut fields = Fields::new();
        fields.insert("articleCount".to_string(), Value::from(counters.articles));
        fields.insert("reviewCount".to_string(), Value::from(counters.reviews));
        store.update(&profile_path(uid), fields).await?;

        tracing::debug!(
            "[ContentService] Counters for uid={}: {} article(s), {} review(s)",
            uid,
            counters.articles,
            counters.reviews
        );
        Ok(counters)
    }

    fn signed_in(&self) -> Result<AuthUser> {
        self.context
            .auth()
            .current_user()
            .ok_or(ScholarlyError::NotAuthenticated)
    }

    /// Counter drift is repaired by the next sync, so a failure here does not
    /// undo the submission.
    async fn refresh_counters(&self, uid: &str) {
        if let Err(e) = self.sync_counters(uid).await {
            tracing::warn!("[ContentService] Failed to sync counters for uid={}: {}", uid, e);
        }
    }

    async fn list<T: DeserializeOwned>(
        &self,
        collection: &str,
        owner_field: &str,
        owner_id: &str,
        cursor: Option<Cursor>,
    ) -> Result<Page<T>> {
        let store = self.context.store()?;
        let query = Query::new()
            .where_eq(owner_field, owner_id)
            .order_by(CREATED_AT_FIELD, Direction::Desc)
            .limit(self.page_size + 1)
            .start_after(cursor);

        let mut documents = store.query(collection, &query).await?;
        let has_more = documents.len() > self.page_size;
        documents.truncate(self.page_size);
        let next_cursor = has_more
            .then(|| documents.last().map(|last| query.cursor_for(last)))
            .flatten();

        let items = documents
            .iter()
            .filter_map(|document| match document.decode::<T>() {
                Ok(item) => Some(item),
                Err(e) => {
                    tracing::warn!("[ContentService] Skipping malformed {}: {}", document.path, e);
                    None
                }
            })
            .collect();

        Ok(Page {
            items,
            next_cursor,
            has_more,
        })
    }
}

async fn count(store: &dyn DocumentStore, collection: &str, field: &str, uid: &str) -> Result<u32> {
    let matched = store
        .query(collection, &Query::new().where_eq(field, uid))
        .await?;
    Ok(u32::try_from(matched.len()).unwrap_or(u32::MAX))
}
