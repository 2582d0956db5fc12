//! Range queries over a single collection.
//!
//! Backends that cannot push queries down (the in-memory and directory stores)
//! collect the collection and hand it to [`Query::execute`], so every backend
//! orders and pages identically.

use super::path::Document;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    #[default]
    Desc,
}

/// Equality filter (`where field == value`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Position after which the next page starts.
///
/// Carries the order-by value of the last returned document together with its
/// id, which breaks ties between documents sharing the same value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cursor {
    pub value: Value,
    pub id: String,
}

impl Cursor {
    pub fn new(value: Value, id: impl Into<String>) -> Self {
        Self {
            value,
            id: id.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub start_after: Option<Cursor>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn where_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn start_after(mut self, cursor: Option<Cursor>) -> Self {
        self.start_after = cursor;
        self
    }

    pub fn matches(&self, document: &Document) -> bool {
        self.filters
            .iter()
            .all(|f| document.field(&f.field) == Some(&f.value))
    }

    /// Builds the cursor that continues after `document` under this query's ordering.
    pub fn cursor_for(&self, document: &Document) -> Cursor {
        let value = self
            .order_by
            .as_ref()
            .and_then(|o| document.field(&o.field).cloned())
            .unwrap_or(Value::Null);
        Cursor::new(value, document.id())
    }

    /// Filters, orders and pages an unordered set of documents.
    pub fn execute(&self, documents: impl IntoIterator<Item = Document>) -> Vec<Document> {
        let mut matched: Vec<Document> = documents.into_iter().filter(|d| self.matches(d)).collect();
        matched.sort_by(|a, b| self.compare(a, b));

        let start = match &self.start_after {
            Some(cursor) => matched
                .iter()
                .position(|d| self.compare_to_cursor(d, cursor) == Ordering::Greater)
                .unwrap_or(matched.len()),
            None => 0,
        };

        let end = match self.limit {
            Some(limit) => start.saturating_add(limit).min(matched.len()),
            None => matched.len(),
        };

        matched.drain(start..end).collect()
    }

    fn order_value<'a>(&self, document: &'a Document) -> Option<&'a Value> {
        self.order_by
            .as_ref()
            .and_then(|o| document.field(&o.field))
    }

    fn direction(&self) -> Direction {
        self.order_by
            .as_ref()
            .map(|o| o.direction)
            .unwrap_or(Direction::Asc)
    }

    fn compare(&self, a: &Document, b: &Document) -> Ordering {
        let by_value = compare_values(
            self.order_value(a).unwrap_or(&Value::Null),
            self.order_value(b).unwrap_or(&Value::Null),
        );
        let by_value = match self.direction() {
            Direction::Asc => by_value,
            Direction::Desc => by_value.reverse(),
        };
        by_value.then_with(|| a.id().cmp(b.id()))
    }

    fn compare_to_cursor(&self, document: &Document, cursor: &Cursor) -> Ordering {
        let by_value = compare_values(
            self.order_value(document).unwrap_or(&Value::Null),
            &cursor.value,
        );
        let by_value = match self.direction() {
            Direction::Asc => by_value,
            Direction::Desc => by_value.reverse(),
        };
        by_value.then_with(|| document.id().cmp(cursor.id.as_str()))
    }
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// Total order over JSON values: null < bool < number < string < array < object.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => {
                let x = x.as_f64().unwrap_or(f64::NAN);
                let y = y.as_f64().unwrap_or(f64::NAN);
                x.total_cmp(&y)
            }
        },
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::DocumentPath;
    use serde_json::json;

    fn doc(id: &str, author: &str, created: i64) -> Document {
        let data = json!({"authorId": author, "createdAt": created});
        Document::new(
            DocumentPath::new("articles", id),
            data.as_object().cloned().unwrap(),
        )
    }

    fn sample() -> Vec<Document> {
        vec![
            doc("a1", "alice", 10),
            doc("a2", "alice", 30),
            doc("b1", "bob", 20),
            doc("a3", "alice", 20),
            doc("a4", "alice", 20),
        ]
    }

    fn ids(documents: &[Document]) -> Vec<&str> {
        documents.iter().map(|d| d.id()).collect()
    }

    #[test]
    fn test_filter_and_order_desc() {
        let query = Query::new()
            .where_eq("authorId", "alice")
            .order_by("createdAt", Direction::Desc);
        let result = query.execute(sample());
        // Ties on createdAt=20 are broken by id ascending
        assert_eq!(ids(&result), vec!["a2", "a3", "a4", "a1"]);
    }

    #[test]
    fn test_pagination_with_cursor_never_repeats_or_skips() {
        let query = Query::new()
            .where_eq("authorId", "alice")
            .order_by("createdAt", Direction::Desc)
            .limit(2);

        let first = query.execute(sample());
        assert_eq!(ids(&first), vec!["a2", "a3"]);

        let cursor = query.cursor_for(first.last().unwrap());
        let second = query.clone().start_after(Some(cursor)).execute(sample());
        assert_eq!(ids(&second), vec!["a4", "a1"]);

        let cursor = query.cursor_for(second.last().unwrap());
        let third = query.start_after(Some(cursor)).execute(sample());
        assert!(third.is_empty());
    }

    #[test]
    fn test_compare_values_orders_types() {
        assert_eq!(compare_values(&json!(null), &json!(1)), Ordering::Less);
        assert_eq!(compare_values(&json!(2), &json!(10)), Ordering::Less);
        assert_eq!(compare_values(&json!(1.5), &json!(1)), Ordering::Greater);
        assert_eq!(compare_values(&json!("b"), &json!("a")), Ordering::Greater);
    }
}
