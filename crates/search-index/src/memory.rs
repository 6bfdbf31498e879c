use crate::engine::{
    CollectionInfo, EngineQuery, EngineResults, ImportAction, ImportReport, SearchEngine,
};
use crate::error::{Result, SearchIndexError};
use crate::schema::CollectionSchema;
use async_trait::async_trait;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

struct MemCollection {
    schema: CollectionSchema,
    documents: BTreeMap<String, Value>,
}

/// In-process [`SearchEngine`] with prefix token matching, exact-match filters and numeric
/// sorting. Behaves like the real engine for the queries this workspace issues.
#[derive(Default)]
pub struct MemoryEngine {
    collections: RwLock<HashMap<String, MemCollection>>,
    unavailable: AtomicBool,
    searches: AtomicUsize,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// While set, every operation fails with [`SearchIndexError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, AtomicOrdering::SeqCst);
    }

    /// Number of `search` calls served so far.
    pub fn search_count(&self) -> usize {
        self.searches.load(AtomicOrdering::SeqCst)
    }

    pub async fn document(&self, collection: &str, id: &str) -> Option<Value> {
        let collections = self.collections.read().await;
        collections.get(collection)?.documents.get(id).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(AtomicOrdering::SeqCst) {
            return Err(SearchIndexError::Unavailable(
                "memory engine switched off".to_string(),
            ));
        }
        Ok(())
    }
}

fn missing(collection: &str) -> SearchIndexError {
    SearchIndexError::NotFound(format!("collection '{collection}'"))
}

fn document_id(document: &Value) -> Option<String> {
    match document.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn matches_text(document: &Value, query_by: &str, query_tokens: &[String]) -> bool {
    let words: Vec<String> = query_by
        .split(',')
        .filter_map(|field| document.get(field.trim()).and_then(value_text))
        .flat_map(|text| tokens(&text))
        .collect();
    query_tokens
        .iter()
        .all(|token| words.iter().any(|word| word.starts_with(token.as_str())))
}

/// Parses `field:=value && field:=`value`` into pairs.
fn parse_filter(filter: &str) -> Vec<(String, String)> {
    filter
        .split("&&")
        .filter_map(|clause| {
            let (field, value) = clause.trim().split_once(':')?;
            let value = value.trim().trim_start_matches('=').trim().trim_matches('`');
            Some((field.trim().to_string(), value.to_string()))
        })
        .collect()
}

fn matches_filter(document: &Value, filters: &[(String, String)]) -> bool {
    filters.iter().all(|(field, expected)| {
        document
            .get(field)
            .and_then(value_text)
            .is_some_and(|actual| &actual == expected)
    })
}

fn sort_key(document: &Value, field: &str) -> f64 {
    document
        .get(field)
        .and_then(Value::as_f64)
        .unwrap_or(f64::NEG_INFINITY)
}

fn parse_sort(sort_by: &str) -> (String, bool) {
    match sort_by.split_once(':') {
        Some((field, direction)) => (
            field.trim().to_string(),
            !direction.trim().eq_ignore_ascii_case("asc"),
        ),
        None => (sort_by.trim().to_string(), true),
    }
}

#[async_trait]
impl SearchEngine for MemoryEngine {
    async fn retrieve_collection(&self, name: &str) -> Result<CollectionInfo> {
        self.check_available()?;
        let collections = self.collections.read().await;
        let collection = collections.get(name).ok_or_else(|| missing(name))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            num_documents: collection.documents.len() as u64,
        })
    }

    async fn create_collection(&self, schema: &CollectionSchema) -> Result<()> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        if collections.contains_key(&schema.name) {
            return Err(SearchIndexError::Http {
                status: 409,
                body: format!("A collection with name `{}` already exists.", schema.name),
            });
        }
        collections.insert(
            schema.name.clone(),
            MemCollection {
                schema: schema.clone(),
                documents: BTreeMap::new(),
            },
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        self.check_available()?;
        self.collections
            .write()
            .await
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| missing(name))
    }

    async fn upsert_document(&self, collection: &str, document: Value) -> Result<()> {
        self.check_available()?;
        let id = document_id(&document).ok_or_else(|| SearchIndexError::Http {
            status: 400,
            body: "document has no `id`".to_string(),
        })?;
        let mut collections = self.collections.write().await;
        let target = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        target.documents.insert(id, document);
        Ok(())
    }

    async fn update_document(&self, collection: &str, id: &str, partial: Value) -> Result<()> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let target = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        let existing = target
            .documents
            .get_mut(id)
            .ok_or_else(|| SearchIndexError::NotFound(format!("document '{id}'")))?;
        if let (Value::Object(existing), Value::Object(partial)) = (existing, partial) {
            for (key, value) in partial {
                existing.insert(key, value);
            }
        }
        Ok(())
    }

    async fn delete_document(&self, collection: &str, id: &str) -> Result<()> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let target = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        target
            .documents
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| SearchIndexError::NotFound(format!("document '{id}'")))
    }

    async fn import_documents(
        &self,
        collection: &str,
        documents: Vec<Value>,
        action: ImportAction,
    ) -> Result<ImportReport> {
        self.check_available()?;
        let mut collections = self.collections.write().await;
        let target = collections.get_mut(collection).ok_or_else(|| missing(collection))?;

        let mut report = ImportReport::default();
        for document in documents {
            let Some(id) = document_id(&document) else {
                report.failed += 1;
                report.errors.push("document has no `id`".to_string());
                continue;
            };
            let exists = target.documents.contains_key(&id);
            match (action, exists) {
                (ImportAction::Create, true) => {
                    report.failed += 1;
                    report.errors.push(format!("document '{id}' already exists"));
                }
                (ImportAction::Update, false) => {
                    report.failed += 1;
                    report.errors.push(format!("document '{id}' not found"));
                }
                _ => {
                    target.documents.insert(id, document);
                    report.imported += 1;
                }
            }
        }
        Ok(report)
    }

    async fn search(&self, collection: &str, query: &EngineQuery) -> Result<EngineResults> {
        self.check_available()?;
        self.searches.fetch_add(1, AtomicOrdering::SeqCst);

        let collections = self.collections.read().await;
        let target = collections.get(collection).ok_or_else(|| missing(collection))?;

        let query_tokens = if query.is_match_all() {
            Vec::new()
        } else {
            tokens(&query.q)
        };
        let filters = query.filter_by.as_deref().map(parse_filter).unwrap_or_default();

        let mut matched: Vec<&Value> = target
            .documents
            .values()
            .filter(|doc| matches_filter(doc, &filters))
            .filter(|doc| matches_text(doc, &query.query_by, &query_tokens))
            .collect();

        let (sort_field, descending) = query
            .sort_by
            .as_deref()
            .map(parse_sort)
            .unwrap_or_else(|| (target.schema.default_sorting_field.clone(), true));
        matched.sort_by(|a, b| {
            let ordering = sort_key(a, &sort_field)
                .partial_cmp(&sort_key(b, &sort_field))
                .unwrap_or(Ordering::Equal);
            let ordering = if descending { ordering.reverse() } else { ordering };
            ordering.then_with(|| document_id(a).cmp(&document_id(b)))
        });

        let per_page = query.per_page as usize;
        let skip = query.page.saturating_sub(1) as usize * per_page;
        Ok(EngineResults {
            found: matched.len() as u64,
            hits: matched.into_iter().skip(skip).take(per_page).cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Collection;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn images_engine() -> MemoryEngine {
        let engine = MemoryEngine::new();
        engine
            .create_collection(&Collection::Images.schema())
            .await
            .unwrap();
        for (id, bib, event, created) in [
            ("a", "1234", "e1", 10),
            ("b", "1299", "e1", 30),
            ("c", "5678", "e2", 20),
        ] {
            engine
                .upsert_document(
                    "images",
                    json!({"id": id, "publicId": id, "bibNumber": bib, "eventId": event,
                           "creatorId": "c1", "createdAt": created}),
                )
                .await
                .unwrap();
        }
        engine
    }

    fn query(q: &str) -> EngineQuery {
        let mut query = EngineQuery::new(q, Collection::Images.query_by());
        query.sort_by = Some("createdAt:desc".to_string());
        query
    }

    #[tokio::test]
    async fn match_all_sorts_and_pages() {
        let engine = images_engine().await;
        let mut q = query("*");
        q.per_page = 2;
        q.page = 2;
        let results = engine.search("images", &q).await.unwrap();
        assert_eq!(results.found, 3);
        assert_eq!(results.hits.len(), 1);
        assert_eq!(results.hits[0]["id"], "a");
    }

    #[tokio::test]
    async fn prefix_tokens_and_filters_narrow_results() {
        let engine = images_engine().await;
        let results = engine.search("images", &query("12")).await.unwrap();
        let ids: Vec<_> = results.hits.iter().map(|h| h["id"].clone()).collect();
        assert_eq!(ids, vec![json!("b"), json!("a")]);

        let mut filtered = query("*");
        filtered.filter_by = Some("eventId:=`e2`".to_string());
        let results = engine.search("images", &filtered).await.unwrap();
        assert_eq!(results.found, 1);
        assert_eq!(results.hits[0]["id"], "c");
        assert_eq!(engine.search_count(), 2);
    }

    #[tokio::test]
    async fn partial_update_merges_fields() {
        let engine = images_engine().await;
        engine
            .update_document("images", "a", json!({"eventName": "Harbour 10k"}))
            .await
            .unwrap();
        let doc = engine.document("images", "a").await.unwrap();
        assert_eq!(doc["eventName"], "Harbour 10k");
        assert_eq!(doc["bibNumber"], "1234");
    }

    #[tokio::test]
    async fn missing_targets_are_not_found() {
        let engine = images_engine().await;
        assert!(engine
            .delete_document("images", "zzz")
            .await
            .unwrap_err()
            .is_not_found());
        assert!(engine
            .retrieve_collection("events")
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn filter_clauses_are_split() {
        assert_eq!(
            parse_filter("creatorId:=`c1` && location:=Lisbon"),
            vec![
                ("creatorId".to_string(), "c1".to_string()),
                ("location".to_string(), "Lisbon".to_string())
            ]
        );
    }
}
