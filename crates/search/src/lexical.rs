use crate::error::{Result, SearchError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shutter_protocol::PhotographyType;
use shutter_search_index::{
    Collection, CreatorDocument, EngineQuery, EventDocument, ImageDocument, IndexStats,
    ProvisionReport, SearchDocument, SearchIndex, MATCH_ALL,
};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 250;
pub const DEFAULT_GLOBAL_LIMIT: u32 = 10;

/// Offset-based paging over the engine's page-based API.
///
/// `offset` must be a multiple of `limit`, so every request maps onto exactly one engine page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    limit: u32,
    offset: u32,
    page: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: DEFAULT_PAGE_LIMIT,
            offset: 0,
            page: 1,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Result<Self> {
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT);
        let offset = offset.unwrap_or(0);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(SearchError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
            )));
        }
        if offset % limit != 0 {
            return Err(SearchError::Validation(format!(
                "offset {offset} is not a multiple of limit {limit}"
            )));
        }
        let page = (offset / limit).checked_add(1).ok_or_else(|| {
            SearchError::Validation(format!("offset {offset} is past the last addressable page"))
        })?;
        Ok(Self {
            limit,
            offset,
            page,
        })
    }

    #[must_use]
    pub const fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub const fn offset(&self) -> u32 {
        self.offset
    }

    /// 1-based engine page.
    #[must_use]
    pub const fn page(&self) -> u32 {
        self.page
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventFilters {
    pub creator_id: Option<String>,
    pub location: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CreatorFilters {
    pub photography_type: Option<PhotographyType>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImageFilters {
    pub event_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchPage<D> {
    pub hits: Vec<D>,
    pub estimated_total_hits: u64,
}

impl<D> SearchPage<D> {
    fn empty() -> Self {
        Self {
            hits: Vec::new(),
            estimated_total_hits: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalResults {
    pub events: Vec<EventDocument>,
    pub creators: Vec<CreatorDocument>,
    pub images: Vec<ImageDocument>,
}

/// Normalized user query: `None` means "answer empty without asking the engine".
fn engine_text(q: Option<&str>) -> Option<String> {
    let q = q?.trim();
    if q.is_empty() {
        None
    } else if q == MATCH_ALL {
        Some(MATCH_ALL.to_string())
    } else {
        Some(q.to_string())
    }
}

/// Renders exact-match clauses `field:=`value`` joined with `&&`.
fn filter_clause(pairs: &[(&str, Option<&str>)]) -> Option<String> {
    let clauses: Vec<String> = pairs
        .iter()
        .filter_map(|&(field, value)| {
            let value = value?.trim().replace('`', "");
            (!value.is_empty()).then(|| format!("{field}:=`{value}`"))
        })
        .collect();
    (!clauses.is_empty()).then(|| clauses.join(" && "))
}

fn decode_hits<D: DeserializeOwned>(collection: Collection, hits: Vec<serde_json::Value>) -> Vec<D> {
    hits.into_iter()
        .filter_map(|hit| match serde_json::from_value(hit) {
            Ok(doc) => Some(doc),
            Err(err) => {
                log::warn!("Skipping malformed '{collection}' document: {err}");
                None
            }
        })
        .collect()
}

/// Read side of the search index: paged collection search, global search, stats.
#[derive(Clone)]
pub struct LexicalSearch {
    index: SearchIndex,
}

impl LexicalSearch {
    pub fn new(index: SearchIndex) -> Self {
        Self { index }
    }

    pub fn index(&self) -> &SearchIndex {
        &self.index
    }

    pub async fn search_events(
        &self,
        q: Option<&str>,
        pagination: Pagination,
        filters: &EventFilters,
    ) -> SearchPage<EventDocument> {
        let filter = filter_clause(&[
            ("creatorId", filters.creator_id.as_deref()),
            ("location", filters.location.as_deref()),
        ]);
        self.search_collection(q, pagination, filter).await
    }

    pub async fn search_creators(
        &self,
        q: Option<&str>,
        pagination: Pagination,
        filters: &CreatorFilters,
    ) -> SearchPage<CreatorDocument> {
        let filter = filter_clause(&[(
            "photographyType",
            filters.photography_type.map(PhotographyType::as_str),
        )]);
        self.search_collection(q, pagination, filter).await
    }

    pub async fn search_images(
        &self,
        q: Option<&str>,
        pagination: Pagination,
        filters: &ImageFilters,
    ) -> SearchPage<ImageDocument> {
        let filter = filter_clause(&[("eventId", filters.event_id.as_deref())]);
        self.search_collection(q, pagination, filter).await
    }

    /// Searches all three collections concurrently with a shared limit.
    pub async fn global(&self, q: Option<&str>, limit: Option<u32>) -> Result<GlobalResults> {
        let limit = limit.unwrap_or(DEFAULT_GLOBAL_LIMIT);
        if limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(SearchError::Validation(format!(
                "limit must be between 1 and {MAX_PAGE_LIMIT}, got {limit}"
            )));
        }
        let Some(text) = engine_text(q) else {
            return Ok(GlobalResults::default());
        };

        let pagination = Pagination {
            limit,
            offset: 0,
            page: 1,
        };
        let (events, creators, images) = tokio::join!(
            self.run::<EventDocument>(&text, pagination, None, false),
            self.run::<CreatorDocument>(&text, pagination, None, false),
            self.run::<ImageDocument>(&text, pagination, None, false),
        );
        Ok(GlobalResults {
            events: events.hits,
            creators: creators.hits,
            images: images.hits,
        })
    }

    pub async fn stats(&self) -> IndexStats {
        self.index.stats().await
    }

    pub async fn provision(&self) -> ProvisionReport {
        self.index.ensure_collections().await
    }

    pub async fn reset(&self) -> ProvisionReport {
        self.index.reset().await
    }

    async fn search_collection<D: SearchDocument>(
        &self,
        q: Option<&str>,
        pagination: Pagination,
        filter: Option<String>,
    ) -> SearchPage<D> {
        match engine_text(q) {
            Some(text) => self.run(&text, pagination, filter, true).await,
            None => SearchPage::empty(),
        }
    }

    async fn run<D: SearchDocument>(
        &self,
        text: &str,
        pagination: Pagination,
        filter: Option<String>,
        sorted: bool,
    ) -> SearchPage<D> {
        let collection = D::COLLECTION;
        let query = EngineQuery {
            q: text.to_string(),
            query_by: collection.query_by().to_string(),
            filter_by: filter,
            sort_by: if sorted {
                collection.sort_by().map(str::to_string)
            } else {
                None
            },
            page: pagination.page(),
            per_page: pagination.limit(),
        };

        match self.index.search(collection, &query).await {
            Ok(results) => SearchPage {
                hits: decode_hits(collection, results.hits),
                estimated_total_hits: results.found,
            },
            Err(err) => {
                log::error!("Error searching '{collection}': {err}");
                SearchPage::empty()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn aligned_offset_maps_to_page() {
        let page = Pagination::new(Some(20), Some(40)).unwrap();
        assert_eq!(page.page(), 3);
        assert_eq!(Pagination::default().page(), 1);
    }

    #[test]
    fn misaligned_or_out_of_range_is_rejected() {
        assert!(matches!(
            Pagination::new(Some(20), Some(45)),
            Err(SearchError::Validation(_))
        ));
        assert!(Pagination::new(Some(0), None).is_err());
        assert!(Pagination::new(Some(MAX_PAGE_LIMIT + 1), None).is_err());
        assert!(Pagination::new(Some(MAX_PAGE_LIMIT), Some(MAX_PAGE_LIMIT * 2)).is_ok());
        assert!(matches!(
            Pagination::new(Some(1), Some(u32::MAX)),
            Err(SearchError::Validation(_))
        ));
        assert_eq!(
            Pagination::new(Some(1), Some(u32::MAX - 1)).unwrap().page(),
            u32::MAX
        );
    }

    #[test]
    fn query_text_normalization() {
        assert_eq!(engine_text(None), None);
        assert_eq!(engine_text(Some("   ")), None);
        assert_eq!(engine_text(Some(" * ")).as_deref(), Some("*"));
        assert_eq!(engine_text(Some(" 1234 ")).as_deref(), Some("1234"));
    }

    #[test]
    fn filters_render_exact_match_clauses() {
        assert_eq!(
            filter_clause(&[("creatorId", Some("c-1")), ("location", Some("Porto`"))]),
            Some("creatorId:=`c-1` && location:=`Porto`".to_string())
        );
        assert_eq!(filter_clause(&[("eventId", None), ("location", Some(" "))]), None);
    }

    proptest! {
        #[test]
        fn page_covers_offset(limit in 1u32..=MAX_PAGE_LIMIT, page in 0u32..1000) {
            let pagination = Pagination::new(Some(limit), Some(page * limit)).unwrap();
            prop_assert_eq!(pagination.page(), page + 1);
            prop_assert_eq!((pagination.page() - 1) * limit, pagination.offset());
        }
    }
}
