//! # Shutter Search
//!
//! Two read paths over the indexed catalogue:
//!
//! - [`SimilaritySearch`]: embeds a query photo and ranks an event's images by cosine
//!   similarity in the primary store.
//! - [`LexicalSearch`]: paged full-text and facet search over the search index, plus a
//!   concurrent global search across all collections.

mod error;
mod lexical;
mod similarity;

pub use error::{Result, SearchError};
pub use lexical::{
    CreatorFilters, EventFilters, GlobalResults, ImageFilters, LexicalSearch, Pagination,
    SearchPage, DEFAULT_GLOBAL_LIMIT, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT,
};
pub use similarity::{
    SimilarImage, SimilarityConfig, SimilarityResponse, SimilaritySearch, DEFAULT_SIMILAR_LIMIT,
    MAX_SIMILAR_LIMIT,
};
