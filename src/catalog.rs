//! Read-only boundary to the external game catalog.
//!
//! The catalog provider is not implemented here. This module only fixes the
//! shape of a query and the trait a provider client must satisfy, so that
//! display data can be fetched next to the status without the two ever
//! mixing: catalog records never carry status, and status records never
//! carry display fields.

use async_trait::async_trait;

use crate::error::StoreError;
use crate::protocol::GameId;

/// Base URL for catalog cover and screenshot images.
const IMAGE_BASE_URL: &str = "https://images.igdb.com/igdb/image/upload";

/// A catalog query: resource, field selection, filter, sort and limit.
///
/// # Example
///
/// ```
/// use game_status_client::catalog::CatalogQuery;
///
/// let query = CatalogQuery::new("games")
///     .fields("name, rating")
///     .filter("rating_count > 1000")
///     .sort("rating_count desc")
///     .limit(50);
/// assert_eq!(
///     query.body(),
///     "fields name, rating; where rating_count > 1000; sort rating_count desc; limit 50;"
/// );
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogQuery {
    /// Endpoint queried, e.g. `games`.
    pub resource: String,
    /// Comma-separated field selection; `None` selects every field.
    pub fields: Option<String>,
    /// `where` clause, e.g. `id = 1942`.
    pub filter: Option<String>,
    /// `sort` clause, e.g. `rating_count desc`.
    pub sort: Option<String>,
    /// Maximum number of records returned.
    pub limit: Option<u32>,
}

impl CatalogQuery {
    /// Query every field of `resource`, unfiltered.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            fields: None,
            filter: None,
            sort: None,
            limit: None,
        }
    }

    /// The detail screen's query for one game.
    pub fn game_detail(game_id: GameId) -> Self {
        Self::new("games")
            .fields("*, screenshots.image_id, platforms.name, genres.name")
            .filter(format!("id = {game_id}"))
    }

    /// The discover screen's query: well-rated games, most rated first.
    pub fn discover() -> Self {
        Self::new("games")
            .fields("cover.url, cover.image_id, name, rating, rating_count, hypes")
            .filter("rating_count > 1000")
            .sort("rating_count desc")
            .limit(50)
    }

    /// Select the given fields.
    #[must_use]
    pub fn fields(mut self, fields: impl Into<String>) -> Self {
        self.fields = Some(fields.into());
        self
    }

    /// Keep only records matching `filter`.
    #[must_use]
    pub fn filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = Some(filter.into());
        self
    }

    /// Order records by `sort`.
    #[must_use]
    pub fn sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    /// Return at most `limit` records.
    #[must_use]
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Render the request body in the provider's query language.
    pub fn body(&self) -> String {
        let mut body = format!("fields {};", self.fields.as_deref().unwrap_or("*"));
        if let Some(ref filter) = self.filter {
            body.push_str(&format!(" where {filter};"));
        }
        if let Some(ref sort) = self.sort {
            body.push_str(&format!(" sort {sort};"));
        }
        if let Some(limit) = self.limit {
            body.push_str(&format!(" limit {limit};"));
        }
        body
    }
}

/// URL of a catalog image at the given size preset (e.g. `t_cover_big`).
pub fn image_url(size: &str, image_id: &str) -> String {
    format!("{IMAGE_BASE_URL}/{size}/{image_id}.jpg")
}

/// Read-only access to catalog records.
#[async_trait]
pub trait CatalogReader: Send + Sync + 'static {
    /// Run `query` and return the matching records as raw JSON objects.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::PersistenceUnavailable`] if the provider cannot
    /// be reached and [`StoreError::Unauthorized`] if its credentials were
    /// rejected.
    async fn query(&self, query: &CatalogQuery) -> Result<Vec<serde_json::Value>, StoreError>;
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn bare_query_selects_everything() {
        assert_eq!(CatalogQuery::new("genres").body(), "fields *;");
    }

    #[test]
    fn detail_query_filters_by_id() {
        assert_eq!(
            CatalogQuery::game_detail(1942).body(),
            "fields *, screenshots.image_id, platforms.name, genres.name; where id = 1942;"
        );
    }

    #[test]
    fn discover_query_is_sorted_and_limited() {
        let query = CatalogQuery::discover();
        assert_eq!(query.limit, Some(50));
        assert!(query.body().ends_with("sort rating_count desc; limit 50;"));
    }

    #[test]
    fn image_urls_use_size_preset() {
        assert_eq!(
            image_url("t_screenshot_med", "abc123"),
            "https://images.igdb.com/igdb/image/upload/t_screenshot_med/abc123.jpg"
        );
    }

    struct FixedCatalog(Vec<serde_json::Value>);

    #[async_trait]
    impl CatalogReader for FixedCatalog {
        async fn query(
            &self,
            query: &CatalogQuery,
        ) -> Result<Vec<serde_json::Value>, StoreError> {
            let limit = query.limit.map_or(self.0.len(), |l| l as usize);
            Ok(self.0.iter().take(limit).cloned().collect())
        }
    }

    #[tokio::test]
    async fn reader_is_object_safe() {
        let reader: Box<dyn CatalogReader> = Box::new(FixedCatalog(vec![
            serde_json::json!({"id": 1, "name": "One"}),
            serde_json::json!({"id": 2, "name": "Two"}),
        ]));
        let rows = reader
            .query(&CatalogQuery::new("games").limit(1))
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["name"], "One");
    }
}
