//! Product catalog reads.
//!
//! Product listings and details are public and change rarely, so both are
//! cached with `moka` (5-minute TTL) keyed by the rendered backend query.

use std::time::Duration;

use moka::future::Cache;
use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{debug, instrument};

use mercato_core::ProductId;

use crate::backend::{
    BackendError, FilterBuilder, ListQuery, ListResult, Product, RecordClient, collections,
};

/// Largest page a shopper may request.
pub const MAX_PAGE_SIZE: u32 = 100;
const DEFAULT_PAGE_SIZE: u32 = 24;

/// Sort orders offered on product listings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub enum ProductSort {
    #[serde(rename = "name")]
    Name,
    #[default]
    #[serde(rename = "-created")]
    Newest,
    #[serde(rename = "price")]
    PriceAsc,
    #[serde(rename = "-price")]
    PriceDesc,
}

impl ProductSort {
    /// Backend sort expression.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Newest => "-created",
            Self::PriceAsc => "price",
            Self::PriceDesc => "-price",
        }
    }
}

/// Shopper-facing product listing parameters.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductQuery {
    pub search: Option<String>,
    pub category: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub in_stock: Option<bool>,
    pub sort: Option<ProductSort>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl ProductQuery {
    /// Render to a backend list query.
    #[must_use]
    pub fn to_list_query(&self) -> ListQuery {
        let search = self
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let filter = FilterBuilder::new()
            .optional(search, |b, s| b.like("name", s))
            .optional(category, |b, c| b.eq("category", c))
            .optional(self.min_price, |b, p| b.gte("price", p))
            .optional(self.max_price, |b, p| b.lte("price", p))
            .optional(self.in_stock.filter(|&v| v), |b, _| b.gte("stock", 1_i64))
            .build();

        ListQuery::new()
            .filter(filter)
            .sort(self.sort.unwrap_or_default().as_str())
            .page(
                self.page.unwrap_or(1).max(1),
                self.per_page
                    .unwrap_or(DEFAULT_PAGE_SIZE)
                    .clamp(1, MAX_PAGE_SIZE),
            )
    }
}

/// Cache key for catalog reads.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(ProductId),
    Products {
        filter: Option<String>,
        sort: Option<String>,
        page: u32,
        per_page: u32,
    },
}

impl From<&ListQuery> for CacheKey {
    fn from(query: &ListQuery) -> Self {
        Self::Products {
            filter: query.filter.clone(),
            sort: query.sort.clone(),
            page: query.page,
            per_page: query.per_page,
        }
    }
}

/// Cached value types.
#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Products(ListResult<Product>),
}

/// Product catalog backed by the `products` collection.
#[derive(Clone)]
pub struct CatalogService {
    client: RecordClient,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(client: RecordClient) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();
        Self { client, cache }
    }

    /// List products matching `query`.
    ///
    /// # Errors
    ///
    /// Returns a `BackendError` if the backend request fails.
    #[instrument(skip(self))]
    pub async fn list_products(
        &self,
        query: &ProductQuery,
    ) -> Result<ListResult<Product>, BackendError> {
        let list_query = query.to_list_query();
        let key = CacheKey::from(&list_query);

        if let Some(CacheValue::Products(page)) = self.cache.get(&key).await {
            debug!("Cache hit for product list");
            return Ok(page);
        }

        let page: ListResult<Product> = self
            .client
            .list(collections::PRODUCTS, &list_query, None)
            .await?;
        self.cache
            .insert(key, CacheValue::Products(page.clone()))
            .await;
        Ok(page)
    }

    /// Fetch one product.
    ///
    /// # Errors
    ///
    /// Returns `BackendError::NotFound` if the product does not exist.
    #[instrument(skip(self))]
    pub async fn get_product(&self, id: &ProductId) -> Result<Product, BackendError> {
        let key = CacheKey::Product(id.clone());
        if let Some(CacheValue::Product(product)) = self.cache.get(&key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product: Product = self
            .client
            .get(collections::PRODUCTS, id.as_str(), None)
            .await?;
        self.cache
            .insert(key, CacheValue::Product(Box::new(product.clone())))
            .await;
        Ok(product)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_query() {
        let query = ProductQuery::default().to_list_query();
        assert_eq!(query.filter, None);
        assert_eq!(query.sort.as_deref(), Some("-created"));
        assert_eq!(query.page, 1);
        assert_eq!(query.per_page, DEFAULT_PAGE_SIZE);
    }

    #[test]
    fn test_full_query_filter() {
        let query = ProductQuery {
            search: Some(" green ".to_string()),
            category: Some("tea".to_string()),
            min_price: Some(Decimal::new(500, 2)),
            max_price: Some(Decimal::new(2000, 2)),
            in_stock: Some(true),
            sort: Some(ProductSort::PriceDesc),
            page: Some(2),
            per_page: Some(10),
        }
        .to_list_query();

        assert_eq!(
            query.filter.as_deref(),
            Some(
                r#"name ~ "green" && category = "tea" && price >= 5 && price <= 20 && stock >= 1"#
            )
        );
        assert_eq!(query.sort.as_deref(), Some("-price"));
        assert_eq!((query.page, query.per_page), (2, 10));
    }

    #[test]
    fn test_paging_is_clamped() {
        let query = ProductQuery {
            page: Some(0),
            per_page: Some(1000),
            ..ProductQuery::default()
        }
        .to_list_query();
        assert_eq!((query.page, query.per_page), (1, MAX_PAGE_SIZE));

        let query = ProductQuery {
            per_page: Some(0),
            ..ProductQuery::default()
        }
        .to_list_query();
        assert_eq!(query.per_page, 1);
    }

    #[test]
    fn test_blank_search_and_out_of_stock_are_ignored() {
        let query = ProductQuery {
            search: Some("   ".to_string()),
            in_stock: Some(false),
            ..ProductQuery::default()
        }
        .to_list_query();
        assert_eq!(query.filter, None);
    }

    #[test]
    fn test_sort_deserializes_from_backend_names() {
        let sort: ProductSort = serde_json::from_str(r#""-price""#).unwrap();
        assert_eq!(sort, ProductSort::PriceDesc);
        assert!(serde_json::from_str::<ProductSort>(r#""stock""#).is_err());
    }
}
