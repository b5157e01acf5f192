/// Cache key scheme and TTL tiers
///
/// Keys are colon-separated segments: a namespace followed by the request
/// parameters in a fixed order. Absent optional filters are written as a
/// placeholder (`all` for category-like filters, `none` for bounds and search
/// text) so every segment position is always present.
///
/// Segment values are percent-encoded (everything but ASCII alphanumerics and
/// `-_.~`), so a parameter can neither split into two segments nor turn a key
/// into an invalidation pattern.
///
/// # Key Formats
///
/// - `product:{id}`
/// - `products:{page}:{limit}:{category}:{minPrice}:{maxPrice}:{minRating}:{search}`
/// - `transactions:{userId}:{page}:{limit}:{type}:{startDate}:{endDate}`
/// - `analytics:{users|transactions|products}`

use serde::Deserialize;
use std::fmt::{self, Display};

/// TTL for product detail responses
pub const DETAIL_TTL_SECS: u64 = 300;

/// TTL for paginated list responses
pub const LIST_TTL_SECS: u64 = 300;

/// TTL for analytics reports
pub const ANALYTICS_TTL_SECS: u64 = 3600;

/// TTL used when a caller does not choose one
pub const DEFAULT_TTL_SECS: u64 = 3600;

const ALL: &str = "all";
const NONE: &str = "none";

const DEFAULT_PAGE: u32 = 1;
const DEFAULT_PAGE_SIZE: u32 = 10;

/// Incremental builder for a cache key
#[derive(Debug, Clone)]
pub struct CacheKey {
    key: String,
}

impl CacheKey {
    /// Starts a key in the given namespace (written unescaped)
    pub fn new(namespace: &str) -> Self {
        Self {
            key: namespace.to_string(),
        }
    }

    /// Appends a required segment
    pub fn part(mut self, value: impl Display) -> Self {
        self.key.push(':');
        self.key.push_str(&urlencoding::encode(&value.to_string()));
        self
    }

    /// Appends an optional segment, writing `fallback` when absent or empty
    pub fn opt<T: Display>(self, value: Option<T>, fallback: &str) -> Self {
        match value.map(|v| v.to_string()).filter(|v| !v.is_empty()) {
            Some(v) => self.part(v),
            None => {
                let mut this = self;
                this.key.push(':');
                this.key.push_str(fallback);
                this
            }
        }
    }

    /// Appends a trailing `*`, turning the key into an invalidation pattern
    pub fn wildcard(mut self) -> String {
        self.key.push_str(":*");
        self.key
    }

    pub fn build(self) -> String {
        self.key
    }
}

impl Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Key for a single product
pub fn product_key(product_id: impl Display) -> String {
    CacheKey::new("product").part(product_id).build()
}

/// Pattern matching every cached product list
pub fn product_lists_pattern() -> String {
    CacheKey::new("products").wildcard()
}

/// Keys to invalidate after a product (or one of its reviews) changes
///
/// The entity key comes first, then the pattern covering every list page.
pub fn product_invalidation_keys(product_id: impl Display) -> Vec<String> {
    vec![product_key(product_id), product_lists_pattern()]
}

/// Pattern matching every cached transaction list of a user
pub fn user_transactions_pattern(user_id: impl Display) -> String {
    CacheKey::new("transactions").part(user_id).wildcard()
}

/// Product list query parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub limit: u32,
    pub category: Option<String>,
    pub min_price: Option<f64>,
    pub max_price: Option<f64>,
    pub min_rating: Option<f64>,
    pub search: Option<String>,
}

impl Default for ProductListQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_SIZE,
            category: None,
            min_price: None,
            max_price: None,
            min_rating: None,
            search: None,
        }
    }
}

impl ProductListQuery {
    pub fn cache_key(&self) -> String {
        CacheKey::new("products")
            .part(self.page)
            .part(self.limit)
            .opt(self.category.as_deref(), ALL)
            .opt(self.min_price, NONE)
            .opt(self.max_price, NONE)
            .opt(self.min_rating, NONE)
            .opt(self.search.as_deref(), NONE)
            .build()
    }
}

/// Transaction list query parameters
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionListQuery {
    #[serde(default = "default_page")]
    pub page: u32,
    #[serde(default = "default_page_size")]
    pub limit: u32,
    #[serde(rename = "type")]
    pub kind: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl Default for TransactionListQuery {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_PAGE_SIZE,
            kind: None,
            start_date: None,
            end_date: None,
        }
    }
}

impl TransactionListQuery {
    /// Key for this query scoped to one user
    pub fn cache_key(&self, user_id: impl Display) -> String {
        CacheKey::new("transactions")
            .part(user_id)
            .part(self.page)
            .part(self.limit)
            .opt(self.kind.as_deref(), ALL)
            .opt(self.start_date.as_deref(), NONE)
            .opt(self.end_date.as_deref(), NONE)
            .build()
    }
}

/// Admin analytics reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsReport {
    Users,
    Transactions,
    Products,
}

impl AnalyticsReport {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalyticsReport::Users => "users",
            AnalyticsReport::Transactions => "transactions",
            AnalyticsReport::Products => "products",
        }
    }

    pub fn cache_key(&self) -> String {
        CacheKey::new("analytics").part(self.as_str()).build()
    }
}

fn default_page() -> u32 {
    DEFAULT_PAGE
}

fn default_page_size() -> u32 {
    DEFAULT_PAGE_SIZE
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::is_pattern;

    #[test]
    fn test_product_key() {
        assert_eq!(product_key(42), "product:42");
        assert_eq!(product_key("abc-123"), "product:abc-123");
    }

    #[test]
    fn test_product_list_key_defaults() {
        assert_eq!(
            ProductListQuery::default().cache_key(),
            "products:1:10:all:none:none:none:none"
        );
    }

    #[test]
    fn test_product_list_key_with_filters() {
        let query = ProductListQuery {
            page: 2,
            limit: 20,
            category: Some("shoes".to_string()),
            min_price: Some(10.0),
            max_price: Some(99.5),
            min_rating: Some(4.0),
            search: Some("runner".to_string()),
        };
        assert_eq!(query.cache_key(), "products:2:20:shoes:10:99.5:4:runner");
    }

    #[test]
    fn test_empty_filters_use_placeholders() {
        let query = ProductListQuery {
            category: Some(String::new()),
            search: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(query.cache_key(), ProductListQuery::default().cache_key());
    }

    #[test]
    fn test_keys_are_deterministic() {
        let query = TransactionListQuery {
            kind: Some("PURCHASE".to_string()),
            start_date: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        assert_eq!(query.cache_key("u1"), query.clone().cache_key("u1"));
        assert_eq!(
            query.cache_key("u1"),
            "transactions:u1:1:10:PURCHASE:2024-01-01:none"
        );
    }

    #[test]
    fn test_distinct_requests_do_not_collide() {
        let a = ProductListQuery {
            category: Some("a:b".to_string()),
            ..Default::default()
        };
        let b = ProductListQuery {
            category: Some("a".to_string()),
            min_price: None,
            ..Default::default()
        };
        assert_ne!(a.cache_key(), b.cache_key());

        let by_min = ProductListQuery {
            min_price: Some(5.0),
            ..Default::default()
        };
        let by_max = ProductListQuery {
            max_price: Some(5.0),
            ..Default::default()
        };
        assert_ne!(by_min.cache_key(), by_max.cache_key());

        let query = TransactionListQuery::default();
        assert_ne!(query.cache_key("u1"), query.cache_key("u2"));
    }

    #[test]
    fn test_parameters_cannot_form_patterns() {
        let query = ProductListQuery {
            search: Some("shoe*".to_string()),
            ..Default::default()
        };
        let key = query.cache_key();
        assert_eq!(key, "products:1:10:all:none:none:none:shoe%2A");
        assert!(!is_pattern(&key));
        assert_eq!(product_key("[1]"), "product:%5B1%5D");
        assert!(!is_pattern(&product_key("[1]")));
        assert!(!is_pattern(&product_key("a?b\\c")));
    }

    #[test]
    fn test_segments_are_percent_encoded() {
        let query = ProductListQuery {
            category: Some("men's shoes".to_string()),
            search: Some("50%:off".to_string()),
            ..Default::default()
        };
        assert_eq!(
            query.cache_key(),
            "products:1:10:men%27s%20shoes:none:none:none:50%25%3Aoff"
        );
        assert_eq!(product_key("sku-1_a.b~c"), "product:sku-1_a.b~c");
    }

    #[test]
    fn test_invalidation_keys() {
        assert_eq!(
            product_invalidation_keys(7),
            vec!["product:7".to_string(), "products:*".to_string()]
        );
        assert_eq!(user_transactions_pattern("u1"), "transactions:u1:*");
        assert_eq!(user_transactions_pattern("u*"), "transactions:u%2A:*");
        assert_eq!(
            user_transactions_pattern("user@example.com"),
            "transactions:user%40example.com:*"
        );
    }

    #[test]
    fn test_analytics_keys() {
        assert_eq!(AnalyticsReport::Users.cache_key(), "analytics:users");
        assert_eq!(
            AnalyticsReport::Transactions.cache_key(),
            "analytics:transactions"
        );
        assert_eq!(AnalyticsReport::Products.cache_key(), "analytics:products");
    }

    #[test]
    fn test_query_deserializes_camel_case() {
        let query: TransactionListQuery =
            serde_json::from_str(r#"{"page":3,"type":"REFUND","endDate":"2024-02-01"}"#)
                .unwrap();
        assert_eq!(query.page, 3);
        assert_eq!(query.limit, 10);
        assert_eq!(query.kind.as_deref(), Some("REFUND"));
        assert_eq!(query.end_date.as_deref(), Some("2024-02-01"));
    }
}
