//! Catalog records: products, filters, locations, search.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::id::{LocationId, ProductId, VariationId};
use super::money::Money;

/// A warehouse / physical site that scopes stock and pricing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: LocationId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Product as shown in listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub id: ProductId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Units available at the selected location (or across all locations).
    #[serde(default)]
    pub available: u32,
}

/// A purchasable variation of a product (size, pack, color).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Variation {
    pub id: VariationId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    pub price: Money,
    #[serde(default)]
    pub available: u32,
}

/// Stock held at one location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationStock {
    pub location_id: LocationId,
    pub available: u32,
}

/// Product detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub variations: Vec<Variation>,
    #[serde(default)]
    pub stock: Vec<LocationStock>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Product {
    /// Total units available, summed over locations.
    #[must_use]
    pub fn total_available(&self) -> u32 {
        self.stock
            .iter()
            .fold(0u32, |acc, s| acc.saturating_add(s.available))
    }
}

/// One selectable value of a filter facet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOption {
    pub value: String,
    pub label: String,
    #[serde(default)]
    pub count: u32,
}

/// A filter facet (brand, category, attribute).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterGroup {
    pub key: String,
    pub label: String,
    #[serde(default)]
    pub options: Vec<FilterOption>,
}

/// Sort orders accepted by the product listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ProductSort {
    #[default]
    Relevance,
    NameAsc,
    NameDesc,
    PriceAsc,
    PriceDesc,
    Newest,
}

impl ProductSort {
    /// Wire name of the sort order.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Relevance => "relevance",
            Self::NameAsc => "name_asc",
            Self::NameDesc => "name_desc",
            Self::PriceAsc => "price_asc",
            Self::PriceDesc => "price_desc",
            Self::Newest => "newest",
        }
    }
}

/// Product listing query.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ProductQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default)]
    pub sort: ProductSort,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub per_page: Option<u32>,
    /// Facet selections, keyed by `FilterGroup::key`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub filters: BTreeMap<String, String>,
}

impl ProductQuery {
    /// Default page size for listings.
    pub const DEFAULT_PER_PAGE: u32 = 24;
    /// Largest page size the gateway forwards.
    pub const MAX_PER_PAGE: u32 = 100;

    /// Flatten into query-string pairs; filters become `filter.<key>=<value>`.
    #[must_use]
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        if let Some(search) = self.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            pairs.push(("search".to_string(), search.to_string()));
        }
        if let Some(category) = &self.category {
            pairs.push(("category".to_string(), category.clone()));
        }
        if self.sort != ProductSort::Relevance {
            pairs.push(("sort".to_string(), self.sort.as_str().to_string()));
        }
        pairs.push(("page".to_string(), self.page.unwrap_or(1).max(1).to_string()));
        pairs.push((
            "per_page".to_string(),
            self.per_page
                .unwrap_or(Self::DEFAULT_PER_PAGE)
                .clamp(1, Self::MAX_PER_PAGE)
                .to_string(),
        ));
        for (key, value) in &self.filters {
            pairs.push((format!("filter.{key}"), value.clone()));
        }
        pairs
    }
}

/// A page of results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
}

impl<T> Page<T> {
    /// Whether another page follows this one.
    #[must_use]
    pub fn has_next(&self) -> bool {
        u64::from(self.page) * u64::from(self.per_page) < self.total
    }
}

/// Search-as-you-type suggestion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Suggestion {
    pub product_id: ProductId,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_pairs_defaults() {
        let pairs = ProductQuery::default().to_pairs();
        assert_eq!(
            pairs,
            vec![
                ("page".to_string(), "1".to_string()),
                ("per_page".to_string(), "24".to_string()),
            ]
        );
    }

    #[test]
    fn test_query_pairs_filters_and_clamping() {
        let mut query = ProductQuery {
            search: Some("  gloves ".to_string()),
            sort: ProductSort::PriceAsc,
            page: Some(0),
            per_page: Some(500),
            ..ProductQuery::default()
        };
        query.filters.insert("brand".to_string(), "acme".to_string());

        let pairs = query.to_pairs();
        assert!(pairs.contains(&("search".to_string(), "gloves".to_string())));
        assert!(pairs.contains(&("sort".to_string(), "price_asc".to_string())));
        assert!(pairs.contains(&("page".to_string(), "1".to_string())));
        assert!(pairs.contains(&("per_page".to_string(), "100".to_string())));
        assert!(pairs.contains(&("filter.brand".to_string(), "acme".to_string())));
    }

    #[test]
    fn test_page_has_next() {
        let page = Page::<u8> {
            items: vec![],
            page: 2,
            per_page: 10,
            total: 25,
        };
        assert!(page.has_next());
        assert!(!Page::<u8> { page: 3, ..page }.has_next());
    }
}
