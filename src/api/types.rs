use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db::{Page, PropertyFilter, SortOrder};
use crate::domain::{PriceRange, SourceSelector};
use crate::services::{ScrapeOutcome, ScrapeRequest};

use super::ApiError;

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub const fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Query string accepted by the listing endpoints.
#[derive(Debug, Default, Deserialize)]
pub struct PropertyQuery {
    pub source: Option<String>,
    pub location: Option<String>,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
    pub bedrooms_min: Option<i32>,
    pub bathrooms_min: Option<i32>,
    pub parking_min: Option<i32>,
    pub area_min: Option<i32>,
    pub area_max: Option<i32>,
    pub estrato: Option<i32>,
    #[serde(default)]
    pub sort: SortOrder,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
}

impl PropertyQuery {
    #[must_use]
    pub fn filter(&self) -> PropertyFilter {
        let blank_to_none = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToString::to_string)
        };

        PropertyFilter {
            source: blank_to_none(&self.source),
            location: blank_to_none(&self.location),
            price_min: self.price_min,
            price_max: self.price_max,
            bedrooms_min: self.bedrooms_min,
            bathrooms_min: self.bathrooms_min,
            parking_min: self.parking_min,
            area_min: self.area_min,
            area_max: self.area_max,
            estrato: self.estrato,
        }
    }

    #[must_use]
    pub fn page(&self) -> Page {
        Page::new(self.skip, self.limit)
    }
}

#[derive(Debug, Serialize)]
pub struct PropertyListResponse<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub skip: u64,
    pub limit: u64,
}

#[derive(Debug, Serialize)]
pub struct CountResponse {
    pub count: u64,
}

#[derive(Debug, Serialize)]
pub struct SourceDto {
    pub slug: String,
    pub name: String,
    pub base_url: String,
    pub properties: u64,
    pub last_run_at: Option<DateTime<Utc>>,
    pub last_summary: Option<serde_json::Value>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ScrapeQuery {
    pub source: Option<String>,
    #[serde(default)]
    pub force: bool,
    pub price_min: Option<i64>,
    pub price_max: Option<i64>,
}

impl TryFrom<ScrapeQuery> for ScrapeRequest {
    type Error = ApiError;

    fn try_from(query: ScrapeQuery) -> Result<Self, Self::Error> {
        let price_range = match (query.price_min, query.price_max) {
            (Some(min), Some(max)) => Some(PriceRange::new(min, max)),
            (None, None) => None,
            _ => {
                return Err(ApiError::validation(
                    "price_min and price_max must be given together",
                ));
            }
        };

        Ok(Self {
            source: query
                .source
                .as_deref()
                .map_or(SourceSelector::All, SourceSelector::parse),
            force: query.force,
            price_range,
        })
    }
}

#[derive(Debug, Serialize)]
pub struct ScrapeResponse {
    /// `cached` when every source was served from its last run.
    pub status: &'static str,
    pub message: String,
    #[serde(flatten)]
    pub outcome: ScrapeOutcome,
}

impl From<ScrapeOutcome> for ScrapeResponse {
    fn from(outcome: ScrapeOutcome) -> Self {
        let (status, message) = if outcome.all_cached() {
            (
                "cached",
                "Sources were scraped recently, returning the last results".to_string(),
            )
        } else if outcome.failed > 0 {
            (
                "partial",
                format!(
                    "Found {} properties, {} new; {} source(s) failed",
                    outcome.total_found, outcome.new_properties, outcome.failed
                ),
            )
        } else {
            (
                "completed",
                format!(
                    "Found {} properties, {} new",
                    outcome.total_found, outcome.new_properties
                ),
            )
        };

        Self {
            status,
            message,
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scrape_query_requires_both_bounds() {
        let query = ScrapeQuery {
            price_min: Some(2_000_000),
            ..Default::default()
        };
        assert!(ScrapeRequest::try_from(query).is_err());

        let query = ScrapeQuery {
            source: Some("all".into()),
            force: true,
            price_min: Some(2_000_000),
            price_max: Some(3_000_000),
        };
        let request = ScrapeRequest::try_from(query).unwrap();
        assert_eq!(request.source, SourceSelector::All);
        assert!(request.force);
        assert_eq!(request.price_range, Some(PriceRange::new(2_000_000, 3_000_000)));
    }

    #[test]
    fn test_blank_filters_are_ignored() {
        let query = PropertyQuery {
            source: Some("  ".into()),
            location: Some("Zuñiga".into()),
            ..Default::default()
        };
        let filter = query.filter();
        assert_eq!(filter.source, None);
        assert_eq!(filter.location.as_deref(), Some("Zuñiga"));
    }
}
