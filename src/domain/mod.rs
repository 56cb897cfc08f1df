//! Domain types shared by the scrapers, the storage layer and the API.

pub mod neighborhood;

pub use neighborhood::Neighborhood;

use serde::{Deserialize, Serialize};
use std::fmt;

/// One scraped listing, normalized and ready for storage.
///
/// Numeric fields are `None` when the source did not state them, which is
/// distinct from an explicit zero (a listing with no parking).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PropertyRecord {
    pub code: String,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price: Option<i64>,
    pub area: Option<i32>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub parking: Option<i32>,
    pub estrato: Option<i32>,
    pub images: Vec<String>,
    pub link: String,
    pub source: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl PropertyRecord {
    #[must_use]
    pub fn new(source: impl Into<String>, link: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            link: link.into(),
            ..Self::default()
        }
    }

    /// The listing's cover picture.
    #[must_use]
    pub fn image_url(&self) -> Option<&str> {
        self.images.first().map(String::as_str)
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates::new(latitude, longitude)),
            _ => None,
        }
    }

    pub fn set_coordinates(&mut self, coords: Option<Coordinates>) {
        self.latitude = coords.map(|c| c.latitude);
        self.longitude = coords.map(|c| c.longitude);
    }
}

/// Inclusive monthly rent bounds in COP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceRange {
    pub min: i64,
    pub max: i64,
}

impl PriceRange {
    #[must_use]
    pub const fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.min < 0 || self.max < 0 {
            return Err("Price bounds must be non-negative".to_string());
        }
        if self.min > self.max {
            return Err(format!(
                "Minimum price {} is greater than maximum price {}",
                self.min, self.max
            ));
        }
        Ok(())
    }
}

/// A search results URL together with the canonical neighborhood it covers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchInput {
    pub url: String,
    pub neighborhood: String,
}

impl SearchInput {
    #[must_use]
    pub fn new(url: impl Into<String>, neighborhood: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            neighborhood: neighborhood.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    const EARTH_RADIUS_KM: f64 = 6371.0;

    #[must_use]
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// In range and not the null island placeholder some sites emit.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
            && !(self.latitude == 0.0 && self.longitude == 0.0)
    }

    /// Great-circle distance (haversine).
    #[must_use]
    pub fn distance_km(&self, other: &Self) -> f64 {
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let a = (dlat / 2.0).sin().powi(2)
            + self.latitude.to_radians().cos()
                * other.latitude.to_radians().cos()
                * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
        Self::EARTH_RADIUS_KM * c
    }
}

/// Which sources a scrape request targets.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SourceSelector {
    #[default]
    All,
    One(String),
}

impl SourceSelector {
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("all") {
            Self::All
        } else {
            Self::One(trimmed.to_string())
        }
    }
}

impl fmt::Display for SourceSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::One(slug) => write!(f, "{slug}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_range_validation() {
        assert!(PriceRange::new(2_500_000, 3_500_000).validate().is_ok());
        assert!(PriceRange::new(-1, 3_500_000).validate().is_err());
        assert!(PriceRange::new(4_000_000, 3_500_000).validate().is_err());
    }

    #[test]
    fn test_distance_from_envigado_park() {
        let park = Coordinates::new(6.170_089, -75.587_481);
        let nearby = Coordinates::new(6.1766, -75.575_92);
        let bogota = Coordinates::new(4.711, -74.0721);

        assert!(park.distance_km(&nearby) < 2.0);
        assert!(park.distance_km(&bogota) > 200.0);
        assert!(park.distance_km(&park).abs() < f64::EPSILON);
    }

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(6.17, -75.58).is_valid());
        assert!(!Coordinates::new(0.0, 0.0).is_valid());
        assert!(!Coordinates::new(95.0, -75.58).is_valid());
        assert!(!Coordinates::new(f64::NAN, -75.58).is_valid());
    }

    #[test]
    fn test_source_selector() {
        assert_eq!(SourceSelector::parse("all"), SourceSelector::All);
        assert_eq!(SourceSelector::parse(""), SourceSelector::All);
        assert_eq!(
            SourceSelector::parse("proteger"),
            SourceSelector::One("proteger".to_string())
        );
    }

    #[test]
    fn test_image_url_is_first_image() {
        let mut record = PropertyRecord::new("proteger", "https://x/1");
        assert_eq!(record.image_url(), None);
        record.images = vec!["https://x/a.jpg".into(), "https://x/b.jpg".into()];
        assert_eq!(record.image_url(), Some("https://x/a.jpg"));
    }
}
