//! Site-independent helpers that turn raw page data into listing fields.

pub mod features;
pub mod gps;
pub mod images;

pub use features::{FeatureExtractor, Features};
pub use gps::{DistanceFilter, GpsExtractor};
pub use images::ImageFilter;

use crate::config::ScraperConfig;

/// The shared helpers handed to every site scraper.
#[derive(Debug, Clone, Default)]
pub struct Extractors {
    pub features: FeatureExtractor,
    pub images: ImageFilter,
    pub gps: GpsExtractor,
}

impl Extractors {
    #[must_use]
    pub fn from_config(config: &ScraperConfig) -> Self {
        Self {
            features: FeatureExtractor::new(),
            images: ImageFilter::new(&config.image_exclusions, config.max_images),
            gps: GpsExtractor::new(),
        }
    }
}
