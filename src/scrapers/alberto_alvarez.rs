use async_trait::async_trait;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::{debug, warn};

use super::common::{self, capture, collect_links};
use super::{ScrapeError, ScraperSettings, SiteScraper};
use crate::browser::{Dom, LoadState, Page};
use crate::config::ScraperOverride;
use crate::domain::{Neighborhood, PriceRange, PropertyRecord, SearchInput};
use crate::extract::Extractors;
use crate::extract::features::{parse_count, parse_estrato, parse_number, parse_price};
use crate::extract::gps::coordinates_from_json;

pub const SOURCE: &str = "alberto_alvarez";

const BASE_URL: &str = "https://albertoalvarez.com";
const SEARCH_URL: &str =
    "https://albertoalvarez.com/inmuebles/arrendamientos/apartamento/envigado/envigado";

/// Listing payload the site embeds for its own frontend.
const LISTING_JSON: &str = "textarea.field-property";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct ListingJson {
    code: Value,
    property_type: Option<String>,
    sector_name: Option<String>,
    zone_name: Option<String>,
    rent_value: Value,
    built_area: Value,
    number_of_rooms: Value,
    household_features: Option<HouseholdFeatures>,
    baths: Value,
    stratum: Value,
    property_images: Option<Vec<Value>>,
    description: Option<String>,
    latitude: Value,
    longitude: Value,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct HouseholdFeatures {
    baths: Value,
    #[serde(rename = "AASimpleparking")]
    parking: Value,
}

fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Number(n) => Some(n.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

fn image_src(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(obj) => ["url", "imageUrl", "src", "image"]
            .iter()
            .find_map(|k| obj.get(*k).and_then(Value::as_str))
            .map(ToString::to_string),
        _ => None,
    }
}

pub struct AlbertoAlvarez {
    settings: ScraperSettings,
    extractors: Extractors,
}

impl AlbertoAlvarez {
    #[must_use]
    pub fn new(shared: &Extractors, overrides: Option<&ScraperOverride>) -> Self {
        let settings = ScraperSettings {
            detail_concurrency: 8,
            search_load_state: LoadState::NetworkIdle,
            detail_load_state: LoadState::NetworkIdle,
            max_links: Some(50),
            ..ScraperSettings::default()
        }
        .with_override(overrides);

        Self {
            extractors: settings.site_extractors(shared),
            settings,
        }
    }
}

fn code_from_link(link: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"/AA-(\d+)").expect("Invalid regex pattern defined in code")
    });
    capture(re, link).map(|n| format!("AA-{n}"))
}

#[must_use]
pub fn parse_links(html: &str) -> Vec<String> {
    let dom = Dom::parse(html);
    collect_links(dom.attrs("a[href*='/inmuebles/detalle/']", "href"), BASE_URL, |_| true)
}

fn record_from_json(
    json: &ListingJson,
    link: &str,
    neighborhood: &str,
    extractors: &Extractors,
) -> PropertyRecord {
    let mut record = PropertyRecord::new(SOURCE, link);

    record.code = value_text(&json.code)
        .or_else(|| code_from_link(link))
        .unwrap_or_default();
    record.title = format!(
        "{} EN ARRIENDO",
        json.property_type.as_deref().unwrap_or("Inmueble")
    )
    .to_uppercase();

    let location = [json.sector_name.as_deref(), json.zone_name.as_deref()]
        .into_iter()
        .flatten()
        .map(str::trim)
        .find(|s| !s.is_empty())
        .unwrap_or(neighborhood);
    record.location = Neighborhood::label(location);

    let household = json.household_features.as_ref();
    record.price = value_text(&json.rent_value).as_deref().and_then(parse_price);
    record.area = value_text(&json.built_area).as_deref().and_then(parse_number);
    record.bedrooms = value_text(&json.number_of_rooms).as_deref().and_then(parse_count);
    record.bathrooms = household
        .and_then(|h| value_text(&h.baths))
        .or_else(|| value_text(&json.baths))
        .as_deref()
        .and_then(parse_count);
    record.parking = household
        .and_then(|h| value_text(&h.parking))
        .as_deref()
        .and_then(parse_count);
    record.estrato = value_text(&json.stratum).as_deref().and_then(parse_estrato);
    record.description = json.description.clone().unwrap_or_default();

    let raw_images: Vec<String> = json
        .property_images
        .iter()
        .flatten()
        .filter_map(image_src)
        .collect();
    record.images = extractors.images.filter(&raw_images, link);

    let coords = serde_json::json!({ "lat": json.latitude, "lng": json.longitude });
    record.set_coordinates(coordinates_from_json(&coords));

    record
}

fn record_from_markup(
    dom: &Dom,
    body: &str,
    link: &str,
    neighborhood: &str,
    extractors: &Extractors,
) -> PropertyRecord {
    let mut record = PropertyRecord::new(SOURCE, link);
    record.code = code_from_link(link).unwrap_or_default();
    record.title = dom
        .first_text("h1")
        .unwrap_or_else(|| "APARTAMENTO EN ARRIENDO".to_string());
    record.location = dom
        .first_text(".property-location, .location")
        .and_then(|l| Neighborhood::canonicalize(&l))
        .map_or_else(|| Neighborhood::label(neighborhood), |n| n.name().to_string());
    record.price = dom
        .first_text(".property-price, .price")
        .as_deref()
        .and_then(parse_price);
    record.images = extractors.images.filter(
        &dom.attrs(".thumb img, .main-image img, .property-gallery img", "src"),
        link,
    );
    extractors.features.extract(body).fill_missing(&mut record);
    record
}

/// Prefers the embedded JSON payload and falls back to the rendered markup.
/// Listings flagged as unavailable or without a rent are dropped.
#[must_use]
pub fn parse_detail(
    html: &str,
    link: &str,
    neighborhood: &str,
    extractors: &Extractors,
) -> Option<(PropertyRecord, String)> {
    let dom = Dom::parse(html);
    let body = dom.body_text();

    if common::looks_removed(&body) {
        return None;
    }

    let from_json = dom.field_value(LISTING_JSON).and_then(|raw| {
        serde_json::from_str::<ListingJson>(raw.trim())
            .map_err(|e| warn!(source = SOURCE, link, error = %e, "Malformed listing JSON"))
            .ok()
    });

    let record = match from_json {
        Some(json) => record_from_json(&json, link, neighborhood, extractors),
        None => {
            debug!(source = SOURCE, link, "No listing JSON, reading markup");
            record_from_markup(&dom, &body, link, neighborhood, extractors)
        }
    };

    if record.title.to_uppercase().contains("NO DISPONIBLE") || record.price.is_none() {
        debug!(source = SOURCE, link, "Skipping unavailable listing");
        return None;
    }

    Some((record, body))
}

#[async_trait]
impl SiteScraper for AlbertoAlvarez {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn display_name(&self) -> &'static str {
        "Alberto Álvarez"
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    fn search_inputs(&self, price_ranges: &[PriceRange]) -> Vec<SearchInput> {
        Neighborhood::ALL
            .iter()
            .flat_map(|neighborhood| {
                price_ranges.iter().map(move |range| {
                    SearchInput::new(
                        format!(
                            "{SEARCH_URL}/{}/?rentFrom={}&rentTo={}&roomsFrom=1&roomsTo=3",
                            neighborhood.slug('-'),
                            range.min,
                            range.max
                        ),
                        neighborhood.name(),
                    )
                })
            })
            .collect()
    }

    async fn extract_links(
        &self,
        page: &dyn Page,
        search_url: &str,
    ) -> Result<Vec<String>, ScrapeError> {
        common::open(page, search_url, self.settings.search_load_state, &self.settings).await?;

        // Results load lazily while scrolling.
        for _ in 0..3 {
            if let Err(e) = page
                .evaluate("window.scrollTo(0, document.body.scrollHeight)")
                .await
            {
                if e.is_transport() {
                    return Err(e.into());
                }
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(500)).await;
        }

        let html = page.content().await?;
        Ok(parse_links(&html))
    }

    async fn extract_details(
        &self,
        page: &dyn Page,
        link: &str,
        neighborhood: &str,
    ) -> Result<Option<PropertyRecord>, ScrapeError> {
        common::open(page, link, self.settings.detail_load_state, &self.settings).await?;

        let html = page.content().await?;
        let Some((mut record, body)) = parse_detail(&html, link, neighborhood, &self.extractors)
        else {
            return Ok(None);
        };

        common::complete_record(page, &mut record, &self.extractors, &body, None).await?;
        Ok(Some(record))
    }
}
