use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use tracing::debug;

use crate::browser::{BrowserError, Dom, Page};
use crate::domain::{Coordinates, PropertyRecord};

/// Globals that agency templates commonly leave on `window`.
const COMMON_GLOBALS: [&str; 2] = [
    "(window.latitude && window.longitude) ? { lat: window.latitude, lng: window.longitude } : null",
    "(window.lat && window.lng) ? { lat: window.lat, lng: window.lng } : null",
];

const LAT_KEYS: [&str; 3] = ["lat", "latitude", "latitud"];
const LNG_KEYS: [&str; 4] = ["lng", "lon", "longitude", "longitud"];

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

/// Recovers listing coordinates, trying in-page script data, then map links
/// in the markup, then coordinate-looking text.
#[derive(Debug, Clone, Copy, Default)]
pub struct GpsExtractor;

impl GpsExtractor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Returns `Ok(None)` when no strategy finds anything. Only failures to
    /// talk to the page are errors; a missing script variable is not.
    pub async fn extract(
        &self,
        page: &dyn Page,
        text: Option<&str>,
        variable: Option<&str>,
    ) -> Result<Option<Coordinates>, BrowserError> {
        for expression in variable.into_iter().chain(COMMON_GLOBALS) {
            match page.evaluate(expression).await {
                Ok(value) => {
                    if let Some(coords) = coordinates_from_json(&value) {
                        debug!(strategy = "script", expression, "Found coordinates");
                        return Ok(Some(coords));
                    }
                }
                Err(e) if e.is_transport() => return Err(e),
                Err(_) => {}
            }
        }

        let html = page.content().await?;
        Ok(Self::extract_static(&html, text))
    }

    /// Markup and text strategies over an HTML snapshot.
    #[must_use]
    pub fn extract_static(html: &str, text: Option<&str>) -> Option<Coordinates> {
        if let Some(coords) = from_map_links(html) {
            debug!(strategy = "map_link", "Found coordinates");
            return Some(coords);
        }

        let body = match text {
            Some(t) => t.to_string(),
            None => Dom::parse(html).body_text(),
        };

        from_text(&body).or_else(|| from_text(html))
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads `{lat, lng}`-shaped objects under any of the usual key spellings.
#[must_use]
pub fn coordinates_from_json(value: &Value) -> Option<Coordinates> {
    let obj = value.as_object()?;
    let lat = LAT_KEYS.iter().find_map(|k| obj.get(*k).and_then(number))?;
    let lng = LNG_KEYS.iter().find_map(|k| obj.get(*k).and_then(number))?;
    Some(Coordinates::new(lat, lng)).filter(Coordinates::is_valid)
}

fn parse_pair(lat: &str, lng: &str) -> Option<Coordinates> {
    let coords = Coordinates::new(lat.parse().ok()?, lng.parse().ok()?);
    coords.is_valid().then_some(coords)
}

/// Coordinates encoded in Mapbox feedback or Google Maps URLs.
#[must_use]
pub fn from_map_links(html: &str) -> Option<Coordinates> {
    static MAPBOX: OnceLock<Regex> = OnceLock::new();
    static GOOGLE: OnceLock<Regex> = OnceLock::new();
    static AT: OnceLock<Regex> = OnceLock::new();
    static QUERY: OnceLock<Regex> = OnceLock::new();

    // Mapbox feedback links put longitude first: #/lng/lat/zoom
    let mapbox = get_regex(
        &MAPBOX,
        r"mapbox\.com/(?:map-)?feedback/[^#]*#/(-?\d+\.\d+)/(-?\d+\.\d+)",
    );
    if let Some(c) = mapbox.captures(html) {
        if let Some(coords) = parse_pair(&c[2], &c[1]) {
            return Some(coords);
        }
    }

    let google = get_regex(
        &GOOGLE,
        r"(?:destination|[?&]q|[?&]ll|[?&]query)=(-?\d+\.\d+)(?:,|%2C)\s*(-?\d+\.\d+)",
    );
    let at = get_regex(&AT, r"google\.[a-z.]+/maps/[^\s]*@(-?\d+\.\d+),(-?\d+\.\d+)");
    let query = get_regex(
        &QUERY,
        r"[?&](?:amp;)?lat=(-?\d+\.\d+)&(?:amp;)?(?:lng|lon)=(-?\d+\.\d+)",
    );

    [google, at, query]
        .into_iter()
        .flat_map(|re| re.captures_iter(html))
        .find_map(|c| parse_pair(&c[1], &c[2]))
}

/// `"latitud": x` / `"longitud": y` keys, then any bare decimal pair.
#[must_use]
pub fn from_text(text: &str) -> Option<Coordinates> {
    static LAT: OnceLock<Regex> = OnceLock::new();
    static LNG: OnceLock<Regex> = OnceLock::new();
    static PAIR: OnceLock<Regex> = OnceLock::new();

    let lat = get_regex(&LAT, r#"(?i)"?lat(?:itud|itude)?"?\s*[:=]\s*"?(-?\d+\.\d+)"#);
    let lng = get_regex(&LNG, r#"(?i)"?(?:lng|lon|longitud|longitude)"?\s*[:=]\s*"?(-?\d+\.\d+)"#);
    if let (Some(la), Some(lo)) = (lat.captures(text), lng.captures(text)) {
        if let Some(coords) = parse_pair(&la[1], &lo[1]) {
            return Some(coords);
        }
    }

    let pair = get_regex(&PAIR, r"(-?\d{1,2}\.\d{4,})\s*,\s*(-?\d{1,3}\.\d{4,})");
    pair.captures_iter(text)
        .find_map(|c| parse_pair(&c[1], &c[2]))
}

/// Discards coordinates implausibly far from the area being searched.
#[derive(Debug, Clone, Copy)]
pub struct DistanceFilter {
    pub anchor: Coordinates,
    pub max_km: f64,
}

impl DistanceFilter {
    #[must_use]
    pub const fn new(anchor: Coordinates, max_km: f64) -> Self {
        Self { anchor, max_km }
    }

    #[must_use]
    pub fn within_radius(&self, coords: &Coordinates) -> bool {
        within_radius(coords, &self.anchor, self.max_km)
    }

    /// Clears the record's coordinates when they fall outside the radius.
    /// Returns whether anything was cleared.
    pub fn apply(&self, record: &mut PropertyRecord) -> bool {
        match record.coordinates() {
            Some(coords) if !self.within_radius(&coords) => {
                record.set_coordinates(None);
                true
            }
            _ => false,
        }
    }
}

#[must_use]
pub fn within_radius(coords: &Coordinates, anchor: &Coordinates, max_km: f64) -> bool {
    coords.distance_km(anchor) <= max_km
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mapbox_feedback_link_is_lng_lat() {
        let html = r#"<a class="mapbox-improve-map" href="https://apps.mapbox.com/feedback/?owner=mapbox#/-75.57592/6.1766/15">Improve</a>"#;
        let coords = from_map_links(html).unwrap();
        assert!((coords.latitude - 6.1766).abs() < 1e-9);
        assert!((coords.longitude + 75.57592).abs() < 1e-9);
    }

    #[test]
    fn test_google_destination_link() {
        let html = r#"<a href="https://www.google.com/maps/dir/?api=1&destination=6.17426,-75.5862">Cómo llegar</a>"#;
        let coords = from_map_links(html).unwrap();
        assert!((coords.latitude - 6.17426).abs() < 1e-9);
        assert!((coords.longitude + 75.5862).abs() < 1e-9);
    }

    #[test]
    fn test_text_keys() {
        let text = r#"var data = {"latitud": 6.1701, "longitud": -75.5874};"#;
        let coords = from_text(text).unwrap();
        assert!((coords.latitude - 6.1701).abs() < 1e-9);
    }

    #[test]
    fn test_bare_pair_and_nothing() {
        assert!(from_text("Ubicación 6.17123, -75.58811 Envigado").is_some());
        assert!(from_text("Sin ubicación").is_none());
        assert!(from_text("lat: 0.0, lng: 0.0").is_none());
    }

    #[test]
    fn test_coordinates_from_json_variants() {
        assert!(coordinates_from_json(&json!({"latitud": "6.17", "longitud": "-75.58"})).is_some());
        assert!(coordinates_from_json(&json!({"lat": 6.17, "lon": -75.58})).is_some());
        assert!(coordinates_from_json(&json!(null)).is_none());
        assert!(coordinates_from_json(&json!({"lat": 6.17})).is_none());
    }

    #[test]
    fn test_distance_filter_clears_far_coordinates() {
        let filter = DistanceFilter::new(Coordinates::new(6.170_089, -75.587_481), 10.0);

        let mut near = PropertyRecord::new("s", "l");
        near.set_coordinates(Some(Coordinates::new(6.18, -75.59)));
        assert!(!filter.apply(&mut near));
        assert!(near.latitude.is_some());

        let mut far = PropertyRecord::new("s", "l");
        far.set_coordinates(Some(Coordinates::new(4.711, -74.0721)));
        assert!(filter.apply(&mut far));
        assert_eq!(far.coordinates(), None);
    }
}
