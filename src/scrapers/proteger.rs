use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::common::{self, capture, collect_links, format_thousands};
use super::{ScrapeError, ScraperSettings, SiteScraper};
use crate::browser::{Dom, LoadState, Page};
use crate::config::ScraperOverride;
use crate::domain::{Neighborhood, PriceRange, PropertyRecord, SearchInput};
use crate::extract::Extractors;
use crate::extract::features::{parse_count, parse_estrato, parse_number, parse_price};

pub const SOURCE: &str = "proteger";

const BASE_URL: &str = "https://inmobiliariaproteger.com";
const SEARCH_URL: &str = "https://inmobiliariaproteger.com/s?id_country=1&id_region=2&id_city=291&id_location=";

/// Zone ids of the site's location tree. La Abadia is split in two zones.
const ZONES: [(Neighborhood, &str); 9] = [
    (Neighborhood::LaAbadia, "388040"),
    (Neighborhood::LomaBenedictinos, "377268"),
    (Neighborhood::ElPortal, "377212"),
    (Neighborhood::LaAbadia, "388041"),
    (Neighborhood::LaMagnolia, "377213"),
    (Neighborhood::OtraParte, "667091"),
    (Neighborhood::Pontevedra, "377215"),
    (Neighborhood::SanMarcos, "377214"),
    (Neighborhood::Zuniga, "377226"),
];

const FEATURE_ITEM: &str = "li";
const PRICE_SELECTORS: &str = ".price, .precio, .property-price, .precio-inmueble";

pub struct Proteger {
    settings: ScraperSettings,
    extractors: Extractors,
}

impl Proteger {
    #[must_use]
    pub fn new(shared: &Extractors, overrides: Option<&ScraperOverride>) -> Self {
        let settings = ScraperSettings {
            search_load_state: LoadState::NetworkIdle,
            ..ScraperSettings::default()
        }
        .with_override(overrides);

        Self {
            extractors: settings.site_extractors(shared),
            settings,
        }
    }
}

fn get_regex(re: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    re.get_or_init(|| Regex::new(pattern).expect("Invalid regex pattern defined in code"))
}

fn search_url(zone: &str, range: &PriceRange) -> String {
    format!(
        "{SEARCH_URL}&id_zone={zone}&id_property_type=2&id_property_condition=&business_type%5B%5D=for_rent&bedrooms=&bathrooms=&min_price={}&max_price={}",
        format_thousands(range.min, '.'),
        format_thousands(range.max, '.'),
    )
}

fn is_detail_link(link: &str) -> bool {
    static NUMERIC_TAIL: OnceLock<Regex> = OnceLock::new();

    if link.contains("/s/") || link.contains('?') || link.contains("business_type") {
        return false;
    }
    let lower = link.to_lowercase();
    (lower.contains("apartamento") && lower.contains("alquiler"))
        || (link.starts_with(BASE_URL) && get_regex(&NUMERIC_TAIL, r"/\d+$").is_match(link))
}

#[must_use]
pub fn parse_links(html: &str, search_url: &str) -> Vec<String> {
    let dom = Dom::parse(html);
    collect_links(dom.attrs("a[href]", "href"), BASE_URL, |l| {
        l != search_url && is_detail_link(l)
    })
}

/// Price from the dedicated element, then from a "$ ... COP" heading, then
/// from the page title.
fn find_price(dom: &Dom, title_parts: &[&str]) -> Option<i64> {
    dom.texts(PRICE_SELECTORS)
        .into_iter()
        .find_map(|t| parse_price(&t))
        .or_else(|| {
            dom.texts("h1, h2, h3, h4")
                .into_iter()
                .filter(|t| t.contains('$') && t.contains("COP"))
                .find_map(|t| parse_price(&t))
        })
        .or_else(|| {
            title_parts
                .iter()
                .filter(|p| p.contains('$'))
                .find_map(|p| parse_price(p))
        })
}

#[must_use]
pub fn parse_detail(
    html: &str,
    link: &str,
    neighborhood: &str,
    extractors: &Extractors,
) -> Option<(PropertyRecord, String)> {
    static LINK_CODE: OnceLock<Regex> = OnceLock::new();

    let dom = Dom::parse(html);
    let body = dom.body_text();

    if common::looks_removed(&body) {
        return None;
    }

    let page_title = dom.title().unwrap_or_default();
    let title_parts: Vec<&str> = page_title.split('-').map(str::trim).collect();

    // Labels overlap ("Área Construida" vs "Área"), so the specific ones go first.
    let value = |labels: &[&str]| {
        labels
            .iter()
            .find_map(|label| dom.value_for_label(FEATURE_ITEM, label))
    };

    let mut record = PropertyRecord::new(SOURCE, link);
    record.title = title_parts
        .first()
        .map(ToString::to_string)
        .filter(|t| !t.is_empty())
        .or_else(|| dom.first_text("h1"))
        .unwrap_or_default();
    record.code = value(&["Código"])
        .and_then(|v| v.split_whitespace().next().map(ToString::to_string))
        .or_else(|| capture(get_regex(&LINK_CODE, r"/(\d+)$"), link))
        .unwrap_or_default();
    record.location = neighborhood.to_string();
    record.price = find_price(&dom, &title_parts);
    record.area = value(&["Área Construida", "Área Privada", "Área"])
        .as_deref()
        .and_then(parse_number);
    record.bedrooms = value(&["Alcoba", "Habitaciones"])
        .as_deref()
        .and_then(parse_count);
    record.bathrooms = value(&["Baños"]).as_deref().and_then(parse_count);
    record.parking = value(&["Garaje", "Parqueadero"])
        .as_deref()
        .and_then(parse_count);
    record.estrato = value(&["Estrato"]).as_deref().and_then(parse_estrato);
    record.description = dom
        .first_text("#description, .description")
        .unwrap_or_default();

    let mut images = dom.attrs(".swiper-slide img", "src");
    images.extend(dom.attrs(".swiper-slide img", "data-src"));
    record.images = extractors.images.filter(&images, link);

    Some((record, body))
}

#[async_trait]
impl SiteScraper for Proteger {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn display_name(&self) -> &'static str {
        "Inmobiliaria Proteger"
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    fn search_inputs(&self, price_ranges: &[PriceRange]) -> Vec<SearchInput> {
        ZONES
            .iter()
            .flat_map(|(neighborhood, zone)| {
                price_ranges
                    .iter()
                    .map(move |range| SearchInput::new(search_url(zone, range), neighborhood.name()))
            })
            .collect()
    }

    async fn extract_links(
        &self,
        page: &dyn Page,
        search_url: &str,
    ) -> Result<Vec<String>, ScrapeError> {
        common::open(page, search_url, self.settings.search_load_state, &self.settings).await?;

        if !common::wait_for(page, "a[href]", &self.settings).await? {
            debug!(source = SOURCE, url = search_url, "Search page rendered no links");
            return Ok(Vec::new());
        }

        let html = page.content().await?;
        Ok(parse_links(&html, search_url))
    }

    async fn extract_details(
        &self,
        page: &dyn Page,
        link: &str,
        neighborhood: &str,
    ) -> Result<Option<PropertyRecord>, ScrapeError> {
        common::open(page, link, self.settings.detail_load_state, &self.settings).await?;
        common::wait_for(page, "#description, .description", &self.settings).await?;

        let html = page.content().await?;
        let Some((mut record, body)) = parse_detail(&html, link, neighborhood, &self.extractors)
        else {
            return Ok(None);
        };

        common::complete_record(page, &mut record, &self.extractors, &body, None).await?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DETAIL: &str = r#"
        <html><head><title>Apartamento en alquiler en Pontevedra - Inmobiliaria Proteger</title></head>
        <body>
          <h2>$ 3.000.000 COP</h2>
          <ul>
            <li><strong>Código:</strong> 8841</li>
            <li><strong>Área Construida:</strong> 92,5 m²</li>
            <li><strong>Área Privada:</strong> 88 m²</li>
            <li><strong>Alcobas:</strong> 3</li>
            <li><strong>Baños:</strong> 2</li>
            <li><strong>Garaje:</strong> 2</li>
            <li><strong>Estrato:</strong> 5</li>
          </ul>
          <div id="description">Amplio apartamento con balcón y zonas comunes.</div>
          <div class="swiper-slide"><img src="https://img.wasi.co/8841-1.jpg"></div>
          <div class="swiper-slide"><img data-src="https://img.wasi.co/8841-2.jpg"></div>
        </body></html>
    "#;

    fn scraper() -> Proteger {
        Proteger::new(&Extractors::default(), None)
    }

    #[test]
    fn test_search_prices_use_dotted_thousands() {
        let inputs = scraper().search_inputs(&[PriceRange::new(2_500_000, 3_500_000)]);
        assert_eq!(inputs.len(), ZONES.len());
        assert!(inputs[0].url.contains("id_zone=388040"));
        assert!(inputs[0].url.ends_with("min_price=2.500.000&max_price=3.500.000"));
        assert_eq!(inputs[0].neighborhood, "La Abadia");
        assert_eq!(inputs[3].neighborhood, "La Abadia");
    }

    #[test]
    fn test_parse_links_skips_search_pages() {
        let search = "https://inmobiliariaproteger.com/s?id_zone=1";
        let html = r#"
            <a href="/apartamento-en-alquiler-pontevedra/8841">Ver</a>
            <a href="/s/envigado">Envigado</a>
            <a href="/s?business_type=for_rent">Arriendos</a>
            <a href="https://inmobiliariaproteger.com/inmueble/9001">Otro</a>
            <a href="https://facebook.com/proteger/123">Facebook</a>
        "#;
        assert_eq!(
            parse_links(html, search),
            vec![
                "https://inmobiliariaproteger.com/apartamento-en-alquiler-pontevedra/8841",
                "https://inmobiliariaproteger.com/inmueble/9001",
            ]
        );
    }

    #[test]
    fn test_parse_detail() {
        let link = "https://inmobiliariaproteger.com/apartamento-en-alquiler-pontevedra/8841";
        let (record, _) = parse_detail(DETAIL, link, "Pontevedra", &scraper().extractors).unwrap();

        assert_eq!(record.title, "Apartamento en alquiler en Pontevedra");
        assert_eq!(record.code, "8841");
        assert_eq!(record.price, Some(3_000_000));
        assert_eq!(record.area, Some(93));
        assert_eq!(record.bedrooms, Some(3));
        assert_eq!(record.bathrooms, Some(2));
        assert_eq!(record.parking, Some(2));
        assert_eq!(record.estrato, Some(5));
        assert_eq!(record.description, "Amplio apartamento con balcón y zonas comunes.");
        assert_eq!(
            record.images,
            vec!["https://img.wasi.co/8841-1.jpg", "https://img.wasi.co/8841-2.jpg"]
        );
    }

    #[test]
    fn test_price_from_title_when_markup_has_none() {
        let html = "<html><head><title>Apartamento - $ 2.600.000 - Proteger</title></head><body></body></html>";
        let (record, _) = parse_detail(
            html,
            "https://inmobiliariaproteger.com/apartamento/12",
            "El Portal",
            &scraper().extractors,
        )
        .unwrap();
        assert_eq!(record.price, Some(2_600_000));
        assert_eq!(record.code, "12");
    }
}
