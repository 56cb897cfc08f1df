use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::common::{self, capture, collect_links};
use super::{ScrapeError, ScraperSettings, SiteScraper};
use crate::browser::{Dom, LoadState, Page};
use crate::config::ScraperOverride;
use crate::domain::{Coordinates, Neighborhood, PriceRange, PropertyRecord, SearchInput};
use crate::extract::Extractors;
use crate::extract::features::parse_price;
use crate::extract::gps::from_map_links;

pub const SOURCE: &str = "arrendamientos_las_vegas";

const BASE_URL: &str = "https://arrendamientoslasvegas.com";
const SEARCH_URL: &str = "https://arrendamientoslasvegas.com/inmuebles/arriendo?city=5266&type=1";

/// Neighborhood filter values as the site spells them.
const BARRIOS: [(Neighborhood, &str); 8] = [
    (Neighborhood::LaAbadia, "La+Abadia+"),
    (Neighborhood::LomaBenedictinos, "Loma+Benedictinos"),
    (Neighborhood::ElPortal, "El+Portal"),
    (Neighborhood::LaMagnolia, "La+Magnolia"),
    (Neighborhood::OtraParte, "Otra+Parte"),
    (Neighborhood::Pontevedra, "Pontevedra"),
    (Neighborhood::SanMarcos, "San+Marcos"),
    (Neighborhood::Zuniga, "Bosques+De+Zu%C3%B1iga+"),
];

const FEATURE_CHIP: &str = "span.rounded-lg.bg-neutral-200";

pub struct ArrendamientosLasVegas {
    settings: ScraperSettings,
    extractors: Extractors,
}

impl ArrendamientosLasVegas {
    #[must_use]
    pub fn new(shared: &Extractors, overrides: Option<&ScraperOverride>) -> Self {
        let settings = ScraperSettings {
            search_load_state: LoadState::NetworkIdle,
            detail_load_state: LoadState::NetworkIdle,
            image_exclusions: ["twitter", "instagram", "button", "arrow"].map(String::from).to_vec(),
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

/// The map widget sometimes centres on a default far outside the metro area.
fn in_metro_area(coords: &Coordinates) -> bool {
    (6.0..=6.4).contains(&coords.latitude) && (-76.0..=-75.0).contains(&coords.longitude)
}

#[must_use]
pub fn parse_links(html: &str) -> Vec<String> {
    static DETAIL: OnceLock<Regex> = OnceLock::new();
    let detail = get_regex(&DETAIL, r"/\d+$");

    let dom = Dom::parse(html);
    collect_links(dom.attrs("a[href]", "href"), BASE_URL, |l| {
        l.contains("inmuebles/") && detail.is_match(l)
    })
}

#[must_use]
pub fn parse_detail(
    html: &str,
    link: &str,
    neighborhood: &str,
    extractors: &Extractors,
) -> Option<(PropertyRecord, String)> {
    static CODE: OnceLock<Regex> = OnceLock::new();
    static LINK_CODE: OnceLock<Regex> = OnceLock::new();
    static PRICE: OnceLock<Regex> = OnceLock::new();

    let dom = Dom::parse(html);
    let body = dom.body_text();

    if common::looks_removed(&body) {
        return None;
    }

    let mut record = PropertyRecord::new(SOURCE, link);
    record.title = dom
        .first_text("span.text-xl.font-bold")
        .or_else(|| dom.first_text("h1"))
        .unwrap_or_default();
    record.code = capture(get_regex(&CODE, r"(?i)C[óo]digo del inmueble:\s*(\d+)"), &body)
        .or_else(|| capture(get_regex(&LINK_CODE, r"/(\d+)$"), link))
        .unwrap_or_default();
    record.location = neighborhood.to_string();
    record.price = capture(get_regex(&PRICE, r"(?i)precio total:?\s*([^\n]*\d[^\n]*)"), &body)
        .as_deref()
        .and_then(parse_price);
    record.description = dom
        .texts("p")
        .into_iter()
        .find(|p| p.chars().count() > 50)
        .unwrap_or_default();

    // Chips read "3 Habitaciones", "2 Baños", "Área 75 m²".
    let chips = dom.texts(FEATURE_CHIP).join("\n");
    extractors.features.extract(&chips).fill_missing(&mut record);

    record.images = extractors
        .images
        .filter(&dom.attrs(".no-scroll img", "src"), link);

    let map_href = dom.first_attr("a.mapbox-improve-map", "href");
    record.set_coordinates(
        map_href
            .as_deref()
            .and_then(from_map_links)
            .filter(in_metro_area),
    );

    Some((record, body))
}

#[async_trait]
impl SiteScraper for ArrendamientosLasVegas {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn display_name(&self) -> &'static str {
        "Arrendamientos Las Vegas"
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    fn search_inputs(&self, price_ranges: &[PriceRange]) -> Vec<SearchInput> {
        BARRIOS
            .iter()
            .flat_map(|(neighborhood, param)| {
                price_ranges.iter().map(move |range| {
                    SearchInput::new(
                        format!(
                            "{SEARCH_URL}&pcmin={}&pcmax={}&minarea=50&neighborhood={param}",
                            range.min, range.max
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

        if !common::wait_for(page, "a[href*='inmuebles/']", &self.settings).await? {
            debug!(source = SOURCE, url = search_url, "No results on search page");
            return Ok(Vec::new());
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
        common::wait_for(page, "span.text-xl.font-bold", &self.settings).await?;

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
        <html><body>
          <span class="text-xl font-bold">Apartamento en San Marcos</span>
          <div><span>Código del inmueble:</span> <span>5531</span></div>
          <div><span>Precio total:</span> <span>$2.750.000</span></div>
          <span class="rounded-lg bg-neutral-200">3 Habitaciones</span>
          <span class="rounded-lg bg-neutral-200">2 Baños</span>
          <span class="rounded-lg bg-neutral-200">78 m²</span>
          <span class="rounded-lg bg-neutral-200">1 Parqueadero</span>
          <p>Apartamento para estrenar en San Marcos con excelente iluminación natural.</p>
          <div class="no-scroll">
            <img src="https://fotos.domus.la/5531/1.jpg">
            <img src="/img/arrow-right.svg">
          </div>
          <a class="mapbox-improve-map" href="https://apps.mapbox.com/feedback/?owner=mapbox#/-75.5861/6.1712/16">Mejorar</a>
        </body></html>
    "#;

    fn scraper() -> ArrendamientosLasVegas {
        ArrendamientosLasVegas::new(&Extractors::default(), None)
    }

    #[test]
    fn test_search_inputs() {
        let inputs = scraper().search_inputs(&[
            PriceRange::new(2_000_000, 2_500_000),
            PriceRange::new(2_500_000, 3_500_000),
        ]);
        assert_eq!(inputs.len(), BARRIOS.len() * 2);
        let zuniga = inputs.iter().find(|i| i.neighborhood == "Zuñiga").unwrap();
        assert!(zuniga.url.ends_with("neighborhood=Bosques+De+Zu%C3%B1iga+"));
    }

    #[test]
    fn test_parse_links() {
        let html = r#"
            <a href="/inmuebles/5531">Ver</a>
            <a href="https://arrendamientoslasvegas.com/inmuebles/arriendo">Todos</a>
            <a href="/contacto/1">Contacto</a>
        "#;
        assert_eq!(
            parse_links(html),
            vec!["https://arrendamientoslasvegas.com/inmuebles/5531"]
        );
    }

    #[test]
    fn test_parse_detail() {
        let link = "https://arrendamientoslasvegas.com/inmuebles/5531";
        let (record, _) = parse_detail(DETAIL, link, "San Marcos", &scraper().extractors).unwrap();

        assert_eq!(record.title, "Apartamento en San Marcos");
        assert_eq!(record.code, "5531");
        assert_eq!(record.price, Some(2_750_000));
        assert_eq!(record.bedrooms, Some(3));
        assert_eq!(record.bathrooms, Some(2));
        assert_eq!(record.area, Some(78));
        assert_eq!(record.parking, Some(1));
        assert_eq!(record.images, vec!["https://fotos.domus.la/5531/1.jpg"]);
        assert!(record.coordinates().is_some());
    }

    #[test]
    fn test_map_default_outside_metro_is_ignored() {
        let html = r#"<span class="text-xl font-bold">Apto</span>
            <a class="mapbox-improve-map" href="https://apps.mapbox.com/feedback/#/-74.0721/4.711/12">x</a>"#;
        let (record, _) = parse_detail(
            html,
            "https://arrendamientoslasvegas.com/inmuebles/1",
            "Pontevedra",
            &scraper().extractors,
        )
        .unwrap();
        assert_eq!(record.coordinates(), None);
        assert_eq!(record.code, "1");
    }
}
