use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::debug;

use super::common::{self, capture, collect_links};
use super::{ScrapeError, ScraperSettings, SiteScraper};
use crate::browser::{Dom, Page};
use crate::config::ScraperOverride;
use crate::domain::{Neighborhood, PriceRange, PropertyRecord, SearchInput};
use crate::extract::Extractors;
use crate::extract::features::parse_price;

pub const SOURCE: &str = "livinmobiliaria";

const BASE_URL: &str = "https://www.livinmobiliaria.com";
const SEARCH_URL: &str =
    "https://www.livinmobiliaria.com/resultados?gestion=Arriendo&tipo=Apartamentos&s=municipio-en-envigado";

const MUNICIPALITY: &str = "Envigado";

const GALLERY: &str = ".gallery img, .carousel img, .slider-pro img, .fotorama__img";

pub struct Livinmobiliaria {
    settings: ScraperSettings,
    extractors: Extractors,
}

impl Livinmobiliaria {
    #[must_use]
    pub fn new(shared: &Extractors, overrides: Option<&ScraperOverride>) -> Self {
        let settings = ScraperSettings {
            search_concurrency: 3,
            detail_concurrency: 4,
            page_timeout: Duration::from_secs(60),
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

/// Detail URLs end in a slug naming the barrio; links for barrios outside
/// the covered set are dropped before any detail page is opened.
fn slug_neighborhood(link: &str) -> Option<Neighborhood> {
    let path = link.split(['?', '#']).next().unwrap_or(link);
    let last = path.trim_end_matches('/').rsplit('/').next()?;
    Neighborhood::detect(last)
}

#[must_use]
pub fn parse_links(html: &str) -> Vec<String> {
    let dom = Dom::parse(html);
    collect_links(dom.attrs("a[href]", "href"), BASE_URL, |l| {
        l.contains("detalle-propiedad") && slug_neighborhood(l).is_some()
    })
}

fn listing_code(link: &str, body: &str) -> Option<String> {
    static TAIL: OnceLock<Regex> = OnceLock::new();
    static LABEL: OnceLock<Regex> = OnceLock::new();

    let path = link.trim_end_matches('/');
    capture(get_regex(&TAIL, r"(\d+)$"), path)
        .or_else(|| capture(get_regex(&LABEL, r"(?i)C[óo]digo:?\s*(\d+)"), body))
        .map(|digits| format!("LIV-{digits}"))
}

/// Returns `None` for removed listings and for listings whose title and
/// text name none of the covered neighborhoods.
#[must_use]
pub fn parse_detail(html: &str, link: &str, extractors: &Extractors) -> Option<(PropertyRecord, String)> {
    let dom = Dom::parse(html);
    let body = dom.body_text();

    if common::looks_removed(&body) {
        return None;
    }

    let title = dom.first_text("h1").unwrap_or_default();
    let neighborhood = Neighborhood::detect(&title)
        .or_else(|| slug_neighborhood(link))
        .or_else(|| Neighborhood::detect(&body))?;

    let mut record = PropertyRecord::new(SOURCE, link);
    record.title = title;
    record.code = listing_code(link, &body).unwrap_or_default();
    record.location = neighborhood.name().to_string();
    record.price = dom
        .texts(".price, .precio, .inmueble-precio")
        .into_iter()
        .filter(|t| t.contains('$'))
        .find_map(|t| parse_price(&t));
    record.description = dom
        .first_text(".description, .descripcion, #descripcion")
        .unwrap_or_default();

    let mut images = extractors
        .images
        .filter(&dom.attrs(GALLERY, "src"), link);
    if images.is_empty() {
        let any: Vec<String> = dom
            .attrs("img", "src")
            .into_iter()
            .filter(|src| src.starts_with("http"))
            .collect();
        images = extractors.images.filter(&any, link);
    }
    record.images = images;

    Some((record, body))
}

#[async_trait]
impl SiteScraper for Livinmobiliaria {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn display_name(&self) -> &'static str {
        "Livin Inmobiliaria"
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    fn search_inputs(&self, price_ranges: &[PriceRange]) -> Vec<SearchInput> {
        price_ranges
            .iter()
            .map(|range| {
                SearchInput::new(
                    format!("{SEARCH_URL}&rango-precio={}-{}", range.min, range.max),
                    MUNICIPALITY,
                )
            })
            .collect()
    }

    async fn extract_links(
        &self,
        page: &dyn Page,
        search_url: &str,
    ) -> Result<Vec<String>, ScrapeError> {
        common::open(page, search_url, self.settings.search_load_state, &self.settings).await?;

        if !common::wait_for(page, "a[href*='detalle-propiedad']", &self.settings).await? {
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
        _neighborhood: &str,
    ) -> Result<Option<PropertyRecord>, ScrapeError> {
        common::open(page, link, self.settings.detail_load_state, &self.settings).await?;
        common::wait_for(page, "h1", &self.settings).await?;

        let html = page.content().await?;
        let Some((mut record, body)) = parse_detail(&html, link, &self.extractors) else {
            debug!(source = SOURCE, link, "Listing outside covered neighborhoods");
            return Ok(None);
        };

        common::complete_record(page, &mut record, &self.extractors, &body, None).await?;
        Ok(Some(record))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scraper() -> Livinmobiliaria {
        Livinmobiliaria::new(&Extractors::default(), None)
    }

    #[test]
    fn test_search_inputs() {
        let inputs = scraper().search_inputs(&[PriceRange::new(2_500_000, 3_500_000)]);
        assert_eq!(inputs.len(), 1);
        assert!(inputs[0].url.ends_with("&rango-precio=2500000-3500000"));
        assert_eq!(inputs[0].neighborhood, "Envigado");
        assert_eq!(scraper().settings().page_timeout, Duration::from_secs(60));
    }

    #[test]
    fn test_parse_links_filters_by_barrio_slug() {
        let html = r#"
            <a href="/detalle-propiedad/apartamento-en-arriendo-en-envigado-zuniga-4410">Zuñiga</a>
            <a href="/detalle-propiedad/apartamento-en-arriendo-en-envigado-el-esmeraldal-4411">Otro</a>
            <a href="/resultados?page=2">Más</a>
        "#;
        assert_eq!(
            parse_links(html),
            vec!["https://www.livinmobiliaria.com/detalle-propiedad/apartamento-en-arriendo-en-envigado-zuniga-4410"]
        );
    }

    #[test]
    fn test_parse_detail() {
        let html = r#"
            <html><body>
              <h1>Apartamento en arriendo en La Magnolia</h1>
              <div class="precio">Canon mensual</div>
              <div class="price">$ 3.300.000</div>
              <div class="description">Apartamento remodelado cerca al parque principal.</div>
              <div class="fotorama"><img class="fotorama__img" src="https://cdn.livin.com/4500/a.jpg"></div>
            </body></html>
        "#;
        let link = "https://www.livinmobiliaria.com/detalle-propiedad/apartamento-la-magnolia-4500";
        let (record, _) = parse_detail(html, link, &scraper().extractors).unwrap();

        assert_eq!(record.location, "La Magnolia");
        assert_eq!(record.code, "LIV-4500");
        assert_eq!(record.price, Some(3_300_000));
        assert_eq!(record.images, vec!["https://cdn.livin.com/4500/a.jpg"]);
    }

    #[test]
    fn test_listing_outside_covered_barrios_is_dropped() {
        let html = "<html><body><h1>Apartamento en El Esmeraldal</h1><p>Vista a la montaña</p></body></html>";
        let link = "https://www.livinmobiliaria.com/detalle-propiedad/apartamento-el-esmeraldal-77";
        assert!(parse_detail(html, link, &scraper().extractors).is_none());
    }

    #[test]
    fn test_image_fallback_to_any_absolute_image() {
        let html = r#"<html><body><h1>Apto en Jardines</h1>
            <img src="/static/logo.png"><img src="https://cdn.livin.com/1/a.jpg"></body></html>"#;
        let (record, _) = parse_detail(
            html,
            "https://www.livinmobiliaria.com/detalle-propiedad/apto-jardines-1",
            &scraper().extractors,
        )
        .unwrap();
        assert_eq!(record.images, vec!["https://cdn.livin.com/1/a.jpg"]);
    }
}
