use async_trait::async_trait;
use regex::Regex;
use std::sync::OnceLock;
use tracing::debug;

use super::common::{self, capture, collect_links};
use super::{ScrapeError, ScraperSettings, SiteScraper};
use crate::browser::{Dom, LoadState, Page};
use crate::config::ScraperOverride;
use crate::domain::{Neighborhood, PriceRange, PropertyRecord, SearchInput};
use crate::extract::Extractors;
use crate::extract::features::parse_price;

pub const SOURCE: &str = "escala_inmobiliaria";

const BASE_URL: &str = "https://escalainmobiliaria.com.co/";
const SEARCH_URL: &str =
    "https://escalainmobiliaria.com.co/inmuebles/g/arriendo/t/apartamentos/c/envigado/n";

/// Results span several neighborhoods, so searches are labelled with the
/// municipality and each detail page is matched to its barrio afterwards.
const MUNICIPALITY: &str = "Envigado";

/// Listing payload the site's viewer script leaves on `window`.
const GPS_VARIABLE: &str = "window.VISUALINMUEBLE_INMUEBLE";

const RESULT_LINK: &str = "a.inmueblelink";

pub struct EscalaInmobiliaria {
    settings: ScraperSettings,
    extractors: Extractors,
}

impl EscalaInmobiliaria {
    #[must_use]
    pub fn new(shared: &Extractors, overrides: Option<&ScraperOverride>) -> Self {
        let settings = ScraperSettings {
            search_load_state: LoadState::NetworkIdle,
            image_exclusions: ["twitter", "openstreetmap", "psenuevo", "simicrm"].map(String::from).to_vec(),
            ..ScraperSettings::default()
        }
        .with_override(overrides);

        Self {
            extractors: settings.site_extractors(shared),
            settings,
        }
    }
}

/// `el_portal-o-jardines-o-...`: every covered barrio except Otra Parte,
/// which the site files under a different municipality.
fn neighborhood_path() -> String {
    Neighborhood::ALL
        .iter()
        .filter(|n| **n != Neighborhood::OtraParte)
        .map(|n| n.slug('_'))
        .collect::<Vec<_>>()
        .join("-o-")
}

fn code_from_link(link: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"[_-](\d+-\d+|\d+)/?$").expect("Invalid regex pattern defined in code")
    });
    capture(re, link)
}

#[must_use]
pub fn parse_links(html: &str) -> Vec<String> {
    let dom = Dom::parse(html);
    collect_links(dom.attrs(RESULT_LINK, "href"), BASE_URL, |_| true)
}

#[must_use]
pub fn parse_detail(
    html: &str,
    link: &str,
    neighborhood: &str,
    extractors: &Extractors,
) -> Option<(PropertyRecord, String)> {
    static PRICE: OnceLock<Regex> = OnceLock::new();

    let dom = Dom::parse(html);
    let body = dom.body_text();

    if common::looks_removed(&body) {
        return None;
    }

    let mut record = PropertyRecord::new(SOURCE, link);
    record.title = dom.first_text("h1").unwrap_or_default();
    record.code = code_from_link(link).unwrap_or_default();
    record.location = Neighborhood::detect(link)
        .map_or_else(|| neighborhood.to_string(), |n| n.name().to_string());
    record.price = dom
        .texts(".precio-inmueble, .price")
        .into_iter()
        .find_map(|t| parse_price(&t))
        .or_else(|| {
            let re = PRICE.get_or_init(|| {
                Regex::new(r"\$\s*([\d.,]+)").expect("Invalid regex pattern defined in code")
            });
            capture(re, &body).as_deref().and_then(parse_price)
        });
    record.description = dom
        .first_text("#descripcion, .descripcion, .description, .detalle-inmueble")
        .unwrap_or_default();
    record.images = extractors
        .images
        .filter(&dom.attrs(".itemslider img, img.itemslider", "src"), link);

    Some((record, body))
}

#[async_trait]
impl SiteScraper for EscalaInmobiliaria {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn display_name(&self) -> &'static str {
        "Escala Inmobiliaria"
    }

    fn base_url(&self) -> &'static str {
        BASE_URL
    }

    fn settings(&self) -> &ScraperSettings {
        &self.settings
    }

    fn search_inputs(&self, price_ranges: &[PriceRange]) -> Vec<SearchInput> {
        let path = neighborhood_path();
        price_ranges
            .iter()
            .map(|range| {
                SearchInput::new(
                    format!(
                        "{SEARCH_URL}/{path}/?precioMin={}&precioMax={}",
                        range.min, range.max
                    ),
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

        if !common::wait_for(page, RESULT_LINK, &self.settings).await? {
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
        common::wait_for(page, "h1", &self.settings).await?;

        let html = page.content().await?;
        let Some((mut record, body)) = parse_detail(&html, link, neighborhood, &self.extractors)
        else {
            return Ok(None);
        };

        common::complete_record(page, &mut record, &self.extractors, &body, Some(GPS_VARIABLE))
            .await?;
        Ok(Some(record))
    }
}
