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
use crate::extract::features::{parse_count, parse_estrato, parse_number, parse_price};

pub const SOURCE: &str = "arrendamientos_envigado";

const BASE_URL: &str = "https://www.arrendamientosenvigadosa.com.co/";
const SEARCH_URL: &str = "https://www.arrendamientosenvigadosa.com.co/busqueda.html?servicio=Arriendo&tipo=1&ciudad=25999";

/// Site-internal barrio ids.
const BARRIOS: [(Neighborhood, &str); 12] = [
    (Neighborhood::ElPortal, "6822"),
    (Neighborhood::Jardines, "6824"),
    (Neighborhood::LaAbadia, "8807"),
    (Neighborhood::LaFrontera, "8808"),
    (Neighborhood::LaMagnolia, "6843"),
    (Neighborhood::LasFlores, "6848"),
    (Neighborhood::LasVegas, "6816"),
    (Neighborhood::LomaBenedictinos, "8585"),
    (Neighborhood::Pontevedra, "6844"),
    (Neighborhood::SanMarcos, "6823"),
    (Neighborhood::Villagrande, "6825"),
    (Neighborhood::Zuniga, "8579"),
];

const RESULT_LINK: &str = "a.link-footer-black";
const FEATURE_ITEM: &str = "li.list-group-item";

pub struct ArrendamientosEnvigado {
    settings: ScraperSettings,
    extractors: Extractors,
}

impl ArrendamientosEnvigado {
    #[must_use]
    pub fn new(shared: &Extractors, overrides: Option<&ScraperOverride>) -> Self {
        let settings = ScraperSettings {
            search_concurrency: 3,
            search_load_state: LoadState::NetworkIdle,
            // Watermark and template assets share the gallery container.
            image_exclusions: ["logo-ae-new", "assets/"].map(String::from).to_vec(),
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
        Regex::new(r"(?:codigo|inmueble)=(\d+)").expect("Invalid regex pattern defined in code")
    });
    capture(re, link)
}

#[must_use]
pub fn parse_links(html: &str) -> Vec<String> {
    let dom = Dom::parse(html);
    collect_links(dom.attrs(RESULT_LINK, "href"), BASE_URL, |l| {
        l.contains("inmueble.html")
    })
}

/// Builds the record from the detail markup. Coordinates are resolved
/// afterwards against the live page.
#[must_use]
pub fn parse_detail(
    html: &str,
    link: &str,
    neighborhood: &str,
    extractors: &Extractors,
) -> Option<(PropertyRecord, String)> {
    let dom = Dom::parse(html);
    let body = dom.body_text();

    if common::looks_removed(&body) || !dom.exists(FEATURE_ITEM) {
        return None;
    }

    let value = |label: &str| dom.value_for_label(FEATURE_ITEM, label);

    let description = dom
        .texts("p")
        .into_iter()
        .skip_while(|p| !p.to_uppercase().contains("DESCRIPCIÓN"))
        .nth(1)
        .unwrap_or_default();

    let mut record = PropertyRecord::new(SOURCE, link);
    record.code = code_from_link(link).unwrap_or_default();
    record.title = dom
        .first_text("div.lux-grey.bold > span.bold")
        .or_else(|| dom.first_text("h1"))
        .unwrap_or_default();
    record.location = neighborhood.to_string();
    record.price = value("Precio").as_deref().and_then(parse_price);
    record.area = value("Área").as_deref().and_then(parse_number);
    record.estrato = value("Estrato").as_deref().and_then(parse_estrato);
    record.bedrooms = value("Alcobas").as_deref().and_then(parse_count);
    record.bathrooms = value("Baños").as_deref().and_then(parse_count);
    record.parking = value("Parqueadero").as_deref().and_then(parse_count);
    record.images = extractors
        .images
        .filter(&dom.attrs(".carousel-item img", "src"), link);

    // Older listings only mention parking in prose.
    if record.parking.is_none() && description.to_lowercase().contains("parqueadero") {
        let from_text = extractors.features.extract(&description).parking;
        record.parking = from_text.or(Some(1));
    }
    record.description = description;

    Some((record, body))
}

#[async_trait]
impl SiteScraper for ArrendamientosEnvigado {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn display_name(&self) -> &'static str {
        "Arrendamientos Envigado"
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
            .flat_map(|(neighborhood, id)| {
                price_ranges.iter().map(move |range| {
                    SearchInput::new(
                        format!(
                            "{SEARCH_URL}&barrio={id}&valmin={}&valmax={}",
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
        common::wait_for(page, "div.lux-grey.bold", &self.settings).await?;

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
          <div class="lux-grey bold"><span class="bold">APARTAMENTO EN ARRIENDO</span></div>
          <ul>
            <li class="list-group-item"><span>Precio</span><span>$ 2.900.000</span></li>
            <li class="list-group-item"><span>Área</span><span>72,6 m²</span></li>
            <li class="list-group-item"><span>Estrato</span><span>4</span></li>
            <li class="list-group-item"><span>Alcobas</span><span>3</span></li>
            <li class="list-group-item"><span>Baños</span><span>2</span></li>
          </ul>
          <p>DESCRIPCIÓN</p>
          <p>Apartamento con parqueadero cubierto y balcón.</p>
          <div class="carousel-item"><img src="/fotos/1.jpg"></div>
          <div class="carousel-item"><img src="/assets/img/logo-ae-new.png"></div>
          <div class="carousel-item"><img src="/fotos/1.jpg"></div>
        </body></html>
    "#;

    fn scraper() -> ArrendamientosEnvigado {
        ArrendamientosEnvigado::new(&Extractors::default(), None)
    }

    #[test]
    fn test_search_inputs_cover_every_barrio() {
        let inputs = scraper().search_inputs(&[PriceRange::new(2_500_000, 3_500_000)]);
        assert_eq!(inputs.len(), BARRIOS.len());
        assert!(inputs[0].url.contains("barrio=6822&valmin=2500000&valmax=3500000"));
        assert_eq!(inputs[0].neighborhood, "El Portal");
    }

    #[test]
    fn test_parse_links_keeps_detail_pages() {
        let html = r#"
            <a class="link-footer-black" href="inmueble.html?codigo=123">Ver</a>
            <a class="link-footer-black" href="/inmueble.html?codigo=123">Ver</a>
            <a class="link-footer-black" href="/contacto.html">Contacto</a>
        "#;
        assert_eq!(
            parse_links(html),
            vec!["https://www.arrendamientosenvigadosa.com.co/inmueble.html?codigo=123"]
        );
    }

    #[test]
    fn test_parse_detail() {
        let s = scraper();
        let link = "https://www.arrendamientosenvigadosa.com.co/inmueble.html?codigo=4512";
        let (record, _) = parse_detail(DETAIL, link, "Jardines", &s.extractors).unwrap();

        assert_eq!(record.code, "4512");
        assert_eq!(record.title, "APARTAMENTO EN ARRIENDO");
        assert_eq!(record.location, "Jardines");
        assert_eq!(record.price, Some(2_900_000));
        assert_eq!(record.area, Some(73));
        assert_eq!(record.estrato, Some(4));
        assert_eq!(record.bedrooms, Some(3));
        assert_eq!(record.bathrooms, Some(2));
        assert_eq!(record.parking, Some(1));
        assert_eq!(
            record.images,
            vec!["https://www.arrendamientosenvigadosa.com.co/fotos/1.jpg"]
        );
        assert!(record.description.contains("parqueadero cubierto"));
    }

    #[test]
    fn test_parse_detail_removed_listing() {
        let html = "<html><body><h1>Inmueble no disponible</h1></body></html>";
        assert!(parse_detail(html, "https://x/inmueble.html?codigo=1", "Jardines", &scraper().extractors).is_none());
    }
}
