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
use crate::extract::gps::from_map_links;

pub const SOURCE: &str = "uribienes";

const BASE_URL: &str = "https://uribienes.com";
const SEARCH_URL: &str = "https://uribienes.com/inmuebles/arriendo?city=5266&type=1";

const RESULT_LINK: &str = "a[href^='/inmuebles/']";

pub struct Uribienes {
    settings: ScraperSettings,
    extractors: Extractors,
}

impl Uribienes {
    #[must_use]
    pub fn new(shared: &Extractors, overrides: Option<&ScraperOverride>) -> Self {
        let settings = ScraperSettings {
            detail_concurrency: 3,
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

/// The site's neighborhood filter wants `+`-joined words with a trailing `+`.
fn neighborhood_param(n: Neighborhood) -> String {
    let mut param = n
        .name()
        .split(' ')
        .map(|w| urlencoding::encode(w).into_owned())
        .collect::<Vec<_>>()
        .join("+");
    param.push('+');
    param
}

#[must_use]
pub fn parse_links(html: &str) -> Vec<String> {
    static DETAIL: OnceLock<Regex> = OnceLock::new();
    let detail = get_regex(&DETAIL, r"/inmuebles/\d+$");

    let dom = Dom::parse(html);
    collect_links(dom.attrs(RESULT_LINK, "href"), BASE_URL, |l| {
        detail.is_match(l)
    })
}

fn listing_code(body: &str, link: &str) -> Option<String> {
    static BODY: OnceLock<Regex> = OnceLock::new();
    static LINK: OnceLock<Regex> = OnceLock::new();

    capture(
        get_regex(&BODY, r"(?i)C[óo]digo\s+(?:del\s+)?inmueble\s*:?\s*(\d+)"),
        body,
    )
    .or_else(|| capture(get_regex(&LINK, r"/inmuebles/(\d+)"), link))
}

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

    let mut record = PropertyRecord::new(SOURCE, link);
    record.title = dom.first_text("h1").unwrap_or_default();
    record.code = listing_code(&body, link).unwrap_or_default();
    record.location = neighborhood.to_string();
    record.price = dom
        .texts("span.font-bold, div.font-bold")
        .into_iter()
        .find(|t| t.contains('$'))
        .as_deref()
        .and_then(parse_price);
    record.description = dom
        .first_text(".text-neutral-600.text-base")
        .or_else(|| dom.texts("p").into_iter().find(|p| p.chars().count() > 50))
        .unwrap_or_default();
    record.images = extractors
        .images
        .filter(&dom.attrs("#detail-images img", "src"), link);

    // The embedded map exposes its centre in the "improve this map" link.
    record.set_coordinates(from_map_links(html));

    Some((record, body))
}

#[async_trait]
impl SiteScraper for Uribienes {
    fn source(&self) -> &'static str {
        SOURCE
    }

    fn display_name(&self) -> &'static str {
        "Uribienes"
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
            .flat_map(|n| {
                let param = neighborhood_param(*n);
                price_ranges.iter().map(move |range| {
                    SearchInput::new(
                        format!(
                            "{SEARCH_URL}&pcmin={}&pcmax={}&neighborhood={param}&minarea=50&maxarea=100",
                            range.min, range.max
                        ),
                        n.name(),
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
        common::wait_for(page, "h1", &self.settings).await?;

        let html = page.content().await?;
        let Some((mut record, body)) = parse_detail(&html, link, neighborhood, &self.extractors)
        else {
            return Ok(None);
        };

        common::complete_record(page, &mut record, &self.extractors, &body, None).await?;
        Ok(Some(record))
    }
}
