use regex::Regex;
use std::collections::HashSet;
use url::Url;

use super::{ScrapeError, ScraperSettings};
use crate::browser::{LoadState, Page};
use crate::domain::PropertyRecord;
use crate::extract::Extractors;
use crate::extract::images::absolutize;

/// Phrases agency sites show instead of a listing once it is taken down.
const REMOVED_MARKERS: [&str; 6] = [
    "inmueble no disponible",
    "inmueble no encontrado",
    "ya no está disponible",
    "ya no se encuentra disponible",
    "página no encontrada",
    "page not found",
];

pub async fn open(
    page: &dyn Page,
    url: &str,
    state: LoadState,
    settings: &ScraperSettings,
) -> Result<(), ScrapeError> {
    page.goto(url, state, settings.page_timeout).await?;
    Ok(())
}

/// Waits for `selector` using the site's selector timeout.
pub async fn wait_for(
    page: &dyn Page,
    selector: &str,
    settings: &ScraperSettings,
) -> Result<bool, ScrapeError> {
    Ok(page
        .wait_for_selector(selector, settings.selector_timeout)
        .await?)
}

/// Absolute form of `href` without its fragment.
#[must_use]
pub fn canonical_link(href: &str, base: &Url) -> Option<String> {
    let absolute = absolutize(href, Some(base))?;
    let mut url = Url::parse(&absolute).ok()?;
    url.set_fragment(None);
    Some(url.to_string())
}

/// Resolves, filters and de-duplicates candidate links, keeping page order.
pub fn collect_links<I, S, F>(hrefs: I, base_url: &str, keep: F) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
    F: Fn(&str) -> bool,
{
    let Ok(base) = Url::parse(base_url) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    hrefs
        .into_iter()
        .filter_map(|href| canonical_link(href.as_ref(), &base))
        .filter(|link| keep(link))
        .filter(|link| seen.insert(link.clone()))
        .collect()
}

#[must_use]
pub fn looks_removed(body_text: &str) -> bool {
    let lower = body_text.to_lowercase();
    REMOVED_MARKERS.iter().any(|m| lower.contains(m))
}

/// First capture group of `re` in `text`.
#[must_use]
pub fn capture(re: &Regex, text: &str) -> Option<String> {
    re.captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `2500000` as `2.500.000`.
#[must_use]
pub fn format_thousands(value: i64, sep: char) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

/// Fills fields the site markup did not provide from the page text and
/// resolves coordinates when the record has none yet.
pub async fn complete_record(
    page: &dyn Page,
    record: &mut PropertyRecord,
    extractors: &Extractors,
    body_text: &str,
    gps_variable: Option<&str>,
) -> Result<(), ScrapeError> {
    extractors.features.extract(body_text).fill_missing(record);

    if record.coordinates().is_none() {
        let coords = extractors
            .gps
            .extract(page, Some(body_text), gps_variable)
            .await?;
        record.set_coordinates(coords);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_links_resolves_and_dedupes() {
        let hrefs = [
            "/inmueble.html?codigo=10",
            "inmueble.html?codigo=10#fotos",
            "https://www.site.com/inmueble.html?codigo=11",
            "/contacto.html",
        ];
        let links = collect_links(hrefs, "https://www.site.com/", |l| l.contains("inmueble.html"));
        assert_eq!(
            links,
            vec![
                "https://www.site.com/inmueble.html?codigo=10",
                "https://www.site.com/inmueble.html?codigo=11",
            ]
        );
    }

    #[test]
    fn test_format_thousands() {
        assert_eq!(format_thousands(2_500_000, '.'), "2.500.000");
        assert_eq!(format_thousands(950, '.'), "950");
        assert_eq!(format_thousands(12_000, ','), "12,000");
    }

    #[test]
    fn test_looks_removed() {
        assert!(looks_removed("Lo sentimos, este inmueble ya no está disponible"));
        assert!(!looks_removed("Apartamento en arriendo, 3 alcobas"));
    }
}
