use std::collections::HashSet;
use url::Url;

pub const DEFAULT_EXCLUSIONS: [&str; 4] = ["logo", "icon", "whatsapp", "facebook"];

/// Normalizes, filters and caps a raw list of gallery URLs.
#[derive(Debug, Clone)]
pub struct ImageFilter {
    exclusions: Vec<String>,
    max_images: usize,
}

impl Default for ImageFilter {
    fn default() -> Self {
        Self::new(DEFAULT_EXCLUSIONS.iter().copied(), 15)
    }
}

impl ImageFilter {
    pub fn new<I, S>(exclusions: I, max_images: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut list: Vec<String> = Vec::new();
        for keyword in exclusions {
            let keyword = keyword.as_ref().trim().to_lowercase();
            if !keyword.is_empty() && !list.contains(&keyword) {
                list.push(keyword);
            }
        }

        Self {
            exclusions: list,
            max_images,
        }
    }

    /// Same filter with site-specific keywords and cap layered on top.
    #[must_use]
    pub fn with_overrides<S: AsRef<str>>(&self, extra: &[S], max_images: Option<usize>) -> Self {
        Self::new(
            self.exclusions
                .iter()
                .map(String::as_str)
                .chain(extra.iter().map(AsRef::as_ref)),
            max_images.unwrap_or(self.max_images),
        )
    }

    #[must_use]
    pub const fn max_images(&self) -> usize {
        self.max_images
    }

    #[must_use]
    pub fn is_excluded(&self, url: &str) -> bool {
        let lower = url.to_lowercase();
        self.exclusions.iter().any(|k| lower.contains(k.as_str()))
    }

    /// Resolves each candidate against `base_url`, drops anything that is
    /// not http(s) or contains an exclusion keyword, removes duplicates
    /// keeping first-seen order and truncates to the configured maximum.
    #[must_use]
    pub fn filter<S: AsRef<str>>(&self, raw: &[S], base_url: &str) -> Vec<String> {
        let base = Url::parse(base_url).ok();
        let mut seen = HashSet::new();
        let mut out = Vec::new();

        for candidate in raw {
            if out.len() >= self.max_images {
                break;
            }

            let Some(absolute) = absolutize(candidate.as_ref(), base.as_ref()) else {
                continue;
            };

            if self.is_excluded(&absolute) {
                continue;
            }

            if seen.insert(absolute.clone()) {
                out.push(absolute);
            }
        }

        out
    }
}

/// Resolves `href` against `base`, keeping only http(s) results.
#[must_use]
pub fn absolutize(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with("data:") || href.starts_with("javascript:") {
        return None;
    }

    let url = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => base?.join(href).ok()?,
        Err(_) => return None,
    };

    matches!(url.scheme(), "http" | "https").then(|| url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupes_and_drops_excluded() {
        let filter = ImageFilter::default();
        let raw = ["https://x/a.jpg", "https://x/a.jpg", "https://x/logo.png"];
        assert_eq!(filter.filter(&raw, "https://x/"), vec!["https://x/a.jpg"]);
    }

    #[test]
    fn test_exclusion_is_case_insensitive() {
        let filter = ImageFilter::default();
        let raw = ["https://x/img/WhatsApp-Button.PNG", "https://x/casa.jpg"];
        assert_eq!(filter.filter(&raw, "https://x/"), vec!["https://x/casa.jpg"]);
    }

    #[test]
    fn test_relative_urls_are_resolved() {
        let filter = ImageFilter::default();
        let raw = ["/fotos/1.jpg", "fotos/2.jpg", "//cdn.x.com/3.jpg", "data:image/png;base64,AA"];
        assert_eq!(
            filter.filter(&raw, "https://www.x.com/inmueble/5"),
            vec![
                "https://www.x.com/fotos/1.jpg",
                "https://www.x.com/inmueble/fotos/2.jpg",
                "https://cdn.x.com/3.jpg",
            ]
        );
    }

    #[test]
    fn test_truncates_to_max() {
        let filter = ImageFilter::new(DEFAULT_EXCLUSIONS, 2);
        let raw = ["https://x/1.jpg", "https://x/2.jpg", "https://x/3.jpg"];
        assert_eq!(filter.filter(&raw, "https://x/").len(), 2);
    }

    #[test]
    fn test_site_overrides_extend_exclusions() {
        let filter = ImageFilter::default().with_overrides(&["twitter", "simicrm"], Some(5));
        assert!(filter.is_excluded("https://x/simicrm/banner.jpg"));
        assert!(filter.is_excluded("https://x/logo.png"));
        assert_eq!(filter.max_images(), 5);
    }
}
