use scraper::{ElementRef, Html, Node, Selector};

/// Parsed HTML snapshot with owned-value query helpers.
///
/// `scraper::Html` is not `Send`, so a `Dom` must be built and dropped
/// between two awaits. Scrapers do their parsing in plain functions that
/// take the HTML string and return owned data.
pub struct Dom {
    html: Html,
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn collapse_whitespace(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

impl Dom {
    #[must_use]
    pub fn parse(html: &str) -> Self {
        Self {
            html: Html::parse_document(html),
        }
    }

    fn select<'a>(&'a self, css: &str) -> Vec<ElementRef<'a>> {
        selector(css).map_or_else(Vec::new, |sel| self.html.select(&sel).collect())
    }

    #[must_use]
    pub fn exists(&self, css: &str) -> bool {
        !self.select(css).is_empty()
    }

    /// Values of `attr` on every element matching `css`, in document order.
    #[must_use]
    pub fn attrs(&self, css: &str, attr: &str) -> Vec<String> {
        self.select(css)
            .into_iter()
            .filter_map(|el| el.value().attr(attr))
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect()
    }

    #[must_use]
    pub fn first_attr(&self, css: &str, attr: &str) -> Option<String> {
        self.attrs(css, attr).into_iter().next()
    }

    /// Whitespace-collapsed text of every matching element, empty ones skipped.
    #[must_use]
    pub fn texts(&self, css: &str) -> Vec<String> {
        self.select(css)
            .into_iter()
            .map(|el| collapse_whitespace(&el.text().collect::<String>()))
            .filter(|t| !t.is_empty())
            .collect()
    }

    #[must_use]
    pub fn first_text(&self, css: &str) -> Option<String> {
        self.texts(css).into_iter().next()
    }

    /// Raw `value` or text content of a form field such as a `<textarea>`.
    #[must_use]
    pub fn field_value(&self, css: &str) -> Option<String> {
        self.select(css).into_iter().find_map(|el| {
            el.value()
                .attr("value")
                .map(ToString::to_string)
                .or_else(|| Some(el.text().collect::<String>()))
                .filter(|v| !v.trim().is_empty())
        })
    }

    #[must_use]
    pub fn title(&self) -> Option<String> {
        self.first_text("title")
    }

    /// Text of the body, one line per text node, skipping script and style
    /// contents.
    #[must_use]
    pub fn body_text(&self) -> String {
        let root = selector("body")
            .and_then(|sel| self.html.select(&sel).next())
            .unwrap_or_else(|| self.html.root_element());

        let mut lines = Vec::new();
        for node in root.descendants() {
            let Node::Text(text) = node.value() else {
                continue;
            };

            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element().map(|e| e.name().to_string()))
                .is_some_and(|name| matches!(name.as_str(), "script" | "style" | "noscript"));
            if hidden {
                continue;
            }

            let line = collapse_whitespace(text);
            if !line.is_empty() {
                lines.push(line);
            }
        }

        lines.join("\n")
    }

    /// Label/value pairs from list-style feature blocks: for each element
    /// matching `css`, its first text fragment is the label and the rest is
    /// the value.
    #[must_use]
    pub fn label_values(&self, css: &str) -> Vec<(String, String)> {
        self.select(css)
            .into_iter()
            .filter_map(|el| {
                let mut parts = el
                    .text()
                    .map(collapse_whitespace)
                    .filter(|t| !t.is_empty() && t != ":");
                let label = parts.next()?.trim_end_matches(':').trim().to_string();
                let value = parts.collect::<Vec<_>>().join(" ");
                Some((label, value))
            })
            .collect()
    }

    /// Value paired with the first label containing `needle` (case-insensitive).
    #[must_use]
    pub fn value_for_label(&self, css: &str, needle: &str) -> Option<String> {
        let needle = needle.to_lowercase();
        self.label_values(css)
            .into_iter()
            .find(|(label, value)| label.to_lowercase().contains(&needle) && !value.is_empty())
            .map(|(_, value)| value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HTML: &str = r#"
        <html><head><title>Apto en Jardines - $2.900.000</title>
        <style>.x { color: red }</style></head>
        <body>
            <h1>  Apartamento   en Jardines </h1>
            <ul>
                <li class="list-group-item"><span>Precio</span><span>$ 2.900.000</span></li>
                <li class="list-group-item"><span>Alcobas:</span> <span>3</span></li>
            </ul>
            <a class="card" href="/inmueble.html?codigo=1">uno</a>
            <a class="card" href="">vacio</a>
            <textarea class="field-property">{"code":"AA-1"}</textarea>
            <script>var lat = 6.17;</script>
        </body></html>
    "#;

    #[test]
    fn test_text_and_attr_queries() {
        let dom = Dom::parse(HTML);
        assert_eq!(dom.first_text("h1").as_deref(), Some("Apartamento en Jardines"));
        assert_eq!(dom.attrs("a.card", "href"), vec!["/inmueble.html?codigo=1"]);
        assert_eq!(dom.title().as_deref(), Some("Apto en Jardines - $2.900.000"));
        assert!(dom.exists("textarea.field-property"));
        assert!(!dom.exists("div.missing"));
    }

    #[test]
    fn test_label_values() {
        let dom = Dom::parse(HTML);
        assert_eq!(
            dom.value_for_label("li.list-group-item", "precio").as_deref(),
            Some("$ 2.900.000")
        );
        assert_eq!(dom.value_for_label("li.list-group-item", "Alcobas").as_deref(), Some("3"));
    }

    #[test]
    fn test_body_text_skips_scripts() {
        let text = Dom::parse(HTML).body_text();
        assert!(text.contains("Apartamento en Jardines"));
        assert!(!text.contains("var lat"));
    }

    #[test]
    fn test_field_value_reads_textarea() {
        let dom = Dom::parse(HTML);
        assert_eq!(
            dom.field_value("textarea.field-property").as_deref(),
            Some(r#"{"code":"AA-1"}"#)
        );
    }

    #[test]
    fn test_invalid_selector_matches_nothing() {
        let dom = Dom::parse(HTML);
        assert!(dom.texts("li[[").is_empty());
    }
}
