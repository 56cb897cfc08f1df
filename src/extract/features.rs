use regex::Regex;
use std::sync::OnceLock;

use crate::domain::PropertyRecord;

/// A number as Colombian sites print it: `2.500.000`, `72,6`, `1.250,50`.
const NUM: &str = r"\d{1,3}(?:[.,']\d{3})+(?:[.,]\d{1,2})?|\d+(?:[.,]\d+)?";

/// Numeric listing attributes pulled out of free page text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Features {
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub area: Option<i32>,
    pub parking: Option<i32>,
    pub estrato: Option<i32>,
    pub price: Option<i64>,
}

impl Features {
    /// Copies every known value into `record` where the record has none yet.
    pub fn fill_missing(&self, record: &mut PropertyRecord) {
        record.bedrooms = record.bedrooms.or(self.bedrooms);
        record.bathrooms = record.bathrooms.or(self.bathrooms);
        record.area = record.area.or(self.area);
        record.parking = record.parking.or(self.parking);
        record.estrato = record.estrato.or(self.estrato);
        record.price = record.price.or(self.price);
    }
}

struct Patterns {
    bedrooms: Vec<Regex>,
    bathrooms: Vec<Regex>,
    area: Vec<Regex>,
    parking: Vec<Regex>,
    estrato: Vec<Regex>,
    price: Vec<Regex>,
}

fn compile(patterns: &[String]) -> Vec<Regex> {
    patterns
        .iter()
        .map(|p| Regex::new(p).expect("Invalid regex pattern defined in code"))
        .collect()
}

/// Colon-separated label, then value-before-label, then label on its own
/// line followed by the value.
fn labelled(label: &str, value_first: &str, value: &str) -> [String; 3] {
    [
        format!(r"(?i){label}[ \t]*:\s*{value}"),
        format!("(?i){value_first}"),
        format!(r"(?i){label}[ \t]*\n\s*{value}"),
    ]
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        // A label followed by a colon is unambiguous. Bare "label, newline,
        // value" layouts are tried last so that "3 Alcobas\n2 Baños" never
        // reads the bathroom count as bedrooms.
        bedrooms: compile(&labelled(
            r"(?:habitaciones|habitaci[oó]n|alcobas?|cuartos)",
            r"(\d+)[ \t]*(?:habitaciones|habitaci[oó]n|alcobas?|hab\.|ha\.)",
            r"(\d+)",
        )),
        bathrooms: compile(&labelled(
            r"(?:ba[ñn]os?)",
            r"(\d+)[ \t]*(?:ba[ñn]os?|ba\.)",
            r"(\d+)",
        )),
        area: compile(&labelled(
            r"[áa]rea\s*(?:construida|privada|cons\.?|total|[úu]til)?",
            &format!(r"({NUM})[ \t]*(?:m²|m2|mt2|mts2|mts|metros)"),
            &format!("({NUM})"),
        )),
        parking: compile(&labelled(
            r"(?:parqueaderos?|garajes?)",
            r"(\d+)[ \t]*(?:parqueaderos?|garajes?)",
            r"(\d+)",
        )),
        estrato: compile(&[r"(?i)estrato\s*[:\n]?\s*(\d+)".into()]),
        price: compile(&[
            format!(r"(?i)(?:precio|canon|valor)[^\d$\n]{{0,24}}\$?\s*({NUM})"),
            format!(r"\$\s*({NUM})"),
        ]),
    })
}

fn first_capture<'t>(patterns: &[Regex], text: &'t str) -> Option<&'t str> {
    patterns
        .iter()
        .find_map(|re| re.captures(text).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
}

/// Regex-driven parser for the Spanish feature labels used by the agencies.
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// First matching pattern wins per field; unmatched fields stay `None`.
    #[must_use]
    pub fn extract(&self, text: &str) -> Features {
        let p = patterns();

        Features {
            bedrooms: first_capture(&p.bedrooms, text).and_then(parse_count),
            bathrooms: first_capture(&p.bathrooms, text).and_then(parse_count),
            area: first_capture(&p.area, text).and_then(parse_number),
            parking: first_capture(&p.parking, text).and_then(parse_count),
            estrato: first_capture(&p.estrato, text).and_then(parse_estrato),
            price: first_capture(&p.price, text).and_then(parse_price),
        }
    }
}

/// Parses a decimal written with `.`/`,` separators.
///
/// A separator followed by exactly three digits groups thousands; any other
/// final group is the fractional part. `"2.500.000"` is 2500000, `"72,6"` is
/// 72.6 and `"1.250,50"` is 1250.5.
#[must_use]
pub fn parse_decimal(raw: &str) -> Option<f64> {
    let token = first_number_token(raw)?;
    let groups: Vec<&str> = token.split(['.', ',', '\'']).collect();

    let (integer, fraction) = match groups.as_slice() {
        [] => return None,
        [whole] => ((*whole).to_string(), String::new()),
        [head @ .., last] if last.len() == 3 => {
            let mut digits = head.concat();
            digits.push_str(last);
            (digits, String::new())
        }
        [head @ .., last] => (head.concat(), (*last).to_string()),
    };

    let normalized = if fraction.is_empty() {
        integer
    } else {
        format!("{integer}.{fraction}")
    };
    normalized.parse().ok()
}

fn first_number_token(raw: &str) -> Option<&str> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(NUM).expect("Invalid regex pattern defined in code"));
    re.find(raw).map(|m| m.as_str())
}

/// Rounds half-up to the nearest integer: 72.4 is 72, 72.5 and 72.6 are 73.
#[must_use]
pub fn parse_number(raw: &str) -> Option<i32> {
    let value = parse_decimal(raw)?;
    let rounded = (value + 0.5).floor();
    if rounded < 0.0 || rounded > f64::from(i32::MAX) {
        return None;
    }
    #[allow(clippy::cast_possible_truncation)]
    Some(rounded as i32)
}

/// Small whole counts (rooms, bathrooms, parking spots).
#[must_use]
pub fn parse_count(raw: &str) -> Option<i32> {
    parse_number(raw).filter(|n| *n <= 50)
}

/// Prices in COP. Cents are dropped and a zero price counts as unknown.
#[must_use]
pub fn parse_price(raw: &str) -> Option<i64> {
    let value = parse_decimal(raw)?;
    #[allow(clippy::cast_possible_truncation)]
    let price = value.trunc() as i64;
    (price > 0).then_some(price)
}

/// Socioeconomic stratum, only meaningful between 1 and 6.
#[must_use]
pub fn parse_estrato(raw: &str) -> Option<i32> {
    parse_number(raw).filter(|n| (1..=6).contains(n))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_area_rounds_half_up() {
        let fx = FeatureExtractor::new();
        assert_eq!(fx.extract("Apartamento de 72.6 m²").area, Some(73));
        assert_eq!(fx.extract("Apartamento de 72.4 m²").area, Some(72));
        assert_eq!(fx.extract("Área construida: 85,5").area, Some(86));
        assert_eq!(fx.extract("Área: 1.200 m2").area, Some(1200));
    }

    #[test]
    fn test_spanish_labels() {
        let text = "Precio: $ 2.800.000\nAlcobas: 3\nBaños: 2\nParqueaderos: 1\nEstrato: 4";
        let f = FeatureExtractor::new().extract(text);
        assert_eq!(f.price, Some(2_800_000));
        assert_eq!(f.bedrooms, Some(3));
        assert_eq!(f.bathrooms, Some(2));
        assert_eq!(f.parking, Some(1));
        assert_eq!(f.estrato, Some(4));
    }

    #[test]
    fn test_number_before_label() {
        let f = FeatureExtractor::new().extract("3 Habitaciones 2 Baños 1 Garaje 65 m2");
        assert_eq!(f.bedrooms, Some(3));
        assert_eq!(f.bathrooms, Some(2));
        assert_eq!(f.parking, Some(1));
        assert_eq!(f.area, Some(65));
    }

    #[test]
    fn test_label_and_value_on_separate_lines() {
        let f = FeatureExtractor::new().extract("Alcobas\n3\nBaños\n2\n3 alcobas\n1 baño");
        assert_eq!(f.bedrooms, Some(3));
        assert_eq!(f.bathrooms, Some(1));

        let f = FeatureExtractor::new().extract("3 alcobas\n2 baños");
        assert_eq!(f.bedrooms, Some(3));
        assert_eq!(f.bathrooms, Some(2));
    }

    #[test]
    fn test_missing_fields_stay_unknown() {
        let f = FeatureExtractor::new().extract("Hermoso apartamento con vista");
        assert_eq!(f, Features::default());
    }

    #[test]
    fn test_zero_parking_is_not_unknown() {
        let f = FeatureExtractor::new().extract("Parqueaderos: 0");
        assert_eq!(f.parking, Some(0));
    }

    #[test]
    fn test_estrato_out_of_range() {
        assert_eq!(FeatureExtractor::new().extract("Estrato 9").estrato, None);
        assert_eq!(parse_estrato("Estrato 3"), Some(3));
    }

    #[test]
    fn test_parse_decimal_separators() {
        assert_eq!(parse_decimal("2.500.000"), Some(2_500_000.0));
        assert_eq!(parse_decimal("72,6"), Some(72.6));
        assert_eq!(parse_decimal("1.250,50"), Some(1250.5));
        assert_eq!(parse_decimal("sin datos"), None);
    }

    #[test]
    fn test_parse_price() {
        assert_eq!(parse_price("$ 3.200.000 COP"), Some(3_200_000));
        assert_eq!(parse_price("$2.500.000,00"), Some(2_500_000));
        assert_eq!(parse_price("3500000"), Some(3_500_000));
        assert_eq!(parse_price("$ 0"), None);
        assert_eq!(parse_price(""), None);
    }

    #[test]
    fn test_fill_missing_keeps_existing_values() {
        let mut record = PropertyRecord {
            bedrooms: Some(2),
            ..PropertyRecord::default()
        };
        let f = Features {
            bedrooms: Some(3),
            bathrooms: Some(1),
            ..Features::default()
        };
        f.fill_missing(&mut record);
        assert_eq!(record.bedrooms, Some(2));
        assert_eq!(record.bathrooms, Some(1));
    }
}
