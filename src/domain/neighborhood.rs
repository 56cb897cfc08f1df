use serde::{Serialize, Serializer};
use std::fmt;

/// Canonical neighborhoods of Envigado covered by the scrapers.
///
/// Every agency spells these differently ("La Abadía", "Abadia",
/// "Beneditinos", "Bosques De Zuñiga"), so scrapers funnel their labels
/// through [`Neighborhood::canonicalize`] before building records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Neighborhood {
    ElPortal,
    Jardines,
    LaAbadia,
    LaFrontera,
    LaMagnolia,
    LasFlores,
    LasVegas,
    LomaBenedictinos,
    OtraParte,
    Pontevedra,
    SanMarcos,
    Villagrande,
    Zuniga,
}

/// Folded spellings that map onto a canonical neighborhood, beyond the
/// folded canonical name itself. Longer aliases come first so that
/// detection inside free text prefers the most specific match.
const ALIASES: &[(&str, Neighborhood)] = &[
    ("bosques de zuniga", Neighborhood::Zuniga),
    ("loma de benedictinos", Neighborhood::LomaBenedictinos),
    ("loma de los benedictinos", Neighborhood::LomaBenedictinos),
    ("benedictinos", Neighborhood::LomaBenedictinos),
    ("beneditinos", Neighborhood::LomaBenedictinos),
    ("abadia", Neighborhood::LaAbadia),
    ("villa grande", Neighborhood::Villagrande),
];

impl Neighborhood {
    pub const ALL: [Self; 13] = [
        Self::ElPortal,
        Self::Jardines,
        Self::LaAbadia,
        Self::LaFrontera,
        Self::LaMagnolia,
        Self::LasFlores,
        Self::LasVegas,
        Self::LomaBenedictinos,
        Self::OtraParte,
        Self::Pontevedra,
        Self::SanMarcos,
        Self::Villagrande,
        Self::Zuniga,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ElPortal => "El Portal",
            Self::Jardines => "Jardines",
            Self::LaAbadia => "La Abadia",
            Self::LaFrontera => "La Frontera",
            Self::LaMagnolia => "La Magnolia",
            Self::LasFlores => "Las Flores",
            Self::LasVegas => "Las Vegas",
            Self::LomaBenedictinos => "Loma Benedictinos",
            Self::OtraParte => "Otra Parte",
            Self::Pontevedra => "Pontevedra",
            Self::SanMarcos => "San Marcos",
            Self::Villagrande => "Villagrande",
            Self::Zuniga => "Zuñiga",
        }
    }

    /// Lowercase ASCII form with spaces, e.g. `"zuniga"`, `"la abadia"`.
    #[must_use]
    pub fn folded(self) -> String {
        fold(self.name())
    }

    /// URL slug form joined by `sep`, e.g. `la-abadia` or `la_abadia`.
    #[must_use]
    pub fn slug(self, sep: char) -> String {
        self.folded().replace(' ', &sep.to_string())
    }

    /// Exact lookup of a label after folding case, accents and punctuation.
    #[must_use]
    pub fn canonicalize(raw: &str) -> Option<Self> {
        let folded = fold(raw);
        if folded.is_empty() {
            return None;
        }

        Self::ALL
            .iter()
            .copied()
            .find(|n| n.folded() == folded)
            .or_else(|| {
                ALIASES
                    .iter()
                    .find(|(alias, _)| *alias == folded)
                    .map(|(_, n)| *n)
            })
    }

    /// Finds the first neighborhood mentioned anywhere in `text`, which may
    /// be a URL path or page prose. Matches respect word boundaries.
    #[must_use]
    pub fn detect(text: &str) -> Option<Self> {
        let haystack = format!(" {} ", fold(text));

        Self::ALL
            .iter()
            .map(|n| (n.folded(), *n))
            .chain(ALIASES.iter().map(|(a, n)| ((*a).to_string(), *n)))
            .find(|(needle, _)| haystack.contains(&format!(" {needle} ")))
            .map(|(_, n)| n)
    }

    /// Canonical display label for `raw`, or the trimmed input when it is
    /// not one of the known neighborhoods.
    #[must_use]
    pub fn label(raw: &str) -> String {
        Self::canonicalize(raw).map_or_else(|| raw.trim().to_string(), |n| n.name().to_string())
    }
}

impl fmt::Display for Neighborhood {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Neighborhood {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.name())
    }
}

/// Lowercases, strips Spanish diacritics and collapses every run of
/// non-alphanumeric characters into a single space.
#[must_use]
pub fn fold(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_space = false;

    for ch in raw.chars().flat_map(char::to_lowercase) {
        let ch = match ch {
            'á' | 'à' | 'ä' => 'a',
            'é' | 'è' | 'ë' => 'e',
            'í' | 'ì' | 'ï' => 'i',
            'ó' | 'ò' | 'ö' => 'o',
            'ú' | 'ù' | 'ü' => 'u',
            'ñ' => 'n',
            other => other,
        };

        if ch.is_ascii_alphanumeric() {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch);
        } else {
            pending_space = true;
        }
    }

    out
}
