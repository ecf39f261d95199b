//! Text heuristics: card category, card name and class domains.

use std::sync::OnceLock;

use regex::Regex;

use crate::model::{Category, Domain, TextSpan};

pub const UNKNOWN_NAME: &str = "sconosciuta";

/// Card type keywords, in match priority order.
pub const TYPE_WORDS: [&str; 11] = [
    "azione",
    "reazione",
    "passivo",
    "abilità",
    "incantesimo",
    "rituale",
    "privilegio",
    "specializzazione",
    "maestria",
    "tratto",
    "caratteristica",
];

pub(crate) fn cost_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\d{1,3}\+?$").expect("cost regex is valid"))
}

fn footer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)DH\s+MB|©|daggerheart").expect("footer regex is valid"))
}

fn icon_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[•·\-–—|/\\<>▵▴◆★☆♦]{1,3}$").expect("icon regex is valid"))
}

fn spaced_acronym_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^([A-ZÀÈÙÌÉÁÓ]{1,2} ){2,}[A-ZÀÈÙÌÉÁÓ]{1,2}\s*$")
            .expect("spaced acronym regex is valid")
    })
}

fn caps_title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^[A-ZÀÈÙÌÉÁÓ][A-ZÀÈÙÌÉÁÓ\s'\-À-Ö0-9]{2,}$").expect("caps title regex is valid")
    })
}

/// Fragments that can never be a card name.
#[must_use]
pub fn is_noise(text: &str) -> bool {
    text.chars().count() <= 2
        || cost_re().is_match(text)
        || footer_re().is_match(text)
        || icon_re().is_match(text)
        || spaced_acronym_re().is_match(text)
}

fn is_type_word(text: &str) -> bool {
    let lower = text.to_lowercase();
    TYPE_WORDS.contains(&lower.as_str())
}

fn is_name_candidate(text: &str) -> bool {
    !is_noise(text) && !is_type_word(text)
}

#[must_use]
pub fn classify_category(spans: &[TextSpan]) -> Category {
    let compact = spans
        .iter()
        .flat_map(|span| span.text.chars())
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_uppercase();

    if compact.contains("ORIGINE") {
        Category::Origin
    } else if compact.contains("COMUNITÀ") || compact.contains("COMUNITA") {
        Category::Community
    } else {
        Category::Domain
    }
}

pub trait NameStrategy {
    fn pick<'a>(&self, spans: &'a [TextSpan]) -> Option<&'a str>;
}

/// Stylized all-caps titles used on ability and class cards.
#[derive(Debug, Clone, Copy, Default)]
pub struct CapsTitle;

impl NameStrategy for CapsTitle {
    fn pick<'a>(&self, spans: &'a [TextSpan]) -> Option<&'a str> {
        spans
            .iter()
            .map(|span| span.text.as_str())
            .find(|text| is_name_candidate(text) && caps_title_re().is_match(text))
    }
}

/// First plausible fragment in reading order, for mixed-case names.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstCandidate;

impl NameStrategy for FirstCandidate {
    fn pick<'a>(&self, spans: &'a [TextSpan]) -> Option<&'a str> {
        spans
            .iter()
            .map(|span| span.text.as_str())
            .find(|text| is_name_candidate(text))
    }
}

const NAME_STRATEGIES: [&dyn NameStrategy; 2] = [&CapsTitle, &FirstCandidate];

#[must_use]
pub fn find_name(spans: &[TextSpan]) -> String {
    NAME_STRATEGIES
        .iter()
        .find_map(|strategy| strategy.pick(spans))
        .unwrap_or(UNKNOWN_NAME)
        .to_string()
}

/// Class cards printed in the first pages of the sheet, two per domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassName {
    Trovatore,
    Oratore,
    CustodeDegliElementi,
    CustodeDelRinnovamento,
    Valoroso,
    Vendicatore,
    Ferale,
    Apripista,
    OmbraNotturna,
    Ladro,
    EmissarioDivino,
    SentinellaAlata,
    PotereElementale,
    PoterePrimordiale,
    ChiamataDelCoraggio,
    ChiamataDelloSterminatore,
    ScuolaDellaConoscenza,
    ScuolaDellaGuerra,
}

impl ClassName {
    pub const ALL: [Self; 18] = [
        Self::Trovatore,
        Self::Oratore,
        Self::CustodeDegliElementi,
        Self::CustodeDelRinnovamento,
        Self::Valoroso,
        Self::Vendicatore,
        Self::Ferale,
        Self::Apripista,
        Self::OmbraNotturna,
        Self::Ladro,
        Self::EmissarioDivino,
        Self::SentinellaAlata,
        Self::PotereElementale,
        Self::PoterePrimordiale,
        Self::ChiamataDelCoraggio,
        Self::ChiamataDelloSterminatore,
        Self::ScuolaDellaConoscenza,
        Self::ScuolaDellaGuerra,
    ];

    #[must_use]
    pub const fn title(self) -> &'static str {
        match self {
            Self::Trovatore => "TROVATORE",
            Self::Oratore => "ORATORE",
            Self::CustodeDegliElementi => "CUSTODE DEGLI ELEMENTI",
            Self::CustodeDelRinnovamento => "CUSTODE DEL RINNOVAMENTO",
            Self::Valoroso => "VALOROSO",
            Self::Vendicatore => "VENDICATORE",
            Self::Ferale => "FERALE",
            Self::Apripista => "APRIPISTA",
            Self::OmbraNotturna => "OMBRA NOTTURNA",
            Self::Ladro => "LADRO",
            Self::EmissarioDivino => "EMISSARIO DIVINO",
            Self::SentinellaAlata => "SENTINELLA ALATA",
            Self::PotereElementale => "POTERE ELEMENTALE",
            Self::PoterePrimordiale => "POTERE PRIMORDIALE",
            Self::ChiamataDelCoraggio => "CHIAMATA DEL CORAGGIO",
            Self::ChiamataDelloSterminatore => "CHIAMATA DELLO STERMINATORE",
            Self::ScuolaDellaConoscenza => "SCUOLA DELLA CONOSCENZA",
            Self::ScuolaDellaGuerra => "SCUOLA DELLA GUERRA",
        }
    }

    #[must_use]
    pub const fn domain(self) -> Domain {
        match self {
            Self::Trovatore | Self::Oratore => Domain::Grazia,
            Self::CustodeDegliElementi | Self::CustodeDelRinnovamento => Domain::Saggio,
            Self::Valoroso | Self::Vendicatore => Domain::Valore,
            Self::Ferale | Self::Apripista => Domain::Osso,
            Self::OmbraNotturna | Self::Ladro => Domain::Mezzanotte,
            Self::EmissarioDivino | Self::SentinellaAlata => Domain::Splendore,
            Self::PotereElementale | Self::PoterePrimordiale => Domain::Arcano,
            Self::ChiamataDelCoraggio | Self::ChiamataDelloSterminatore => Domain::Lama,
            Self::ScuolaDellaConoscenza | Self::ScuolaDellaGuerra => Domain::Codice,
        }
    }

    /// Exact title match first, then the first title contained in `name`.
    #[must_use]
    pub fn lookup(name: &str) -> Option<Self> {
        let upper = name.to_uppercase();
        Self::ALL
            .into_iter()
            .find(|class| class.title() == upper)
            .or_else(|| Self::ALL.into_iter().find(|class| upper.contains(class.title())))
    }
}

#[must_use]
pub fn class_domain(name: &str) -> Domain {
    ClassName::lookup(name).map_or(Domain::Unknown, ClassName::domain)
}
