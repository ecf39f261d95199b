use std::sync::OnceLock;

use regex::{Regex, RegexBuilder};

use crate::classify::{TYPE_WORDS, UNKNOWN_NAME, cost_re, find_name};
use crate::model::{CardMetadata, CardRecord, Category, Domain, SubCategory, TextSpan};

const COST_SIZE_RATIO: f32 = 0.45;
const FLAVOR_SIZE_RATIO: f32 = 0.85;
const FLAVOR_MIN_CHARS: usize = 8;
const MAX_ABILITIES: usize = 6;

fn card_code_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"DH\s+\w+\s+(\d+)\s*/\s*270").expect("card code regex is valid"))
}

fn ability_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b([A-ZÀÈÙÌÉÁÓ][a-zàèùìéáó][^\n:]{2,40}):").expect("ability regex is valid")
    })
}

fn type_word_res() -> &'static [(&'static str, Regex)] {
    static RES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RES.get_or_init(|| {
        TYPE_WORDS
            .iter()
            .map(|word| {
                let re = RegexBuilder::new(&format!(r"\b{}\b", regex::escape(word)))
                    .case_insensitive(true)
                    .build()
                    .expect("type word regex is valid");
                (*word, re)
            })
            .collect()
    })
}

fn card_code(all_text: &str) -> Option<String> {
    card_code_re()
        .captures(all_text)
        .and_then(|captures| captures.get(1))
        .map(|number| format!("{}/270", number.as_str()))
}

/// Threshold/level pair or flat cost from the large numeric tokens.
fn apply_costs(meta: &mut CardMetadata, spans: &[TextSpan], max_size: f32) {
    let mut costs = spans
        .iter()
        .filter(|span| cost_re().is_match(&span.text) && span.size >= max_size * COST_SIZE_RATIO)
        .collect::<Vec<_>>();
    costs.sort_by(|a, b| a.x.total_cmp(&b.x));

    match costs.as_slice() {
        [] => {}
        [single] => meta.costo = Some(single.text.clone()),
        [threshold, level, ..] => {
            meta.soglia = Some(threshold.text.clone());
            meta.livello = Some(level.text.clone());
        }
    }
}

fn card_type(all_text: &str) -> Option<String> {
    type_word_res()
        .iter()
        .find(|(_, re)| re.is_match(all_text))
        .map(|(word, _)| (*word).to_string())
}

fn ability_names(all_text: &str) -> Vec<String> {
    ability_re()
        .captures_iter(all_text)
        .filter_map(|captures| captures.get(1))
        .take(MAX_ABILITIES)
        .map(|name| name.as_str().trim().to_string())
        .collect()
}

fn flavor_text(spans: &[TextSpan], max_size: f32) -> Option<String> {
    let parts = spans
        .iter()
        .filter(|span| {
            span.italic
                && span.size < max_size * FLAVOR_SIZE_RATIO
                && span.text.chars().count() > FLAVOR_MIN_CHARS
        })
        .map(|span| span.text.as_str())
        .collect::<Vec<_>>();
    if parts.is_empty() {
        None
    } else {
        Some(parts.join(" "))
    }
}

/// Best-effort structured fields; each one is derived independently.
#[must_use]
pub fn build_metadata(spans: &[TextSpan]) -> CardMetadata {
    if spans.is_empty() {
        return CardMetadata {
            nome: UNKNOWN_NAME.to_string(),
            ..CardMetadata::default()
        };
    }

    let max_size = spans.iter().map(|span| span.size).fold(0.0_f32, f32::max);
    let all_text = spans
        .iter()
        .map(|span| span.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut meta = CardMetadata {
        nome: find_name(spans),
        id_carta: card_code(&all_text),
        tipo_carta: card_type(&all_text),
        nome_abilita: ability_names(&all_text),
        testo_sapore: flavor_text(spans, max_size),
        testo: spans.iter().map(|span| span.text.clone()).collect(),
        ..CardMetadata::default()
    };
    apply_costs(&mut meta, spans, max_size);
    meta
}

/// Placement of a card inside the run: where it was found and its bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub category: Category,
    pub domain: Option<Domain>,
    pub sub_category: Option<SubCategory>,
    pub page: u32,
    pub cell_index: usize,
    pub sequence: usize,
}

#[must_use]
pub fn build_record(spans: &[TextSpan], placement: Placement) -> CardRecord {
    CardRecord {
        category: placement.category,
        domain: placement.domain,
        sub_category: placement.sub_category,
        page: placement.page,
        cell_index: placement.cell_index,
        sequence: placement.sequence,
        metadata: build_metadata(spans),
    }
}
