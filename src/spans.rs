use crate::model::{RawSpan, Rect, TextSpan};

/// Height of the bands used to absorb baseline jitter when ordering spans.
const ROW_BAND: f32 = 4.0;

fn round_to(value: f32, step: f32) -> f32 {
    (value / step).round_ties_even() * step
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text inside `rect`, normalized and in reading order.
#[must_use]
pub fn spans(raw: &[RawSpan], rect: &Rect) -> Vec<TextSpan> {
    let mut out = raw
        .iter()
        .filter(|span| {
            let center_x = (span.bbox.x0 + span.bbox.x1) / 2.0;
            let center_y = (span.bbox.y0 + span.bbox.y1) / 2.0;
            rect.contains_point(center_x, center_y)
        })
        .filter_map(|span| {
            let text = collapse_whitespace(&span.text);
            if text.is_empty() {
                return None;
            }
            Some(TextSpan {
                text,
                size: round_to(span.size, 0.01),
                bold: span.bold,
                italic: span.italic,
                x: round_to(span.bbox.x0 - rect.x0, 0.1),
                y: round_to(span.bbox.y0 - rect.y0, 0.1),
            })
        })
        .collect::<Vec<_>>();

    sort_reading_order(&mut out);
    out
}

pub fn sort_reading_order(spans: &mut [TextSpan]) {
    spans.sort_by(|a, b| {
        round_to(a.y, ROW_BAND)
            .total_cmp(&round_to(b.y, ROW_BAND))
            .then(a.x.total_cmp(&b.x))
    });
}
