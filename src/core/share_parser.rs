//! Extraction of ownership fractions from free-text registry encodings.
//!
//! Registry share fields arrive in many shapes: `obchodni_podil: 1/3`,
//! `velikost: 50 PROCENTA`, `hlasovaci_prava: 25 %`, or plain prose with a
//! percentage somewhere inside. [`parse_share`] tries the encodings tier by tier
//! and stops at the first tier that matches anything.

use regex::Regex;
use std::sync::LazyLock;

const NUMBER: &str = r"(\d+(?:[.,;]\d+)?)";

static BUSINESS_SHARE_FRACTION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:business[-_ ]?share|obchodni[_ ]?podil)\s*:\s*(\d+)\s*[/;]\s*(\d+)").unwrap()
});

static BUSINESS_SHARE_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:business[-_ ]?share|obchodni[_ ]?podil)\s*:\s*{NUMBER}\s*(?:%|PROCENTA|percent)"
    ))
    .unwrap()
});

static VOTING_RIGHTS_PERCENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:voting[-_ ]?rights|hlasovaci[_ ]?prava)\s*:\s*{NUMBER}\s*(?:%|PROCENTA|percent)"
    ))
    .unwrap()
});

static FRACTION_SLASH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*/\s*(\d+)").unwrap());

static FRACTION_SEMICOLON: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d+)\s*;\s*(\d+)\s*(?:ZLOMEK|TEXT)?").unwrap());

static PERCENT_SIGN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"{NUMBER}\s*%")).unwrap());

static PERCENT_WORD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!(r"(?i){NUMBER}\s*(?:PROCENTA|percent)")).unwrap());

static PAID_UP_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)(?:splaceno|paid[-_ ]?up)\s*:\s*\d+(?:[.,;]\d+)?\s*(?:%|PROCENTA|percent)"
    ))
    .unwrap()
});

static EFFECTIVE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)(?:effective(?:ly)?|efektivně)\s+{NUMBER}\s*%")).unwrap()
});

static BARE_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\d+(?:[.,]\d+)?)\s*$").unwrap());

/// Reads a number that may use `,` or `;` as its decimal separator.
pub fn to_number(raw: &str) -> Option<f64> {
    raw.trim().replace([',', ';'], ".").parse::<f64>().ok()
}

fn clamp_unit(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}

fn sum_fractions(text: &str, patterns: &[&Regex]) -> Option<f64> {
    let mut total = 0.0;
    let mut found = false;
    for pattern in patterns {
        for caps in pattern.captures_iter(text) {
            let numerator = to_number(&caps[1]);
            let denominator = to_number(&caps[2]);
            if let (Some(a), Some(b)) = (numerator, denominator) {
                if b != 0.0 {
                    total += a / b;
                    found = true;
                }
            }
        }
    }
    found.then_some(total)
}

fn sum_percentages(text: &str, patterns: &[&Regex]) -> Option<f64> {
    let mut total = 0.0;
    let mut found = false;
    for pattern in patterns {
        for caps in pattern.captures_iter(text) {
            if let Some(v) = to_number(&caps[1]) {
                total += v / 100.0;
                found = true;
            }
        }
    }
    found.then_some(total)
}

/// Parses an ownership fraction in `[0, 1]` out of free text.
///
/// Tiers, in strict priority order (no fallthrough once a tier matched):
/// 1. business-share fields, fraction or percentage form
/// 2. voting-rights percentage fields
/// 3. generic fractions `a/b`, `a;b`
/// 4. generic percentages `N %`, `N PROCENTA`
///
/// Every occurrence within the winning tier is summed, then the sum is clamped.
/// Paid-up fields and `effective N %` annotations are ignored by all tiers.
pub fn parse_share(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    let stripped = PAID_UP_FIELD.replace_all(text, "");
    let stripped = EFFECTIVE.replace_all(&stripped, "");

    let business = match (
        sum_fractions(&stripped, &[&BUSINESS_SHARE_FRACTION]),
        sum_percentages(&stripped, &[&BUSINESS_SHARE_PERCENT]),
    ) {
        (None, None) => None,
        (a, b) => Some(a.unwrap_or(0.0) + b.unwrap_or(0.0)),
    };

    business
        .or_else(|| sum_percentages(&stripped, &[&VOTING_RIGHTS_PERCENT]))
        .or_else(|| sum_fractions(&stripped, &[&FRACTION_SLASH, &FRACTION_SEMICOLON]))
        .or_else(|| sum_percentages(&stripped, &[&PERCENT_SIGN, &PERCENT_WORD]))
        .map(clamp_unit)
}

/// Recognizes an `effective NN %` annotation: a value already discounted by
/// every ancestor along the chain.
pub fn parse_effective(text: &str) -> Option<f64> {
    let caps = EFFECTIVE.captures(text.trim())?;
    to_number(&caps[1]).map(|v| clamp_unit(v / 100.0))
}

/// Last-resort reading of a lone number as a percentage (`"50"` means 50 %).
pub fn parse_bare_percent(text: &str) -> Option<f64> {
    let caps = BARE_NUMBER.captures(text)?;
    to_number(&caps[1]).map(|v| clamp_unit(v / 100.0))
}
