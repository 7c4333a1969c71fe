//! Structured fields pulled out of a raw affiliation string

use crate::affiliation::tables::{canonical_country, DEPARTMENT_KEYWORDS};
use regex::Regex;
use std::sync::LazyLock;

static POSTAL_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{5,6}(?:-\d{4})?\b|\b[A-Z]{1,2}\d{1,2}[A-Z]?\s*\d[A-Z]{2}\b").expect("valid regex")
});

static EMAIL_DOMAIN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"@([a-zA-Z0-9.-]+\.[a-zA-Z]{2,})").expect("valid regex"));

/// "CA", "CA 94305", "MA 02115-5701"
static STATE_ZIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Za-z]{2})\.?(?:\s+\d{5}(?:-\d{4})?)?$").expect("valid regex")
});

/// Components of an affiliation, as far as they can be recognized
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Components {
    pub department: Option<String>,
    pub institution: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    /// Canonical lowercase country name
    pub country: Option<String>,
    pub postal_code: Option<String>,
    pub email_domain: Option<String>,
}

fn non_empty(text: &str) -> Option<String> {
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Splits an affiliation on commas and classifies the segments
///
/// The first segment is the department when it mentions one (the second is
/// then the institution), otherwise it is the institution. The last segment
/// is the country if it names one. City and state come from the segments
/// in between. Postal code and email domain are scanned from the whole text.
pub fn extract_components(text: &str) -> Components {
    let mut components = Components {
        postal_code: POSTAL_CODE.find(text).map(|m| m.as_str().to_string()),
        email_domain: EMAIL_DOMAIN
            .captures(text)
            .map(|caps| caps[1].to_lowercase()),
        ..Components::default()
    };

    // Anything after a semicolon is usually a contact note or second affiliation
    let primary = text.split(';').next().unwrap_or_default();
    let parts: Vec<&str> = primary
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect();

    let Some(first) = parts.first() else {
        return components;
    };

    let first_lower = first.to_lowercase();
    let institution_index = if DEPARTMENT_KEYWORDS.iter().any(|k| first_lower.contains(k)) {
        components.department = non_empty(first);
        1
    } else {
        0
    };
    components.institution = parts.get(institution_index).and_then(|p| non_empty(p));

    let mut region_end = parts.len();
    if parts.len() > 1 {
        let last = parts[parts.len() - 1].to_lowercase();
        if let Some(country) = canonical_country(&last) {
            components.country = Some(country.to_string());
            region_end -= 1;
        }
    }

    let region_start = (institution_index + 1).min(region_end);
    let region = &parts[region_start..region_end];
    if let Some((last, before)) = region.split_last() {
        if let Some(caps) = STATE_ZIP.captures(last) {
            components.state = Some(caps[1].to_uppercase());
            components.city = before.last().and_then(|p| non_empty(p));
        } else {
            let city = POSTAL_CODE.replace_all(last, "");
            components.city = non_empty(&city);
        }
    }

    components
}
