//! Canonical text form for affiliation strings
//!
//! Stages, in order:
//! 1. lowercase, collapse whitespace
//! 2. strip diacritics (NFD, drop combining marks)
//! 3. remove email addresses
//! 4. unify quote and dash variants
//! 5. canonicalize country variants (whole word, optional trailing period)
//! 6. replace characters outside `[\w\s,.'-]` with spaces, un-glue abbreviation dots
//!    and canonicalize countries again, since un-gluing can reveal a variant
//! 7. expand institutional abbreviations token by token
//! 8. remove postal codes, ZIP+4 included
//! 9. tidy commas and whitespace
//!
//! Countries are canonicalized before the dot un-gluing so dotted forms such
//! as `u.s.a.` are still recognized. Emails go before the character filter,
//! which would otherwise destroy the `@` that identifies them.
//!
//! The output is a fixed point: `normalize(&normalize(x)) == normalize(x)`.

use crate::affiliation::tables::{expand_abbreviation, COUNTRY_SYNONYMS};
use regex::{Captures, Regex};
use std::sync::LazyLock;
use unicode_normalization::UnicodeNormalization;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\S+@\S+").expect("valid regex"));

static UNSAFE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s,.'-]").expect("valid regex"));

static GLUED_DOT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\.([a-z])").expect("valid regex"));

static NUMERIC_POSTAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{5,6}(?:-\d{4})?\b").expect("valid regex"));

static UK_POSTAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b[a-z]{1,2}\d{1,2}[a-z]?\s*\d[a-z]{2}\b").expect("valid regex")
});

static SPACE_BEFORE_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+,").expect("valid regex"));

static REPEATED_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(?:\s*,)+").expect("valid regex"));

/// One alternation over every variant, longest first so `u.s.a` wins over `u.s`
static COUNTRY_VARIANT: LazyLock<Regex> = LazyLock::new(|| {
    let mut variants: Vec<&str> = COUNTRY_SYNONYMS.iter().map(|(v, _)| *v).collect();
    variants.sort_by_key(|v| std::cmp::Reverse(v.len()));
    let alternation = variants
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{})\b\.?", alternation)).expect("valid regex")
});

pub(crate) fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn strip_diacritics(text: &str) -> String {
    text.nfd()
        .filter(|c| !unicode_normalization::char::is_combining_mark(*c))
        .collect()
}

fn unify_quotes_and_dashes(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '"' | '\u{201C}' | '\u{201D}' | '\u{2018}' | '\u{2019}' | '`' | '\u{00B4}' => '\'',
            '\u{2013}' | '\u{2014}' => '-',
            other => other,
        })
        .collect()
}

/// Replaces every country variant with its canonical name
pub(crate) fn canonicalize_countries(text: &str) -> String {
    COUNTRY_VARIANT
        .replace_all(text, |caps: &Captures| {
            let matched = caps[0].to_lowercase();
            let variant = matched.trim_end_matches('.');
            COUNTRY_SYNONYMS
                .iter()
                .find(|(v, _)| *v == variant)
                .map(|(_, canonical)| (*canonical).to_string())
                .unwrap_or(matched.clone())
        })
        .into_owned()
}

fn expand_abbreviations(text: &str) -> String {
    text.split_whitespace()
        .map(|token| {
            let body = token.trim_end_matches(',');
            let commas = &token[body.len()..];
            match expand_abbreviation(body.trim_end_matches('.')) {
                Some(expanded) => format!("{}{}", expanded, commas),
                None => token.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn remove_postal_codes(text: &str) -> String {
    let text = NUMERIC_POSTAL.replace_all(text, "");
    UK_POSTAL.replace_all(&text, "").into_owned()
}

fn tidy(text: &str) -> String {
    let text = collapse_whitespace(text);
    let text = SPACE_BEFORE_COMMA.replace_all(&text, ",");
    let text = REPEATED_COMMA.replace_all(&text, ",");
    text.trim_matches(|c: char| c == ',' || c.is_whitespace())
        .to_string()
}

/// Normalizes affiliation text for comparison
///
/// # Example
///
/// ```
/// use cite_ripple::affiliation::normalize;
///
/// let text = normalize("Dept. of Biology, Stanford Univ., CA 94305, USA");
/// assert_eq!(text, "department of biology, stanford university, ca, united states");
/// ```
pub fn normalize(text: &str) -> String {
    let text = collapse_whitespace(&text.to_lowercase());
    let text = strip_diacritics(&text);
    let text = EMAIL.replace_all(&text, " ");
    let text = unify_quotes_and_dashes(&text);
    let text = canonicalize_countries(&text);
    let text = UNSAFE_CHARS.replace_all(&text, " ");
    let text = GLUED_DOT.replace_all(&text, ". $1");
    let text = canonicalize_countries(&text);
    let text = expand_abbreviations(&text);
    let text = remove_postal_codes(&text);
    tidy(&text)
}
