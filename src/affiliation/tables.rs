//! Fixed vocabularies used by affiliation normalization

/// Institutional abbreviations, expanded token by token
pub const ABBREVIATIONS: &[(&str, &str)] = &[
    ("univ", "university"),
    ("u", "university"),
    ("coll", "college"),
    ("inst", "institute"),
    ("hosp", "hospital"),
    ("med", "medical"),
    ("sch", "school"),
    ("dept", "department"),
    ("div", "division"),
    ("lab", "laboratory"),
    ("ctr", "center"),
    ("cntr", "center"),
    ("fac", "faculty"),
    ("res", "research"),
    ("natl", "national"),
    ("intl", "international"),
    ("sci", "science"),
    ("tech", "technology"),
    ("eng", "engineering"),
    ("bio", "biology"),
    ("chem", "chemistry"),
    ("phys", "physics"),
    ("math", "mathematics"),
    ("comp", "computer"),
    ("elec", "electrical"),
    ("mech", "mechanical"),
];

/// Country-name variants and their canonical form
///
/// Keys carry no trailing period; the matcher accepts one.
pub const COUNTRY_SYNONYMS: &[(&str, &str)] = &[
    ("usa", "united states"),
    ("u.s.a", "united states"),
    ("us", "united states"),
    ("u.s", "united states"),
    ("united states of america", "united states"),
    ("uk", "united kingdom"),
    ("u.k", "united kingdom"),
    ("great britain", "united kingdom"),
    ("pr china", "china"),
    ("p.r. china", "china"),
    ("p. r. china", "china"),
    ("peoples r china", "china"),
    ("people's republic of china", "china"),
    ("republic of korea", "south korea"),
    ("rok", "south korea"),
];

/// Canonical country names accepted as-is in the last segment of an affiliation
pub const KNOWN_COUNTRIES: &[&str] = &[
    "argentina",
    "australia",
    "austria",
    "belgium",
    "brazil",
    "canada",
    "chile",
    "china",
    "colombia",
    "czech republic",
    "denmark",
    "egypt",
    "finland",
    "france",
    "germany",
    "greece",
    "hong kong",
    "hungary",
    "india",
    "iran",
    "ireland",
    "israel",
    "italy",
    "japan",
    "malaysia",
    "mexico",
    "netherlands",
    "new zealand",
    "nigeria",
    "norway",
    "pakistan",
    "poland",
    "portugal",
    "saudi arabia",
    "singapore",
    "south africa",
    "south korea",
    "spain",
    "sweden",
    "switzerland",
    "taiwan",
    "thailand",
    "turkey",
    "united kingdom",
    "united states",
];

/// Words that do not count as shared evidence between two affiliations
pub const STOP_WORDS: &[&str] = &["of", "and", "for", "the", "in", "at", "on"];

/// Substrings marking the first segment as a department rather than an institution
pub const DEPARTMENT_KEYWORDS: &[&str] = &[
    "department",
    "dept",
    "division",
    "div",
    "laboratory",
    "lab",
    "center",
    "institute",
];

pub fn expand_abbreviation(token: &str) -> Option<&'static str> {
    ABBREVIATIONS
        .iter()
        .find(|(short, _)| *short == token)
        .map(|(_, long)| *long)
}

/// Resolves a lowercase country variant or canonical name
pub fn canonical_country(name: &str) -> Option<&'static str> {
    let name = name.trim().trim_end_matches('.').trim();
    if let Some((_, canonical)) = COUNTRY_SYNONYMS.iter().find(|(variant, _)| *variant == name) {
        return Some(canonical);
    }
    KNOWN_COUNTRIES.iter().copied().find(|c| *c == name)
}
