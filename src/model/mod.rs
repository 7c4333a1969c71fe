//! Typed records exchanged between the gateway, the crawler and the store
//!
//! Every response from the metadata service is decoded once into these
//! structures at the gateway boundary; absent values are explicit `Option`s.

/// A bibliographic record as returned by the detail endpoint
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArticleRecord {
    /// The service's native identifier (PMID)
    pub numeric_id: Option<String>,

    /// Durable identifier, lowercased; absent until resolved
    pub doi: Option<String>,

    pub title: Option<String>,
    pub abstract_text: Option<String>,
    pub journal: Option<String>,
    pub pub_year: Option<i32>,

    /// PubMed Central identifier, when the article has one
    pub pmc_id: Option<String>,

    pub authors: Vec<AuthorRecord>,
    pub keywords: Vec<String>,

    /// "Journal Article", "Review", ...
    pub publication_types: Vec<String>,
    pub grants: Vec<GrantRecord>,
    pub mesh_headings: Vec<MeshHeading>,
}

impl ArticleRecord {
    /// Numeric ID for logging, or a placeholder when absent
    pub fn label(&self) -> &str {
        self.numeric_id.as_deref().unwrap_or("<no id>")
    }

    pub fn has_doi(&self) -> bool {
        self.doi.is_some()
    }
}

/// One author entry on an article, in author-list order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthorRecord {
    pub last_name: Option<String>,
    pub fore_name: Option<String>,
    pub initials: Option<String>,

    /// Consortium or group name used in place of a person
    pub collective_name: Option<String>,

    pub orcid: Option<String>,

    /// Raw affiliation strings as printed on the article
    pub affiliations: Vec<String>,
}

impl AuthorRecord {
    /// Human-readable name: "Fore Last", the collective name, or None
    pub fn display_name(&self) -> Option<String> {
        match (&self.fore_name, &self.last_name) {
            (Some(fore), Some(last)) => Some(format!("{} {}", fore, last)),
            (None, Some(last)) => Some(last.clone()),
            _ => self.collective_name.clone(),
        }
    }
}

/// A funding entry from the article's grant list
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantRecord {
    pub grant_id: Option<String>,
    pub acronym: Option<String>,
    /// Funding body; grants without one are not stored
    pub agency: Option<String>,
    pub country: Option<String>,
}

/// A MeSH descriptor assigned to an article, with its qualifiers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshHeading {
    pub descriptor_name: String,
    pub descriptor_ui: Option<String>,
    pub is_major_topic: bool,
    pub qualifiers: Vec<MeshQualifier>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MeshQualifier {
    pub name: String,
    pub ui: Option<String>,
    pub is_major_topic: bool,
}

/// A reference from the article being expanded to `cited_id`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitedReference {
    pub cited_id: String,
    /// 1-based position in the link list
    pub order: u32,
}

/// An article that cites the article being expanded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitingReference {
    pub citing_id: String,
}

/// One page of search results
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchPage {
    /// Total number of hits for the query, across all pages
    pub count: u64,
    pub ids: Vec<String>,
}

/// A directed citation from a resolved article to another article
///
/// The cited side stays dangling (`cited_doi == None`) until its DOI is known;
/// the numeric ID and raw reference string are kept so it can be resolved later.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CitationEdge {
    pub citing_doi: String,
    pub cited_doi: Option<String>,
    pub cited_numeric_id: String,
    pub reference_order: Option<u32>,
    pub reference_string: String,
}

impl CitationEdge {
    pub fn new(
        citing_doi: impl Into<String>,
        cited_doi: Option<String>,
        cited_numeric_id: impl Into<String>,
        reference_order: Option<u32>,
    ) -> Self {
        let cited_numeric_id = cited_numeric_id.into();
        Self {
            citing_doi: citing_doi.into(),
            cited_doi,
            reference_string: format!("PMID:{}", cited_numeric_id),
            cited_numeric_id,
            reference_order,
        }
    }

    pub fn is_dangling(&self) -> bool {
        self.cited_doi.is_none()
    }
}

/// The subset of a persisted article the crawler needs for lookups
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArticle {
    pub doi: String,
    pub numeric_id: Option<String>,
    pub title: String,
}

/// Normalizes a DOI as printed in metadata or a resolver URL
///
/// Strips `doi:` and `https://doi.org/` prefixes, trims and lowercases.
/// Returns `None` for values that are not DOIs.
pub fn normalize_doi(raw: &str) -> Option<String> {
    let mut doi = raw.trim();
    for prefix in [
        "https://doi.org/",
        "http://doi.org/",
        "https://dx.doi.org/",
        "http://dx.doi.org/",
        "doi:",
    ] {
        let matches = doi
            .get(..prefix.len())
            .is_some_and(|head| head.eq_ignore_ascii_case(prefix));
        if matches {
            doi = doi[prefix.len()..].trim_start();
            break;
        }
    }

    // Every DOI starts with the "10." directory indicator and has a suffix
    if !doi.starts_with("10.") || !doi.contains('/') {
        return None;
    }

    Some(doi.to_lowercase())
}
