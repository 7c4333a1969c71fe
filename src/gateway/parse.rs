//! Decoding of E-utilities responses into typed records
//!
//! Search and link responses are JSON; article details are PubMed XML, read
//! with a streaming reader that tracks the element path. Records come out with
//! absent fields left as `None`: deciding what is structurally required is the
//! crawler's job.

use crate::model::{
    normalize_doi, ArticleRecord, AuthorRecord, GrantRecord, MeshHeading, MeshQualifier, SearchPage,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Deserialize;
use thiserror::Error;

/// A response that could not be turned into typed data
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ResponseError {
    /// The payload is not in the expected shape
    #[error("{0}")]
    Malformed(String),

    /// The service answered, but with an error message instead of data
    #[error("{0}")]
    Service(String),
}

#[derive(Debug, Deserialize)]
struct SearchEnvelope {
    esearchresult: Option<SearchResult>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchResult {
    count: Option<String>,
    #[serde(default)]
    idlist: Vec<String>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

/// Parses an `esearch` JSON response
pub fn parse_search_page(body: &str) -> Result<SearchPage, ResponseError> {
    let envelope: SearchEnvelope = serde_json::from_str(body)
        .map_err(|e| ResponseError::Malformed(format!("search JSON: {}", e)))?;

    if let Some(message) = envelope.error {
        return Err(ResponseError::Service(message));
    }

    let result = envelope
        .esearchresult
        .ok_or_else(|| ResponseError::Malformed("missing esearchresult".to_string()))?;

    if let Some(message) = result.error {
        return Err(ResponseError::Service(message));
    }

    let count = match result.count {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .map_err(|_| ResponseError::Malformed(format!("invalid count '{}'", raw)))?,
        None => result.idlist.len() as u64,
    };

    Ok(SearchPage {
        count,
        ids: result.idlist,
    })
}

#[derive(Debug, Deserialize)]
struct LinkEnvelope {
    #[serde(default)]
    linksets: Vec<LinkSet>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkSet {
    #[serde(default)]
    linksetdbs: Vec<LinkSetDb>,
    #[serde(rename = "ERROR")]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LinkSetDb {
    linkname: String,
    #[serde(default)]
    links: Vec<String>,
}

/// Parses an `elink` JSON response, returning the IDs listed under `linkname`
///
/// An article with no links of that kind yields an empty list.
pub fn parse_link_ids(body: &str, linkname: &str) -> Result<Vec<String>, ResponseError> {
    let envelope: LinkEnvelope = serde_json::from_str(body)
        .map_err(|e| ResponseError::Malformed(format!("link JSON: {}", e)))?;

    if let Some(message) = envelope.error {
        return Err(ResponseError::Service(message));
    }

    let mut ids = Vec::new();
    for set in envelope.linksets {
        if let Some(message) = set.error {
            return Err(ResponseError::Service(message));
        }
        for db in set.linksetdbs.into_iter().filter(|db| db.linkname == linkname) {
            ids.extend(db.links);
        }
    }

    Ok(ids)
}

/// Leaf elements whose text is captured
#[derive(Debug, Clone)]
enum Field {
    Pmid,
    Title,
    AbstractSection(Option<String>),
    Journal,
    Year,
    MedlineDate,
    ElocationDoi,
    ArticleIdDoi,
    ArticleIdPmc,
    LastName,
    ForeName,
    Initials,
    CollectiveName,
    Orcid,
    Affiliation,
    Keyword,
    PublicationType,
    GrantId,
    GrantAcronym,
    GrantAgency,
    GrantCountry,
    MeshDescriptor { ui: Option<String>, major: bool },
    MeshQualifier { ui: Option<String>, major: bool },
    ServiceError,
}

struct Capture {
    depth: usize,
    field: Field,
    text: String,
}

#[derive(Default)]
struct PendingArticle {
    record: ArticleRecord,
    fallback_doi: Option<String>,
    abstract_sections: Vec<String>,
}

impl PendingArticle {
    fn finish(mut self) -> ArticleRecord {
        if self.record.doi.is_none() {
            self.record.doi = self.fallback_doi;
        }
        if !self.abstract_sections.is_empty() {
            self.record.abstract_text = Some(self.abstract_sections.join("\n"));
        }
        self.record
            .mesh_headings
            .retain(|heading| !heading.descriptor_name.is_empty());
        self.record
    }

    fn current_author(&mut self) -> Option<&mut AuthorRecord> {
        self.record.authors.last_mut()
    }

    fn apply(&mut self, field: Field, text: String) {
        if text.is_empty() {
            return;
        }
        match field {
            Field::Pmid => self.record.numeric_id = Some(text),
            Field::Title => self.record.title = Some(text),
            Field::AbstractSection(label) => self.abstract_sections.push(match label {
                Some(label) => format!("{}: {}", label, text),
                None => text,
            }),
            Field::Journal => self.record.journal = Some(text),
            Field::Year => self.record.pub_year = text.parse().ok(),
            Field::MedlineDate => {
                if self.record.pub_year.is_none() {
                    self.record.pub_year = text.get(..4).and_then(|y| y.parse().ok());
                }
            }
            Field::ElocationDoi => {
                if self.record.doi.is_none() {
                    self.record.doi = normalize_doi(&text);
                }
            }
            Field::ArticleIdDoi => {
                if self.fallback_doi.is_none() {
                    self.fallback_doi = normalize_doi(&text);
                }
            }
            Field::ArticleIdPmc => self.record.pmc_id = Some(text),
            Field::LastName => set_author(self, |a| a.last_name = Some(text)),
            Field::ForeName => set_author(self, |a| a.fore_name = Some(text)),
            Field::Initials => set_author(self, |a| a.initials = Some(text)),
            Field::CollectiveName => set_author(self, |a| a.collective_name = Some(text)),
            Field::Orcid => set_author(self, |a| a.orcid = Some(normalize_orcid(&text))),
            Field::Affiliation => set_author(self, |a| a.affiliations.push(text)),
            Field::Keyword => self.record.keywords.push(text),
            Field::PublicationType => self.record.publication_types.push(text),
            Field::GrantId => set_grant(self, |g| g.grant_id = Some(text)),
            Field::GrantAcronym => set_grant(self, |g| g.acronym = Some(text)),
            Field::GrantAgency => set_grant(self, |g| g.agency = Some(text)),
            Field::GrantCountry => set_grant(self, |g| g.country = Some(text)),
            Field::MeshDescriptor { ui, major } => {
                if let Some(heading) = self.record.mesh_headings.last_mut() {
                    heading.descriptor_name = text;
                    heading.descriptor_ui = ui;
                    heading.is_major_topic = major;
                }
            }
            Field::MeshQualifier { ui, major } => {
                if let Some(heading) = self.record.mesh_headings.last_mut() {
                    heading.qualifiers.push(MeshQualifier {
                        name: text,
                        ui,
                        is_major_topic: major,
                    });
                }
            }
            Field::ServiceError => {}
        }
    }
}

fn set_author(pending: &mut PendingArticle, update: impl FnOnce(&mut AuthorRecord)) {
    if let Some(author) = pending.current_author() {
        update(author);
    }
}

fn set_grant(pending: &mut PendingArticle, update: impl FnOnce(&mut GrantRecord)) {
    if let Some(grant) = pending.record.grants.last_mut() {
        update(grant);
    }
}

fn major_topic(element: &BytesStart) -> bool {
    attribute(element, b"MajorTopicYN").as_deref() == Some("Y")
}

/// ORCIDs appear both bare and as `https://orcid.org/...` URLs
fn normalize_orcid(raw: &str) -> String {
    raw.trim()
        .trim_start_matches("http://orcid.org/")
        .trim_start_matches("https://orcid.org/")
        .to_string()
}

fn ends_with(path: &[Vec<u8>], suffix: &[&[u8]]) -> bool {
    path.len() >= suffix.len()
        && path[path.len() - suffix.len()..]
            .iter()
            .zip(suffix)
            .all(|(a, b)| a.as_slice() == *b)
}

fn attribute(element: &BytesStart, key: &[u8]) -> Option<String> {
    element
        .attributes()
        .filter_map(|a| a.ok())
        .find(|a| a.key.as_ref() == key)
        .map(|a| String::from_utf8_lossy(&a.value).into_owned())
}

/// Decides which field, if any, the element just opened at `path` carries
fn classify(path: &[Vec<u8>], element: &BytesStart) -> Option<Field> {
    let field = if ends_with(path, &[b"MedlineCitation", b"PMID"]) {
        Field::Pmid
    } else if ends_with(path, &[b"MedlineCitation", b"Article", b"ArticleTitle"]) {
        Field::Title
    } else if ends_with(path, &[b"Article", b"Abstract", b"AbstractText"]) {
        Field::AbstractSection(attribute(element, b"Label"))
    } else if ends_with(path, &[b"Article", b"Journal", b"Title"]) {
        Field::Journal
    } else if ends_with(path, &[b"JournalIssue", b"PubDate", b"Year"]) {
        Field::Year
    } else if ends_with(path, &[b"JournalIssue", b"PubDate", b"MedlineDate"]) {
        Field::MedlineDate
    } else if ends_with(path, &[b"Article", b"ELocationID"]) {
        if attribute(element, b"EIdType").as_deref() != Some("doi") {
            return None;
        }
        Field::ElocationDoi
    } else if ends_with(path, &[b"PubmedData", b"ArticleIdList", b"ArticleId"]) {
        match attribute(element, b"IdType").as_deref() {
            Some("doi") => Field::ArticleIdDoi,
            Some("pmc") => Field::ArticleIdPmc,
            _ => return None,
        }
    } else if ends_with(path, &[b"AuthorList", b"Author", b"LastName"]) {
        Field::LastName
    } else if ends_with(path, &[b"AuthorList", b"Author", b"ForeName"]) {
        Field::ForeName
    } else if ends_with(path, &[b"AuthorList", b"Author", b"Initials"]) {
        Field::Initials
    } else if ends_with(path, &[b"AuthorList", b"Author", b"CollectiveName"]) {
        Field::CollectiveName
    } else if ends_with(path, &[b"AuthorList", b"Author", b"Identifier"]) {
        if attribute(element, b"Source").as_deref() != Some("ORCID") {
            return None;
        }
        Field::Orcid
    } else if ends_with(path, &[b"Author", b"AffiliationInfo", b"Affiliation"]) {
        Field::Affiliation
    } else if ends_with(path, &[b"MedlineCitation", b"KeywordList", b"Keyword"]) {
        Field::Keyword
    } else if ends_with(path, &[b"PublicationTypeList", b"PublicationType"]) {
        Field::PublicationType
    } else if ends_with(path, &[b"GrantList", b"Grant", b"GrantID"]) {
        Field::GrantId
    } else if ends_with(path, &[b"GrantList", b"Grant", b"Acronym"]) {
        Field::GrantAcronym
    } else if ends_with(path, &[b"GrantList", b"Grant", b"Agency"]) {
        Field::GrantAgency
    } else if ends_with(path, &[b"GrantList", b"Grant", b"Country"]) {
        Field::GrantCountry
    } else if ends_with(path, &[b"MeshHeadingList", b"MeshHeading", b"DescriptorName"]) {
        Field::MeshDescriptor {
            ui: attribute(element, b"UI"),
            major: major_topic(element),
        }
    } else if ends_with(path, &[b"MeshHeadingList", b"MeshHeading", b"QualifierName"]) {
        Field::MeshQualifier {
            ui: attribute(element, b"UI"),
            major: major_topic(element),
        }
    } else if ends_with(path, &[b"eFetchResult", b"ERROR"]) {
        Field::ServiceError
    } else {
        return None;
    };
    Some(field)
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses an `efetch` PubMed XML document into article records
///
/// Inline markup inside titles and abstracts (`<i>`, `<sup>`, ...) is
/// flattened to its text. The DOI is taken from the article's `ELocationID`,
/// falling back to the `ArticleIdList` entry.
pub fn parse_articles(xml: &str) -> Result<Vec<ArticleRecord>, ResponseError> {
    let mut reader = Reader::from_str(xml);
    // Keep inter-element spaces so inline markup does not glue words together
    reader.config_mut().trim_text(false);

    let mut path: Vec<Vec<u8>> = Vec::new();
    let mut articles = Vec::new();
    let mut pending: Option<PendingArticle> = None;
    let mut capture: Option<Capture> = None;

    loop {
        let event = reader.read_event().map_err(|e| {
            ResponseError::Malformed(format!(
                "XML error at position {}: {}",
                reader.buffer_position(),
                e
            ))
        })?;

        match event {
            Event::Start(e) => {
                path.push(e.name().as_ref().to_vec());

                if e.name().as_ref() == b"PubmedArticle" {
                    pending = Some(PendingArticle::default());
                } else if let Some(article) = pending.as_mut() {
                    if ends_with(&path, &[b"Article", b"AuthorList", b"Author"]) {
                        article.record.authors.push(AuthorRecord::default());
                    } else if ends_with(&path, &[b"Article", b"GrantList", b"Grant"]) {
                        article.record.grants.push(GrantRecord::default());
                    } else if ends_with(&path, &[b"MeshHeadingList", b"MeshHeading"]) {
                        article.record.mesh_headings.push(MeshHeading::default());
                    }
                }

                if capture.is_none() {
                    if let Some(field) = classify(&path, &e) {
                        capture = Some(Capture {
                            depth: path.len(),
                            field,
                            text: String::new(),
                        });
                    }
                }
            }
            Event::Text(e) => {
                if let Some(active) = capture.as_mut() {
                    match e.unescape() {
                        Ok(text) => active.text.push_str(&text),
                        Err(_) => active.text.push_str(&String::from_utf8_lossy(e.as_ref())),
                    }
                }
            }
            Event::CData(e) => {
                if let Some(active) = capture.as_mut() {
                    active.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Event::End(e) => {
                if capture.as_ref().is_some_and(|c| c.depth == path.len()) {
                    if let Some(done) = capture.take() {
                        let text = collapse_whitespace(&done.text);
                        if let Field::ServiceError = done.field {
                            return Err(ResponseError::Service(text));
                        }
                        if let Some(article) = pending.as_mut() {
                            article.apply(done.field, text);
                        }
                    }
                }

                if e.name().as_ref() == b"PubmedArticle" {
                    if let Some(article) = pending.take() {
                        articles.push(article.finish());
                    }
                }
                path.pop();
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(articles)
}
