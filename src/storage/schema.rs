//! Database schema definitions
//!
//! This module contains all SQL schema definitions for the Cite-Ripple database.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track crawl runs
CREATE TABLE IF NOT EXISTS crawl_runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    kind TEXT NOT NULL,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    articles_saved INTEGER NOT NULL DEFAULT 0,
    edges_saved INTEGER NOT NULL DEFAULT 0,
    levels_processed INTEGER NOT NULL DEFAULT 0,
    failures INTEGER NOT NULL DEFAULT 0
);

-- Resolved articles, keyed by DOI
CREATE TABLE IF NOT EXISTS articles (
    doi TEXT PRIMARY KEY,
    pmid TEXT UNIQUE,
    title TEXT NOT NULL,
    abstract TEXT,
    journal TEXT,
    pub_year INTEGER,
    pmc_id TEXT,
    first_seen_at TEXT NOT NULL,
    last_crawled_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_articles_last_crawled ON articles(last_crawled_at);

CREATE TABLE IF NOT EXISTS authors (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    full_name TEXT NOT NULL,
    last_name TEXT,
    fore_name TEXT,
    initials TEXT,
    is_collective INTEGER NOT NULL DEFAULT 0,
    orcid TEXT UNIQUE
);

CREATE INDEX IF NOT EXISTS idx_authors_full_name ON authors(full_name);

CREATE TABLE IF NOT EXISTS article_authors (
    article_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id),
    author_order INTEGER NOT NULL,
    PRIMARY KEY (article_doi, author_id)
);

-- Canonical affiliation entities; never updated after insert
CREATE TABLE IF NOT EXISTS affiliations (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    raw_text TEXT NOT NULL,
    normalized_text TEXT NOT NULL UNIQUE,
    department TEXT,
    institution TEXT,
    city TEXT,
    state TEXT,
    country TEXT,
    postal_code TEXT,
    email_domain TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS article_author_affiliations (
    article_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    author_id INTEGER NOT NULL REFERENCES authors(id),
    affiliation_id INTEGER NOT NULL REFERENCES affiliations(id),
    PRIMARY KEY (article_doi, author_id, affiliation_id)
);

CREATE TABLE IF NOT EXISTS article_keywords (
    article_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    keyword TEXT NOT NULL,
    PRIMARY KEY (article_doi, keyword)
);

CREATE TABLE IF NOT EXISTS publication_types (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS article_publication_types (
    article_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    publication_type_id INTEGER NOT NULL REFERENCES publication_types(id),
    PRIMARY KEY (article_doi, publication_type_id)
);

-- Grants without an ID are stored with an empty grant_id
CREATE TABLE IF NOT EXISTS grants (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    grant_id TEXT NOT NULL DEFAULT '',
    agency TEXT NOT NULL,
    acronym TEXT,
    country TEXT,
    UNIQUE (grant_id, agency)
);

CREATE TABLE IF NOT EXISTS article_grants (
    article_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    grant_row_id INTEGER NOT NULL REFERENCES grants(id),
    PRIMARY KEY (article_doi, grant_row_id)
);

CREATE TABLE IF NOT EXISTS mesh_terms (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    descriptor_name TEXT NOT NULL UNIQUE,
    descriptor_ui TEXT
);

CREATE INDEX IF NOT EXISTS idx_mesh_terms_ui ON mesh_terms(descriptor_ui);

CREATE TABLE IF NOT EXISTS article_mesh_terms (
    article_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    mesh_term_id INTEGER NOT NULL REFERENCES mesh_terms(id),
    is_major_topic INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (article_doi, mesh_term_id)
);

CREATE TABLE IF NOT EXISTS mesh_qualifiers (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    ui TEXT
);

CREATE TABLE IF NOT EXISTS article_mesh_qualifiers (
    article_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    mesh_term_id INTEGER NOT NULL REFERENCES mesh_terms(id),
    qualifier_id INTEGER NOT NULL REFERENCES mesh_qualifiers(id),
    is_major_topic INTEGER NOT NULL DEFAULT 0,
    PRIMARY KEY (article_doi, mesh_term_id, qualifier_id)
);

-- Citation edges; cited_doi stays NULL until the cited article resolves
CREATE TABLE IF NOT EXISTS citation_edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    citing_doi TEXT NOT NULL REFERENCES articles(doi) ON DELETE CASCADE,
    cited_doi TEXT,
    cited_pmid TEXT NOT NULL,
    reference_order INTEGER,
    reference_string TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE (citing_doi, cited_pmid)
);

CREATE UNIQUE INDEX IF NOT EXISTS idx_edges_resolved
    ON citation_edges(citing_doi, cited_doi) WHERE cited_doi IS NOT NULL;
CREATE INDEX IF NOT EXISTS idx_edges_cited_pmid ON citation_edges(cited_pmid);
CREATE INDEX IF NOT EXISTS idx_edges_cited_doi ON citation_edges(cited_doi);

-- Articles whose DOI could not be recovered
CREATE TABLE IF NOT EXISTS missing_doi_articles (
    pmid TEXT PRIMARY KEY,
    title TEXT,
    journal TEXT,
    pub_year INTEGER,
    recorded_at TEXT NOT NULL
);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

/// Stored in `PRAGMA user_version` for future migrations
pub const SCHEMA_VERSION: u32 = 2;
