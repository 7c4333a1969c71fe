//! SQLite storage implementation
//!
//! This module provides a SQLite-based implementation of the Store trait.

use crate::affiliation::AffiliationEntity;
use crate::model::{ArticleRecord, AuthorRecord, CitationEdge, GrantRecord, MeshHeading, StoredArticle};
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{MissingIdSink, StorageError, StorageResult, Store};
use crate::storage::{RunRecord, RunStatus, RunTotals};
use crate::RippleError;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashSet;
use std::path::Path;

/// SQLite storage backend
pub struct SqliteStorage {
    conn: Connection,
}

impl SqliteStorage {
    /// Creates a new SqliteStorage instance
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteStorage)` - Successfully opened/created database
    /// * `Err(RippleError)` - Failed to open database
    pub fn new(path: &Path) -> Result<Self, RippleError> {
        Ok(Self {
            conn: init_database(path)?,
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> Result<Self, RippleError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    fn count(&self, sql: &str) -> StorageResult<u64> {
        let n: i64 = self.conn.query_row(sql, [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }
}

fn stored_article(row: &Row<'_>) -> rusqlite::Result<StoredArticle> {
    Ok(StoredArticle {
        doi: row.get(0)?,
        numeric_id: row.get(1)?,
        title: row.get(2)?,
    })
}

fn run_record(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        kind: row.get(1)?,
        started_at: row.get(2)?,
        finished_at: row.get(3)?,
        config_hash: row.get(4)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(5)?)
            .unwrap_or(RunStatus::Running),
        totals: RunTotals {
            articles_saved: row.get::<_, i64>(6)?.max(0) as u64,
            edges_saved: row.get::<_, i64>(7)?.max(0) as u64,
            levels_processed: row.get::<_, i64>(8)?.max(0) as u64,
            failures: row.get::<_, i64>(9)?.max(0) as u64,
        },
    })
}

/// Finds or creates the author row for one author entry
///
/// Authors with an ORCID are matched on it; the rest are matched on their
/// display name. Entries without any name are skipped.
fn upsert_author(conn: &Connection, author: &AuthorRecord) -> rusqlite::Result<Option<i64>> {
    let Some(full_name) = author.display_name() else {
        return Ok(None);
    };

    let existing: Option<i64> = match &author.orcid {
        Some(orcid) => conn
            .query_row(
                "SELECT id FROM authors WHERE orcid = ?1",
                params![orcid],
                |row| row.get(0),
            )
            .optional()?,
        None => conn
            .query_row(
                "SELECT id FROM authors WHERE full_name = ?1 ORDER BY id LIMIT 1",
                params![full_name],
                |row| row.get(0),
            )
            .optional()?,
    };
    if existing.is_some() {
        return Ok(existing);
    }

    conn.execute(
        "INSERT INTO authors (full_name, last_name, fore_name, initials, is_collective, orcid)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            full_name,
            author.last_name,
            author.fore_name,
            author.initials,
            author.last_name.is_none() && author.collective_name.is_some(),
            author.orcid,
        ],
    )?;
    Ok(Some(conn.last_insert_rowid()))
}

fn link_publication_types(conn: &Connection, doi: &str, types: &[String]) -> rusqlite::Result<()> {
    for name in types {
        conn.execute(
            "INSERT OR IGNORE INTO publication_types (name) VALUES (?1)",
            params![name],
        )?;
        let type_id: i64 = conn.query_row(
            "SELECT id FROM publication_types WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO article_publication_types (article_doi, publication_type_id)
             VALUES (?1, ?2)",
            params![doi, type_id],
        )?;
    }
    Ok(())
}

/// Links the article to its grants; grants naming no agency are skipped
fn link_grants(conn: &Connection, doi: &str, grants: &[GrantRecord]) -> rusqlite::Result<()> {
    for grant in grants {
        let Some(agency) = grant.agency.as_deref() else {
            continue;
        };
        let grant_id = grant.grant_id.as_deref().unwrap_or_default();
        conn.execute(
            "INSERT INTO grants (grant_id, agency, acronym, country) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(grant_id, agency) DO UPDATE SET
                acronym = COALESCE(grants.acronym, excluded.acronym),
                country = COALESCE(grants.country, excluded.country)",
            params![grant_id, agency, grant.acronym, grant.country],
        )?;
        let row_id: i64 = conn.query_row(
            "SELECT id FROM grants WHERE grant_id = ?1 AND agency = ?2",
            params![grant_id, agency],
            |row| row.get(0),
        )?;
        conn.execute(
            "INSERT OR IGNORE INTO article_grants (article_doi, grant_row_id) VALUES (?1, ?2)",
            params![doi, row_id],
        )?;
    }
    Ok(())
}

/// Finds a descriptor by its unique identifier, then by name, creating it if neither matches
fn upsert_mesh_term(conn: &Connection, heading: &MeshHeading) -> rusqlite::Result<i64> {
    if let Some(ui) = &heading.descriptor_ui {
        let by_ui: Option<i64> = conn
            .query_row(
                "SELECT id FROM mesh_terms WHERE descriptor_ui = ?1",
                params![ui],
                |row| row.get(0),
            )
            .optional()?;
        if let Some(id) = by_ui {
            return Ok(id);
        }
    }

    conn.execute(
        "INSERT INTO mesh_terms (descriptor_name, descriptor_ui) VALUES (?1, ?2)
         ON CONFLICT(descriptor_name) DO UPDATE SET
            descriptor_ui = COALESCE(mesh_terms.descriptor_ui, excluded.descriptor_ui)",
        params![heading.descriptor_name, heading.descriptor_ui],
    )?;
    conn.query_row(
        "SELECT id FROM mesh_terms WHERE descriptor_name = ?1",
        params![heading.descriptor_name],
        |row| row.get(0),
    )
}

fn link_mesh_headings(conn: &Connection, doi: &str, headings: &[MeshHeading]) -> rusqlite::Result<()> {
    for heading in headings {
        let term_id = upsert_mesh_term(conn, heading)?;
        conn.execute(
            "INSERT INTO article_mesh_terms (article_doi, mesh_term_id, is_major_topic)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(article_doi, mesh_term_id) DO UPDATE SET is_major_topic = excluded.is_major_topic",
            params![doi, term_id, heading.is_major_topic],
        )?;

        for qualifier in &heading.qualifiers {
            conn.execute(
                "INSERT INTO mesh_qualifiers (name, ui) VALUES (?1, ?2)
                 ON CONFLICT(name) DO UPDATE SET ui = COALESCE(mesh_qualifiers.ui, excluded.ui)",
                params![qualifier.name, qualifier.ui],
            )?;
            let qualifier_id: i64 = conn.query_row(
                "SELECT id FROM mesh_qualifiers WHERE name = ?1",
                params![qualifier.name],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO article_mesh_qualifiers (article_doi, mesh_term_id, qualifier_id, is_major_topic)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(article_doi, mesh_term_id, qualifier_id)
                 DO UPDATE SET is_major_topic = excluded.is_major_topic",
                params![doi, term_id, qualifier_id, qualifier.is_major_topic],
            )?;
        }
    }
    Ok(())
}

impl Store for SqliteStorage {
    // ===== Articles =====

    fn known_numeric_ids(&self) -> StorageResult<HashSet<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT pmid FROM articles WHERE pmid IS NOT NULL
             UNION SELECT pmid FROM missing_doi_articles",
        )?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(ids)
    }

    fn find_by_numeric_id(&self, numeric_id: &str) -> StorageResult<Option<StoredArticle>> {
        let article = self
            .conn
            .query_row(
                "SELECT doi, pmid, title FROM articles WHERE pmid = ?1",
                params![numeric_id],
                stored_article,
            )
            .optional()?;
        Ok(article)
    }

    fn find_by_doi(&self, doi: &str) -> StorageResult<Option<StoredArticle>> {
        let article = self
            .conn
            .query_row(
                "SELECT doi, pmid, title FROM articles WHERE doi = ?1",
                params![doi],
                stored_article,
            )
            .optional()?;
        Ok(article)
    }

    fn stale_numeric_ids(&self, crawled_before: &str, limit: usize) -> StorageResult<Vec<String>> {
        let mut stmt = self.conn.prepare(
            "SELECT pmid FROM articles
             WHERE pmid IS NOT NULL AND last_crawled_at < ?1
             ORDER BY last_crawled_at LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![crawled_before, limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn upsert_article(
        &mut self,
        record: &ArticleRecord,
        affiliation_ids: &[Vec<i64>],
    ) -> StorageResult<bool> {
        let doi = record
            .doi
            .as_deref()
            .ok_or_else(|| StorageError::MissingDoi(record.label().to_string()))?;
        let now = Utc::now().to_rfc3339();

        let tx = self.conn.transaction()?;

        let existed = tx
            .query_row(
                "SELECT 1 FROM articles WHERE doi = ?1",
                params![doi],
                |_| Ok(()),
            )
            .optional()?
            .is_some();

        tx.execute(
            "INSERT INTO articles (doi, pmid, title, abstract, journal, pub_year, pmc_id, first_seen_at, last_crawled_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
             ON CONFLICT(doi) DO UPDATE SET
                pmid = COALESCE(excluded.pmid, articles.pmid),
                title = excluded.title,
                abstract = COALESCE(excluded.abstract, articles.abstract),
                journal = COALESCE(excluded.journal, articles.journal),
                pub_year = COALESCE(excluded.pub_year, articles.pub_year),
                pmc_id = COALESCE(excluded.pmc_id, articles.pmc_id),
                last_crawled_at = excluded.last_crawled_at",
            params![
                doi,
                record.numeric_id,
                record.title.as_deref().unwrap_or_default(),
                record.abstract_text,
                record.journal,
                record.pub_year,
                record.pmc_id,
                now,
            ],
        )?;

        for (order, author) in record.authors.iter().enumerate() {
            let Some(author_id) = upsert_author(&tx, author)? else {
                continue;
            };
            tx.execute(
                "INSERT OR IGNORE INTO article_authors (article_doi, author_id, author_order)
                 VALUES (?1, ?2, ?3)",
                params![doi, author_id, order as i64 + 1],
            )?;
            for affiliation_id in affiliation_ids.get(order).into_iter().flatten() {
                tx.execute(
                    "INSERT OR IGNORE INTO article_author_affiliations (article_doi, author_id, affiliation_id)
                     VALUES (?1, ?2, ?3)",
                    params![doi, author_id, affiliation_id],
                )?;
            }
        }

        for keyword in &record.keywords {
            tx.execute(
                "INSERT OR IGNORE INTO article_keywords (article_doi, keyword) VALUES (?1, ?2)",
                params![doi, keyword],
            )?;
        }
        link_publication_types(&tx, doi, &record.publication_types)?;
        link_grants(&tx, doi, &record.grants)?;
        link_mesh_headings(&tx, doi, &record.mesh_headings)?;

        if let Some(pmid) = &record.numeric_id {
            // Edges recorded before this article resolved now point at it
            tx.execute(
                "UPDATE OR IGNORE citation_edges SET cited_doi = ?1
                 WHERE cited_pmid = ?2 AND cited_doi IS NULL",
                params![doi, pmid],
            )?;
            // Anything left dangling duplicates an already resolved edge
            tx.execute(
                "DELETE FROM citation_edges WHERE cited_pmid = ?1 AND cited_doi IS NULL",
                params![pmid],
            )?;
            tx.execute(
                "DELETE FROM missing_doi_articles WHERE pmid = ?1",
                params![pmid],
            )?;
        }

        tx.commit()?;
        Ok(!existed)
    }

    // ===== Citation edges =====

    fn upsert_citation_edge(&mut self, edge: &CitationEdge) -> StorageResult<bool> {
        if edge.cited_doi.is_some() {
            let resolved = self.conn.execute(
                "UPDATE OR IGNORE citation_edges
                 SET cited_doi = ?1, reference_order = COALESCE(reference_order, ?2)
                 WHERE citing_doi = ?3 AND cited_pmid = ?4 AND cited_doi IS NULL",
                params![
                    edge.cited_doi,
                    edge.reference_order,
                    edge.citing_doi,
                    edge.cited_numeric_id
                ],
            )?;
            if resolved > 0 {
                return Ok(true);
            }
        }

        let now = Utc::now().to_rfc3339();
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO citation_edges
             (citing_doi, cited_doi, cited_pmid, reference_order, reference_string, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                edge.citing_doi,
                edge.cited_doi,
                edge.cited_numeric_id,
                edge.reference_order,
                edge.reference_string,
                now,
            ],
        )?;
        Ok(inserted > 0)
    }

    fn citation_edges_from(&self, citing_doi: &str) -> StorageResult<Vec<CitationEdge>> {
        let mut stmt = self.conn.prepare(
            "SELECT citing_doi, cited_doi, cited_pmid, reference_order, reference_string
             FROM citation_edges WHERE citing_doi = ?1
             ORDER BY reference_order IS NULL, reference_order, id",
        )?;
        let edges = stmt
            .query_map(params![citing_doi], |row| {
                Ok(CitationEdge {
                    citing_doi: row.get(0)?,
                    cited_doi: row.get(1)?,
                    cited_numeric_id: row.get(2)?,
                    reference_order: row.get(3)?,
                    reference_string: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(edges)
    }

    // ===== Affiliations =====

    fn all_affiliations(&self) -> StorageResult<Vec<(i64, String)>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, raw_text FROM affiliations ORDER BY id")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn upsert_affiliation(&mut self, entity: &AffiliationEntity) -> StorageResult<i64> {
        let c = &entity.components;
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR IGNORE INTO affiliations
             (raw_text, normalized_text, department, institution, city, state, country, postal_code, email_domain, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                entity.raw_text,
                entity.normalized,
                c.department,
                c.institution,
                c.city,
                c.state,
                c.country,
                c.postal_code,
                c.email_domain,
                now,
            ],
        )?;

        let id = self.conn.query_row(
            "SELECT id FROM affiliations WHERE normalized_text = ?1",
            params![entity.normalized],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    // ===== Run Management =====

    fn create_run(&mut self, kind: &str, config_hash: &str) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO crawl_runs (kind, started_at, config_hash, status) VALUES (?1, ?2, ?3, ?4)",
            params![kind, now, config_hash, RunStatus::Running.to_db_string()],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        totals: &RunTotals,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE crawl_runs SET status = ?1, finished_at = ?2, articles_saved = ?3,
             edges_saved = ?4, levels_processed = ?5, failures = ?6 WHERE id = ?7",
            params![
                status.to_db_string(),
                now,
                totals.articles_saved as i64,
                totals.edges_saved as i64,
                totals.levels_processed as i64,
                totals.failures as i64,
                run_id,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    fn get_latest_run(&self) -> StorageResult<Option<RunRecord>> {
        let run = self
            .conn
            .query_row(
                "SELECT id, kind, started_at, finished_at, config_hash, status,
                 articles_saved, edges_saved, levels_processed, failures
                 FROM crawl_runs ORDER BY id DESC LIMIT 1",
                [],
                run_record,
            )
            .optional()?;
        Ok(run)
    }

    // ===== Statistics =====

    fn count_articles(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM articles")
    }

    fn count_authors(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM authors")
    }

    fn count_edges(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM citation_edges")
    }

    fn count_dangling_edges(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM citation_edges WHERE cited_doi IS NULL")
    }

    fn count_affiliations(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM affiliations")
    }

    fn count_missing_doi(&self) -> StorageResult<u64> {
        self.count("SELECT COUNT(*) FROM missing_doi_articles")
    }
}

impl MissingIdSink for SqliteStorage {
    fn record(&mut self, record: &ArticleRecord) -> StorageResult<()> {
        let Some(pmid) = &record.numeric_id else {
            return Ok(());
        };
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT OR REPLACE INTO missing_doi_articles (pmid, title, journal, pub_year, recorded_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![pmid, record.title, record.journal, record.pub_year, now],
        )?;
        Ok(())
    }
}

/// Opens a database file and brings its schema up to date
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(Connection)` - Connection with pragmas applied and schema initialized
/// * `Err(rusqlite::Error)` - Failed to open or initialize the database
pub fn init_database(path: &Path) -> Result<Connection, rusqlite::Error> {
    let conn = Connection::open(path)?;

    // Configure SQLite for better performance
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA temp_store = MEMORY;
    ",
    )?;

    initialize_schema(&conn)?;

    Ok(conn)
}
