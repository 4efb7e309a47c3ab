//! The persistent store: a directory of [`BoundaryRecord`]s (the
//! `BoundaryStore` facet) and the idempotent `warc_record` table (the
//! `CaptureSink` persistence facet), backed by an embedded SQLite
//! database threaded through the pipeline as one cloneable handle
//! (design note "Global store session" — no process-wide engine).

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::AppError;
use crate::model::{BoundaryRecord, Crawl, UrlPattern};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS crawl (
    id INTEGER PRIMARY KEY,
    label TEXT NOT NULL UNIQUE,
    source_url TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS cdx_start_url (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawl(id),
    cdx_num INTEGER NOT NULL,
    tld TEXT NOT NULL,
    domain TEXT NOT NULL,
    subdomain TEXT NOT NULL,
    path TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    headers_blob TEXT NOT NULL,
    created_at TEXT NOT NULL,
    UNIQUE(crawl_id, cdx_num)
);
CREATE INDEX IF NOT EXISTS ix_cdx_order
    ON cdx_start_url(crawl_id, cdx_num, tld, domain, subdomain, path);

CREATE TABLE IF NOT EXISTS warc_record (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawl(id),
    page_url TEXT NOT NULL,
    warc_url TEXT NOT NULL UNIQUE,
    page_metadata TEXT NOT NULL,
    page_length INTEGER NOT NULL,
    warc_length INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

-- Reserved for the downstream embeddings step; no component in this
-- crate writes to either table.
CREATE TABLE IF NOT EXISTS web_text_embeddings (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    url TEXT NOT NULL,
    page_metadata TEXT,
    embedding TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS known_url_patterns (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    crawl_id INTEGER NOT NULL REFERENCES crawl(id),
    url TEXT NOT NULL,
    pattern TEXT NOT NULL,
    warc_count INTEGER NOT NULL DEFAULT 0,
    warc_completed INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
"#;

#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Store {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    // -- Crawl -----------------------------------------------------------

    pub fn get_crawl_by_label(&self, label: &str) -> Result<Option<Crawl>, AppError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, label, source_url, created_at FROM crawl WHERE label = ?1",
            params![label],
            row_to_crawl,
        )
        .optional()
        .map_err(AppError::from)
    }

    pub fn get_crawl_by_id(&self, id: i64) -> Result<Option<Crawl>, AppError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, label, source_url, created_at FROM crawl WHERE id = ?1",
            params![id],
            row_to_crawl,
        )
        .optional()
        .map_err(AppError::from)
    }

    /// Ensures a `Crawl` row for `label` exists, inserting one (with a
    /// random 64-bit id, matching the reference schema's identity scheme)
    /// if absent. A `Crawl` is never mutated after creation.
    pub fn insert_crawl(&self, label: &str, source_url: &str) -> Result<Crawl, AppError> {
        if let Some(existing) = self.get_crawl_by_label(label)? {
            return Ok(existing);
        }
        let id = random_i64();
        let now = Utc::now();
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO crawl (id, label, source_url, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![id, label, source_url, now.to_rfc3339()],
        )?;
        Ok(Crawl {
            id,
            label: label.to_string(),
            source_url: source_url.to_string(),
            created_at: now,
        })
    }

    // -- BoundaryRecord ----------------------------------------------------

    pub fn boundary_count(&self, crawl_id: i64) -> Result<i64, AppError> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT COUNT(*) FROM cdx_start_url WHERE crawl_id = ?1",
            params![crawl_id],
            |row| row.get(0),
        )
        .map_err(AppError::from)
    }

    /// Bulk, transactional insert. Either the whole batch lands or none
    /// of it does.
    pub fn insert_boundaries(&self, records: &[BoundaryRecord]) -> Result<(), AppError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO cdx_start_url
                 (crawl_id, cdx_num, tld, domain, subdomain, path, timestamp, headers_blob, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for record in records {
                stmt.execute(params![
                    record.crawl_id,
                    record.cdx_num,
                    record.tld,
                    record.domain,
                    record.subdomain,
                    record.path,
                    record.timestamp.to_rfc3339(),
                    record.headers_blob,
                    record.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Range-query over the boundary directory to select shards that may
    /// contain captures matching `pattern`. See `DESIGN.md` for the
    /// resolved edge case (an exact domain-boundary match must not be
    /// dropped by the "drop the final element" rule).
    pub fn find_candidate_shards(
        &self,
        crawl_id: i64,
        pattern: &UrlPattern,
    ) -> Result<Vec<BoundaryRecord>, AppError> {
        let tld = pattern
            .tld
            .as_deref()
            .ok_or_else(|| AppError::Invariant("find_candidate_shards requires a tld".into()))?;
        let domain = pattern.domain.as_deref().ok_or_else(|| {
            AppError::Invariant("find_candidate_shards requires a domain".into())
        })?;

        let conn = self.conn.lock().unwrap();

        let tld_lo: Option<i64> = conn
            .query_row(
                "SELECT cdx_num FROM cdx_start_url
                 WHERE crawl_id = ?1 AND tld < ?2
                 ORDER BY tld DESC, domain DESC LIMIT 1",
                params![crawl_id, tld],
                |row| row.get(0),
            )
            .optional()?;

        let tld_hi: Option<i64> = conn
            .query_row(
                "SELECT cdx_num FROM cdx_start_url
                 WHERE crawl_id = ?1 AND tld = ?2
                 ORDER BY tld DESC, domain DESC LIMIT 1",
                params![crawl_id, tld],
                |row| row.get(0),
            )
            .optional()?;

        // No shard carries this tld at all: nothing can match.
        let Some(tld_hi) = tld_hi else {
            return Ok(Vec::new());
        };
        // No shard precedes this tld: the "before" region is the start
        // of the crawl, not a missing bound.
        let tld_lo = tld_lo.unwrap_or(i64::MIN);

        let dom_lo: Option<i64> = conn
            .query_row(
                "SELECT cdx_num FROM cdx_start_url
                 WHERE crawl_id = ?1 AND domain <= ?2 AND cdx_num >= ?3 AND cdx_num <= ?4
                 ORDER BY tld DESC, domain DESC LIMIT 1",
                params![crawl_id, domain, tld_lo, tld_hi],
                |row| row.get(0),
            )
            .optional()?;
        let Some(dom_lo) = dom_lo else {
            return Ok(Vec::new());
        };

        let dom_hi: Option<i64> = conn
            .query_row(
                "SELECT cdx_num FROM cdx_start_url
                 WHERE crawl_id = ?1 AND tld >= ?2 AND domain >= ?3
                   AND cdx_num >= ?4 AND cdx_num <= ?5
                 ORDER BY tld ASC, domain ASC LIMIT 1",
                params![crawl_id, tld, domain, tld_lo, tld_hi],
                |row| row.get(0),
            )
            .optional()?;
        let Some(dom_hi) = dom_hi else {
            return Ok(Vec::new());
        };

        let mut stmt = conn.prepare(
            "SELECT crawl_id, cdx_num, tld, domain, subdomain, path, timestamp, headers_blob, created_at
             FROM cdx_start_url
             WHERE crawl_id = ?1 AND cdx_num >= ?2 AND cdx_num <= ?3
             ORDER BY cdx_num ASC",
        )?;
        let mut rows = stmt
            .query_map(params![crawl_id, dom_lo, dom_hi], row_to_boundary)?
            .collect::<Result<Vec<_>, _>>()?;

        // The final row is the first row of the shard immediately after
        // the matching range, and is dropped -- unless the range
        // collapsed to a single shard, in which case that shard's first
        // row exactly equals the query key and is itself the answer.
        if rows.len() > 1 {
            rows.pop();
        }
        Ok(rows)
    }

    /// All boundary rows for a crawl, in shard order. Used by the
    /// `--dump-boundaries` debug aid, not by the narrowing query path.
    pub fn list_boundaries(&self, crawl_id: i64) -> Result<Vec<BoundaryRecord>, AppError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT crawl_id, cdx_num, tld, domain, subdomain, path, timestamp, headers_blob, created_at
             FROM cdx_start_url
             WHERE crawl_id = ?1
             ORDER BY cdx_num ASC",
        )?;
        let rows = stmt
            .query_map(params![crawl_id], row_to_boundary)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -- CaptureSink persistence -----------------------------------------

    pub fn warc_exists(&self, warc_url: &str) -> Result<bool, AppError> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM warc_record WHERE warc_url = ?1",
            params![warc_url],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Idempotent insert: a duplicate `warc_url` is silently ignored
    /// (benign per the store error taxonomy), never surfaced as an error.
    pub fn insert_warc_resource(
        &self,
        crawl_id: i64,
        page_url: &str,
        warc_url: &str,
        page_metadata: &str,
        page_length: i64,
        warc_length: i64,
    ) -> Result<bool, AppError> {
        let conn = self.conn.lock().unwrap();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO warc_record
             (crawl_id, page_url, warc_url, page_metadata, page_length, warc_length, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                crawl_id,
                page_url,
                warc_url,
                page_metadata,
                page_length,
                warc_length,
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(inserted > 0)
    }
}

fn row_to_crawl(row: &rusqlite::Row) -> rusqlite::Result<Crawl> {
    let created_at: String = row.get(3)?;
    Ok(Crawl {
        id: row.get(0)?,
        label: row.get(1)?,
        source_url: row.get(2)?,
        created_at: parse_rfc3339(&created_at),
    })
}

fn row_to_boundary(row: &rusqlite::Row) -> rusqlite::Result<BoundaryRecord> {
    let timestamp: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    Ok(BoundaryRecord {
        crawl_id: row.get(0)?,
        cdx_num: row.get(1)?,
        tld: row.get(2)?,
        domain: row.get(3)?,
        subdomain: row.get(4)?,
        path: row.get(5)?,
        timestamp: parse_rfc3339(&timestamp),
        headers_blob: row.get(7)?,
        created_at: parse_rfc3339(&created_at),
    })
}

fn parse_rfc3339(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc.timestamp_opt(0, 0).unwrap())
}

fn random_i64() -> i64 {
    rand::random::<i64>().abs()
}
