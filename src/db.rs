//! Job Store (C2): embedded SQLite-backed durable store for jobs,
//! job details, scorer results, vector documents, and the résumé
//! registry used by the monitor's auto-repair path.
//!
//! Schema and migration mechanics follow this codebase's own
//! `migrations`-table-plus-numbered-function pattern: idempotent
//! `migration_NNN_*` functions, tracked by name, applied once.

use crate::errors::DatabaseError;
use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

pub fn get_app_data_dir(base: Option<&Path>) -> PathBuf {
    let dir = base
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("data"));
    std::fs::create_dir_all(&dir).ok();
    dir
}

pub fn get_db_path(base: Option<&Path>) -> PathBuf {
    get_app_data_dir(base).join("jobs.db")
}

#[derive(Debug, Clone)]
pub struct Job {
    pub job_id: String,
    pub title: String,
    pub company: String,
    pub url: String,
    pub job_fingerprint: Option<String>,
    pub application_status: String,
    pub match_score: Option<f64>,
    pub website: String,
    pub created_at: String,
    pub submitted_at: Option<String>,
    pub is_deleted: bool,
    pub rag_processed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct JobDetail {
    pub job_id: String,
    pub salary: String,
    pub location: String,
    pub experience: String,
    pub education: String,
    pub description: String,
    pub requirements: String,
    pub benefits: String,
    pub publish_time: String,
    pub company_scale: String,
    pub industry: String,
    pub keyword: String,
    pub extracted_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilters {
    pub website: Option<String>,
    pub company: Option<String>,
    pub application_status: Option<String>,
    pub include_deleted: bool,
}

#[derive(Debug, Clone, Default)]
pub struct DeduplicationStats {
    pub total_jobs: i64,
    pub unique_fingerprints: i64,
    pub duplicate_count: i64,
    pub rate: f64,
}

/// Shared, mutex-guarded connection handle. SQLite has no true concurrent
/// writers regardless of the host language's concurrency model, so every
/// mutation and read goes through this single guarded handle.
#[derive(Clone)]
pub struct JobStore {
    conn: Arc<Mutex<Connection>>,
}

impl JobStore {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path).map_err(DatabaseError::from)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_database()?;
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, DatabaseError> {
        let conn = Connection::open_in_memory().map_err(DatabaseError::from)?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_database()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Exposes the same guarded connection handle this store writes
    /// through, so the vector store (C8) can share the one SQLite file
    /// instead of opening a second connection to it.
    pub fn shared_conn(&self) -> Arc<Mutex<Connection>> {
        self.conn.clone()
    }

    fn init_database(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "CREATE TABLE IF NOT EXISTS migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL
            )",
            [],
        )
        .map_err(DatabaseError::from)?;
        run_migrations(&conn)?;
        Ok(())
    }

    // ---- C2 operations ----

    /// Insert-or-replace by `job_id`; rejects a fingerprint already
    /// attached to a different, non-deleted job — a duplicate insert is
    /// the expected no-op, not an error.
    pub fn save_job(&self, job: &Job) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        if let Some(fp) = &job.job_fingerprint {
            let existing: Option<String> = conn
                .query_row(
                    "SELECT job_id FROM jobs WHERE job_fingerprint = ?1 AND is_deleted = 0",
                    params![fp],
                    |row| row.get(0),
                )
                .optional()
                .map_err(DatabaseError::from)?;
            if let Some(existing_id) = existing {
                if existing_id != job.job_id {
                    log::info!("skip duplicate fingerprint {} (kept {})", fp, existing_id);
                    return Ok(false);
                }
            }
        }
        conn.execute(
            "INSERT INTO jobs (
                job_id, title, company, url, job_fingerprint, application_status,
                match_score, website, created_at, submitted_at, is_deleted, rag_processed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            ON CONFLICT(job_id) DO UPDATE SET
                title = excluded.title,
                company = excluded.company,
                url = excluded.url,
                job_fingerprint = excluded.job_fingerprint,
                application_status = excluded.application_status,
                match_score = excluded.match_score,
                website = excluded.website,
                submitted_at = excluded.submitted_at,
                is_deleted = excluded.is_deleted,
                rag_processed = excluded.rag_processed",
            params![
                job.job_id,
                job.title,
                job.company,
                job.url,
                job.job_fingerprint,
                job.application_status,
                job.match_score,
                job.website,
                job.created_at,
                job.submitted_at,
                job.is_deleted as i64,
                job.rag_processed as i64,
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(true)
    }

    pub fn fingerprint_exists(&self, fingerprint: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM jobs WHERE job_fingerprint = ?1 AND is_deleted = 0",
                params![fingerprint],
                |row| row.get(0),
            )
            .map_err(DatabaseError::from)?;
        Ok(count > 0)
    }

    pub fn batch_check_fingerprints(
        &self,
        fingerprints: &[String],
    ) -> Result<HashMap<String, bool>, DatabaseError> {
        let mut result = HashMap::with_capacity(fingerprints.len());
        for fp in fingerprints {
            result.insert(fp.clone(), self.fingerprint_exists(fp)?);
        }
        Ok(result)
    }

    /// Upsert into `job_details` keyed by `job_id`; never creates a
    /// second row for the same job on re-harvest.
    pub fn save_job_detail(&self, detail: &JobDetail, url: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO job_details (
                job_id, salary, location, experience, education, description,
                requirements, benefits, publish_time, company_scale, industry,
                keyword, extracted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT(job_id) DO UPDATE SET
                salary = excluded.salary,
                location = excluded.location,
                experience = excluded.experience,
                education = excluded.education,
                description = excluded.description,
                requirements = excluded.requirements,
                benefits = excluded.benefits,
                publish_time = excluded.publish_time,
                company_scale = excluded.company_scale,
                industry = excluded.industry,
                keyword = excluded.keyword,
                extracted_at = excluded.extracted_at",
            params![
                detail.job_id,
                detail.salary,
                detail.location,
                detail.experience,
                detail.education,
                detail.description,
                detail.requirements,
                detail.benefits,
                detail.publish_time,
                detail.company_scale,
                detail.industry,
                detail.keyword,
                detail.extracted_at,
            ],
        )
        .map_err(DatabaseError::from)?;
        if !url.is_empty() {
            conn.execute(
                "UPDATE jobs SET url = ?1 WHERE job_id = ?2 AND (url IS NULL OR url = '')",
                params![url, detail.job_id],
            )
            .map_err(DatabaseError::from)?;
        }
        Ok(true)
    }

    /// Single `job_details` row by job id, used by the matcher (C12) to
    /// build scoring metadata and by monitor auto-repair.
    pub fn get_job_detail(&self, job_id: &str) -> Result<Option<JobDetail>, DatabaseError> {
        let conn = self.conn();
        let result = conn.query_row(
            "SELECT job_id, salary, location, experience, education, description,
                    requirements, benefits, publish_time, company_scale, industry,
                    keyword, extracted_at
             FROM job_details WHERE job_id = ?1",
            params![job_id],
            |row| {
                Ok(JobDetail {
                    job_id: row.get(0)?,
                    salary: row.get(1)?,
                    location: row.get(2)?,
                    experience: row.get(3)?,
                    education: row.get(4)?,
                    description: row.get(5)?,
                    requirements: row.get(6)?,
                    benefits: row.get(7)?,
                    publish_time: row.get(8)?,
                    company_scale: row.get(9)?,
                    industry: row.get(10)?,
                    keyword: row.get(11)?,
                    extracted_at: row.get(12)?,
                })
            },
        );
        match result {
            Ok(detail) => Ok(Some(detail)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(DatabaseError::from(e)),
        }
    }

    /// Best-effort back-fill of `url` on the most recent matching
    /// empty-URL job row.
    pub fn update_job_with_detail_url(
        &self,
        title: &str,
        company: &str,
        detail_url: &str,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE jobs SET url = ?1 WHERE job_id = (
                    SELECT job_id FROM jobs
                    WHERE title = ?2 AND company = ?3 AND (url IS NULL OR url = '')
                    ORDER BY created_at DESC LIMIT 1
                )",
                params![detail_url, title, company],
            )
            .map_err(DatabaseError::from)?;
        Ok(updated > 0)
    }

    pub fn query_jobs(&self, filters: &JobFilters, limit: i64) -> Result<Vec<Job>, DatabaseError> {
        let conn = self.conn();
        let mut sql = String::from(
            "SELECT job_id, title, company, url, job_fingerprint, application_status,
                    match_score, website, created_at, submitted_at, is_deleted, rag_processed
             FROM jobs WHERE 1=1",
        );
        let mut args: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();
        if !filters.include_deleted {
            sql.push_str(" AND is_deleted = 0");
        }
        if let Some(website) = &filters.website {
            sql.push_str(" AND website = ?");
            args.push(Box::new(website.clone()));
        }
        if let Some(company) = &filters.company {
            sql.push_str(" AND company = ?");
            args.push(Box::new(company.clone()));
        }
        if let Some(status) = &filters.application_status {
            sql.push_str(" AND application_status = ?");
            args.push(Box::new(status.clone()));
        }
        sql.push_str(" ORDER BY created_at DESC LIMIT ?");
        args.push(Box::new(limit));

        let mut stmt = conn.prepare(&sql).map_err(DatabaseError::from)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = args.iter().map(|b| b.as_ref()).collect();
        let rows = stmt
            .query_map(param_refs.as_slice(), row_to_job)
            .map_err(DatabaseError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(DatabaseError::from)?);
        }
        Ok(out)
    }

    /// Administrative reset used by the CLI's `clear --what jobs` path.
    /// Wipes jobs, job details, and resume matches; leaves the session
    /// and vector stores untouched.
    pub fn clear_jobs(&self) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute_batch(
            "DELETE FROM resume_matches; DELETE FROM job_details; DELETE FROM jobs;",
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub fn get_deduplication_stats(&self) -> Result<DeduplicationStats, DatabaseError> {
        let conn = self.conn();
        let total_jobs: i64 = conn
            .query_row("SELECT COUNT(*) FROM jobs WHERE is_deleted = 0", [], |r| {
                r.get(0)
            })
            .map_err(DatabaseError::from)?;
        let unique_fingerprints: i64 = conn
            .query_row(
                "SELECT COUNT(DISTINCT job_fingerprint) FROM jobs
                 WHERE is_deleted = 0 AND job_fingerprint IS NOT NULL",
                [],
                |r| r.get(0),
            )
            .map_err(DatabaseError::from)?;
        let duplicate_count = (total_jobs - unique_fingerprints).max(0);
        let rate = if total_jobs > 0 {
            duplicate_count as f64 / total_jobs as f64
        } else {
            0.0
        };
        Ok(DeduplicationStats {
            total_jobs,
            unique_fingerprints,
            duplicate_count,
            rate,
        })
    }

    pub fn update_job_status(
        &self,
        job_id: &str,
        status: &str,
        submitted_at: Option<&str>,
    ) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let updated = conn
            .execute(
                "UPDATE jobs SET application_status = ?1, submitted_at = ?2 WHERE job_id = ?3",
                params![status, submitted_at, job_id],
            )
            .map_err(DatabaseError::from)?;
        Ok(updated > 0)
    }

    pub fn mark_rag_processed(&self, job_id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE jobs SET rag_processed = 1 WHERE job_id = ?1",
            params![job_id],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub fn soft_delete(&self, job_id: &str) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "UPDATE jobs SET is_deleted = 1 WHERE job_id = ?1",
            params![job_id],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub fn is_deleted(&self, job_id: &str) -> Result<bool, DatabaseError> {
        let conn = self.conn();
        let deleted: Option<i64> = conn
            .query_row(
                "SELECT is_deleted FROM jobs WHERE job_id = ?1",
                params![job_id],
                |r| r.get(0),
            )
            .optional()
            .map_err(DatabaseError::from)?;
        Ok(deleted.map(|d| d != 0).unwrap_or(false))
    }

    /// Jobs that have been embedded (`rag_processed`) but carry no
    /// `resume_matches` row yet, for C13's auto-repair path.
    pub fn jobs_missing_matches(&self, limit: i64) -> Result<Vec<String>, DatabaseError> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                "SELECT j.job_id FROM jobs j
                 LEFT JOIN resume_matches m ON m.job_id = j.job_id
                 WHERE j.rag_processed = 1 AND j.is_deleted = 0 AND m.job_id IS NULL
                 LIMIT ?1",
            )
            .map_err(DatabaseError::from)?;
        let rows = stmt
            .query_map(params![limit], |row| row.get::<_, String>(0))
            .map_err(DatabaseError::from)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(DatabaseError::from)?);
        }
        Ok(out)
    }

    /// Upsert by `(job_id, resume_profile_id)`.
    #[allow(clippy::too_many_arguments)]
    pub fn save_resume_match(
        &self,
        job_id: &str,
        resume_profile_id: &str,
        overall: f64,
        dimension_scores: [f64; 5],
        priority_level: &str,
        match_details_json: &str,
        match_reasons: &str,
        created_at: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO resume_matches (
                job_id, resume_profile_id, match_score,
                semantic_score, skills_score, experience_score, industry_score, salary_score,
                priority_level, match_details, match_reasons, created_at, processed
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, 1)
            ON CONFLICT(job_id, resume_profile_id) DO UPDATE SET
                match_score = excluded.match_score,
                semantic_score = excluded.semantic_score,
                skills_score = excluded.skills_score,
                experience_score = excluded.experience_score,
                industry_score = excluded.industry_score,
                salary_score = excluded.salary_score,
                priority_level = excluded.priority_level,
                match_details = excluded.match_details,
                match_reasons = excluded.match_reasons,
                processed = 1",
            params![
                job_id,
                resume_profile_id,
                overall,
                dimension_scores[0],
                dimension_scores[1],
                dimension_scores[2],
                dimension_scores[3],
                dimension_scores[4],
                priority_level,
                match_details_json,
                match_reasons,
                created_at,
            ],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub fn match_rate_stats(&self) -> Result<(i64, i64, f64, f64, i64), DatabaseError> {
        let conn = self.conn();
        let total_jobs: i64 = conn
            .query_row("SELECT COUNT(*) FROM jobs WHERE is_deleted = 0", [], |r| {
                r.get(0)
            })
            .map_err(DatabaseError::from)?;
        let total_matches: i64 = conn
            .query_row("SELECT COUNT(*) FROM resume_matches", [], |r| r.get(0))
            .map_err(DatabaseError::from)?;
        let avg_score: Option<f64> = conn
            .query_row("SELECT AVG(match_score) FROM resume_matches", [], |r| {
                r.get(0)
            })
            .map_err(DatabaseError::from)?;
        let high_quality: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM resume_matches WHERE match_score >= 0.7",
                [],
                |r| r.get(0),
            )
            .map_err(DatabaseError::from)?;
        let match_rate = if total_jobs > 0 {
            total_matches as f64 / total_jobs as f64
        } else {
            0.0
        };
        Ok((
            total_jobs,
            total_matches,
            match_rate,
            avg_score.unwrap_or(0.0),
            high_quality,
        ))
    }

    /// Résumé registry for C13's auto-repair path (Open Question decision).
    pub fn save_resume_profile(
        &self,
        resume_profile_id: &str,
        profile_json: &str,
        updated_at: &str,
    ) -> Result<(), DatabaseError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO resume_profiles (resume_profile_id, profile_json, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(resume_profile_id) DO UPDATE SET
                profile_json = excluded.profile_json, updated_at = excluded.updated_at",
            params![resume_profile_id, profile_json, updated_at],
        )
        .map_err(DatabaseError::from)?;
        Ok(())
    }

    pub fn latest_resume_profile(&self) -> Result<Option<(String, String)>, DatabaseError> {
        let conn = self.conn();
        conn.query_row(
            "SELECT resume_profile_id, profile_json FROM resume_profiles
             ORDER BY updated_at DESC LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(DatabaseError::from)
    }
}

fn row_to_job(row: &rusqlite::Row) -> SqlResult<Job> {
    Ok(Job {
        job_id: row.get(0)?,
        title: row.get(1)?,
        company: row.get(2)?,
        url: row.get(3)?,
        job_fingerprint: row.get(4)?,
        application_status: row.get(5)?,
        match_score: row.get(6)?,
        website: row.get(7)?,
        created_at: row.get(8)?,
        submitted_at: row.get(9)?,
        is_deleted: row.get::<_, i64>(10)? != 0,
        rag_processed: row.get::<_, i64>(11)? != 0,
    })
}

fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    run_one(conn, "001_initial_schema", migration_001_initial_schema)?;
    run_one(conn, "002_vector_documents", migration_002_vector_documents)?;
    run_one(conn, "003_resume_profiles", migration_003_resume_profiles)?;
    Ok(())
}

fn run_one(
    conn: &Connection,
    name: &str,
    f: impl FnOnce(&Connection) -> SqlResult<()>,
) -> Result<(), DatabaseError> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM migrations WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .map_err(DatabaseError::from)?;
    if count == 0 {
        log::info!("running migration: {}", name);
        f(conn).map_err(DatabaseError::from)?;
        conn.execute(
            "INSERT INTO migrations (name, applied_at) VALUES (?1, datetime('now'))",
            params![name],
        )
        .map_err(DatabaseError::from)?;
    }
    Ok(())
}

fn migration_001_initial_schema(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS jobs (
            job_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            company TEXT NOT NULL,
            url TEXT NOT NULL DEFAULT '',
            job_fingerprint TEXT,
            application_status TEXT NOT NULL DEFAULT 'pending',
            match_score REAL,
            website TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            submitted_at TEXT,
            is_deleted INTEGER NOT NULL DEFAULT 0,
            rag_processed INTEGER NOT NULL DEFAULT 0
        )",
        [],
    )?;
    conn.execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_jobs_fingerprint ON jobs (job_fingerprint)
         WHERE job_fingerprint IS NOT NULL AND is_deleted = 0",
        [],
    )?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_jobs_company ON jobs (company)", [])?;
    conn.execute("CREATE INDEX IF NOT EXISTS idx_jobs_website ON jobs (website)", [])?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_jobs_created_at ON jobs (created_at DESC)",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS job_details (
            job_id TEXT PRIMARY KEY REFERENCES jobs(job_id),
            salary TEXT NOT NULL DEFAULT '',
            location TEXT NOT NULL DEFAULT '',
            experience TEXT NOT NULL DEFAULT '',
            education TEXT NOT NULL DEFAULT '',
            description TEXT NOT NULL DEFAULT '',
            requirements TEXT NOT NULL DEFAULT '',
            benefits TEXT NOT NULL DEFAULT '',
            publish_time TEXT NOT NULL DEFAULT '',
            company_scale TEXT NOT NULL DEFAULT '',
            industry TEXT NOT NULL DEFAULT '',
            keyword TEXT NOT NULL DEFAULT '',
            extracted_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS resume_matches (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            job_id TEXT NOT NULL,
            resume_profile_id TEXT NOT NULL,
            match_score REAL NOT NULL,
            semantic_score REAL NOT NULL,
            skills_score REAL NOT NULL,
            experience_score REAL NOT NULL,
            industry_score REAL NOT NULL,
            salary_score REAL NOT NULL,
            priority_level TEXT NOT NULL,
            match_details TEXT NOT NULL,
            match_reasons TEXT NOT NULL,
            created_at TEXT NOT NULL,
            processed INTEGER NOT NULL DEFAULT 0,
            UNIQUE(job_id, resume_profile_id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_resume_matches_job_id ON resume_matches (job_id)",
        [],
    )?;

    Ok(())
}

fn migration_002_vector_documents(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS vector_documents (
            doc_id TEXT PRIMARY KEY,
            job_id TEXT NOT NULL,
            document_type TEXT NOT NULL,
            page_content TEXT NOT NULL,
            metadata TEXT NOT NULL,
            embedding BLOB NOT NULL,
            created_at TEXT NOT NULL
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vector_documents_job_type
         ON vector_documents (job_id, document_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_vector_documents_created_at
         ON vector_documents (created_at)",
        [],
    )?;
    Ok(())
}

fn migration_003_resume_profiles(conn: &Connection) -> SqlResult<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS resume_profiles (
            resume_profile_id TEXT PRIMARY KEY,
            profile_json TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )",
        [],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_job(id: &str, fp: &str) -> Job {
        Job {
            job_id: id.to_string(),
            title: "Engineer".into(),
            company: "ACME".into(),
            url: String::new(),
            job_fingerprint: Some(fp.to_string()),
            application_status: "pending".into(),
            match_score: None,
            website: "example".into(),
            created_at: "2026-01-01T00:00:00Z".into(),
            submitted_at: None,
            is_deleted: false,
            rag_processed: false,
        }
    }

    /// S2: second insert with the same fingerprint is a no-op, not a
    /// second row (invariant 2).
    #[test]
    fn s2_duplicate_fingerprint_does_not_increase_row_count() {
        let store = JobStore::open_in_memory().unwrap();
        assert!(store.save_job(&sample_job("A", "fp1")).unwrap());
        let inserted_again = store.save_job(&sample_job("B", "fp1")).unwrap();
        assert!(!inserted_again);

        let stats = store.get_deduplication_stats().unwrap();
        assert_eq!(stats.total_jobs, 1);
    }

    #[test]
    fn save_job_idempotent_on_same_job_id() {
        let store = JobStore::open_in_memory().unwrap();
        store.save_job(&sample_job("A", "fp1")).unwrap();
        store.save_job(&sample_job("A", "fp1")).unwrap();
        let stats = store.get_deduplication_stats().unwrap();
        assert_eq!(stats.total_jobs, 1);
    }

    #[test]
    fn save_job_detail_upserts_without_duplicate_rows() {
        let store = JobStore::open_in_memory().unwrap();
        store.save_job(&sample_job("A", "fp1")).unwrap();
        let mut detail = JobDetail {
            job_id: "A".into(),
            extracted_at: "2026-01-01T00:00:00Z".into(),
            ..Default::default()
        };
        store.save_job_detail(&detail, "https://example.com/a").unwrap();
        detail.description = "updated".into();
        store.save_job_detail(&detail, "").unwrap();

        let conn = store.conn();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM job_details WHERE job_id = 'A'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn get_job_detail_roundtrips_saved_row() {
        let store = JobStore::open_in_memory().unwrap();
        store.save_job(&sample_job("A", "fp1")).unwrap();
        assert!(store.get_job_detail("A").unwrap().is_none());

        let detail = JobDetail {
            job_id: "A".into(),
            salary: "20k-40k".into(),
            industry: "technology".into(),
            description: "looking for a rust engineer".into(),
            extracted_at: "2026-01-01T00:00:00Z".into(),
            ..Default::default()
        };
        store.save_job_detail(&detail, "").unwrap();

        let fetched = store.get_job_detail("A").unwrap().unwrap();
        assert_eq!(fetched.salary, "20k-40k");
        assert_eq!(fetched.industry, "technology");
        assert_eq!(fetched.description, "looking for a rust engineer");
    }

    #[test]
    fn reinsert_after_soft_delete_reuses_fingerprint_without_constraint_error() {
        let store = JobStore::open_in_memory().unwrap();
        store.save_job(&sample_job("A", "fp1")).unwrap();
        store.soft_delete("A").unwrap();

        let result = store.save_job(&sample_job("B", "fp1"));
        assert_eq!(result.unwrap(), true);
        assert!(!store.is_deleted("B").unwrap());
    }

    #[test]
    fn fingerprint_exists_reflects_store_state() {
        let store = JobStore::open_in_memory().unwrap();
        assert!(!store.fingerprint_exists("fp1").unwrap());
        store.save_job(&sample_job("A", "fp1")).unwrap();
        assert!(store.fingerprint_exists("fp1").unwrap());
    }

    #[test]
    fn query_jobs_orders_by_created_at_desc() {
        let store = JobStore::open_in_memory().unwrap();
        let mut a = sample_job("A", "fp1");
        a.created_at = "2026-01-01T00:00:00Z".into();
        let mut b = sample_job("B", "fp2");
        b.created_at = "2026-01-02T00:00:00Z".into();
        store.save_job(&a).unwrap();
        store.save_job(&b).unwrap();

        let rows = store.query_jobs(&JobFilters::default(), 10).unwrap();
        assert_eq!(rows[0].job_id, "B");
        assert_eq!(rows[1].job_id, "A");
    }
}
