use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;

use super::{EmbedSnippet, NewSnippet, SnippetError, SnippetType};

pub const DEFAULT_THEME: &str = "light";

/// SQLite-backed lookup table from short embed id to stored credentials.
pub struct SnippetStore {
    conn: Connection,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS embed_snippets (
        id TEXT PRIMARY KEY,
        token TEXT NOT NULL,
        company_id TEXT,
        snippet_type TEXT NOT NULL DEFAULT 'contact',
        theme TEXT NOT NULL DEFAULT 'light',
        created_at TEXT NOT NULL,
        expires_at TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_embed_snippets_expires ON embed_snippets (expires_at);
";

impl SnippetStore {
    pub fn open(db_path: &Path) -> Result<Self, SnippetError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        Self::init(Connection::open(db_path)?)
    }

    pub fn open_in_memory() -> Result<Self, SnippetError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, SnippetError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    /// Store a snippet. `ttl` of `None` never expires.
    pub fn create(&self, new: &NewSnippet, ttl: Option<Duration>) -> Result<EmbedSnippet, SnippetError> {
        new.validate()?;

        let now = Utc::now();
        let expires_at = match ttl {
            Some(ttl) => Some(now.checked_add_signed(ttl).ok_or(SnippetError::TtlOutOfRange {
                max: super::MAX_TTL_DAYS,
            })?),
            None => None,
        };
        let snippet = EmbedSnippet {
            id: new_snippet_id(),
            token: new.token.trim().to_string(),
            company_id: new
                .company_id
                .as_deref()
                .map(str::trim)
                .filter(|c| !c.is_empty())
                .map(str::to_string),
            snippet_type: new.snippet_type,
            theme: new
                .theme
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_THEME)
                .to_string(),
            created_at: now,
            expires_at,
        };

        self.conn.execute(
            "INSERT INTO embed_snippets (id, token, company_id, snippet_type, theme, created_at, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                snippet.id,
                snippet.token,
                snippet.company_id,
                snippet.snippet_type.as_str(),
                snippet.theme,
                timestamp(snippet.created_at),
                snippet.expires_at.map(timestamp),
            ],
        )?;

        log::info!(
            "stored {} embed snippet {}",
            snippet.snippet_type.as_str(),
            snippet.id
        );
        Ok(snippet)
    }

    /// Unknown and expired ids both come back as `None`.
    pub fn get(&self, id: &str) -> Result<Option<EmbedSnippet>, SnippetError> {
        let snippet = self
            .conn
            .query_row(
                "SELECT id, token, company_id, snippet_type, theme, created_at, expires_at
                 FROM embed_snippets WHERE id = ?1",
                params![id],
                row_to_snippet,
            )
            .optional()?;

        Ok(snippet.filter(|s| !s.is_expired(Utc::now())))
    }

    pub fn delete(&self, id: &str) -> Result<bool, SnippetError> {
        let removed = self
            .conn
            .execute("DELETE FROM embed_snippets WHERE id = ?1", params![id])?;
        Ok(removed > 0)
    }

    /// Returns the number of rows removed.
    pub fn purge_expired(&self) -> Result<usize, SnippetError> {
        let removed = self.conn.execute(
            "DELETE FROM embed_snippets WHERE expires_at IS NOT NULL AND expires_at <= ?1",
            params![timestamp(Utc::now())],
        )?;
        if removed > 0 {
            log::info!("purged {} expired embed snippet(s)", removed);
        }
        Ok(removed)
    }
}

fn row_to_snippet(row: &Row<'_>) -> rusqlite::Result<EmbedSnippet> {
    let snippet_type: String = row.get(3)?;
    let created_at: String = row.get(5)?;
    let expires_at: Option<String> = row.get(6)?;

    Ok(EmbedSnippet {
        id: row.get(0)?,
        token: row.get(1)?,
        company_id: row.get(2)?,
        snippet_type: snippet_type.parse().unwrap_or(SnippetType::Contact),
        theme: row.get(4)?,
        created_at: parse_timestamp(&created_at).unwrap_or_else(Utc::now),
        // An unreadable expiry is treated as already expired.
        expires_at: expires_at.map(|at| parse_timestamp(&at).unwrap_or(DateTime::<Utc>::MIN_UTC)),
    })
}

// Fixed width so stored values compare correctly as text.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|at| at.with_timezone(&Utc))
}

/// 12 lowercase hex characters.
fn new_snippet_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
