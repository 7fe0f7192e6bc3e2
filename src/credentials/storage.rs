//! SQLite-backed configuration store.
//!
//! Holds the single app credential, the current access token and media metadata.
//! Secret columns are sealed with AES-256-GCM when a master key is supplied.

use super::{encryption, AccessToken, Credential, CredentialStore, MediaRecord, MediaType};
use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Configuration storage backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE config (
///     id INTEGER PRIMARY KEY CHECK (id = 1),  -- single row
///     app_id TEXT NOT NULL,
///     app_secret TEXT NOT NULL,               -- Sealed when a key is configured
///     app_secret_nonce TEXT,
///     token TEXT,
///     token_nonce TEXT,
///     encoding_aes_key TEXT,
///     encoding_aes_key_nonce TEXT,
///     updated_at TEXT NOT NULL
/// );
/// CREATE TABLE access_tokens (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,   -- at most one row
///     value TEXT NOT NULL,
///     value_nonce TEXT,
///     issued_at TEXT NOT NULL,
///     ttl_seconds INTEGER NOT NULL,
///     expires_at TEXT NOT NULL
/// );
/// CREATE TABLE media (
///     media_id TEXT PRIMARY KEY,
///     media_type TEXT NOT NULL,
///     created_at TEXT NOT NULL,
///     url TEXT,
///     name TEXT,
///     permanent INTEGER NOT NULL
/// );
/// ```
///
/// # Thread Safety
/// - Connection is wrapped in a Mutex; multi-statement writes run in one transaction
pub struct ConfigStore {
    conn: Mutex<Connection>,
    encryption_key: Option<Vec<u8>>,
}

/// Raw credential columns before unsealing.
type CredentialRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
);

/// Raw token columns before unsealing.
type TokenRow = (String, Option<String>, String, i64, String);

impl ConfigStore {
    /// Creates or opens a configuration store.
    ///
    /// # Arguments
    /// * `db_path` - Path to the SQLite database file (`":memory:"` for tests)
    /// * `encryption_key` - Optional base64-encoded 32-byte master key
    ///
    /// # Returns
    /// * `Err` - If the database cannot be opened, the schema cannot be created or the key is invalid
    pub fn new<P: AsRef<Path>>(db_path: P, encryption_key: Option<&str>) -> Result<Self> {
        let encryption_key = encryption_key
            .map(encryption::validate_key)
            .transpose()
            .context("Invalid encryption key")?;

        let conn = Connection::open(db_path).context("Failed to open database")?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS config (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                app_id TEXT NOT NULL,
                app_secret TEXT NOT NULL,
                app_secret_nonce TEXT,
                token TEXT,
                token_nonce TEXT,
                encoding_aes_key TEXT,
                encoding_aes_key_nonce TEXT,
                updated_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS access_tokens (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                value TEXT NOT NULL,
                value_nonce TEXT,
                issued_at TEXT NOT NULL,
                ttl_seconds INTEGER NOT NULL,
                expires_at TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS media (
                media_id TEXT PRIMARY KEY,
                media_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                url TEXT,
                name TEXT,
                permanent INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_media_type ON media(media_type, permanent);
            "#,
        )
        .context("Failed to create schema")?;

        Ok(Self {
            conn: Mutex::new(conn),
            encryption_key,
        })
    }

    /// True when secret columns are sealed on write.
    pub fn is_encrypted(&self) -> bool {
        self.encryption_key.is_some()
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn seal(&self, value: &str) -> Result<(String, Option<String>)> {
        match &self.encryption_key {
            Some(key) => {
                let (ciphertext, nonce) = encryption::encrypt(value, key)?;
                Ok((ciphertext, Some(nonce)))
            }
            None => Ok((value.to_string(), None)),
        }
    }

    fn seal_optional(&self, value: Option<&str>) -> Result<(Option<String>, Option<String>)> {
        match value {
            Some(value) => {
                let (stored, nonce) = self.seal(value)?;
                Ok((Some(stored), nonce))
            }
            None => Ok((None, None)),
        }
    }

    fn open(&self, stored: String, nonce: Option<String>) -> Result<String> {
        match (nonce, &self.encryption_key) {
            (None, _) => Ok(stored),
            (Some(nonce), Some(key)) => encryption::decrypt(&stored, &nonce, key),
            (Some(_), None) => Err(anyhow!(
                "Value is encrypted but no encryption key is configured"
            )),
        }
    }

    fn open_optional(&self, stored: Option<String>, nonce: Option<String>) -> Result<Option<String>> {
        stored.map(|stored| self.open(stored, nonce)).transpose()
    }

    /// Reads the stored credential.
    ///
    /// # Returns
    /// * `Ok(None)` - No credential configured
    /// * `Err` - If the row cannot be read or unsealed
    pub fn get_credential(&self) -> Result<Option<Credential>> {
        let row: Option<CredentialRow> = self
            .conn()
            .query_row(
                r#"
                SELECT app_id, app_secret, app_secret_nonce,
                       token, token_nonce,
                       encoding_aes_key, encoding_aes_key_nonce
                FROM config WHERE id = 1
                "#,
                [],
                |row| {
                    Ok((
                        row.get(0)?,
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                        row.get(6)?,
                    ))
                },
            )
            .optional()
            .context("Failed to read credential")?;

        let Some((app_id, secret, secret_nonce, token, token_nonce, aes_key, aes_key_nonce)) = row
        else {
            return Ok(None);
        };

        Ok(Some(Credential {
            app_id,
            app_secret: self
                .open(secret, secret_nonce)
                .context("Failed to decrypt app secret")?,
            token: self
                .open_optional(token, token_nonce)
                .context("Failed to decrypt token")?,
            encoding_aes_key: self
                .open_optional(aes_key, aes_key_nonce)
                .context("Failed to decrypt encoding AES key")?,
        }))
    }

    /// Replaces the credential and deletes every token row in one transaction.
    pub fn set_credential(&self, credential: &Credential) -> Result<()> {
        let (secret, secret_nonce) = self
            .seal(&credential.app_secret)
            .context("Failed to encrypt app secret")?;
        let (token, token_nonce) = self
            .seal_optional(credential.token.as_deref())
            .context("Failed to encrypt token")?;
        let (aes_key, aes_key_nonce) = self
            .seal_optional(credential.encoding_aes_key.as_deref())
            .context("Failed to encrypt encoding AES key")?;
        let now = Utc::now().to_rfc3339();

        let mut conn = self.conn();
        let tx = conn.transaction().context("Failed to begin transaction")?;
        tx.execute(
            r#"
            INSERT INTO config (
                id, app_id, app_secret, app_secret_nonce,
                token, token_nonce, encoding_aes_key, encoding_aes_key_nonce, updated_at
            )
            VALUES (1, ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(id) DO UPDATE SET
                app_id = excluded.app_id,
                app_secret = excluded.app_secret,
                app_secret_nonce = excluded.app_secret_nonce,
                token = excluded.token,
                token_nonce = excluded.token_nonce,
                encoding_aes_key = excluded.encoding_aes_key,
                encoding_aes_key_nonce = excluded.encoding_aes_key_nonce,
                updated_at = excluded.updated_at
            "#,
            params![
                credential.app_id,
                secret,
                secret_nonce,
                token,
                token_nonce,
                aes_key,
                aes_key_nonce,
                now,
            ],
        )
        .context("Failed to store credential")?;
        tx.execute("DELETE FROM access_tokens", [])
            .context("Failed to delete access tokens")?;
        tx.commit().context("Failed to commit credential")?;

        Ok(())
    }

    /// Deletes the credential and every token row in one transaction.
    pub fn clear_credential(&self) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction().context("Failed to begin transaction")?;
        tx.execute("DELETE FROM config", [])
            .context("Failed to delete credential")?;
        tx.execute("DELETE FROM access_tokens", [])
            .context("Failed to delete access tokens")?;
        tx.commit().context("Failed to commit clear")?;
        Ok(())
    }

    /// Reads the most recently stored access token.
    pub fn get_token(&self) -> Result<Option<AccessToken>> {
        let row: Option<TokenRow> = self
            .conn()
            .query_row(
                r#"
                SELECT value, value_nonce, issued_at, ttl_seconds, expires_at
                FROM access_tokens ORDER BY id DESC LIMIT 1
                "#,
                [],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?)),
            )
            .optional()
            .context("Failed to read access token")?;

        let Some((value, value_nonce, issued_at, ttl_seconds, expires_at)) = row else {
            return Ok(None);
        };

        Ok(Some(AccessToken {
            value: self
                .open(value, value_nonce)
                .context("Failed to decrypt access token")?,
            issued_at: parse_timestamp(&issued_at).context("Failed to parse issued_at")?,
            ttl_seconds,
            expires_at: parse_timestamp(&expires_at).context("Failed to parse expires_at")?,
        }))
    }

    /// Replaces the stored token. The table never holds more than one row.
    pub fn set_token(&self, token: &AccessToken) -> Result<()> {
        let (value, value_nonce) = self
            .seal(&token.value)
            .context("Failed to encrypt access token")?;

        let mut conn = self.conn();
        let tx = conn.transaction().context("Failed to begin transaction")?;
        tx.execute("DELETE FROM access_tokens", [])
            .context("Failed to delete access tokens")?;
        tx.execute(
            r#"
            INSERT INTO access_tokens (value, value_nonce, issued_at, ttl_seconds, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
            params![
                value,
                value_nonce,
                token.issued_at.to_rfc3339(),
                token.ttl_seconds,
                token.expires_at.to_rfc3339(),
            ],
        )
        .context("Failed to store access token")?;
        tx.commit().context("Failed to commit access token")?;

        Ok(())
    }

    pub fn clear_token(&self) -> Result<()> {
        self.conn()
            .execute("DELETE FROM access_tokens", [])
            .context("Failed to delete access tokens")?;
        Ok(())
    }

    /// Number of token rows. Exposed for invariant checks in tests.
    pub fn token_row_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM access_tokens", [], |row| row.get(0))
            .context("Failed to count access tokens")?;
        Ok(count as usize)
    }

    /// Inserts or replaces a media record.
    pub fn save_media(&self, record: &MediaRecord) -> Result<()> {
        self.conn()
            .execute(
                r#"
                INSERT INTO media (media_id, media_type, created_at, url, name, permanent)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(media_id) DO UPDATE SET
                    media_type = excluded.media_type,
                    url = excluded.url,
                    name = excluded.name,
                    permanent = excluded.permanent
                "#,
                params![
                    record.media_id,
                    record.media_type.as_str(),
                    record.created_at.to_rfc3339(),
                    record.url,
                    record.name,
                    record.permanent,
                ],
            )
            .context("Failed to store media record")?;
        Ok(())
    }

    pub fn get_media(&self, media_id: &str) -> Result<Option<MediaRecord>> {
        let row = self
            .conn()
            .query_row(
                "SELECT media_id, media_type, created_at, url, name, permanent FROM media WHERE media_id = ?1",
                params![media_id],
                read_media_row,
            )
            .optional()
            .context("Failed to read media record")?;

        row.map(media_from_row).transpose()
    }

    /// Lists media records, newest first, optionally filtered by type and permanence.
    pub fn list_media(
        &self,
        media_type: Option<MediaType>,
        permanent: Option<bool>,
    ) -> Result<Vec<MediaRecord>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare(
                r#"
                SELECT media_id, media_type, created_at, url, name, permanent
                FROM media
                WHERE (?1 IS NULL OR media_type = ?1)
                  AND (?2 IS NULL OR permanent = ?2)
                ORDER BY created_at DESC
                "#,
            )
            .context("Failed to prepare query")?;

        let rows = stmt
            .query_map(
                params![media_type.map(|t| t.as_str()), permanent],
                read_media_row,
            )
            .context("Failed to execute query")?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read results")?;

        rows.into_iter().map(media_from_row).collect()
    }

    /// Deletes a media record.
    ///
    /// # Returns
    /// * `Ok(true)` - Record deleted
    /// * `Ok(false)` - No such record
    pub fn delete_media(&self, media_id: &str) -> Result<bool> {
        let rows_affected = self
            .conn()
            .execute("DELETE FROM media WHERE media_id = ?1", params![media_id])
            .context("Failed to delete media record")?;
        Ok(rows_affected > 0)
    }
}

impl CredentialStore for ConfigStore {
    fn get_credential(&self) -> Result<Option<Credential>> {
        ConfigStore::get_credential(self)
    }

    fn set_credential(&self, credential: &Credential) -> Result<()> {
        ConfigStore::set_credential(self, credential)
    }

    fn clear_credential(&self) -> Result<()> {
        ConfigStore::clear_credential(self)
    }

    fn get_token(&self) -> Result<Option<AccessToken>> {
        ConfigStore::get_token(self)
    }

    fn set_token(&self, token: &AccessToken) -> Result<()> {
        ConfigStore::set_token(self, token)
    }

    fn clear_token(&self) -> Result<()> {
        ConfigStore::clear_token(self)
    }
}

type MediaRow = (String, String, String, Option<String>, Option<String>, bool);

fn read_media_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MediaRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn media_from_row(row: MediaRow) -> Result<MediaRecord> {
    let (media_id, media_type, created_at, url, name, permanent) = row;
    Ok(MediaRecord {
        media_type: MediaType::parse(&media_type)
            .ok_or_else(|| anyhow!("Unknown media type in store: {}", media_type))?,
        created_at: parse_timestamp(&created_at).context("Failed to parse created_at")?,
        media_id,
        url,
        name,
        permanent,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(raw)?.with_timezone(&Utc))
}
