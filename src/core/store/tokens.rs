use anyhow::Result;
use rusqlite::params;
use sha2::{Digest, Sha256};

use super::Store;
use super::types::ApiTokenRecord;

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_raw_token() -> String {
    let bytes: [u8; 16] = rand::random();
    format!("dsk_{}", hex::encode(bytes))
}

impl Store {
    /// Mint a token for `owner_id`. The raw token is returned once and only
    /// its SHA-256 hash is persisted.
    pub async fn create_api_token(
        &self,
        owner_id: &str,
        name: &str,
    ) -> Result<(String, ApiTokenRecord)> {
        let raw_token = generate_raw_token();
        let token_hash = hash_token(&raw_token);
        let id = uuid::Uuid::new_v4().to_string();

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO api_tokens (id, owner_id, name, token_hash) VALUES (?1, ?2, ?3, ?4)",
            params![id, owner_id, name, token_hash],
        )?;

        let created_at = db.query_row(
            "SELECT created_at FROM api_tokens WHERE id = ?1",
            params![id],
            |row| row.get::<_, String>(0),
        )?;

        Ok((
            raw_token,
            ApiTokenRecord {
                id,
                owner_id: owner_id.to_string(),
                name: name.to_string(),
                created_at,
            },
        ))
    }

    /// Resolve a presented token to its owner, or None if unknown.
    pub async fn resolve_api_token(&self, raw_token: &str) -> Result<Option<String>> {
        let token_hash = hash_token(raw_token);
        let db = self.db.lock().await;
        let mut stmt = db.prepare("SELECT owner_id FROM api_tokens WHERE token_hash = ?1")?;
        let mut rows = stmt.query_map(params![token_hash], |row| row.get::<_, String>(0))?;
        match rows.next() {
            Some(owner) => Ok(Some(owner?)),
            None => Ok(None),
        }
    }

    pub async fn list_api_tokens(&self, owner_id: &str) -> Result<Vec<ApiTokenRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT id, owner_id, name, created_at FROM api_tokens
             WHERE owner_id = ?1 ORDER BY created_at DESC",
        )?;
        let rows = stmt.query_map(params![owner_id], |row| {
            Ok(ApiTokenRecord {
                id: row.get(0)?,
                owner_id: row.get(1)?,
                name: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        let mut tokens = Vec::new();
        for row in rows {
            tokens.push(row?);
        }
        Ok(tokens)
    }

    pub async fn delete_api_token(&self, owner_id: &str, id: &str) -> Result<bool> {
        let db = self.db.lock().await;
        let rows = db.execute(
            "DELETE FROM api_tokens WHERE id = ?1 AND owner_id = ?2",
            params![id, owner_id],
        )?;
        Ok(rows > 0)
    }

    pub async fn has_any_api_tokens(&self) -> Result<bool> {
        let db = self.db.lock().await;
        let count: i64 = db.query_row("SELECT COUNT(*) FROM api_tokens", [], |row| row.get(0))?;
        Ok(count > 0)
    }
}
