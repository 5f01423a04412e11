use std::collections::HashMap;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use log::error;
use rusqlite::params;
use serde_json::Value;

use crate::db::Database;
use crate::store::DurableStore;

#[async_trait]
impl DurableStore for Database {
    async fn load(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let keys: Vec<String> = keys.iter().map(|key| key.to_string()).collect();
        self.execute(move |conn| {
            let mut stmt = conn.prepare("SELECT value FROM monitor_state WHERE key = ?1")?;
            let mut values = HashMap::new();

            for key in keys {
                let mut rows = stmt.query(params![key])?;
                if let Some(row) = rows.next()? {
                    let raw: String = row.get(0)?;
                    match serde_json::from_str(&raw) {
                        Ok(value) => {
                            values.insert(key, value);
                        }
                        Err(err) => error!("Discarding unreadable state for '{key}': {err}"),
                    }
                }
            }

            Ok(values)
        })
        .await
    }

    async fn save(&self, entries: Vec<(String, Value)>) -> Result<()> {
        self.execute(move |conn| {
            let now = Utc::now().to_rfc3339();
            let tx = conn
                .transaction()
                .context("failed to open state transaction")?;
            {
                let mut stmt = tx.prepare(
                    "INSERT INTO monitor_state (key, value, updated_at)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                )?;
                for (key, value) in &entries {
                    let raw = serde_json::to_string(value)?;
                    stmt.execute(params![key, raw, now])
                        .with_context(|| format!("failed to write state '{key}'"))?;
                }
            }
            tx.commit().context("failed to commit state")?;
            Ok(())
        })
        .await
    }
}
