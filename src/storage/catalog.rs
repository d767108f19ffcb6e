//! Catalog access: books, categories and stored embeddings

use crate::embedding::keywords_or_empty;
use crate::error::{CheerError, Result};
use crate::models::{Item, NewItem};
use crate::storage::Database;
use ahash::AHashMap;
use chrono::Utc;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

/// SQLite's default bound-parameter limit is 999
const MAX_IDS_PER_QUERY: usize = 500;

const ITEM_COLUMNS: &str = "id, title, description, keywords, embedding";

/// Encode a vector as little-endian `f32` bytes
pub fn encode_vector(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Decode a stored vector; `None` when the blob is not a whole number of `f32`s
pub fn decode_vector(bytes: &[u8]) -> Option<Vec<f32>> {
    if bytes.is_empty() || bytes.len() % 4 != 0 {
        return None;
    }
    Some(
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect(),
    )
}

fn decode_stored_vector(item_id: i64, bytes: Option<Vec<u8>>) -> Option<Vec<f32>> {
    let bytes = bytes?;
    let vector = decode_vector(&bytes);
    if vector.is_none() {
        tracing::warn!(
            "Ignoring malformed embedding for item {} ({} bytes)",
            item_id,
            bytes.len()
        );
    }
    vector
}

fn item_from_row(row: &Row<'_>) -> rusqlite::Result<Item> {
    let id: i64 = row.get(0)?;
    let keywords: Option<String> = row.get(3)?;
    let embedding: Option<Vec<u8>> = row.get(4)?;

    Ok(Item {
        id,
        title: row.get(1)?,
        description: row.get(2)?,
        categories: Vec::new(),
        keywords: keywords_or_empty(id, keywords.as_deref()),
        embedding: decode_stored_vector(id, embedding),
    })
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

impl Database {
    /// Add a book with its categories, creating categories as needed
    pub fn insert_item(&self, item: &NewItem) -> Result<i64> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO items (id, title, description, keywords) VALUES (?1, ?2, ?3, ?4)",
            params![item.id, item.title, item.description, item.keywords],
        )?;
        let id = tx.last_insert_rowid();

        for name in &item.categories {
            let name = name.trim();
            if name.is_empty() {
                continue;
            }
            tx.execute(
                "INSERT OR IGNORE INTO categories (name) VALUES (?1)",
                params![name],
            )?;
            tx.execute(
                "INSERT OR IGNORE INTO item_categories (item_id, category_id)
                 SELECT ?1, id FROM categories WHERE name = ?2",
                params![id, name],
            )?;
        }

        tx.commit()?;
        Ok(id)
    }

    /// Remove a book from the catalog; other ids are untouched
    pub fn remove_item(&self, item_id: i64) -> Result<bool> {
        let conn = self.get_conn()?;
        let removed = conn.execute("DELETE FROM items WHERE id = ?1", params![item_id])?;
        Ok(removed > 0)
    }

    /// Whether a catalog item exists
    pub fn item_exists(&self, item_id: i64) -> Result<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row("SELECT 1 FROM items WHERE id = ?1", params![item_id], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Fetch one item with categories loaded
    pub fn get_item(&self, item_id: i64) -> Result<Option<Item>> {
        Ok(self.get_items(&[item_id])?.pop())
    }

    /// Fetch items by id with categories loaded
    ///
    /// Unknown ids are skipped; the result is in no particular order.
    pub fn get_items(&self, ids: &[i64]) -> Result<Vec<Item>> {
        let conn = self.get_conn()?;
        let mut items = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let sql = format!(
                "SELECT {} FROM items WHERE id IN ({})",
                ITEM_COLUMNS,
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), item_from_row)?;
            for row in rows {
                items.push(row?);
            }
        }

        load_categories(&conn, &mut items)?;
        Ok(items)
    }

    /// Up to `limit` catalog items in random order
    pub fn random_items(&self, limit: usize) -> Result<Vec<Item>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM items ORDER BY RANDOM() LIMIT ?1", ITEM_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let mut items = stmt
            .query_map(params![limit as i64], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        load_categories(&conn, &mut items)?;
        Ok(items)
    }

    /// Up to `limit` distinct items carrying any of `categories`, random order
    pub fn random_items_in_categories(
        &self,
        categories: &[String],
        limit: usize,
    ) -> Result<Vec<Item>> {
        if categories.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM items WHERE id IN (
                SELECT ic.item_id FROM item_categories ic
                JOIN categories c ON c.id = ic.category_id
                WHERE c.name IN ({})
             )
             ORDER BY RANDOM() LIMIT {}",
            ITEM_COLUMNS,
            placeholders(categories.len()),
            limit
        );
        let mut stmt = conn.prepare(&sql)?;
        let mut items = stmt
            .query_map(params_from_iter(categories.iter()), item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        load_categories(&conn, &mut items)?;
        Ok(items)
    }

    /// Items the batch job should embed: those without a vector, or all of them
    pub fn items_for_embedding(&self, regenerate: bool) -> Result<Vec<Item>> {
        let conn = self.get_conn()?;
        let filter = if regenerate {
            ""
        } else {
            "WHERE embedding IS NULL"
        };
        let sql = format!("SELECT {} FROM items {} ORDER BY id", ITEM_COLUMNS, filter);
        let mut stmt = conn.prepare(&sql)?;
        let mut items = stmt
            .query_map([], item_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        load_categories(&conn, &mut items)?;
        Ok(items)
    }

    /// Store a freshly computed vector for an item
    pub fn store_embedding(&self, item_id: i64, vector: &[f32], model: &str) -> Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE items SET embedding = ?1, embedding_model = ?2, embedded_at = ?3 WHERE id = ?4",
            params![encode_vector(vector), model, Utc::now(), item_id],
        )?;
        if updated == 0 {
            return Err(CheerError::ItemNotFound { id: item_id });
        }
        Ok(())
    }

    /// Every decodable stored vector, ordered by item id
    pub fn stored_embeddings(&self) -> Result<Vec<(i64, Vec<f32>)>> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT id, embedding FROM items WHERE embedding IS NOT NULL ORDER BY id")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
        })?;

        let mut vectors = Vec::new();
        for row in rows {
            let (id, bytes) = row?;
            if let Some(vector) = decode_stored_vector(id, Some(bytes)) {
                vectors.push((id, vector));
            }
        }
        Ok(vectors)
    }

    /// Decodable vectors for the given items, keyed by item id
    pub fn item_vectors(&self, ids: &[i64]) -> Result<AHashMap<i64, Vec<f32>>> {
        let conn = self.get_conn()?;
        let mut vectors = AHashMap::with_capacity(ids.len());

        for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
            let sql = format!(
                "SELECT id, embedding FROM items WHERE embedding IS NOT NULL AND id IN ({})",
                placeholders(chunk.len())
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            for row in rows {
                let (id, bytes) = row?;
                if let Some(vector) = decode_stored_vector(id, Some(bytes)) {
                    vectors.insert(id, vector);
                }
            }
        }

        Ok(vectors)
    }
}

/// Fill in sorted category names for each item
fn load_categories(conn: &Connection, items: &mut [Item]) -> Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let mut by_item: AHashMap<i64, Vec<String>> = AHashMap::new();
    let ids: Vec<i64> = items.iter().map(|item| item.id).collect();

    for chunk in ids.chunks(MAX_IDS_PER_QUERY) {
        let sql = format!(
            "SELECT ic.item_id, c.name FROM item_categories ic
             JOIN categories c ON c.id = ic.category_id
             WHERE ic.item_id IN ({})
             ORDER BY c.name",
            placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
            Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (item_id, name) = row?;
            by_item.entry(item_id).or_default().push(name);
        }
    }

    for item in items.iter_mut() {
        item.categories = by_item.remove(&item.id).unwrap_or_default();
    }
    Ok(())
}
