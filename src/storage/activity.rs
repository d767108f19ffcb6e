//! Reader activity: users, reading history and "not interested" feedback

use crate::error::{CheerError, Result};
use crate::models::{Interaction, UserProfile};
use crate::storage::Database;
use chrono::{NaiveDate, Utc};
use rusqlite::{params, params_from_iter, OptionalExtension};

fn parse_preferences(user_id: i64, raw: &str) -> Vec<String> {
    match serde_json::from_str::<Vec<String>>(raw) {
        Ok(categories) => categories,
        Err(e) => {
            tracing::warn!("Ignoring malformed preferences for user {}: {}", user_id, e);
            Vec::new()
        }
    }
}

fn encode_preferences(categories: &[String]) -> Result<String> {
    serde_json::to_string(categories).map_err(|e| CheerError::Json {
        source: e,
        context: "Failed to encode preferred categories".to_string(),
    })
}

impl Database {
    /// Register a reader with their ranked preferred categories
    pub fn create_user(&self, username: &str, preferred_categories: &[String]) -> Result<i64> {
        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO users (username, preferred_categories, created_at) VALUES (?1, ?2, ?3)",
            params![username, encode_preferences(preferred_categories)?, Utc::now()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Look up a reader
    pub fn get_user(&self, user_id: i64) -> Result<Option<UserProfile>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                "SELECT id, username, preferred_categories FROM users WHERE id = ?1",
                params![user_id],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(row.map(|(id, username, raw)| UserProfile {
            id,
            username,
            preferred_categories: parse_preferences(id, &raw),
        }))
    }

    /// Replace a reader's preferred categories
    pub fn set_preferred_categories(&self, user_id: i64, categories: &[String]) -> Result<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            "UPDATE users SET preferred_categories = ?1 WHERE id = ?2",
            params![encode_preferences(categories)?, user_id],
        )?;
        if updated == 0 {
            return Err(CheerError::UserNotFound { id: user_id });
        }
        Ok(())
    }

    /// Record that a reader read a book, replacing any earlier rating and date
    pub fn record_interaction(
        &self,
        user_id: i64,
        item_id: i64,
        rating: Option<i64>,
        read_date: NaiveDate,
    ) -> Result<()> {
        self.ensure_user_and_item(user_id, item_id)?;

        let conn = self.get_conn()?;
        conn.execute(
            "INSERT INTO interactions (user_id, item_id, rating, read_date, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT (user_id, item_id)
             DO UPDATE SET rating = excluded.rating, read_date = excluded.read_date",
            params![user_id, item_id, rating, read_date, Utc::now()],
        )?;
        Ok(())
    }

    /// Whether the reader has any reading history
    pub fn has_interactions(&self, user_id: i64) -> Result<bool> {
        let conn = self.get_conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM interactions WHERE user_id = ?1 LIMIT 1",
                params![user_id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// The reader's most recent interactions, newest read date first
    pub fn recent_interactions(&self, user_id: i64, limit: usize) -> Result<Vec<Interaction>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, item_id, rating, read_date, created_at FROM interactions
             WHERE user_id = ?1
             ORDER BY read_date DESC, created_at DESC, id DESC
             LIMIT ?2",
        )?;
        let interactions = stmt
            .query_map(params![user_id, limit as i64], |row| {
                Ok(Interaction {
                    user_id: row.get(0)?,
                    item_id: row.get(1)?,
                    rating: row.get(2)?,
                    read_date: row.get(3)?,
                    created_at: row.get(4)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(interactions)
    }

    /// Every item the reader has interacted with
    pub fn interacted_item_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.item_ids_for_user(
            "SELECT item_id FROM interactions WHERE user_id = ?1",
            user_id,
        )
    }

    /// Every item the reader marked as not interesting
    pub fn not_interested_item_ids(&self, user_id: i64) -> Result<Vec<i64>> {
        self.item_ids_for_user(
            "SELECT item_id FROM negative_feedback WHERE user_id = ?1 AND interested = 0",
            user_id,
        )
    }

    fn item_ids_for_user(&self, sql: &str, user_id: i64) -> Result<Vec<i64>> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(sql)?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<i64>>>()?;
        Ok(ids)
    }

    /// Whether the reader has read anything tagged with one of `categories`
    pub fn has_interacted_with_categories(
        &self,
        user_id: i64,
        categories: &[String],
    ) -> Result<bool> {
        if categories.is_empty() {
            return Ok(false);
        }

        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT 1 FROM interactions i
             JOIN item_categories ic ON ic.item_id = i.item_id
             JOIN categories c ON c.id = ic.category_id
             WHERE i.user_id = ? AND c.name IN ({})
             LIMIT 1",
            vec!["?"; categories.len()].join(", ")
        );

        let mut values: Vec<rusqlite::types::Value> = Vec::with_capacity(categories.len() + 1);
        values.push(user_id.into());
        values.extend(categories.iter().map(|c| c.clone().into()));

        let found = conn
            .query_row(&sql, params_from_iter(values), |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// Mark a book as not interesting to a reader
    ///
    /// Idempotent: returns `true` when the mark was created and `false` when
    /// it already existed. Reading history is left alone.
    pub fn record_feedback(&self, user_id: i64, item_id: i64) -> Result<bool> {
        self.ensure_user_and_item(user_id, item_id)?;

        let conn = self.get_conn()?;
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO negative_feedback (user_id, item_id, interested, created_at)
             VALUES (?1, ?2, 0, ?3)",
            params![user_id, item_id, Utc::now()],
        )?;

        if inserted > 0 {
            tracing::debug!("User {} marked item {} as not interested", user_id, item_id);
        }
        Ok(inserted > 0)
    }

    fn ensure_user_and_item(&self, user_id: i64, item_id: i64) -> Result<()> {
        if self.get_user(user_id)?.is_none() {
            return Err(CheerError::UserNotFound { id: user_id });
        }
        if !self.item_exists(item_id)? {
            return Err(CheerError::ItemNotFound { id: item_id });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewItem;
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database) {
        let temp = TempDir::new().unwrap();
        let db = Database::new(&temp.path().join("test.db")).unwrap();
        (temp, db)
    }

    fn book(db: &Database, title: &str, categories: &[&str]) -> i64 {
        db.insert_item(&NewItem {
            title: title.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        })
        .unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_user_preferences() {
        let (_temp, db) = setup();
        let id = db
            .create_user("reader", &["소설".to_string(), "시".to_string()])
            .unwrap();

        let user = db.get_user(id).unwrap().unwrap();
        assert_eq!(user.username, "reader");
        assert_eq!(user.preferred_categories, vec!["소설", "시"]);

        db.set_preferred_categories(id, &[]).unwrap();
        assert!(db.get_user(id).unwrap().unwrap().preferred_categories.is_empty());

        assert!(matches!(
            db.set_preferred_categories(id + 1, &[]),
            Err(CheerError::UserNotFound { .. })
        ));
    }

    #[test]
    fn test_recent_interactions_order_and_limit() {
        let (_temp, db) = setup();
        let user = db.create_user("reader", &[]).unwrap();
        let a = book(&db, "a", &[]);
        let b = book(&db, "b", &[]);
        let c = book(&db, "c", &[]);

        db.record_interaction(user, a, Some(5), date("2024-01-10")).unwrap();
        db.record_interaction(user, b, None, date("2024-03-01")).unwrap();
        db.record_interaction(user, c, Some(2), date("2023-12-31")).unwrap();

        let recent = db.recent_interactions(user, 2).unwrap();
        let ids: Vec<i64> = recent.iter().map(|i| i.item_id).collect();
        assert_eq!(ids, vec![b, a]);
        assert_eq!(recent[0].rating, None);

        // re-recording updates in place
        db.record_interaction(user, c, Some(4), date("2024-06-01")).unwrap();
        let recent = db.recent_interactions(user, 10).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].item_id, c);
        assert_eq!(recent[0].rating, Some(4));
    }

    #[test]
    fn test_feedback_is_idempotent() {
        let (_temp, db) = setup();
        let user = db.create_user("reader", &[]).unwrap();
        let item = book(&db, "a", &[]);
        db.record_interaction(user, item, Some(3), date("2024-01-01")).unwrap();

        assert!(db.record_feedback(user, item).unwrap());
        assert!(!db.record_feedback(user, item).unwrap());

        assert_eq!(db.not_interested_item_ids(user).unwrap(), vec![item]);
        assert_eq!(db.stats().unwrap().feedback_count, 1);
        // reading history untouched
        assert_eq!(db.interacted_item_ids(user).unwrap(), vec![item]);
    }

    #[test]
    fn test_feedback_requires_known_item_and_user() {
        let (_temp, db) = setup();
        let user = db.create_user("reader", &[]).unwrap();
        let item = book(&db, "a", &[]);

        assert!(matches!(
            db.record_feedback(user, item + 10),
            Err(CheerError::ItemNotFound { .. })
        ));
        assert!(matches!(
            db.record_feedback(user + 10, item),
            Err(CheerError::UserNotFound { .. })
        ));
    }

    #[test]
    fn test_category_affinity() {
        let (_temp, db) = setup();
        let user = db.create_user("reader", &[]).unwrap();
        let kids = book(&db, "kids", &["어린이", "그림책"]);
        let adult = book(&db, "adult", &["소설"]);
        let gate = vec!["아동".to_string(), "어린이".to_string()];

        db.record_interaction(user, adult, None, date("2024-01-01")).unwrap();
        assert!(!db.has_interacted_with_categories(user, &gate).unwrap());

        db.record_interaction(user, kids, None, date("2024-01-02")).unwrap();
        assert!(db.has_interacted_with_categories(user, &gate).unwrap());
        assert!(!db.has_interacted_with_categories(user, &[]).unwrap());
    }
}
