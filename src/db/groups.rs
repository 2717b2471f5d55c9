//! Media groups.
//!
//! A group normally holds several related media (e.g. parts of a saga). A
//! media that has not been grouped yet gets a forced singleton group as a
//! placeholder; forced singletons are hidden from group listings. Group
//! names can be derived from two member titles by their longest common
//! prefix.

use sqlx::SqlitePool;
use tracing::warn;

use crate::error::{Error, Result};
use crate::query::{BindValue, Query, QueryParameters, SortingCriteria};

/// Minimum length for a derived common-prefix group name.
const COMMON_PATTERN_MIN_LENGTH: usize = 6;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct MediaGroupRecord {
    pub id_group: i64,
    pub name: String,
    pub nb_media: i64,
    pub nb_present_media: i64,
    pub duration: i64,
    pub creation_date: i64,
    pub last_modification_date: i64,
    pub user_interacted: bool,
    pub forced_singleton: bool,
}

pub(crate) fn schema() -> &'static [&'static str] {
    &[
        "CREATE TABLE IF NOT EXISTS MediaGroup(
            id_group INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT COLLATE NOCASE,
            nb_media INTEGER NOT NULL DEFAULT 0,
            nb_present_media INTEGER NOT NULL DEFAULT 0,
            duration INTEGER NOT NULL DEFAULT 0,
            creation_date INTEGER,
            last_modification_date INTEGER,
            user_interacted BOOLEAN NOT NULL DEFAULT 0,
            forced_singleton BOOLEAN NOT NULL DEFAULT 0
        )",
    ]
}

pub(crate) fn triggers() -> &'static [&'static str] {
    &[
        "CREATE TRIGGER IF NOT EXISTS group_media_attached
         AFTER UPDATE OF group_id ON Media
         WHEN new.group_id IS NOT NULL AND IFNULL(old.group_id, -1) != new.group_id
         BEGIN
            UPDATE MediaGroup SET
                nb_media = nb_media + 1,
                nb_present_media = nb_present_media + new.is_present,
                duration = duration + MAX(new.duration, 0),
                last_modification_date = strftime('%s', 'now')
            WHERE id_group = new.group_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS group_media_detached
         AFTER UPDATE OF group_id ON Media
         WHEN old.group_id IS NOT NULL AND IFNULL(new.group_id, -1) != old.group_id
         BEGIN
            UPDATE MediaGroup SET
                nb_media = nb_media - 1,
                nb_present_media = nb_present_media - old.is_present,
                duration = duration - MAX(old.duration, 0),
                last_modification_date = strftime('%s', 'now')
            WHERE id_group = old.group_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS group_media_deleted
         AFTER DELETE ON Media
         WHEN old.group_id IS NOT NULL
         BEGIN
            UPDATE MediaGroup SET
                nb_media = nb_media - 1,
                nb_present_media = nb_present_media - old.is_present,
                duration = duration - MAX(old.duration, 0),
                last_modification_date = strftime('%s', 'now')
            WHERE id_group = old.group_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS group_media_presence
         AFTER UPDATE OF is_present ON Media
         WHEN new.group_id IS NOT NULL AND old.is_present != new.is_present
         BEGIN
            UPDATE MediaGroup SET
                nb_present_media = nb_present_media + (new.is_present - old.is_present)
            WHERE id_group = new.group_id;
         END",
        "CREATE TRIGGER IF NOT EXISTS group_delete_empty
         AFTER UPDATE OF nb_media ON MediaGroup
         WHEN new.nb_media = 0
         BEGIN
            DELETE FROM MediaGroup WHERE id_group = new.id_group;
         END",
    ]
}

/// Derive a group name from two member titles: the longest common prefix of
/// the normalized titles, if it reaches the minimum length.
pub fn common_pattern(a: &str, b: &str) -> Option<String> {
    let a_norm = normalize_title(a);
    let b_norm = normalize_title(b);
    let prefix_len = a_norm
        .chars()
        .zip(b_norm.chars())
        .take_while(|(x, y)| x == y)
        .count();
    if prefix_len < COMMON_PATTERN_MIN_LENGTH {
        return None;
    }
    let pattern: String = a_norm.chars().take(prefix_len).collect();
    let trimmed = pattern.trim_end();
    if trimmed.len() < COMMON_PATTERN_MIN_LENGTH {
        return None;
    }
    Some(trimmed.to_string())
}

/// Lowercase and strip a leading "the " article.
fn normalize_title(title: &str) -> String {
    let lowered = title.to_lowercase();
    lowered
        .strip_prefix("the ")
        .map(|s| s.to_string())
        .unwrap_or(lowered)
}

pub struct MediaGroupRepository {
    pool: SqlitePool,
}

impl MediaGroupRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create(&self, name: &str, forced_singleton: bool) -> Result<MediaGroupRecord> {
        let now = chrono::Utc::now().timestamp();
        let res = sqlx::query(
            "INSERT INTO MediaGroup(name, creation_date, last_modification_date,
                                    forced_singleton)
             VALUES(?, ?, ?, ?)",
        )
        .bind(name)
        .bind(now)
        .bind(now)
        .bind(forced_singleton)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        self.by_id(res.last_insert_rowid())
            .await?
            .ok_or(Error::NotFound)
    }

    pub async fn by_id(&self, id: i64) -> Result<Option<MediaGroupRecord>> {
        sqlx::query_as("SELECT * FROM MediaGroup WHERE id_group = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn by_name(&self, name: &str) -> Result<Option<MediaGroupRecord>> {
        sqlx::query_as("SELECT * FROM MediaGroup WHERE name = ? AND forced_singleton = 0")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn rename(&self, id: i64, name: &str, user_initiated: bool) -> Result<()> {
        sqlx::query(
            "UPDATE MediaGroup SET name = ?, user_interacted = user_interacted OR ?
             WHERE id_group = ?",
        )
        .bind(name)
        .bind(user_initiated)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::from_sqlx)?;
        Ok(())
    }

    /// Turn a forced singleton into a real group, typically when a second
    /// media joins it.
    pub async fn clear_forced_singleton(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE MediaGroup SET forced_singleton = 0 WHERE id_group = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(())
    }

    pub async fn delete(&self, id: i64) -> Result<bool> {
        let res = sqlx::query("DELETE FROM MediaGroup WHERE id_group = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(Error::from_sqlx)?;
        Ok(res.rows_affected() > 0)
    }

    /// Real groups only; forced singletons are placeholders and stay
    /// hidden.
    pub fn listing(&self, params: &QueryParameters) -> Query<MediaGroupRecord> {
        let direction = if params.desc { "DESC" } else { "ASC" };
        let order_by = match params.sort {
            SortingCriteria::Duration => {
                format!("ORDER BY g.duration {direction}, g.id_group ASC")
            }
            SortingCriteria::InsertionDate => {
                format!("ORDER BY g.creation_date {direction}, g.id_group ASC")
            }
            SortingCriteria::LastModificationDate => {
                format!("ORDER BY g.last_modification_date {direction}, g.id_group ASC")
            }
            SortingCriteria::NbMedia => {
                format!("ORDER BY g.nb_media {direction}, g.id_group ASC")
            }
            SortingCriteria::Default | SortingCriteria::Alpha => {
                format!("ORDER BY g.name {direction}, g.id_group ASC")
            }
            other => {
                warn!(?other, "Unsupported group sort, falling back to Default");
                "ORDER BY g.name ASC, g.id_group ASC".to_string()
            }
        };
        let mut body = String::from("FROM MediaGroup g WHERE g.forced_singleton = 0");
        if !params.include_missing {
            body.push_str(" AND g.nb_present_media > 0");
        }
        Query::new(self.pool.clone(), "g.*", body, order_by, Vec::new())
    }

    pub fn search(&self, pattern: &str) -> Query<MediaGroupRecord> {
        Query::new(
            self.pool.clone(),
            "g.*",
            "FROM MediaGroup g WHERE g.forced_singleton = 0 AND g.name LIKE ?",
            "ORDER BY g.name ASC",
            vec![BindValue::Text(format!("%{pattern}%"))],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn common_pattern_basic() {
        assert_eq!(
            common_pattern("Harry Potter 1", "Harry Potter 2").as_deref(),
            Some("harry potter")
        );
        assert_eq!(common_pattern("abc", "abd"), None);
    }

    #[test]
    fn common_pattern_strips_article() {
        assert_eq!(
            common_pattern("The Matrix Reloaded", "Matrix Revolutions").as_deref(),
            Some("matrix re")
        );
    }

    #[test]
    fn common_pattern_requires_min_length() {
        assert_eq!(common_pattern("abcde1", "abcde2"), None);
        assert_eq!(common_pattern("abcdef1", "abcdef2").as_deref(), Some("abcdef"));
    }
}
