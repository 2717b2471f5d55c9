//! Paginated query surface.
//!
//! Every collection-returning method of the library hands back a [`Query`]
//! built from SQL fragments and bind values. `count()`, `all()` and
//! `items(limit, offset)` execute lazily so callers only pay for the page
//! they request. [`QueryParameters`] drives ordering and missing-device
//! filtering; entities degrade unsupported sorts to their natural default
//! with a warning.

use std::marker::PhantomData;

use sqlx::sqlite::SqliteRow;
use sqlx::SqlitePool;

use crate::error::{Error, Result};

/// Sorting criteria understood by at least one entity. Each entity documents
/// the subset it supports; anything else degrades to `Default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortingCriteria {
    #[default]
    Default,
    Alpha,
    Duration,
    InsertionDate,
    LastModificationDate,
    ReleaseDate,
    FileSize,
    Artist,
    PlayCount,
    Filename,
    LastPlaybackDate,
    Album,
    TrackNumber,
    TrackId,
    NbAudio,
    NbVideo,
    NbMedia,
    NbAlbum,
}

/// Parameters accepted by every listing method.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParameters {
    pub sort: SortingCriteria,
    pub desc: bool,
    /// Include rows whose device is currently absent.
    pub include_missing: bool,
    pub public_only: bool,
}

impl QueryParameters {
    pub fn sorted(sort: SortingCriteria) -> Self {
        Self {
            sort,
            ..Default::default()
        }
    }
}

/// A bind value captured when the query was built.
#[derive(Debug, Clone)]
pub enum BindValue {
    Int(i64),
    Text(String),
    Real(f64),
}

impl From<i64> for BindValue {
    fn from(v: i64) -> Self {
        BindValue::Int(v)
    }
}

impl From<String> for BindValue {
    fn from(v: String) -> Self {
        BindValue::Text(v)
    }
}

impl From<&str> for BindValue {
    fn from(v: &str) -> Self {
        BindValue::Text(v.to_string())
    }
}

/// A lazily-executed, paginated listing over entity `T`.
pub struct Query<T> {
    pool: SqlitePool,
    /// Projection for item fetches, e.g. `m.*`.
    select: String,
    /// `FROM ... [JOIN ...] [WHERE ...]` shared by count and item fetches.
    body: String,
    /// Complete `ORDER BY` clause, possibly empty.
    order_by: String,
    binds: Vec<BindValue>,
    _marker: PhantomData<T>,
}

impl<T> Query<T>
where
    T: for<'r> sqlx::FromRow<'r, SqliteRow> + Send + Unpin,
{
    pub(crate) fn new(
        pool: SqlitePool,
        select: impl Into<String>,
        body: impl Into<String>,
        order_by: impl Into<String>,
        binds: Vec<BindValue>,
    ) -> Self {
        Self {
            pool,
            select: select.into(),
            body: body.into(),
            order_by: order_by.into(),
            binds,
            _marker: PhantomData,
        }
    }

    pub async fn count(&self) -> Result<i64> {
        let sql = format!("SELECT COUNT(*) {}", self.body);
        let mut query = sqlx::query_scalar::<_, i64>(&sql);
        for bind in &self.binds {
            query = match bind {
                BindValue::Int(v) => query.bind(*v),
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Real(v) => query.bind(*v),
            };
        }
        query
            .fetch_one(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }

    pub async fn all(&self) -> Result<Vec<T>> {
        self.fetch(None).await
    }

    pub async fn items(&self, limit: u32, offset: u32) -> Result<Vec<T>> {
        self.fetch(Some((limit, offset))).await
    }

    async fn fetch(&self, page: Option<(u32, u32)>) -> Result<Vec<T>> {
        let mut sql = format!("SELECT {} {} {}", self.select, self.body, self.order_by);
        if let Some((limit, offset)) = page {
            sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, offset));
        }
        let mut query = sqlx::query_as::<_, T>(&sql);
        for bind in &self.binds {
            query = match bind {
                BindValue::Int(v) => query.bind(*v),
                BindValue::Text(v) => query.bind(v.clone()),
                BindValue::Real(v) => query.bind(*v),
            };
        }
        query
            .fetch_all(&self.pool)
            .await
            .map_err(Error::from_sqlx)
    }
}
