//! SQLite EventStore implementation.

use async_trait::async_trait;
use chrono::Utc;
use sea_query::{Expr, OnConflict, Order, Query, SqliteQueryBuilder};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use tracing::warn;

use crate::model::{NewEvent, Position, ResolvedEvent, StreamScope};
use crate::storage::event_store::revision_matches;
use crate::storage::schema::{self, Events, StreamMetadata as MetadataTable};
use crate::storage::{
    position_from_db, position_to_db, timestamp_from_db, AppendResult, EventStore,
    ExpectedRevision, Result, StorageError, StreamMetadata,
};

/// SQLite implementation of EventStore.
///
/// Global positions are assigned densely from zero at append time, under
/// `BEGIN IMMEDIATE`, so readers never observe a hole that is later filled.
pub struct SqliteEventStore {
    pool: SqlitePool,
}

impl SqliteEventStore {
    /// Create a new SQLite event store.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the event and stream metadata tables if missing.
    pub async fn init(&self) -> Result<()> {
        sqlx::raw_sql(schema::SQLITE_CREATE_EVENT_TABLES)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn max_value(conn: &mut SqliteConnection, sql: &str) -> Result<Option<u64>> {
        let row = sqlx::query(sql).fetch_one(&mut *conn).await?;
        let max: Option<i64> = row.try_get(0)?;
        max.map(|v| position_from_db(v).map(Position::value)).transpose()
    }

    async fn stream_revision(conn: &mut SqliteConnection, stream_id: &str) -> Result<Option<u64>> {
        let query = Query::select()
            .expr(Expr::col(Events::Revision).max())
            .from(Events::Table)
            .and_where(Expr::col(Events::StreamId).eq(stream_id))
            .to_string(SqliteQueryBuilder);
        Self::max_value(conn, &query).await
    }

    /// Insert events within an already-started transaction.
    async fn insert_events(
        conn: &mut SqliteConnection,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<NewEvent>,
    ) -> Result<AppendResult> {
        let current = Self::stream_revision(conn, stream_id).await?;
        if !revision_matches(expected, current) {
            return Err(StorageError::WrongExpectedRevision {
                stream_id: stream_id.to_string(),
                expected,
                actual: current,
            });
        }

        let query = Query::select()
            .expr(Expr::col(Events::GlobalPosition).max())
            .from(Events::Table)
            .to_string(SqliteQueryBuilder);
        let tail = Self::max_value(conn, &query).await?;

        let mut revision = current.map(|r| r + 1).unwrap_or(0);
        let mut global = tail.map(|p| p + 1).unwrap_or(0);
        let mut result = AppendResult {
            next_expected_revision: current.unwrap_or(0),
            position: Position(tail.unwrap_or(0)),
        };

        for event in events {
            let created_at = Utc::now().to_rfc3339();
            let query = Query::insert()
                .into_table(Events::Table)
                .columns([
                    Events::GlobalPosition,
                    Events::StreamId,
                    Events::Revision,
                    Events::EventType,
                    Events::Data,
                    Events::Metadata,
                    Events::CreatedAt,
                ])
                .values_panic([
                    position_to_db(Position(global))?.into(),
                    stream_id.into(),
                    position_to_db(Position(revision))?.into(),
                    event.event_type.into(),
                    event.data.into(),
                    event.metadata.into(),
                    created_at.into(),
                ])
                .to_string(SqliteQueryBuilder);

            sqlx::query(&query).execute(&mut *conn).await?;

            result = AppendResult {
                next_expected_revision: revision,
                position: Position(global),
            };
            revision += 1;
            global += 1;
        }

        Ok(result)
    }

    async fn write_metadata(
        conn: &mut SqliteConnection,
        stream_id: &str,
        expected: ExpectedRevision,
        data: &serde_json::Value,
    ) -> Result<u64> {
        let query = Query::select()
            .column(MetadataTable::Revision)
            .from(MetadataTable::Table)
            .and_where(Expr::col(MetadataTable::StreamId).eq(stream_id))
            .to_string(SqliteQueryBuilder);
        let current = match sqlx::query(&query).fetch_optional(&mut *conn).await? {
            Some(row) => Some(position_from_db(row.try_get("revision")?)?.value()),
            None => None,
        };

        if !revision_matches(expected, current) {
            return Err(StorageError::WrongExpectedRevision {
                stream_id: stream_id.to_string(),
                expected,
                actual: current,
            });
        }

        let revision = current.map(|r| r + 1).unwrap_or(0);
        let query = Query::insert()
            .into_table(MetadataTable::Table)
            .columns([
                MetadataTable::StreamId,
                MetadataTable::Revision,
                MetadataTable::Data,
            ])
            .values_panic([
                stream_id.into(),
                position_to_db(Position(revision))?.into(),
                serde_json::to_string(data)?.into(),
            ])
            .on_conflict(
                OnConflict::column(MetadataTable::StreamId)
                    .update_columns([MetadataTable::Revision, MetadataTable::Data])
                    .to_owned(),
            )
            .to_string(SqliteQueryBuilder);
        sqlx::query(&query).execute(&mut *conn).await?;

        Ok(revision)
    }

    async fn read(
        &self,
        scope: &StreamScope,
        bound: Option<Position>,
        max_count: usize,
        order: Order,
    ) -> Result<Vec<ResolvedEvent>> {
        if max_count == 0 {
            return Ok(Vec::new());
        }

        let ordering = match scope {
            StreamScope::All => Events::GlobalPosition,
            StreamScope::Stream(_) => Events::Revision,
        };
        let forward = matches!(order, Order::Asc);

        let query = {
            let mut select = Query::select();
            select
                .columns([
                    Events::GlobalPosition,
                    Events::StreamId,
                    Events::Revision,
                    Events::EventType,
                    Events::Data,
                    Events::Metadata,
                    Events::CreatedAt,
                ])
                .from(Events::Table);

            if let StreamScope::Stream(stream_id) = scope {
                select.and_where(Expr::col(Events::StreamId).eq(stream_id.as_str()));
            }
            if let Some(bound) = bound {
                let bound = position_to_db(bound)?;
                if forward {
                    select.and_where(Expr::col(ordering).gt(bound));
                } else {
                    select.and_where(Expr::col(ordering).lte(bound));
                }
            }

            select
                .order_by(ordering, order)
                .limit(max_count as u64)
                .to_string(SqliteQueryBuilder)
        };

        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(|row| event_from_row(row, scope)).collect()
    }
}

/// Commit a `BEGIN IMMEDIATE` transaction.
///
/// On failure the transaction is rolled back before the connection returns
/// to the pool. A connection that cannot roll back is closed instead.
async fn commit_immediate(mut conn: PoolConnection<Sqlite>) -> Result<()> {
    let Err(e) = sqlx::query("COMMIT").execute(&mut *conn).await else {
        return Ok(());
    };
    if let Err(rollback) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        warn!(error = %rollback, "Rollback after failed commit failed, closing connection");
        let _ = conn.close().await;
    }
    Err(e.into())
}

/// Decode a row, numbering `position` in the scope it was read from.
fn event_from_row(row: &SqliteRow, scope: &StreamScope) -> Result<ResolvedEvent> {
    let global = position_from_db(row.try_get("global_position")?)?;
    let revision = position_from_db(row.try_get("revision")?)?;
    let created_at: String = row.try_get("created_at")?;

    Ok(ResolvedEvent {
        position: if scope.is_all() { global } else { revision },
        stream_id: row.try_get("stream_id")?,
        revision: revision.value(),
        event_type: row.try_get("event_type")?,
        data: row.try_get("data")?,
        metadata: row.try_get("metadata")?,
        created_at: timestamp_from_db(&created_at)?,
    })
}

#[async_trait]
impl EventStore for SqliteEventStore {
    async fn append(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        events: Vec<NewEvent>,
    ) -> Result<AppendResult> {
        // BEGIN IMMEDIATE acquires the write lock upfront, preventing deadlocks
        // when concurrent DEFERRED transactions race to upgrade from shared to exclusive.
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        let result = Self::insert_events(&mut conn, stream_id, expected, events).await;

        match result {
            Ok(appended) => {
                commit_immediate(conn).await?;
                Ok(appended)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn read_forward(
        &self,
        scope: &StreamScope,
        from_exclusive: Option<Position>,
        max_count: usize,
    ) -> Result<Vec<ResolvedEvent>> {
        self.read(scope, from_exclusive, max_count, Order::Asc).await
    }

    async fn read_backward(
        &self,
        scope: &StreamScope,
        from_inclusive: Option<Position>,
        max_count: usize,
    ) -> Result<Vec<ResolvedEvent>> {
        self.read(scope, from_inclusive, max_count, Order::Desc).await
    }

    async fn get_stream_metadata(&self, stream_id: &str) -> Result<Option<StreamMetadata>> {
        let query = Query::select()
            .columns([MetadataTable::Revision, MetadataTable::Data])
            .from(MetadataTable::Table)
            .and_where(Expr::col(MetadataTable::StreamId).eq(stream_id))
            .to_string(SqliteQueryBuilder);

        let row = sqlx::query(&query).fetch_optional(&self.pool).await?;

        match row {
            Some(row) => {
                let data: String = row.try_get("data")?;
                Ok(Some(StreamMetadata {
                    revision: position_from_db(row.try_get("revision")?)?.value(),
                    data: serde_json::from_str(&data)?,
                }))
            }
            None => Ok(None),
        }
    }

    async fn set_stream_metadata(
        &self,
        stream_id: &str,
        expected: ExpectedRevision,
        data: serde_json::Value,
    ) -> Result<u64> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await?;

        match Self::write_metadata(&mut conn, stream_id, expected, &data).await {
            Ok(revision) => {
                commit_immediate(conn).await?;
                Ok(revision)
            }
            Err(e) => {
                let _ = sqlx::query("ROLLBACK").execute(&mut *conn).await;
                Err(e)
            }
        }
    }

    async fn delete_stream_metadata(&self, stream_id: &str) -> Result<()> {
        let query = Query::delete()
            .from_table(MetadataTable::Table)
            .and_where(Expr::col(MetadataTable::StreamId).eq(stream_id))
            .to_string(SqliteQueryBuilder);

        sqlx::query(&query).execute(&self.pool).await?;
        Ok(())
    }
}
