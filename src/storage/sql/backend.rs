//! Dialect implementations of [`RelationalBackend`].
//!
//! The statements only differ in the query builder and schema, so both
//! backends are generated from one macro.

use super::RelationalBackend;

/// SQLite relational backend.
#[cfg(feature = "sqlite")]
pub struct SqliteBackend;

/// PostgreSQL relational backend.
#[cfg(feature = "postgres")]
pub struct PostgresBackend;

macro_rules! impl_relational_backend {
    ($backend:ty, $db:ty, $builder:expr, $schema:expr, $name:literal, $feature:literal) => {
        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl RelationalBackend for $backend {
            type Db = $db;

            fn name() -> &'static str {
                $name
            }

            async fn create_schema(
                conn: &mut <$db as sqlx::Database>::Connection,
            ) -> crate::storage::Result<()> {
                let statements = $schema.split(';').map(str::trim).filter(|s| !s.is_empty());
                for statement in statements {
                    sqlx::query(statement).execute(&mut *conn).await?;
                }
                Ok(())
            }

            async fn load_checkpoint(
                conn: &mut <$db as sqlx::Database>::Connection,
                subscription_id: &str,
            ) -> crate::storage::Result<crate::model::Checkpoint> {
                use sea_query::{Expr, Query};
                use sqlx::Row;

                use crate::storage::schema::SubscriptionCheckpoints;
                use crate::storage::{position_from_db, timestamp_from_db};

                let sql = Query::select()
                    .columns([
                        SubscriptionCheckpoints::Position,
                        SubscriptionCheckpoints::CheckpointedAt,
                    ])
                    .from(SubscriptionCheckpoints::Table)
                    .and_where(Expr::col(SubscriptionCheckpoints::SubscriptionId).eq(subscription_id))
                    .to_string($builder);

                let row = sqlx::query(&sql).fetch_optional(&mut *conn).await?;

                match row {
                    Some(row) => {
                        let position: Option<i64> = row.try_get("position")?;
                        let checkpointed_at: String = row.try_get("checkpointed_at")?;
                        Ok(crate::model::Checkpoint {
                            subscription_id: subscription_id.to_string(),
                            position: position.map(position_from_db).transpose()?,
                            checkpointed_at: timestamp_from_db(&checkpointed_at)?,
                        })
                    }
                    None => Ok(crate::model::Checkpoint::initial(subscription_id)),
                }
            }

            async fn store_checkpoint(
                conn: &mut <$db as sqlx::Database>::Connection,
                subscription_id: &str,
                position: crate::model::Position,
                expected_previous: Option<crate::model::Position>,
            ) -> crate::outcome::StoreResult {
                use sea_query::{Expr, OnConflict, Query};

                use crate::outcome::StoreResult;
                use crate::storage::position_to_db;
                use crate::storage::schema::SubscriptionCheckpoints;

                if let Some(rejected) = crate::storage::checkpoint_store::check_forward(position, expected_previous) {
                    return rejected;
                }

                let attempt = async {
                    let new_position = position_to_db(position)?;
                    let checkpointed_at = chrono::Utc::now().to_rfc3339();

                    let sql = match expected_previous {
                        Some(previous) => Query::update()
                            .table(SubscriptionCheckpoints::Table)
                            .values([
                                (SubscriptionCheckpoints::Position, new_position.into()),
                                (SubscriptionCheckpoints::CheckpointedAt, checkpointed_at.into()),
                            ])
                            .and_where(Expr::col(SubscriptionCheckpoints::SubscriptionId).eq(subscription_id))
                            .and_where(Expr::col(SubscriptionCheckpoints::Position).eq(position_to_db(previous)?))
                            .to_string($builder),
                        None => Query::insert()
                            .into_table(SubscriptionCheckpoints::Table)
                            .columns([
                                SubscriptionCheckpoints::SubscriptionId,
                                SubscriptionCheckpoints::Position,
                                SubscriptionCheckpoints::CheckpointedAt,
                            ])
                            .values_panic([
                                subscription_id.into(),
                                new_position.into(),
                                checkpointed_at.into(),
                            ])
                            .on_conflict(
                                OnConflict::column(SubscriptionCheckpoints::SubscriptionId)
                                    .update_columns([
                                        SubscriptionCheckpoints::Position,
                                        SubscriptionCheckpoints::CheckpointedAt,
                                    ])
                                    .action_and_where(
                                        Expr::col((
                                            SubscriptionCheckpoints::Table,
                                            SubscriptionCheckpoints::Position,
                                        ))
                                        .is_null(),
                                    )
                                    .to_owned(),
                            )
                            .to_string($builder),
                    };

                    let done = sqlx::query(&sql).execute(&mut *conn).await?;
                    Ok::<_, crate::storage::StorageError>(done.rows_affected())
                }
                .await;

                match attempt {
                    Ok(0) => match Self::load_checkpoint(conn, subscription_id).await {
                        Ok(current) => StoreResult::conflict(expected_previous, current.position),
                        Err(e) => StoreResult::transient(e.to_string()),
                    },
                    Ok(_) => StoreResult::Success,
                    Err(e) => StoreResult::transient(e.to_string()),
                }
            }

            async fn reset_checkpoint(
                conn: &mut <$db as sqlx::Database>::Connection,
                subscription_id: &str,
            ) -> crate::storage::Result<()> {
                use sea_query::{Expr, Query};

                use crate::storage::schema::SubscriptionCheckpoints;

                let sql = Query::delete()
                    .from_table(SubscriptionCheckpoints::Table)
                    .and_where(Expr::col(SubscriptionCheckpoints::SubscriptionId).eq(subscription_id))
                    .to_string($builder);

                sqlx::query(&sql).execute(&mut *conn).await?;
                Ok(())
            }

            async fn execute(
                conn: &mut <$db as sqlx::Database>::Connection,
                writes: &[crate::processing::PendingWrite],
            ) -> crate::storage::Result<()> {
                for write in writes {
                    let sql = write.to_sql($builder);
                    sqlx::query(&sql).execute(&mut *conn).await?;
                }
                Ok(())
            }
        }
    };
}

impl_relational_backend!(
    SqliteBackend,
    sqlx::Sqlite,
    sea_query::SqliteQueryBuilder,
    crate::storage::schema::SQLITE_CREATE_CHECKPOINT_TABLES,
    "sqlite",
    "sqlite"
);

impl_relational_backend!(
    PostgresBackend,
    sqlx::Postgres,
    sea_query::PostgresQueryBuilder,
    crate::storage::schema::POSTGRES_CREATE_CHECKPOINT_TABLE,
    "postgres",
    "postgres"
);
