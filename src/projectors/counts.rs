//! Relational projection counting events per type.
//!
//! Writes go through a [`UnitOfWork`], so under the transactional
//! checkpointer the counts commit together with the checkpoint.

use std::sync::Arc;

use async_trait::async_trait;
use sea_query::{Expr, Iden, OnConflict, Query};

use crate::model::ResolvedEvent;
use crate::processing::{EventHandler, HandlerError, UnitOfWork};

/// Portable table definition for [`EventTypeCounts`].
pub const EVENT_TYPE_COUNTS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS event_type_counts (
    event_type TEXT PRIMARY KEY,
    seen BIGINT NOT NULL,
    last_position BIGINT NOT NULL
)
"#;

#[derive(Iden, Clone, Copy)]
enum EventTypeCountsTable {
    #[iden = "event_type_counts"]
    Table,
    EventType,
    Seen,
    LastPosition,
}

/// Upserts one counter row per event type.
///
/// Not idempotent under redelivery on its own: a replayed batch counts
/// again unless the counter commits atomically with the checkpoint.
pub struct EventTypeCounts {
    unit_of_work: Arc<UnitOfWork>,
}

impl EventTypeCounts {
    pub fn new(unit_of_work: Arc<UnitOfWork>) -> Self {
        Self { unit_of_work }
    }
}

#[async_trait]
impl EventHandler for EventTypeCounts {
    async fn handle(&self, event: &ResolvedEvent) -> Result<(), HandlerError> {
        use EventTypeCountsTable as T;

        let position = i64::try_from(event.position.0)
            .map_err(|_| HandlerError::new(format!("position {} out of range", event.position)))?;

        let statement = Query::insert()
            .into_table(T::Table)
            .columns([T::EventType, T::Seen, T::LastPosition])
            .values([event.event_type.clone().into(), 1i64.into(), position.into()])
            .map_err(|e| HandlerError::new(e.to_string()))?
            .on_conflict(
                OnConflict::column(T::EventType)
                    .value(T::Seen, Expr::col((T::Table, T::Seen)).add(1))
                    .value(T::LastPosition, position)
                    .to_owned(),
            )
            .to_owned();

        self.unit_of_work.insert(statement);
        Ok(())
    }
}
