//! Pending relational projection writes.
//!
//! Projection handlers running under the transactional checkpointer do not
//! touch the database directly. They queue sea-query statements here, and
//! the checkpointer flushes the queue into the same transaction that moves
//! the checkpoint. Nothing queued survives a rollback.

use std::sync::{Mutex, MutexGuard};

use sea_query::{DeleteStatement, InsertStatement, QueryBuilder, UpdateStatement};

/// One queued projection statement.
#[derive(Debug, Clone)]
pub enum PendingWrite {
    Insert(InsertStatement),
    Update(UpdateStatement),
    Delete(DeleteStatement),
}

impl PendingWrite {
    /// Render for a specific dialect.
    pub fn to_sql<Q: QueryBuilder>(&self, builder: Q) -> String {
        match self {
            Self::Insert(statement) => statement.to_string(builder),
            Self::Update(statement) => statement.to_string(builder),
            Self::Delete(statement) => statement.to_string(builder),
        }
    }
}

/// Change tracker shared between projection handlers and the checkpointer.
#[derive(Default)]
pub struct UnitOfWork {
    pending: Mutex<Vec<PendingWrite>>,
}

impl UnitOfWork {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, Vec<PendingWrite>> {
        // A panicking handler cannot leave the queue half-written; each push
        // is a single Vec operation.
        self.pending.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn insert(&self, statement: InsertStatement) {
        self.pending().push(PendingWrite::Insert(statement));
    }

    pub fn update(&self, statement: UpdateStatement) {
        self.pending().push(PendingWrite::Update(statement));
    }

    pub fn delete(&self, statement: DeleteStatement) {
        self.pending().push(PendingWrite::Delete(statement));
    }

    /// Drain the queue for flushing.
    pub fn take(&self) -> Vec<PendingWrite> {
        std::mem::take(&mut *self.pending())
    }

    /// Drop everything queued since the last flush.
    pub fn clear(&self) {
        self.pending().clear();
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use sea_query::{Alias, Query};

    use super::*;

    fn insert(id: i64) -> InsertStatement {
        Query::insert()
            .into_table(Alias::new("order_totals"))
            .columns([Alias::new("order_id")])
            .values_panic([id.into()])
            .to_owned()
    }

    #[test]
    fn test_take_drains_queue() {
        let uow = UnitOfWork::new();
        uow.insert(insert(1));
        uow.insert(insert(2));
        assert_eq!(uow.len(), 2);

        let pending = uow.take();
        assert_eq!(pending.len(), 2);
        assert!(uow.is_empty());
    }

    #[test]
    fn test_clear_discards_queue() {
        let uow = UnitOfWork::new();
        uow.insert(insert(1));
        uow.clear();
        assert!(uow.take().is_empty());
    }

    #[test]
    fn test_renders_per_dialect() {
        let write = PendingWrite::Insert(insert(7));
        assert_eq!(
            write.to_sql(sea_query::SqliteQueryBuilder),
            r#"INSERT INTO "order_totals" ("order_id") VALUES (7)"#
        );
        assert_eq!(
            write.to_sql(sea_query::PostgresQueryBuilder),
            r#"INSERT INTO "order_totals" ("order_id") VALUES (7)"#
        );
    }

    #[test]
    fn test_shared_across_threads() {
        let uow = std::sync::Arc::new(UnitOfWork::new());

        let workers: Vec<_> = (0..4)
            .map(|id| {
                let uow = uow.clone();
                std::thread::spawn(move || uow.insert(insert(id)))
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(uow.len(), 4);
    }
}
