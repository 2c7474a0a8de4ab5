use libsql::{Connection, Database};
use std::ops::Deref;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

const MEMORY_PATH: &str = ":memory:";
const BUSY_TIMEOUT_MS: u32 = 5_000;

/// Hands out libsql connections.
///
/// File and remote databases open a fresh connection per call, so every
/// transaction has a connection of its own. An in-memory database lives only
/// on the connection that created it: that one connection is shared, and a
/// caller owns it exclusively until its [`DbConnection`] is dropped.
pub struct ConnectionSource {
    db: Database,
    shared: Option<Arc<Mutex<Connection>>>,
    local_file: bool,
}

/// A connection checked out of a [`ConnectionSource`].
pub enum DbConnection {
    Owned(Connection),
    Shared(OwnedMutexGuard<Connection>),
}

impl Deref for DbConnection {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            DbConnection::Owned(conn) => conn,
            DbConnection::Shared(guard) => guard,
        }
    }
}

impl ConnectionSource {
    pub fn remote(db: Database) -> Self {
        Self {
            db,
            shared: None,
            local_file: false,
        }
    }

    pub fn local(db: Database, path: &str) -> libsql::Result<Self> {
        if path == MEMORY_PATH {
            let conn = db.connect()?;
            return Ok(Self {
                db,
                shared: Some(Arc::new(Mutex::new(conn))),
                local_file: false,
            });
        }
        Ok(Self {
            db,
            shared: None,
            local_file: true,
        })
    }

    pub async fn get(&self) -> libsql::Result<DbConnection> {
        if let Some(shared) = &self.shared {
            return Ok(DbConnection::Shared(shared.clone().lock_owned().await));
        }

        let conn = self.db.connect()?;
        if self.local_file {
            // Writers on other connections wait instead of failing with SQLITE_BUSY.
            let mut rows = conn
                .query(&format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS), ())
                .await?;
            rows.next().await?;
        }
        Ok(DbConnection::Owned(conn))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    #[tokio::test]
    async fn test_memory_connections_share_one_database() {
        let db = Builder::new_local(MEMORY_PATH).build().await.expect("db");
        let source = ConnectionSource::local(db, MEMORY_PATH).expect("source");

        {
            let conn = source.get().await.expect("conn");
            conn.execute("CREATE TABLE t (x INTEGER)", ()).await.expect("create");
        }

        let conn = source.get().await.expect("conn");
        let mut rows = conn.query("SELECT COUNT(*) FROM t", ()).await.expect("query");
        let row = rows.next().await.expect("step").expect("row");
        assert_eq!(row.get::<i64>(0).expect("count"), 0);
    }

    #[tokio::test]
    async fn test_memory_connection_is_exclusive_while_held() {
        let db = Builder::new_local(MEMORY_PATH).build().await.expect("db");
        let source = ConnectionSource::local(db, MEMORY_PATH).expect("source");

        let held = source.get().await.expect("conn");
        let waiting =
            tokio::time::timeout(std::time::Duration::from_millis(50), source.get()).await;
        assert!(waiting.is_err());

        drop(held);
        assert!(source.get().await.is_ok());
    }
}
