use crate::types::{
    AppError, CostType, CreateRestaurantRequest, FileKind, LedgerEntry, LedgerKind, Restaurant,
    RestaurantFile, Result, UpdateRestaurantRequest,
};
use super::connection::{ConnectionSource, DbConnection};
use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Builder, Row, TransactionBehavior};

/// Relational store for tenants' restaurants, files, ledger and chat history.
pub struct TursoClient {
    connections: ConnectionSource,
}

impl TursoClient {
    /// Connect to a remote Turso database.
    pub async fn new_remote(url: String, auth_token: String) -> Result<Self> {
        let db = Builder::new_remote(url, auth_token)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Turso: {}", e)))?;

        Self::initialize(ConnectionSource::remote(db)).await
    }

    /// Open (or create) a local SQLite file.
    pub async fn new_local(path: &str) -> Result<Self> {
        let db = Builder::new_local(path)
            .build()
            .await
            .map_err(|e| AppError::Database(format!("Failed to open database {}: {}", path, e)))?;
        let connections = ConnectionSource::local(db, path)
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))?;

        Self::initialize(connections).await
    }

    /// Ephemeral database, used by tests and `database.url = ":memory:"`.
    pub async fn new_memory() -> Result<Self> {
        Self::new_local(":memory:").await
    }

    async fn initialize(connections: ConnectionSource) -> Result<Self> {
        let client = Self { connections };
        client.initialize_schema().await?;

        Ok(client)
    }

    /// A connection for one operation. On an in-memory database it is
    /// exclusive until dropped.
    pub async fn connection(&self) -> Result<DbConnection> {
        self.connections
            .get()
            .await
            .map_err(|e| AppError::Database(format!("Failed to get connection: {}", e)))
    }

    async fn initialize_schema(&self) -> Result<()> {
        let conn = self.connection().await?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS restaurants (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                name TEXT NOT NULL,
                cnpj TEXT NOT NULL,
                address TEXT,
                phone TEXT,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                UNIQUE(user_id, cnpj)
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create restaurants table: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS restaurant_files (
                id TEXT PRIMARY KEY,
                restaurant_id TEXT NOT NULL,
                name TEXT NOT NULL,
                kind TEXT NOT NULL,
                size_bytes INTEGER NOT NULL,
                chunk_count INTEGER NOT NULL,
                table_name TEXT,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (restaurant_id) REFERENCES restaurants(id)
            )",
            (),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to create restaurant_files table: {}", e))
        })?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS ledger_entries (
                id TEXT PRIMARY KEY,
                restaurant_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                cost_type TEXT,
                amount REAL NOT NULL,
                description TEXT NOT NULL,
                date TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (restaurant_id) REFERENCES restaurants(id)
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create ledger_entries table: {}", e)))?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_ledger_restaurant_date
             ON ledger_entries (restaurant_id, kind, date)",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create ledger index: {}", e)))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_log (
                id TEXT PRIMARY KEY,
                restaurant_id TEXT NOT NULL,
                question TEXT NOT NULL,
                intent TEXT NOT NULL,
                answer TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                FOREIGN KEY (restaurant_id) REFERENCES restaurants(id)
            )",
            (),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create chat_log table: {}", e)))?;

        Ok(())
    }

    // ============= Restaurant operations =============

    pub async fn create_restaurant(
        &self,
        user_id: &str,
        req: &CreateRestaurantRequest,
    ) -> Result<Restaurant> {
        let name = req.name.trim();
        let cnpj = req.cnpj.trim();
        if name.is_empty() || cnpj.is_empty() {
            return Err(AppError::InvalidInput(
                "name and cnpj are required".to_string(),
            ));
        }

        let conn = self.connection().await?;

        let mut existing = conn
            .query(
                "SELECT id FROM restaurants WHERE user_id = ? AND cnpj = ?",
                (user_id, cnpj),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query restaurants: {}", e)))?;
        if existing
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
            .is_some()
        {
            return Err(AppError::InvalidInput(format!(
                "A restaurant with CNPJ {} already exists",
                cnpj
            )));
        }

        let now = Utc::now();
        let restaurant = Restaurant {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            name: name.to_string(),
            cnpj: cnpj.to_string(),
            address: non_blank(req.address.as_deref()),
            phone: non_blank(req.phone.as_deref()),
            created_at: from_timestamp(now.timestamp())?,
            updated_at: from_timestamp(now.timestamp())?,
        };

        conn.execute(
            "INSERT INTO restaurants (id, user_id, name, cnpj, address, phone, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                restaurant.id.as_str(),
                user_id,
                restaurant.name.as_str(),
                restaurant.cnpj.as_str(),
                restaurant.address.as_deref(),
                restaurant.phone.as_deref(),
                now.timestamp(),
                now.timestamp(),
            ),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to create restaurant: {}", e)))?;

        Ok(restaurant)
    }

    pub async fn list_restaurants(&self, user_id: &str) -> Result<Vec<Restaurant>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT id, user_id, name, cnpj, address, phone, created_at, updated_at
                 FROM restaurants WHERE user_id = ? ORDER BY created_at ASC, name ASC",
                [user_id],
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query restaurants: {}", e)))?;

        let mut restaurants = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            restaurants.push(restaurant_from_row(&row)?);
        }

        Ok(restaurants)
    }

    /// Fetch a restaurant owned by `user_id`. Someone else's restaurant is
    /// reported as missing.
    pub async fn get_restaurant(&self, user_id: &str, id: &str) -> Result<Restaurant> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT id, user_id, name, cnpj, address, phone, created_at, updated_at
                 FROM restaurants WHERE id = ? AND user_id = ?",
                (id, user_id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query restaurant: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => restaurant_from_row(&row),
            None => Err(AppError::NotFound(format!("Restaurant {} not found", id))),
        }
    }

    /// Replace name, CNPJ, address and phone of a restaurant owned by
    /// `user_id`. The CNPJ must stay unique among the owner's restaurants.
    pub async fn update_restaurant(
        &self,
        user_id: &str,
        id: &str,
        req: &UpdateRestaurantRequest,
    ) -> Result<Restaurant> {
        let name = req.name.trim();
        let cnpj = req.cnpj.trim();
        if name.is_empty() || cnpj.is_empty() {
            return Err(AppError::InvalidInput(
                "name and cnpj are required".to_string(),
            ));
        }

        let current = self.get_restaurant(user_id, id).await?;

        let conn = self.connection().await?;
        if cnpj != current.cnpj {
            let mut taken = conn
                .query(
                    "SELECT id FROM restaurants WHERE user_id = ? AND cnpj = ? AND id != ?",
                    (user_id, cnpj, id),
                )
                .await
                .map_err(|e| AppError::Database(format!("Failed to query restaurants: {}", e)))?;
            if taken
                .next()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?
                .is_some()
            {
                return Err(AppError::InvalidInput(format!(
                    "CNPJ {} is already used by another restaurant",
                    cnpj
                )));
            }
        }

        let now = Utc::now();
        let restaurant = Restaurant {
            name: name.to_string(),
            cnpj: cnpj.to_string(),
            address: non_blank(req.address.as_deref()),
            phone: non_blank(req.phone.as_deref()),
            updated_at: from_timestamp(now.timestamp())?,
            ..current
        };

        conn.execute(
            "UPDATE restaurants SET name = ?, cnpj = ?, address = ?, phone = ?, updated_at = ?
             WHERE id = ? AND user_id = ?",
            (
                restaurant.name.as_str(),
                restaurant.cnpj.as_str(),
                restaurant.address.as_deref(),
                restaurant.phone.as_deref(),
                now.timestamp(),
                id,
                user_id,
            ),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to update restaurant: {}", e)))?;

        Ok(restaurant)
    }

    /// Remove a restaurant and every row that belongs to it.
    pub async fn delete_restaurant(&self, user_id: &str, id: &str) -> Result<()> {
        self.get_restaurant(user_id, id).await?;

        let conn = self.connection().await?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        for sql in [
            "DELETE FROM chat_log WHERE restaurant_id = ?",
            "DELETE FROM ledger_entries WHERE restaurant_id = ?",
            "DELETE FROM restaurant_files WHERE restaurant_id = ?",
            "DELETE FROM restaurants WHERE id = ?",
        ] {
            tx.execute(sql, [id])
                .await
                .map_err(|e| AppError::Database(format!("Failed to delete restaurant: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit delete: {}", e)))?;

        Ok(())
    }

    // ============= File operations =============

    pub async fn insert_file(&self, file: &RestaurantFile) -> Result<()> {
        let conn = self.connection().await?;

        conn.execute(
            "INSERT INTO restaurant_files
             (id, restaurant_id, name, kind, size_bytes, chunk_count, table_name, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                file.id.as_str(),
                file.restaurant_id.as_str(),
                file.name.as_str(),
                file.kind.as_str(),
                file.size_bytes,
                file.chunk_count,
                file.table_name.as_deref(),
                file.created_at.timestamp(),
            ),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert file: {}", e)))?;

        Ok(())
    }

    /// Files of a restaurant, newest first.
    pub async fn list_files(
        &self,
        restaurant_id: &str,
        limit: Option<u32>,
    ) -> Result<Vec<RestaurantFile>> {
        let conn = self.connection().await?;
        let limit = limit.map(i64::from).unwrap_or(-1);

        let mut rows = conn
            .query(
                "SELECT id, restaurant_id, name, kind, size_bytes, chunk_count, table_name, created_at
                 FROM restaurant_files WHERE restaurant_id = ?
                 ORDER BY created_at DESC, rowid DESC LIMIT ?",
                (restaurant_id, limit),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query files: {}", e)))?;

        let mut files = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            files.push(file_from_row(&row)?);
        }

        Ok(files)
    }

    pub async fn get_file(&self, restaurant_id: &str, file_id: &str) -> Result<RestaurantFile> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT id, restaurant_id, name, kind, size_bytes, chunk_count, table_name, created_at
                 FROM restaurant_files WHERE id = ? AND restaurant_id = ?",
                (file_id, restaurant_id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query file: {}", e)))?;

        match rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            Some(row) => file_from_row(&row),
            None => Err(AppError::NotFound(format!("File {} not found", file_id))),
        }
    }

    pub async fn delete_file(&self, restaurant_id: &str, file_id: &str) -> Result<()> {
        let conn = self.connection().await?;

        let affected = conn
            .execute(
                "DELETE FROM restaurant_files WHERE id = ? AND restaurant_id = ?",
                (file_id, restaurant_id),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to delete file: {}", e)))?;

        if affected == 0 {
            return Err(AppError::NotFound(format!("File {} not found", file_id)));
        }

        Ok(())
    }

    // ============= Ledger operations =============

    pub async fn insert_cost(
        &self,
        restaurant_id: &str,
        amount: f64,
        cost_type: CostType,
        description: &str,
        date: &str,
    ) -> Result<LedgerEntry> {
        self.insert_ledger_entry(
            restaurant_id,
            LedgerKind::Cost,
            Some(cost_type),
            amount,
            description,
            date,
        )
        .await
    }

    pub async fn insert_revenue(
        &self,
        restaurant_id: &str,
        amount: f64,
        description: &str,
        date: &str,
    ) -> Result<LedgerEntry> {
        self.insert_ledger_entry(
            restaurant_id,
            LedgerKind::Revenue,
            None,
            amount,
            description,
            date,
        )
        .await
    }

    async fn insert_ledger_entry(
        &self,
        restaurant_id: &str,
        kind: LedgerKind,
        cost_type: Option<CostType>,
        amount: f64,
        description: &str,
        date: &str,
    ) -> Result<LedgerEntry> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(AppError::InvalidInput(format!(
                "amount must be a non-negative number, got {}",
                amount
            )));
        }
        let date = parse_date(date)?;

        let now = Utc::now();
        let entry = LedgerEntry {
            id: uuid::Uuid::new_v4().to_string(),
            restaurant_id: restaurant_id.to_string(),
            kind,
            cost_type,
            amount,
            description: description.trim().to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            created_at: from_timestamp(now.timestamp())?,
        };

        let conn = self.connection().await?;
        conn.execute(
            "INSERT INTO ledger_entries
             (id, restaurant_id, kind, cost_type, amount, description, date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            (
                entry.id.as_str(),
                restaurant_id,
                kind.as_str(),
                cost_type.map(|c| c.as_str()),
                amount,
                entry.description.as_str(),
                entry.date.as_str(),
                now.timestamp(),
            ),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to insert {}: {}", kind.as_str(), e)))?;

        Ok(entry)
    }

    /// Costs with `from <= date <= to` (inclusive, `YYYY-MM-DD`).
    pub async fn list_costs(
        &self,
        restaurant_id: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<LedgerEntry>> {
        self.list_ledger(restaurant_id, LedgerKind::Cost, from, to)
            .await
    }

    /// Revenues with `from <= date <= to` (inclusive, `YYYY-MM-DD`).
    pub async fn list_revenues(
        &self,
        restaurant_id: &str,
        from: &str,
        to: &str,
    ) -> Result<Vec<LedgerEntry>> {
        self.list_ledger(restaurant_id, LedgerKind::Revenue, from, to)
            .await
    }

    async fn list_ledger(
        &self,
        restaurant_id: &str,
        kind: LedgerKind,
        from: &str,
        to: &str,
    ) -> Result<Vec<LedgerEntry>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT id, restaurant_id, kind, cost_type, amount, description, date, created_at
                 FROM ledger_entries
                 WHERE restaurant_id = ? AND kind = ? AND date >= ? AND date <= ?
                 ORDER BY date ASC, created_at ASC",
                (restaurant_id, kind.as_str(), from, to),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query ledger: {}", e)))?;

        let mut entries = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            let cost_type: Option<String> =
                row.get(3).map_err(|e| AppError::Database(e.to_string()))?;
            entries.push(LedgerEntry {
                id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
                restaurant_id: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
                kind,
                cost_type: cost_type.as_deref().and_then(CostType::parse),
                amount: row.get(4).map_err(|e| AppError::Database(e.to_string()))?,
                description: row.get(5).map_err(|e| AppError::Database(e.to_string()))?,
                date: row.get(6).map_err(|e| AppError::Database(e.to_string()))?,
                created_at: from_timestamp(
                    row.get::<i64>(7)
                        .map_err(|e| AppError::Database(e.to_string()))?,
                )?,
            });
        }

        Ok(entries)
    }

    // ============= Chat log =============

    pub async fn log_chat(
        &self,
        restaurant_id: &str,
        question: &str,
        intent: &str,
        answer: &str,
    ) -> Result<String> {
        let conn = self.connection().await?;
        let id = uuid::Uuid::new_v4().to_string();

        conn.execute(
            "INSERT INTO chat_log (id, restaurant_id, question, intent, answer, created_at)
             VALUES (?, ?, ?, ?, ?, ?)",
            (
                id.as_str(),
                restaurant_id,
                question,
                intent,
                answer,
                Utc::now().timestamp(),
            ),
        )
        .await
        .map_err(|e| AppError::Database(format!("Failed to log chat: {}", e)))?;

        Ok(id)
    }

    /// Most recent chat exchanges of a restaurant, newest first.
    pub async fn recent_chats(&self, restaurant_id: &str, limit: u32) -> Result<Vec<ChatLogEntry>> {
        let conn = self.connection().await?;

        let mut rows = conn
            .query(
                "SELECT id, question, intent, answer, created_at FROM chat_log
                 WHERE restaurant_id = ? ORDER BY created_at DESC, rowid DESC LIMIT ?",
                (restaurant_id, i64::from(limit)),
            )
            .await
            .map_err(|e| AppError::Database(format!("Failed to query chat log: {}", e)))?;

        let mut chats = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?
        {
            chats.push(ChatLogEntry {
                id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
                question: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
                intent: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
                answer: row.get(3).map_err(|e| AppError::Database(e.to_string()))?,
                created_at: row.get(4).map_err(|e| AppError::Database(e.to_string()))?,
            });
        }

        Ok(chats)
    }
}

#[derive(Debug, Clone)]
pub struct ChatLogEntry {
    pub id: String,
    pub question: String,
    pub intent: String,
    pub answer: String,
    pub created_at: i64,
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::InvalidInput(format!("Invalid date '{}', expected YYYY-MM-DD", value)))
}

fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

fn from_timestamp(ts: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| AppError::Database(format!("Invalid timestamp {}", ts)))
}

fn restaurant_from_row(row: &Row) -> Result<Restaurant> {
    Ok(Restaurant {
        id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
        user_id: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
        name: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
        cnpj: row.get(3).map_err(|e| AppError::Database(e.to_string()))?,
        address: row.get(4).map_err(|e| AppError::Database(e.to_string()))?,
        phone: row.get(5).map_err(|e| AppError::Database(e.to_string()))?,
        created_at: from_timestamp(
            row.get::<i64>(6)
                .map_err(|e| AppError::Database(e.to_string()))?,
        )?,
        updated_at: from_timestamp(
            row.get::<i64>(7)
                .map_err(|e| AppError::Database(e.to_string()))?,
        )?,
    })
}

fn file_from_row(row: &Row) -> Result<RestaurantFile> {
    let kind: String = row.get(3).map_err(|e| AppError::Database(e.to_string()))?;
    Ok(RestaurantFile {
        id: row.get(0).map_err(|e| AppError::Database(e.to_string()))?,
        restaurant_id: row.get(1).map_err(|e| AppError::Database(e.to_string()))?,
        name: row.get(2).map_err(|e| AppError::Database(e.to_string()))?,
        kind: FileKind::parse(&kind)
            .ok_or_else(|| AppError::Database(format!("Unknown file kind '{}'", kind)))?,
        size_bytes: row.get(4).map_err(|e| AppError::Database(e.to_string()))?,
        chunk_count: row.get(5).map_err(|e| AppError::Database(e.to_string()))?,
        table_name: row.get(6).map_err(|e| AppError::Database(e.to_string()))?,
        created_at: from_timestamp(
            row.get::<i64>(7)
                .map_err(|e| AppError::Database(e.to_string()))?,
        )?,
    })
}
