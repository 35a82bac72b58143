//! SQLite subscription store.

use crate::domain::bundle::BundleKey;
use crate::domain::config_validation::sqlite_pool_size;
use crate::domain::encoder::StrategyId;
use crate::domain::error::StratforgeError;
use crate::domain::subscription::{
    NewSubscription, Subscription, SubscriptionHandle, SubscriptionTarget,
};
use crate::domain::value::{AbiValue, SlotType};
use crate::ports::config_port::ConfigPort;
use crate::ports::subscription_port::SubscriptionPort;
use alloy_primitives::Address;
use chrono::{DateTime, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

pub struct SqliteSubscriptionStore {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> StratforgeError {
    StratforgeError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> StratforgeError {
    StratforgeError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn corrupt(id: i64, reason: impl std::fmt::Display) -> StratforgeError {
    StratforgeError::Database {
        reason: format!("subscription {id}: {reason}"),
    }
}

/// Raw `subscriptions` row before conversion.
struct Row {
    id: i64,
    target_kind: String,
    target: String,
    owner: String,
    enabled: bool,
    created_at: String,
}

impl SqliteSubscriptionStore {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratforgeError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| StratforgeError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = sqlite_pool_size(config)?;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StratforgeError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        let store = Self { pool };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StratforgeError> {
        self.pool.get().map_err(pool_error)
    }

    pub fn initialize_schema(&self) -> Result<(), StratforgeError> {
        self.conn()?
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS subscriptions (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    target_kind TEXT NOT NULL,
                    target TEXT NOT NULL,
                    owner TEXT NOT NULL,
                    enabled INTEGER NOT NULL,
                    created_at TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS subscription_values (
                    subscription_id INTEGER NOT NULL,
                    position INTEGER NOT NULL,
                    name TEXT NOT NULL,
                    value_type TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (subscription_id, position)
                );",
            )
            .map_err(query_error)
    }

    fn into_subscription(
        row: Row,
        values: Vec<(String, String, String)>,
    ) -> Result<Subscription, StratforgeError> {
        let target = match row.target_kind.as_str() {
            "strategy" => SubscriptionTarget::Strategy(
                row.target
                    .parse::<StrategyId>()
                    .map_err(|e| corrupt(row.id, e))?,
            ),
            "bundle" => SubscriptionTarget::Bundle(
                row.target
                    .parse::<BundleKey>()
                    .map_err(|e| corrupt(row.id, e))?,
            ),
            other => return Err(corrupt(row.id, format!("unknown target kind '{other}'"))),
        };
        let owner = row
            .owner
            .parse::<Address>()
            .map_err(|e| corrupt(row.id, e))?;
        let created_at = DateTime::parse_from_rfc3339(&row.created_at)
            .map_err(|e| corrupt(row.id, e))?
            .with_timezone(&Utc);

        let values = values
            .into_iter()
            .map(|(name, ty, text)| {
                let ty: SlotType = ty.parse().map_err(|e: String| corrupt(row.id, e))?;
                let value = AbiValue::parse(ty, &text).map_err(|e| corrupt(row.id, e))?;
                Ok((name, value))
            })
            .collect::<Result<Vec<_>, StratforgeError>>()?;

        Ok(Subscription {
            id: SubscriptionHandle(row.id as u64),
            target,
            owner,
            values,
            enabled: row.enabled,
            created_at,
        })
    }
}

impl SubscriptionPort for SqliteSubscriptionStore {
    fn insert(&self, draft: NewSubscription) -> Result<Subscription, StratforgeError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        let (target_kind, target) = match draft.target {
            SubscriptionTarget::Strategy(id) => ("strategy", id.to_string()),
            SubscriptionTarget::Bundle(key) => ("bundle", key.to_string()),
        };
        tx.execute(
            "INSERT INTO subscriptions (target_kind, target, owner, enabled, created_at)
             VALUES (?1, ?2, ?3, 1, ?4)",
            params![
                target_kind,
                target,
                draft.owner.to_string(),
                draft.created_at.to_rfc3339()
            ],
        )
        .map_err(query_error)?;
        let id = tx.last_insert_rowid();

        for (position, (name, value)) in draft.values.iter().enumerate() {
            tx.execute(
                "INSERT INTO subscription_values (subscription_id, position, name, value_type, value)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    position as i64,
                    name,
                    value.slot_type().to_string(),
                    value.to_string()
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;

        Ok(Subscription {
            id: SubscriptionHandle(id as u64),
            target: draft.target,
            owner: draft.owner,
            values: draft.values,
            enabled: true,
            created_at: draft.created_at,
        })
    }

    fn fetch(&self, id: SubscriptionHandle) -> Result<Option<Subscription>, StratforgeError> {
        let conn = self.conn()?;

        let row = conn
            .query_row(
                "SELECT id, target_kind, target, owner, enabled, created_at
                 FROM subscriptions WHERE id = ?1",
                params![id.0 as i64],
                |row| {
                    Ok(Row {
                        id: row.get(0)?,
                        target_kind: row.get(1)?,
                        target: row.get(2)?,
                        owner: row.get(3)?,
                        enabled: row.get(4)?,
                        created_at: row.get(5)?,
                    })
                },
            )
            .optional()
            .map_err(query_error)?;
        let Some(row) = row else {
            return Ok(None);
        };

        let mut stmt = conn
            .prepare(
                "SELECT name, value_type, value FROM subscription_values
                 WHERE subscription_id = ?1 ORDER BY position ASC",
            )
            .map_err(query_error)?;
        let rows = stmt
            .query_map(params![row.id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                ))
            })
            .map_err(query_error)?;

        let mut values = Vec::new();
        for value in rows {
            values.push(value.map_err(query_error)?);
        }

        Self::into_subscription(row, values).map(Some)
    }

    fn set_enabled(&self, id: SubscriptionHandle, enabled: bool) -> Result<bool, StratforgeError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE subscriptions SET enabled = ?1 WHERE id = ?2",
                params![enabled, id.0 as i64],
            )
            .map_err(query_error)?;
        Ok(changed > 0)
    }

    fn remove(&self, id: SubscriptionHandle) -> Result<bool, StratforgeError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;
        tx.execute(
            "DELETE FROM subscription_values WHERE subscription_id = ?1",
            params![id.0 as i64],
        )
        .map_err(query_error)?;
        let removed = tx
            .execute(
                "DELETE FROM subscriptions WHERE id = ?1",
                params![id.0 as i64],
            )
            .map_err(query_error)?;
        tx.commit().map_err(query_error)?;
        Ok(removed > 0)
    }

    fn count(&self) -> Result<usize, StratforgeError> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM subscriptions", [], |row| row.get(0))
            .map_err(query_error)?;
        Ok(count as usize)
    }
}
