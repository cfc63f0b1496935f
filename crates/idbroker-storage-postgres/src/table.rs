//! Generic row operations over the per-kind JSONB tables.
//!
//! Every table has the shape `(id TEXT PRIMARY KEY, expiry TIMESTAMPTZ,
//! resource JSONB)`. Updates read the row `FOR UPDATE` inside a transaction,
//! run the updater and write the result back before committing.

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use sqlx_core::query::query;
use sqlx_core::query_scalar::query_scalar;
use sqlx_postgres::{PgConnection, PgTransaction};
use time::OffsetDateTime;

use idbroker_storage::{
    AuthCode, AuthRequest, Client, Connector, DeviceRequest, DeviceToken, IntoUtc, Keys,
    OfflineSession, Password, RefreshToken, StorageError, StorageResult, Updater, kind,
    KeyHashFn, offline_session_key,
};

use crate::PgPool;
use crate::error::{db_error, insert_error};

/// A storable entity and the table it lives in.
pub(crate) trait Resource: Serialize + DeserializeOwned + IntoUtc + Send + Sync + 'static {
    const KIND: &'static str;
    const TABLE: &'static str;

    /// Primary key of the row. `hash` derives synthetic keys.
    fn key(&self, hash: KeyHashFn) -> String;

    fn expiry(&self) -> Option<OffsetDateTime> {
        None
    }
}

impl Resource for AuthRequest {
    const KIND: &'static str = kind::AUTH_REQUEST;
    const TABLE: &'static str = "auth_request";

    fn key(&self, _hash: KeyHashFn) -> String {
        self.id.clone()
    }

    fn expiry(&self) -> Option<OffsetDateTime> {
        Some(self.expiry)
    }
}

impl Resource for AuthCode {
    const KIND: &'static str = kind::AUTH_CODE;
    const TABLE: &'static str = "auth_code";

    fn key(&self, _hash: KeyHashFn) -> String {
        self.id.clone()
    }

    fn expiry(&self) -> Option<OffsetDateTime> {
        Some(self.expiry)
    }
}

impl Resource for RefreshToken {
    const KIND: &'static str = kind::REFRESH_TOKEN;
    const TABLE: &'static str = "refresh_token";

    fn key(&self, _hash: KeyHashFn) -> String {
        self.id.clone()
    }
}

impl Resource for DeviceRequest {
    const KIND: &'static str = kind::DEVICE_REQUEST;
    const TABLE: &'static str = "device_request";

    fn key(&self, _hash: KeyHashFn) -> String {
        self.user_code.clone()
    }

    fn expiry(&self) -> Option<OffsetDateTime> {
        Some(self.expiry)
    }
}

impl Resource for DeviceToken {
    const KIND: &'static str = kind::DEVICE_TOKEN;
    const TABLE: &'static str = "device_token";

    fn key(&self, _hash: KeyHashFn) -> String {
        self.device_code.clone()
    }

    fn expiry(&self) -> Option<OffsetDateTime> {
        Some(self.expiry)
    }
}

impl Resource for Client {
    const KIND: &'static str = kind::CLIENT;
    const TABLE: &'static str = "client";

    fn key(&self, _hash: KeyHashFn) -> String {
        self.id.clone()
    }
}

impl Resource for Connector {
    const KIND: &'static str = kind::CONNECTOR;
    const TABLE: &'static str = "connector";

    fn key(&self, _hash: KeyHashFn) -> String {
        self.id.clone()
    }
}

impl Resource for Password {
    const KIND: &'static str = kind::PASSWORD;
    const TABLE: &'static str = "password";

    fn key(&self, _hash: KeyHashFn) -> String {
        Password::key(&self.email)
    }
}

impl Resource for OfflineSession {
    const KIND: &'static str = kind::OFFLINE_SESSION;
    const TABLE: &'static str = "offline_session";

    fn key(&self, hash: KeyHashFn) -> String {
        offline_session_key(hash, &self.user_id, &self.conn_id)
    }
}

impl Resource for Keys {
    const KIND: &'static str = kind::KEYS;
    const TABLE: &'static str = "keys";

    fn key(&self, _hash: KeyHashFn) -> String {
        KEYS_ID.to_string()
    }
}

pub(crate) const KEYS_ID: &str = "keys";

fn decode<T: Resource>(resource: Value) -> StorageResult<T> {
    Ok(serde_json::from_value(resource)?)
}

pub(crate) async fn insert<T: Resource>(pool: &PgPool, hash: KeyHashFn, row: T) -> StorageResult<()> {
    let mut conn = pool.acquire().await.map_err(db_error)?;
    insert_in(&mut conn, hash, &row.into_utc()).await
}

/// Inserts on an existing connection or transaction. `row` must already be UTC.
pub(crate) async fn insert_in<T: Resource>(
    conn: &mut PgConnection,
    hash: KeyHashFn,
    row: &T,
) -> StorageResult<()> {
    let id = row.key(hash);
    let resource = serde_json::to_value(row)?;
    let sql = format!(
        "INSERT INTO {} (id, expiry, resource) VALUES ($1, $2, $3)",
        T::TABLE
    );

    query(&sql)
        .bind(&id)
        .bind(row.expiry())
        .bind(&resource)
        .execute(&mut *conn)
        .await
        .map_err(|e| insert_error(T::KIND, &id, e))?;
    Ok(())
}

pub(crate) async fn fetch<T: Resource>(pool: &PgPool, id: &str) -> StorageResult<T> {
    let sql = format!("SELECT resource FROM {} WHERE id = $1", T::TABLE);
    let resource: Option<Value> = query_scalar(&sql)
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error)?;
    decode(resource.ok_or_else(|| StorageError::not_found(T::KIND, id))?)
}

pub(crate) async fn remove<T: Resource>(pool: &PgPool, id: &str) -> StorageResult<()> {
    let sql = format!("DELETE FROM {} WHERE id = $1", T::TABLE);
    let result = query(&sql).bind(id).execute(pool).await.map_err(db_error)?;
    if result.rows_affected() == 0 {
        return Err(StorageError::not_found(T::KIND, id));
    }
    Ok(())
}

pub(crate) async fn list<T: Resource>(pool: &PgPool) -> StorageResult<Vec<T>> {
    let sql = format!("SELECT resource FROM {} ORDER BY id", T::TABLE);
    let rows: Vec<Value> = query_scalar(&sql)
        .fetch_all(pool)
        .await
        .map_err(db_error)?;
    rows.into_iter().map(decode).collect()
}

/// Row locked for the rest of the transaction, or `None`.
pub(crate) async fn select_for_update<T: Resource>(
    conn: &mut PgConnection,
    id: &str,
) -> StorageResult<Option<T>> {
    let sql = format!("SELECT resource FROM {} WHERE id = $1 FOR UPDATE", T::TABLE);
    let resource: Option<Value> = query_scalar(&sql)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(db_error)?;
    resource.map(decode).transpose()
}

pub(crate) async fn write<T: Resource>(conn: &mut PgConnection, id: &str, row: &T) -> StorageResult<()> {
    let resource = serde_json::to_value(row)?;
    let sql = format!(
        "UPDATE {} SET expiry = $2, resource = $3 WHERE id = $1",
        T::TABLE
    );
    query(&sql)
        .bind(id)
        .bind(row.expiry())
        .bind(&resource)
        .execute(&mut *conn)
        .await
        .map_err(db_error)?;
    Ok(())
}

/// Runs `updater` on the locked row and writes the result.
pub(crate) async fn update<T: Resource>(
    pool: &PgPool,
    id: &str,
    updater: Updater<T>,
) -> StorageResult<T> {
    let mut tx = pool.begin().await.map_err(db_error)?;
    let result = update_locked(&mut tx, id, updater).await;
    finish(tx, result).await
}

async fn update_locked<T: Resource>(
    tx: &mut PgTransaction<'static>,
    id: &str,
    updater: Updater<T>,
) -> StorageResult<T> {
    let current = select_for_update::<T>(tx, id)
        .await?
        .ok_or_else(|| StorageError::not_found(T::KIND, id))?;
    let updated = updater(current)?.into_utc();
    write(tx, id, &updated).await?;
    Ok(updated)
}

/// Commits on success and rolls back on failure.
///
/// A failed rollback replaces the original error with a `Transaction` error
/// that carries both messages.
pub(crate) async fn finish<T>(tx: PgTransaction<'static>, result: StorageResult<T>) -> StorageResult<T> {
    match result {
        Ok(value) => {
            tx.commit()
                .await
                .map_err(|e| StorageError::transaction(format!("failed to commit transaction: {e}")))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, cause = %err, "transaction rollback failed");
                return Err(StorageError::transaction(format!(
                    "failed to rollback transaction: {rollback}; original error: {err}"
                )));
            }
            Err(err)
        }
    }
}

/// Deletes rows of `T` whose expiry is strictly before `now`.
pub(crate) async fn delete_expired<T: Resource>(pool: &PgPool, now: OffsetDateTime) -> StorageResult<u64> {
    let sql = format!("DELETE FROM {} WHERE expiry < $1", T::TABLE);
    let result = query(&sql).bind(now).execute(pool).await.map_err(db_error)?;
    Ok(result.rows_affected())
}
