//! The storage contract every backend implements.

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::StorageResult;
use crate::types::{
    AuthCode, AuthRequest, Client, Connector, DeviceRequest, DeviceToken, GcResult, Keys,
    OfflineSession, Password, RefreshToken,
};

/// Computes the new value of a row from its current value.
///
/// Backends run the updater inside the same transaction that read the row.
/// Returning an error discards the update and the error is surfaced to the
/// caller unchanged.
pub type Updater<T> = Box<dyn FnOnce(T) -> StorageResult<T> + Send>;

/// Persistence for credential state.
///
/// Every backend must behave identically:
///
/// - `create_*` fails with `StorageError::AlreadyExists` when the primary key
///   is taken and leaves the existing row untouched.
/// - `get_*`, `delete_*` and `update_*` fail with `StorageError::NotFound`
///   when the row is absent. A failed update writes nothing.
/// - `update_*` reads, applies the updater and writes within one transaction
///   so concurrent updates of the same row serialize. On success the stored
///   value is returned.
/// - timestamps are written normalized to UTC.
///
/// # Example
///
/// ```ignore
/// use idbroker_storage::{Storage, StorageError};
///
/// async fn consume_code(storage: &dyn Storage, id: &str) -> Result<AuthCode, StorageError> {
///     let code = storage.get_auth_code(id).await?;
///     storage.delete_auth_code(id).await?;
///     Ok(code)
/// }
/// ```
#[async_trait]
pub trait Storage: Send + Sync {
    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;

    /// Releases backend resources.
    async fn close(&self) -> StorageResult<()> {
        Ok(())
    }

    // ==================== Auth requests ====================

    async fn create_auth_request(&self, request: AuthRequest) -> StorageResult<()>;
    async fn get_auth_request(&self, id: &str) -> StorageResult<AuthRequest>;
    async fn update_auth_request(
        &self,
        id: &str,
        updater: Updater<AuthRequest>,
    ) -> StorageResult<AuthRequest>;
    async fn delete_auth_request(&self, id: &str) -> StorageResult<()>;

    // ==================== Auth codes ====================

    async fn create_auth_code(&self, code: AuthCode) -> StorageResult<()>;
    async fn get_auth_code(&self, id: &str) -> StorageResult<AuthCode>;
    async fn delete_auth_code(&self, id: &str) -> StorageResult<()>;

    // ==================== Refresh tokens ====================

    async fn create_refresh_token(&self, token: RefreshToken) -> StorageResult<()>;
    async fn get_refresh_token(&self, id: &str) -> StorageResult<RefreshToken>;
    async fn update_refresh_token(
        &self,
        id: &str,
        updater: Updater<RefreshToken>,
    ) -> StorageResult<RefreshToken>;
    async fn delete_refresh_token(&self, id: &str) -> StorageResult<()>;
    async fn list_refresh_tokens(&self) -> StorageResult<Vec<RefreshToken>>;

    // ==================== Device flow ====================

    /// Device requests are keyed by their user code.
    async fn create_device_request(&self, request: DeviceRequest) -> StorageResult<()>;
    async fn get_device_request(&self, user_code: &str) -> StorageResult<DeviceRequest>;
    async fn delete_device_request(&self, user_code: &str) -> StorageResult<()>;

    /// Device tokens are keyed by their device code.
    async fn create_device_token(&self, token: DeviceToken) -> StorageResult<()>;
    async fn get_device_token(&self, device_code: &str) -> StorageResult<DeviceToken>;
    async fn update_device_token(
        &self,
        device_code: &str,
        updater: Updater<DeviceToken>,
    ) -> StorageResult<DeviceToken>;
    async fn delete_device_token(&self, device_code: &str) -> StorageResult<()>;

    // ==================== Clients ====================

    async fn create_client(&self, client: Client) -> StorageResult<()>;
    async fn get_client(&self, id: &str) -> StorageResult<Client>;
    async fn update_client(&self, id: &str, updater: Updater<Client>) -> StorageResult<Client>;
    async fn delete_client(&self, id: &str) -> StorageResult<()>;
    async fn list_clients(&self) -> StorageResult<Vec<Client>>;

    // ==================== Connectors ====================

    async fn create_connector(&self, connector: Connector) -> StorageResult<()>;
    async fn get_connector(&self, id: &str) -> StorageResult<Connector>;
    async fn update_connector(
        &self,
        id: &str,
        updater: Updater<Connector>,
    ) -> StorageResult<Connector>;
    async fn delete_connector(&self, id: &str) -> StorageResult<()>;
    async fn list_connectors(&self) -> StorageResult<Vec<Connector>>;

    // ==================== Passwords ====================

    /// Passwords are keyed by the lowercased email.
    async fn create_password(&self, password: Password) -> StorageResult<()>;
    async fn get_password(&self, email: &str) -> StorageResult<Password>;
    async fn update_password(
        &self,
        email: &str,
        updater: Updater<Password>,
    ) -> StorageResult<Password>;
    async fn delete_password(&self, email: &str) -> StorageResult<()>;
    async fn list_passwords(&self) -> StorageResult<Vec<Password>>;

    // ==================== Offline sessions ====================

    async fn create_offline_session(&self, session: OfflineSession) -> StorageResult<()>;
    async fn get_offline_session(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> StorageResult<OfflineSession>;
    async fn update_offline_session(
        &self,
        user_id: &str,
        conn_id: &str,
        updater: Updater<OfflineSession>,
    ) -> StorageResult<OfflineSession>;
    async fn delete_offline_session(&self, user_id: &str, conn_id: &str) -> StorageResult<()>;

    // ==================== Keys ====================

    /// Returns the signing keys, `NotFound` before the first rotation.
    async fn get_keys(&self) -> StorageResult<Keys>;

    /// Updates the key singleton under the strictest isolation the backend
    /// offers. When no row exists yet the updater receives `Keys::default()`
    /// and its result is inserted.
    async fn update_keys(&self, updater: Updater<Keys>) -> StorageResult<Keys>;

    // ==================== Garbage collection ====================

    /// Deletes auth requests, auth codes, device requests and device tokens
    /// whose expiry is strictly before `now`.
    ///
    /// Each kind is swept by one backend-side conditional delete. The first
    /// failure stops the sweep and is returned.
    async fn garbage_collect(&self, now: OffsetDateTime) -> StorageResult<GcResult>;
}
