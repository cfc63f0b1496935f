//! In-memory storage backend.
//!
//! All tables live behind a single async mutex, so every updater runs while
//! the lock is held and concurrent updates of the same row serialize. The
//! updater works on a clone; the table is only written when it succeeds.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::Hash;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::Mutex;

use crate::traits::{Storage, Updater};
use crate::types::{
    AuthCode, AuthRequest, Client, Connector, DeviceRequest, DeviceToken, GcResult, IntoUtc, Keys,
    OfflineSession, Password, RefreshToken, kind, utc,
};
use crate::{StorageError, StorageResult};

type SessionKey = (String, String);

#[derive(Default)]
struct Tables {
    auth_requests: HashMap<String, AuthRequest>,
    auth_codes: HashMap<String, AuthCode>,
    refresh_tokens: HashMap<String, RefreshToken>,
    device_requests: HashMap<String, DeviceRequest>,
    device_tokens: HashMap<String, DeviceToken>,
    clients: HashMap<String, Client>,
    connectors: HashMap<String, Connector>,
    passwords: HashMap<String, Password>,
    offline_sessions: HashMap<SessionKey, OfflineSession>,
    keys: Option<Keys>,
}

/// Process-local storage, used for development and tests.
#[derive(Default)]
pub struct MemoryStorage {
    tables: Mutex<Tables>,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

fn insert_new<K, V>(map: &mut HashMap<K, V>, key: K, value: V, kind: &str, id: &str) -> StorageResult<()>
where
    K: Eq + Hash,
    V: IntoUtc,
{
    match map.entry(key) {
        Entry::Occupied(_) => Err(StorageError::already_exists(kind, id)),
        Entry::Vacant(slot) => {
            slot.insert(value.into_utc());
            Ok(())
        }
    }
}

fn fetch<K, Q, V>(map: &HashMap<K, V>, key: &Q, kind: &str, id: &str) -> StorageResult<V>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Eq + Hash + ?Sized,
    V: Clone,
{
    map.get(key)
        .cloned()
        .ok_or_else(|| StorageError::not_found(kind, id))
}

fn remove<K, Q, V>(map: &mut HashMap<K, V>, key: &Q, kind: &str, id: &str) -> StorageResult<()>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Eq + Hash + ?Sized,
{
    map.remove(key)
        .map(|_| ())
        .ok_or_else(|| StorageError::not_found(kind, id))
}

fn apply<K, Q, V>(
    map: &mut HashMap<K, V>,
    key: &Q,
    updater: Updater<V>,
    kind: &str,
    id: &str,
) -> StorageResult<V>
where
    K: Eq + Hash + Borrow<Q>,
    Q: Eq + Hash + ?Sized,
    V: Clone + IntoUtc,
{
    let slot = map
        .get_mut(key)
        .ok_or_else(|| StorageError::not_found(kind, id))?;
    let updated = updater(slot.clone())?.into_utc();
    *slot = updated.clone();
    Ok(updated)
}

/// Removes rows whose expiry is strictly before `now`.
fn sweep<V>(map: &mut HashMap<String, V>, now: OffsetDateTime, expiry: fn(&V) -> OffsetDateTime) -> u64 {
    let before = map.len();
    map.retain(|_, row| expiry(row) >= now);
    (before - map.len()) as u64
}

#[async_trait]
impl Storage for MemoryStorage {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn create_auth_request(&self, request: AuthRequest) -> StorageResult<()> {
        let id = request.id.clone();
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.auth_requests, id.clone(), request, kind::AUTH_REQUEST, &id)
    }

    async fn get_auth_request(&self, id: &str) -> StorageResult<AuthRequest> {
        let tables = self.tables.lock().await;
        fetch(&tables.auth_requests, id, kind::AUTH_REQUEST, id)
    }

    async fn update_auth_request(
        &self,
        id: &str,
        updater: Updater<AuthRequest>,
    ) -> StorageResult<AuthRequest> {
        let mut tables = self.tables.lock().await;
        apply(
            &mut tables.auth_requests,
            id,
            updater,
            kind::AUTH_REQUEST,
            id,
        )
    }

    async fn delete_auth_request(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        remove(&mut tables.auth_requests, id, kind::AUTH_REQUEST, id)
    }

    async fn create_auth_code(&self, code: AuthCode) -> StorageResult<()> {
        let id = code.id.clone();
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.auth_codes, id.clone(), code, kind::AUTH_CODE, &id)
    }

    async fn get_auth_code(&self, id: &str) -> StorageResult<AuthCode> {
        let tables = self.tables.lock().await;
        fetch(&tables.auth_codes, id, kind::AUTH_CODE, id)
    }

    async fn delete_auth_code(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        remove(&mut tables.auth_codes, id, kind::AUTH_CODE, id)
    }

    async fn create_refresh_token(&self, token: RefreshToken) -> StorageResult<()> {
        let id = token.id.clone();
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.refresh_tokens, id.clone(), token, kind::REFRESH_TOKEN, &id)
    }

    async fn get_refresh_token(&self, id: &str) -> StorageResult<RefreshToken> {
        let tables = self.tables.lock().await;
        fetch(&tables.refresh_tokens, id, kind::REFRESH_TOKEN, id)
    }

    async fn update_refresh_token(
        &self,
        id: &str,
        updater: Updater<RefreshToken>,
    ) -> StorageResult<RefreshToken> {
        let mut tables = self.tables.lock().await;
        apply(
            &mut tables.refresh_tokens,
            id,
            updater,
            kind::REFRESH_TOKEN,
            id,
        )
    }

    async fn delete_refresh_token(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        remove(&mut tables.refresh_tokens, id, kind::REFRESH_TOKEN, id)
    }

    async fn list_refresh_tokens(&self) -> StorageResult<Vec<RefreshToken>> {
        let tables = self.tables.lock().await;
        Ok(tables.refresh_tokens.values().cloned().collect())
    }

    async fn create_device_request(&self, request: DeviceRequest) -> StorageResult<()> {
        let id = request.user_code.clone();
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.device_requests, id.clone(), request, kind::DEVICE_REQUEST, &id)
    }

    async fn get_device_request(&self, user_code: &str) -> StorageResult<DeviceRequest> {
        let tables = self.tables.lock().await;
        fetch(&tables.device_requests, user_code, kind::DEVICE_REQUEST, user_code)
    }

    async fn delete_device_request(&self, user_code: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        remove(&mut tables.device_requests, user_code, kind::DEVICE_REQUEST, user_code)
    }

    async fn create_device_token(&self, token: DeviceToken) -> StorageResult<()> {
        let id = token.device_code.clone();
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.device_tokens, id.clone(), token, kind::DEVICE_TOKEN, &id)
    }

    async fn get_device_token(&self, device_code: &str) -> StorageResult<DeviceToken> {
        let tables = self.tables.lock().await;
        fetch(&tables.device_tokens, device_code, kind::DEVICE_TOKEN, device_code)
    }

    async fn update_device_token(
        &self,
        device_code: &str,
        updater: Updater<DeviceToken>,
    ) -> StorageResult<DeviceToken> {
        let mut tables = self.tables.lock().await;
        apply(
            &mut tables.device_tokens,
            device_code,
            updater,
            kind::DEVICE_TOKEN,
            device_code,
        )
    }

    async fn delete_device_token(&self, device_code: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        remove(&mut tables.device_tokens, device_code, kind::DEVICE_TOKEN, device_code)
    }

    async fn create_client(&self, client: Client) -> StorageResult<()> {
        let id = client.id.clone();
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.clients, id.clone(), client, kind::CLIENT, &id)
    }

    async fn get_client(&self, id: &str) -> StorageResult<Client> {
        let tables = self.tables.lock().await;
        fetch(&tables.clients, id, kind::CLIENT, id)
    }

    async fn update_client(&self, id: &str, updater: Updater<Client>) -> StorageResult<Client> {
        let mut tables = self.tables.lock().await;
        apply(&mut tables.clients, id, updater, kind::CLIENT, id)
    }

    async fn delete_client(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        remove(&mut tables.clients, id, kind::CLIENT, id)
    }

    async fn list_clients(&self) -> StorageResult<Vec<Client>> {
        let tables = self.tables.lock().await;
        Ok(tables.clients.values().cloned().collect())
    }

    async fn create_connector(&self, connector: Connector) -> StorageResult<()> {
        let id = connector.id.clone();
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.connectors, id.clone(), connector, kind::CONNECTOR, &id)
    }

    async fn get_connector(&self, id: &str) -> StorageResult<Connector> {
        let tables = self.tables.lock().await;
        fetch(&tables.connectors, id, kind::CONNECTOR, id)
    }

    async fn update_connector(
        &self,
        id: &str,
        updater: Updater<Connector>,
    ) -> StorageResult<Connector> {
        let mut tables = self.tables.lock().await;
        apply(&mut tables.connectors, id, updater, kind::CONNECTOR, id)
    }

    async fn delete_connector(&self, id: &str) -> StorageResult<()> {
        let mut tables = self.tables.lock().await;
        remove(&mut tables.connectors, id, kind::CONNECTOR, id)
    }

    async fn list_connectors(&self) -> StorageResult<Vec<Connector>> {
        let tables = self.tables.lock().await;
        Ok(tables.connectors.values().cloned().collect())
    }

    async fn create_password(&self, password: Password) -> StorageResult<()> {
        let key = Password::key(&password.email);
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.passwords, key.clone(), password, kind::PASSWORD, &key)
    }

    async fn get_password(&self, email: &str) -> StorageResult<Password> {
        let key = Password::key(email);
        let tables = self.tables.lock().await;
        fetch(&tables.passwords, key.as_str(), kind::PASSWORD, &key)
    }

    async fn update_password(
        &self,
        email: &str,
        updater: Updater<Password>,
    ) -> StorageResult<Password> {
        let key = Password::key(email);
        let mut tables = self.tables.lock().await;
        apply(
            &mut tables.passwords,
            key.as_str(),
            updater,
            kind::PASSWORD,
            &key,
        )
    }

    async fn delete_password(&self, email: &str) -> StorageResult<()> {
        let key = Password::key(email);
        let mut tables = self.tables.lock().await;
        remove(&mut tables.passwords, key.as_str(), kind::PASSWORD, &key)
    }

    async fn list_passwords(&self) -> StorageResult<Vec<Password>> {
        let tables = self.tables.lock().await;
        Ok(tables.passwords.values().cloned().collect())
    }

    async fn create_offline_session(&self, session: OfflineSession) -> StorageResult<()> {
        let key = (session.user_id.clone(), session.conn_id.clone());
        let id = format!("{}/{}", session.user_id, session.conn_id);
        let mut tables = self.tables.lock().await;
        insert_new(&mut tables.offline_sessions, key, session, kind::OFFLINE_SESSION, &id)
    }

    async fn get_offline_session(
        &self,
        user_id: &str,
        conn_id: &str,
    ) -> StorageResult<OfflineSession> {
        let key = (user_id.to_string(), conn_id.to_string());
        let tables = self.tables.lock().await;
        fetch(
            &tables.offline_sessions,
            &key,
            kind::OFFLINE_SESSION,
            &format!("{user_id}/{conn_id}"),
        )
    }

    async fn update_offline_session(
        &self,
        user_id: &str,
        conn_id: &str,
        updater: Updater<OfflineSession>,
    ) -> StorageResult<OfflineSession> {
        let key = (user_id.to_string(), conn_id.to_string());
        let mut tables = self.tables.lock().await;
        apply(
            &mut tables.offline_sessions,
            &key,
            updater,
            kind::OFFLINE_SESSION,
            &format!("{user_id}/{conn_id}"),
        )
    }

    async fn delete_offline_session(&self, user_id: &str, conn_id: &str) -> StorageResult<()> {
        let key = (user_id.to_string(), conn_id.to_string());
        let mut tables = self.tables.lock().await;
        remove(
            &mut tables.offline_sessions,
            &key,
            kind::OFFLINE_SESSION,
            &format!("{user_id}/{conn_id}"),
        )
    }

    async fn get_keys(&self) -> StorageResult<Keys> {
        let tables = self.tables.lock().await;
        tables
            .keys
            .clone()
            .ok_or_else(|| StorageError::not_found(kind::KEYS, "keys"))
    }

    async fn update_keys(&self, updater: Updater<Keys>) -> StorageResult<Keys> {
        let mut tables = self.tables.lock().await;
        let current = tables.keys.clone().unwrap_or_default();
        let updated = updater(current)?.into_utc();
        tables.keys = Some(updated.clone());
        Ok(updated)
    }

    async fn garbage_collect(&self, now: OffsetDateTime) -> StorageResult<GcResult> {
        let now = utc(now);
        let mut tables = self.tables.lock().await;
        Ok(GcResult {
            auth_requests: sweep(&mut tables.auth_requests, now, |r| r.expiry),
            auth_codes: sweep(&mut tables.auth_codes, now, |c| c.expiry),
            device_requests: sweep(&mut tables.device_requests, now, |r| r.expiry),
            device_tokens: sweep(&mut tables.device_tokens, now, |t| t.expiry),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use time::Duration;
    use time::macros::{datetime, offset};

    use super::*;
    use crate::types::{Claims, DeviceTokenStatus, PkceChallenge, RefreshTokenRef};

    fn auth_code(id: &str, expiry: OffsetDateTime) -> AuthCode {
        AuthCode {
            id: id.to_string(),
            client_id: "web".into(),
            scopes: vec!["openid".into(), "groups".into()],
            redirect_uri: "https://app.example.com/callback".into(),
            nonce: "n".into(),
            claims: Claims {
                user_id: "1".into(),
                username: "jane".into(),
                preferred_username: "jane".into(),
                email: "jane@example.com".into(),
                email_verified: true,
                groups: vec!["ops".into()],
            },
            pkce: PkceChallenge::default(),
            connector_id: "gitlab".into(),
            connector_data: Vec::new(),
            expiry,
        }
    }

    fn auth_request(id: &str, expiry: OffsetDateTime) -> AuthRequest {
        AuthRequest {
            id: id.to_string(),
            client_id: "web".into(),
            response_types: vec!["code".into()],
            scopes: vec!["openid".into()],
            redirect_uri: "https://app.example.com/callback".into(),
            nonce: String::new(),
            state: "xyz".into(),
            force_approval_prompt: false,
            expiry,
            logged_in: false,
            claims: Claims::default(),
            connector_id: String::new(),
            connector_data: Vec::new(),
            pkce: PkceChallenge::default(),
            hmac_key: Vec::new(),
        }
    }

    fn device_request(code: &str, expiry: OffsetDateTime) -> DeviceRequest {
        DeviceRequest {
            user_code: code.to_string(),
            device_code: format!("dev-{code}"),
            client_id: "tv".into(),
            client_secret: String::new(),
            scopes: vec!["openid".into()],
            expiry,
        }
    }

    fn device_token(code: &str, expiry: OffsetDateTime) -> DeviceToken {
        DeviceToken {
            device_code: code.to_string(),
            status: DeviceTokenStatus::Pending,
            token: String::new(),
            expiry,
            last_request_time: expiry - Duration::minutes(5),
            poll_interval_seconds: 5,
            pkce: PkceChallenge::default(),
        }
    }

    fn refresh_token(id: &str) -> RefreshToken {
        let now = datetime!(2024-05-01 12:00 UTC);
        RefreshToken {
            id: id.to_string(),
            token: "t1".into(),
            obsolete_token: String::new(),
            created_at: now,
            last_used: now,
            client_id: "web".into(),
            scopes: vec!["offline_access".into()],
            nonce: String::new(),
            claims: Claims::default(),
            connector_id: "gitlab".into(),
            connector_data: b"{}".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_create_get_delete() {
        let storage = MemoryStorage::new();
        let code = auth_code("c1", datetime!(2024-05-01 12:00 UTC));

        storage.create_auth_code(code.clone()).await.unwrap();
        assert_eq!(storage.get_auth_code("c1").await.unwrap(), code);

        storage.delete_auth_code("c1").await.unwrap();
        assert!(storage.get_auth_code("c1").await.unwrap_err().is_not_found());
        assert!(storage.delete_auth_code("c1").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_create_collision_keeps_existing_row() {
        let storage = MemoryStorage::new();
        let original = auth_code("c1", datetime!(2024-05-01 12:00 UTC));
        storage.create_auth_code(original.clone()).await.unwrap();

        let mut duplicate = original.clone();
        duplicate.client_id = "other".into();
        let err = storage.create_auth_code(duplicate).await.unwrap_err();

        assert!(err.is_already_exists());
        assert_eq!(storage.get_auth_code("c1").await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_create_normalizes_expiry_to_utc() {
        let storage = MemoryStorage::new();
        let local = datetime!(2024-05-01 14:00 +02:00);
        storage.create_auth_code(auth_code("c1", local)).await.unwrap();

        let stored = storage.get_auth_code("c1").await.unwrap();
        assert_eq!(stored.expiry.offset(), offset!(UTC));
        assert_eq!(stored.expiry, datetime!(2024-05-01 12:00 UTC));
    }

    #[tokio::test]
    async fn test_update_missing_row_is_not_found_and_writes_nothing() {
        let storage = MemoryStorage::new();
        let err = storage
            .update_client("missing", Box::new(|client| Ok(client)))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert!(storage.list_clients().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_update_applies_updater() {
        let storage = MemoryStorage::new();
        storage.create_refresh_token(refresh_token("r1")).await.unwrap();

        let updated = storage
            .update_refresh_token(
                "r1",
                Box::new(|mut token| {
                    token.obsolete_token = std::mem::replace(&mut token.token, "t2".into());
                    Ok(token)
                }),
            )
            .await
            .unwrap();

        assert_eq!(updated.token, "t2");
        assert_eq!(storage.get_refresh_token("r1").await.unwrap(), updated);
    }

    #[tokio::test]
    async fn test_failed_updater_leaves_row_untouched() {
        #[derive(Debug, thiserror::Error)]
        #[error("denied")]
        struct Denied;

        let storage = MemoryStorage::new();
        let original = refresh_token("r1");
        storage.create_refresh_token(original.clone()).await.unwrap();

        let err = storage
            .update_refresh_token(
                "r1",
                Box::new(|mut token| {
                    token.token = "mutated".into();
                    Err(StorageError::aborted(Denied))
                }),
            )
            .await
            .unwrap_err();

        assert!(err.abort_cause::<Denied>().is_some());
        assert_eq!(storage.get_refresh_token("r1").await.unwrap(), original);
    }

    #[tokio::test]
    async fn test_concurrent_updates_serialize() {
        let storage = Arc::new(MemoryStorage::new());
        storage
            .create_client(Client {
                id: "web".into(),
                ..Client::default()
            })
            .await
            .unwrap();

        let mut handles = Vec::new();
        for i in 0..16 {
            let storage = storage.clone();
            handles.push(tokio::spawn(async move {
                storage
                    .update_client(
                        "web",
                        Box::new(move |mut client| {
                            client.redirect_uris.push(format!("https://app/{i}"));
                            Ok(client)
                        }),
                    )
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let client = storage.get_client("web").await.unwrap();
        assert_eq!(client.redirect_uris.len(), 16);
    }

    #[tokio::test]
    async fn test_passwords_are_case_insensitive() {
        let storage = MemoryStorage::new();
        storage
            .create_password(Password {
                email: "Jane@Example.com".into(),
                hash: b"hash".to_vec(),
                username: "jane".into(),
                user_id: "1".into(),
            })
            .await
            .unwrap();

        let password = storage.get_password("jane@example.COM").await.unwrap();
        assert_eq!(password.username, "jane");
        storage.delete_password("JANE@example.com").await.unwrap();
        assert!(storage.list_passwords().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_offline_session_composite_key() {
        let storage = MemoryStorage::new();
        let now = datetime!(2024-05-01 12:00 UTC);
        let mut session = OfflineSession {
            user_id: "1".into(),
            conn_id: "gitlab".into(),
            ..OfflineSession::default()
        };
        session.refresh.insert(
            "web".into(),
            RefreshTokenRef {
                id: "r1".into(),
                client_id: "web".into(),
                created_at: now,
                last_used: now,
            },
        );
        storage.create_offline_session(session.clone()).await.unwrap();

        assert!(
            storage
                .create_offline_session(session.clone())
                .await
                .unwrap_err()
                .is_already_exists()
        );
        assert!(
            storage
                .get_offline_session("1", "google")
                .await
                .unwrap_err()
                .is_not_found()
        );

        let updated = storage
            .update_offline_session(
                "1",
                "gitlab",
                Box::new(|mut session| {
                    session.refresh.remove("web");
                    Ok(session)
                }),
            )
            .await
            .unwrap();
        assert!(updated.refresh.is_empty());

        storage.delete_offline_session("1", "gitlab").await.unwrap();
        assert!(
            storage
                .get_offline_session("1", "gitlab")
                .await
                .unwrap_err()
                .is_not_found()
        );
    }

    #[tokio::test]
    async fn test_keys_first_update_creates_row() {
        let storage = MemoryStorage::new();
        assert!(storage.get_keys().await.unwrap_err().is_not_found());

        let next = datetime!(2024-05-01 18:00 +06:00);
        storage
            .update_keys(Box::new(move |mut keys| {
                assert_eq!(keys, Keys::default());
                keys.next_rotation = next;
                Ok(keys)
            }))
            .await
            .unwrap();

        let keys = storage.get_keys().await.unwrap();
        assert_eq!(keys.next_rotation, next);
        assert_eq!(keys.next_rotation.offset(), offset!(UTC));
    }

    #[tokio::test]
    async fn test_garbage_collect_boundary() {
        let storage = MemoryStorage::new();
        let now = datetime!(2024-05-01 12:00 UTC);

        storage.create_auth_code(auth_code("expired", now - Duration::seconds(1))).await.unwrap();
        storage.create_auth_code(auth_code("boundary", now)).await.unwrap();
        storage.create_auth_code(auth_code("live", now + Duration::hours(1))).await.unwrap();
        storage.create_auth_request(auth_request("a1", now - Duration::minutes(10))).await.unwrap();
        storage.create_device_request(device_request("u1", now - Duration::minutes(1))).await.unwrap();
        storage.create_device_request(device_request("u2", now + Duration::minutes(1))).await.unwrap();
        storage.create_device_token(device_token("d1", now - Duration::minutes(1))).await.unwrap();
        storage.create_refresh_token(refresh_token("r1")).await.unwrap();

        // Same instant expressed in another offset.
        let result = storage
            .garbage_collect(now.to_offset(offset!(-05:00)))
            .await
            .unwrap();

        assert_eq!(
            result,
            GcResult {
                auth_requests: 1,
                auth_codes: 1,
                device_requests: 1,
                device_tokens: 1,
            }
        );
        assert!(storage.get_auth_code("boundary").await.is_ok());
        assert!(storage.get_auth_code("live").await.is_ok());
        assert!(storage.get_device_request("u2").await.is_ok());
        assert!(storage.get_refresh_token("r1").await.is_ok());
    }
}
