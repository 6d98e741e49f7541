use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use balancer_protocol::methods::{SubscribeParams, UnsubscribeParams};

/// Reserved key holding the server's current VAPID public key, used to
/// fail-closed if the store was created under a different key than the one
/// the process is currently configured with.
const SERVER_KEY: &str = "ServerKey";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Db(#[from] sled::Error),
    #[error("stored VAPID public key does not match configuration")]
    ServerKeyMismatch,
    #[error("subscription not found")]
    NotFound,
    #[error("private key does not match stored subscription")]
    Unauthorized,
    #[error("subscription is malformed: {0}")]
    Corrupt(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Subscription {
    pub sbbs_address: String,
    pub sbbs_address_private: String,
    pub notification_endpoint: String,
    pub p256dh_key: String,
    pub auth_key: String,
    pub expires_at: i64,
}

pub struct SubscriptionStore {
    db: sled::Db,
}

fn subscription_key(sbbs_address: &str, notification_endpoint: &str) -> Vec<u8> {
    format!("{sbbs_address}-{notification_endpoint}").into_bytes()
}

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO).as_secs() as i64
}

impl SubscriptionStore {
    /// Opens (or creates) the store at `path`. If a `ServerKey` entry
    /// already exists it must match `vapid_public`; a fresh store writes it.
    pub fn open(path: &str, vapid_public: &str) -> Result<Self, StoreError> {
        let db = sled::open(path)?;
        match db.get(SERVER_KEY)? {
            Some(existing) if existing.as_ref() != vapid_public.as_bytes() => {
                return Err(StoreError::ServerKeyMismatch);
            }
            Some(_) => {}
            None => {
                db.insert(SERVER_KEY, vapid_public.as_bytes())?;
            }
        }
        Ok(Self { db })
    }

    pub fn put(&self, params: &SubscribeParams) -> Result<(), StoreError> {
        let sub = Subscription {
            sbbs_address: params.sbbs_address.clone(),
            sbbs_address_private: params.sbbs_address_private.clone(),
            notification_endpoint: params.notification_endpoint.clone(),
            p256dh_key: params.p256dh_key.clone(),
            auth_key: params.auth_key.clone(),
            expires_at: params.expires_at,
        };
        let key = subscription_key(&params.sbbs_address, &params.notification_endpoint);
        let value = serde_json::to_vec(&sub)?;
        self.db.insert(key, value)?;
        Ok(())
    }

    pub fn delete(&self, params: &UnsubscribeParams) -> Result<(), StoreError> {
        let key = subscription_key(&params.sbbs_address, &params.notification_endpoint);
        let existing = self.db.get(&key)?.ok_or(StoreError::NotFound)?;
        let sub: Subscription = serde_json::from_slice(&existing)?;
        if sub.sbbs_address_private != params.sbbs_address_private {
            return Err(StoreError::Unauthorized);
        }
        self.db.remove(&key)?;
        Ok(())
    }

    pub fn remove_key(&self, sbbs_address: &str, notification_endpoint: &str) -> Result<(), StoreError> {
        self.db.remove(subscription_key(sbbs_address, notification_endpoint))?;
        Ok(())
    }

    /// Iterates every subscription, skipping the reserved server-key entry.
    pub fn for_all(&self) -> impl Iterator<Item = Subscription> + '_ {
        self.db.iter().filter_map(|entry| {
            let (key, value) = entry.ok()?;
            if key.as_ref() == SERVER_KEY.as_bytes() {
                return None;
            }
            serde_json::from_slice(&value).ok()
        })
    }

    /// Iterates subscriptions whose key starts with `sbbs_address-`.
    pub fn for_prefix(&self, sbbs_address: &str) -> impl Iterator<Item = Subscription> + '_ {
        let prefix = format!("{sbbs_address}-");
        self.db.scan_prefix(prefix.into_bytes()).filter_map(|entry| {
            let (_, value) = entry.ok()?;
            serde_json::from_slice(&value).ok()
        })
    }

    /// Removes every subscription whose `expires_at` has passed. Runs
    /// periodically in place of the original's value-log GC pass; this
    /// embedded store has no equivalent compaction primitive, so the same
    /// external effect (bounded disk growth) is achieved with an explicit
    /// sweep instead.
    pub fn sweep_expired(&self) -> usize {
        let now = now_secs();
        let mut removed = 0;
        for entry in self.db.iter().flatten() {
            let (key, value) = entry;
            if key.as_ref() == SERVER_KEY.as_bytes() {
                continue;
            }
            if let Ok(sub) = serde_json::from_slice::<Subscription>(&value) {
                if sub.expires_at <= now {
                    if self.db.remove(&key).is_ok() {
                        removed += 1;
                    }
                }
            }
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn subscribe_params(addr: &str, endpoint: &str, expires_at: i64) -> SubscribeParams {
        SubscribeParams {
            sbbs_address: addr.to_string(),
            sbbs_address_private: "priv".to_string(),
            notification_endpoint: endpoint.to_string(),
            server_key: "vapidpub".to_string(),
            p256dh_key: "p256dh".to_string(),
            auth_key: "auth".to_string(),
            expires_at,
        }
    }

    #[test]
    fn put_then_for_prefix_round_trips() {
        let dir = tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path().to_str().unwrap(), "vapidpub").unwrap();
        store.put(&subscribe_params("addr1", "https://push/x", now_secs() + 3600)).unwrap();
        let found: Vec<_> = store.for_prefix("addr1").collect();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].notification_endpoint, "https://push/x");
    }

    #[test]
    fn server_key_mismatch_fails_closed() {
        let dir = tempdir().unwrap();
        {
            let _store = SubscriptionStore::open(dir.path().to_str().unwrap(), "vapidpub").unwrap();
        }
        let reopened = SubscriptionStore::open(dir.path().to_str().unwrap(), "different-key");
        assert!(matches!(reopened, Err(StoreError::ServerKeyMismatch)));
    }

    #[test]
    fn delete_rejects_wrong_private_key() {
        let dir = tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path().to_str().unwrap(), "vapidpub").unwrap();
        store.put(&subscribe_params("addr1", "https://push/x", now_secs() + 3600)).unwrap();
        let bad_unsub = UnsubscribeParams {
            sbbs_address: "addr1".to_string(),
            sbbs_address_private: "wrong".to_string(),
            notification_endpoint: "https://push/x".to_string(),
        };
        assert!(matches!(store.delete(&bad_unsub), Err(StoreError::Unauthorized)));
    }

    #[test]
    fn sweep_expired_removes_past_entries() {
        let dir = tempdir().unwrap();
        let store = SubscriptionStore::open(dir.path().to_str().unwrap(), "vapidpub").unwrap();
        store.put(&subscribe_params("addr1", "https://push/x", now_secs() - 10)).unwrap();
        store.put(&subscribe_params("addr1", "https://push/y", now_secs() + 3600)).unwrap();
        let removed = store.sweep_expired();
        assert_eq!(removed, 1);
        assert_eq!(store.for_prefix("addr1").count(), 1);
    }
}
