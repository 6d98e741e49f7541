use serde::{Deserialize, Serialize};

pub const METHOD_LOGIN: &str = "login";
pub const METHOD_LOGOUT: &str = "logout";
pub const METHOD_SUBSCRIBE: &str = "subscribe";
pub const METHOD_UNSUBSCRIBE: &str = "unsubscribe";

#[derive(Debug, Clone, Deserialize)]
pub struct LoginParams {
    #[serde(rename = "WalletID")]
    pub wallet_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginResult {
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutParams {
    #[serde(rename = "WalletID")]
    pub wallet_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubscribeParams {
    #[serde(rename = "SbbsAddress")]
    pub sbbs_address: String,
    #[serde(rename = "SbbsAddressPrivate")]
    pub sbbs_address_private: String,
    #[serde(rename = "NotificationEndpoint")]
    pub notification_endpoint: String,
    #[serde(rename = "ServerKey")]
    pub server_key: String,
    #[serde(rename = "P256dhKey")]
    pub p256dh_key: String,
    #[serde(rename = "AuthKey")]
    pub auth_key: String,
    #[serde(rename = "ExpiresAt")]
    pub expires_at: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UnsubscribeParams {
    #[serde(rename = "SbbsAddress")]
    pub sbbs_address: String,
    #[serde(rename = "SbbsAddressPrivate")]
    pub sbbs_address_private: String,
    #[serde(rename = "NotificationEndpoint")]
    pub notification_endpoint: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct UnsubResult {
    #[serde(rename = "Unsubscribe")]
    pub unsubscribe: bool,
}

/// Event delivered by the SBBS child when a message lands for an address.
#[derive(Debug, Clone, Deserialize)]
pub struct NewMessageParams {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "Data")]
    pub data: String,
}
