use thiserror::Error;
use web_push::{
    ContentEncoding, SubscriptionInfo, SubscriptionKeys, VapidSignatureBuilder, WebPushClient,
    WebPushMessageBuilder, IsahcWebPushClient,
};

use crate::store::Subscription;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("subscription is gone (404)")]
    Gone,
    #[error("push send failed: {0}")]
    Other(#[from] web_push::WebPushError),
}

pub struct PushSender {
    client: IsahcWebPushClient,
    vapid_public: String,
    vapid_private: String,
    contact_mail: String,
}

impl PushSender {
    pub fn new(vapid_public: String, vapid_private: String, contact_mail: String) -> Self {
        Self { client: IsahcWebPushClient::new().expect("failed to build http client"), vapid_public, vapid_private, contact_mail }
    }

    /// Sends `data` to a single subscription. A 404 response is surfaced as
    /// `PushError::Gone` so the caller can prune the dead subscription;
    /// every other failure is the caller's to log-and-ignore.
    pub async fn send(&self, sub: &Subscription, data: &[u8]) -> Result<(), PushError> {
        let subscription_info = SubscriptionInfo {
            endpoint: sub.notification_endpoint.clone(),
            keys: SubscriptionKeys { p256dh: sub.p256dh_key.clone(), auth: sub.auth_key.clone() },
        };

        let mut sig_builder = VapidSignatureBuilder::from_base64(
            &self.vapid_private,
            web_push::URL_SAFE_NO_PAD,
            &subscription_info,
        )?;
        sig_builder.add_claim("sub", self.contact_mail.clone());
        let signature = sig_builder.build()?;

        let mut builder = WebPushMessageBuilder::new(&subscription_info);
        builder.set_payload(ContentEncoding::Aes128Gcm, data);
        builder.set_vapid_signature(signature);

        let ttl = (sub.expires_at - now_secs()).max(0) as u32;
        builder.set_ttl(ttl);

        let message = builder.build()?;

        match self.client.send(message).await {
            Ok(()) => Ok(()),
            Err(web_push::WebPushError::NotFound) => Err(PushError::Gone),
            Err(web_push::WebPushError::EndpointNotValid) => Err(PushError::Gone),
            Err(e) => Err(PushError::Other(e)),
        }
    }

    pub fn vapid_public(&self) -> &str {
        &self.vapid_public
    }
}

fn now_secs() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}
