use std::sync::Arc;
use thiserror::Error;

use crate::endpoint::EndpointRegistry;
use crate::pool::{PoolError, ServicePool};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no wallet service available")]
    Pool(#[from] PoolError),
    #[error("endpoint not found for wallet id")]
    EndpointNotFound,
}

pub struct Dispatcher {
    pool: Arc<ServicePool>,
    endpoints: Arc<EndpointRegistry>,
    public_address: String,
    return_raw_svc_port: bool,
}

impl Dispatcher {
    pub fn new(
        pool: Arc<ServicePool>,
        endpoints: Arc<EndpointRegistry>,
        public_address: String,
        return_raw_svc_port: bool,
    ) -> Self {
        Self { pool, endpoints, public_address, return_raw_svc_port }
    }

    /// Returns the public routing address for `wallet_id`, reusing an
    /// existing endpoint if one is live or dispatching to a fresh service
    /// slot otherwise.
    pub async fn login(&self, wallet_id: &str) -> Result<String, DispatchError> {
        if let Some(existing) = self.endpoints.get(wallet_id).await {
            existing.use_now().await;
            return Ok(existing.public_address.clone());
        }

        let service_index = self.pool.get_next().await?;
        let port = self.pool.port_at(service_index).await.ok_or(PoolError::Empty)?;
        let address = self.format_address(port);
        let endpoint = self.endpoints.add(wallet_id.to_string(), service_index, address).await;
        Ok(endpoint.public_address.clone())
    }

    pub async fn logout(&self, wallet_id: &str) -> Result<(), DispatchError> {
        let endpoint = self.endpoints.get(wallet_id).await.ok_or(DispatchError::EndpointNotFound)?;
        endpoint.logout().await;
        Ok(())
    }

    pub async fn mark_alive(&self, wallet_id: &str) -> Result<(), DispatchError> {
        let endpoint = self.endpoints.get(wallet_id).await.ok_or(DispatchError::EndpointNotFound)?;
        endpoint.mark_alive().await;
        Ok(())
    }

    fn format_address(&self, port: u16) -> String {
        if self.return_raw_svc_port {
            format!("{}:{}", self.public_address, port)
        } else {
            format!("{}?service={}", self.public_address, port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_raw_port() {
        assert_eq!(format_for(true, "wallet.example", 20000), "wallet.example:20000");
        assert_eq!(format_for(false, "wallet.example", 20000), "wallet.example?service=20000");
    }

    fn format_for(raw: bool, base: &str, port: u16) -> String {
        if raw {
            format!("{base}:{port}")
        } else {
            format!("{base}?service={port}")
        }
    }
}
