//! HTTP transport to hidden-service peers.
//!
//! Tor addresses go through a SOCKS5 proxy with remote name resolution;
//! I2P addresses go through the router's HTTP proxy when one is configured.
//! Every request is bounded by a connect timeout and a total timeout, and
//! every failure is reported as [`Fetched::Unavailable`].

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Proxy};
use tracing::{debug, info};
use veilsync_shared::constants::{MAX_BLOCK_SIZE, PUBLIC_PATH, USER_AGENT};
use veilsync_shared::{AddressKind, PeerAddress};

use crate::action::{Fetched, PeerAction};
use crate::error::NetError;

/// Anything that can carry a [`PeerAction`] to a peer.
///
/// Only a validated [`PeerAddress`] can be passed in, so malformed
/// addresses never reach the network.
pub trait PeerTransport: Send + Sync {
    fn request(
        &self,
        address: &PeerAddress,
        action: &PeerAction,
    ) -> impl Future<Output = Fetched> + Send;
}

#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tor_proxy: String,
    pub i2p_proxy: Option<String>,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tor_proxy: "socks5h://127.0.0.1:9050".to_string(),
            i2p_proxy: None,
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    tor: Client,
    i2p: Option<Client>,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, NetError> {
        if config.connect_timeout >= config.request_timeout {
            return Err(NetError::InvalidTimeouts);
        }

        let tor = build_client(&config.tor_proxy, config)?;
        let i2p = config
            .i2p_proxy
            .as_deref()
            .map(|proxy| build_client(proxy, config))
            .transpose()?;

        info!(
            tor_proxy = %config.tor_proxy,
            i2p_proxy = ?config.i2p_proxy,
            connect_timeout = ?config.connect_timeout,
            request_timeout = ?config.request_timeout,
            "HTTP transport ready"
        );

        Ok(Self { tor, i2p })
    }

    fn client_for(&self, kind: AddressKind) -> Option<&Client> {
        if kind.is_tor() {
            Some(&self.tor)
        } else {
            self.i2p.as_ref()
        }
    }

    async fn fetch(
        &self,
        client: &Client,
        address: &PeerAddress,
        action: &PeerAction,
    ) -> Result<Fetched, reqwest::Error> {
        let url = format!("http://{address}{PUBLIC_PATH}");
        let mut query = vec![("action", action.name())];
        if let Some(data) = action.data() {
            query.push(("data", data));
        }

        let mut response = client.get(&url).query(&query).send().await?;
        if !response.status().is_success() {
            debug!(
                address = %address,
                status = %response.status(),
                "Peer answered with error status"
            );
            return Ok(Fetched::Unavailable);
        }
        if response
            .content_length()
            .is_some_and(|len| len > MAX_BLOCK_SIZE as u64)
        {
            debug!(address = %address, "Peer response exceeds size limit");
            return Ok(Fetched::Unavailable);
        }

        let mut body = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            if body.len() + chunk.len() > MAX_BLOCK_SIZE {
                debug!(address = %address, "Peer response exceeds size limit");
                return Ok(Fetched::Unavailable);
            }
            body.extend_from_slice(&chunk);
        }
        Ok(Fetched::Data(body))
    }
}

impl PeerTransport for HttpTransport {
    async fn request(&self, address: &PeerAddress, action: &PeerAction) -> Fetched {
        let Some(client) = self.client_for(address.kind()) else {
            debug!(address = %address, "No proxy configured for address kind");
            return Fetched::Unavailable;
        };

        match self.fetch(client, address, action).await {
            Ok(fetched) => fetched,
            Err(e) => {
                debug!(
                    address = %address,
                    action = action.name(),
                    error = %e,
                    "Peer request failed"
                );
                Fetched::Unavailable
            }
        }
    }
}

fn build_client(proxy_url: &str, config: &TransportConfig) -> Result<Client, NetError> {
    let proxy = Proxy::all(proxy_url).map_err(|source| NetError::Proxy {
        url: proxy_url.to_string(),
        source,
    })?;
    Client::builder()
        .proxy(proxy)
        .user_agent(USER_AGENT)
        .connect_timeout(config.connect_timeout)
        .timeout(config.request_timeout)
        .build()
        .map_err(NetError::Client)
}
