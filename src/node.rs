//! Node Connection
//!
//! Production `LedgerClient`: a websocket for the pending-transaction subscription and
//! a rotating set of JSON-RPC endpoints for transaction lookups.

use alloy::primitives::TxHash;
use alloy::rpc::client::{ClientBuilder, RpcClient};
use alloy::transports::http::Http;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::config::ConnectionConfig;
use crate::ledger::{LedgerClient, LedgerError, RawTransaction, StreamConnection, TxLookup};

const GET_TRANSACTION_BY_HASH: &str = "eth_getTransactionByHash";

/// Websocket subscription plus HTTP lookups with endpoint failover
pub struct NodeClient {
    ws_url: String,
    rpc: Vec<RpcEndpoint>,
    /// Endpoint tried first on the next lookup
    current: AtomicUsize,
    connect_timeout: Duration,
    lookup_timeout: Duration,
}

struct RpcEndpoint {
    url: String,
    client: RpcClient<Http<reqwest::Client>>,
}

impl NodeClient {
    pub fn new(config: &ConnectionConfig) -> Result<Self, LedgerError> {
        let rpc = config
            .rpc_urls
            .iter()
            .map(|url| {
                let parsed: reqwest::Url = url
                    .parse()
                    .map_err(|e| LedgerError::ConnectionFailed(format!("invalid RPC URL {}: {}", url, e)))?;
                Ok(RpcEndpoint {
                    url: url.clone(),
                    client: ClientBuilder::default().http(parsed),
                })
            })
            .collect::<Result<Vec<_>, LedgerError>>()?;

        if rpc.is_empty() {
            return Err(LedgerError::ConnectionFailed("no RPC endpoints configured".to_string()));
        }

        Ok(Self {
            ws_url: config.ws_url.clone(),
            rpc,
            current: AtomicUsize::new(0),
            connect_timeout: config.connect_timeout(),
            lookup_timeout: config.lookup_timeout(),
        })
    }

    pub fn ws_url(&self) -> &str {
        &self.ws_url
    }

    /// URL of the endpoint the next lookup starts with
    pub fn active_rpc_url(&self) -> &str {
        let index = self.current.load(Ordering::Relaxed) % self.rpc.len();
        &self.rpc[index].url
    }

    async fn lookup_at(&self, endpoint: &RpcEndpoint, hash: TxHash) -> Result<Option<RawTransaction>, LedgerError> {
        let call = endpoint.client.request(GET_TRANSACTION_BY_HASH, (hash,));
        match tokio::time::timeout(self.lookup_timeout, call).await {
            Ok(Ok(tx)) => Ok(tx),
            Ok(Err(e)) => Err(LedgerError::Lookup(e.to_string())),
            Err(_) => Err(LedgerError::Timeout(self.lookup_timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl LedgerClient for NodeClient {
    async fn connect(&self) -> Result<Box<dyn StreamConnection>, LedgerError> {
        info!("Connecting to {}", self.ws_url);

        let (stream, _response) = tokio::time::timeout(self.connect_timeout, connect_async(self.ws_url.as_str()))
            .await
            .map_err(|_| LedgerError::Timeout(self.connect_timeout.as_millis() as u64))?
            .map_err(|e| LedgerError::ConnectionFailed(e.to_string()))?;

        Ok(Box::new(WsStream { inner: stream }))
    }

    async fn fetch_transaction(&self, hash: TxHash) -> Result<TxLookup, LedgerError> {
        let start = self.current.load(Ordering::Relaxed);
        let mut last_error = None;

        for offset in 0..self.rpc.len() {
            let index = (start + offset) % self.rpc.len();
            let endpoint = &self.rpc[index];

            match self.lookup_at(endpoint, hash).await {
                Ok(Some(tx)) => return Ok(TxLookup::Found(tx)),
                Ok(None) => return Ok(TxLookup::NotFound),
                Err(e) => {
                    let next = (index + 1) % self.rpc.len();
                    warn!(endpoint = %endpoint.url, error = %e, "RPC lookup failed, rotating endpoint");
                    self.current.store(next, Ordering::Relaxed);
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| LedgerError::Lookup("no RPC endpoints".to_string())))
    }
}

/// Websocket stream carrying JSON-RPC text frames
pub struct WsStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamConnection for WsStream {
    async fn send_text(&mut self, text: String) -> Result<(), LedgerError> {
        self.inner
            .send(Message::Text(text))
            .await
            .map_err(|e| LedgerError::Transport(e.to_string()))
    }

    async fn next_text(&mut self) -> Option<Result<String, LedgerError>> {
        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text)),
                Ok(Message::Binary(data)) => match String::from_utf8(data) {
                    Ok(text) => return Some(Ok(text)),
                    Err(e) => warn!(bytes = e.as_bytes().len(), "Skipping non-UTF-8 binary frame"),
                },
                // tungstenite queues the pong reply itself
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => {}
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Remote closed websocket");
                    return None;
                }
                Err(e) => return Some(Err(LedgerError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) -> Result<(), LedgerError> {
        match self.inner.close(None).await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(LedgerError::Transport(e.to_string())),
        }
    }
}
