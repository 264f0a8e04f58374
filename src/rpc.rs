use crate::provider::{
    self,
    AccountsChangedHandler,
    AccountsChangedHub,
    ProviderError,
    RequestArguments,
    RpcError,
    Subscription,
    WalletProvider,
};
use alloy_primitives::Address;
use color_eyre::eyre::{
    Result,
    WrapErr,
};
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::Value;
use std::{
    sync::{
        Arc,
        atomic::{
            AtomicU64,
            Ordering,
        },
    },
    time::Duration,
};
use tokio::{
    task::JoinHandle,
    time,
};
use tracing::{
    debug,
    info,
    warn,
};

pub const DEFAULT_WALLET_URL: &str = "http://127.0.0.1:1248";
pub const DEFAULT_ACCOUNT_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// A wallet reachable over JSON-RPC on HTTP, such as a desktop wallet's local endpoint.
#[derive(Debug)]
pub struct HttpWalletProvider {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
    accounts_changed: AccountsChangedHub,
}

#[derive(Serialize)]
struct RpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<RpcError>,
}

impl HttpWalletProvider {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let url = url.into().trim_end_matches('/').to_string();
        let http = reqwest::Client::builder()
            .build()
            .wrap_err("failed to build HTTP client for wallet endpoint")?;
        Ok(Self {
            url,
            http,
            next_id: AtomicU64::new(1),
            accounts_changed: AccountsChangedHub::new(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Connects to `url` and returns `None` when nothing answers there,
    /// which the controllers treat as "no wallet installed".
    pub async fn detect(url: impl Into<String>) -> Result<Option<Self>> {
        let wallet = Self::new(url)?;
        match provider::chain_id(&wallet).await {
            Ok(chain_id) => {
                info!(url = %wallet.url, chain_id, "wallet endpoint detected");
                Ok(Some(wallet))
            }
            Err(err) => {
                warn!(url = %wallet.url, error = %err, "no wallet endpoint reachable");
                Ok(None)
            }
        }
    }

    /// Polls `eth_accounts` and emits `accountsChanged` whenever the list differs
    /// from the previous poll. The first successful poll only sets the baseline.
    pub fn watch_accounts(self: &Arc<Self>, poll_interval: Duration) -> JoinHandle<()> {
        let wallet = Arc::clone(self);
        tokio::spawn(async move {
            let mut last: Option<Vec<Address>> = None;
            let mut ticker = time::interval(poll_interval);
            loop {
                ticker.tick().await;
                match provider::accounts(wallet.as_ref()).await {
                    Ok(current) => {
                        if let Some(changed) = accounts_change(&mut last, current) {
                            debug!(count = changed.len(), "accounts changed");
                            wallet.accounts_changed.emit(&changed);
                        }
                    }
                    Err(err) => warn!(error = %err, "account poll failed"),
                }
            }
        })
    }

    async fn send(&self, args: RequestArguments) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = RpcRequest {
            jsonrpc: "2.0",
            id,
            method: &args.method,
            params: args.params.unwrap_or_else(|| Value::Array(Vec::new())),
        };
        let res = self
            .http
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let status = res.status();
        let bytes = res
            .bytes()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;
        let parsed: RpcResponse = serde_json::from_slice(&bytes).map_err(|e| {
            if status.is_success() {
                ProviderError::InvalidResponse(format!("{}: {e}", args.method))
            } else {
                ProviderError::Transport(format!(
                    "wallet responded with {status}: {}",
                    String::from_utf8_lossy(&bytes)
                ))
            }
        })?;
        match parsed.error {
            Some(err) => {
                debug!(method = %args.method, code = err.code, "wallet request rejected");
                Err(ProviderError::Rpc(err))
            }
            None => Ok(parsed.result),
        }
    }
}

/// Records `current` as the latest poll and returns it when it differs from
/// the previous one. The first poll only sets the baseline.
pub fn accounts_change(
    last: &mut Option<Vec<Address>>,
    current: Vec<Address>,
) -> Option<Vec<Address>> {
    let changed = last.as_ref().is_some_and(|previous| *previous != current);
    let emitted = changed.then(|| current.clone());
    *last = Some(current);
    emitted
}

impl WalletProvider for HttpWalletProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value, ProviderError> {
        self.send(args).await
    }

    fn on_accounts_changed(&self, handler: AccountsChangedHandler) -> Subscription {
        self.accounts_changed.subscribe(handler)
    }
}
