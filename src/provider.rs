//! Wallet provider boundary.
//!
//! Everything the client knows about accounts, chains and signing goes
//! through [`WalletProvider::request`], the same `request({ method, params })`
//! shape browser wallets expose. Account changes are pushed to subscribers
//! registered on an [`AccountsChangedHub`].

use alloy_primitives::Address;
use serde::{
    Deserialize,
    Serialize,
};
use serde_json::{
    Value,
    json,
};
use std::{
    fmt,
    sync::{
        Arc,
        Mutex,
        Weak,
    },
};

/// The user rejected the request in the wallet.
pub const USER_REJECTED_REQUEST: i64 = 4001;
/// The wallet does not know the requested chain and needs `wallet_addEthereumChain`.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

pub trait WalletProvider {
    fn request(
        &self,
        args: RequestArguments,
    ) -> impl Future<Output = Result<Value, ProviderError>> + Send;

    fn on_accounts_changed(&self, handler: AccountsChangedHandler) -> Subscription;
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RequestArguments {
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl RequestArguments {
    pub fn new(method: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl RpcError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == USER_REJECTED_REQUEST
    }

    /// Mobile wallets wrap the 4902 code as `data.originalError.code`.
    pub fn is_unrecognized_chain(&self) -> bool {
        if self.code == UNRECOGNIZED_CHAIN {
            return true;
        }
        self.data
            .as_ref()
            .and_then(|data| data.pointer("/originalError/code"))
            .and_then(Value::as_i64)
            == Some(UNRECOGNIZED_CHAIN)
    }
}

impl fmt::Display for RpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum ProviderError {
    #[error("wallet returned an error: {0}")]
    Rpc(RpcError),
    #[error("wallet transport failed: {0}")]
    Transport(String),
    #[error("unexpected wallet response: {0}")]
    InvalidResponse(String),
}

impl ProviderError {
    pub fn rpc(&self) -> Option<&RpcError> {
        match self {
            ProviderError::Rpc(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.rpc().is_some_and(RpcError::is_user_rejection)
    }

    pub fn is_unrecognized_chain(&self) -> bool {
        self.rpc().is_some_and(RpcError::is_unrecognized_chain)
    }
}

impl From<RpcError> for ProviderError {
    fn from(err: RpcError) -> Self {
        ProviderError::Rpc(err)
    }
}

pub type AccountsChangedHandler = Arc<dyn Fn(&[Address]) + Send + Sync>;

#[derive(Default)]
struct HubInner {
    next_id: u64,
    handlers: Vec<(u64, AccountsChangedHandler)>,
}

/// Fan-out point for `accountsChanged` notifications.
#[derive(Clone, Default)]
pub struct AccountsChangedHub {
    inner: Arc<Mutex<HubInner>>,
}

impl AccountsChangedHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, handler: AccountsChangedHandler) -> Subscription {
        let mut inner = lock(&self.inner);
        let id = inner.next_id;
        inner.next_id += 1;
        inner.handlers.push((id, handler));
        Subscription {
            id,
            hub: Arc::downgrade(&self.inner),
        }
    }

    /// Invokes every registered handler synchronously, in registration order.
    pub fn emit(&self, accounts: &[Address]) {
        let handlers: Vec<AccountsChangedHandler> = lock(&self.inner)
            .handlers
            .iter()
            .map(|(_, handler)| handler.clone())
            .collect();
        for handler in handlers {
            handler(accounts);
        }
    }

    pub fn listener_count(&self) -> usize {
        lock(&self.inner).handlers.len()
    }
}

impl fmt::Debug for AccountsChangedHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountsChangedHub")
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Registration of one handler. Dropping it removes exactly that handler.
#[must_use = "dropping a Subscription unregisters its handler"]
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    hub: Weak<Mutex<HubInner>>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(inner) = self.hub.upgrade() {
            lock(&inner).handlers.retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock(inner: &Mutex<HubInner>) -> std::sync::MutexGuard<'_, HubInner> {
    inner
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub async fn request_accounts<P: WalletProvider>(
    provider: &P,
) -> Result<Vec<Address>, ProviderError> {
    let value = provider
        .request(RequestArguments::new("eth_requestAccounts"))
        .await?;
    parse_accounts(value)
}

pub async fn accounts<P: WalletProvider>(
    provider: &P,
) -> Result<Vec<Address>, ProviderError> {
    let value = provider
        .request(RequestArguments::new("eth_accounts"))
        .await?;
    parse_accounts(value)
}

pub async fn chain_id<P: WalletProvider>(provider: &P) -> Result<u64, ProviderError> {
    let value = provider
        .request(RequestArguments::new("eth_chainId"))
        .await?;
    parse_quantity(&value)
}

pub async fn switch_chain<P: WalletProvider>(
    provider: &P,
    chain_id: u64,
) -> Result<(), ProviderError> {
    provider
        .request(
            RequestArguments::new("wallet_switchEthereumChain")
                .with_params(json!([{ "chainId": format!("{chain_id:#x}") }])),
        )
        .await?;
    Ok(())
}

pub async fn add_chain<P: WalletProvider>(
    provider: &P,
    descriptor: Value,
) -> Result<(), ProviderError> {
    provider
        .request(RequestArguments::new("wallet_addEthereumChain").with_params(json!([descriptor])))
        .await?;
    Ok(())
}

pub async fn request_permissions<P: WalletProvider>(
    provider: &P,
) -> Result<(), ProviderError> {
    provider
        .request(
            RequestArguments::new("wallet_requestPermissions")
                .with_params(json!([{ "eth_accounts": {} }])),
        )
        .await?;
    Ok(())
}

pub fn parse_accounts(value: Value) -> Result<Vec<Address>, ProviderError> {
    serde_json::from_value(value)
        .map_err(|e| ProviderError::InvalidResponse(format!("account list: {e}")))
}

/// Quantities come back as `0x` hex strings; some wallets answer with plain numbers.
pub fn parse_quantity(value: &Value) -> Result<u64, ProviderError> {
    match value {
        Value::String(raw) => {
            let digits = raw
                .strip_prefix("0x")
                .or_else(|| raw.strip_prefix("0X"))
                .ok_or_else(|| {
                    ProviderError::InvalidResponse(format!("quantity without 0x prefix: {raw}"))
                })?;
            u64::from_str_radix(digits, 16).map_err(|e| {
                ProviderError::InvalidResponse(format!("bad hex quantity {raw}: {e}"))
            })
        }
        Value::Number(n) => n.as_u64().ok_or_else(|| {
            ProviderError::InvalidResponse(format!("quantity out of range: {n}"))
        }),
        other => Err(ProviderError::InvalidResponse(format!(
            "expected quantity, got {other}"
        ))),
    }
}
