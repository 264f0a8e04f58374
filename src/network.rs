use crate::provider::{
    self,
    ProviderError,
    WalletProvider,
};
use serde_json::{
    Value,
    json,
};
use std::fmt;
use tracing::{
    info,
    warn,
};

pub const SEPOLIA_CHAIN_ID: u64 = 11_155_111;
pub const HOLESKY_CHAIN_ID: u64 = 17_000;
pub const LOCAL_CHAIN_ID: u64 = 31_337;

pub const DEFAULT_SEPOLIA_RPC_URL: &str = "https://rpc.sepolia.org";
pub const DEFAULT_HOLESKY_RPC_URL: &str = "https://ethereum-holesky-rpc.publicnode.com";
pub const DEFAULT_LOCAL_RPC_URL: &str = "http://127.0.0.1:8545";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Everything `wallet_addEthereumChain` needs to teach a wallet about a chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainDescriptor {
    pub chain_id: u64,
    pub name: String,
    pub rpc_urls: Vec<String>,
    pub native_currency: NativeCurrency,
    pub block_explorer_urls: Vec<String>,
}

impl ChainDescriptor {
    pub fn sepolia() -> Self {
        Self {
            chain_id: SEPOLIA_CHAIN_ID,
            name: "Sepolia Test Network".to_string(),
            rpc_urls: vec![DEFAULT_SEPOLIA_RPC_URL.to_string()],
            native_currency: NativeCurrency {
                name: "Sepolia Ether".to_string(),
                symbol: "SepoliaETH".to_string(),
                decimals: 18,
            },
            block_explorer_urls: vec!["https://sepolia.etherscan.io".to_string()],
        }
    }

    pub fn holesky() -> Self {
        Self {
            chain_id: HOLESKY_CHAIN_ID,
            name: "Holesky Test Network".to_string(),
            rpc_urls: vec![DEFAULT_HOLESKY_RPC_URL.to_string()],
            native_currency: NativeCurrency {
                name: "Holesky Ether".to_string(),
                symbol: "HoleskyETH".to_string(),
                decimals: 18,
            },
            block_explorer_urls: vec!["https://holesky.etherscan.io".to_string()],
        }
    }

    pub fn local() -> Self {
        Self {
            chain_id: LOCAL_CHAIN_ID,
            name: "Local Development Node".to_string(),
            rpc_urls: vec![DEFAULT_LOCAL_RPC_URL.to_string()],
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            block_explorer_urls: Vec::new(),
        }
    }

    pub fn with_rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_urls = vec![url.into()];
        self
    }

    pub fn hex_chain_id(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    pub fn add_chain_params(&self) -> Value {
        let mut params = json!({
            "chainId": self.hex_chain_id(),
            "chainName": self.name,
            "rpcUrls": self.rpc_urls,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
        });
        if !self.block_explorer_urls.is_empty() {
            params["blockExplorerUrls"] = json!(self.block_explorer_urls);
        }
        params
    }
}

impl fmt::Display for ChainDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.chain_id)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum NetworkCheck {
    AlreadyOnChain,
    Switched,
    Added,
    Failed(NetworkFailure),
}

#[derive(Clone, Debug, PartialEq)]
pub enum NetworkFailure {
    ChainIdUnavailable(ProviderError),
    SwitchRejected(ProviderError),
    AddRejected(ProviderError),
}

impl NetworkCheck {
    pub fn is_ready(&self) -> bool {
        !matches!(self, NetworkCheck::Failed(_))
    }
}

impl fmt::Display for NetworkFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFailure::ChainIdUnavailable(e) => write!(f, "could not read chain id: {e}"),
            NetworkFailure::SwitchRejected(e) => write!(f, "chain switch failed: {e}"),
            NetworkFailure::AddRejected(e) => write!(f, "adding the chain failed: {e}"),
        }
    }
}

/// Makes sure the wallet sits on `chain`, switching, or adding when the
/// wallet does not know the chain. Only one add attempt is made.
pub async fn ensure_network<P: WalletProvider>(
    wallet: &P,
    chain: &ChainDescriptor,
) -> NetworkCheck {
    let current = match provider::chain_id(wallet).await {
        Ok(id) => id,
        Err(e) => {
            warn!(error = %e, "failed to read wallet chain id");
            return NetworkCheck::Failed(NetworkFailure::ChainIdUnavailable(e));
        }
    };
    if current == chain.chain_id {
        return NetworkCheck::AlreadyOnChain;
    }

    info!(current, expected = chain.chain_id, "requesting chain switch");
    match provider::switch_chain(wallet, chain.chain_id).await {
        Ok(()) => NetworkCheck::Switched,
        Err(e) if e.is_unrecognized_chain() => {
            info!(chain = %chain, "wallet does not know the chain, requesting add");
            match provider::add_chain(wallet, chain.add_chain_params()).await {
                Ok(()) => NetworkCheck::Added,
                Err(e) => {
                    warn!(error = %e, "chain add declined");
                    NetworkCheck::Failed(NetworkFailure::AddRejected(e))
                }
            }
        }
        Err(e) => {
            warn!(error = %e, "chain switch declined");
            NetworkCheck::Failed(NetworkFailure::SwitchRejected(e))
        }
    }
}
