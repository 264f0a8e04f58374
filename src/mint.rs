//! Certificate claim flow: network check, `mint()` submission, confirmation.

use crate::{
    contract::{
        CertificateContract,
        ContractError,
    },
    network::{
        ChainDescriptor,
        NetworkCheck,
        ensure_network,
    },
    provider::WalletProvider,
};
use alloy_primitives::{
    Address,
    B256,
    U256,
};
use std::sync::Arc;
use tracing::{
    error,
    info,
    warn,
};

/// Text a contract or wallet uses when the caller already holds a certificate.
pub const ALREADY_MINTED_MARKER: &str = "already minted";

pub const STATUS_CONNECT_FIRST: &str = "🦊 Connect your wallet first";
pub const STATUS_CHECKING_NETWORK: &str = "🔗 Checking network...";
pub const STATUS_SUBMITTING: &str = "📝 Confirm the transaction in your wallet...";
pub const STATUS_CONFIRMING: &str = "⌛ Minting NFT...";
pub const STATUS_SUCCESS: &str = "🎉 NFT Certificate Redeemed!";
pub const STATUS_ALREADY_MINTED: &str = "⚠️ You have already claimed this certificate";
pub const STATUS_FAILED: &str = "❌ Minting failed, please try again";

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum MintPhase {
    #[default]
    Idle,
    NetworkCheck,
    Submitting,
    Confirming,
    Success,
    AlreadyMinted,
    Failed,
}

impl MintPhase {
    pub fn in_flight(self) -> bool {
        matches!(
            self,
            MintPhase::NetworkCheck | MintPhase::Submitting | MintPhase::Confirming
        )
    }

    pub fn status_message(self) -> &'static str {
        match self {
            MintPhase::Idle => "",
            MintPhase::NetworkCheck => STATUS_CHECKING_NETWORK,
            MintPhase::Submitting => STATUS_SUBMITTING,
            MintPhase::Confirming => STATUS_CONFIRMING,
            MintPhase::Success => STATUS_SUCCESS,
            MintPhase::AlreadyMinted => STATUS_ALREADY_MINTED,
            MintPhase::Failed => STATUS_FAILED,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum MintOutcome {
    Minted {
        tx: B256,
        token_id: Option<U256>,
    },
    AlreadyMinted,
    NotConnected,
    WrongNetwork(NetworkCheck),
    Failed(String),
    /// Another attempt was still running; nothing was submitted.
    Busy,
}

impl MintOutcome {
    pub fn status_message(&self, chain: &ChainDescriptor) -> String {
        match self {
            MintOutcome::Minted { .. } => STATUS_SUCCESS.to_string(),
            MintOutcome::AlreadyMinted => STATUS_ALREADY_MINTED.to_string(),
            MintOutcome::NotConnected => STATUS_CONNECT_FIRST.to_string(),
            MintOutcome::WrongNetwork(_) => {
                format!("❌ Please switch your wallet to {} to mint", chain.name)
            }
            MintOutcome::Failed(_) => STATUS_FAILED.to_string(),
            MintOutcome::Busy => STATUS_CONFIRMING.to_string(),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MintErrorKind {
    AlreadyMinted,
    Other,
}

/// Prefers the decoded revert reason; falls back to the error text only when
/// the wallet gave no structured payload.
pub fn classify_mint_error(err: &ContractError) -> MintErrorKind {
    let text = match err.revert_reason() {
        Some(reason) => reason,
        None => err.to_string(),
    };
    if text.to_lowercase().contains(ALREADY_MINTED_MARKER) {
        MintErrorKind::AlreadyMinted
    } else {
        MintErrorKind::Other
    }
}

/// Result of one [`MintJob`], tagged with the attempt it belongs to.
#[derive(Clone, Debug, PartialEq)]
pub struct MintReport {
    pub attempt: u64,
    pub outcome: MintOutcome,
}

/// The network check, submission and confirmation of one claim. Owns
/// everything it needs so it can run on its own task.
#[derive(Debug)]
pub struct MintJob<P, C> {
    attempt: u64,
    wallet: Arc<P>,
    contract: Arc<C>,
    chain: ChainDescriptor,
    account: Address,
}

impl<P: WalletProvider, C: CertificateContract> MintJob<P, C> {
    pub fn attempt(&self) -> u64 {
        self.attempt
    }

    /// `on_phase` sees every transition after `NetworkCheck`, in order.
    pub async fn run(self, mut on_phase: impl FnMut(MintPhase)) -> MintReport {
        let outcome = self.submit(&mut on_phase).await;
        MintReport {
            attempt: self.attempt,
            outcome,
        }
    }

    async fn submit(&self, on_phase: &mut impl FnMut(MintPhase)) -> MintOutcome {
        let check = ensure_network(self.wallet.as_ref(), &self.chain).await;
        if !check.is_ready() {
            warn!(chain = %self.chain, ?check, "mint blocked by network check");
            return MintOutcome::WrongNetwork(check);
        }

        on_phase(MintPhase::Submitting);
        let tx = match self.contract.mint(self.account).await {
            Ok(tx) => tx,
            Err(err) => return classify_failure(err),
        };

        on_phase(MintPhase::Confirming);
        let receipt = match self.contract.wait_for_receipt(tx).await {
            Ok(receipt) => receipt,
            Err(err) => return classify_failure(err),
        };

        let account = self.account;
        let token_id = receipt
            .transfer_events()
            .into_iter()
            .find(|event| event.to == account)
            .map(|event| event.token_id);
        match token_id {
            Some(id) => info!(%tx, %account, token_id = %id, "certificate minted"),
            None => info!(%tx, %account, "certificate minted, no transfer log found"),
        }
        MintOutcome::Minted { tx, token_id }
    }
}

fn classify_failure(err: ContractError) -> MintOutcome {
    match classify_mint_error(&err) {
        MintErrorKind::AlreadyMinted => {
            info!(error = %err, "certificate already minted for this account");
            MintOutcome::AlreadyMinted
        }
        MintErrorKind::Other => {
            error!(error = %err, "mint failed");
            MintOutcome::Failed(err.to_string())
        }
    }
}

#[derive(Debug)]
pub struct MintFlow<P, C> {
    provider: Option<Arc<P>>,
    contract: Arc<C>,
    chain: ChainDescriptor,
    phase: MintPhase,
    attempt: u64,
    last_token_id: Option<U256>,
}

impl<P: WalletProvider, C: CertificateContract> MintFlow<P, C> {
    pub fn new(provider: Option<Arc<P>>, contract: Arc<C>, chain: ChainDescriptor) -> Self {
        Self {
            provider,
            contract,
            chain,
            phase: MintPhase::Idle,
            attempt: 0,
            last_token_id: None,
        }
    }

    pub fn phase(&self) -> MintPhase {
        self.phase
    }

    pub fn chain(&self) -> &ChainDescriptor {
        &self.chain
    }

    pub fn last_token_id(&self) -> Option<U256> {
        self.last_token_id
    }

    /// Network check on its own, for surfacing a wrong network right after
    /// connecting. `None` without a wallet.
    pub fn check_network(&self) -> Option<impl Future<Output = NetworkCheck> + Send + 'static>
    where
        P: Send + Sync + 'static,
    {
        let wallet = self.provider.clone()?;
        let chain = self.chain.clone();
        Some(async move { ensure_network(wallet.as_ref(), &chain).await })
    }

    /// Begins a claim attempt. Attempts that cannot start come back as the
    /// outcome to report; nothing is sent to the wallet for them.
    pub fn start(&mut self, account: Option<Address>) -> Result<MintJob<P, C>, MintOutcome> {
        if self.phase.in_flight() {
            return Err(MintOutcome::Busy);
        }
        let (Some(wallet), Some(account)) = (self.provider.clone(), account) else {
            self.phase = MintPhase::Failed;
            return Err(MintOutcome::NotConnected);
        };
        self.attempt += 1;
        self.phase = MintPhase::NetworkCheck;
        Ok(MintJob {
            attempt: self.attempt,
            wallet,
            contract: Arc::clone(&self.contract),
            chain: self.chain.clone(),
            account,
        })
    }

    /// Returns false for progress from an attempt that is no longer current.
    pub fn on_progress(&mut self, attempt: u64, phase: MintPhase) -> bool {
        if attempt != self.attempt || !self.phase.in_flight() {
            return false;
        }
        self.phase = phase;
        true
    }

    /// Applies a finished attempt. `None` when the report is stale.
    pub fn finish(&mut self, report: MintReport) -> Option<MintOutcome> {
        if report.attempt != self.attempt || !self.phase.in_flight() {
            warn!(attempt = report.attempt, "dropping result of an old mint attempt");
            return None;
        }
        self.phase = match &report.outcome {
            MintOutcome::Minted { token_id, .. } => {
                self.last_token_id = *token_id;
                MintPhase::Success
            }
            MintOutcome::AlreadyMinted => MintPhase::AlreadyMinted,
            _ => MintPhase::Failed,
        };
        Some(report.outcome)
    }
}
