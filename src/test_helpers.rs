//! In-memory stand-ins for the wallet and the certificate contract.

use crate::{
    contract::{
        CertificateContract,
        ContractError,
        ICertificateNft,
        Log,
        TransactionReceipt,
    },
    provider::{
        AccountsChangedHandler,
        AccountsChangedHub,
        ProviderError,
        RequestArguments,
        RpcError,
        Subscription,
        UNRECOGNIZED_CHAIN,
        USER_REJECTED_REQUEST,
        WalletProvider,
        parse_quantity,
    },
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U64,
    U256,
};
use alloy_sol_types::{
    Revert,
    SolError,
    SolEvent,
};
use serde_json::{
    Value,
    json,
};
use std::{
    collections::{
        HashMap,
        HashSet,
    },
    sync::{
        Arc,
        Mutex,
        MutexGuard,
    },
};

#[derive(Debug, Default)]
struct WalletState {
    authorized: Vec<Address>,
    approvable: Vec<Address>,
    permission_selection: Option<Vec<Address>>,
    chain_id: u64,
    known_chains: HashSet<u64>,
    rejecting: HashSet<String>,
    requests: Vec<RequestArguments>,
    added_chains: Vec<Value>,
}

/// Behaves like a browser wallet: the user approves `approvable` accounts on
/// `eth_requestAccounts`, unknown chains answer 4902, and any method listed
/// with [`MockWalletProvider::rejecting`] fails with a 4001 user rejection.
#[derive(Clone, Debug, Default)]
pub struct MockWalletProvider {
    state: Arc<Mutex<WalletState>>,
    hub: AccountsChangedHub,
}

impl MockWalletProvider {
    pub fn new() -> Self {
        let provider = Self::default();
        {
            let mut state = provider.lock();
            state.chain_id = crate::network::SEPOLIA_CHAIN_ID;
            state.known_chains.insert(crate::network::SEPOLIA_CHAIN_ID);
        }
        provider
    }

    pub fn with_chain_id(self, chain_id: u64) -> Self {
        {
            let mut state = self.lock();
            state.chain_id = chain_id;
            state.known_chains = HashSet::from([chain_id]);
        }
        self
    }

    pub fn with_known_chain(self, chain_id: u64) -> Self {
        self.lock().known_chains.insert(chain_id);
        self
    }

    pub fn with_authorized(self, accounts: Vec<Address>) -> Self {
        self.lock().authorized = accounts;
        self
    }

    pub fn with_approvable(self, accounts: Vec<Address>) -> Self {
        self.lock().approvable = accounts;
        self
    }

    /// Accounts the user picks in the permission dialog.
    pub fn with_permission_selection(self, accounts: Vec<Address>) -> Self {
        self.lock().permission_selection = Some(accounts);
        self
    }

    pub fn rejecting(self, method: &str) -> Self {
        self.lock().rejecting.insert(method.to_string());
        self
    }

    pub fn chain_id(&self) -> u64 {
        self.lock().chain_id
    }

    pub fn authorized(&self) -> Vec<Address> {
        self.lock().authorized.clone()
    }

    pub fn requested_methods(&self) -> Vec<String> {
        self.lock()
            .requests
            .iter()
            .map(|req| req.method.clone())
            .collect()
    }

    pub fn added_chains(&self) -> Vec<Value> {
        self.lock().added_chains.clone()
    }

    pub fn listener_count(&self) -> usize {
        self.hub.listener_count()
    }

    /// Simulates the user switching or disconnecting accounts in the wallet UI.
    pub fn change_accounts(&self, accounts: Vec<Address>) {
        self.lock().authorized = accounts.clone();
        self.hub.emit(&accounts);
    }

    fn lock(&self) -> MutexGuard<'_, WalletState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn handle(&self, args: RequestArguments) -> Result<Value, ProviderError> {
        let mut state = self.lock();
        state.requests.push(args.clone());
        if state.rejecting.contains(&args.method) {
            return Err(RpcError::new(USER_REJECTED_REQUEST, "User rejected the request.").into());
        }
        let first_param = args
            .params
            .as_ref()
            .and_then(|params| params.get(0))
            .cloned()
            .unwrap_or(Value::Null);
        match args.method.as_str() {
            "eth_requestAccounts" => {
                if state.authorized.is_empty() {
                    state.authorized = state.approvable.clone();
                }
                Ok(json!(state.authorized))
            }
            "eth_accounts" => Ok(json!(state.authorized)),
            "eth_chainId" => Ok(json!(format!("{:#x}", state.chain_id))),
            "wallet_switchEthereumChain" => {
                let requested = parse_quantity(&first_param["chainId"])?;
                if !state.known_chains.contains(&requested) {
                    return Err(RpcError::new(
                        UNRECOGNIZED_CHAIN,
                        format!("Unrecognized chain ID {requested:#x}"),
                    )
                    .into());
                }
                state.chain_id = requested;
                Ok(Value::Null)
            }
            "wallet_addEthereumChain" => {
                let requested = parse_quantity(&first_param["chainId"])?;
                state.added_chains.push(first_param);
                state.known_chains.insert(requested);
                state.chain_id = requested;
                Ok(Value::Null)
            }
            "wallet_requestPermissions" => {
                if let Some(selection) = state.permission_selection.clone() {
                    state.authorized = selection;
                }
                Ok(json!([{ "parentCapability": "eth_accounts" }]))
            }
            other => Err(RpcError::new(-32601, format!("method {other} not supported")).into()),
        }
    }
}

impl WalletProvider for MockWalletProvider {
    async fn request(&self, args: RequestArguments) -> Result<Value, ProviderError> {
        self.handle(args)
    }

    fn on_accounts_changed(&self, handler: AccountsChangedHandler) -> Subscription {
        self.hub.subscribe(handler)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ContractCall {
    Mint,
    PickWinner,
    ResetWinner,
    /// `getWinner()` read
    GetWinner,
}

#[derive(Debug)]
enum PendingEffect {
    Mint { to: Address, token_id: U256 },
    PickWinner,
    ResetWinner,
}

#[derive(Debug, Default)]
struct ContractState {
    minted: Vec<Address>,
    winner: Option<Address>,
    draw_result: Option<Address>,
    next_token_id: u64,
    next_tx: u64,
    pending: HashMap<B256, PendingEffect>,
    submitted: Vec<(ContractCall, Address)>,
    failures: HashMap<ContractCall, ProviderError>,
    reverting: HashSet<ContractCall>,
    winner_reads: usize,
}

/// Minimal certificate contract. Minting twice from the same address fails
/// the way a node reports a `require(..., "Already minted")` revert.
#[derive(Clone, Debug, Default)]
pub struct MockCertificateContract {
    state: Arc<Mutex<ContractState>>,
}

impl MockCertificateContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_minted(self, users: Vec<Address>) -> Self {
        self.lock().minted = users;
        self
    }

    pub fn with_winner(self, winner: Address) -> Self {
        self.lock().winner = Some(winner);
        self
    }

    /// Address the contract will store when `pickWinner` confirms.
    pub fn with_draw_result(self, winner: Address) -> Self {
        self.lock().draw_result = Some(winner);
        self
    }

    pub fn failing(self, call: ContractCall, err: ProviderError) -> Self {
        self.fail(call, err);
        self
    }

    /// Makes every later `call` fail with `err`, for failures that must start
    /// halfway through a scenario.
    pub fn fail(&self, call: ContractCall, err: ProviderError) {
        self.lock().failures.insert(call, err);
    }

    pub fn reverting(self, call: ContractCall) -> Self {
        self.lock().reverting.insert(call);
        self
    }

    pub fn minted(&self) -> Vec<Address> {
        self.lock().minted.clone()
    }

    pub fn stored_winner(&self) -> Option<Address> {
        self.lock().winner
    }

    pub fn submitted(&self) -> Vec<(ContractCall, Address)> {
        self.lock().submitted.clone()
    }

    pub fn winner_reads(&self) -> usize {
        self.lock().winner_reads
    }

    pub fn set_minted(&self, users: Vec<Address>) {
        self.lock().minted = users;
    }

    fn lock(&self) -> MutexGuard<'_, ContractState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn submit(&self, call: ContractCall, from: Address) -> Result<B256, ContractError> {
        let mut state = self.lock();
        if let Some(err) = state.failures.get(&call) {
            return Err(err.clone().into());
        }
        if call == ContractCall::Mint && state.minted.contains(&from) {
            return Err(already_minted_revert().into());
        }
        state.submitted.push((call, from));
        state.next_tx += 1;
        let tx = B256::from(U256::from(state.next_tx));
        let effect = match call {
            ContractCall::Mint => {
                state.next_token_id += 1;
                PendingEffect::Mint {
                    to: from,
                    token_id: U256::from(state.next_token_id),
                }
            }
            ContractCall::PickWinner => PendingEffect::PickWinner,
            ContractCall::ResetWinner => PendingEffect::ResetWinner,
            ContractCall::GetWinner => {
                return Err(ContractError::Decode("getWinner is not a transaction".into()));
            }
        };
        state.pending.insert(tx, effect);
        Ok(tx)
    }

    fn confirm(&self, tx: B256) -> Result<TransactionReceipt, ContractError> {
        let mut state = self.lock();
        let effect = state
            .pending
            .remove(&tx)
            .ok_or_else(|| ContractError::Decode(format!("unknown transaction {tx}")))?;
        let call = match effect {
            PendingEffect::Mint { .. } => ContractCall::Mint,
            PendingEffect::PickWinner => ContractCall::PickWinner,
            PendingEffect::ResetWinner => ContractCall::ResetWinner,
        };
        if state.reverting.contains(&call) {
            return Err(ContractError::Reverted { tx });
        }
        let mut logs = Vec::new();
        match effect {
            PendingEffect::Mint { to, token_id } => {
                state.minted.push(to);
                logs.push(transfer_log(to, token_id));
            }
            PendingEffect::PickWinner => {
                let picked = state.draw_result.or_else(|| state.minted.first().copied());
                state.winner = picked;
            }
            PendingEffect::ResetWinner => state.winner = None,
        }
        Ok(TransactionReceipt {
            transaction_hash: tx,
            block_number: Some(U64::from(state.next_tx)),
            status: Some(U64::from(1)),
            logs,
        })
    }
}

impl CertificateContract for MockCertificateContract {
    async fn mint(&self, from: Address) -> Result<B256, ContractError> {
        self.submit(ContractCall::Mint, from)
    }

    async fn pick_winner(&self, from: Address) -> Result<B256, ContractError> {
        self.submit(ContractCall::PickWinner, from)
    }

    async fn reset_winner(&self, from: Address) -> Result<B256, ContractError> {
        self.submit(ContractCall::ResetWinner, from)
    }

    async fn all_minted_users(&self) -> Result<Vec<Address>, ContractError> {
        Ok(self.lock().minted.clone())
    }

    async fn winner(&self) -> Result<Option<Address>, ContractError> {
        let mut state = self.lock();
        state.winner_reads += 1;
        if let Some(err) = state.failures.get(&ContractCall::GetWinner) {
            return Err(err.clone().into());
        }
        Ok(state.winner)
    }

    async fn wait_for_receipt(&self, tx: B256) -> Result<TransactionReceipt, ContractError> {
        self.confirm(tx)
    }
}

pub fn already_minted_revert() -> ProviderError {
    let payload = Bytes::from(
        Revert {
            reason: "Already minted".to_string(),
        }
        .abi_encode(),
    );
    RpcError::new(3, "execution reverted: Already minted")
        .with_data(json!(payload.to_string()))
        .into()
}

pub fn transfer_log(to: Address, token_id: U256) -> Log {
    Log {
        address: Address::repeat_byte(0xce),
        topics: vec![
            ICertificateNft::Transfer::SIGNATURE_HASH,
            B256::left_padding_from(Address::ZERO.as_slice()),
            B256::left_padding_from(to.as_slice()),
            B256::from(token_id),
        ],
        data: Bytes::new(),
    }
}
