//! Certificate contract boundary: ABI, transaction receipts and the
//! JSON-RPC backed client used by the mint and draw controllers.

use crate::provider::{
    ProviderError,
    RequestArguments,
    WalletProvider,
};
use alloy_primitives::{
    Address,
    B256,
    Bytes,
    U64,
    U256,
};
use alloy_sol_types::{
    SolCall,
    SolEvent,
    sol,
};
use serde::Deserialize;
use serde_json::{
    Value,
    json,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::time;
use tracing::{
    debug,
    info,
};

pub const DEFAULT_RECEIPT_POLL_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_RECEIPT_TIMEOUT: Duration = Duration::from_secs(300);

sol! {
    interface ICertificateNft {
        function mint() external;
        function getAllMintedUsers() external view returns (address[] memory);
        function getWinner() external view returns (address);
        function pickWinner() external;
        function resetWinner() external;

        event Transfer(address indexed from, address indexed to, uint256 indexed tokenId);
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ContractError {
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("transaction {tx} reverted")]
    Reverted { tx: B256 },
    #[error("failed to decode contract data: {0}")]
    Decode(String),
    #[error("transaction {tx} not confirmed after {waited:?}")]
    Timeout { tx: B256, waited: Duration },
}

impl ContractError {
    /// Decodes an `Error(string)` revert payload from the wallet's error data.
    /// Wallets put the payload either directly in `data` or under `data.data`.
    pub fn revert_reason(&self) -> Option<String> {
        let ContractError::Provider(ProviderError::Rpc(err)) = self else {
            return None;
        };
        let data = err.data.as_ref()?;
        let raw = data
            .as_str()
            .or_else(|| data.get("data").and_then(Value::as_str))?;
        let bytes: Bytes = raw.parse().ok()?;
        alloy_sol_types::decode_revert_reason(&bytes)
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    #[serde(default)]
    pub block_number: Option<U64>,
    #[serde(default)]
    pub status: Option<U64>,
    #[serde(default)]
    pub logs: Vec<Log>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferEvent {
    pub from: Address,
    pub to: Address,
    pub token_id: U256,
}

impl TransactionReceipt {
    /// Pre-Byzantium receipts carry no status; those count as success.
    pub fn succeeded(&self) -> bool {
        self.status.is_none_or(|status| status != U64::ZERO)
    }

    pub fn transfer_events(&self) -> Vec<TransferEvent> {
        self.logs
            .iter()
            .filter(|log| log.topics.first() == Some(&ICertificateNft::Transfer::SIGNATURE_HASH))
            .filter_map(|log| {
                ICertificateNft::Transfer::decode_raw_log(
                    log.topics.iter().copied(),
                    &log.data,
                    true,
                )
                .ok()
            })
            .map(|event| TransferEvent {
                from: event.from,
                to: event.to,
                token_id: event.tokenId,
            })
            .collect()
    }
}

pub trait CertificateContract {
    fn mint(&self, from: Address) -> impl Future<Output = Result<B256, ContractError>> + Send;

    fn pick_winner(
        &self,
        from: Address,
    ) -> impl Future<Output = Result<B256, ContractError>> + Send;

    fn reset_winner(
        &self,
        from: Address,
    ) -> impl Future<Output = Result<B256, ContractError>> + Send;

    fn all_minted_users(
        &self,
    ) -> impl Future<Output = Result<Vec<Address>, ContractError>> + Send;

    /// `None` while the contract still holds the zero address.
    fn winner(&self) -> impl Future<Output = Result<Option<Address>, ContractError>> + Send;

    /// Resolves once the transaction is mined. A reverted transaction is an error.
    fn wait_for_receipt(
        &self,
        tx: B256,
    ) -> impl Future<Output = Result<TransactionReceipt, ContractError>> + Send;
}

/// Talks to the deployed contract through the wallet: reads with `eth_call`,
/// writes with `eth_sendTransaction` so the wallet signs them.
#[derive(Debug)]
pub struct RpcCertificateContract<P> {
    address: Address,
    provider: Arc<P>,
    receipt_poll_interval: Duration,
    receipt_timeout: Duration,
}

impl<P> Clone for RpcCertificateContract<P> {
    fn clone(&self) -> Self {
        Self {
            address: self.address,
            provider: Arc::clone(&self.provider),
            receipt_poll_interval: self.receipt_poll_interval,
            receipt_timeout: self.receipt_timeout,
        }
    }
}

impl<P: WalletProvider + Send + Sync> RpcCertificateContract<P> {
    pub fn new(address: Address, provider: Arc<P>) -> Self {
        Self {
            address,
            provider,
            receipt_poll_interval: DEFAULT_RECEIPT_POLL_INTERVAL,
            receipt_timeout: DEFAULT_RECEIPT_TIMEOUT,
        }
    }

    pub fn with_receipt_polling(mut self, interval: Duration, timeout: Duration) -> Self {
        self.receipt_poll_interval = interval;
        self.receipt_timeout = timeout;
        self
    }

    pub fn address(&self) -> Address {
        self.address
    }

    async fn call(&self, calldata: Vec<u8>) -> Result<Bytes, ContractError> {
        let params = json!([
            { "to": self.address, "data": Bytes::from(calldata) },
            "latest"
        ]);
        let value = self
            .provider
            .request(RequestArguments::new("eth_call").with_params(params))
            .await?;
        serde_json::from_value(value).map_err(|e| ContractError::Decode(format!("eth_call: {e}")))
    }

    async fn send(&self, from: Address, calldata: Vec<u8>) -> Result<B256, ContractError> {
        let params = json!([
            { "from": from, "to": self.address, "data": Bytes::from(calldata) }
        ]);
        let value = self
            .provider
            .request(RequestArguments::new("eth_sendTransaction").with_params(params))
            .await?;
        let tx: B256 = serde_json::from_value(value)
            .map_err(|e| ContractError::Decode(format!("transaction hash: {e}")))?;
        info!(%tx, %from, contract = %self.address, "transaction submitted");
        Ok(tx)
    }

    async fn poll_receipt(&self, tx: B256) -> Result<TransactionReceipt, ContractError> {
        let mut ticker = time::interval(self.receipt_poll_interval);
        loop {
            ticker.tick().await;
            let value = self
                .provider
                .request(
                    RequestArguments::new("eth_getTransactionReceipt").with_params(json!([tx])),
                )
                .await?;
            if value.is_null() {
                debug!(%tx, "receipt not available yet");
                continue;
            }
            return parse_receipt(value);
        }
    }
}

impl<P: WalletProvider + Send + Sync> CertificateContract for RpcCertificateContract<P> {
    async fn mint(&self, from: Address) -> Result<B256, ContractError> {
        self.send(from, ICertificateNft::mintCall {}.abi_encode()).await
    }

    async fn pick_winner(&self, from: Address) -> Result<B256, ContractError> {
        self.send(from, ICertificateNft::pickWinnerCall {}.abi_encode())
            .await
    }

    async fn reset_winner(&self, from: Address) -> Result<B256, ContractError> {
        self.send(from, ICertificateNft::resetWinnerCall {}.abi_encode())
            .await
    }

    async fn all_minted_users(&self) -> Result<Vec<Address>, ContractError> {
        let raw = self
            .call(ICertificateNft::getAllMintedUsersCall {}.abi_encode())
            .await?;
        decode_minted_users(&raw)
    }

    async fn winner(&self) -> Result<Option<Address>, ContractError> {
        let raw = self
            .call(ICertificateNft::getWinnerCall {}.abi_encode())
            .await?;
        decode_winner(&raw)
    }

    async fn wait_for_receipt(&self, tx: B256) -> Result<TransactionReceipt, ContractError> {
        let receipt = time::timeout(self.receipt_timeout, self.poll_receipt(tx))
            .await
            .map_err(|_| ContractError::Timeout {
                tx,
                waited: self.receipt_timeout,
            })??;
        if !receipt.succeeded() {
            return Err(ContractError::Reverted { tx });
        }
        info!(%tx, block = ?receipt.block_number, "transaction confirmed");
        Ok(receipt)
    }
}

pub fn parse_receipt(value: Value) -> Result<TransactionReceipt, ContractError> {
    serde_json::from_value(value).map_err(|e| ContractError::Decode(format!("receipt: {e}")))
}

pub fn decode_minted_users(raw: &[u8]) -> Result<Vec<Address>, ContractError> {
    ICertificateNft::getAllMintedUsersCall::abi_decode_returns(raw, true)
        .map(|ret| ret._0)
        .map_err(|e| ContractError::Decode(format!("getAllMintedUsers: {e}")))
}

pub fn decode_winner(raw: &[u8]) -> Result<Option<Address>, ContractError> {
    let winner = ICertificateNft::getWinnerCall::abi_decode_returns(raw, true)
        .map(|ret| ret._0)
        .map_err(|e| ContractError::Decode(format!("getWinner: {e}")))?;
    Ok((winner != Address::ZERO).then_some(winner))
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::provider::RpcError;
    use alloy_sol_types::{
        SolValue,
        Revert,
        SolError,
    };

    fn transfer_log(to: Address, token_id: u64) -> Value {
        json!({
            "address": Address::repeat_byte(0xcc),
            "topics": [
                ICertificateNft::Transfer::SIGNATURE_HASH,
                B256::left_padding_from(Address::ZERO.as_slice()),
                B256::left_padding_from(to.as_slice()),
                B256::from(U256::from(token_id)),
            ],
            "data": "0x",
            "logIndex": "0x0"
        })
    }

    #[test]
    fn parse_receipt__extracts_transfer_events() {
        // given
        let minter = Address::repeat_byte(0xab);
        let raw = json!({
            "transactionHash": B256::repeat_byte(1),
            "blockNumber": "0x10",
            "status": "0x1",
            "logs": [
                transfer_log(minter, 42),
                {
                    "address": Address::repeat_byte(0xcc),
                    "topics": [B256::repeat_byte(9)],
                    "data": "0x"
                }
            ]
        });

        // when
        let receipt = parse_receipt(raw).unwrap();

        // then
        assert!(receipt.succeeded());
        assert_eq!(receipt.block_number, Some(U64::from(16)));
        assert_eq!(
            receipt.transfer_events(),
            vec![TransferEvent {
                from: Address::ZERO,
                to: minter,
                token_id: U256::from(42),
            }]
        );
    }

    #[test]
    fn succeeded__false_for_zero_status() {
        let raw = json!({
            "transactionHash": B256::repeat_byte(2),
            "status": "0x0",
            "logs": []
        });
        assert!(!parse_receipt(raw).unwrap().succeeded());
    }

    #[test]
    fn decode_winner__maps_zero_address_to_none() {
        let zero = Address::ZERO.abi_encode();
        let winner = Address::repeat_byte(0x11);

        assert_eq!(decode_winner(&zero).unwrap(), None);
        assert_eq!(decode_winner(&winner.abi_encode()).unwrap(), Some(winner));
    }

    #[test]
    fn decode_minted_users__keeps_contract_order() {
        // given
        let users = vec![
            Address::repeat_byte(3),
            Address::repeat_byte(1),
            Address::repeat_byte(2),
        ];
        let encoded = (users.clone(),).abi_encode_params();

        // when
        let decoded = decode_minted_users(&encoded).unwrap();

        // then
        assert_eq!(decoded, users);
    }

    #[test]
    fn revert_reason__decodes_direct_and_nested_payloads() {
        // given
        let payload = Bytes::from(
            Revert {
                reason: "Already minted".to_string(),
            }
            .abi_encode(),
        );
        let direct = ContractError::from(ProviderError::Rpc(
            RpcError::new(3, "execution reverted").with_data(json!(payload.to_string())),
        ));
        let nested = ContractError::from(ProviderError::Rpc(
            RpcError::new(-32603, "Internal JSON-RPC error.")
                .with_data(json!({ "code": 3, "data": payload.to_string() })),
        ));
        let plain = ContractError::from(ProviderError::Transport("connection reset".into()));

        // then
        assert_eq!(direct.revert_reason().as_deref(), Some("Already minted"));
        assert_eq!(nested.revert_reason().as_deref(), Some("Already minted"));
        assert_eq!(plain.revert_reason(), None);
    }
}
