use std::sync::Arc;

use alloy_primitives::{Address, B256, U64, U256};
use color_eyre::eyre;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::trace;

use crate::{
    error::ClientError,
    handle::TxReceipt,
    transport::{JsonRpcRequest, Transport},
};

/// The subset of `eth_*` calls the orchestrator relies on.
#[derive(Clone)]
pub struct EthRpcClient {
    transport: Arc<dyn Transport>,
}

#[derive(Debug, Deserialize)]
struct BlockHeader {
    hash: B256,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    block_hash: Option<B256>,
    #[serde(default)]
    gas_used: Option<U64>,
    #[serde(default)]
    effective_gas_price: Option<U256>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TransactionRequest {
    from: Address,
    to: Address,
    value: U256,
    gas_price: U256,
}

impl EthRpcClient {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    pub async fn rpc_request<D: DeserializeOwned>(
        &self,
        method: &str,
        params: Value,
    ) -> eyre::Result<D> {
        let request = JsonRpcRequest::new(method, params);
        let body = self.transport.send(&request).await?;

        trace!(method, ?body, "rpc response");

        match (body.result, body.error) {
            (_, Some(error)) => {
                Err(ClientError::JsonRpc { code: error.code, message: error.message }.into())
            }
            (result, None) => serde_json::from_value(result.unwrap_or(Value::Null)).map_err(|e| {
                ClientError::InvalidResponse { method: method.to_string(), reason: e.to_string() }
                    .into()
            }),
        }
    }

    /// `eth_blockNumber`
    pub async fn block_number(&self) -> eyre::Result<u64> {
        let height: U64 = self.rpc_request("eth_blockNumber", json!([])).await?;
        Ok(height.to())
    }

    /// Hash of the canonical block at `height`, `None` if the node does not have it.
    pub async fn block_hash(&self, height: u64) -> eyre::Result<Option<B256>> {
        let params = json!([U64::from(height), false]);
        let block: Option<BlockHeader> = self.rpc_request("eth_getBlockByNumber", params).await?;
        Ok(block.map(|b| b.hash))
    }

    /// `eth_getBalance` at the latest block.
    pub async fn balance(&self, address: Address) -> eyre::Result<U256> {
        self.rpc_request("eth_getBalance", json!([address, "latest"])).await
    }

    /// Submits a value transfer signed by the node's unlocked `from` account.
    pub async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        value: U256,
        gas_price: u128,
    ) -> eyre::Result<B256> {
        let tx = TransactionRequest { from, to, value, gas_price: U256::from(gas_price) };
        self.rpc_request("eth_sendTransaction", json!([tx])).await
    }

    /// `None` while the node does not know the transaction.
    pub async fn transaction_receipt(&self, hash: B256) -> eyre::Result<Option<TxReceipt>> {
        let raw: Option<RawReceipt> =
            self.rpc_request("eth_getTransactionReceipt", json!([hash])).await?;
        Ok(raw.map(|r| TxReceipt {
            block_hash: r.block_hash,
            gas_used: r.gas_used.map(|g| g.to()),
            effective_gas_price: r.effective_gas_price,
        }))
    }
}
