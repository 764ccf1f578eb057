use anyhow::{anyhow, bail, Result};
use ethers::{
    providers::{Middleware, PendingTransaction},
    types::{transaction::eip2718::TypedTransaction, TransactionReceipt, H256, U64},
};

pub async fn send_transaction<M: Middleware + 'static>(
    client: &M,
    mut tx: TypedTransaction,
) -> Result<H256> {
    client.fill_transaction(&mut tx, None).await?;

    let transaction_hash = client.send_transaction(tx, None).await?.tx_hash();
    log::info!("transaction hash:{:?}", transaction_hash);
    Ok(transaction_hash)
}

/// Waits until `transaction_hash` is mined and buried under `confirmations`
/// blocks. A reverted transaction is an error.
pub async fn wait_transaction<M: Middleware + 'static>(
    client: &M,
    transaction_hash: H256,
    confirmations: usize,
) -> Result<TransactionReceipt> {
    let receipt = PendingTransaction::new(transaction_hash, client.provider())
        .confirmations(confirmations)
        .await?
        .ok_or(anyhow!("transaction {:?} dropped from mempool", transaction_hash))?;

    if receipt.status == Some(U64::zero()) {
        bail!("transaction {:?} reverted", transaction_hash);
    }
    Ok(receipt)
}
