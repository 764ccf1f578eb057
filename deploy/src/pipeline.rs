use std::{fmt, io::Write};

use anyhow::Result;
use ethers::{
    types::{Address, H256},
    utils::to_checksum,
};

/// Contract deployed by the `test` environment.
pub const CONTRACT_NAME: &str = "Turtlesea";

/// Source of contract factories, resolved by contract name.
pub trait ContractTooling {
    type Factory: DeploymentFactory;

    async fn get_contract_factory(&self, name: &str) -> Result<Self::Factory>;
}

pub trait DeploymentFactory {
    type Pending: PendingDeployment;

    /// Submits the creation transaction with no constructor arguments.
    async fn deploy(&self) -> Result<Self::Pending>;
}

pub trait PendingDeployment {
    /// Resolves once the creation transaction is confirmed on chain.
    async fn deployed(self) -> Result<DeployedContract>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeployedContract {
    pub address: Address,
    pub transaction_hash: H256,
}

impl fmt::Display for DeployedContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&to_checksum(&self.address, None))
    }
}

/// Retrieves the factory, deploys, waits for confirmation and reports the
/// address. The first failing step aborts the run; nothing is written then.
pub async fn run<T: ContractTooling>(
    tooling: &T,
    out: &mut impl Write,
) -> Result<DeployedContract> {
    let factory = tooling.get_contract_factory(CONTRACT_NAME).await?;
    let pending = factory.deploy().await?;
    let contract = pending.deployed().await?;

    log::info!("{} confirmed in transaction {:?}", CONTRACT_NAME, contract.transaction_hash);
    writeln!(out, "Market deployed to: {}", contract)?;
    Ok(contract)
}
