use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Result};
use ethers::{
    abi::Abi,
    contract::ContractFactory,
    middleware::SignerMiddleware,
    providers::{Http, JsonRpcClient, Middleware, Provider},
    signers::{LocalWallet, Signer},
    types::{Bytes, H256},
};

use crate::{
    contracts,
    pipeline::{ContractTooling, DeployedContract, DeploymentFactory, PendingDeployment},
    utils::{send_transaction, wait_transaction},
};

#[derive(Debug, Clone)]
pub struct DeploySettings {
    pub artifacts: PathBuf,
    pub confirmations: usize,
    pub legacy: bool,
}

/// Deploys Hardhat artifacts through an ethers client.
pub struct Deploy<M> {
    client: Arc<M>,
    settings: DeploySettings,
}

impl<M> Deploy<M> {
    pub fn new(client: Arc<M>, settings: DeploySettings) -> Self {
        Self { client, settings }
    }
}

impl Deploy<SignerMiddleware<Provider<Http>, LocalWallet>> {
    pub async fn with_signer(
        provider: Provider<Http>,
        wallet: LocalWallet,
        settings: DeploySettings,
    ) -> Result<Self> {
        let chain_id = provider.get_chainid().await?.as_u64();
        log::info!("deployer:{:?} chain id:{}", wallet.address(), chain_id);

        let client = Arc::new(SignerMiddleware::new(provider, wallet.with_chain_id(chain_id)));
        Ok(Self::new(client, settings))
    }
}

impl<P: JsonRpcClient + 'static> Deploy<Provider<P>> {
    /// Sends from the node's first unlocked account, the way a local dev node
    /// is used without a configured key.
    pub async fn with_node_account(provider: Provider<P>, settings: DeploySettings) -> Result<Self> {
        let sender = provider
            .get_accounts()
            .await?
            .first()
            .copied()
            .ok_or(anyhow!("node exposes no unlocked accounts, pass --sk"))?;
        log::info!("deployer:{:?} (node account)", sender);

        let client = Arc::new(provider.with_sender(sender));
        Ok(Self::new(client, settings))
    }
}

impl<M: Middleware + 'static> ContractTooling for Deploy<M> {
    type Factory = ArtifactFactory<M>;

    async fn get_contract_factory(&self, name: &str) -> Result<ArtifactFactory<M>> {
        let artifact = contracts::load_artifact(&self.settings.artifacts, name)?;
        let arity = artifact.constructor_arity();
        if arity != 0 {
            bail!(
                "{} constructor expects {} arguments, deploying with none",
                artifact.fully_qualified_name(),
                arity
            );
        }

        Ok(ArtifactFactory {
            bytecode: artifact.bytecode()?,
            abi: artifact.abi,
            client: self.client.clone(),
            confirmations: self.settings.confirmations,
            legacy: self.settings.legacy,
        })
    }
}

pub struct ArtifactFactory<M> {
    abi: Abi,
    bytecode: Bytes,
    client: Arc<M>,
    confirmations: usize,
    legacy: bool,
}

impl<M: Middleware + 'static> DeploymentFactory for ArtifactFactory<M> {
    type Pending = EthersPendingDeployment<M>;

    async fn deploy(&self) -> Result<EthersPendingDeployment<M>> {
        let mut deployer = ContractFactory::new(
            self.abi.clone(),
            self.bytecode.clone(),
            self.client.clone(),
        )
        .deploy(())?;
        if self.legacy {
            deployer = deployer.legacy();
        }

        let transaction_hash = send_transaction(self.client.as_ref(), deployer.tx).await?;
        Ok(EthersPendingDeployment {
            client: self.client.clone(),
            transaction_hash,
            confirmations: self.confirmations,
        })
    }
}

pub struct EthersPendingDeployment<M> {
    client: Arc<M>,
    transaction_hash: H256,
    confirmations: usize,
}

impl<M: Middleware + 'static> PendingDeployment for EthersPendingDeployment<M> {
    async fn deployed(self) -> Result<DeployedContract> {
        let receipt = wait_transaction(
            self.client.as_ref(),
            self.transaction_hash,
            self.confirmations,
        )
        .await?;
        let address = receipt.contract_address.ok_or(anyhow!(
            "transaction {:?} did not create a contract",
            self.transaction_hash
        ))?;

        let code = self.client.get_code(address, None).await?;
        if code.is_empty() {
            bail!("no code at {:?}, contract not deployed", address);
        }

        Ok(DeployedContract {
            address,
            transaction_hash: self.transaction_hash,
        })
    }
}
