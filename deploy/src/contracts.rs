use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{anyhow, bail, Context, Result};
use ethers::{abi::Abi, types::Bytes, utils::hex};
use glob::{glob, Pattern};
use serde::Deserialize;

const BUILD_INFO_DIR: &str = "build-info";

/// Compilation output Hardhat writes for a single contract.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HardhatArtifact {
    pub contract_name: String,
    pub source_name: String,
    pub abi: Abi,
    bytecode: String,
    #[serde(default)]
    link_references: BTreeMap<String, serde_json::Value>,
}

impl HardhatArtifact {
    pub fn fully_qualified_name(&self) -> String {
        format!("{}:{}", self.source_name, self.contract_name)
    }

    /// Creation bytecode, ready to be sent.
    pub fn bytecode(&self) -> Result<Bytes> {
        let code = self.bytecode.strip_prefix("0x").unwrap_or(&self.bytecode);
        if code.is_empty() {
            bail!(
                "{} has no bytecode, it is abstract or an interface",
                self.fully_qualified_name()
            );
        }
        if !self.link_references.is_empty() {
            let libraries: Vec<_> = self.link_references.keys().cloned().collect();
            bail!(
                "{} must be linked against libraries from {} before it can be deployed",
                self.fully_qualified_name(),
                libraries.join(", ")
            );
        }
        let code = hex::decode(code)
            .with_context(|| format!("{} bytecode is not valid hex", self.fully_qualified_name()))?;
        Ok(code.into())
    }

    pub fn constructor_arity(&self) -> usize {
        self.abi
            .constructor()
            .map(|constructor| constructor.inputs.len())
            .unwrap_or(0)
    }
}

/// Resolves `name` under the artifacts `root`. `name` is either a bare
/// contract name or `path/to/Source.sol:Name`.
pub fn load_artifact(root: &Path, name: &str) -> Result<HardhatArtifact> {
    let (path, contract_name) = match name.rsplit_once(':') {
        Some((source, contract_name)) => (
            root.join(source).join(format!("{contract_name}.json")),
            contract_name,
        ),
        None => (find_artifact(root, name)?, name),
    };
    log::debug!("loading artifact {}", path.display());

    let raw = fs::read_to_string(&path)
        .with_context(|| format!("artifact for {name} not found at {}", path.display()))?;
    let artifact: HardhatArtifact = serde_json::from_str(&raw)
        .with_context(|| format!("{} is not a hardhat artifact", path.display()))?;

    if artifact.contract_name != contract_name {
        bail!(
            "{} holds contract {}, expected {}",
            path.display(),
            artifact.contract_name,
            contract_name
        );
    }
    Ok(artifact)
}

fn find_artifact(root: &Path, name: &str) -> Result<PathBuf> {
    if !root.is_dir() {
        bail!("failed to read artifacts directory {}", root.display());
    }

    let pattern = format!(
        "{}/**/{}.json",
        Pattern::escape(&root.to_string_lossy()),
        Pattern::escape(name)
    );
    let mut found = Vec::new();
    for path in glob(&pattern).with_context(|| format!("invalid artifact pattern {pattern}"))? {
        let path = path
            .with_context(|| format!("failed to read artifacts directory {}", root.display()))?;
        if !in_build_info(root, &path) {
            found.push(path);
        }
    }
    found.sort();

    match found.len() {
        0 => Err(anyhow!(
            "artifact for contract {name} not found in {}, run `npx hardhat compile` first",
            root.display()
        )),
        1 => Ok(found.remove(0)),
        _ => {
            let candidates: Vec<_> = found
                .iter()
                .filter_map(|path| qualified_name(root, path, name))
                .collect();
            bail!(
                "multiple artifacts for contract {name}, use a fully qualified name: {}",
                candidates.join(", ")
            )
        }
    }
}

fn in_build_info(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .map(|relative| relative.components().any(|c| c.as_os_str() == BUILD_INFO_DIR))
        .unwrap_or(false)
}

fn qualified_name(root: &Path, path: &Path, name: &str) -> Option<String> {
    let source = path.parent()?.strip_prefix(root).ok()?;
    let source: Vec<_> = source
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    Some(format!("{}:{name}", source.join("/")))
}
