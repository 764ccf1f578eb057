use std::{
    convert::Infallible, fmt, io, iter::Peekable, path::PathBuf, str::FromStr, time::Duration,
};

use anyhow::{Context, Result};
use clap::{Command, CommandFactory, Parser};
use ethers::{
    providers::{Http, Provider},
    signers::LocalWallet,
};

use crate::{
    deploy::{Deploy, DeploySettings},
    pipeline::{self, DeployedContract},
};

/// Deployment target selected by the first positional argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Environment {
    Test,
    Other(String),
}

impl FromStr for Environment {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "test" => Environment::Test,
            other => Environment::Other(other.to_string()),
        })
    }
}

/// Raw deployer key. Only decoded when a deployment needs it.
#[derive(Clone)]
pub struct PrivateKey(String);

impl FromStr for PrivateKey {
    type Err = Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(PrivateKey(s.to_string()))
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(..)")
    }
}

impl PrivateKey {
    fn wallet(&self) -> Result<LocalWallet> {
        self.0
            .trim()
            .parse()
            .context("invalid deployer private key")
    }
}

#[derive(Debug, Parser)]
#[clap(version, about = "Deploys the Turtlesea market contract")]
pub struct CommandLine {
    /// Target environment; only `test` deploys anything
    environment: Option<Environment>,

    /// JSON-RPC endpoint of the node
    #[clap(short, long, env = "DEPLOY_RPC_URL", default_value = "http://127.0.0.1:8545")]
    rpc: String,

    /// Deployer private key, hex. Without it the node's first account is used
    #[clap(long, env = "DEPLOYER_PRIVATE_KEY", hide_env_values = true)]
    sk: Option<PrivateKey>,

    /// Hardhat artifacts directory
    #[clap(short, long, env = "DEPLOY_ARTIFACTS", default_value = "artifacts")]
    artifacts: PathBuf,

    /// Blocks to wait for after the deployment is mined
    #[clap(short, long, default_value_t = 1, value_parser = clap::value_parser!(u64).range(1..))]
    confirmations: u64,

    /// How often to poll the node for the receipt, in milliseconds
    #[clap(long, default_value_t = 1000)]
    poll_interval_ms: u64,

    /// Send a legacy (pre EIP-1559) transaction
    #[clap(long)]
    legacy: bool,

    /// Unknown flags and extra positionals, in the order given
    #[clap(skip)]
    ignored: Vec<String>,
}

/// Arguments sorted into what clap understands and what is only carried along.
#[derive(Debug, Default)]
struct SplitArgs {
    known: Vec<String>,
    environment: Option<String>,
    ignored: Vec<String>,
}

impl SplitArgs {
    fn positional(&mut self, arg: String) {
        if self.environment.is_none() {
            self.environment = Some(arg);
        } else {
            self.ignored.push(arg);
        }
    }
}

/// Known options keep their values. An unknown flag swallows the following
/// token as its value unless that token looks like a flag itself.
fn split_args<I: Iterator<Item = String>>(cmd: &Command, args: &mut Peekable<I>) -> SplitArgs {
    let mut split = SplitArgs::default();

    while let Some(arg) = args.next() {
        if arg == "--" {
            args.by_ref().for_each(|rest| split.positional(rest));
            break;
        }

        let (known, inline_value) = if let Some(long) = arg.strip_prefix("--") {
            let (name, inline) = match long.split_once('=') {
                Some((name, _)) => (name, true),
                None => (long, false),
            };
            (cmd.get_arguments().find(|a| a.get_long() == Some(name)), inline)
        } else if arg.len() > 1 && arg.starts_with('-') {
            let mut shorts = arg[1..].chars();
            let short = shorts.next();
            let inline = shorts.next().is_some();
            (cmd.get_arguments().find(|a| a.get_short() == short), inline)
        } else {
            split.positional(arg);
            continue;
        };

        match known {
            Some(option) => {
                let takes_value = option.get_action().takes_values();
                split.known.push(arg);
                if takes_value && !inline_value {
                    split.known.extend(args.next());
                }
            }
            None => {
                split.ignored.push(arg);
                if !inline_value {
                    split
                        .ignored
                        .extend(args.next_if(|next| !next.starts_with('-')));
                }
            }
        }
    }
    split
}

impl CommandLine {
    /// Parses like clap, except that unknown flags anywhere on the line are
    /// collected into `ignored` instead of failing the parse.
    pub fn try_parse_lenient<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let mut args = args.into_iter().map(Into::into).peekable();
        let bin = args
            .next()
            .unwrap_or_else(|| env!("CARGO_PKG_NAME").to_string());

        let mut cmd = Self::command();
        cmd.build();
        let split = split_args(&cmd, &mut args);

        let mut clap_args = vec![bin];
        clap_args.extend(split.known);
        if let Some(environment) = split.environment {
            clap_args.push("--".to_string());
            clap_args.push(environment);
        }

        let mut cmd = Self::try_parse_from(clap_args)?;
        cmd.ignored = split.ignored;
        Ok(cmd)
    }

    pub async fn execute(self) -> Result<()> {
        println!("{:?}", self);

        match &self.environment {
            Some(Environment::Test) => {
                self.deploy_test().await?;
            }
            Some(Environment::Other(name)) => {
                log::info!("nothing to deploy for environment {}", name);
            }
            None => {
                log::info!("no environment given, nothing to deploy");
            }
        }
        Ok(())
    }

    async fn deploy_test(&self) -> Result<DeployedContract> {
        let provider = Provider::<Http>::try_from(self.rpc.as_str())?
            .interval(Duration::from_millis(self.poll_interval_ms));
        let mut stdout = io::stdout();

        match &self.sk {
            Some(key) => {
                let deploy = Deploy::with_signer(provider, key.wallet()?, self.settings()).await?;
                pipeline::run(&deploy, &mut stdout).await
            }
            None => {
                let deploy = Deploy::with_node_account(provider, self.settings()).await?;
                pipeline::run(&deploy, &mut stdout).await
            }
        }
    }

    fn settings(&self) -> DeploySettings {
        DeploySettings {
            artifacts: self.artifacts.clone(),
            confirmations: self.confirmations as usize,
            legacy: self.legacy,
        }
    }
}

#[cfg(test)]
mod tests {
    use ethers::{signers::Signer, types::Address};

    use super::*;

    const UNREACHABLE_RPC: &str = "http://127.0.0.1:1";
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

    fn try_parse(args: &[&str]) -> Result<CommandLine, clap::Error> {
        CommandLine::try_parse_lenient(std::iter::once("turtlesea-deploy").chain(args.iter().copied()))
    }

    fn parse(args: &[&str]) -> CommandLine {
        try_parse(args).unwrap()
    }

    #[test]
    fn parses_environment_selector() {
        assert_eq!(parse(&["test"]).environment, Some(Environment::Test));
        assert_eq!(
            parse(&["staging"]).environment,
            Some(Environment::Other("staging".to_string()))
        );
        assert_eq!(
            parse(&["Test"]).environment,
            Some(Environment::Other("Test".to_string()))
        );
        assert_eq!(parse(&[]).environment, None);
    }

    #[test]
    fn collects_trailing_flags_as_ignored() {
        let cmd = parse(&["--legacy", "test", "--network", "localhost", "extra"]);

        assert_eq!(cmd.environment, Some(Environment::Test));
        assert!(cmd.legacy);
        assert_eq!(cmd.ignored, vec!["--network", "localhost", "extra"]);
    }

    #[test]
    fn unknown_leading_flag_keeps_test_environment() {
        let cmd = parse(&["--network", "localhost", "test"]);

        assert_eq!(cmd.environment, Some(Environment::Test));
        assert_eq!(cmd.ignored, vec!["--network", "localhost"]);
    }

    #[test]
    fn unknown_flags_never_fail_the_parse() {
        let cmd = parse(&["-x", "staging"]);
        assert_eq!(cmd.environment, None);
        assert_eq!(cmd.ignored, vec!["-x", "staging"]);

        let cmd = parse(&["--flag"]);
        assert_eq!(cmd.environment, None);
        assert_eq!(cmd.ignored, vec!["--flag"]);

        let cmd = parse(&["--dry-run=yes", "staging", "-v"]);
        assert_eq!(cmd.environment, Some(Environment::Other("staging".to_string())));
        assert_eq!(cmd.ignored, vec!["--dry-run=yes", "-v"]);
    }

    #[test]
    fn known_options_mix_with_unknown_ones() {
        let cmd = parse(&["--verbose", "--rpc", "http://node:8545", "-c3", "--artifacts=out", "test"]);

        assert_eq!(cmd.environment, Some(Environment::Test));
        assert_eq!(cmd.rpc, "http://node:8545");
        assert_eq!(cmd.confirmations, 3);
        assert_eq!(cmd.artifacts, PathBuf::from("out"));
        assert_eq!(cmd.ignored, vec!["--verbose"]);
    }

    #[test]
    fn double_dash_ends_option_parsing() {
        let cmd = parse(&["--", "-weird", "test"]);

        assert_eq!(cmd.environment, Some(Environment::Other("-weird".to_string())));
        assert_eq!(cmd.ignored, vec!["test"]);
    }

    #[test]
    fn rejects_zero_confirmations() {
        assert!(try_parse(&["--confirmations", "0", "test"]).is_err());
        assert_eq!(parse(&["-c", "3", "test"]).settings().confirmations, 3);
    }

    #[test]
    fn debug_dump_hides_private_key() {
        let cmd = parse(&["--sk", &format!("0x{DEV_KEY}"), "test"]);

        let wallet = cmd.sk.as_ref().unwrap().wallet().unwrap();
        let expected: Address = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap();
        assert_eq!(wallet.address(), expected);
        assert!(!format!("{:?}", cmd).contains(DEV_KEY));
    }

    #[tokio::test]
    async fn malformed_private_key_only_fails_deployments() {
        let args = ["--rpc", UNREACHABLE_RPC, "--sk", "0x1234"];

        parse(&[&args[..], &["staging"]].concat()).execute().await.unwrap();

        let err = parse(&[&args[..], &["test"]].concat()).execute().await.unwrap_err();
        assert!(err.to_string().contains("invalid deployer private key"));
    }

    #[tokio::test]
    async fn other_environments_never_touch_the_node() {
        for args in [
            vec!["--rpc", UNREACHABLE_RPC, "staging"],
            vec!["--rpc", UNREACHABLE_RPC],
            vec!["--rpc", UNREACHABLE_RPC, "-x", "staging"],
        ] {
            parse(&args).execute().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_environment_surfaces_connection_errors() {
        let cmd = parse(&["--network", "localhost", "--rpc", UNREACHABLE_RPC, "test"]);
        assert_eq!(cmd.environment, Some(Environment::Test));
        assert!(cmd.execute().await.is_err());
    }
}
