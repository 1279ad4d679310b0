use std::path::PathBuf;

use alloy_primitives::Address;
use alloy_signer_local::PrivateKeySigner;
use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use safe_delegates::{
    ChainDescriptor, ChainId, DelegateSnapshot, DelegateSyncEngine, DelegatesConfig,
    LocalKeyTransport, Session, WalletHandle,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Manage the delegates of a Safe through the Safe Transaction Service
#[derive(Debug, Parser)]
#[command(name = "safe-delegates", version, about)]
pub struct Cli {
    /// TOML configuration file; environment variables override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chain the wallet is connected to
    #[arg(long, global = true, env = "CHAIN_ID", default_value_t = 1)]
    chain_id: ChainId,

    /// Delegator key used to sign add and remove requests
    #[arg(long, global = true, env = "DELEGATOR_PRIVATE_KEY", hide_env_values = true)]
    private_key: Option<String>,

    /// Account for read-only commands when no key is given
    #[arg(long, global = true, conflicts_with = "private_key")]
    account: Option<Address>,

    /// Safe to operate on instead of the first configured one
    #[arg(long, global = true)]
    safe: Option<String>,

    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the configured Safes
    Safes,
    /// List the delegates of the active Safe
    List,
    /// Register a delegate for the active Safe
    Add {
        delegate: String,
        #[arg(long)]
        label: String,
    },
    /// Remove a delegate
    Remove { delegate: String },
}

impl Cli {
    fn load_config(&self) -> Result<DelegatesConfig> {
        let config = match &self.config {
            Some(path) => DelegatesConfig::from_file(path)?,
            None => DelegatesConfig::default(),
        };
        config.merge_env()
    }

    fn wallet(&self) -> Result<Option<WalletHandle>> {
        let Some(key) = &self.private_key else {
            return Ok(None);
        };
        let signer: PrivateKeySigner = key
            .trim()
            .parse()
            .context("Failed to parse delegator private key")?;
        let chain = ChainDescriptor::new(self.chain_id, format!("chain {}", self.chain_id));
        Ok(Some(
            LocalKeyTransport::new(signer, self.chain_id).into_wallet(Some(chain)),
        ))
    }

    fn session(&self, wallet: Option<&WalletHandle>) -> Session {
        let account = wallet.and_then(|w| w.account).or(self.account);
        match account {
            Some(account) => Session::new(account.to_string(), self.chain_id),
            None => Session::disconnected(),
        }
    }

    /// Parse arguments, run the command and print the resulting snapshot
    pub async fn execute() -> Result<()> {
        let cli = Cli::parse();
        let config = cli.load_config()?;
        let engine = DelegateSyncEngine::from_config(&config)?;

        if let Command::Safes = cli.command {
            return cli.print(&engine.snapshot());
        }

        let wallet = cli.wallet()?;
        let session = cli.session(wallet.as_ref());
        if !session.is_connected() {
            bail!("--private-key or --account is required");
        }

        engine.update_session(session);
        if let Some(safe) = &cli.safe {
            engine.select_safe(safe.as_str()).await?;
        }
        engine.connect().await?;

        match &cli.command {
            Command::Safes | Command::List => {}
            Command::Add { delegate, label } => {
                let wallet = wallet.context("--private-key is required to add a delegate")?;
                engine.add_delegate(delegate, label, &wallet).await?;
            }
            Command::Remove { delegate } => {
                let wallet = wallet.context("--private-key is required to remove a delegate")?;
                engine.remove_delegate(delegate, &wallet).await?;
            }
        }

        cli.print(&engine.snapshot())
    }

    fn print(&self, snapshot: &DelegateSnapshot) -> Result<()> {
        match self.output {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(snapshot)?);
            }
            OutputFormat::Text => print!("{}", render_text(snapshot)),
        }
        Ok(())
    }
}

fn render_text(snapshot: &DelegateSnapshot) -> String {
    let mut out = String::new();
    if snapshot.selectable_safes.is_empty() {
        out.push_str("No Safe configured\n");
    }
    for safe in &snapshot.selectable_safes {
        let marker = if snapshot.active_safe.as_deref() == Some(safe.as_str()) {
            "*"
        } else {
            " "
        };
        out.push_str(&format!("{marker} {safe}\n"));
    }
    if let Some(active) = &snapshot.active_safe {
        if !snapshot.selectable_safes.contains(active) {
            out.push_str(&format!("* {active}\n"));
        }
    }

    if !snapshot.is_connected() {
        out.push_str(&format!("Status: {:?}\n", snapshot.state));
        return out;
    }

    out.push_str(&format!("Delegates ({}):\n", snapshot.delegates.len()));
    for record in &snapshot.delegates {
        out.push_str(&format!("  {}\n", record.delegate));
    }
    out
}
