//! chainfollow: follow an algod node round by round and run handlers on each block.
//!
//! ```text
//! chainfollow -d $ALGORAND_DATA --progress-file progress.log
//! chainfollow --algod-address 127.0.0.1:8080 --algod-token $TOKEN --raw-api
//! chainfollow --blockfile-glob 'blocks/*.msgp' --print-blocks
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use chainfollow_algod::{AlgodAuth, AlgodClient, AlgodConfig};
use chainfollow_core::{EngineBuilder, FormatPreference, NodeClient};

mod handlers;
mod logging;

use handlers::{BlockPrinter, LargeTransferPrinter, RoundCounter};

#[derive(Parser)]
#[command(
    name = "chainfollow",
    about = "Follow an algod node and run block/transaction handlers on every round",
    long_about = "
Follows an algod node one round at a time, resuming from a progress file.
A second SIGINT/SIGTERM exits immediately; the first finishes the current round.

ENVIRONMENT VARIABLES:
  ALGORAND_DATA   node data directory (algod.net, algod.token)
  RUST_LOG        log filter, overrides --verbose
",
    version
)]
struct Cli {
    /// Node data directory holding algod.net and algod.token
    #[arg(short = 'd', long = "algod", env = "ALGORAND_DATA")]
    algod: Option<PathBuf>,

    /// Node address, e.g. 127.0.0.1:8080 (overrides the data directory)
    #[arg(long)]
    algod_address: Option<String>,

    /// API token sent as X-Algo-API-Token
    #[arg(long)]
    algod_token: Option<String>,

    /// Custom auth header instead of the token
    #[arg(long, value_name = "NAME:VALUE")]
    algod_header: Option<String>,

    /// Append-only file recording each processed round
    #[arg(long)]
    progress_file: Option<PathBuf>,

    /// Read blocks from files matching this glob (sorted) instead of polling
    #[arg(long)]
    blockfile_glob: Option<String>,

    /// Request the raw block format, falling back to JSON if unsupported
    #[arg(long)]
    raw_api: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON structured logs
    #[arg(long)]
    json_logs: bool,

    /// Attempts per round before giving up
    #[arg(long, default_value_t = 3)]
    retries: u32,

    /// Print transactions moving more than this amount
    #[arg(long, default_value_t = LargeTransferPrinter::DEFAULT_THRESHOLD)]
    big_amount: u64,

    /// Print every block that carries transactions
    #[arg(long)]
    print_blocks: bool,
}

impl Cli {
    fn auth(&self) -> Result<Option<AlgodAuth>> {
        if let Some(header) = &self.algod_header {
            return Ok(Some(AlgodAuth::parse_header(header)?));
        }
        Ok(self.algod_token.clone().map(AlgodAuth::Token))
    }

    fn node(&self) -> Result<Option<Arc<dyn NodeClient>>> {
        let config = match (&self.algod_address, &self.algod) {
            (Some(address), _) => AlgodConfig::new(address, self.auth()?.unwrap_or(AlgodAuth::None)),
            (None, Some(dir)) => {
                let mut config = AlgodConfig::from_data_dir(dir)
                    .with_context(|| format!("reading algod data directory {}", dir.display()))?;
                if let Some(auth) = self.auth()? {
                    config.auth = auth;
                }
                config
            }
            (None, None) => return Ok(None),
        };
        tracing::info!(address = %config.address, "following algod");
        let client: Arc<dyn NodeClient> = Arc::new(AlgodClient::new(config)?);
        Ok(Some(client))
    }

    fn block_files(&self) -> Result<Option<Vec<PathBuf>>> {
        let Some(pattern) = &self.blockfile_glob else {
            return Ok(None);
        };
        let mut files = glob::glob(pattern)
            .with_context(|| format!("invalid block file glob {pattern:?}"))?
            .collect::<Result<Vec<_>, _>>()?;
        files.sort();
        tracing::info!(pattern = %pattern, files = files.len(), "reading block files");
        Ok(Some(files))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose, cli.json_logs);

    let node = cli.node()?;
    let files = cli.block_files()?;
    if node.is_none() && files.is_none() {
        bail!("no block source: pass -d/--algod, --algod-address or --blockfile-glob");
    }

    let mut builder = EngineBuilder::new().retries(cli.retries);
    if let Some(node) = node {
        builder = builder.node(node);
    }
    if let Some(files) = files {
        builder = builder.block_files(files);
    }
    if let Some(path) = &cli.progress_file {
        builder = builder.progress_file(path);
    }
    if cli.raw_api {
        builder = builder.format(FormatPreference::Raw);
    }
    builder = if cli.print_blocks {
        builder.on_block(Arc::new(BlockPrinter))
    } else {
        builder.on_block(Arc::new(RoundCounter::default()))
    };
    builder = builder.on_txn(Arc::new(LargeTransferPrinter::new(cli.big_amount)));

    let mut engine = builder.build()?;

    let stop = engine.stop_handle();
    tokio::spawn(async move {
        match stop.forward_signals().await {
            Ok(()) => {
                eprintln!("second stop request, exiting now");
                std::process::exit(1);
            }
            Err(e) => tracing::error!(error = %e, "signal listener failed"),
        }
    });

    engine.run().await.context("follower stopped on error")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn header_overrides_token() {
        let cli = Cli::parse_from([
            "chainfollow",
            "--algod-address",
            "127.0.0.1:8080",
            "--algod-token",
            "t",
            "--algod-header",
            "X-API-Key:k",
        ]);
        assert_eq!(
            cli.auth().unwrap(),
            Some(AlgodAuth::Header {
                name: "X-API-Key".into(),
                value: "k".into()
            })
        );
    }

    #[test]
    fn glob_matches_are_sorted() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.json", "c.json", "a.json"] {
            std::fs::write(dir.path().join(name), "{}").unwrap();
        }
        let pattern = format!("{}/*.json", dir.path().display());
        let cli = Cli::parse_from(["chainfollow", "--blockfile-glob", pattern.as_str()]);
        let files = cli.block_files().unwrap().unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.json", "b.json", "c.json"]);
    }
}
