use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use bank_ledger::cli::Menu;
use bank_ledger::csv::{read_operations, write_accounts};
use bank_ledger::ledger::Bootstrap;
use bank_ledger::store::JsonFileStore;
use bank_ledger::{Amount, Ledger, WithdrawalPolicy};
use clap::{Parser, Subcommand};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(version, about = "PIN-protected account ledger with deposits, withdrawals and transfers")]
struct Args {
    /// Where the ledger is loaded from and saved to
    #[arg(long, env = "BANK_DATA_FILE", default_value = "bank_data.json")]
    data_file: PathBuf,

    /// Lowest balance a withdrawal or outgoing transfer may leave
    #[arg(long, env = "BANK_MINIMUM_BALANCE", default_value = "500.00")]
    minimum_balance: Amount,

    /// Cap on withdrawals plus outgoing transfers per account per day
    #[arg(long, env = "BANK_DAILY_LIMIT", default_value = "10000.00")]
    daily_limit: Amount,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Menu-driven session on stdin/stdout (default)
    Interactive,
    /// Apply operations from a csv file, then print balances as csv
    Batch { path: PathBuf },
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    let policy = WithdrawalPolicy {
        minimum_balance: args.minimum_balance,
        daily_limit: args.daily_limit,
    };
    let store = JsonFileStore::new(&args.data_file);
    let (ledger, origin) = Ledger::load_or_seed(&store, policy);
    let ledger = Arc::new(ledger);

    match args.command.unwrap_or(Command::Interactive) {
        Command::Interactive => interactive(ledger, &store, origin).await,
        Command::Batch { path } => batch(ledger, &store, &path).await,
    }
}

async fn interactive(ledger: Arc<Ledger>, store: &JsonFileStore, origin: Bootstrap) -> ExitCode {
    match origin {
        Bootstrap::Restored => println!("Loaded bank data from {}", store.path().display()),
        Bootstrap::Fresh => println!("Started with sample accounts (101, 102)."),
        Bootstrap::Recovered(e) => {
            println!("Failed to load saved data, starting fresh. ({e})");
            println!("Started with sample accounts (101, 102).");
        }
    }

    let masked = io::stdin().is_terminal();
    let session_ledger = Arc::clone(&ledger);
    let session = tokio::task::spawn_blocking(move || {
        Menu::new(&session_ledger, io::stdin().lock(), io::stdout(), masked).run()
    });

    tokio::select! {
        result = session => {
            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => error!(error = %e, "menu session failed"),
                Err(e) => error!(error = %e, "menu session panicked"),
            }
            save_and_report(&ledger, store, false);
            ExitCode::SUCCESS
        }
        _ = tokio::signal::ctrl_c() => {
            println!();
            println!("Interrupted, saving data...");
            save_and_report(&ledger, store, false);
            // The menu thread is blocked on stdin and cannot be joined.
            std::process::exit(0);
        }
    }
}

async fn batch(ledger: Arc<Ledger>, store: &JsonFileStore, path: &Path) -> ExitCode {
    if path.extension().is_none_or(|ext| ext != "csv") {
        warn!(path = %path.display(), "input file seems to not be a csv file");
    }

    let operations = match read_operations(path) {
        Ok(operations) => operations,
        Err(e) => {
            eprintln!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (op_sender, op_receiver) = tokio::sync::mpsc::channel(16);
    tokio::spawn(async move {
        for result in operations {
            match result {
                Ok(op) => {
                    if op_sender.send(op).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!("{e}");
                }
            }
        }
    });

    ledger.run(ReceiverStream::new(op_receiver)).await;

    if let Err(e) = write_accounts(io::stdout().lock(), &ledger.summaries()) {
        eprintln!("{e}");
        return ExitCode::FAILURE;
    }

    save_and_report(&ledger, store, true);
    ExitCode::SUCCESS
}

/// Save failures are reported but never fatal.
fn save_and_report(ledger: &Ledger, store: &JsonFileStore, quiet: bool) {
    match ledger.save(store) {
        Ok(()) if !quiet => println!("Bank data saved to {}", store.path().display()),
        Ok(()) => {}
        Err(e) => eprintln!("Failed to save bank data: {e}"),
    }
}
