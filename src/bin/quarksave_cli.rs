//! quarksave CLI - browse Quark drive shares and save them into your drive
//!
//! Usage:
//!   quarksave-cli login [--cookie <line>]              Store and check session cookies
//!   quarksave-cli list <url> [-p pwd] [-d depth]         Show a share's files
//!   quarksave-cli save <url> <selection> <to_dir>        Save selected files
//!   quarksave-cli dirs                                   List your directories
//!   quarksave-cli mkdir <name> [--parent <id>]           Create a directory
//!   quarksave-cli interactive <url> [-p pwd] [--auto]     Pick files and destination at prompts

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::Level;

use quarksave::credential_store::{default_cookies_path, CookieStore};
use quarksave::directory::DirectoryResolver;
use quarksave::interactive::{choose_destination, choose_files, Console, Destination, SaveSummary};
use quarksave::providers::{HttpTransport, ROOT_DIR_ID};
use quarksave::render::{render_directory_index, render_file_table, render_tree};
use quarksave::selection::resolve;
use quarksave::transfer::{TransferOrchestrator, TransferReport};
use quarksave::traversal::{MaxDepth, ShareWalker, Traversal};
use quarksave::{ClientConfig, FileRecord, ProviderError, QuarkClient, ShareLink, ShareSession};

#[derive(Parser)]
#[command(
    name = "quarksave-cli",
    about = "quarksave CLI - browse Quark drive shares and save them into your drive",
    version,
    long_about = "Share links look like https://pan.quark.cn/s/<id>?pwd=<code>.\nSettings come from QUARK_* environment variables."
)]
struct Cli {
    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Save session cookies and check that they work
    Login {
        /// Browser cookie line (read from stdin when omitted)
        #[arg(long)]
        cookie: Option<String>,
    },
    /// Show the files of a share
    List {
        /// Share link
        url: String,
        /// Share passcode (overrides the link's pwd=)
        #[arg(short, long)]
        pwd: Option<String>,
        /// Folder levels to descend below the top level, -1 for all
        #[arg(short, long, default_value_t = -1, allow_negative_numbers = true)]
        depth: i64,
        /// Print JSON instead of a tree
        #[arg(long)]
        json: bool,
    },
    /// Save selected files of a share into your drive
    Save {
        /// Share link
        url: String,
        /// all, 1-10, 1,3,5, *.mkv, video, zip, mkv ... or a comma list of file ids
        selection: String,
        /// Destination: /path/in/drive or a directory id
        to_dir: String,
        /// Share passcode (overrides the link's pwd=)
        #[arg(short, long)]
        pwd: Option<String>,
        /// Seconds to wait for the save job
        #[arg(long)]
        timeout: Option<u64>,
        /// Create the destination path if it does not exist
        #[arg(long)]
        create: bool,
        /// Print the transfer report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List every directory in your drive
    Dirs {
        #[arg(long)]
        json: bool,
    },
    /// Create a directory in your drive
    Mkdir {
        name: String,
        /// Parent directory id
        #[arg(long, default_value = ROOT_DIR_ID)]
        parent: String,
    },
    /// Browse a share, then choose files and a destination at prompts
    Interactive {
        /// Share link
        url: String,
        /// Share passcode (overrides the link's pwd=)
        #[arg(short, long)]
        pwd: Option<String>,
        /// Seconds to wait for the save job
        #[arg(long)]
        timeout: Option<u64>,
        /// Save every file to the drive root without asking
        #[arg(long)]
        auto: bool,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn cookies_path(config: &ClientConfig) -> anyhow::Result<PathBuf> {
    match &config.cookies_path {
        Some(path) => Ok(path.clone()),
        None => Ok(default_cookies_path()?),
    }
}

fn connect(config: &ClientConfig) -> anyhow::Result<QuarkClient> {
    let store = CookieStore::load(&cookies_path(config)?)?;
    let transport = HttpTransport::new(config, store.cookie_header()?)?;
    Ok(QuarkClient::new(Arc::new(transport), config.clone()))
}

async fn open_share(client: &QuarkClient, url: &str, pwd: Option<String>) -> anyhow::Result<ShareSession> {
    let link = ShareLink::parse(url)?.with_passcode(pwd);
    Ok(client.open_share(&link).await?)
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Selection expression first; when it matches nothing, read it as file ids
fn pick_files<'f>(selection: &str, files: &'f [FileRecord]) -> Vec<&'f FileRecord> {
    let picked = resolve(selection, files);
    if !picked.is_empty() {
        return picked;
    }
    let ids: Vec<&str> = selection.split(',').map(str::trim).filter(|s| !s.is_empty()).collect();
    files.iter().filter(|f| ids.contains(&f.id.as_str())).collect()
}

async fn destination(client: &QuarkClient, to_dir: &str, create: bool) -> anyhow::Result<String> {
    if !to_dir.starts_with('/') {
        return Ok(to_dir.to_string());
    }
    let resolver = DirectoryResolver::new(client);
    let id = if create {
        resolver.ensure_path(to_dir).await?
    } else {
        resolver
            .resolve_directory(to_dir)
            .await
            .with_context(|| format!("Destination {} does not exist (use --create)", to_dir))?
    };
    Ok(id)
}

async fn login(config: &ClientConfig, cookie: Option<String>) -> anyhow::Result<ExitCode> {
    let line = match cookie {
        Some(line) => line,
        None => {
            eprint!("Paste the Cookie header from a logged-in pan.quark.cn tab: ");
            std::io::stderr().flush()?;
            let mut line = String::new();
            std::io::stdin().read_line(&mut line)?;
            line
        }
    };

    let mut store = CookieStore::new(cookies_path(config)?);
    store.set_from_cookie_line(&line)?;
    store.save()?;

    connect(config)?.validate_session().await?;
    println!("Logged in. {} cookies saved to {}", store.len(), store.path().display());
    Ok(ExitCode::SUCCESS)
}

async fn list(config: &ClientConfig, url: &str, pwd: Option<String>, depth: i64, json: bool) -> anyhow::Result<ExitCode> {
    let max_depth = MaxDepth::from_signed(depth)?;
    let client = connect(config)?;
    let share = open_share(&client, url, pwd).await?;
    let traversal: Traversal = ShareWalker::new(&client, &share).traverse_root(max_depth).await?;

    if json {
        print_json(&traversal)?;
    } else {
        print!("{}", render_tree(&traversal.tree));
        println!();
        print!("{}", render_file_table(&traversal.files));
    }
    Ok(ExitCode::SUCCESS)
}

#[allow(clippy::too_many_arguments)]
async fn save(
    config: &ClientConfig,
    url: &str,
    selection: &str,
    to_dir: &str,
    pwd: Option<String>,
    timeout: Option<u64>,
    create: bool,
    json: bool,
) -> anyhow::Result<ExitCode> {
    let client = connect(config)?;
    let share = open_share(&client, url, pwd).await?;
    let traversal = ShareWalker::new(&client, &share)
        .traverse_root(MaxDepth::Unbounded)
        .await?;

    let picked = pick_files(selection, &traversal.files);
    if picked.is_empty() {
        bail!("Selection '{}' matched none of the {} files", selection, traversal.files.len());
    }
    let dest_id = destination(&client, to_dir, create).await?;

    let orchestrator = TransferOrchestrator::new(&client);
    let job_id = orchestrator.submit_records(&share, &picked, &dest_id).await?;
    if !json {
        println!("Saving {} files to {} (job {})", picked.len(), to_dir, job_id);
    }
    let report = wait_with_progress(config, &orchestrator, &job_id, timeout, json).await?;

    if json {
        print_json(&report)?;
    } else {
        println!("Job {}: {:?} after {} polls", report.job_id, report.outcome, report.polls);
    }
    Ok(if report.outcome.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// Wait for `job_id` behind a progress bar; Ctrl-C abandons the wait
async fn wait_with_progress(
    config: &ClientConfig,
    orchestrator: &TransferOrchestrator<'_>,
    job_id: &str,
    timeout: Option<u64>,
    quiet: bool,
) -> anyhow::Result<TransferReport> {
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_ctrl_c.cancel();
        }
    });

    let bar = if quiet { ProgressBar::hidden() } else { ProgressBar::new(100) };
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{elapsed_precise}] [{bar:40}] {pos:>3}% {msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(120));

    let wait = timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.transfer_timeout());
    let report = orchestrator
        .await_completion(job_id, wait, &cancel, |job| {
            bar.set_position(u64::from(job.progress_percent));
            bar.set_message(job.status.to_string());
        })
        .await?;
    bar.finish_and_clear();
    Ok(report)
}

async fn dirs(config: &ClientConfig, json: bool) -> anyhow::Result<ExitCode> {
    let client = connect(config)?;
    let entries = DirectoryResolver::new(&client).build_index().await?;
    if json {
        print_json(&entries)?;
    } else {
        print!("{}", render_directory_index(&entries));
    }
    Ok(ExitCode::SUCCESS)
}

async fn mkdir(config: &ClientConfig, name: &str, parent: &str) -> anyhow::Result<ExitCode> {
    let client = connect(config)?;
    let id = DirectoryResolver::new(&client).create_directory(name, parent).await?;
    println!("{}", id);
    Ok(ExitCode::SUCCESS)
}

async fn interactive(
    config: &ClientConfig,
    url: &str,
    pwd: Option<String>,
    timeout: Option<u64>,
    auto: bool,
) -> anyhow::Result<ExitCode> {
    let client = connect(config)?;
    let share = open_share(&client, url, pwd).await?;
    let traversal = ShareWalker::new(&client, &share)
        .traverse_root(MaxDepth::Unbounded)
        .await?;
    if traversal.files.is_empty() {
        bail!("The share has no files");
    }
    print!("{}", render_file_table(&traversal.files));

    let (picked, target): (Vec<&FileRecord>, Destination) = if auto {
        (traversal.files.iter().collect(), Destination::root())
    } else {
        let mut console = Console::new(std::io::stdin().lock(), std::io::stdout());
        let Some(picked) = choose_files(&mut console, &traversal.files)? else {
            println!("Cancelled.");
            return Ok(ExitCode::FAILURE);
        };
        let Some(target) = choose_destination(&mut console, &DirectoryResolver::new(&client)).await? else {
            println!("Cancelled.");
            return Ok(ExitCode::FAILURE);
        };
        (picked, target)
    };

    let orchestrator = TransferOrchestrator::new(&client);
    let job_id = orchestrator.submit_records(&share, &picked, &target.id).await?;
    println!("Saving {} files to {} (job {})", picked.len(), target.path, job_id);
    let report = wait_with_progress(config, &orchestrator, &job_id, timeout, false).await?;

    let summary = SaveSummary::new(&report, picked.len(), &target);
    println!("{}", serde_json::to_string(&summary)?);
    Ok(if report.outcome.is_success() { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let config = ClientConfig::from_env()?;
    match cli.command {
        Commands::Login { cookie } => login(&config, cookie).await,
        Commands::List { url, pwd, depth, json } => list(&config, &url, pwd, depth, json).await,
        Commands::Save { url, selection, to_dir, pwd, timeout, create, json } => {
            save(&config, &url, &selection, &to_dir, pwd, timeout, create, json).await
        }
        Commands::Dirs { json } => dirs(&config, json).await,
        Commands::Mkdir { name, parent } => mkdir(&config, &name, &parent).await,
        Commands::Interactive { url, pwd, timeout, auto } => {
            interactive(&config, &url, pwd, timeout, auto).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            if e.downcast_ref::<ProviderError>().is_some_and(ProviderError::needs_reauth) {
                eprintln!("Run `quarksave-cli login` with fresh cookies.");
            }
            ExitCode::FAILURE
        }
    }
}
