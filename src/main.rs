use alloy_primitives::Address;
use certificate_claim::{
    client,
    deployment,
    draw::{
        DEFAULT_SPIN_DURATION,
        DEFAULT_SPIN_INTERVAL,
        DrawConfig,
    },
    network,
    preferences::{
        self,
        Preferences,
    },
    rpc::DEFAULT_WALLET_URL,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::{
        Path,
        PathBuf,
    },
    time::Duration,
};
use tracing_appender::{
    non_blocking::WorkerGuard,
    rolling,
};
use tracing_subscriber::{
    EnvFilter,
    fmt,
};

const DEFAULT_LOG_DIR: &str = "./logs";

fn print_usage_and_exit() -> ! {
    println!(
        "Usage: certificate-claim [--sepolia | --holesky | --local] [--chain-rpc-url <url>]\n\
         [--wallet-url <url>] [--contract <address>]\n\
         [--spin-duration-ms <ms>] [--spin-interval-ms <ms>]\n\
         [--prefs <path>] [--set-verified <true|false>] [--log-dir <path>]\n\
         \n\
         Flags:\n\
           --sepolia                   Expect the Sepolia test network (default RPC {})\n\
           --holesky                   Expect the Holesky test network (default RPC {})\n\
           --local                     Expect a local development node (default RPC {})\n\
           --chain-rpc-url <url>       Override the RPC URL offered to the wallet for the selected network\n\
           --wallet-url <url>          Wallet JSON-RPC endpoint (default {})\n\
           --contract <address>        Certificate contract address (recorded under .deployments)\n\
           --spin-duration-ms <ms>     Winner draw animation length (default {})\n\
           --spin-interval-ms <ms>     Winner draw animation step (default {})\n\
           --prefs <path>              Preferences file (default {})\n\
           --set-verified <bool>       Store the operator verification flag, then start\n\
           --log-dir <path>            Directory for daily log files (default {})",
        network::DEFAULT_SEPOLIA_RPC_URL,
        network::DEFAULT_HOLESKY_RPC_URL,
        network::DEFAULT_LOCAL_RPC_URL,
        DEFAULT_WALLET_URL,
        DEFAULT_SPIN_DURATION.as_millis(),
        DEFAULT_SPIN_INTERVAL.as_millis(),
        preferences::DEFAULT_PREFERENCES_PATH,
        DEFAULT_LOG_DIR,
    );
    std::process::exit(0);
}

struct CliArgs {
    app: client::AppConfig,
    set_verified: Option<bool>,
    log_dir: PathBuf,
}

fn next_value(args: &mut impl Iterator<Item = String>, flag: &str, what: &str) -> Result<String> {
    args.next()
        .ok_or_else(|| eyre!("{flag} requires {what} argument"))
}

fn set_once<T>(slot: &mut Option<T>, value: T, flag: &str) -> Result<()> {
    if slot.is_some() {
        return Err(eyre!("{flag} may only be specified once"));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_millis(raw: &str, flag: &str) -> Result<Duration> {
    let ms = raw
        .parse::<u64>()
        .wrap_err_with(|| format!("{flag} expects a whole number of milliseconds, got {raw}"))?;
    Ok(Duration::from_millis(ms))
}

fn parse_cli_args() -> Result<CliArgs> {
    #[derive(Clone, Copy)]
    enum NetworkFlag {
        Sepolia,
        Holesky,
        Local,
    }

    let mut args = std::env::args().skip(1);
    let mut network_flag: Option<NetworkFlag> = None;
    let mut custom_url: Option<String> = None;
    let mut wallet_url: Option<String> = None;
    let mut contract: Option<Address> = None;
    let mut spin_duration: Option<Duration> = None;
    let mut spin_interval: Option<Duration> = None;
    let mut prefs: Option<String> = None;
    let mut set_verified: Option<bool> = None;
    let mut log_dir: Option<String> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--sepolia" | "--holesky" | "--local" => {
                if network_flag.is_some() {
                    return Err(eyre!(
                        "Multiple network flags provided; choose one of --sepolia/--holesky/--local"
                    ));
                }
                network_flag = Some(match arg.as_str() {
                    "--sepolia" => NetworkFlag::Sepolia,
                    "--holesky" => NetworkFlag::Holesky,
                    _ => NetworkFlag::Local,
                });
            }
            "--chain-rpc-url" => {
                let url = next_value(&mut args, "--chain-rpc-url", "a URL")?;
                if network_flag.is_none() {
                    return Err(eyre!(
                        "--chain-rpc-url must follow a network flag (--sepolia/--holesky/--local)"
                    ));
                }
                set_once(&mut custom_url, url, "--chain-rpc-url")?;
            }
            "--wallet-url" => {
                let url = next_value(&mut args, "--wallet-url", "a URL")?;
                set_once(&mut wallet_url, url, "--wallet-url")?;
            }
            "--contract" => {
                let raw = next_value(&mut args, "--contract", "an address")?;
                let address = raw
                    .parse::<Address>()
                    .wrap_err_with(|| format!("--contract expects a 0x address, got {raw}"))?;
                set_once(&mut contract, address, "--contract")?;
            }
            "--spin-duration-ms" => {
                let raw = next_value(&mut args, "--spin-duration-ms", "a number")?;
                let duration = parse_millis(&raw, "--spin-duration-ms")?;
                set_once(&mut spin_duration, duration, "--spin-duration-ms")?;
            }
            "--spin-interval-ms" => {
                let raw = next_value(&mut args, "--spin-interval-ms", "a number")?;
                let interval = parse_millis(&raw, "--spin-interval-ms")?;
                set_once(&mut spin_interval, interval, "--spin-interval-ms")?;
            }
            "--prefs" => {
                let path = next_value(&mut args, "--prefs", "a path")?;
                set_once(&mut prefs, path, "--prefs")?;
            }
            "--set-verified" => {
                let raw = next_value(&mut args, "--set-verified", "a true/false")?;
                let flag = match raw.as_str() {
                    "true" => true,
                    "false" => false,
                    other => {
                        return Err(eyre!("--set-verified expects true or false, got {other}"));
                    }
                };
                set_once(&mut set_verified, flag, "--set-verified")?;
            }
            "--log-dir" => {
                let dir = next_value(&mut args, "--log-dir", "a path")?;
                set_once(&mut log_dir, dir, "--log-dir")?;
            }
            "--help" | "-h" => print_usage_and_exit(),
            other => return Err(eyre!("Unknown argument: {other}")),
        }
    }

    let network = match network_flag {
        None => {
            return Err(eyre!(
                "Select a network with --sepolia, --holesky, or --local"
            ));
        }
        Some(NetworkFlag::Sepolia) => client::NetworkTarget::Sepolia { url: custom_url },
        Some(NetworkFlag::Holesky) => client::NetworkTarget::Holesky { url: custom_url },
        Some(NetworkFlag::Local) => client::NetworkTarget::Local { url: custom_url },
    };

    let app = client::AppConfig {
        network,
        wallet_url: wallet_url.unwrap_or_else(|| DEFAULT_WALLET_URL.to_string()),
        contract,
        draw: DrawConfig {
            spin_duration: spin_duration.unwrap_or(DEFAULT_SPIN_DURATION),
            spin_interval: spin_interval.unwrap_or(DEFAULT_SPIN_INTERVAL),
        },
        prefs_path: preferences::resolve_path(prefs.as_deref()),
    };
    let log_dir = PathBuf::from(
        shellexpand::tilde(log_dir.as_deref().unwrap_or(DEFAULT_LOG_DIR)).into_owned(),
    );

    Ok(CliArgs {
        app,
        set_verified,
        log_dir,
    })
}

/// Logs go to a daily file since the terminal belongs to the UI.
fn init_tracing(log_dir: &Path) -> Result<WorkerGuard> {
    std::fs::create_dir_all(log_dir)
        .wrap_err_with(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let appender = rolling::daily(log_dir, "certificate-claim.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .try_init()
        .map_err(|e| eyre!("Failed to initialise tracing: {e}"))?;
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = parse_cli_args()?;
    let _guard = init_tracing(&cli.log_dir)?;
    tracing::info!("starting certificate-claim client");

    if let Some(is_verified) = cli.set_verified {
        let mut prefs = Preferences::load(&cli.app.prefs_path)?;
        prefs.is_verified = is_verified;
        prefs.save(&cli.app.prefs_path)?;
        tracing::info!(is_verified, path = %cli.app.prefs_path.display(), "stored operator flag");
    }

    deployment::ensure_structure()?;
    client::run_app(cli.app).await
}
