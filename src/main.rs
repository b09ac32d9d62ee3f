//! lumo-sign - Compute the request key the client would send.
//!
//! Useful for checking backend compatibility by hand: the printed value is
//! exactly what goes into the `key` header.

use std::env;
use std::process::ExitCode;
use std::sync::Arc;

use tracing::{debug, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use lumo_auth_client::auth::{ClockTracker, Signer, SystemClock};
use lumo_auth_client::config::Settings;
use lumo_auth_client::protocol::{Method, SignableRequest};
use lumo_auth_client::storage::{AuthStore, FileStore, MemoryStore};
use lumo_auth_client::ClientError;

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_PKG_NAME");

fn main() -> ExitCode {
    // Parse command line arguments (simple std::env approach)
    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path =
        get_arg(&args, "--config", "-c").unwrap_or_else(|| "/etc/lumo/client.toml".to_string());

    // Load configuration
    let settings = match Settings::load(&config_path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Initialize logging based on configuration
    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    info!("Configuration loaded from: {}", config_path);

    match run(&settings, &args) {
        Ok(key) => {
            println!("{}", key);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Sign the request described on the command line.
fn run(settings: &Settings, args: &[String]) -> Result<String, ClientError> {
    let url = get_arg(args, "--url", "-u").ok_or_else(|| ClientError::Config {
        message: "--url is required".to_string(),
    })?;
    let method = match get_arg(args, "--method", "-m") {
        Some(name) => parse_method(&name)?,
        None => Method::GET,
    };
    let body = get_arg(args, "--body", "-d").map(String::into_bytes);

    let store: Arc<dyn AuthStore> = match &settings.storage.path {
        Some(path) => Arc::new(FileStore::open(path)?),
        None => Arc::new(MemoryStore::new()),
    };

    let device_id = match get_arg(args, "--device-id", "-i") {
        Some(id) => id,
        None => store.token().ok_or_else(|| ClientError::Config {
            message: "no --device-id given and no device token stored".to_string(),
        })?,
    };

    let timestamp = match get_arg(args, "--timestamp", "-t") {
        Some(value) => value.parse::<f64>().map_err(|e| ClientError::Config {
            message: format!("Invalid timestamp '{}': {}", value, e),
        })?,
        None => ClockTracker::new(store, Arc::new(SystemClock)).authenticated_now(),
    };

    let signer = Signer::new(
        settings.credentials.load_secret()?,
        settings.credentials.secret_id.clone(),
    );
    debug!(method = %method, url = %url, timestamp, "Signing request");
    let request = SignableRequest::parse(method, &url, body)?;

    signer.sign(&device_id, &request, timestamp)
}

fn parse_method(name: &str) -> Result<Method, ClientError> {
    match name.to_uppercase().as_str() {
        "GET" => Ok(Method::GET),
        "POST" => Ok(Method::POST),
        "PUT" => Ok(Method::PUT),
        "DELETE" => Ok(Method::DELETE),
        other => Err(ClientError::Config {
            message: format!("Unsupported method '{}'", other),
        }),
    }
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Compute the signed request key for an API request.

USAGE:
    {} [OPTIONS] --url <URL>

OPTIONS:
    -c, --config <PATH>       Path to configuration file
                              [default: /etc/lumo/client.toml]
    -u, --url <URL>           Absolute request URL, including any query
    -m, --method <METHOD>     GET, POST, PUT or DELETE [default: GET]
    -d, --body <TEXT>         Request body
    -i, --device-id <ID>      Device token [default: the stored token]
    -t, --timestamp <SECS>    Seconds since the epoch
                              [default: now, corrected by the stored offset]
    -h, --help                Print help information
    -V, --version             Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Get an option value from command line arguments.
fn get_arg(args: &[String], long: &str, short: &str) -> Option<String> {
    let prefix = format!("{}=", long);
    for (i, arg) in args.iter().enumerate() {
        if (arg == long || arg == short) && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
        if let Some(value) = arg.strip_prefix(prefix.as_str()) {
            return Some(value.to_string());
        }
    }
    None
}

/// Initialize logging based on settings.
///
/// Logs go to stderr so stdout carries only the key.
fn init_logging(settings: &Settings) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));

    match settings.logging.format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .try_init()?;
        }
        _ => {
            // Default to pretty format
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty().with_writer(std::io::stderr))
                .try_init()?;
        }
    }

    Ok(())
}
