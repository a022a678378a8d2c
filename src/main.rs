//! apisec - sign, verify and manage keys for API request authentication.

use std::env;
use std::net::IpAddr;
use std::path::Path;
use std::process::ExitCode;

use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use api_security::auth::{Signer, Verifier};
use api_security::config::Settings;
use api_security::keys::{KeyPair, SharedKey, DEFAULT_KEY_BITS, DEFAULT_SHARED_KEY_BYTES};
use api_security::nonce::Nonce;
use api_security::protocol::{RequestParams, RESERVED_FIELDS};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const NAME: &str = env!("CARGO_BIN_NAME");

type CommandResult = Result<(), Box<dyn std::error::Error>>;

fn main() -> ExitCode {
    let mut args: Vec<String> = env::args().skip(1).collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return ExitCode::SUCCESS;
    }

    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("{} {}", NAME, VERSION);
        return ExitCode::SUCCESS;
    }

    let config_path = match take_option(&mut args, "--config", Some("-c")) {
        Ok(path) => path,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    // Without --config the built-in defaults apply
    let settings = match &config_path {
        Some(path) => match Settings::load(path) {
            Ok(s) => s,
            Err(e) => {
                eprintln!("Error loading configuration: {}", e);
                return ExitCode::FAILURE;
            }
        },
        None => Settings::default(),
    };

    if let Err(e) = init_logging(&settings) {
        eprintln!("Error initializing logging: {}", e);
        return ExitCode::FAILURE;
    }

    if let Some(path) = &config_path {
        info!("Configuration loaded from: {}", path);
    }

    if args.is_empty() {
        print_help();
        return ExitCode::FAILURE;
    }
    let command = args.remove(0);

    let result = match command.as_str() {
        "keygen" => keygen(args),
        "shared-key" => shared_key(args),
        "nonce" => nonce(&settings, args),
        "sign" => sign(&settings, args),
        "verify" => verify(&settings, args),
        other => Err(format!("Unknown command '{}', see --help", other).into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(command = %command, error = %e, "Command failed");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

/// Generate an RSA key pair and write it to two PEM files.
fn keygen(mut args: Vec<String>) -> CommandResult {
    let bits = match take_option(&mut args, "--bits", None)? {
        Some(value) => value.parse()?,
        None => DEFAULT_KEY_BITS,
    };
    let [public_path, private_path] = positional::<2>(args, "keygen <PUBLIC_PATH> <PRIVATE_PATH>")?;

    let key_pair = KeyPair::generate(bits)?;
    key_pair.store(Path::new(&public_path), Path::new(&private_path))?;

    println!("Public key written to {}", public_path);
    println!("Private key written to {}", private_path);
    Ok(())
}

/// Generate a shared HMAC secret and write it to a file.
fn shared_key(mut args: Vec<String>) -> CommandResult {
    let length = match take_option(&mut args, "--length", None)? {
        Some(value) => value.parse()?,
        None => DEFAULT_SHARED_KEY_BYTES,
    };
    let [path] = positional::<1>(args, "shared-key <PATH>")?;

    SharedKey::generate(length)?.store(Path::new(&path))?;

    println!("Shared key written to {}", path);
    Ok(())
}

/// Print a fresh nonce token.
fn nonce(settings: &Settings, mut args: Vec<String>) -> CommandResult {
    let length = match take_option(&mut args, "--length", None)? {
        Some(value) => value.parse()?,
        None => settings.nonce.byte_length,
    };
    positional::<0>(args, "nonce")?;

    println!("{}", Nonce::with_length(length));
    Ok(())
}

/// Sign KEY=VALUE parameters and print the signed query string.
fn sign(settings: &Settings, mut args: Vec<String>) -> CommandResult {
    let use_hmac = take_flag(&mut args, "--hmac");

    let mut params = RequestParams::new();
    for arg in args {
        let (name, value) = arg
            .split_once('=')
            .ok_or_else(|| format!("Expected KEY=VALUE, got '{}'", arg))?;
        if RESERVED_FIELDS.contains(&name) {
            return Err(format!("'{}' is a reserved parameter name", name).into());
        }
        params.insert(name, value);
    }

    let signer = Signer::new().with_nonce_length(settings.nonce.byte_length);
    if use_hmac {
        let key = settings
            .shared_key()?
            .ok_or("No shared key configured ([keys] shared_key)")?;
        signer.with_shared_key(key).create_hmac(&mut params)?;
    } else {
        let key = settings
            .signing_key()?
            .ok_or("No private key configured ([keys] private_key)")?;
        signer
            .with_key_pair(key)
            .create_signature(&mut params)
            .ok_or("No signature was produced, check the private key")?;
    }

    println!("{}", params.to_query());
    Ok(())
}

/// Verify a signed query string.
fn verify(settings: &Settings, mut args: Vec<String>) -> CommandResult {
    let use_hmac = take_flag(&mut args, "--hmac");
    let ip: IpAddr = match take_option(&mut args, "--ip", None)? {
        Some(value) => value.parse()?,
        None => IpAddr::from([127, 0, 0, 1]),
    };
    let [query] = positional::<1>(args, "verify <QUERY>")?;
    let params = RequestParams::from_query(&query)?;

    let verifier = Verifier::new(settings.memory_ledger());
    if use_hmac {
        let key = settings
            .shared_key()?
            .ok_or("No shared key configured ([keys] shared_key)")?;
        verifier.with_shared_key(key).verify_hmac(&params, ip)?;
    } else {
        let key = settings
            .verifying_key()?
            .ok_or("No public key configured ([keys] public_key)")?;
        verifier.with_key_pair(key).verify_signature(&params, ip)?;
    }

    println!("OK");
    Ok(())
}

/// Remove `--name VALUE` or `--name=VALUE` (or the short form) from `args`.
fn take_option(
    args: &mut Vec<String>,
    long: &str,
    short: Option<&str>,
) -> Result<Option<String>, String> {
    let prefix = format!("{}=", long);
    for i in 0..args.len() {
        if let Some(value) = args[i].strip_prefix(&prefix) {
            let value = value.to_string();
            args.remove(i);
            return Ok(Some(value));
        }
        if args[i] == long || Some(args[i].as_str()) == short {
            if i + 1 >= args.len() {
                return Err(format!("{} requires a value", long));
            }
            let value = args.remove(i + 1);
            args.remove(i);
            return Ok(Some(value));
        }
    }
    Ok(None)
}

/// Remove a boolean flag from `args`, returning whether it was present.
fn take_flag(args: &mut Vec<String>, flag: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != flag);
    args.len() != before
}

/// Require exactly `N` remaining positional arguments.
fn positional<const N: usize>(args: Vec<String>, usage: &str) -> Result<[String; N], String> {
    if let Some(unknown) = args.iter().find(|a| a.starts_with("--")) {
        return Err(format!("Unknown option '{}'", unknown));
    }
    args.try_into()
        .map_err(|_| format!("Usage: {} {}", NAME, usage))
}

/// Print help message.
fn print_help() {
    println!(
        r#"{} {}
Sign and verify API request parameters.

USAGE:
    {} [OPTIONS] <COMMAND>

COMMANDS:
    keygen <PUBLIC_PATH> <PRIVATE_PATH> [--bits N]
                           Generate an RSA key pair [default bits: 2048]
    shared-key <PATH> [--length N]
                           Generate a shared HMAC secret [default length: 32]
    nonce [--length N]     Print a fresh nonce
    sign [--hmac] KEY=VALUE...
                           Sign parameters and print the signed query string
    verify [--hmac] [--ip ADDR] <QUERY>
                           Verify a signed query string [default ip: 127.0.0.1]

OPTIONS:
    -c, --config <PATH>    Path to configuration file
    -h, --help             Print help information
    -V, --version          Print version information
"#,
        NAME, VERSION, NAME
    );
}

/// Initialize logging based on settings.
///
/// Logs go to stderr so command output on stdout stays clean.
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
