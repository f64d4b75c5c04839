//! Courier keytool binary.
//!
//! # Usage
//!
//! ```bash
//! # Create a device
//! courier-keytool --state device.cbor init
//!
//! # Mint five one-time prekeys and write the bundle for the key service
//! courier-keytool --state device.cbor publish --count 5 --out bundle.cbor
//!
//! # Rotate the signed prekey
//! courier-keytool --state device.cbor rotate --out rotated.cbor
//!
//! # Check a bundle fetched from the key service
//! courier-keytool verify --bundle fetched.cbor
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use courier_crypto::{DEFAULT_BUNDLE_SIZE, SystemEnv};
use courier_keytool::KeytoolError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Courier device key management
#[derive(Parser, Debug)]
#[command(name = "courier-keytool")]
#[command(about = "Manage Courier device identity and prekeys")]
#[command(version)]
struct Args {
    /// Path to the device state file
    #[arg(short, long, default_value = "device.cbor")]
    state: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create a new device identity
    Init {
        /// Overwrite an existing state file
        #[arg(long)]
        force: bool,
    },

    /// Mint one-time prekeys and write a bundle for the key service
    Publish {
        /// Number of one-time prekeys to mint
        #[arg(short, long, default_value_t = DEFAULT_BUNDLE_SIZE)]
        count: u32,

        /// Bundle output path
        #[arg(short, long, default_value = "bundle.cbor")]
        out: PathBuf,
    },

    /// Replace the signed prekey
    Rotate {
        /// Optional output path for the re-publication bundle
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Show fingerprint and prekey bookkeeping
    Inspect,

    /// Decode a bundle file and verify its signed prekey signature
    Verify {
        /// Bundle to check
        #[arg(short, long, default_value = "bundle.cbor")]
        bundle: PathBuf,
    },

    /// Run an in-memory handshake and message exchange
    Selftest,
}

fn main() -> Result<(), KeytoolError> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let env = SystemEnv::new();

    match args.command {
        Command::Init { force } => {
            let fingerprint = courier_keytool::init(&args.state, force, &env)?;
            tracing::info!("Created device {} at {}", fingerprint, args.state.display());
        },
        Command::Publish { count, out } => {
            let bundle = courier_keytool::publish(&args.state, count, &out, &env)?;
            tracing::info!(
                signed_prekey_id = bundle.signed_prekey_id,
                one_time_prekeys = bundle.one_time_prekeys.len(),
                "Wrote bundle to {}",
                out.display()
            );
        },
        Command::Rotate { out } => {
            let bundle = courier_keytool::rotate(&args.state, out.as_deref(), &env)?;
            tracing::info!(signed_prekey_id = bundle.signed_prekey_id, "Rotated signed prekey");
        },
        Command::Inspect => {
            let inspection = courier_keytool::inspect(&args.state)?;
            tracing::info!("Fingerprint: {}", inspection.fingerprint);
            tracing::info!("Signed prekey: {:?}", inspection.signed_prekey_id);
            tracing::info!("Next one-time prekey id: {}", inspection.next_one_time_prekey_id);
            tracing::info!(
                "Unconsumed one-time prekeys ({}): {:?}",
                inspection.one_time_prekey_ids.len(),
                inspection.one_time_prekey_ids
            );
        },
        Command::Verify { bundle } => {
            let verified = courier_keytool::read_bundle(&bundle)?;
            tracing::info!(
                signed_prekey_id = verified.signed_prekey_id,
                one_time_prekeys = verified.one_time_prekeys.len(),
                "Bundle from {} verified",
                verified.identity.fingerprint()
            );
        },
        Command::Selftest => {
            let report = courier_keytool::selftest(&env)?;
            tracing::info!(
                messages = report.messages,
                restored = report.restored,
                "Self-test passed"
            );
        },
    }

    Ok(())
}
