//! AtlasLock CLI Client
//!
//! Command-line interface for taking and releasing locks.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, SystemTime};

use atlaslock::store::KvStore;
use atlaslock::{
    CancelToken, Config, KeyTtl, LockCoordinator, LockError, LockHandle, LockPolicy,
    OwnershipToken, RemoteStore, Result,
};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

/// AtlasLock CLI
#[derive(Parser, Debug)]
#[command(name = "atlaslock-cli")]
#[command(about = "CLI for AtlasLock distributed locks")]
#[command(version)]
struct Args {
    /// Store address (host:port, or redis://... with the `redis` feature)
    #[arg(short, long, default_value = "127.0.0.1:7379")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ping the store
    Ping,

    /// Show the token holding a key
    Get {
        /// The lock key
        key: String,
    },

    /// Show the remaining lease on a key
    Ttl {
        /// The lock key
        key: String,
    },

    /// Acquire a lock and print its token
    Acquire {
        /// The lock key
        key: String,

        /// Lease in milliseconds
        #[arg(short, long, default_value = "300000")]
        lease_ms: u64,

        /// Poll until acquired instead of failing immediately
        #[arg(short, long)]
        wait: bool,

        /// Wait budget in milliseconds (with --wait)
        #[arg(short, long, default_value = "300000")]
        timeout_ms: u64,

        /// Poll interval in milliseconds (with --wait)
        #[arg(short, long, default_value = "10")]
        poll_ms: u64,

        /// Write the lock handle here for a later `release --handle-file`
        #[arg(long)]
        handle_file: Option<PathBuf>,
    },

    /// Release a lock by key and token, or from a handle file
    Release {
        /// The lock key
        #[arg(required_unless_present = "handle_file")]
        key: Option<String>,

        /// Token printed by `acquire`
        #[arg(required_unless_present = "handle_file")]
        token: Option<String>,

        /// Handle written by `acquire --handle-file`
        #[arg(long, conflicts_with_all = ["key", "token"])]
        handle_file: Option<PathBuf>,
    },

    /// Extend the lease of a lock we hold
    Renew {
        /// The lock key
        key: String,

        /// Token printed by `acquire`
        token: String,

        /// New lease in milliseconds
        #[arg(short, long, default_value = "300000")]
        lease_ms: u64,
    },
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let config = Config::builder().store_addr(&args.server).build();

    let result = if args.server.starts_with("redis://") {
        connect_redis(&config).and_then(|coordinator| execute(&coordinator, args.command))
    } else {
        RemoteStore::connect(&config)
            .map(LockCoordinator::new)
            .and_then(|coordinator| execute(&coordinator, args.command))
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(if e.is_contention() { 2 } else { 1 })
        }
    }
}

#[cfg(feature = "redis")]
fn connect_redis(config: &Config) -> Result<LockCoordinator<atlaslock::store::RedisStore>> {
    atlaslock::store::RedisStore::connect(config).map(LockCoordinator::new)
}

#[cfg(not(feature = "redis"))]
fn connect_redis(_config: &Config) -> Result<LockCoordinator<RemoteStore>> {
    Err(LockError::Config(
        "redis:// addresses need the `redis` feature".to_string(),
    ))
}

/// Run one subcommand; exit code 3 means "did nothing" (not held / not found)
fn execute<S: KvStore>(coordinator: &LockCoordinator<S>, command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Ping => {
            coordinator.store().ping()?;
            println!("PONG");
        }
        Commands::Get { key } => match coordinator.holder(&key)? {
            Some(token) => println!("{}", token),
            None => {
                println!("(nil)");
                return Ok(ExitCode::from(3));
            }
        },
        Commands::Ttl { key } => match coordinator.store().ttl(&key)? {
            KeyTtl::Missing => println!("(missing)"),
            KeyTtl::Persistent => println!("(no expiry)"),
            KeyTtl::Expires(left) => println!("{}ms", left.as_millis()),
        },
        Commands::Acquire {
            key,
            lease_ms,
            wait,
            timeout_ms,
            poll_ms,
            handle_file,
        } => {
            let handle = if wait {
                let policy = LockPolicy::from_millis(lease_ms, poll_ms, timeout_ms);
                coordinator.acquire_with_wait(&key, &policy, &CancelToken::never())?
            } else {
                coordinator.acquire(&key, Duration::from_millis(lease_ms))?
            };
            if let Some(path) = handle_file {
                handle.write_to(&path)?;
            }
            println!("{}", handle.token());
        }
        Commands::Release {
            key,
            token,
            handle_file,
        } => {
            let handle = match (handle_file, key, token) {
                (Some(path), _, _) => LockHandle::read_from(&path)?,
                (None, Some(key), Some(token)) => handle_from_args(key, &token, Duration::ZERO)?,
                _ => return Err(LockError::Config("need KEY TOKEN or --handle-file".to_string())),
            };
            if !coordinator.release(&handle)? {
                println!("not released");
                return Ok(ExitCode::from(3));
            }
            println!("released");
        }
        Commands::Renew {
            key,
            token,
            lease_ms,
        } => {
            let lease = Duration::from_millis(lease_ms);
            let mut handle = handle_from_args(key, &token, lease)?;
            if !coordinator.renew(&mut handle, lease)? {
                println!("not held");
                return Ok(ExitCode::from(3));
            }
            println!("renewed");
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn handle_from_args(key: String, token: &str, lease: Duration) -> Result<LockHandle> {
    let token: OwnershipToken = token.parse()?;
    Ok(LockHandle::from_parts(key, token, SystemTime::now(), lease))
}
