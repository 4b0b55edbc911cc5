use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::EnvFilter;

use dinerdb::{start_server, MenuStore, StoreOptions};

const DEFAULT_ADDR: &str = "127.0.0.1:3001";

fn usage_and_exit(code: i32) -> ! {
    eprintln!(
        "Usage: dinerdb-server [OPTIONS] [ADDR]\n\
         \n\
         Options:\n\
           -a, --addr <HOST:PORT>   Address to bind (default: {DEFAULT_ADDR})\n\
           -p, --port <PORT>        Bind 127.0.0.1 on the given port\n\
               --lock-wait-ms <MS>  Row lock wait timeout in milliseconds\n\
               --pool-size <N>      Connection pool size (at least 2)\n\
           -h, --help               Print this help\n\
         \n\
         --addr takes precedence over --port; a bare ADDR argument works too.\n\
         DINERDB_ADDR, DINERDB_PORT, DINERDB_LOCK_WAIT_MS and DINERDB_POOL_SIZE\n\
         fill in anything the flags leave unset."
    );
    std::process::exit(code);
}

#[derive(Default)]
struct Cli {
    addr: Option<String>,
    port: Option<String>,
    lock_wait_ms: Option<String>,
    pool_size: Option<String>,
    positional: Option<String>,
}

fn arg_value(
    iter: &mut impl Iterator<Item = String>,
    inline: Option<String>,
    flag: &str,
) -> String {
    let next = inline.or_else(|| iter.next());
    match next {
        Some(value) => value,
        None => {
            eprintln!("error: {flag} requires a value");
            usage_and_exit(2);
        }
    }
}

fn parse_cli() -> Cli {
    let mut cli = Cli::default();
    let mut iter = std::env::args().skip(1);
    while let Some(arg) = iter.next() {
        // Accept both `--flag value` and `--flag=value`.
        let (name, inline) = match arg.split_once('=') {
            Some((name, value)) => (name.to_string(), Some(value.to_string())),
            None => (arg.clone(), None),
        };
        match name.as_str() {
            "-h" | "--help" => usage_and_exit(0),
            "-a" | "--addr" => cli.addr = Some(arg_value(&mut iter, inline, "--addr")),
            "-p" | "--port" => cli.port = Some(arg_value(&mut iter, inline, "--port")),
            "--lock-wait-ms" => {
                cli.lock_wait_ms = Some(arg_value(&mut iter, inline, "--lock-wait-ms"));
            }
            "--pool-size" => {
                cli.pool_size = Some(arg_value(&mut iter, inline, "--pool-size"));
            }
            _ if name.starts_with('-') => {
                eprintln!("error: unrecognized option '{name}'");
                usage_and_exit(2);
            }
            _ if cli.positional.is_none() => cli.positional = Some(arg),
            _ => {
                eprintln!("error: extra argument '{arg}'");
                usage_and_exit(2);
            }
        }
    }
    cli
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.is_empty())
}

fn bind_addr(cli: &Cli) -> String {
    cli.addr
        .clone()
        .or_else(|| cli.port.as_ref().map(|port| format!("127.0.0.1:{port}")))
        .or_else(|| cli.positional.clone())
        .or_else(|| env_string("DINERDB_ADDR"))
        .or_else(|| env_string("DINERDB_PORT").map(|port| format!("127.0.0.1:{port}")))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string())
}

fn numeric(flag_value: Option<&str>, env_key: &str, name: &str) -> Option<u64> {
    let raw = flag_value.map(str::to_string).or_else(|| env_string(env_key))?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            eprintln!("error: {name} expects a number, got '{raw}'");
            usage_and_exit(2);
        }
    }
}

fn store_options(cli: &Cli) -> StoreOptions {
    let mut options = StoreOptions::new();
    if let Some(ms) = numeric(
        cli.lock_wait_ms.as_deref(),
        "DINERDB_LOCK_WAIT_MS",
        "--lock-wait-ms",
    ) {
        options = options.lock_wait_timeout(Duration::from_millis(ms));
    }
    if let Some(size) = numeric(cli.pool_size.as_deref(), "DINERDB_POOL_SIZE", "--pool-size") {
        let max = tokio::sync::Semaphore::MAX_PERMITS as u64;
        // A trial checks out two connections at once, so a one-connection
        // pool could never serve a single request.
        if size < 2 || size > max {
            eprintln!("error: --pool-size must be between 2 and {max}, got {size}");
            usage_and_exit(2);
        }
        options = options.max_connections(size as usize);
    }
    options
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = parse_cli();
    let store = MenuStore::with_options(store_options(&cli));
    store.seed_demo_menu();
    start_server(&bind_addr(&cli), Arc::new(store)).await?;
    Ok(())
}
