//! # Trible CLI Entry Point
//!
//! One-shot client for Trible RPC providers. Builds an orchestrator from a
//! configuration file and/or a static provider list, invokes one method and
//! prints the result as raw JSON.
//!
//! ## Usage
//!
//! ```bash
//! # Call a method on a single provider
//! trible call Calculator add '[1, 2]' --provider Calculator@127.0.0.1:9000
//!
//! # Spread calls over two providers and fail over between them
//! trible call Echo echo '["hi"]' \
//!     -p Echo@10.0.0.1:9000 -p Echo@10.0.0.2:9000 --config trible.json
//!
//! # Declare parameter types explicitly
//! trible call Calculator add '[1, 2]' -p Calculator@127.0.0.1:9000 \
//!     --param-type i64 --param-type i64
//! ```
//!
//! Logging goes to stderr and is controlled by `RUST_LOG` (default `warn`),
//! so stdout stays pipeable.

use anyhow::{bail, Context, Result};
use argh::FromArgs;
use serde_json::Value;
use trible_client::{MethodCall, Orchestrator, RpcConfig};

#[derive(FromArgs)]
/// Trible RPC command-line client
struct Cli {
    #[argh(subcommand)]
    command: Commands,
}

#[derive(FromArgs)]
#[argh(subcommand)]
enum Commands {
    Call(CallArgs),
}

/// Arguments for making a single RPC call.
///
/// Outputs the result as compact JSON on stdout. Errors are reported on
/// stderr with a non-zero exit code.
#[derive(FromArgs, Debug)]
#[argh(subcommand, name = "call")]
/// invoke a remote method and print its result
struct CallArgs {
    /// service (interface) name
    #[argh(positional)]
    service: String,

    /// method name
    #[argh(positional)]
    method: String,

    /// JSON array with the call arguments, defaults to `[]`
    #[argh(positional, default = "String::from(\"[]\")")]
    args: String,

    /// provider entry in `service@host:port` form, may be repeated
    #[argh(option, short = 'p', long = "provider")]
    providers: Vec<String>,

    /// path to a JSON configuration file
    #[argh(option, short = 'c')]
    config: Option<String>,

    /// declared parameter type, one per argument, may be repeated
    ///
    /// When omitted, types are derived from the JSON arguments.
    #[argh(option, long = "param-type")]
    param_types: Vec<String>,

    /// per-attempt timeout in milliseconds, overrides the configuration
    #[argh(option, long = "timeout-ms")]
    timeout_ms: Option<u64>,
}

/// Builds the client configuration for a call.
///
/// Providers given on the command line are appended to the configured
/// `LOCAL` registry address.
fn build_config(args: &CallArgs) -> Result<RpcConfig> {
    let mut config = match &args.config {
        Some(path) => RpcConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => RpcConfig::default(),
    };

    if !args.providers.is_empty() {
        let mut entries: Vec<&str> = config
            .registry
            .address
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .collect();
        entries.extend(args.providers.iter().map(String::as_str));
        config.registry.address = entries.join(",");
    }

    if let Some(timeout_ms) = args.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    config.validate()?;
    Ok(config)
}

/// Parses the JSON argument array and pairs each value with its type.
fn build_call(args: &CallArgs) -> Result<MethodCall> {
    let values: Vec<Value> = match serde_json::from_str(&args.args)
        .with_context(|| format!("arguments are not valid JSON: {}", args.args))?
    {
        Value::Array(values) => values,
        other => bail!("arguments must be a JSON array, got {}", other),
    };

    if !args.param_types.is_empty() && args.param_types.len() != values.len() {
        bail!(
            "{} parameter types declared for {} arguments",
            args.param_types.len(),
            values.len()
        );
    }

    let mut call = MethodCall::new(&args.service, &args.method);
    for (i, value) in values.into_iter().enumerate() {
        let parameter_type = match args.param_types.get(i) {
            Some(declared) => declared.clone(),
            None => json_type(&value).to_string(),
        };
        call = call.arg(parameter_type, value);
    }
    Ok(call)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "f64",
        Value::Number(_) => "i64",
        Value::String(_) => "String",
        Value::Array(_) => "Vec",
        Value::Object(_) => "Map",
    }
}

async fn run_call(args: CallArgs) -> Result<()> {
    let config = build_config(&args)?;
    let call = build_call(&args)?;

    tracing::debug!(service = %args.service, method = %args.method, "Calling");
    let orchestrator = Orchestrator::new(config)?;
    let result = orchestrator.invoke(call).await?;

    println!("{}", serde_json::to_string(&result)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli: Cli = argh::from_env();

    // Default to WARN so stdout only carries the result, RUST_LOG overrides
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Call(args) => run_call(args).await,
    }
}
