//! Small helpers shared by the subcommands.

use anyhow::Result;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `default_level`. Logs go to stderr so that command
/// output on stdout stays machine-readable.
pub fn init_tracing(default_level: &str, json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if json {
        builder.json().init();
    } else {
        builder.compact().init();
    }
}

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse an optional `--configuration` argument.
pub fn parse_configuration(raw: Option<&str>) -> Result<Option<serde_json::Value>> {
    raw.map(|raw| {
        serde_json::from_str(raw)
            .map_err(|e| anyhow::anyhow!("--configuration must be a JSON document: {e}"))
    })
    .transpose()
}
