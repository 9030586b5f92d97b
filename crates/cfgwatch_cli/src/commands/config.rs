//! Config command implementation.

use cfgwatch_store::RemoteStore;
use cfgwatch_sync::{build_key, CONFIG_ROOT};

/// Writes one variable of a server's configuration and reports the
/// store's answer.
pub async fn run<S: RemoteStore>(
    store: &S,
    server: &str,
    variable: &str,
    value: &str,
) -> Result<(), Box<dyn std::error::Error>> {
    let key = build_key(CONFIG_ROOT, server, variable);
    tracing::debug!(key = %key, "writing configuration value");

    let response = store.write(&key, value).await?;
    println!("{} {} to {}", response.action, response.key, response.value);
    Ok(())
}
