//! Server command implementation.

use cfgwatch_store::RemoteStore;
use cfgwatch_sync::{Snapshot, SyncConfig, SyncEngine, SyncOutcome};
use std::str::FromStr;

/// How snapshots are printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// `{name: "value", ...}`
    Text,
    /// One JSON object per line.
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            other => Err(format!("unknown format '{other}' (expected text or json)")),
        }
    }
}

/// Renders a snapshot in the given format.
pub fn render(snapshot: &Snapshot, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => snapshot.to_string(),
        OutputFormat::Json => {
            serde_json::to_string(snapshot).unwrap_or_else(|_| snapshot.to_string())
        }
    }
}

/// Mirrors a server's configuration until Ctrl-C or a fatal error,
/// printing every snapshot.
pub async fn run<S: RemoteStore>(
    store: S,
    server: &str,
    format: OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    let observer = move |snapshot: &Snapshot| println!("{}", render(snapshot, format));
    let mut engine = SyncEngine::with_observer(SyncConfig::new(server), store, observer);

    let handle = engine.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping");
            handle.cancel();
        }
    });

    match engine.run().await {
        Ok(SyncOutcome::Cancelled) | Ok(SyncOutcome::DeadlineElapsed) => {
            let stats = engine.stats();
            tracing::info!(
                server,
                events_applied = stats.events_applied,
                transient_retries = stats.transient_retries,
                "session ended"
            );
            Ok(())
        }
        Err(e) => {
            tracing::error!(server, error = %e, "session failed");
            Err(e.into())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cfgwatch_sync::SettingsMirror;

    fn sample() -> Snapshot {
        let mut mirror = SettingsMirror::new("/config/web1/");
        mirror.load([("/config/web1/timeout", "30"), ("/config/web1/retries", "3")]);
        mirror.snapshot()
    }

    #[test]
    fn format_parsing() {
        assert_eq!("text".parse::<OutputFormat>(), Ok(OutputFormat::Text));
        assert_eq!("json".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("yaml".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn renders_text_and_json() {
        let snapshot = sample();
        assert_eq!(
            render(&snapshot, OutputFormat::Text),
            r#"{retries: "3", timeout: "30"}"#
        );
        assert_eq!(
            render(&snapshot, OutputFormat::Json),
            r#"{"retries":"3","timeout":"30"}"#
        );
    }
}
