use std::time::{SystemTime, UNIX_EPOCH};

use hec_exporter::{Batch, Config, Convert, HecClient, HecEvent, PushError};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Log an init failure and exit.
fn fatal(msg: &str, error: &dyn std::fmt::Display) -> ! {
    error!(%error, "{msg}");
    std::process::exit(1);
}

fn setup_logging() {
    use tracing_subscriber::filter::LevelFilter;
    use tracing_subscriber::prelude::*;

    let level = std::env::var("HEC_EXPORTER_LOG_LEVEL")
        .ok()
        .and_then(|val| {
            val.parse::<LevelFilter>().ok().or_else(|| {
                eprintln!("invalid HEC_EXPORTER_LOG_LEVEL: {val:?}, defaulting to WARN");
                None
            })
        })
        .unwrap_or(LevelFilter::WARN);

    tracing_subscriber::registry()
        .with(level)
        .with(tracing_microjson::JsonLayer::new(std::io::stderr).with_target(true))
        .init();
}

fn setup_rustls() {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("failed to install rustls ring provider");
}

/// One event per non-blank input line, stamped with the configured metadata.
struct LineConverter {
    host: Option<String>,
    source: Option<String>,
    sourcetype: Option<String>,
    index: Option<String>,
}

impl LineConverter {
    fn new(config: &Config) -> Self {
        Self {
            host: config.host.clone(),
            source: config.source.clone(),
            sourcetype: config.sourcetype.clone(),
            index: config.index.clone(),
        }
    }
}

impl Convert<[String]> for LineConverter {
    type Event = HecEvent;

    fn convert(&self, lines: &[String]) -> (Vec<HecEvent>, usize) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or_default();
        let mut blank = 0;
        let mut events = Vec::with_capacity(lines.len());
        for line in lines {
            let line = line.trim_end();
            if line.trim().is_empty() {
                blank += 1;
                continue;
            }
            let body = match serde_json::from_str::<Value>(line) {
                Ok(value @ Value::Object(_)) => value,
                _ => Value::String(line.to_owned()),
            };
            let mut event = HecEvent::new(body).with_time(now);
            event.host = self.host.clone();
            event.source = self.source.clone();
            event.sourcetype = self.sourcetype.clone();
            event.index = self.index.clone();
            events.push(event);
        }
        (events, blank)
    }
}

async fn read_lines() -> std::io::Result<Vec<String>> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut out = Vec::new();
    while let Some(line) = lines.next_line().await? {
        out.push(line);
    }
    Ok(out)
}

#[tokio::main]
async fn main() {
    setup_logging();
    setup_rustls();

    let config = Config::from_env().unwrap_or_else(|e| fatal("config error", &e));
    let client = HecClient::new(&config).unwrap_or_else(|e| fatal("failed to build client", &e));
    client.start();

    let lines = read_lines()
        .await
        .unwrap_or_else(|e| fatal("failed to read stdin", &e));
    let batch = Batch::convert(&LineConverter::new(&config), lines.as_slice());

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupted, cancelling push");
                cancel.cancel();
            }
        }
    });

    let result = client.push_logs(&cancel, batch).await;
    client.stop().await;

    match result {
        Ok(dropped) => info!(dropped, "push complete"),
        Err(e) => {
            error!(
                error = %e,
                dropped = e.dropped(),
                retryable = e.is_retryable(),
                "push failed"
            );
            if let PushError::PartialLogs { remainder, .. } = &e {
                warn!(undelivered = remainder.len(), "partial delivery");
            }
            std::process::exit(1);
        }
    }
}
