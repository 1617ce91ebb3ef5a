use std::collections::BTreeMap;
use std::fs::File;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;

use migtail_k8s::{KubeClient, KubeLogTransport, KubeSourceLocator};
use migtail_logs::{
    DEFAULT_CAPACITY, FetchOptions, FilterCriteria, LineMeta, LogLevel, LogTarget, ReconnectPolicy,
    Session, SessionConfig, SessionState, apply_filter,
};

/// Migtail - tail and aggregate migration control-plane pod logs
#[derive(Parser, Debug)]
#[command(name = "migtail")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Kubernetes context name (defaults to the kubeconfig's current context)
    #[arg(long)]
    context: Option<String>,

    /// Namespace to read from
    #[arg(short = 'n', long, default_value = "default")]
    namespace: String,

    /// Tail a single pod by name
    #[arg(long, conflicts_with = "selector")]
    pod: Option<String>,

    /// Fan out over every pod matching a label selector (k=v,k2=v2)
    #[arg(long, value_name = "SELECTOR")]
    selector: Option<String>,

    /// Buffer capacity in lines
    #[arg(long, default_value_t = DEFAULT_CAPACITY)]
    capacity: usize,

    /// Number of historical log lines to fetch per pod on first connect
    #[arg(long, default_value_t = 100)]
    tail_lines: i64,

    /// Per-connection payload cap in bytes
    #[arg(long, default_value_t = 8 * 1024 * 1024)]
    limit_bytes: i64,

    /// Auto-reconnect interval for selector sessions, in seconds
    #[arg(long, default_value_t = 3)]
    backoff_secs: u64,

    /// Read the backlog and exit instead of following
    #[arg(long)]
    no_follow: bool,

    /// Only print lines at this level (trace|debug|info|warn|error|fatal)
    #[arg(long)]
    level: Option<String>,

    /// Text query; a double-quoted query matches exactly, anything else
    /// matches fuzzily
    #[arg(long)]
    query: Option<String>,

    /// Write the filtered view to this file on exit
    #[arg(long, value_name = "FILE")]
    export: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;
    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
    }
    result
}

async fn run(args: Args) -> Result<()> {
    let target = build_target(&args)?;

    let criteria = FilterCriteria::new(
        args.level.as_deref().map(LogLevel::parse),
        args.query.as_deref().unwrap_or(""),
    );

    let kube_client = KubeClient::new()?;
    let client = kube_client
        .client_for_context(args.context.as_deref())
        .await?;

    let config = SessionConfig {
        capacity: args.capacity,
        reconnect: if target.is_aggregated() {
            ReconnectPolicy::Backoff(Duration::from_secs(args.backoff_secs))
        } else {
            ReconnectPolicy::Manual
        },
        fetch: FetchOptions {
            follow: !args.no_follow,
            tail_lines: Some(args.tail_lines),
            limit_bytes: Some(args.limit_bytes),
        },
    };

    let session = Session::new(
        target,
        Arc::new(KubeSourceLocator::new(client.clone())),
        Arc::new(KubeLogTransport::new(client)),
        config,
    );
    session.set_filter(criteria.clone());
    session.enable(true);

    let mut revisions = session.subscribe();
    let mut poll = tokio::time::interval(Duration::from_millis(250));
    let mut last_sequence: Option<u64> = None;
    let mut last_error: Option<String> = None;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,

            changed = revisions.changed() => {
                if changed.is_err() {
                    break;
                }
                print_new_lines(&session, &criteria, &mut last_sequence);
                report_state(&session, &mut last_error);
            }

            _ = poll.tick() => {
                // A drained backlog read has nothing left to wait for. The
                // source list is only populated once a connect resolved, so
                // this cannot trip before the readers have started.
                if args.no_follow && !session.sources().is_empty() && session.active_readers() == 0 {
                    break;
                }
                // Manual-policy sessions sit in Error until an operator
                // retries; a one-shot CLI reports and exits instead.
                if session.state() == SessionState::Error
                    && matches!(config.reconnect, ReconnectPolicy::Manual)
                {
                    break;
                }
            }
        }
    }

    print_new_lines(&session, &criteria, &mut last_sequence);

    if let Some(path) = &args.export {
        let text = session.export_text();
        let mut file = File::create(path)?;
        file.write_all(text.as_bytes())?;
        eprintln!("Exported {} bytes to {}", text.len(), path);
    }

    session.enable(false);
    Ok(())
}

fn build_target(args: &Args) -> Result<LogTarget> {
    if let Some(pod) = &args.pod {
        return Ok(LogTarget::Pod {
            namespace: args.namespace.clone(),
            name: pod.clone(),
        });
    }
    if let Some(selector) = &args.selector {
        let labels = parse_selector(selector)?;
        return Ok(LogTarget::Selector {
            namespace: args.namespace.clone(),
            labels,
        });
    }
    bail!("one of --pod or --selector is required");
}

fn parse_selector(selector: &str) -> Result<BTreeMap<String, String>> {
    let mut labels = BTreeMap::new();
    for pair in selector.split(',').filter(|p| !p.is_empty()) {
        let Some((key, value)) = pair.split_once('=') else {
            bail!("bad selector pair '{}', expected key=value", pair);
        };
        labels.insert(key.trim().to_string(), value.trim().to_string());
    }
    if labels.is_empty() {
        bail!("empty selector");
    }
    Ok(labels)
}

fn print_new_lines(session: &Session, criteria: &FilterCriteria, last_sequence: &mut Option<u64>) {
    let fresh = match last_sequence {
        Some(sequence) => session.lines_since(*sequence),
        None => session.snapshot(),
    };
    if let Some(line) = fresh.last() {
        *last_sequence = Some(line.sequence);
    }
    for line in apply_filter(&fresh, criteria) {
        println!("{}", format_line(&line.source_id, &line.text));
    }
}

/// One display line. A parseable timestamp prefix collapses to a compact
/// time column; anything else is printed verbatim. Exports keep the raw
/// text, only the terminal view is normalized.
fn format_line(source_id: &str, text: &str) -> String {
    let meta = LineMeta::parse(text);
    match meta.timestamp {
        Some(ts) => format!("{} | {} | {}", source_id, ts.format("%H:%M:%S"), meta.message),
        None => format!("{} | {}", source_id, text),
    }
}

fn report_state(session: &Session, last_error: &mut Option<String>) {
    let error = session.error();
    if error != *last_error {
        if let Some(message) = &error {
            eprintln!("stream error: {}", message);
        }
        *last_error = error;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn selector_parsing() {
        let labels = parse_selector("app=importer, tier=worker").unwrap();
        assert_eq!(labels.get("app").map(String::as_str), Some("importer"));
        assert_eq!(labels.get("tier").map(String::as_str), Some("worker"));
        assert!(parse_selector("appimporter").is_err());
        assert!(parse_selector("").is_err());
    }

    #[test]
    fn formatting_replaces_timestamp_prefix_with_a_time_column() {
        assert_eq!(
            format_line("pod-a", "2024-01-15T10:30:00Z ERROR disk stalled"),
            "pod-a | 10:30:00 | ERROR disk stalled"
        );
        assert_eq!(
            format_line("pod-a", "no prefix here"),
            "pod-a | no prefix here"
        );
    }
}
