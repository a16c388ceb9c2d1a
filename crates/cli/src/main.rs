use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use gather_api::{GatherApi, InProcApi, ListOptions};
use gather_core::{Gvk, Record};
use serde::Serialize;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "gatherctl", version, about = "Query a must-gather archive")]
struct Cli {
    /// Path to the extracted must-gather directory
    #[arg(long = "path", env = "GATHER_PATH", global = true, default_value = ".")]
    path: PathBuf,

    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json, Yaml }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Archive version, time window and counts
    Info,
    /// Fetch one object by identity
    Get {
        /// GVK key, e.g. "v1/Pod" or "apps/v1/Deployment"
        gvk: String,
        name: String,
        /// Namespace (omit for cluster-scoped kinds)
        #[arg(long = "ns", default_value = "")]
        namespace: String,
    },
    /// List objects of one kind
    Ls {
        /// GVK key, e.g. "v1/ConfigMap" or "config.openshift.io/v1/ClusterOperator"
        gvk: String,
        /// Namespace (omit for all namespaces)
        #[arg(long = "ns", default_value = "")]
        namespace: String,
        /// Label selector, comma-separated k=v terms (AND)
        #[arg(short = 'l', long = "selector")]
        selector: Option<String>,
        /// Field selector, a single dot.path=value clause
        #[arg(long = "field-selector")]
        field_selector: Option<String>,
        /// Maximum number of items (0 = unlimited)
        #[arg(long = "limit", default_value_t = 0)]
        limit: usize,
    },
    /// Namespace roster
    Namespaces,
    /// Kinds present in the archive
    Kinds,
    /// Etcd endpoint health and alarms
    EtcdHealth,
    /// Etcd object counts per resource
    EtcdObjects,
}

fn init_tracing() {
    let env = std::env::var("GATHER_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).with_writer(std::io::stderr).init();
}

/// Scrape address from `GATHER_METRICS_ADDR`; unset, empty or malformed means no exporter.
fn metrics_addr(raw: Option<&str>) -> Option<SocketAddr> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<SocketAddr>() {
        Ok(sock) => Some(sock),
        Err(_) => {
            warn!(addr = %raw, "invalid GATHER_METRICS_ADDR; expected host:port");
            None
        }
    }
}

fn init_metrics() {
    let raw = std::env::var("GATHER_METRICS_ADDR").ok();
    let Some(sock) = metrics_addr(raw.as_deref()) else { return };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
        Ok(_) => info!(addr = %sock, "Prometheus metrics exporter listening"),
        Err(e) => warn!(error = %e, "failed to install metrics exporter"),
    }
}

fn emit<T: Serialize>(output: Output, value: &T) -> Result<()> {
    match output {
        Output::Json => println!("{}", serde_json::to_string_pretty(value)?),
        // human views are rendered by the caller; anything reaching here falls back to yaml
        Output::Yaml | Output::Human => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}

fn print_records(items: &[Record]) {
    if items.is_empty() {
        println!("No resources found.");
        return;
    }
    let width = items.iter().map(|r| r.namespace_str().len()).max().unwrap_or(0).max("NAMESPACE".len());
    println!("{:<width$}  NAME", "NAMESPACE", width = width);
    for r in items {
        println!("{:<width$}  {}", r.namespace_str(), r.name, width = width);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    let t0 = Instant::now();
    let api = InProcApi::open(&cli.path)
        .await
        .with_context(|| format!("opening archive {}", cli.path.display()))?;
    info!(path = %cli.path.display(), took_ms = %t0.elapsed().as_millis(), "archive loaded");

    match cli.command {
        Commands::Info => {
            let md = api.metadata().await;
            match cli.output {
                Output::Human => {
                    println!("path:        {}", md.path);
                    println!("version:     {}", if md.version.is_empty() { "-" } else { md.version.as_str() });
                    println!("start:       {}", md.start_time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
                    println!("end:         {}", md.end_time.map(|t| t.to_rfc3339()).unwrap_or_else(|| "-".into()));
                    println!("resources:   {}", md.resource_count);
                    println!("namespaces:  {}", md.namespace_count);
                }
                out => emit(out, &md)?,
            }
        }
        Commands::Get { gvk, name, namespace } => {
            let gvk = Gvk::from_str(&gvk)?;
            let rec = api
                .get_resource(&gvk, &namespace, &name)
                .await
                .with_context(|| format!("get {} {}", gvk, name))?;
            match cli.output {
                Output::Human => print!("{}", serde_yaml::to_string(&rec.body)?),
                out => emit(out, &rec.body)?,
            }
        }
        Commands::Ls { gvk, namespace, selector, field_selector, limit } => {
            let gvk = Gvk::from_str(&gvk)?;
            let opts = ListOptions { label_selector: selector, field_selector, limit };
            let list = api.list_resources(&gvk, &namespace, opts).await.with_context(|| format!("list {}", gvk))?;
            info!(gvk = %gvk, ns = %namespace, items = list.items.len(), "ls done");
            match cli.output {
                Output::Human => print_records(&list.items),
                out => {
                    let doc = serde_json::json!({
                        "apiVersion": list.api_version,
                        "kind": list.kind,
                        "items": list.items.iter().map(|r| &r.body).collect::<Vec<_>>(),
                    });
                    emit(out, &doc)?
                }
            }
        }
        Commands::Namespaces => {
            let ns = api.list_namespaces().await?;
            match cli.output {
                Output::Human => ns.iter().for_each(|n| println!("{}", n)),
                out => emit(out, &ns)?,
            }
        }
        Commands::Kinds => {
            let kinds = api.list_kinds().await?;
            match cli.output {
                Output::Human => kinds.iter().for_each(|k| println!("{}", k)),
                out => emit(out, &kinds.iter().map(|k| k.to_string()).collect::<Vec<_>>())?,
            }
        }
        Commands::EtcdHealth => {
            let h = api.etcd_health().await.context("reading etcd health")?;
            match cli.output {
                Output::Human => {
                    println!("healthy: {}", h.healthy);
                    for e in &h.endpoints {
                        println!("  {} • {}", e.address, e.health);
                    }
                    for a in &h.alarms {
                        println!("  alarm: {}", a);
                    }
                }
                out => emit(out, &h)?,
            }
        }
        Commands::EtcdObjects => {
            let counts = api.etcd_object_count().await.context("reading etcd object counts")?;
            match cli.output {
                Output::Human => {
                    let mut rows: Vec<_> = counts.iter().collect();
                    rows.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
                    for (res, n) in rows {
                        println!("{:>10}  {}", n, res);
                    }
                }
                out => emit(out, &counts)?,
            }
        }
    }
    Ok(())
}
