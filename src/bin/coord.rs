//! Coordinator binary

use anyhow::Context;
use bytes::Bytes;
use clap::{Parser, Subcommand};
use replistore::common::{format_bytes, Config, IndexBackend};
use replistore::ops::{repair_cluster, verify_cluster};
use replistore::{ContentId, Group, GroupKind, LocalCluster, Orchestrator};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "replistore-coord")]
#[command(about = "replistore coordinator with an in-process worker cluster")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Boot a local cluster and drive it from stdin
    Serve {
        /// TOML configuration file
        #[arg(long)]
        config: Option<PathBuf>,

        /// Workers per group
        #[arg(long)]
        workers: Option<usize>,

        /// FIFO cache capacity
        #[arg(long)]
        cache_capacity: Option<usize>,

        /// Persist the key index with sled at this path
        #[arg(long)]
        index_path: Option<PathBuf>,
    },
}

const HELP: &str = "\
commands:
  register <user> <password>       create an account, prints a token
  login <user> <password>          prints a token
  upload <token> <file> [name]     store a file
  download <token> <id> [out]      fetch a file (writes to <out> if given)
  search <token> [query]           owned files whose name contains query
  list <token>                     owned files
  delete <token> <id>
  update <token> <id> <file>       replace content, prints the new id
  kill <worker> | revive <worker>
  join <primary|replica>           start a new worker in that group
  demote                           drop primary leadership
  failover                         promote the replica if primary is not leader
  repair [--dry-run]               resync degraded members
  verify                           replica consistency report
  status                           cluster status as JSON
  quit";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            workers,
            cache_capacity,
            index_path,
        } => {
            // File and environment first, CLI flags win
            let mut config = Config::load(config.as_deref())?;
            if let Some(workers) = workers {
                config.cluster.workers_per_group = workers;
            }
            if let Some(capacity) = cache_capacity {
                config.orchestrator.cache_capacity = capacity;
            }
            if let Some(path) = index_path {
                config.index.backend = IndexBackend::Sled;
                config.index.path = path;
            }

            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::EnvFilter::try_from_default_env()
                        .unwrap_or_else(|_| config.log_level.clone().into()),
                )
                .with(tracing_subscriber::fmt::layer())
                .init();

            tracing::info!("Starting replistore {}", replistore::VERSION);
            tracing::info!("  Workers per group: {}", config.cluster.workers_per_group);
            tracing::info!("  Cache capacity: {}", config.orchestrator.cache_capacity);
            tracing::info!("  Quorum: {:?}", config.orchestrator.quorum);
            tracing::info!("  Key index: {:?}", config.index.backend);

            let mut cluster = LocalCluster::bootstrap(&config).await?;
            println!("{}", HELP);
            console(&mut cluster).await?;
            cluster.shutdown().await?;
        }
    }

    Ok(())
}

async fn console(cluster: &mut LocalCluster) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                let args: Vec<&str> = line.split_whitespace().collect();
                match args.first().copied() {
                    None => continue,
                    Some("quit") | Some("exit") => break,
                    Some(_) => {
                        if let Err(e) = run(cluster, &args).await {
                            println!("error: {:#}", e);
                        }
                    }
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    Ok(())
}

async fn run(cluster: &mut LocalCluster, args: &[&str]) -> anyhow::Result<()> {
    let orchestrator = Arc::clone(&cluster.orchestrator);

    match args {
        ["help"] => println!("{}", HELP),

        ["register", user, password] => {
            println!("{}", orchestrator.register(user, password).await?);
        }

        ["login", user, password] => {
            println!("{}", orchestrator.login(user, password).await?);
        }

        ["upload", token, file, rest @ ..] => {
            let user = orchestrator.authenticate(token).await?;
            let path = PathBuf::from(file);
            let name = match rest.first() {
                Some(name) => name.to_string(),
                None => path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .context("file has no name")?,
            };
            let data = tokio::fs::read(&path)
                .await
                .with_context(|| format!("reading {}", path.display()))?;
            let size = data.len() as u64;
            let id = orchestrator.upload(Bytes::from(data), &name, &user).await?;
            println!("✓ {} ({}, {})", id, name, format_bytes(size));
        }

        ["download", token, id, rest @ ..] => {
            let user = orchestrator.authenticate(token).await?;
            let (data, name) = orchestrator.download(&ContentId::from(*id), &user).await?;
            match rest.first() {
                Some(out) => {
                    tokio::fs::write(out, &data).await?;
                    println!("✓ {} -> {} ({})", name, out, format_bytes(data.len() as u64));
                }
                None => println!("{} ({})", name, format_bytes(data.len() as u64)),
            }
        }

        ["search", token, query @ ..] => {
            let user = orchestrator.authenticate(token).await?;
            let query = query.join(" ");
            for entry in orchestrator.search(&query, &user).await {
                println!("{}  {}", entry.content_id, entry.name);
            }
        }

        ["list", token] => {
            let user = orchestrator.authenticate(token).await?;
            for entry in orchestrator.list(&user).await {
                println!("{}  {}", entry.content_id, entry.name);
            }
        }

        ["delete", token, id] => {
            let user = orchestrator.authenticate(token).await?;
            if orchestrator.delete(&ContentId::from(*id), &user).await? {
                println!("✓ deleted");
            } else {
                println!("not found");
            }
        }

        ["update", token, id, file] => {
            let user = orchestrator.authenticate(token).await?;
            let data = tokio::fs::read(file)
                .await
                .with_context(|| format!("reading {}", file))?;
            let new_id = orchestrator
                .update(&ContentId::from(*id), Bytes::from(data), &user)
                .await?;
            println!("✓ {}", new_id);
        }

        ["kill", worker] => {
            group_of(&orchestrator, worker).await?.kill_member(worker).await?;
            println!("✓ {} is dead", worker);
        }

        ["revive", worker] => {
            group_of(&orchestrator, worker).await?.revive_member(worker).await?;
            println!("✓ {} is alive (degraded until repair)", worker);
        }

        ["join", kind] => {
            let kind: GroupKind = kind.parse()?;
            let worker = cluster.add_worker(kind).await?;
            println!("✓ {} joined, run `repair` to copy existing data", worker.id());
        }

        ["demote"] => {
            let primary = orchestrator.primary().await;
            primary.set_leader(false).await;
            println!("✓ {} is no longer leader", primary.id());
        }

        ["failover"] => {
            if orchestrator.failover().await {
                println!("✓ {} promoted", orchestrator.primary().await.id());
            } else {
                println!("primary is healthy, nothing to do");
            }
        }

        ["repair", rest @ ..] => {
            let dry_run = rest.contains(&"--dry-run");
            let report = repair_cluster(&orchestrator, dry_run).await?;
            println!("Repair report:");
            println!("  Members checked: {}", report.members_checked);
            println!("  Members repaired: {}", report.members_repaired);
            println!("  Entries copied: {}", report.entries_copied);
            for planned in &report.planned {
                println!("  Would resync: {}", planned);
            }
            for failed in &report.failed {
                println!("  Failed: {}", failed);
            }
        }

        ["verify"] => {
            let report = verify_cluster(&orchestrator).await?;
            println!("Verification report:");
            println!("  Total items: {}", report.total_items);
            println!("  Healthy: {}", report.healthy);
            println!("  Under-replicated: {}", report.under_replicated);
            println!("  Divergent: {}", report.divergent);
            println!("  Orphaned: {}", report.orphaned);
            println!("  Unindexed: {}", report.unindexed);
            println!(
                "  Members checked: {} (skipped {})",
                report.members_checked, report.members_skipped
            );
        }

        ["status"] => {
            let status = orchestrator.status().await;
            println!("{}", serde_json::to_string_pretty(&status)?);
        }

        _ => println!("unknown command, try `help`"),
    }

    Ok(())
}

async fn group_of(orchestrator: &Orchestrator, worker_id: &str) -> anyhow::Result<Arc<Group>> {
    for group in [orchestrator.primary().await, orchestrator.replica().await] {
        if group.member(worker_id).await.is_some() {
            return Ok(group);
        }
    }
    anyhow::bail!("no worker named {}", worker_id)
}
