//! Queue admin: inspect and operate the payment notification queue by hand.
//!
//! # Usage
//!
//! ```bash
//! # Queue order 10 of client 42 on the default channel
//! cargo run -p queue-admin -- enqueue --order 10 --client 42
//!
//! # Withdraw jobs from delivery
//! cargo run -p queue-admin -- skip 17 18
//!
//! # Run one maintenance or delivery cycle right now
//! cargo run -p queue-admin -- maintain --channel gp-carrier
//! cargo run -p queue-admin -- deliver
//! ```

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use sea_orm::Database;

use paynotify_core::tracing::init_tracing;
use paynotify_domain::channel::Channel;
use paynotify_domain::id::{ClientId, JobId, OrderId, join_ids};
use paynotify_queue::domain::types::{LockThreshold, NewQueueEntry};
use paynotify_queue::infra::http::HttpDirectoryClient;
use paynotify_queue::state::AppState;
use paynotify_queue::usecase::admin::{EnqueueJobUseCase, QueueStatsUseCase, SkipJobsUseCase};
use paynotify_queue::usecase::lease::LeaseManager;

mod config;

use config::AdminConfig;

#[derive(Parser)]
#[command(about = "Inspect and operate the payment notification queue")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Queue a notification job for an order
    Enqueue {
        #[arg(long)]
        order: OrderId,
        #[arg(long)]
        client: ClientId,
        #[arg(long, default_value = "consignor-expeditor")]
        channel: Channel,
    },
    /// Mark jobs as skipped so they are never delivered
    Skip {
        #[arg(required = true)]
        ids: Vec<JobId>,
    },
    /// Print job counts per state
    Stats {
        /// Limit to one channel (default: all)
        #[arg(long)]
        channel: Option<Channel>,
    },
    /// Run one maintenance pass (requeue or fail stale locks)
    Maintain {
        #[arg(long)]
        channel: Option<Channel>,
    },
    /// Run one delivery pass
    Deliver {
        #[arg(long)]
        channel: Option<Channel>,
    },
}

fn channels(channel: Option<Channel>) -> Vec<Channel> {
    channel.map_or_else(|| Channel::ALL.to_vec(), |c| vec![c])
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    init_tracing();

    let args = Args::parse();
    let config = AdminConfig::from_env()?;
    let db = Database::connect(&config.database_url)
        .await
        .context("connect to database")?;
    let state = AppState { db };

    match args.command {
        Command::Enqueue {
            order,
            client,
            channel,
        } => {
            let uc = EnqueueJobUseCase {
                store: state.queue_store(),
            };
            let id = uc
                .execute(NewQueueEntry {
                    order_id: order,
                    client_id: client,
                    channel,
                })
                .await?;
            println!("queued job {id}");
        }
        Command::Skip { ids } => {
            let uc = SkipJobsUseCase {
                store: state.queue_store(),
            };
            let skipped = uc.execute(&ids).await?;
            println!("skipped {skipped} of {} job(s): {}", ids.len(), join_ids(&ids));
        }
        Command::Stats { channel } => {
            let uc = QueueStatsUseCase {
                store: state.queue_store(),
            };
            println!(
                "{:<22}{:>8}{:>8}{:>8}{:>8}{:>8}",
                "channel", "queued", "locked", "sent", "failed", "skipped"
            );
            for (channel, c) in uc.execute(&channels(channel)).await? {
                println!(
                    "{:<22}{:>8}{:>8}{:>8}{:>8}{:>8}",
                    channel.code(),
                    c.queued,
                    c.locked,
                    c.sent,
                    c.failed,
                    c.skipped
                );
            }
        }
        Command::Maintain { channel } => {
            let lease = LeaseManager {
                store: state.queue_store(),
                threshold: LockThreshold::new(config.max_lock_count)?,
            };
            for channel in channels(channel) {
                let report = lease.maintain(channel).await?;
                println!(
                    "{channel}: requeued [{}], failed [{}], superseded [{}]",
                    join_ids(&report.reclaimed),
                    join_ids(&report.failed),
                    join_ids(&report.superseded)
                );
            }
        }
        Command::Deliver { channel } => {
            let threshold = LockThreshold::new(config.max_lock_count)?;
            let directory_url = config
                .directory_url
                .as_deref()
                .context("DIRECTORY_URL is required for deliver")?;
            let orchestrator =
                state.orchestrator(HttpDirectoryClient::new(directory_url), threshold);
            for channel in channels(channel) {
                let report = orchestrator.send_messages(channel).await?;
                println!(
                    "{channel}: {} client(s), {} job(s) sent, {} message(s), failed clients [{}]",
                    report.clients,
                    report.sent_jobs.len(),
                    report.messages,
                    join_ids(&report.failed_clients)
                );
            }
        }
    }
    Ok(())
}
