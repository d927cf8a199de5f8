//! Periodic driver for the queue orchestrator.
//!
//! Maintenance and delivery run on independent intervals inside one task.
//! A cycle always runs to completion; shutdown is only observed between cycles.

use std::future::Future;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{error, info};

use paynotify_domain::channel::Channel;

use crate::domain::repository::{
    EligibilityPort, MessageDispatcher, OrderDataPort, QueueStore, RecipientPort,
};
use crate::usecase::orchestrator::QueueOrchestrator;

#[derive(Debug, Clone)]
pub struct WorkerSchedule {
    pub channels: Vec<Channel>,
    pub delivery_interval: Duration,
    pub maintenance_interval: Duration,
}

pub async fn run<S, R, E, O, D>(
    orchestrator: &QueueOrchestrator<S, R, E, O, D>,
    schedule: &WorkerSchedule,
    shutdown: impl Future<Output = ()>,
) where
    S: QueueStore + Clone,
    R: RecipientPort,
    E: EligibilityPort,
    O: OrderDataPort,
    D: MessageDispatcher,
{
    let mut maintenance = interval(schedule.maintenance_interval);
    maintenance.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut delivery = interval(schedule.delivery_interval);
    delivery.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(
        channels = ?schedule.channels,
        delivery_secs = schedule.delivery_interval.as_secs(),
        maintenance_secs = schedule.maintenance_interval.as_secs(),
        "queue worker started"
    );

    tokio::pin!(shutdown);
    loop {
        // biased: shutdown first, and maintenance before delivery when both are due
        tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("queue worker stopping");
                break;
            }
            _ = maintenance.tick() => maintenance_cycle(orchestrator, &schedule.channels).await,
            _ = delivery.tick() => delivery_cycle(orchestrator, &schedule.channels).await,
        }
    }
}

pub async fn maintenance_cycle<S, R, E, O, D>(
    orchestrator: &QueueOrchestrator<S, R, E, O, D>,
    channels: &[Channel],
) where
    S: QueueStore + Clone,
    R: RecipientPort,
    E: EligibilityPort,
    O: OrderDataPort,
    D: MessageDispatcher,
{
    for channel in channels {
        if let Err(e) = orchestrator.manage_queue(*channel).await {
            error!(channel = %channel, kind = e.kind(), error = ?e, "queue maintenance failed");
        }
    }
}

pub async fn delivery_cycle<S, R, E, O, D>(
    orchestrator: &QueueOrchestrator<S, R, E, O, D>,
    channels: &[Channel],
) where
    S: QueueStore + Clone,
    R: RecipientPort,
    E: EligibilityPort,
    O: OrderDataPort,
    D: MessageDispatcher,
{
    for channel in channels {
        if let Err(e) = orchestrator.send_messages(*channel).await {
            error!(channel = %channel, kind = e.kind(), error = ?e, "digest delivery failed");
        }
    }
}
