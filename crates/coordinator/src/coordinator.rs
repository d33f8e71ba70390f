//! The single producer of consistent hash versions.
//!
//! Membership events are processed one at a time by an event loop task. Each
//! event publishes the cheap `update_members` result immediately and then
//! rebalances on the blocking pool. A rebalance whose input has been
//! superseded by a newer publication is dropped and restarted from the latest
//! hash, so versions stay totally ordered and no stale layout is ever
//! published.

use std::sync::Arc;

use arc_swap::ArcSwap;
use corelib::{Address, CapacityFactors, ConsistentHash, HashConfig, HashFunction};
use metrics::{counter, gauge};
use parking_lot::Mutex;
use replication::ConsistentHashFactory;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::{CoordinatorError, Result};
use crate::event::{MemberView, MembershipEvent};
use crate::published::{PublishedHash, Router};

const COMMAND_QUEUE: usize = 64;

enum Command {
    Apply {
        event: MembershipEvent,
        reply: oneshot::Sender<Result<u64>>,
    },
    Shutdown,
}

/// Handle to the coordinator event loop.
///
/// Dropping the handle stops the loop once queued events are processed.
pub struct Coordinator {
    published: Arc<ArcSwap<PublishedHash>>,
    commands: mpsc::Sender<Command>,
    updates: watch::Receiver<u64>,
    hash: Arc<dyn HashFunction>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl Coordinator {
    /// Build and rebalance the first hash for `members`, publish it and start
    /// the event loop.
    pub async fn start(
        factory: Arc<dyn ConsistentHashFactory>,
        config: HashConfig,
        members: Vec<Address>,
    ) -> Result<Self> {
        Self::start_with_factors(factory, config, members, CapacityFactors::new()).await
    }

    pub async fn start_with_factors(
        factory: Arc<dyn ConsistentHashFactory>,
        config: HashConfig,
        members: Vec<Address>,
        capacity_factors: CapacityFactors,
    ) -> Result<Self> {
        config.validate()?;
        let view = MemberView::new(members, capacity_factors);

        let initial = {
            let factory = factory.clone();
            let view = view.clone();
            let (num_owners, num_segments) = (config.num_owners, config.num_segments);
            tokio::task::spawn_blocking(move || {
                let ch = factory.create(num_owners, num_segments, &view.members, view.factors())?;
                factory.rebalance(&ch)
            })
            .await
            .map_err(|e| CoordinatorError::Task(e.to_string()))??
        };

        let published = Arc::new(ArcSwap::from_pointee(PublishedHash {
            topology_id: 1,
            ch: initial,
            rebalanced: true,
        }));
        gauge!("ch_topology_id").set(1.0);
        gauge!("ch_members").set(view.members.len() as f64);
        info!(
            factory = factory.name(),
            members = view.members.len(),
            num_segments = config.num_segments,
            num_owners = config.num_owners,
            "coordinator started"
        );

        let (commands, receiver) = mpsc::channel(COMMAND_QUEUE);
        let (updates_tx, updates) = watch::channel(1);
        let event_loop = EventLoop {
            factory,
            published: published.clone(),
            updates: updates_tx,
            view,
            in_flight: None,
        };
        let task = tokio::spawn(event_loop.run(receiver));

        Ok(Self {
            published,
            commands,
            updates,
            hash: config.hash.build(),
            task: Mutex::new(Some(task)),
        })
    }

    /// Queue `event` and wait until its `update_members` result is
    /// published. Returns the new topology id.
    pub async fn apply(&self, event: MembershipEvent) -> Result<u64> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Apply { event, reply })
            .await
            .map_err(|_| CoordinatorError::Closed)?;
        response.await.map_err(|_| CoordinatorError::Closed)?
    }

    pub async fn join(&self, member: Address, capacity_factor: Option<f64>) -> Result<u64> {
        self.apply(MembershipEvent::Joined {
            member,
            capacity_factor,
        })
        .await
    }

    pub async fn leave(&self, member: &Address) -> Result<u64> {
        self.apply(MembershipEvent::Left(member.id)).await
    }

    pub async fn set_capacity_factor(&self, member: &Address, capacity_factor: f64) -> Result<u64> {
        self.apply(MembershipEvent::CapacityChanged {
            node: member.id,
            capacity_factor,
        })
        .await
    }

    /// The hash readers see right now.
    pub fn current(&self) -> Arc<PublishedHash> {
        self.published.load_full()
    }

    pub fn router(&self) -> Router {
        Router::new(self.published.clone(), self.hash.clone())
    }

    /// Topology id of every publication, as it happens.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.updates.clone()
    }

    /// Wait for a rebalanced hash of the latest membership.
    pub async fn wait_until_balanced(&self) -> Result<Arc<PublishedHash>> {
        let mut updates = self.updates.clone();
        loop {
            let current = self.current();
            if current.rebalanced {
                return Ok(current);
            }
            updates
                .changed()
                .await
                .map_err(|_| CoordinatorError::Closed)?;
        }
    }

    /// Stop the event loop. A rebalance still running is discarded.
    pub async fn shutdown(&self) {
        // Closed already if the loop is gone.
        let _ = self.commands.send(Command::Shutdown).await;
        let task = self.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "coordinator event loop panicked");
            }
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let current = self.current();
        f.debug_struct("Coordinator")
            .field("topology_id", &current.topology_id)
            .field("rebalanced", &current.rebalanced)
            .field("members", &current.ch.members().len())
            .finish()
    }
}

/// A rebalance running on the blocking pool.
struct InFlight {
    /// Topology id of the hash being rebalanced.
    base: u64,
    handle: JoinHandle<corelib::Result<ConsistentHash>>,
}

struct EventLoop {
    factory: Arc<dyn ConsistentHashFactory>,
    published: Arc<ArcSwap<PublishedHash>>,
    updates: watch::Sender<u64>,
    view: MemberView,
    in_flight: Option<InFlight>,
}

async fn rebalance_done(in_flight: &mut Option<InFlight>) -> (u64, Result<ConsistentHash>) {
    match in_flight {
        Some(flight) => {
            let result = match (&mut flight.handle).await {
                Ok(result) => result.map_err(CoordinatorError::from),
                Err(e) => Err(CoordinatorError::Task(e.to_string())),
            };
            (flight.base, result)
        }
        None => std::future::pending().await,
    }
}

impl EventLoop {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Apply { event, reply }) => {
                        let result = self.apply(&event);
                        if let Err(e) = &result {
                            warn!(event = event.kind(), error = %e, "membership event rejected");
                        }
                        let _ = reply.send(result);
                    }
                    Some(Command::Shutdown) | None => break,
                },
                (base, result) = rebalance_done(&mut self.in_flight) => {
                    self.in_flight = None;
                    self.finish_rebalance(base, result);
                }
            }
        }
        debug!("coordinator event loop stopped");
    }

    fn apply(&mut self, event: &MembershipEvent) -> Result<u64> {
        counter!("ch_membership_events_total").increment(1);
        let next = self.view.apply(event)?;
        let current = self.published.load_full();
        let ch = self
            .factory
            .update_members(&current.ch, &next.members, next.factors())?;
        self.view = next;

        let under_replicated = ch.under_replicated_segments().len();
        let topology_id = self.publish(ch, false);
        info!(
            event = event.kind(),
            topology_id,
            members = self.view.members.len(),
            under_replicated,
            "membership change published"
        );
        self.schedule_rebalance();
        Ok(topology_id)
    }

    /// Rebalance the published hash unless a rebalance is already running;
    /// that one is restarted from the latest hash when it completes.
    fn schedule_rebalance(&mut self) {
        if self.in_flight.is_some() {
            return;
        }
        let current = self.published.load_full();
        let factory = self.factory.clone();
        let base = current.topology_id;
        let handle = tokio::task::spawn_blocking(move || factory.rebalance(&current.ch));
        debug!(base, "rebalance scheduled");
        self.in_flight = Some(InFlight { base, handle });
    }

    fn finish_rebalance(&mut self, base: u64, result: Result<ConsistentHash>) {
        let latest = self.published.load().topology_id;
        if base != latest {
            counter!("ch_rebalances_discarded_total").increment(1);
            debug!(base, latest, "superseded rebalance discarded");
            self.schedule_rebalance();
            return;
        }
        match result {
            Ok(ch) => {
                counter!("ch_rebalances_published_total").increment(1);
                let topology_id = self.publish(ch, true);
                info!(topology_id, "rebalanced hash published");
            }
            Err(e) => warn!(base, error = %e, "rebalance failed"),
        }
    }

    fn publish(&mut self, ch: ConsistentHash, rebalanced: bool) -> u64 {
        let topology_id = self.published.load().topology_id + 1;
        gauge!("ch_topology_id").set(topology_id as f64);
        gauge!("ch_members").set(ch.members().len() as f64);
        self.published.store(Arc::new(PublishedHash {
            topology_id,
            ch,
            rebalanced,
        }));
        self.updates.send_replace(topology_id);
        topology_id
    }
}
