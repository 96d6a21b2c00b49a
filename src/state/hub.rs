//! Connection hub: live sockets grouped by game, fan-out delivery and countdown timers.
//!
//! A single dispatch task owns the registry. Handles only talk to it through a bounded
//! command queue, and each connection owns a bounded outbound queue of its own. When that
//! queue is full at broadcast time the connection is treated as dead: it is removed and its
//! sender dropped, which closes the queue and lets the connection's writer wind down.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use serde::Serialize;
use tokio::{
    sync::{
        mpsc::{self, error::TrySendError},
        oneshot,
    },
    task::JoinHandle,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::{
    config::HubConfig,
    dto::events::{EventEnvelope, TimerEvent, TimerEventType},
    state::game::Timer,
};

/// Identifier handed out to each registered connection.
pub type ConnectionId = u64;

/// Serialized frame queued for a connection.
pub type Frame = Arc<str>;

/// Result of [`ConnectionHub::register`]: the connection id and its outbound queue.
#[derive(Debug)]
pub struct Registration {
    /// Identifier to pass back to [`ConnectionHub::unregister`].
    pub id: ConnectionId,
    /// Frames to write to the socket, in issue order.
    pub outbound: mpsc::Receiver<Frame>,
}

enum HubCommand {
    Register {
        id: ConnectionId,
        game_id: Uuid,
        outbound: mpsc::Sender<Frame>,
    },
    Unregister {
        id: ConnectionId,
    },
    Broadcast {
        game_id: Uuid,
        frame: Frame,
    },
    CloseGame {
        game_id: Uuid,
    },
    ConnectedCount {
        game_id: Option<Uuid>,
        reply: oneshot::Sender<usize>,
    },
}

/// Cheap, cloneable handle to the dispatch loop.
#[derive(Clone)]
pub struct ConnectionHub {
    commands: mpsc::Sender<HubCommand>,
    next_id: Arc<AtomicU64>,
    outbound_capacity: usize,
}

impl ConnectionHub {
    /// Spawn the dispatch loop on the current runtime and return a handle to it.
    ///
    /// The loop stops once every handle has been dropped.
    pub fn spawn(config: HubConfig) -> Self {
        let (commands, receiver) = mpsc::channel(config.command_capacity.max(1));
        tokio::spawn(Dispatcher::default().run(receiver));
        Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
            outbound_capacity: config.outbound_capacity.max(1),
        }
    }

    /// Add a connection watching `game_id`.
    ///
    /// Should the dispatch loop be gone, the returned queue is already closed.
    pub async fn register(&self, game_id: Uuid) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (outbound, receiver) = mpsc::channel(self.outbound_capacity);
        self.submit(HubCommand::Register {
            id,
            game_id,
            outbound,
        })
        .await;
        Registration {
            id,
            outbound: receiver,
        }
    }

    /// Remove a connection. Unknown ids are ignored.
    pub async fn unregister(&self, id: ConnectionId) {
        self.submit(HubCommand::Unregister { id }).await;
    }

    /// Send `{type, payload}` to every connection watching `game_id`.
    pub async fn broadcast_to_game<T>(&self, game_id: Uuid, event_type: &str, payload: &T)
    where
        T: ?Sized + Serialize,
    {
        let envelope = EventEnvelope {
            event_type,
            payload,
        };
        match serde_json::to_string(&envelope) {
            Ok(text) => self.broadcast_frame(game_id, text.into()).await,
            Err(err) => {
                warn!(%game_id, event_type, error = %err, "failed to serialize event; dropping it");
            }
        }
    }

    /// Drop every connection watching `game_id`.
    ///
    /// Frames already queued are still delivered; the queues close right after them.
    pub async fn close_game(&self, game_id: Uuid) {
        self.submit(HubCommand::CloseGame { game_id }).await;
    }

    /// Number of connections currently watching `game_id`.
    pub async fn connected_count(&self, game_id: Uuid) -> usize {
        self.count(Some(game_id)).await
    }

    /// Number of live connections across every game.
    pub async fn connected_total(&self) -> usize {
        self.count(None).await
    }

    /// Broadcast the countdown of `timer` for `game_id`.
    ///
    /// Emits `timer_started` right away, `timer_update` with the seconds left once per
    /// second, then `timer_ended` when it reaches zero. Timers are never cancelled.
    pub fn start_timer(&self, game_id: Uuid, timer: Timer) -> JoinHandle<()> {
        let hub = self.clone();
        let duration = timer.duration;
        tokio::spawn(async move {
            hub.send_timer(game_id, &timer, TimerEventType::TimerStarted, duration)
                .await;

            let mut ticker = interval(Duration::from_secs(1));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            let mut remaining = duration;
            while remaining > 0 {
                ticker.tick().await;
                remaining -= 1;
                if remaining > 0 {
                    hub.send_timer(game_id, &timer, TimerEventType::TimerUpdate, remaining)
                        .await;
                }
            }

            hub.send_timer(game_id, &timer, TimerEventType::TimerEnded, 0)
                .await;
        })
    }

    async fn send_timer(
        &self,
        game_id: Uuid,
        timer: &Timer,
        event_type: TimerEventType,
        remaining: u32,
    ) {
        let event = TimerEvent {
            event_type,
            timer_type: timer.kind,
            start_time: timer.start_time,
            end_time: timer.end_time,
            duration: remaining,
        };
        match serde_json::to_string(&event) {
            Ok(text) => self.broadcast_frame(game_id, text.into()).await,
            Err(err) => warn!(%game_id, error = %err, "failed to serialize timer event"),
        }
    }

    async fn broadcast_frame(&self, game_id: Uuid, frame: Frame) {
        self.submit(HubCommand::Broadcast { game_id, frame }).await;
    }

    async fn count(&self, game_id: Option<Uuid>) -> usize {
        let (reply, response) = oneshot::channel();
        self.submit(HubCommand::ConnectedCount { game_id, reply })
            .await;
        response.await.unwrap_or(0)
    }

    async fn submit(&self, command: HubCommand) {
        if self.commands.send(command).await.is_err() {
            warn!("connection hub dispatch loop is gone; command dropped");
        }
    }
}

/// Registry owned by the dispatch task.
#[derive(Default)]
struct Dispatcher {
    games: HashMap<Uuid, HashMap<ConnectionId, mpsc::Sender<Frame>>>,
    owners: HashMap<ConnectionId, Uuid>,
}

impl Dispatcher {
    async fn run(mut self, mut commands: mpsc::Receiver<HubCommand>) {
        while let Some(command) = commands.recv().await {
            match command {
                HubCommand::Register {
                    id,
                    game_id,
                    outbound,
                } => {
                    self.games.entry(game_id).or_default().insert(id, outbound);
                    self.owners.insert(id, game_id);
                    debug!(connection = id, %game_id, "connection registered");
                }
                HubCommand::Unregister { id } => self.remove(id),
                HubCommand::Broadcast { game_id, frame } => self.broadcast(game_id, frame),
                HubCommand::CloseGame { game_id } => self.close_game(game_id),
                HubCommand::ConnectedCount { game_id, reply } => {
                    let count = match game_id {
                        Some(game_id) => self.games.get(&game_id).map_or(0, HashMap::len),
                        None => self.owners.len(),
                    };
                    let _ = reply.send(count);
                }
            }
        }
        debug!("connection hub dispatch loop stopped");
    }

    fn broadcast(&mut self, game_id: Uuid, frame: Frame) {
        let Some(connections) = self.games.get(&game_id) else {
            return;
        };

        let mut dead = Vec::new();
        for (&id, outbound) in connections {
            match outbound.try_send(frame.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(connection = id, %game_id, "outbound buffer full; dropping slow connection");
                    dead.push(id);
                }
                Err(TrySendError::Closed(_)) => dead.push(id),
            }
        }

        for id in dead {
            self.remove(id);
        }
    }

    fn close_game(&mut self, game_id: Uuid) {
        let Some(connections) = self.games.remove(&game_id) else {
            return;
        };
        for id in connections.keys() {
            self.owners.remove(id);
        }
        debug!(%game_id, closed = connections.len(), "closed game connections");
    }

    /// Dropping the stored sender closes the connection's outbound queue.
    fn remove(&mut self, id: ConnectionId) {
        let Some(game_id) = self.owners.remove(&id) else {
            return;
        };
        if let Some(connections) = self.games.get_mut(&game_id) {
            connections.remove(&id);
            if connections.is_empty() {
                self.games.remove(&game_id);
            }
        }
        debug!(connection = id, %game_id, "connection unregistered");
    }
}
