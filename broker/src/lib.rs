// Copyright (c) 2021 Xu Shaohua <shaohua@biofan.org>. All rights reserved.
// Use of this source is governed by Apache-2.0 License that can be found
// in the LICENSE file.

//! MQTT v3.1.1 broker core (spec 1-9): a Tokio-based realization of the
//! accept/IO/worker thread-pool design, a topic registry with wildcard
//! matching, per-client sessions with inflight tracking, and the periodic
//! retransmitter and `$SYS` publisher.

pub mod auth;
pub mod commands;
pub mod config;
mod connection;
pub mod error;
mod handlers;
mod retransmit;
pub mod session;
pub mod state;
pub mod stats;
pub mod topic;

use std::sync::Arc;
use std::time::Instant;

use tokio::net::TcpListener;
use tokio::sync::{mpsc, Mutex, Semaphore};

use auth::AuthManager;
use commands::WorkItem;
use config::Config;
use error::Error;
use state::BrokerState;
use stats::Stats;

/// Capacity of the shared channel the IO tasks post decoded packets onto,
/// drained by the worker pool (spec 4.E).
const WORK_QUEUE_CAPACITY: usize = 1024;

/// A running broker: owns the shared state, the worker pool, the
/// accept loop, and the periodic maintenance tasks. Spec 3 "Broker".
pub struct Broker {
    config: Arc<Config>,
    state: Arc<Mutex<BrokerState>>,
    stats: Arc<Stats>,
    started_at: Instant,
}

impl Broker {
    #[must_use]
    pub fn new(config: Config, auth: AuthManager) -> Self {
        let stats = Arc::new(Stats::default());
        let state = Arc::new(Mutex::new(BrokerState::new(auth, Arc::clone(&stats))));
        Self {
            config: Arc::new(config),
            state,
            stats,
            started_at: Instant::now(),
        }
    }

    /// Run the broker until a shutdown signal (`Ctrl-C`) is received.
    ///
    /// # Errors
    /// Returns an error if the listener cannot bind, or if a maintenance
    /// task's channel is unexpectedly closed.
    pub async fn run(self) -> Result<(), Error> {
        let (queue_tx, queue_rx) = mpsc::channel::<WorkItem>(WORK_QUEUE_CAPACITY);
        let queue_rx = Arc::new(Mutex::new(queue_rx));

        for _ in 0..self.config.general().worker_pool_size() {
            let state = Arc::clone(&self.state);
            let config = Arc::clone(&self.config);
            let queue_rx = Arc::clone(&queue_rx);
            tokio::spawn(handlers::run_worker(state, config, queue_rx));
        }

        tokio::spawn(retransmit::run(Arc::clone(&self.state)));

        if self.config.general().stats_pub_interval() > 0 {
            tokio::spawn(run_stats_publisher(
                Arc::clone(&self.state),
                self.config.general().stats_pub_interval(),
                self.started_at,
            ));
        }

        let listener = TcpListener::bind((
            self.config.listener().ip(),
            self.config.listener().port(),
        ))
        .await?;
        log::info!(
            "broker: listening on {}:{}",
            self.config.listener().ip(),
            self.config.listener().port()
        );

        let io_semaphore = Arc::new(Semaphore::new(self.config.general().io_pool_size()));

        tokio::select! {
            () = accept_loop(&listener, &self.state, &self.config, &self.stats, &queue_tx, &io_semaphore) => Ok(()),
            _ = tokio::signal::ctrl_c() => {
                log::info!("broker: received shutdown signal");
                Ok(())
            }
        }
    }
}

async fn accept_loop(
    listener: &TcpListener,
    state: &Arc<Mutex<BrokerState>>,
    config: &Arc<Config>,
    stats: &Arc<Stats>,
    queue_tx: &mpsc::Sender<WorkItem>,
    io_semaphore: &Arc<Semaphore>,
) {
    loop {
        let (socket, peer_addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(err) => {
                log::error!("broker: accept failed: {err}");
                continue;
            }
        };

        let conn_id = {
            let mut state = state.lock().await;
            state.next_conn_id()
        };

        let permit = match Arc::clone(io_semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(_) => return,
        };

        let config = Arc::clone(config);
        let stats = Arc::clone(stats);
        let queue_tx = queue_tx.clone();
        tokio::spawn(async move {
            let _permit = permit;
            connection::run(conn_id, socket, peer_addr, config, stats, queue_tx).await;
        });
    }
}

/// Fan the `$SYS` counters out to every matching subscriber every
/// `interval_secs` seconds (spec 6).
async fn run_stats_publisher(state: Arc<Mutex<BrokerState>>, interval_secs: u32, started_at: Instant) {
    let mut ticker = tokio::time::interval(std::time::Duration::from_secs(u64::from(interval_secs)));
    loop {
        ticker.tick().await;
        let mut state = state.lock().await;
        let publishes = state.stats.to_publishes(started_at);
        let mut writes = Vec::new();
        for packet in publishes {
            if let Err(err) = handlers::publish_message(
                &mut state.topics,
                &mut state.sessions,
                &state.stats,
                &packet,
                &mut writes,
            ) {
                log::warn!("broker: failed to publish $SYS stats: {err}");
            }
        }
        drop(state);
        for pending in writes {
            if let Err(err) = pending.writer.send(pending.cmd).await {
                log::debug!("broker: dropping $SYS write to a closed connection: {err}");
            }
        }
    }
}
