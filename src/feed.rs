//! Server status feed. Push updates when the backend delivers them, polling
//! otherwise. Server statuses are only displayed; they never reach the
//! consensus engine.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;

use crate::remote::{LotReader, RemoteLotStatus};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Live,
    Polling,
}

/// Latest server-reported status per lot.
#[derive(Debug, Clone, Default)]
pub struct ServerStatusBoard {
    statuses: HashMap<String, RemoteLotStatus>,
    updated_at: Option<DateTime<Utc>>,
}

impl ServerStatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, updates: Vec<RemoteLotStatus>, at: DateTime<Utc>) {
        for update in updates {
            self.statuses.insert(update.lot_id.clone(), update);
        }
        self.updated_at = Some(at);
    }

    pub fn get(&self, lot_id: &str) -> Option<&RemoteLotStatus> {
        self.statuses.get(lot_id)
    }

    pub fn len(&self) -> usize {
        self.statuses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statuses.is_empty()
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }
}

pub struct FeedController {
    board: Arc<Mutex<ServerStatusBoard>>,
    state_tx: watch::Sender<ConnectionState>,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl FeedController {
    pub fn new() -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Polling);
        Self {
            board: Arc::new(Mutex::new(ServerStatusBoard::new())),
            state_tx,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn board(&self) -> Arc<Mutex<ServerStatusBoard>> {
        self.board.clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.state_tx.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Spawn the feed task. `push` is `None` when no realtime channel exists.
    pub fn start(
        &mut self,
        reader: Arc<dyn LotReader>,
        push: Option<mpsc::Receiver<Vec<RemoteLotStatus>>>,
        poll_interval: Duration,
    ) -> Result<()> {
        if self.handle.is_some() {
            bail!("feed already running");
        }

        let cancel_token = CancellationToken::new();
        let handle = tokio::spawn(feed_loop(
            reader,
            push,
            poll_interval,
            self.board.clone(),
            self.state_tx.clone(),
            cancel_token.clone(),
        ));

        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
        Ok(())
    }

    pub async fn stop(&mut self) -> Result<()> {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
        }

        if let Some(handle) = self.handle.take() {
            handle
                .await
                .context("feed task failed to join")
                .map(|_| ())
        } else {
            Ok(())
        }
    }
}

impl Default for FeedController {
    fn default() -> Self {
        Self::new()
    }
}

fn set_state(state_tx: &watch::Sender<ConnectionState>, next: ConnectionState) {
    let changed = state_tx.send_if_modified(|current| {
        if *current == next {
            return false;
        }
        *current = next;
        true
    });
    if changed {
        log_info!("server feed is now {:?}", next);
    }
}

async fn poll_once(reader: &dyn LotReader, board: &Mutex<ServerStatusBoard>) {
    match reader.fetch_statuses().await {
        Ok(statuses) => board.lock().await.apply(statuses, Utc::now()),
        Err(err) => log_warn!("server status poll failed: {err:#}"),
    }
}

async fn feed_loop(
    reader: Arc<dyn LotReader>,
    mut push: Option<mpsc::Receiver<Vec<RemoteLotStatus>>>,
    poll_interval: Duration,
    board: Arc<Mutex<ServerStatusBoard>>,
    state_tx: watch::Sender<ConnectionState>,
    cancel_token: CancellationToken,
) {
    poll_once(reader.as_ref(), &board).await;
    let mut next_poll = Instant::now() + poll_interval;

    loop {
        tokio::select! {
            _ = cancel_token.cancelled() => {
                log_info!("server feed stopped");
                break;
            }
            update = recv_push(&mut push) => match update {
                Some(statuses) => {
                    set_state(&state_tx, ConnectionState::Live);
                    board.lock().await.apply(statuses, Utc::now());
                    next_poll = Instant::now() + poll_interval;
                }
                None => {
                    log_warn!("push channel closed, falling back to polling");
                    push = None;
                    set_state(&state_tx, ConnectionState::Polling);
                }
            },
            _ = time::sleep_until(next_poll) => {
                poll_once(reader.as_ref(), &board).await;
                next_poll = Instant::now() + poll_interval;
            }
        }
    }
}

/// Pending forever once the channel is gone so `select!` ignores the branch.
async fn recv_push(
    push: &mut Option<mpsc::Receiver<Vec<RemoteLotStatus>>>,
) -> Option<Vec<RemoteLotStatus>> {
    match push {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
