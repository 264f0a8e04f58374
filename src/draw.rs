//! Winner draw for the admin page: `pickWinner()` on chain, then a
//! slot-machine highlight over the minted users until the settle timer
//! fetches the winner the contract actually stored.
//!
//! Wallet and contract calls run as [`DrawJob`]s off the event loop. Every
//! reply carries the generation it was started under, so a reply that lands
//! after a newer pick or reset is dropped.

use crate::{
    contract::CertificateContract,
    provider::{
        self,
        WalletProvider,
    },
};
use alloy_primitives::{
    Address,
    B256,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    sync::Arc,
    time::Duration,
};
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{
        self,
        Instant,
    },
};
use tracing::{
    error,
    info,
    warn,
};

pub const DEFAULT_SPIN_DURATION: Duration = Duration::from_millis(5000);
pub const DEFAULT_SPIN_INTERVAL: Duration = Duration::from_millis(100);

pub const ALERT_PICK_FAILED: &str = "❌ Failed to pick winner";
pub const ALERT_RESET_DONE: &str = "✅ Winner has been reset!";
pub const ALERT_RESET_FAILED: &str = "❌ Failed to reset winner";
pub const ALERT_SETTLE_FAILED: &str = "❌ Failed to read the winner from the contract";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DrawConfig {
    pub spin_duration: Duration,
    pub spin_interval: Duration,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            spin_duration: DEFAULT_SPIN_DURATION,
            spin_interval: DEFAULT_SPIN_INTERVAL,
        }
    }
}

impl DrawConfig {
    pub fn total_ticks(&self) -> u64 {
        let interval = self.spin_interval.as_millis();
        if interval == 0 {
            return 0;
        }
        (self.spin_duration.as_millis() / interval) as u64
    }
}

/// Highlight cursor for the slot animation. Tick `k` (0-based) lands on
/// `k mod len`; once `total_ticks` ticks have run the cursor stays put.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SlotAnimation {
    len: usize,
    total_ticks: u64,
    ticks: u64,
    index: Option<usize>,
}

impl SlotAnimation {
    pub fn new(len: usize, total_ticks: u64) -> Self {
        Self {
            len,
            total_ticks,
            ticks: 0,
            index: None,
        }
    }

    /// Advances one step. Returns false when the animation had already finished.
    pub fn tick(&mut self) -> bool {
        if self.is_finished() || self.len == 0 {
            return false;
        }
        self.index = Some(match self.index {
            None => 0,
            Some(i) => (i + 1) % self.len,
        });
        self.ticks += 1;
        true
    }

    pub fn is_finished(&self) -> bool {
        self.ticks >= self.total_ticks
    }

    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }
}

/// Timer output of a running spin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DrawEvent {
    Tick { generation: u64 },
    Settle { generation: u64 },
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum DrawPhase {
    #[default]
    Idle,
    WaitingForSignature,
    Spinning,
    Settled,
}

/// Emits `total_ticks` ticks one interval apart, then the settle at the full
/// duration. Every tick deadline is at or before the settle deadline, so the
/// receiver always sees all ticks first. Aborted on drop.
#[derive(Debug)]
struct SpinTimer {
    task: JoinHandle<()>,
}

impl SpinTimer {
    fn start(
        config: DrawConfig,
        generation: u64,
        events: mpsc::UnboundedSender<DrawEvent>,
    ) -> Self {
        let total_ticks = config.total_ticks();
        let task = tokio::spawn(async move {
            let start = Instant::now();
            let mut deadline = start;
            for _ in 0..total_ticks {
                deadline += config.spin_interval;
                time::sleep_until(deadline).await;
                if events.send(DrawEvent::Tick { generation }).is_err() {
                    return;
                }
            }
            time::sleep_until(start + config.spin_duration).await;
            let _ = events.send(DrawEvent::Settle { generation });
        });
        Self { task }
    }
}

impl Drop for SpinTimer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum DrawJobKind {
    Load,
    Pick,
    Reset,
    FetchWinner,
}

/// A contract round trip started by [`WinnerDraw`]. Owns its handles so it
/// can run on its own task; hand the reply back to [`WinnerDraw::finish`].
#[derive(Debug)]
pub struct DrawJob<P, C> {
    generation: u64,
    kind: DrawJobKind,
    wallet: Arc<P>,
    contract: Arc<C>,
}

#[derive(Debug)]
pub enum DrawReply {
    Loaded {
        generation: u64,
        result: Result<(Vec<Address>, Option<Address>)>,
    },
    Picked {
        generation: u64,
        result: Result<B256>,
    },
    Reset {
        generation: u64,
        result: Result<B256>,
    },
    WinnerFetched {
        generation: u64,
        result: Result<Option<Address>>,
    },
}

impl<P: WalletProvider, C: CertificateContract> DrawJob<P, C> {
    pub async fn run(self) -> DrawReply {
        let generation = self.generation;
        match self.kind {
            DrawJobKind::Load => DrawReply::Loaded {
                generation,
                result: futures::try_join!(
                    self.contract.all_minted_users(),
                    self.contract.winner()
                )
                .wrap_err("failed to load draw state"),
            },
            DrawJobKind::Pick => DrawReply::Picked {
                generation,
                result: self.transact(DrawJobKind::Pick).await,
            },
            DrawJobKind::Reset => DrawReply::Reset {
                generation,
                result: self.transact(DrawJobKind::Reset).await,
            },
            DrawJobKind::FetchWinner => DrawReply::WinnerFetched {
                generation,
                result: self
                    .contract
                    .winner()
                    .await
                    .wrap_err("failed to read winner"),
            },
        }
    }

    async fn transact(&self, kind: DrawJobKind) -> Result<B256> {
        let signer = provider::request_accounts(self.wallet.as_ref())
            .await?
            .first()
            .copied()
            .ok_or_else(|| eyre!("wallet returned no accounts"))?;
        let tx = match kind {
            DrawJobKind::Reset => self.contract.reset_winner(signer).await?,
            _ => self.contract.pick_winner(signer).await?,
        };
        self.contract.wait_for_receipt(tx).await?;
        Ok(tx)
    }
}

/// What a finished [`DrawReply`] changed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DrawUpdate {
    /// The reply belonged to an earlier pick or reset.
    Stale,
    Loaded,
    Spinning,
    Settled(Option<Address>),
    Reset,
    Failed {
        alert: Option<&'static str>,
        error: String,
    },
}

#[derive(Debug)]
pub struct WinnerDraw<P, C> {
    provider: Option<Arc<P>>,
    contract: Arc<C>,
    config: DrawConfig,
    events: mpsc::UnboundedSender<DrawEvent>,
    minted_users: Vec<Address>,
    winner: Option<Address>,
    phase: DrawPhase,
    animation: Option<SlotAnimation>,
    timer: Option<SpinTimer>,
    generation: u64,
}

impl<P: WalletProvider, C: CertificateContract> WinnerDraw<P, C> {
    pub fn new(
        provider: Option<Arc<P>>,
        contract: Arc<C>,
        config: DrawConfig,
        events: mpsc::UnboundedSender<DrawEvent>,
    ) -> Self {
        Self {
            provider,
            contract,
            config,
            events,
            minted_users: Vec::new(),
            winner: None,
            phase: DrawPhase::Idle,
            animation: None,
            timer: None,
            generation: 0,
        }
    }

    pub fn minted_users(&self) -> &[Address] {
        &self.minted_users
    }

    pub fn winner(&self) -> Option<Address> {
        self.winner
    }

    pub fn phase(&self) -> DrawPhase {
        self.phase
    }

    pub fn slot_index(&self) -> Option<usize> {
        self.animation.as_ref().and_then(SlotAnimation::index)
    }

    pub fn is_waiting(&self) -> bool {
        self.phase == DrawPhase::WaitingForSignature
    }

    pub fn is_spinning(&self) -> bool {
        self.phase == DrawPhase::Spinning
    }

    pub fn can_pick(&self) -> bool {
        !self.is_waiting() && !self.is_spinning() && self.winner.is_none()
    }

    pub fn can_reset(&self) -> bool {
        self.winner.is_some() && !self.is_waiting()
    }

    fn job(&self, kind: DrawJobKind) -> Option<DrawJob<P, C>> {
        Some(DrawJob {
            generation: self.generation,
            kind,
            wallet: self.provider.clone()?,
            contract: Arc::clone(&self.contract),
        })
    }

    /// Reloads minted users and the stored winner, as on page load.
    /// `None` without a wallet.
    pub fn start_load(&self) -> Option<DrawJob<P, C>> {
        self.job(DrawJobKind::Load)
    }

    /// `None`, with nothing sent, when there is no wallet, nobody has minted,
    /// or [`Self::can_pick`] is false.
    pub fn start_pick(&mut self) -> Option<DrawJob<P, C>> {
        if self.provider.is_none() || self.minted_users.is_empty() || !self.can_pick() {
            return None;
        }
        self.stop_timers();
        self.generation += 1;
        self.phase = DrawPhase::WaitingForSignature;
        self.animation = None;
        self.winner = None;
        self.job(DrawJobKind::Pick)
    }

    /// Clears the stored winner on chain. `None` while another transaction
    /// waits for a signature or without a wallet.
    pub fn start_reset(&mut self) -> Option<DrawJob<P, C>> {
        if self.provider.is_none() || self.is_waiting() {
            return None;
        }
        self.stop_timers();
        self.generation += 1;
        self.phase = DrawPhase::WaitingForSignature;
        self.animation = None;
        self.job(DrawJobKind::Reset)
    }

    pub fn stop_timers(&mut self) {
        self.timer = None;
    }

    /// Returns true when the highlighted row moved.
    pub fn on_tick(&mut self, generation: u64) -> bool {
        if generation != self.generation || !self.is_spinning() {
            return false;
        }
        self.animation.as_mut().is_some_and(SlotAnimation::tick)
    }

    /// Ends the ticking and returns the job that reads the contract's winner.
    /// Stale generations are ignored.
    pub fn settle(&mut self, generation: u64) -> Option<DrawJob<P, C>> {
        if generation != self.generation || !self.is_spinning() {
            return None;
        }
        self.stop_timers();
        self.job(DrawJobKind::FetchWinner)
    }

    pub fn finish(&mut self, reply: DrawReply) -> DrawUpdate {
        match reply {
            DrawReply::Loaded { generation, result } => match result {
                Ok((users, winner)) => {
                    self.minted_users = users;
                    if generation == self.generation
                        && matches!(self.phase, DrawPhase::Idle | DrawPhase::Settled)
                    {
                        self.winner = winner;
                        self.phase = if winner.is_some() {
                            DrawPhase::Settled
                        } else {
                            DrawPhase::Idle
                        };
                    }
                    DrawUpdate::Loaded
                }
                Err(err) => {
                    error!(error = %err, "failed to refresh draw state");
                    DrawUpdate::Failed {
                        alert: None,
                        error: format!("Refresh failed: {err:#}"),
                    }
                }
            },
            DrawReply::Picked { generation, result } => {
                if generation != self.generation || !self.is_waiting() {
                    return DrawUpdate::Stale;
                }
                match result {
                    Ok(tx) => {
                        info!(%tx, users = self.minted_users.len(), "winner picked, spinning");
                        self.phase = DrawPhase::Spinning;
                        self.start_animation();
                        DrawUpdate::Spinning
                    }
                    Err(err) => {
                        error!(error = %err, "pick winner failed");
                        self.stop_timers();
                        self.animation = None;
                        self.phase = DrawPhase::Idle;
                        DrawUpdate::Failed {
                            alert: Some(ALERT_PICK_FAILED),
                            error: format!("Pick winner failed: {err:#}"),
                        }
                    }
                }
            }
            DrawReply::Reset { generation, result } => {
                if generation != self.generation || !self.is_waiting() {
                    return DrawUpdate::Stale;
                }
                self.phase = DrawPhase::Idle;
                match result {
                    Ok(tx) => {
                        info!(%tx, "winner reset");
                        self.winner = None;
                        DrawUpdate::Reset
                    }
                    Err(err) => {
                        error!(error = %err, "reset winner failed");
                        DrawUpdate::Failed {
                            alert: Some(ALERT_RESET_FAILED),
                            error: format!("Reset winner failed: {err:#}"),
                        }
                    }
                }
            }
            DrawReply::WinnerFetched { generation, result } => {
                if generation != self.generation || !self.is_spinning() {
                    warn!(generation, "draw changed while reading the winner, dropping result");
                    return DrawUpdate::Stale;
                }
                self.animation = None;
                match result {
                    Ok(winner) => {
                        info!(winner = ?winner, "draw settled");
                        self.winner = winner;
                        self.phase = if winner.is_some() {
                            DrawPhase::Settled
                        } else {
                            DrawPhase::Idle
                        };
                        DrawUpdate::Settled(winner)
                    }
                    Err(err) => {
                        error!(error = %err, "failed to read winner after draw");
                        self.phase = DrawPhase::Idle;
                        DrawUpdate::Failed {
                            alert: Some(ALERT_SETTLE_FAILED),
                            error: format!("Settle failed: {err:#}"),
                        }
                    }
                }
            }
        }
    }

    fn start_animation(&mut self) {
        self.stop_timers();
        self.animation = Some(SlotAnimation::new(
            self.minted_users.len(),
            self.config.total_ticks(),
        ));
        self.timer = Some(SpinTimer::start(
            self.config,
            self.generation,
            self.events.clone(),
        ));
    }
}
