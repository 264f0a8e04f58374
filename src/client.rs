use crate::{
    contract::{
        CertificateContract,
        RpcCertificateContract,
    },
    deployment::{
        DeploymentEnv,
        DeploymentStore,
    },
    draw::{
        ALERT_RESET_DONE,
        DrawConfig,
        DrawEvent,
        DrawJob,
        DrawPhase,
        DrawReply,
        DrawUpdate,
        WinnerDraw,
    },
    mint::{
        MintFlow,
        MintOutcome,
        MintPhase,
        MintReport,
    },
    network::{
        ChainDescriptor,
        NetworkCheck,
    },
    preferences::Preferences,
    provider::{
        Subscription,
        WalletProvider,
    },
    rpc::{
        DEFAULT_ACCOUNT_POLL_INTERVAL,
        HttpWalletProvider,
    },
    session::{
        AccountReply,
        AccountRequest,
        AccountRequestKind,
        ConnectOutcome,
        STATUS_INSTALL_WALLET,
        WalletSession,
    },
    ui,
};
use alloy_primitives::{
    Address,
    U256,
};
use color_eyre::eyre::{
    Result,
    WrapErr,
    eyre,
};
use std::{
    path::PathBuf,
    sync::Arc,
};
use tokio::sync::mpsc;
use tracing::{
    debug,
    info,
    warn,
};

pub const MAX_ERRORS: usize = 50;
pub const ADMIN_LOCKED: &str = "🛡️ The winner draw is only available to verified operators";
pub const STATUS_AWAITING_SIGNATURE: &str = "✍️ Waiting for signature...";
pub const STATUS_DRAWING: &str = "🎰 Drawing a winner...";

#[derive(Clone, Debug)]
pub enum NetworkTarget {
    Sepolia { url: Option<String> },
    Holesky { url: Option<String> },
    Local { url: Option<String> },
}

impl NetworkTarget {
    pub fn chain(&self) -> ChainDescriptor {
        let (chain, url) = match self {
            NetworkTarget::Sepolia { url } => (ChainDescriptor::sepolia(), url),
            NetworkTarget::Holesky { url } => (ChainDescriptor::holesky(), url),
            NetworkTarget::Local { url } => (ChainDescriptor::local(), url),
        };
        match url {
            Some(url) => chain.with_rpc_url(url.clone()),
            None => chain,
        }
    }

    pub fn deployment_env(&self) -> DeploymentEnv {
        match self {
            NetworkTarget::Sepolia { .. } => DeploymentEnv::Sepolia,
            NetworkTarget::Holesky { .. } => DeploymentEnv::Holesky,
            NetworkTarget::Local { .. } => DeploymentEnv::Local,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub network: NetworkTarget,
    pub wallet_url: String,
    pub contract: Option<Address>,
    pub draw: DrawConfig,
    pub prefs_path: PathBuf,
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Page {
    #[default]
    Mint,
    AdminDraw,
}

impl Page {
    pub fn title(self) -> &'static str {
        match self {
            Page::Mint => "📜 Claim Certificate",
            Page::AdminDraw => "🎰 Winner Draw",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ButtonStates {
    pub mint: bool,
    pub switch_account: bool,
    pub pick_winner: bool,
    pub reset_visible: bool,
    pub reset_winner: bool,
}

#[derive(Clone, Debug)]
pub struct AppSnapshot {
    pub page: Page,
    pub pages: Vec<Page>,
    pub is_verified: bool,
    pub chain: String,
    pub contract_address: Option<Address>,
    pub provider_present: bool,
    pub account: Option<Address>,
    pub status: String,
    pub mint_phase: MintPhase,
    pub last_token_id: Option<U256>,
    pub minted_users: Vec<Address>,
    pub highlighted: Option<usize>,
    pub winner: Option<Address>,
    pub draw_phase: DrawPhase,
    pub buttons: ButtonStates,
    pub alert: Option<String>,
    pub errors: Vec<String>,
}

/// Results of wallet and contract work running on spawned tasks.
#[derive(Debug)]
pub enum ActionEvent {
    Accounts(AccountReply),
    Network(NetworkCheck),
    MintProgress { attempt: u64, phase: MintPhase },
    Minted(MintReport),
    Draw(DrawReply),
}

/// Receivers the event loop multiplexes next to terminal input.
#[derive(Debug)]
pub struct AppChannels {
    pub accounts: mpsc::UnboundedReceiver<Vec<Address>>,
    pub draw_events: mpsc::UnboundedReceiver<DrawEvent>,
    pub actions: mpsc::UnboundedReceiver<ActionEvent>,
}

#[derive(Debug)]
pub struct AppController<P, C> {
    session: WalletSession<P>,
    mint: MintFlow<P, C>,
    draw: WinnerDraw<P, C>,
    contract_address: Option<Address>,
    is_verified: bool,
    page: Page,
    alert: Option<String>,
    errors: Vec<String>,
    accounts_tx: mpsc::UnboundedSender<Vec<Address>>,
    actions_tx: mpsc::UnboundedSender<ActionEvent>,
    in_flight: usize,
    subscription: Option<Subscription>,
}

impl<P, C> AppController<P, C>
where
    P: WalletProvider + Send + Sync + 'static,
    C: CertificateContract + Send + Sync + 'static,
{
    pub fn new(
        provider: Option<Arc<P>>,
        contract: Arc<C>,
        chain: ChainDescriptor,
        draw_config: DrawConfig,
        prefs: Preferences,
    ) -> (Self, AppChannels) {
        let (accounts_tx, accounts) = mpsc::unbounded_channel();
        let (draw_tx, draw_events) = mpsc::unbounded_channel();
        let (actions_tx, actions) = mpsc::unbounded_channel();
        let controller = Self {
            session: WalletSession::new(provider.clone()),
            mint: MintFlow::new(provider.clone(), contract.clone(), chain),
            draw: WinnerDraw::new(provider, contract, draw_config, draw_tx),
            contract_address: None,
            is_verified: prefs.is_verified,
            page: Page::Mint,
            alert: None,
            errors: Vec::new(),
            accounts_tx,
            actions_tx,
            in_flight: 0,
            subscription: None,
        };
        (
            controller,
            AppChannels {
                accounts,
                draw_events,
                actions,
            },
        )
    }

    pub fn with_contract_address(mut self, address: Address) -> Self {
        self.contract_address = Some(address);
        self
    }

    /// Subscribes to `accountsChanged`; notifications arrive on
    /// [`AppChannels::accounts`].
    pub fn mount(&mut self) {
        if self.subscription.is_some() {
            return;
        }
        let tx = self.accounts_tx.clone();
        self.subscription = self.session.attach(Arc::new(move |accounts: &[Address]| {
            let _ = tx.send(accounts.to_vec());
        }));
        if self.subscription.is_none() {
            warn!("no wallet provider found, running without account notifications");
        }
    }

    pub fn unmount(&mut self) {
        self.subscription = None;
        self.draw.stop_timers();
    }

    pub fn is_mounted(&self) -> bool {
        self.subscription.is_some()
    }

    /// Spawned jobs whose [`ActionEvent`] has not been handled yet.
    pub fn pending_actions(&self) -> usize {
        self.in_flight
    }

    fn spawn_action(&mut self, work: impl Future<Output = ActionEvent> + Send + 'static) {
        self.in_flight += 1;
        let tx = self.actions_tx.clone();
        tokio::spawn(async move {
            if tx.send(work.await).is_err() {
                debug!("event loop gone, dropping action result");
            }
        });
    }

    fn spawn_accounts(&mut self, request: AccountRequest<P>) {
        self.spawn_action(async move { ActionEvent::Accounts(request.run().await) });
    }

    fn spawn_draw(&mut self, job: DrawJob<P, C>) {
        self.spawn_action(async move { ActionEvent::Draw(job.run().await) });
    }

    pub fn page(&self) -> Page {
        self.page
    }

    pub fn available_pages(&self) -> Vec<Page> {
        if self.is_verified {
            vec![Page::Mint, Page::AdminDraw]
        } else {
            vec![Page::Mint]
        }
    }

    pub fn open_page(&mut self, page: Page) {
        if !self.available_pages().contains(&page) {
            self.set_alert(ADMIN_LOCKED);
            return;
        }
        self.page = page;
        if page == Page::AdminDraw {
            self.refresh_draw();
        }
    }

    pub fn next_page(&mut self) {
        let pages = self.available_pages();
        let current = pages.iter().position(|p| *p == self.page).unwrap_or(0);
        let next = pages[(current + 1) % pages.len()];
        if next != self.page {
            self.open_page(next);
        }
    }

    pub fn status(&self) -> &str {
        self.session.status()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.session.set_status(status);
    }

    pub fn alert(&self) -> Option<&str> {
        self.alert.as_deref()
    }

    pub fn set_alert(&mut self, message: impl Into<String>) {
        self.alert = Some(message.into());
    }

    pub fn dismiss_alert(&mut self) {
        self.alert = None;
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn push_errors(&mut self, errors: Vec<String>) {
        self.errors.extend(errors);
        if self.errors.len() > MAX_ERRORS {
            let overflow = self.errors.len() - MAX_ERRORS;
            self.errors.drain(0..overflow);
        }
    }

    pub fn account(&self) -> Option<Address> {
        self.session.account()
    }

    pub fn draw(&self) -> &WinnerDraw<P, C> {
        &self.draw
    }

    /// Returns true when a wallet request was started.
    pub fn connect(&mut self) -> bool {
        match self.session.start_connect() {
            Ok(request) => {
                self.spawn_accounts(request);
                true
            }
            Err(ConnectOutcome::ProviderMissing) => {
                self.set_alert(STATUS_INSTALL_WALLET);
                false
            }
            Err(_) => false,
        }
    }

    pub fn switch_account(&mut self) -> bool {
        match self.session.start_switch() {
            Ok(request) => {
                self.spawn_accounts(request);
                true
            }
            Err(_) => false,
        }
    }

    pub fn on_accounts_changed(&mut self, accounts: &[Address]) {
        self.session.on_accounts_changed(accounts);
    }

    /// Starts a claim for the connected account. Progress and the result
    /// arrive as [`ActionEvent`]s.
    pub fn mint(&mut self) -> bool {
        let job = match self.mint.start(self.session.account()) {
            Ok(job) => job,
            Err(MintOutcome::Busy) => return false,
            Err(outcome) => {
                let status = outcome.status_message(self.mint.chain());
                self.set_status(status);
                return false;
            }
        };
        self.set_status(MintPhase::NetworkCheck.status_message());
        let attempt = job.attempt();
        let progress = self.actions_tx.clone();
        self.spawn_action(async move {
            let report = job
                .run(move |phase| {
                    let _ = progress.send(ActionEvent::MintProgress { attempt, phase });
                })
                .await;
            ActionEvent::Minted(report)
        });
        true
    }

    fn report_wrong_network(&mut self, check: &NetworkCheck) {
        let chain = self.mint.chain().name.clone();
        self.set_status(format!("❌ Please switch your wallet to {chain} to mint"));
        if let NetworkCheck::Failed(reason) = check {
            self.push_errors(vec![format!("Network check failed: {reason}")]);
        }
    }

    pub fn refresh_draw(&mut self) {
        if let Some(job) = self.draw.start_load() {
            self.spawn_draw(job);
        }
    }

    /// Submits `pickWinner()` only while the pick button is enabled.
    pub fn pick_winner(&mut self) -> bool {
        if !self.buttons().pick_winner {
            return false;
        }
        let Some(job) = self.draw.start_pick() else {
            return false;
        };
        self.set_status(STATUS_AWAITING_SIGNATURE);
        self.spawn_draw(job);
        true
    }

    pub fn reset_winner(&mut self) -> bool {
        if !self.buttons().reset_winner {
            return false;
        }
        let Some(job) = self.draw.start_reset() else {
            return false;
        };
        self.set_status(STATUS_AWAITING_SIGNATURE);
        self.spawn_draw(job);
        true
    }

    /// Returns true when the screen needs a redraw.
    pub fn on_draw_event(&mut self, event: DrawEvent) -> bool {
        match event {
            DrawEvent::Tick { generation } => self.draw.on_tick(generation),
            DrawEvent::Settle { generation } => match self.draw.settle(generation) {
                Some(job) => {
                    self.spawn_draw(job);
                    true
                }
                None => false,
            },
        }
    }

    /// Applies the result of a spawned job. Results that belong to an older
    /// attempt, epoch or draw generation change nothing. Returns true when
    /// the screen needs a redraw.
    pub fn on_action(&mut self, event: ActionEvent) -> bool {
        if !matches!(event, ActionEvent::MintProgress { .. }) {
            self.in_flight = self.in_flight.saturating_sub(1);
        }
        match event {
            ActionEvent::Accounts(reply) => {
                let kind = reply.kind();
                let outcome = self.session.finish(reply);
                if kind == AccountRequestKind::Connect
                    && matches!(outcome, ConnectOutcome::Connected(_))
                    && let Some(check) = self.mint.check_network()
                {
                    self.spawn_action(async move { ActionEvent::Network(check.await) });
                }
                outcome != ConnectOutcome::Stale
            }
            ActionEvent::Network(check) => {
                if check.is_ready() || self.mint.phase().in_flight() {
                    return false;
                }
                self.report_wrong_network(&check);
                true
            }
            ActionEvent::MintProgress { attempt, phase } => {
                if !self.mint.on_progress(attempt, phase) {
                    return false;
                }
                self.set_status(phase.status_message());
                true
            }
            ActionEvent::Minted(report) => {
                let Some(outcome) = self.mint.finish(report) else {
                    return false;
                };
                info!(?outcome, "mint attempt finished");
                let status = outcome.status_message(self.mint.chain());
                self.set_status(status);
                match &outcome {
                    MintOutcome::WrongNetwork(check) => self.report_wrong_network(check),
                    MintOutcome::Failed(reason) => {
                        self.push_errors(vec![format!("Mint failed: {reason}")])
                    }
                    _ => {}
                }
                true
            }
            ActionEvent::Draw(reply) => self.apply_draw(reply),
        }
    }

    fn apply_draw(&mut self, reply: DrawReply) -> bool {
        match self.draw.finish(reply) {
            DrawUpdate::Stale => return false,
            DrawUpdate::Loaded => {}
            DrawUpdate::Spinning => self.set_status(STATUS_DRAWING),
            DrawUpdate::Settled(Some(winner)) => self.set_status(format!("🏆 Winner: {winner}")),
            DrawUpdate::Settled(None) => self.set_status(""),
            DrawUpdate::Reset => {
                self.set_status(ALERT_RESET_DONE);
                self.set_alert(ALERT_RESET_DONE);
            }
            DrawUpdate::Failed { alert, error } => {
                if let Some(alert) = alert {
                    self.set_status(alert);
                    self.set_alert(alert);
                }
                self.push_errors(vec![error]);
            }
        }
        true
    }

    pub fn buttons(&self) -> ButtonStates {
        ButtonStates {
            mint: !self.mint.phase().in_flight(),
            switch_account: self.session.account().is_some(),
            pick_winner: self.draw.can_pick(),
            reset_visible: self.draw.winner().is_some(),
            reset_winner: self.draw.can_reset(),
        }
    }

    pub fn snapshot(&self) -> AppSnapshot {
        AppSnapshot {
            page: self.page,
            pages: self.available_pages(),
            is_verified: self.is_verified,
            chain: self.mint.chain().to_string(),
            contract_address: self.contract_address,
            provider_present: self.session.has_provider(),
            account: self.session.account(),
            status: self.session.status().to_string(),
            mint_phase: self.mint.phase(),
            last_token_id: self.mint.last_token_id(),
            minted_users: self.draw.minted_users().to_vec(),
            highlighted: self.draw.slot_index(),
            winner: self.draw.winner(),
            draw_phase: self.draw.phase(),
            buttons: self.buttons(),
            alert: self.alert.clone(),
            errors: self.errors.clone(),
        }
    }
}

pub async fn run_app(config: AppConfig) -> Result<()> {
    let prefs = Preferences::load(&config.prefs_path)?;
    let chain = config.network.chain();
    let env = config.network.deployment_env();
    let store = DeploymentStore::new(env)?;
    let contract_address = store
        .resolve(config.contract, chain.chain_id)?
        .ok_or_else(|| {
            eyre!("No contract recorded for {env}; pass --contract <address> to set one")
        })?;
    info!(%contract_address, chain = %chain, "using certificate contract");

    let detected = HttpWalletProvider::detect(config.wallet_url.clone())
        .await?
        .map(Arc::new);
    let contract_wallet = match &detected {
        Some(wallet) => wallet.clone(),
        None => Arc::new(HttpWalletProvider::new(config.wallet_url.clone())?),
    };
    let watcher = detected
        .as_ref()
        .map(|wallet| wallet.watch_accounts(DEFAULT_ACCOUNT_POLL_INTERVAL));
    let contract = Arc::new(RpcCertificateContract::new(contract_address, contract_wallet));

    let (controller, channels) =
        AppController::new(detected, contract, chain, config.draw, prefs);
    let mut controller = controller.with_contract_address(contract_address);
    controller.mount();

    let mut ui_state = ui::UiState::default();
    let mut input_events = ui::input_event_stream();

    ui::terminal_enter(&mut ui_state)?;
    info!("UI ready");
    let res = run_loop(&mut controller, channels, &mut ui_state, &mut input_events).await;
    ui::terminal_exit()?;

    controller.unmount();
    if let Some(watcher) = watcher {
        watcher.abort();
    }
    res
}

/// Every wallet and contract call runs on a spawned task; the loop only
/// applies their results as they arrive on [`AppChannels::actions`].
pub async fn run_loop<P, C>(
    controller: &mut AppController<P, C>,
    mut channels: AppChannels,
    ui_state: &mut ui::UiState,
    input_events: &mut ui::InputEventReceiver,
) -> Result<()>
where
    P: WalletProvider + Send + Sync + 'static,
    C: CertificateContract + Send + Sync + 'static,
{
    info!("Running app loop");
    ui::draw(ui_state, &controller.snapshot()).wrap_err("initial draw failed")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(accounts) = channels.accounts.recv() => {
                controller.on_accounts_changed(&accounts);
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after account change failed")?;
            }
            Some(action) = channels.actions.recv() => {
                if controller.on_action(action) {
                    ui::draw(ui_state, &controller.snapshot())
                        .wrap_err("draw after wallet response failed")?;
                }
            }
            Some(event) = channels.draw_events.recv() => {
                if controller.on_draw_event(event) {
                    ui::draw(ui_state, &controller.snapshot())
                        .wrap_err("draw after draw timer failed")?;
                }
            }
            raw_ev = ui::next_raw_event(input_events) => {
                let event = raw_ev?;
                let Some(ev) = ui::interpret_event(ui_state, event) else {
                    continue;
                };
                let buttons = controller.buttons();
                match ev {
                    ui::UserEvent::Quit => break,
                    ui::UserEvent::Redraw => {}
                    ui::UserEvent::DismissAlert => controller.dismiss_alert(),
                    ui::UserEvent::NextPage => controller.next_page(),
                    ui::UserEvent::Connect => {
                        controller.connect();
                    }
                    ui::UserEvent::SwitchAccount => {
                        controller.switch_account();
                    }
                    ui::UserEvent::Mint => {
                        if buttons.mint {
                            controller.mint();
                        }
                    }
                    ui::UserEvent::PickWinner => {
                        if buttons.pick_winner {
                            controller.pick_winner();
                        }
                    }
                    ui::UserEvent::ResetWinner => {
                        if buttons.reset_winner {
                            controller.reset_winner();
                        }
                    }
                    ui::UserEvent::RefreshDraw => controller.refresh_draw(),
                }
                ui::draw(ui_state, &controller.snapshot())
                    .wrap_err("draw after user action failed")?;
            }
        }
    }
    Ok(())
}
