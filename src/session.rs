use crate::provider::{
    self,
    AccountsChangedHandler,
    ProviderError,
    Subscription,
    WalletProvider,
};
use alloy_primitives::Address;
use std::sync::Arc;
use tracing::{
    info,
    warn,
};

pub const STATUS_CONNECTED: &str = "✅ Wallet connected";
pub const STATUS_CONNECT_FAILED: &str = "❌ Failed to connect wallet";
pub const STATUS_INSTALL_WALLET: &str = "🦊 No wallet found. Please install MetaMask";
pub const STATUS_DISCONNECTED: &str = "🔌 Wallet disconnected";
pub const STATUS_NO_ACCOUNT_SELECTED: &str = "⚠️ No account selected";
pub const STATUS_SWITCH_FAILED: &str = "❌ Failed to switch accounts";
pub const STATUS_AWAITING_APPROVAL: &str = "🦊 Waiting for wallet approval...";
pub const STATUS_CHOOSE_ACCOUNT: &str = "🔄 Choose an account in your wallet...";

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnectOutcome {
    Connected(Address),
    NoAccounts,
    Rejected,
    ProviderMissing,
    /// Another account request was still open; nothing was sent.
    Busy,
    /// The wallet answered after a newer `accountsChanged` had been applied.
    Stale,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AccountRequestKind {
    /// `eth_requestAccounts`
    Connect,
    /// `wallet_requestPermissions`, then `eth_accounts`
    Switch,
}

/// One wallet round trip, detached from the session so it can run on its own task.
#[derive(Debug)]
pub struct AccountRequest<P> {
    wallet: Arc<P>,
    kind: AccountRequestKind,
    epoch: u64,
}

#[derive(Debug)]
pub struct AccountReply {
    kind: AccountRequestKind,
    epoch: u64,
    result: Result<Vec<Address>, ProviderError>,
}

impl AccountReply {
    pub fn kind(&self) -> AccountRequestKind {
        self.kind
    }
}

impl<P: WalletProvider> AccountRequest<P> {
    pub fn kind(&self) -> AccountRequestKind {
        self.kind
    }

    pub async fn run(self) -> AccountReply {
        let wallet = self.wallet.as_ref();
        let result = match self.kind {
            AccountRequestKind::Connect => provider::request_accounts(wallet).await,
            AccountRequestKind::Switch => match provider::request_permissions(wallet).await {
                Ok(()) => provider::accounts(wallet).await,
                Err(err) => Err(err),
            },
        };
        if let Err(err) = &result {
            warn!(kind = ?self.kind, error = %err, "account request failed");
        }
        AccountReply {
            kind: self.kind,
            epoch: self.epoch,
            result,
        }
    }
}

/// Tracks the connected account and the status line of the mint page.
#[derive(Debug)]
pub struct WalletSession<P> {
    provider: Option<Arc<P>>,
    account: Option<Address>,
    status: String,
    epoch: u64,
    pending: bool,
}

impl<P: WalletProvider> WalletSession<P> {
    pub fn new(provider: Option<Arc<P>>) -> Self {
        Self {
            provider,
            account: None,
            status: String::new(),
            epoch: 0,
            pending: false,
        }
    }

    pub fn account(&self) -> Option<Address> {
        self.account
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_status(&mut self, message: impl Into<String>) {
        self.status = message.into();
    }

    pub fn has_provider(&self) -> bool {
        self.provider.is_some()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Registers `handler` for `accountsChanged`. The returned guard must live
    /// as long as the page; dropping it unregisters the handler.
    pub fn attach(&self, handler: AccountsChangedHandler) -> Option<Subscription> {
        self.provider
            .as_ref()
            .map(|provider| provider.on_accounts_changed(handler))
    }

    pub fn start_connect(&mut self) -> Result<AccountRequest<P>, ConnectOutcome> {
        self.start(AccountRequestKind::Connect, STATUS_AWAITING_APPROVAL)
    }

    /// Lets the user pick another authorized account, then re-reads the list.
    pub fn start_switch(&mut self) -> Result<AccountRequest<P>, ConnectOutcome> {
        self.start(AccountRequestKind::Switch, STATUS_CHOOSE_ACCOUNT)
    }

    fn start(
        &mut self,
        kind: AccountRequestKind,
        status: &str,
    ) -> Result<AccountRequest<P>, ConnectOutcome> {
        let Some(wallet) = self.provider.clone() else {
            self.set_status(STATUS_INSTALL_WALLET);
            return Err(ConnectOutcome::ProviderMissing);
        };
        if self.pending {
            return Err(ConnectOutcome::Busy);
        }
        self.pending = true;
        self.set_status(status);
        Ok(AccountRequest {
            wallet,
            kind,
            epoch: self.epoch,
        })
    }

    pub fn finish(&mut self, reply: AccountReply) -> ConnectOutcome {
        self.pending = false;
        if reply.epoch != self.epoch {
            info!(kind = ?reply.kind, "accounts changed while the wallet was busy, dropping reply");
            return ConnectOutcome::Stale;
        }
        match (reply.kind, reply.result) {
            (kind, Ok(accounts)) => match accounts.first() {
                Some(first) => {
                    info!(account = %first, ?kind, "wallet account selected");
                    self.account = Some(*first);
                    match kind {
                        AccountRequestKind::Connect => self.set_status(STATUS_CONNECTED),
                        AccountRequestKind::Switch => {
                            self.set_status(format!("🔄 Switched to {first}"))
                        }
                    }
                    ConnectOutcome::Connected(*first)
                }
                None => {
                    if kind == AccountRequestKind::Switch {
                        self.account = None;
                    }
                    self.set_status(STATUS_NO_ACCOUNT_SELECTED);
                    ConnectOutcome::NoAccounts
                }
            },
            (AccountRequestKind::Connect, Err(_)) => {
                self.set_status(STATUS_CONNECT_FAILED);
                ConnectOutcome::Rejected
            }
            (AccountRequestKind::Switch, Err(_)) => {
                self.set_status(STATUS_SWITCH_FAILED);
                ConnectOutcome::Rejected
            }
        }
    }

    pub fn on_accounts_changed(&mut self, accounts: &[Address]) {
        self.epoch += 1;
        match accounts.first() {
            Some(first) => {
                info!(account = %first, "account changed");
                self.account = Some(*first);
                self.set_status(format!("🔄 Account changed to {first}"));
            }
            None => {
                info!("wallet disconnected");
                self.account = None;
                self.set_status(STATUS_DISCONNECTED);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use crate::test_helpers::MockWalletProvider;
    use proptest::prelude::*;
    use std::sync::Mutex;

    type TestSession = WalletSession<MockWalletProvider>;

    fn session(wallet: MockWalletProvider) -> TestSession {
        WalletSession::new(Some(Arc::new(wallet)))
    }

    async fn complete(
        session: &mut TestSession,
        started: Result<AccountRequest<MockWalletProvider>, ConnectOutcome>,
    ) -> ConnectOutcome {
        match started {
            Ok(request) => {
                let reply = request.run().await;
                session.finish(reply)
            }
            Err(outcome) => outcome,
        }
    }

    async fn connect(session: &mut TestSession) -> ConnectOutcome {
        let started = session.start_connect();
        complete(session, started).await
    }

    async fn switch(session: &mut TestSession) -> ConnectOutcome {
        let started = session.start_switch();
        complete(session, started).await
    }

    #[tokio::test]
    async fn connect__adopts_first_approved_account() {
        // given
        let abc = Address::repeat_byte(0xab);
        let other = Address::repeat_byte(0x01);
        let mut session = session(MockWalletProvider::new().with_approvable(vec![abc, other]));
        assert_eq!(session.account(), None);

        // when
        let outcome = connect(&mut session).await;

        // then
        assert_eq!(outcome, ConnectOutcome::Connected(abc));
        assert_eq!(session.account(), Some(abc));
        assert_eq!(session.status(), STATUS_CONNECTED);
    }

    #[tokio::test]
    async fn connect__rejection_keeps_account_unchanged() {
        // given
        let mut session =
            session(MockWalletProvider::new().rejecting("eth_requestAccounts"));

        // when
        let outcome = connect(&mut session).await;

        // then
        assert_eq!(outcome, ConnectOutcome::Rejected);
        assert_eq!(session.account(), None);
        assert_eq!(session.status(), STATUS_CONNECT_FAILED);
    }

    #[tokio::test]
    async fn connect__without_provider_prompts_install() {
        let mut session = WalletSession::<MockWalletProvider>::new(None);

        let outcome = connect(&mut session).await;

        assert_eq!(outcome, ConnectOutcome::ProviderMissing);
        assert_eq!(session.status(), STATUS_INSTALL_WALLET);
        assert!(session.attach(Arc::new(|_: &[Address]| {})).is_none());
    }

    #[tokio::test]
    async fn start_switch__switches_to_selected_account() {
        // given
        let first = Address::repeat_byte(0x0a);
        let second = Address::repeat_byte(0x0b);
        let mut session = session(
            MockWalletProvider::new()
                .with_authorized(vec![first])
                .with_permission_selection(vec![second]),
        );
        connect(&mut session).await;

        // when
        let outcome = switch(&mut session).await;

        // then
        assert_eq!(outcome, ConnectOutcome::Connected(second));
        assert_eq!(session.account(), Some(second));
    }

    #[tokio::test]
    async fn start_switch__empty_selection_clears_account() {
        // given
        let first = Address::repeat_byte(0x0a);
        let mut session = session(
            MockWalletProvider::new()
                .with_authorized(vec![first])
                .with_permission_selection(vec![]),
        );
        connect(&mut session).await;

        // when
        let outcome = switch(&mut session).await;

        // then
        assert_eq!(outcome, ConnectOutcome::NoAccounts);
        assert_eq!(session.account(), None);
        assert_eq!(session.status(), STATUS_NO_ACCOUNT_SELECTED);
    }

    #[tokio::test]
    async fn start_switch__declined_keeps_account() {
        // given
        let first = Address::repeat_byte(0x0a);
        let mut session = session(
            MockWalletProvider::new()
                .with_authorized(vec![first])
                .rejecting("wallet_requestPermissions"),
        );
        connect(&mut session).await;

        // when
        let outcome = switch(&mut session).await;

        // then
        assert_eq!(outcome, ConnectOutcome::Rejected);
        assert_eq!(session.account(), Some(first));
        assert_eq!(session.status(), STATUS_SWITCH_FAILED);
    }

    #[tokio::test]
    async fn start_connect__second_request_while_pending_is_busy() {
        // given
        let wallet = MockWalletProvider::new().with_approvable(vec![Address::repeat_byte(1)]);
        let mut session = session(wallet.clone());
        let first = session.start_connect().unwrap();

        // when
        let second = session.start_connect();

        // then
        assert_eq!(second.unwrap_err(), ConnectOutcome::Busy);
        assert!(session.is_pending());
        assert_eq!(session.status(), STATUS_AWAITING_APPROVAL);
        let outcome = session.finish(first.run().await);
        assert_eq!(outcome, ConnectOutcome::Connected(Address::repeat_byte(1)));
        assert!(!session.is_pending());
        assert_eq!(wallet.requested_methods(), vec!["eth_requestAccounts".to_string()]);
    }

    #[tokio::test]
    async fn finish__reply_older_than_account_change_is_ignored() {
        // given
        let approved = Address::repeat_byte(1);
        let switched = Address::repeat_byte(2);
        let mut session = session(MockWalletProvider::new().with_approvable(vec![approved]));
        let request = session.start_connect().unwrap();
        let reply = request.run().await;

        // when
        session.on_accounts_changed(&[switched]);
        let outcome = session.finish(reply);

        // then
        assert_eq!(outcome, ConnectOutcome::Stale);
        assert_eq!(session.account(), Some(switched));
        assert!(!session.is_pending());
    }

    #[test]
    fn attach__handler_receives_notifications_until_dropped() {
        // given
        let wallet = MockWalletProvider::new();
        let session = WalletSession::new(Some(Arc::new(wallet.clone())));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let subscription = {
            let seen = seen.clone();
            session.attach(Arc::new(move |accounts: &[Address]| {
                seen.lock().unwrap().push(accounts.len());
            }))
        };

        // when
        wallet.change_accounts(vec![Address::repeat_byte(1)]);
        drop(subscription);
        wallet.change_accounts(vec![]);

        // then
        assert_eq!(*seen.lock().unwrap(), vec![1]);
        assert_eq!(wallet.listener_count(), 0);
    }

    fn address_lists() -> impl Strategy<Value = Vec<Vec<Address>>> {
        let address = any::<[u8; 20]>().prop_map(Address::from);
        prop::collection::vec(prop::collection::vec(address, 0..4), 0..12)
    }

    proptest! {
        #[test]
        fn on_accounts_changed__tracks_latest_notification(notifications in address_lists()) {
            let mut session = WalletSession::<MockWalletProvider>::new(None);
            let mut expected = None;
            for accounts in &notifications {
                session.on_accounts_changed(accounts);
                expected = accounts.first().copied();
                prop_assert_eq!(session.account(), expected);
            }
            prop_assert_eq!(session.account(), expected);
            if notifications.last().is_some_and(|last| last.is_empty()) {
                prop_assert_eq!(session.status(), STATUS_DISCONNECTED);
            }
        }
    }
}
