use crate::{
    TestContext,
    user,
};
use certificate_claim::{
    session::{
        STATUS_AWAITING_APPROVAL,
        STATUS_CONNECT_FAILED,
        STATUS_CONNECTED,
        STATUS_DISCONNECTED,
        STATUS_INSTALL_WALLET,
    },
    test_helpers::{
        MockCertificateContract,
        MockWalletProvider,
    },
};

#[tokio::test]
async fn connect__first_approved_account_becomes_current() {
    // given
    let abc = user(0xab);
    let mut ctx = TestContext::new(
        MockWalletProvider::new().with_approvable(vec![abc, user(0x02)]),
        MockCertificateContract::new(),
    );
    assert_eq!(ctx.controller.snapshot().account, None);

    // when
    assert!(ctx.controller.connect());
    let waiting = ctx.controller.snapshot().status;
    ctx.run_actions().await;

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(waiting, STATUS_AWAITING_APPROVAL);
    assert_eq!(snapshot.account, Some(abc));
    assert_eq!(snapshot.status, STATUS_CONNECTED);
    assert!(snapshot.buttons.switch_account);
}

#[tokio::test]
async fn connect__rejected_request_shows_failure() {
    let mut ctx = TestContext::new(
        MockWalletProvider::new().rejecting("eth_requestAccounts"),
        MockCertificateContract::new(),
    );

    ctx.controller.connect();
    ctx.run_actions().await;

    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.account, None);
    assert_eq!(snapshot.status, STATUS_CONNECT_FAILED);
}

#[tokio::test]
async fn connect__on_wrong_chain_switches_the_wallet() {
    // given
    let wallet = MockWalletProvider::new()
        .with_chain_id(1)
        .with_approvable(vec![user(1)]);
    let mut ctx = TestContext::new(wallet.clone(), MockCertificateContract::new());

    // when
    ctx.controller.connect();
    ctx.run_actions().await;

    // then
    assert_eq!(wallet.chain_id(), certificate_claim::network::SEPOLIA_CHAIN_ID);
    assert_eq!(ctx.controller.snapshot().status, STATUS_CONNECTED);
}

#[tokio::test]
async fn connect__declined_network_change_reports_wrong_network() {
    // given
    let wallet = MockWalletProvider::new()
        .with_chain_id(1)
        .with_approvable(vec![user(1)])
        .rejecting("wallet_addEthereumChain");
    let mut ctx = TestContext::new(wallet, MockCertificateContract::new());

    // when
    ctx.controller.connect();
    ctx.run_actions().await;

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.account, Some(user(1)));
    assert!(snapshot.status.contains("Sepolia"));
    assert_eq!(snapshot.errors.len(), 1);
}

#[tokio::test]
async fn connect__without_wallet_raises_install_alert() {
    // given
    let (mut controller, _channels) = certificate_claim::client::AppController::<
        MockWalletProvider,
        MockCertificateContract,
    >::new(
        None,
        std::sync::Arc::new(MockCertificateContract::new()),
        certificate_claim::network::ChainDescriptor::sepolia(),
        Default::default(),
        Default::default(),
    );
    controller.mount();

    // when
    let started = controller.connect();

    // then
    assert!(!started);
    assert_eq!(controller.pending_actions(), 0);
    assert_eq!(controller.alert(), Some(STATUS_INSTALL_WALLET));
    assert!(!controller.is_mounted());
}

#[tokio::test]
async fn accounts_changed__notifications_flow_through_the_subscription() {
    // given
    let mut ctx = TestContext::new(
        MockWalletProvider::new().with_approvable(vec![user(1)]),
        MockCertificateContract::new(),
    );
    ctx.controller.connect();
    ctx.run_actions().await;

    // when
    ctx.wallet.change_accounts(vec![user(2), user(3)]);
    let delivered = ctx.deliver_account_changes();

    // then
    assert_eq!(delivered, 1);
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.account, Some(user(2)));
    assert!(snapshot.status.contains("Account changed"));

    // when
    ctx.wallet.change_accounts(vec![]);
    ctx.deliver_account_changes();

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.account, None);
    assert_eq!(snapshot.status, STATUS_DISCONNECTED);
    assert!(!snapshot.buttons.switch_account);
}

#[tokio::test]
async fn unmount__stops_account_notifications() {
    // given
    let mut ctx = TestContext::new(MockWalletProvider::new(), MockCertificateContract::new());
    assert_eq!(ctx.wallet.listener_count(), 1);

    // when
    ctx.controller.unmount();
    ctx.wallet.change_accounts(vec![user(9)]);

    // then
    assert_eq!(ctx.wallet.listener_count(), 0);
    assert_eq!(ctx.deliver_account_changes(), 0);
    assert_eq!(ctx.controller.snapshot().account, None);
}

#[tokio::test]
async fn switch_account__adopts_account_picked_in_wallet() {
    // given
    let mut ctx = TestContext::new(
        MockWalletProvider::new()
            .with_authorized(vec![user(1)])
            .with_permission_selection(vec![user(5)]),
        MockCertificateContract::new(),
    );
    ctx.controller.connect();
    ctx.run_actions().await;

    // when
    assert!(ctx.controller.switch_account());
    ctx.run_actions().await;

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.account, Some(user(5)));
    assert!(snapshot.status.contains("Switched to"));
}

#[tokio::test]
async fn accounts_changed__applied_while_connect_is_in_flight() {
    // given
    let mut ctx = TestContext::new(
        MockWalletProvider::new().with_approvable(vec![user(1)]),
        MockCertificateContract::new(),
    );
    assert!(ctx.controller.connect());

    // when
    ctx.wallet.change_accounts(vec![user(7)]);
    let delivered = ctx.deliver_account_changes();
    ctx.run_actions().await;

    // then
    assert_eq!(delivered, 1);
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.account, Some(user(7)));
    assert!(snapshot.status.contains("Account changed"));
}
