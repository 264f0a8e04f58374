use crate::{
    TestContext,
    short_spin,
    user,
};
use certificate_claim::{
    client::{
        Page,
        STATUS_AWAITING_SIGNATURE,
    },
    draw::{
        ALERT_PICK_FAILED,
        ALERT_RESET_DONE,
        ALERT_SETTLE_FAILED,
        DrawPhase,
    },
    provider::ProviderError,
    test_helpers::{
        ContractCall,
        MockCertificateContract,
        MockWalletProvider,
    },
};

fn operator() -> MockWalletProvider {
    MockWalletProvider::new().with_authorized(vec![user(0xad)])
}

async fn admin_page(contract: MockCertificateContract) -> TestContext {
    let mut ctx = TestContext::admin(operator(), contract, short_spin());
    ctx.controller.open_page(Page::AdminDraw);
    ctx.run_actions().await;
    ctx
}

#[tokio::test]
async fn open_page__loads_minted_users_and_winner() {
    // given
    let minted = vec![user(1), user(2)];
    let contract = MockCertificateContract::new()
        .with_minted(minted.clone())
        .with_winner(user(2));

    // when
    let ctx = admin_page(contract).await;

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.page, Page::AdminDraw);
    assert_eq!(snapshot.minted_users, minted);
    assert_eq!(snapshot.winner, Some(user(2)));
    assert!(!snapshot.buttons.pick_winner);
    assert!(snapshot.buttons.reset_visible);
    assert!(snapshot.buttons.reset_winner);
}

#[tokio::test(start_paused = true)]
async fn pick_winner__spins_over_minted_users_then_shows_contract_winner() {
    // given
    let minted = vec![user(0xa), user(0xb), user(0xc)];
    let mut ctx = admin_page(
        MockCertificateContract::new()
            .with_minted(minted.clone())
            .with_draw_result(minted[1]),
    )
    .await;

    // when
    assert!(ctx.controller.pick_winner());
    let waiting = ctx.controller.snapshot();
    ctx.run_actions().await;
    let spinning = ctx.controller.snapshot();
    let highlighted = ctx.run_draw_to_completion().await;

    // then
    assert_eq!(waiting.draw_phase, DrawPhase::WaitingForSignature);
    assert_eq!(waiting.status, STATUS_AWAITING_SIGNATURE);
    assert_eq!(spinning.draw_phase, DrawPhase::Spinning);
    assert!(!spinning.buttons.pick_winner);
    assert_eq!(highlighted, vec![0, 1, 2, 0, 1]);

    let settled = ctx.controller.snapshot();
    assert_eq!(settled.winner, Some(minted[1]));
    assert_eq!(settled.draw_phase, DrawPhase::Settled);
    assert_eq!(settled.highlighted, None);
    assert!(settled.status.contains("Winner"));
    assert_eq!(ctx.contract.submitted().len(), 1);
}

#[tokio::test]
async fn pick_winner__with_no_minted_users_submits_nothing() {
    // given
    let mut ctx = admin_page(MockCertificateContract::new()).await;

    // when
    let started = ctx.controller.pick_winner();

    // then
    assert!(!started);
    assert_eq!(ctx.controller.pending_actions(), 0);
    assert!(ctx.contract.submitted().is_empty());
    assert_eq!(ctx.controller.snapshot().draw_phase, DrawPhase::Idle);
}

#[tokio::test]
async fn pick_winner__stored_winner_disables_the_draw() {
    // given
    let mut ctx = admin_page(
        MockCertificateContract::new()
            .with_minted(vec![user(1), user(2)])
            .with_winner(user(1)),
    )
    .await;
    assert!(!ctx.controller.snapshot().buttons.pick_winner);

    // when
    let started = ctx.controller.pick_winner();
    ctx.run_actions().await;

    // then
    assert!(!started);
    assert!(ctx.contract.submitted().is_empty());
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.winner, Some(user(1)));
    assert_eq!(snapshot.draw_phase, DrawPhase::Settled);
    assert_eq!(snapshot.alert, None);
}

#[tokio::test]
async fn pick_winner__failure_alerts_and_allows_retry() {
    // given
    let mut ctx = admin_page(
        MockCertificateContract::new()
            .with_minted(vec![user(1)])
            .failing(
                ContractCall::PickWinner,
                ProviderError::Transport("wallet went away".into()),
            ),
    )
    .await;

    // when
    ctx.controller.pick_winner();
    ctx.run_actions().await;

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.alert.as_deref(), Some(ALERT_PICK_FAILED));
    assert_eq!(snapshot.draw_phase, DrawPhase::Idle);
    assert!(snapshot.buttons.pick_winner);
    assert_eq!(snapshot.errors.len(), 1);

    ctx.controller.dismiss_alert();
    assert_eq!(ctx.controller.snapshot().alert, None);
}

#[tokio::test(start_paused = true)]
async fn pick_winner__unreadable_winner_after_spin_alerts() {
    // given
    let mut ctx = admin_page(MockCertificateContract::new().with_minted(vec![user(1), user(2)])).await;
    ctx.controller.pick_winner();
    ctx.run_actions().await;

    // when
    ctx.contract.fail(
        ContractCall::GetWinner,
        ProviderError::Transport("node unreachable".into()),
    );
    ctx.run_draw_to_completion().await;

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.alert.as_deref(), Some(ALERT_SETTLE_FAILED));
    assert_eq!(snapshot.draw_phase, DrawPhase::Idle);
    assert_eq!(snapshot.highlighted, None);
    assert_eq!(snapshot.winner, None);
}

#[tokio::test(start_paused = true)]
async fn reset_winner__after_draw_allows_another_pick() {
    // given
    let mut ctx = admin_page(MockCertificateContract::new().with_minted(vec![user(1), user(2)])).await;
    ctx.controller.pick_winner();
    ctx.run_actions().await;
    ctx.run_draw_to_completion().await;
    assert!(ctx.controller.snapshot().winner.is_some());

    // when
    assert!(ctx.controller.reset_winner());
    ctx.run_actions().await;

    // then
    let snapshot = ctx.controller.snapshot();
    assert_eq!(snapshot.alert.as_deref(), Some(ALERT_RESET_DONE));
    assert_eq!(snapshot.winner, None);
    assert!(!snapshot.buttons.reset_visible);
    assert!(snapshot.buttons.pick_winner);
    assert_eq!(ctx.contract.stored_winner(), None);
}

#[tokio::test]
async fn open_page__unverified_operator_stays_on_mint_page() {
    let mut ctx = TestContext::new(operator(), MockCertificateContract::new());

    ctx.controller.open_page(Page::AdminDraw);

    assert_eq!(ctx.controller.page(), Page::Mint);
    assert_eq!(ctx.controller.pending_actions(), 0);
    assert_eq!(ctx.controller.snapshot().pages, vec![Page::Mint]);
}
