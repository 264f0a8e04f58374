#![allow(non_snake_case)]

use alloy_primitives::Address;
use certificate_claim::{
    client::{
        AppChannels,
        AppController,
    },
    draw::{
        DrawConfig,
        DrawEvent,
    },
    network::ChainDescriptor,
    preferences::Preferences,
    test_helpers::{
        MockCertificateContract,
        MockWalletProvider,
    },
};
use std::{
    sync::Arc,
    time::Duration,
};

mod admin_draw;
mod wallet_session;

type TestController = AppController<MockWalletProvider, MockCertificateContract>;

struct TestContext {
    wallet: MockWalletProvider,
    contract: MockCertificateContract,
    controller: TestController,
    channels: AppChannels,
}

impl TestContext {
    fn new(wallet: MockWalletProvider, contract: MockCertificateContract) -> Self {
        Self::with_options(wallet, contract, false, DrawConfig::default())
    }

    fn admin(
        wallet: MockWalletProvider,
        contract: MockCertificateContract,
        draw: DrawConfig,
    ) -> Self {
        Self::with_options(wallet, contract, true, draw)
    }

    fn with_options(
        wallet: MockWalletProvider,
        contract: MockCertificateContract,
        is_verified: bool,
        draw: DrawConfig,
    ) -> Self {
        let (mut controller, channels) = AppController::new(
            Some(Arc::new(wallet.clone())),
            Arc::new(contract.clone()),
            ChainDescriptor::sepolia(),
            draw,
            Preferences { is_verified },
        );
        controller.mount();
        Self {
            wallet,
            contract,
            controller,
            channels,
        }
    }

    /// Feeds pending `accountsChanged` notifications into the controller.
    fn deliver_account_changes(&mut self) -> usize {
        let mut delivered = 0;
        while let Ok(accounts) = self.channels.accounts.try_recv() {
            self.controller.on_accounts_changed(&accounts);
            delivered += 1;
        }
        delivered
    }

    /// Applies results of spawned wallet and contract jobs until none are
    /// left running. Returns how many results were handled.
    async fn run_actions(&mut self) -> usize {
        let mut handled = 0;
        while self.controller.pending_actions() > 0 {
            let Some(event) = self.channels.actions.recv().await else {
                break;
            };
            self.controller.on_action(event);
            handled += 1;
        }
        handled
    }

    /// Drives draw timer events until the spin settles, then applies the
    /// winner read.
    async fn run_draw_to_completion(&mut self) -> Vec<usize> {
        let mut highlighted = Vec::new();
        while let Some(event) = self.channels.draw_events.recv().await {
            let settling = matches!(event, DrawEvent::Settle { .. });
            if self.controller.on_draw_event(event)
                && !settling
                && let Some(index) = self.controller.snapshot().highlighted
            {
                highlighted.push(index);
            }
            if settling {
                break;
            }
        }
        self.run_actions().await;
        highlighted
    }
}

fn user(byte: u8) -> Address {
    Address::repeat_byte(byte)
}

fn short_spin() -> DrawConfig {
    DrawConfig {
        spin_duration: Duration::from_millis(500),
        spin_interval: Duration::from_millis(100),
    }
}
