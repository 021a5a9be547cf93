mod common;

use common::*;
use dca_dapp::{ConnectionManager, DappError, ErrorCategory, ProviderEvent, SessionStatus};
use std::time::Duration;

#[tokio::test]
async fn test_connect_on_required_network() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = manager_for(&wallet);
    assert_eq!(manager.status(), SessionStatus::Disconnected);

    manager.connect().await.unwrap();

    let session = manager.session().await;
    assert_eq!(session.status(), SessionStatus::Connected);
    assert_eq!(session.network_id(), Some(REQUIRED_CHAIN));
    assert_eq!(session.signer().map(|s| s.account()), Some(wallet.account()));
}

#[tokio::test]
async fn test_connect_on_wrong_network() {
    let wallet = FakeWallet::on_chain(1);
    let manager = manager_for(&wallet);

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(
        err,
        DappError::WrongNetwork {
            required: REQUIRED_CHAIN,
            actual: 1
        }
    ));
    assert_eq!(err.category(), ErrorCategory::SwitchNetwork);

    let session = manager.session().await;
    assert_eq!(session.status(), SessionStatus::NetworkMismatch);
    assert_eq!(session.network_id(), Some(1));
    assert!(session.signer().is_none());

    assert!(matches!(
        manager.get_signer().await,
        Err(DappError::NotConnected)
    ));
}

#[tokio::test]
async fn test_refused_connection_leaves_session_disconnected() {
    let manager = ConnectionManager::new(FakeConnector::refusing("user closed the prompt"), 5);

    let err = manager.connect().await.unwrap_err();
    assert!(matches!(err, DappError::ConnectionRefused(ref msg) if msg.contains("closed")));
    assert_eq!(err.category(), ErrorCategory::Reconnect);
    assert_eq!(manager.status(), SessionStatus::Disconnected);
    assert!(manager.session().await.signer().is_none());
}

#[tokio::test]
async fn test_unreadable_network_refuses_connection() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    wallet.set_unreadable(true);
    let manager = manager_for(&wallet);

    assert!(matches!(
        manager.connect().await,
        Err(DappError::ConnectionRefused(_))
    ));
    assert_eq!(manager.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_get_signer_requires_connection() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = manager_for(&wallet);

    let err = manager.get_signer().await.unwrap_err();
    assert!(matches!(err, DappError::NotConnected));
    assert_eq!(err.category(), ErrorCategory::Reconnect);
}

#[tokio::test]
async fn test_get_signer_rechecks_network_every_call() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;

    let signer = manager.get_signer().await.unwrap();
    assert_eq!(signer.account(), wallet.account());

    // No event: the wallet moves and only the next get_signer notices.
    wallet.switch_chain_silently(137);
    assert_eq!(manager.status(), SessionStatus::Connected);

    let err = manager.get_signer().await.unwrap_err();
    assert!(matches!(
        err,
        DappError::WrongNetwork {
            required: REQUIRED_CHAIN,
            actual: 137
        }
    ));
    assert_eq!(manager.status(), SessionStatus::NetworkMismatch);

    assert!(matches!(
        manager.get_signer().await,
        Err(DappError::NotConnected)
    ));
}

#[tokio::test]
async fn test_unresponsive_wallet_drops_session() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;

    wallet.set_unreadable(true);
    assert!(matches!(
        manager.get_signer().await,
        Err(DappError::NotConnected)
    ));
    assert_eq!(manager.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_chain_change_event_flags_mismatch() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;
    let mut status = manager.watch_status();

    assert!(wallet.emit(ProviderEvent::ChainChanged(1)));
    wait_for_status(&mut status, SessionStatus::NetworkMismatch).await;

    let session = manager.session().await;
    assert_eq!(session.network_id(), Some(1));
    assert!(session.signer().is_none());
}

#[tokio::test]
async fn test_switching_back_restores_connection() {
    let wallet = FakeWallet::on_chain(1);
    let manager = manager_for(&wallet);
    let mut status = manager.watch_status();

    assert!(manager.connect().await.is_err());
    wait_for_status(&mut status, SessionStatus::NetworkMismatch).await;

    assert!(wallet.emit(ProviderEvent::ChainChanged(REQUIRED_CHAIN)));
    wait_for_status(&mut status, SessionStatus::Connected).await;

    let signer = manager.get_signer().await.unwrap();
    assert_eq!(signer.account(), wallet.account());
}

#[tokio::test]
async fn test_revoked_accounts_disconnect() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;
    let mut status = manager.watch_status();

    assert!(wallet.emit(ProviderEvent::AccountsChanged(vec![])));
    wait_for_status(&mut status, SessionStatus::Disconnected).await;

    let session = manager.session().await;
    assert!(session.signer().is_none());
    assert!(session.network_id().is_none());
}

#[tokio::test]
async fn test_provider_disconnect_event() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;
    let mut status = manager.watch_status();

    assert!(wallet.emit(ProviderEvent::Disconnected));
    wait_for_status(&mut status, SessionStatus::Disconnected).await;
    assert!(matches!(
        manager.get_signer().await,
        Err(DappError::NotConnected)
    ));
}

#[tokio::test]
async fn test_account_change_event_updates_signer() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;
    let first = wallet.account();

    let second = wallet.switch_account();
    assert_ne!(first, second);
    assert!(wallet.emit(ProviderEvent::AccountsChanged(vec![second])));

    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let current = manager.session().await.signer().map(|s| s.account());
            if current == Some(second) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("session never picked up the new account");

    assert_eq!(manager.status(), SessionStatus::Connected);
}

#[tokio::test]
async fn test_get_signer_picks_up_silent_account_switch() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;

    let second = wallet.switch_account();
    let signer = manager.get_signer().await.unwrap();
    assert_eq!(signer.account(), second);
    assert_eq!(
        manager.session().await.signer().map(|s| s.account()),
        Some(second)
    );
}

#[tokio::test]
async fn test_disconnect_stops_listening() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;

    manager.disconnect().await;
    assert_eq!(manager.status(), SessionStatus::Disconnected);

    wallet.emit(ProviderEvent::ChainChanged(REQUIRED_CHAIN));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.status(), SessionStatus::Disconnected);
}

#[tokio::test]
async fn test_reconnect_ignores_replaced_provider() {
    let old_wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let connector = FakeConnector::accepting(old_wallet.clone());
    let manager = ConnectionManager::new(connector.clone(), REQUIRED_CHAIN);
    manager.connect().await.unwrap();

    let new_wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    connector.replace_wallet(new_wallet.clone());
    manager.connect().await.unwrap();
    assert_eq!(
        manager.session().await.signer().map(|s| s.account()),
        Some(new_wallet.account())
    );

    old_wallet.emit(ProviderEvent::Disconnected);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(manager.status(), SessionStatus::Connected);

    let mut status = manager.watch_status();
    assert!(new_wallet.emit(ProviderEvent::ChainChanged(10)));
    wait_for_status(&mut status, SessionStatus::NetworkMismatch).await;
}

#[tokio::test]
async fn test_session_readable_while_wallet_answers_connect() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = manager_for(&wallet);
    wallet.gate_chain_reads();
    let seen = wallet.chain_reads();

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });
    wallet.wait_for_chain_read(seen).await;

    let session = tokio::time::timeout(Duration::from_secs(1), manager.session())
        .await
        .expect("session lock held while the wallet was queried");
    assert_eq!(session.status(), SessionStatus::Connecting);

    wallet.release_chain_reads();
    connecting.await.unwrap().unwrap();
    assert_eq!(manager.status(), SessionStatus::Connected);
}

#[tokio::test]
async fn test_disconnect_during_connect_wins() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = manager_for(&wallet);
    wallet.gate_chain_reads();
    let seen = wallet.chain_reads();

    let connecting = tokio::spawn({
        let manager = manager.clone();
        async move { manager.connect().await }
    });
    wallet.wait_for_chain_read(seen).await;

    tokio::time::timeout(Duration::from_secs(1), manager.disconnect())
        .await
        .expect("disconnect blocked behind connect");
    wallet.release_chain_reads();

    assert!(matches!(
        connecting.await.unwrap(),
        Err(DappError::ConnectionRefused(_))
    ));
    assert_eq!(manager.status(), SessionStatus::Disconnected);
    assert!(manager.session().await.signer().is_none());
}

#[tokio::test]
async fn test_drop_stops_listener_busy_with_event() {
    let wallet = FakeWallet::on_chain(REQUIRED_CHAIN);
    let manager = connected_manager(&wallet).await;

    // The listener re-reads the chain for this event and parks there holding the session lock.
    wallet.gate_chain_reads();
    let seen = wallet.chain_reads();
    assert!(wallet.emit(ProviderEvent::AccountsChanged(vec![wallet.account()])));
    wallet.wait_for_chain_read(seen).await;

    drop(manager);

    tokio::time::timeout(Duration::from_secs(2), async {
        while wallet.emit(ProviderEvent::ChainChanged(REQUIRED_CHAIN)) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("listener kept running after the manager was dropped");
}
