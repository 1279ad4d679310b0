use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, address};
use pretty_assertions::assert_eq;
use safe_delegates::test_utils::{
    CallKind, InMemoryFactory, InMemoryRegistry, RegistryCall, local_wallet, locked_wallet,
};
use safe_delegates::{
    ConnectionState, DelegateError, DelegateSyncEngine, SafeSelection, Session, WalletHandle,
};

const CHAIN: u64 = 11155111;
const SAFE_A: &str = "0x1111111111111111111111111111111111111111";
const SAFE_B: &str = "0x2222222222222222222222222222222222222222";
const DELEGATE_1: Address = address!("0xaAaAaAaaAaAaAaaAaAAAAAAAAaaaAaAaAaaAaaAa");
const DELEGATE_2: Address = address!("0xbBbBBBBbbBBBbbbBbbBbbbbBBbBbbbbBbBbbBBbB");

struct Fixture {
    registry: Arc<InMemoryRegistry>,
    engine: DelegateSyncEngine<InMemoryFactory>,
    wallet: WalletHandle,
}

impl Fixture {
    fn new(setting: Option<&str>) -> Self {
        Self::with_factory(setting, |factory| factory)
    }

    fn with_factory(
        setting: Option<&str>,
        configure: impl FnOnce(InMemoryFactory) -> InMemoryFactory,
    ) -> Self {
        let registry = InMemoryRegistry::new();
        registry.add_safe(CHAIN, SAFE_A);
        registry.add_safe(CHAIN, SAFE_B);

        let factory = configure(InMemoryFactory::new(Arc::clone(&registry)));
        let engine = DelegateSyncEngine::new(factory, SafeSelection::from_setting(setting));

        Self {
            registry,
            engine,
            wallet: local_wallet(CHAIN),
        }
    }

    fn account(&self) -> Address {
        self.wallet.account.unwrap()
    }

    fn session(&self) -> Session {
        Session::new(self.account().to_string(), CHAIN)
    }

    async fn connected(setting: Option<&str>) -> Self {
        let fixture = Self::new(setting);
        fixture.engine.sync_session(fixture.session()).await.unwrap();
        fixture.registry.clear_calls();
        fixture
    }
}

#[tokio::test]
async fn test_connect_checks_safe_then_lists_delegates() {
    let fixture = Fixture::new(Some(SAFE_A));
    fixture.registry.seed_delegate(CHAIN, SAFE_A, DELEGATE_1, "ops");

    fixture.engine.sync_session(fixture.session()).await.unwrap();

    assert_eq!(
        fixture.registry.calls(),
        vec![
            RegistryCall::SafeInfo {
                chain_id: CHAIN,
                safe: SAFE_A.to_string(),
            },
            RegistryCall::ListDelegates {
                chain_id: CHAIN,
                safe: SAFE_A.to_string(),
            },
        ]
    );
    let snapshot = fixture.engine.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.active_safe.as_deref(), Some(SAFE_A));
    assert_eq!(snapshot.delegate_addresses(), vec![DELEGATE_1]);
}

#[tokio::test]
async fn test_concurrent_connects_check_safe_once() {
    let fixture = Fixture::new(Some(SAFE_A));
    fixture.registry.set_latency(Duration::from_millis(20));
    fixture.engine.update_session(fixture.session());

    let (first, second) = tokio::join!(fixture.engine.connect(), fixture.engine.connect());
    first.unwrap();
    second.unwrap();

    assert_eq!(fixture.registry.count(CallKind::SafeInfo), 1);
    assert!(fixture.engine.is_connected());
}

#[tokio::test]
async fn test_connect_twice_is_a_no_op() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;
    fixture.engine.connect().await.unwrap();
    assert!(fixture.registry.calls().is_empty());
}

#[tokio::test]
async fn test_unknown_safe_stays_disconnected() {
    let unknown = "0x3333333333333333333333333333333333333333";
    let fixture = Fixture::new(Some(unknown));

    let result = fixture.engine.sync_session(fixture.session()).await;

    assert_eq!(result, Err(DelegateError::SafeNotFound(unknown.to_string())));
    assert_eq!(fixture.engine.connection_state(), ConnectionState::Disconnected);
    assert_eq!(fixture.registry.count(CallKind::ListDelegates), 0);
}

#[tokio::test]
async fn test_not_configured() {
    let fixture = Fixture::new(None);
    fixture.engine.update_session(fixture.session());

    assert_eq!(fixture.engine.connect().await, Err(DelegateError::NotConfigured));
    assert_eq!(
        fixture
            .engine
            .add_delegate(&DELEGATE_1.to_string(), "ops", &fixture.wallet)
            .await,
        Err(DelegateError::NotConfigured)
    );
    assert!(!fixture.engine.is_connected());
    assert!(fixture.registry.calls().is_empty());
}

#[tokio::test]
async fn test_connect_without_session() {
    let fixture = Fixture::new(Some(SAFE_A));
    assert_eq!(fixture.engine.connect().await, Err(DelegateError::Disconnected));
    assert!(fixture.registry.calls().is_empty());
}

#[tokio::test]
async fn test_unsupported_chain_fails_on_first_request() {
    let fixture = Fixture::with_factory(Some(SAFE_A), |factory| factory.without_chain(CHAIN));

    let result = fixture.engine.sync_session(fixture.session()).await;

    assert_eq!(result, Err(DelegateError::UnsupportedChain(CHAIN)));
    assert_eq!(fixture.engine.connection_state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn test_defaults_to_first_safe_then_switches() {
    let setting = format!("{SAFE_A},{SAFE_B}");
    let fixture = Fixture::new(Some(&setting));
    fixture.registry.seed_delegate(CHAIN, SAFE_B, DELEGATE_2, "b");

    fixture.engine.sync_session(fixture.session()).await.unwrap();
    assert_eq!(fixture.engine.active_safe().as_deref(), Some(SAFE_A));
    assert!(fixture.engine.delegates().is_empty());

    fixture.registry.clear_calls();
    fixture.engine.select_safe(SAFE_B).await.unwrap();

    assert_eq!(
        fixture.registry.calls(),
        vec![RegistryCall::ListDelegates {
            chain_id: CHAIN,
            safe: SAFE_B.to_string(),
        }]
    );
    let snapshot = fixture.engine.snapshot();
    assert_eq!(snapshot.active_safe.as_deref(), Some(SAFE_B));
    assert_eq!(snapshot.selectable_safes, vec![SAFE_A.to_string(), SAFE_B.to_string()]);
    assert_eq!(snapshot.delegate_addresses(), vec![DELEGATE_2]);
}

#[tokio::test]
async fn test_select_unlisted_safe_is_accepted() {
    let unlisted = "0x4444444444444444444444444444444444444444";
    let fixture = Fixture::connected(Some(SAFE_A)).await;

    fixture.engine.select_safe(unlisted).await.unwrap();

    assert_eq!(fixture.engine.active_safe().as_deref(), Some(unlisted));
    assert_eq!(fixture.engine.selectable_safes(), vec![SAFE_A.to_string()]);
    assert!(fixture.engine.delegates().is_empty());
}

#[tokio::test]
async fn test_select_while_disconnected_makes_no_request() {
    let fixture = Fixture::new(Some(SAFE_A));
    fixture.engine.select_safe(SAFE_B).await.unwrap();
    assert!(fixture.registry.calls().is_empty());
    assert_eq!(fixture.engine.active_safe().as_deref(), Some(SAFE_B));
}

#[tokio::test]
async fn test_select_during_connect_discards_stale_safe_info() {
    let fixture = Fixture::new(Some(SAFE_A));
    fixture.registry.seed_delegate(CHAIN, SAFE_B, DELEGATE_2, "b");
    fixture.registry.set_latency(Duration::from_millis(50));
    fixture.engine.update_session(fixture.session());

    let (connect, select) = tokio::join!(fixture.engine.connect(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fixture.engine.select_safe(SAFE_B).await
    });
    connect.unwrap();
    select.unwrap();

    let snapshot = fixture.engine.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Connected);
    assert_eq!(snapshot.active_safe.as_deref(), Some(SAFE_B));
    assert_eq!(snapshot.delegate_addresses(), vec![DELEGATE_2]);
    assert_eq!(
        fixture.registry.call_kinds(),
        vec![CallKind::SafeInfo, CallKind::SafeInfo, CallKind::ListDelegates]
    );
}

#[tokio::test]
async fn test_add_then_remove_round_trip() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;

    fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "  ops  ", &fixture.wallet)
        .await
        .unwrap();

    assert_eq!(fixture.engine.snapshot().delegate_addresses(), vec![DELEGATE_1]);
    assert_eq!(
        fixture.registry.calls()[0],
        RegistryCall::AddDelegate {
            chain_id: CHAIN,
            safe: SAFE_A.to_string(),
            delegate: DELEGATE_1,
            delegator: fixture.account(),
            label: "ops".to_string(),
        }
    );

    fixture
        .engine
        .remove_delegate(&DELEGATE_1.to_string(), &fixture.wallet)
        .await
        .unwrap();

    assert!(fixture.engine.delegates().is_empty());
    assert!(fixture.registry.delegates(CHAIN, SAFE_A).is_empty());
    assert_eq!(
        fixture.registry.call_kinds(),
        vec![
            CallKind::AddDelegate,
            CallKind::ListDelegates,
            CallKind::RemoveDelegate,
            CallKind::ListDelegates,
        ]
    );
}

#[tokio::test]
async fn test_add_accepts_unprefixed_address() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;
    let unprefixed = DELEGATE_1.to_string().trim_start_matches("0x").to_string();

    fixture
        .engine
        .add_delegate(&unprefixed, "ops", &fixture.wallet)
        .await
        .unwrap();

    assert_eq!(fixture.engine.snapshot().delegate_addresses(), vec![DELEGATE_1]);
}

#[tokio::test]
async fn test_delegator_from_unprefixed_session_account() {
    let fixture = Fixture::new(Some(SAFE_A));
    let account = fixture.account();
    let unprefixed = account.to_string().trim_start_matches("0x").to_string();
    fixture
        .engine
        .sync_session(Session::new(unprefixed, CHAIN))
        .await
        .unwrap();
    fixture.registry.clear_calls();

    fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "ops", &fixture.wallet)
        .await
        .unwrap();

    assert_eq!(
        fixture.registry.calls()[0],
        RegistryCall::AddDelegate {
            chain_id: CHAIN,
            safe: SAFE_A.to_string(),
            delegate: DELEGATE_1,
            delegator: account,
            label: "ops".to_string(),
        }
    );
    assert_eq!(fixture.engine.snapshot().delegate_addresses(), vec![DELEGATE_1]);
}

#[tokio::test]
async fn test_mutation_signed_for_session_chain_when_wallet_lags() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;
    let lagging = local_wallet(1);
    let account = lagging.account.unwrap();
    fixture
        .engine
        .update_session(Session::new(account.to_string(), CHAIN));

    fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "ops", &lagging)
        .await
        .unwrap();

    assert_eq!(fixture.registry.delegates(CHAIN, SAFE_A), vec![DELEGATE_1]);
    assert_eq!(fixture.engine.snapshot().delegate_addresses(), vec![DELEGATE_1]);
}

#[tokio::test]
async fn test_concurrent_mutations_are_serialized() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;
    fixture.registry.set_latency(Duration::from_millis(10));

    let first = DELEGATE_1.to_string();
    let second = DELEGATE_2.to_string();
    let (a, b) = tokio::join!(
        fixture.engine.add_delegate(&first, "one", &fixture.wallet),
        fixture.engine.add_delegate(&second, "two", &fixture.wallet),
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(
        fixture.registry.call_kinds(),
        vec![
            CallKind::AddDelegate,
            CallKind::ListDelegates,
            CallKind::AddDelegate,
            CallKind::ListDelegates,
        ]
    );
    let mut delegates = fixture.engine.snapshot().delegate_addresses();
    delegates.sort();
    assert_eq!(delegates, vec![DELEGATE_1, DELEGATE_2]);
}

#[tokio::test]
async fn test_rejected_signature_leaves_view_unchanged() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;
    fixture.registry.seed_delegate(CHAIN, SAFE_A, DELEGATE_2, "existing");
    fixture.engine.refresh_delegates().await.unwrap();
    fixture.registry.clear_calls();

    // wallet key does not belong to the session account
    let other_wallet = local_wallet(CHAIN);
    let result = fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "ops", &other_wallet)
        .await;

    assert!(matches!(result, Err(DelegateError::Unauthorized(_))));
    assert_eq!(fixture.engine.snapshot().delegate_addresses(), vec![DELEGATE_2]);
    assert_eq!(fixture.registry.call_kinds(), vec![CallKind::AddDelegate]);
}

#[tokio::test]
async fn test_service_failure_is_surfaced() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;
    fixture.registry.fail_next(
        CallKind::AddDelegate,
        DelegateError::NetworkError("connection reset".to_string()),
    );

    let result = fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "ops", &fixture.wallet)
        .await;

    let err = result.unwrap_err();
    assert!(err.is_transient());
    assert!(fixture.engine.delegates().is_empty());
    assert_eq!(fixture.registry.count(CallKind::ListDelegates), 0);
}

#[tokio::test]
async fn test_failed_refresh_after_add_still_succeeds() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;
    fixture.registry.fail_next(
        CallKind::ListDelegates,
        DelegateError::NetworkError("timeout".to_string()),
    );

    fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "ops", &fixture.wallet)
        .await
        .unwrap();

    assert!(fixture.engine.delegates().is_empty());
    assert_eq!(fixture.registry.delegates(CHAIN, SAFE_A), vec![DELEGATE_1]);
}

#[tokio::test]
async fn test_remove_unknown_delegate() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;

    let result = fixture
        .engine
        .remove_delegate(&DELEGATE_1.to_string(), &fixture.wallet)
        .await;

    assert!(matches!(result, Err(DelegateError::NotFound(_))));
    assert_eq!(fixture.registry.call_kinds(), vec![CallKind::RemoveDelegate]);
}

#[tokio::test]
async fn test_locked_wallet_has_no_signer() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;

    let result = fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "ops", &locked_wallet(CHAIN))
        .await;

    assert_eq!(result, Err(DelegateError::SignerUnavailable));
    assert!(fixture.registry.calls().is_empty());
}

#[tokio::test]
async fn test_mutations_require_session() {
    let fixture = Fixture::new(Some(SAFE_A));

    let add = fixture
        .engine
        .add_delegate(&DELEGATE_1.to_string(), "ops", &fixture.wallet)
        .await;
    let remove = fixture
        .engine
        .remove_delegate(&DELEGATE_1.to_string(), &fixture.wallet)
        .await;

    assert_eq!(add, Err(DelegateError::Disconnected));
    assert_eq!(remove, Err(DelegateError::Disconnected));
    assert!(fixture.registry.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_input_rejected_before_any_request() {
    let fixture = Fixture::connected(Some(SAFE_A)).await;

    for (delegate, label) in [
        ("", "ops"),
        ("0x1234", "ops"),
        ("not an address", "ops"),
        (DELEGATE_1.to_string().as_str(), "   "),
    ] {
        let result = fixture
            .engine
            .add_delegate(delegate, label, &fixture.wallet)
            .await;
        assert!(
            matches!(result, Err(DelegateError::ValidationError(_))),
            "{delegate:?} / {label:?}: {result:?}"
        );
    }

    assert!(matches!(
        fixture.engine.remove_delegate("0xzz", &fixture.wallet).await,
        Err(DelegateError::ValidationError(_))
    ));
    assert!(fixture.registry.calls().is_empty());
}

#[tokio::test]
async fn test_disconnect_resets_view() {
    let fixture = Fixture::new(Some(SAFE_A));
    fixture.registry.seed_delegate(CHAIN, SAFE_A, DELEGATE_1, "ops");
    fixture.engine.sync_session(fixture.session()).await.unwrap();
    assert!(fixture.engine.is_connected());

    fixture.engine.update_session(Session::disconnected());

    let snapshot = fixture.engine.snapshot();
    assert_eq!(snapshot.state, ConnectionState::Disconnected);
    assert!(snapshot.delegates.is_empty());
    assert_eq!(snapshot.active_safe.as_deref(), Some(SAFE_A));
}

#[tokio::test]
async fn test_chain_change_reconnects_on_new_chain() {
    const OTHER_CHAIN: u64 = 100;
    let fixture = Fixture::new(Some(SAFE_A));
    fixture.registry.seed_delegate(CHAIN, SAFE_A, DELEGATE_1, "ops");
    fixture.registry.add_safe(OTHER_CHAIN, SAFE_A);
    fixture.engine.sync_session(fixture.session()).await.unwrap();
    fixture.registry.clear_calls();

    fixture
        .engine
        .sync_session(Session::new(fixture.account().to_string(), OTHER_CHAIN))
        .await
        .unwrap();

    assert!(fixture.engine.is_connected());
    assert!(fixture.engine.delegates().is_empty());
    assert_eq!(
        fixture.registry.calls(),
        vec![
            RegistryCall::SafeInfo {
                chain_id: OTHER_CHAIN,
                safe: SAFE_A.to_string(),
            },
            RegistryCall::ListDelegates {
                chain_id: OTHER_CHAIN,
                safe: SAFE_A.to_string(),
            },
        ]
    );
}

#[tokio::test]
async fn test_subscriber_observes_updates() {
    let fixture = Fixture::new(Some(SAFE_A));
    fixture.registry.seed_delegate(CHAIN, SAFE_A, DELEGATE_1, "ops");
    let mut snapshots = fixture.engine.subscribe();
    assert_eq!(snapshots.borrow_and_update().state, ConnectionState::Disconnected);

    fixture.engine.sync_session(fixture.session()).await.unwrap();

    assert!(snapshots.has_changed().unwrap());
    let latest = snapshots.borrow_and_update().clone();
    assert!(latest.is_connected());
    assert_eq!(latest.delegate_addresses(), vec![DELEGATE_1]);
}
