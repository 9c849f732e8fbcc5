//! End-to-end session tests against the fake backends

use std::collections::HashMap;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use stowage::{
    AccountId, Amount, Artifact, Balance, DepositNotification, DepositOutcome, DepositState, Error,
    Fingerprint, Ledger, ProgressStage, Session, SessionBuilder, SessionConfig, SessionEvent,
    SessionSubscription, SessionTopic, Stream, TopUpPolicy, UploadFailure, UploadJob,
    UploadState,
};
use stowage_fake::{FakeLedger, FakeLedgerConfig, FakeStorage, FakeStorageConfig};
use uuid::Uuid;

const WAIT: Duration = Duration::from_secs(5);

fn account() -> AccountId {
    AccountId::from_str("0x52908400098527886E0F7030069857D2E4169EE7").expect("valid account")
}

fn manual_ledger() -> FakeLedgerConfig {
    FakeLedgerConfig {
        auto_confirm: false,
        ..Default::default()
    }
}

struct Harness {
    ledger: Arc<FakeLedger>,
    storage: Arc<FakeStorage>,
    session: Session,
}

async fn harness(
    ledger: FakeLedgerConfig,
    storage: FakeStorageConfig,
    config: SessionConfig,
) -> Result<Harness> {
    let ledger = Arc::new(FakeLedger::new(ledger));
    let storage = Arc::new(FakeStorage::new(storage));

    let session = SessionBuilder::new()
        .account(account())
        .ledger(ledger.clone())
        .storage(storage.clone())
        .config(config)
        .build()
        .await?;

    Ok(Harness {
        ledger,
        storage,
        session,
    })
}

async fn default_harness() -> Result<Harness> {
    harness(
        FakeLedgerConfig::default(),
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await
}

fn artifact(name: &str) -> Artifact {
    Artifact::from_bytes(name, format!("content of {name}").into_bytes())
}

fn drain(subscription: &mut SessionSubscription) -> Vec<SessionEvent> {
    let mut events = Vec::new();
    while let Some(event) = subscription.try_recv() {
        events.push(event);
    }
    events
}

fn uploads_by_job(events: &[SessionEvent]) -> HashMap<Uuid, Vec<UploadJob>> {
    let mut by_job: HashMap<Uuid, Vec<UploadJob>> = HashMap::new();
    for event in events {
        if let SessionEvent::Upload(job) = event {
            by_job.entry(job.id).or_default().push(job.clone());
        }
    }
    by_job
}

async fn wait_for_state(
    subscription: &mut SessionSubscription,
    job_id: Uuid,
    state: UploadState,
) -> UploadJob {
    tokio::time::timeout(WAIT, async {
        loop {
            match subscription.recv().await {
                Some(SessionEvent::Upload(job)) if job.id == job_id && job.state == state => {
                    return job
                }
                Some(_) => continue,
                None => panic!("stream closed before {state}"),
            }
        }
    })
    .await
    .expect("state reached in time")
}

fn assert_job_history(history: &[UploadJob]) {
    for pair in history.windows(2) {
        assert!(pair[0].progress_stage <= pair[1].progress_stage);
    }

    let terminal: Vec<_> = history.iter().filter(|job| job.state.is_terminal()).collect();
    assert_eq!(terminal.len(), 1, "exactly one terminal snapshot");
    assert!(history.last().expect("history").state.is_terminal());

    let last = history.last().expect("history");
    match last.state {
        UploadState::Done => {
            assert!(last.settlement_ref.is_some());
            assert!(last.failure.is_none());
        }
        UploadState::Failed => {
            assert!(last.settlement_ref.is_none());
            assert!(last.failure.is_some());
        }
        _ => unreachable!(),
    }
}

#[tokio::test]
async fn deposit_then_upload_walks_every_stage() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = default_harness().await?;
    let mut events = session.events()?;

    let deposit = session.deposit(100.into()).await?;
    assert_eq!(deposit.state, DepositState::Pending);
    assert!(deposit.external_ref.is_some());

    let confirmed = session.wait_for_deposit(deposit.id, WAIT).await?;
    assert_eq!(confirmed.state, DepositState::Confirmed);
    assert_eq!(session.balance().await?.available, Amount::from(100));

    let data = b"hello stowage".to_vec();
    let job = session.submit(Artifact::from_bytes("hello.txt", data.clone()), 60.into())?;
    assert_eq!(job.state, UploadState::Queued);
    assert_eq!(job.progress_stage, ProgressStage::NONE);

    let done = session.wait_for_upload(job.id, WAIT).await?;
    assert_eq!(done.state, UploadState::Done);
    assert_eq!(done.progress_stage, ProgressStage::SETTLED);
    assert_eq!(done.artifact_ref, Some(Fingerprint::from_bytes(&data)?));
    assert!(done.provider_ref.is_some());
    assert!(done.settlement_ref.is_some());

    let history = uploads_by_job(&drain(&mut events))
        .remove(&job.id)
        .expect("job events");
    let states: Vec<_> = history.iter().map(|job| job.state).collect();
    let stages: Vec<_> = history.iter().map(|job| job.progress_stage.as_u8()).collect();
    assert_eq!(
        states,
        vec![
            UploadState::Queued,
            UploadState::Submitting,
            UploadState::Placing,
            UploadState::Placed,
            UploadState::Settling,
            UploadState::Done,
        ]
    );
    assert_eq!(stages, vec![0, 0, 1, 2, 2, 3]);
    assert_job_history(&history);

    assert_eq!(session.balance().await?.available, Amount::from(40));
    assert_eq!(session.effective_balance().await?, Amount::from(40));
    assert_eq!(ledger.settlements().await.len(), 1);

    Ok(())
}

#[tokio::test]
async fn upload_without_funds_is_rejected() -> Result<()> {
    let Harness {
        ledger,
        storage,
        session,
    } = default_harness().await?;
    ledger.credit(&account(), 10.into()).await;

    let job = session.submit(artifact("big.bin"), 60.into())?;
    let failed = session.wait_for_upload(job.id, WAIT).await?;

    assert_eq!(failed.state, UploadState::Failed);
    assert_eq!(failed.progress_stage, ProgressStage::COMMITTED);
    assert!(matches!(
        failed.failure,
        Some(UploadFailure::PlacementRejected(ref reason)) if reason.contains("insufficient funds")
    ));
    assert!(failed.settlement_ref.is_none());
    assert!(storage.placements().await.is_empty());
    assert_eq!(session.effective_balance().await?, Amount::from(10));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_uploads_never_share_funds() -> Result<()> {
    let Harness {
        ledger,
        storage,
        session,
    } = default_harness().await?;
    ledger.credit(&account(), 100.into()).await;
    let mut events = session.events()?;

    let jobs = (0..4)
        .map(|i| session.submit(artifact(&format!("file-{i}")), 60.into()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut done = 0;
    for job in &jobs {
        let job = session.wait_for_upload(job.id, WAIT).await?;
        match job.state {
            UploadState::Done => done += 1,
            UploadState::Failed => assert!(matches!(
                job.failure,
                Some(UploadFailure::PlacementRejected(_))
            )),
            other => panic!("unexpected state {other}"),
        }
    }

    assert_eq!(done, 1);
    assert_eq!(storage.placements().await.len(), 1);
    assert_eq!(session.refresh_balance().await?.available, Amount::from(40));

    for history in uploads_by_job(&drain(&mut events)).values() {
        assert_job_history(history);
    }

    Ok(())
}

#[tokio::test]
async fn upload_waits_for_pending_deposit() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        manual_ledger(),
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await?;
    let mut events = session.events()?;

    let deposit = session.deposit(100.into()).await?;
    let job = session.submit(artifact("deferred.bin"), 60.into())?;

    wait_for_state(&mut events, job.id, UploadState::Placing).await;
    tokio::task::yield_now().await;
    assert_eq!(session.job(job.id)?.state, UploadState::Placing);
    assert!(session.has_pending_deposits());

    let external_ref = deposit.external_ref.expect("submitted deposit");
    ledger.confirm(&external_ref).await?;

    let done = session.wait_for_upload(job.id, WAIT).await?;
    assert_eq!(done.state, UploadState::Done);
    assert_eq!(
        session.deposit_by_id(deposit.id)?.state,
        DepositState::Confirmed
    );
    assert_eq!(session.refresh_balance().await?.available, Amount::from(40));

    Ok(())
}

/// Ledger whose balance queries take a while, keeping a job inside its reservation
struct SlowQueryLedger {
    ledger: Arc<FakeLedger>,
    delay: Duration,
}

#[async_trait]
impl Ledger for SlowQueryLedger {
    async fn query_balance(&self, account: &AccountId) -> Result<Balance, Error> {
        tokio::time::sleep(self.delay).await;
        self.ledger.query_balance(account).await
    }

    async fn submit_deposit(&self, account: &AccountId, amount: Amount) -> Result<String, Error> {
        self.ledger.submit_deposit(account, amount).await
    }

    async fn wait_deposit_event(
        &self,
    ) -> Result<Pin<Box<dyn Stream<Item = DepositNotification> + Send>>, Error> {
        self.ledger.wait_deposit_event().await
    }

    async fn settle(
        &self,
        account: &AccountId,
        placement_ref: &str,
        amount: Amount,
    ) -> Result<String, Error> {
        self.ledger.settle(account, placement_ref, amount).await
    }
}

#[tokio::test(start_paused = true)]
async fn deposit_during_reservation_defers_upload() -> Result<()> {
    let ledger = Arc::new(FakeLedger::new(manual_ledger()));
    let session = SessionBuilder::new()
        .account(account())
        .ledger(Arc::new(SlowQueryLedger {
            ledger: ledger.clone(),
            delay: Duration::from_millis(100),
        }))
        .storage(Arc::new(FakeStorage::new(FakeStorageConfig::default())))
        .build()
        .await?;
    let mut events = session.events()?;

    let job = session.submit(artifact("raced.bin"), 60.into())?;
    wait_for_state(&mut events, job.id, UploadState::Placing).await;

    // the job is now waiting on the slow balance query
    tokio::time::sleep(Duration::from_millis(10)).await;
    let depositing = tokio::spawn({
        let session = session.clone();
        async move { session.deposit(100.into()).await }
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.job(job.id)?.state, UploadState::Placing);
    assert!(session.has_pending_deposits());

    let deposit = depositing.await??;
    ledger
        .confirm(&deposit.external_ref.expect("submitted deposit"))
        .await?;

    let done = session.wait_for_upload(job.id, WAIT).await?;
    assert_eq!(done.state, UploadState::Done);
    assert_eq!(session.refresh_balance().await?.available, Amount::from(40));

    Ok(())
}

#[tokio::test]
async fn refused_deposit_is_not_left_pending() -> Result<()> {
    let Harness { session, .. } = harness(
        FakeLedgerConfig {
            auto_confirm: false,
            source_funds: Some(50.into()),
            ..Default::default()
        },
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await?;

    assert!(matches!(
        session.deposit(100.into()).await,
        Err(Error::RejectedByLedger(_))
    ));
    assert!(!session.has_pending_deposits());
    assert!(session.deposits().is_empty());

    let job = session.submit(artifact("unfunded.bin"), 60.into())?;
    let failed = session.wait_for_upload(job.id, WAIT).await?;
    assert!(matches!(
        failed.failure,
        Some(UploadFailure::PlacementRejected(_))
    ));

    Ok(())
}

#[tokio::test]
async fn failed_deposit_fails_deferred_upload() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        manual_ledger(),
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await?;
    let mut events = session.events()?;

    let deposit = session.deposit(100.into()).await?;
    let job = session.submit(artifact("deferred.bin"), 60.into())?;
    wait_for_state(&mut events, job.id, UploadState::Placing).await;

    let external_ref = deposit.external_ref.clone().expect("submitted deposit");
    ledger.fail(&external_ref, "reverted").await?;

    assert!(matches!(
        session.wait_for_deposit(deposit.id, WAIT).await,
        Err(Error::DepositFailed { reason }) if reason == "reverted"
    ));

    let failed = session.wait_for_upload(job.id, WAIT).await?;
    assert!(matches!(
        failed.failure,
        Some(UploadFailure::PlacementRejected(_))
    ));
    assert_eq!(session.balance().await?.available, Amount::ZERO);

    Ok(())
}

#[tokio::test]
async fn shortfall_is_topped_up() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        FakeLedgerConfig::default(),
        FakeStorageConfig::default(),
        SessionConfig {
            top_up: TopUpPolicy::Shortfall,
            ..Default::default()
        },
    )
    .await?;
    ledger.credit(&account(), 10.into()).await;

    let job = session.submit(artifact("topped.bin"), 60.into())?;
    let done = session.wait_for_upload(job.id, WAIT).await?;
    assert_eq!(done.state, UploadState::Done);

    let deposits = session.deposits();
    assert_eq!(deposits.len(), 1);
    assert_eq!(deposits[0].amount, Amount::from(50));
    assert_eq!(deposits[0].state, DepositState::Confirmed);
    assert_eq!(session.refresh_balance().await?.available, Amount::ZERO);

    Ok(())
}

#[tokio::test]
async fn refused_top_up_rejects_placement() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        FakeLedgerConfig {
            source_funds: Some(5.into()),
            ..Default::default()
        },
        FakeStorageConfig::default(),
        SessionConfig {
            top_up: TopUpPolicy::Shortfall,
            ..Default::default()
        },
    )
    .await?;
    ledger.credit(&account(), 10.into()).await;

    let job = session.submit(artifact("topped.bin"), 60.into())?;
    let failed = session.wait_for_upload(job.id, WAIT).await?;

    assert!(matches!(
        failed.failure,
        Some(UploadFailure::PlacementRejected(ref reason)) if reason.contains("top-up")
    ));
    assert!(session.deposits().is_empty());

    Ok(())
}

#[tokio::test]
async fn duplicate_notifications_are_ignored() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        manual_ledger(),
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await?;
    let mut deposit_events = session.subscribe(vec![SessionTopic::Deposits])?;

    let first = session.deposit(100.into()).await?;
    let first_ref = first.external_ref.clone().expect("submitted deposit");
    ledger.confirm(&first_ref).await?;
    session.wait_for_deposit(first.id, WAIT).await?;

    ledger.notify(DepositNotification {
        external_ref: first_ref.clone(),
        outcome: DepositOutcome::Confirmed,
    });
    ledger.notify(DepositNotification {
        external_ref: first_ref,
        outcome: DepositOutcome::Failed("late failure".to_string()),
    });

    // resolved after the duplicates by the same listener
    let second = session.deposit(20.into()).await?;
    ledger
        .confirm(second.external_ref.as_deref().expect("submitted deposit"))
        .await?;
    session.wait_for_deposit(second.id, WAIT).await?;

    assert_eq!(
        session.deposit_by_id(first.id)?.state,
        DepositState::Confirmed
    );
    assert_eq!(session.balance().await?.available, Amount::from(120));

    let first_events = drain(&mut deposit_events)
        .into_iter()
        .filter(|event| matches!(event, SessionEvent::Deposit(deposit) if deposit.id == first.id))
        .count();
    assert_eq!(first_events, 2);

    Ok(())
}

#[tokio::test]
async fn deposit_preconditions() -> Result<()> {
    let Harness { session, .. } = harness(
        FakeLedgerConfig {
            source_funds: Some(50.into()),
            ..Default::default()
        },
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await?;

    assert!(matches!(
        session.deposit(Amount::ZERO).await,
        Err(Error::InvalidAmount(_))
    ));
    assert!(matches!(
        session.deposit(80.into()).await,
        Err(Error::RejectedByLedger(_))
    ));
    assert!(session.deposits().is_empty());
    assert!(matches!(
        session.deposit_by_id(Uuid::new_v4()),
        Err(Error::UnknownDeposit)
    ));

    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn instant_confirmation_is_not_lost() -> Result<()> {
    let Harness { session, .. } = default_harness().await?;

    for _ in 0..20 {
        let deposit = session.deposit(1.into()).await?;
        let confirmed = session.wait_for_deposit(deposit.id, WAIT).await?;
        assert_eq!(confirmed.state, DepositState::Confirmed);
    }

    assert_eq!(session.refresh_balance().await?.available, Amount::from(20));

    Ok(())
}

#[tokio::test]
async fn upload_preconditions_create_no_job() -> Result<()> {
    let Harness { session, .. } = default_harness().await?;

    assert!(matches!(
        session.submit(Artifact::from_bytes("empty", Vec::new()), 5.into()),
        Err(Error::FingerprintError(_))
    ));
    assert!(matches!(
        session.submit(artifact("free.bin"), Amount::ZERO),
        Err(Error::InvalidAmount(_))
    ));
    assert!(session.uploads().is_empty());
    assert!(matches!(session.job(Uuid::new_v4()), Err(Error::UnknownJob)));

    Ok(())
}

#[tokio::test]
async fn unreadable_file_fails_commit() -> Result<()> {
    let Harness { session, .. } = default_harness().await?;

    let job = session.submit(
        Artifact::from_path("/nonexistent/stowage/artifact.bin"),
        5.into(),
    )?;
    assert_eq!(job.name, "artifact.bin");

    let failed = session.wait_for_upload(job.id, WAIT).await?;
    assert!(matches!(failed.failure, Some(UploadFailure::Fingerprint(_))));
    assert_eq!(failed.progress_stage, ProgressStage::NONE);
    assert!(failed.artifact_ref.is_none());

    Ok(())
}

#[tokio::test]
async fn file_artifact_is_uploaded() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = default_harness().await?;
    ledger.credit(&account(), 100.into()).await;

    let path = std::env::temp_dir().join(format!("stowage-{}.bin", Uuid::new_v4()));
    let content = vec![7u8; 3000];
    tokio::fs::write(&path, &content).await?;

    let job = session.submit_estimated(Artifact::from_path(&path)).await?;
    // base fee 1 plus 3 started KiB
    assert_eq!(job.cost, Amount::from(4));

    let done = session.wait_for_upload(job.id, WAIT).await?;
    tokio::fs::remove_file(&path).await?;

    assert_eq!(done.state, UploadState::Done);
    assert_eq!(done.artifact_ref, Some(Fingerprint::from_bytes(&content)?));
    assert_eq!(session.refresh_balance().await?.available, Amount::from(96));

    Ok(())
}

#[tokio::test]
async fn queued_job_can_be_cancelled() -> Result<()> {
    let Harness {
        ledger,
        storage,
        session,
    } = default_harness().await?;
    ledger.credit(&account(), 100.into()).await;

    let job = session.submit(artifact("cancel.bin"), 60.into())?;
    let cancelled = session.cancel(job.id)?;
    assert_eq!(cancelled.state, UploadState::Failed);
    assert_eq!(cancelled.failure, Some(UploadFailure::Cancelled));

    let final_job = session.wait_for_upload(job.id, WAIT).await?;
    assert_eq!(final_job.failure, Some(UploadFailure::Cancelled));
    assert_eq!(final_job.progress_stage, ProgressStage::NONE);

    // let the driver notice the cancellation
    tokio::task::yield_now().await;
    assert!(storage.placements().await.is_empty());
    assert_eq!(session.job(job.id)?, final_job);
    assert!(matches!(
        session.cancel(job.id),
        Err(Error::InvalidCancellation(UploadState::Failed))
    ));
    assert!(matches!(session.cancel(Uuid::new_v4()), Err(Error::UnknownJob)));

    Ok(())
}

#[tokio::test]
async fn placing_job_cannot_be_cancelled() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        manual_ledger(),
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await?;
    let mut events = session.events()?;

    let deposit = session.deposit(100.into()).await?;
    let job = session.submit(artifact("busy.bin"), 60.into())?;
    wait_for_state(&mut events, job.id, UploadState::Placing).await;

    assert!(matches!(
        session.cancel(job.id),
        Err(Error::InvalidCancellation(UploadState::Placing))
    ));

    ledger
        .confirm(deposit.external_ref.as_deref().expect("submitted deposit"))
        .await?;
    let done = session.wait_for_upload(job.id, WAIT).await?;
    assert_eq!(done.state, UploadState::Done);

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_placement_times_out() -> Result<()> {
    let Harness {
        ledger,
        storage,
        session,
    } = harness(
        FakeLedgerConfig::default(),
        FakeStorageConfig::default(),
        SessionConfig {
            placement_timeout_secs: 1,
            ..Default::default()
        },
    )
    .await?;
    ledger.credit(&account(), 100.into()).await;
    storage
        .set_placement_delay(Some(Duration::from_secs(10)))
        .await;

    let job = session.submit(artifact("slow.bin"), 60.into())?;
    let failed = session
        .wait_for_upload(job.id, Duration::from_secs(60))
        .await?;

    assert_eq!(failed.failure, Some(UploadFailure::PlacementTimeout));
    assert_eq!(failed.progress_stage, ProgressStage::COMMITTED);
    assert!(failed.provider_ref.is_none());
    assert_eq!(session.effective_balance().await?, Amount::from(100));

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn slow_settlement_times_out() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        FakeLedgerConfig {
            settlement_delay_ms: 10_000,
            ..Default::default()
        },
        FakeStorageConfig::default(),
        SessionConfig {
            settlement_timeout_secs: 1,
            ..Default::default()
        },
    )
    .await?;
    ledger.credit(&account(), 100.into()).await;

    let job = session.submit(artifact("slow.bin"), 60.into())?;
    let failed = session
        .wait_for_upload(job.id, Duration::from_secs(60))
        .await?;

    assert_eq!(failed.failure, Some(UploadFailure::SettlementTimeout));
    assert_eq!(failed.progress_stage, ProgressStage::PLACED);
    assert!(failed.provider_ref.is_some());
    assert!(failed.settlement_ref.is_none());
    assert_eq!(
        session.balance_cache().reserved(&account()).await?,
        Amount::ZERO
    );

    Ok(())
}

#[tokio::test]
async fn rejected_settlement_fails_job() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = default_harness().await?;
    ledger.credit(&account(), 100.into()).await;
    ledger
        .reject_settlements(Some("nonce too low".to_string()))
        .await;

    let job = session.submit(artifact("rejected.bin"), 60.into())?;
    let failed = session.wait_for_upload(job.id, WAIT).await?;

    assert!(matches!(
        failed.failure,
        Some(UploadFailure::SettlementRejected(ref reason)) if reason.contains("nonce too low")
    ));
    assert_eq!(session.refresh_balance().await?.available, Amount::from(100));

    Ok(())
}

#[tokio::test]
async fn no_provider_releases_reservation() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = harness(
        FakeLedgerConfig::default(),
        FakeStorageConfig {
            providers: Vec::new(),
            ..Default::default()
        },
        SessionConfig::default(),
    )
    .await?;
    ledger.credit(&account(), 100.into()).await;

    let job = session.submit(artifact("orphan.bin"), 60.into())?;
    let failed = session.wait_for_upload(job.id, WAIT).await?;

    assert_eq!(failed.failure, Some(UploadFailure::NoProviderAvailable));
    assert_eq!(session.effective_balance().await?, Amount::from(100));

    Ok(())
}

#[tokio::test]
async fn unreachable_ledger_is_reported() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = default_harness().await?;
    ledger.set_unreachable(true);

    assert!(matches!(
        session.balance().await,
        Err(Error::UnreachableService(_))
    ));
    assert!(matches!(
        session.deposit(10.into()).await,
        Err(Error::UnreachableService(_))
    ));

    let job = session.submit(artifact("offline.bin"), 60.into())?;
    let failed = session.wait_for_upload(job.id, WAIT).await?;
    assert!(matches!(
        failed.failure,
        Some(UploadFailure::UnreachableService(_))
    ));

    Ok(())
}

#[tokio::test]
async fn subscribers_see_the_same_order() -> Result<()> {
    let Harness {
        ledger, session, ..
    } = default_harness().await?;
    ledger.credit(&account(), 50.into()).await;

    let mut first = session.events()?;
    let mut second = session.events()?;
    let mut uploads_only = session.subscribe(vec![SessionTopic::Uploads])?;

    let deposit = session.deposit(100.into()).await?;
    let jobs = (0..3)
        .map(|i| session.submit(artifact(&format!("order-{i}")), 40.into()))
        .collect::<Result<Vec<_>, _>>()?;

    session.wait_for_deposit(deposit.id, WAIT).await?;
    for job in &jobs {
        session.wait_for_upload(job.id, WAIT).await?;
    }

    let first = drain(&mut first);
    let second = drain(&mut second);
    assert!(!first.is_empty());
    assert_eq!(first, second);

    let uploads: Vec<_> = first
        .iter()
        .filter(|event| matches!(event, SessionEvent::Upload(_)))
        .cloned()
        .collect();
    assert_eq!(drain(&mut uploads_only), uploads);

    for history in uploads_by_job(&first).values() {
        assert_job_history(history);
    }

    Ok(())
}

#[tokio::test(start_paused = true)]
async fn waiting_gives_up_after_timeout() -> Result<()> {
    let Harness { session, .. } = harness(
        manual_ledger(),
        FakeStorageConfig::default(),
        SessionConfig::default(),
    )
    .await?;

    let deposit = session.deposit(100.into()).await?;
    let job = session.submit(artifact("stuck.bin"), 60.into())?;

    assert!(matches!(
        session
            .wait_for_upload(job.id, Duration::from_secs(1))
            .await,
        Err(Error::Timeout)
    ));
    assert!(matches!(
        session
            .wait_for_deposit(deposit.id, Duration::from_secs(1))
            .await,
        Err(Error::Timeout)
    ));

    Ok(())
}

#[tokio::test]
async fn shutdown_closes_the_session() -> Result<()> {
    let Harness { session, .. } = default_harness().await?;
    let mut events = session.events()?;

    session.shutdown();

    assert!(session.is_closed());
    assert!(events.recv().await.is_none());
    assert!(session.events().is_err());
    assert!(matches!(
        session.deposit(10.into()).await,
        Err(Error::SessionClosed)
    ));
    assert!(matches!(
        session.submit(artifact("late.bin"), 5.into()),
        Err(Error::SessionClosed)
    ));

    Ok(())
}
