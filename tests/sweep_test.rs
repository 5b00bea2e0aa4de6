//! Anonymization sweep against the archive tables

mod common;

use std::sync::Arc;

use chrono::{Duration, SubsecRound, TimeZone, Utc};
use common::{create_signatures, Fixture};
use epets_core::config::AnonymizationConfig;
use epets_core::jobs::AnonymizationSweep;
use epets_core::messaging::{AnonymizePetitionArgs, JobQueue};
use epets_core::models::{NewPetition, Petition, Signature, SignatureState};
use epets_core::repositories::PgPetitionRepository;
use sqlx::PgPool;

fn sweep(fixture: &Fixture) -> AnonymizationSweep {
    let config = AnonymizationConfig {
        batch_limit: 2,
        ..AnonymizationConfig::default()
    };
    AnonymizationSweep::new(
        Arc::new(PgPetitionRepository::new(fixture.pool.clone())),
        fixture.queue.clone(),
        &config,
    )
}

#[sqlx::test(migrator = "epets_core::test_helpers::MIGRATOR")]
async fn test_sweep_starts_chains_for_expired_petitions(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new(pool.clone()).await;
    let now = Utc.with_ymd_and_hms(2019, 1, 15, 2, 0, 0).unwrap();

    let expired = Petition::create(&pool, NewPetition::closed("Expired", now - Duration::days(200))).await?;
    let recent = Petition::create(&pool, NewPetition::closed("Recent", now - Duration::days(30))).await?;
    let open = Petition::create(
        &pool,
        NewPetition {
            action: "Still open".to_string(),
            state: "open".to_string(),
            closed_at: None,
        },
    )
    .await?;

    let report = sweep(&fixture).run(now).await?;

    assert_eq!(report.enqueued, vec![expired.id]);
    assert!(report.skipped.is_empty());
    assert!(fixture.queue.has_pending_for_petition(expired.id).await?);
    assert!(!fixture.queue.has_pending_for_petition(recent.id).await?);
    assert!(!fixture.queue.has_pending_for_petition(open.id).await?);

    let message = fixture.queue.read(30, 1).await?.remove(0);
    let args: AnonymizePetitionArgs = serde_json::from_value(message.message)?;
    assert_eq!(args, AnonymizePetitionArgs::new(expired.id, now).with_limit(2));

    Ok(())
}

#[sqlx::test(migrator = "epets_core::test_helpers::MIGRATOR")]
async fn test_sweep_then_worker_anonymizes_petition(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new(pool.clone()).await;
    let now = Utc.with_ymd_and_hms(2019, 1, 15, 2, 0, 0).unwrap();
    let petition = Petition::create(&pool, NewPetition::closed("Expired", now - Duration::days(200))).await?;
    create_signatures(
        &pool,
        petition.id,
        SignatureState::Validated,
        now - Duration::days(300),
        5,
    )
    .await;

    let sweep = sweep(&fixture);
    sweep.run(now).await?;
    // A second sweep while the chain is queued does not start another
    assert_eq!(sweep.run(now).await?.skipped, vec![petition.id]);

    assert_eq!(fixture.drain_queue().await, 3);
    assert_eq!(Signature::count_not_anonymized(&pool, petition.id).await?, 0);
    let petition = Petition::find_by_id(&pool, petition.id).await?.unwrap();
    assert_eq!(petition.anonymized_at, Some(now));

    // Anonymized petitions are not swept again
    assert!(sweep.run(now + Duration::days(1)).await?.enqueued.is_empty());

    Ok(())
}

#[sqlx::test(migrator = "epets_core::test_helpers::MIGRATOR")]
async fn test_petition_is_stamped_with_the_sweep_cutoff(
    pool: PgPool,
) -> Result<(), Box<dyn std::error::Error>> {
    let fixture = Fixture::new(pool.clone()).await;
    let now = Utc::now();
    let petition = Petition::create(&pool, NewPetition::closed("Expired", now - Duration::days(400))).await?;
    create_signatures(
        &pool,
        petition.id,
        SignatureState::Validated,
        now - Duration::days(500),
        3,
    )
    .await;

    sweep(&fixture).run(now).await?;
    fixture.drain_queue().await;

    let petition = Petition::find_by_id(&pool, petition.id).await?.unwrap();
    assert_eq!(petition.anonymized_at, Some(now.trunc_subsecs(6)));

    Ok(())
}
