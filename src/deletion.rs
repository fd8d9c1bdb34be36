//! Cascading GDPR deletion workflow: 9 ordered, idempotent
//! steps spanning a user's actor database, the registry, the blob store,
//! and the outbound queue. Every step reports `{step, deleted, ok}`; the
//! workflow is safe to re-run from scratch against a partially-deleted
//! user and must then report `deleted = 0` everywhere except certificate
//! generation (step 8, always `deleted = 1`).

use crate::actor::ActorRegistry;
use crate::blob_store::BlobStore;
use crate::model::registry::{DeletionCertificate, DeletionSummary, StepOutcome};
use crate::queue::{OutboundQueue, QueueMessage};
use crate::{registry, time, TminusError};
use hmac::{Hmac, Mac};
use rusqlite::Connection;
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone)]
pub struct DeletionOutcome {
    pub steps: Vec<StepOutcome>,
    pub certificate: DeletionCertificate,
}

fn delete_all(conn: &Connection, table: &str) -> Result<i64, TminusError> {
    Ok(conn.execute(&format!("DELETE FROM {table}"), [])? as i64)
}

/// Steps 1-4: everything scoped to one user's actor database. Run inside
/// [`ActorRegistry::with_user_conn`] so it serializes against any other
/// operation on that user.
fn delete_actor_rows(conn: &Connection) -> Result<(StepOutcome, StepOutcome, StepOutcome, StepOutcome), TminusError> {
    let events_deleted = delete_all(conn, "canonical_events")?;
    let step1 = StepOutcome { step: 1, deleted: events_deleted, ok: true };

    let mirrors_deleted = delete_all(conn, "event_mirrors")?;
    let step2 = StepOutcome { step: 2, deleted: mirrors_deleted, ok: true };

    let journal_deleted = delete_all(conn, "event_journal")?;
    let step3 = StepOutcome { step: 3, deleted: journal_deleted, ok: true };

    // Children before parents so FK constraints never block the sweep,
    // even though most of these cascade declaratively anyway.
    let mut step4_deleted = 0i64;
    for table in ["interaction_ledger", "milestones", "policy_edges", "policies", "calendars", "constraints", "relationships"] {
        step4_deleted += delete_all(conn, table)?;
    }
    let step4 = StepOutcome { step: 4, deleted: step4_deleted, ok: true };

    Ok((step1, step2, step3, step4))
}

/// `proof_hash` = SHA-256 over a canonicalized, deterministic serialization
/// of `(entity_type, entity_id, deleted_at, deletion_summary)`; `signature`
/// = HMAC-SHA-256(proof_hash, MASTER_KEY). Field order is fixed by this
/// struct's definition, and `serde_json`'s struct serialization preserves
/// declaration order, so re-running this on the same inputs always
/// reproduces the same hash.
#[derive(serde::Serialize)]
struct CanonicalCertificateBody<'a> {
    entity_type: &'a str,
    entity_id: &'a str,
    deleted_at: &'a str,
    deletion_summary: &'a DeletionSummary,
}

fn compute_proof_hash(entity_type: &str, entity_id: &str, deleted_at: &str, summary: &DeletionSummary) -> Result<String, TminusError> {
    let body = CanonicalCertificateBody { entity_type, entity_id, deleted_at, deletion_summary: summary };
    let canonical = serde_json::to_string(&body).map_err(|e| TminusError::Signature(e.to_string()))?;
    let digest = Sha256::digest(canonical.as_bytes());
    Ok(hex::encode(digest))
}

/// Recomputes the certificate's signature from `master_key` and compares
/// it against the stored value, so any party holding `master_key` can
/// independently verify a certificate without trusting the issuer.
pub fn verify_certificate(cert: &DeletionCertificate, master_key: &[u8]) -> Result<bool, TminusError> {
    let expected_hash = compute_proof_hash(&cert.entity_type, &cert.entity_id, &cert.deleted_at, &cert.deletion_summary)?;
    if expected_hash != cert.proof_hash {
        return Ok(false);
    }
    let mut mac = HmacSha256::new_from_slice(master_key).map_err(|e| TminusError::Signature(e.to_string()))?;
    mac.update(expected_hash.as_bytes());
    let expected_sig = hex::encode(mac.finalize().into_bytes());
    Ok(expected_sig == cert.signature)
}

fn sign(proof_hash: &str, master_key: &[u8]) -> Result<String, TminusError> {
    let mut mac = HmacSha256::new_from_slice(master_key).map_err(|e| TminusError::Signature(e.to_string()))?;
    mac.update(proof_hash.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

/// Runs all 9 steps for `(request_id, user_id)`. `registry_conn` must be a
/// connection to the registry database with [`registry::ensure_migrated`]
/// already applied.
pub fn execute_deletion(
    actors: &ActorRegistry,
    registry_conn: &Connection,
    blobs: &dyn BlobStore,
    queue: &dyn OutboundQueue,
    master_key: &[u8],
    request_id: &str,
    user_id: &str,
) -> Result<DeletionOutcome, TminusError> {
    registry::mark_deletion_request_processing(registry_conn, request_id)?;

    tracing::info!(user_id, request_id, "starting deletion workflow");

    let (step1, step2, step3, step4) = actors.with_user_conn(user_id, |conn| delete_actor_rows(conn))?;

    // Prefetch accounts before step 5 destroys them.
    let accounts = registry::list_accounts_for_user(registry_conn, user_id)?;

    let d1_deleted = registry::delete_user_registry_rows(registry_conn, user_id)?;
    let step5 = StepOutcome { step: 5, deleted: d1_deleted, ok: true };
    tracing::info!(user_id, deleted = d1_deleted, "deletion step 5: registry rows removed");

    let r2_deleted = blobs.delete_prefix(&format!("{user_id}/"))?;
    let step6 = StepOutcome { step: 6, deleted: r2_deleted, ok: true };

    let mut enqueued = 0i64;
    for account in &accounts {
        queue.enqueue(QueueMessage::DeleteUserMirrors {
            user_id: user_id.to_string(),
            account_id: account.account_id.clone(),
            provider: account.provider.clone(),
        })?;
        enqueued += 1;
    }
    let step7 = StepOutcome { step: 7, deleted: enqueued, ok: true };

    let summary = DeletionSummary {
        events_deleted: step1.deleted,
        mirrors_deleted: step2.deleted,
        journal_entries_deleted: step3.deleted,
        relationship_records_deleted: step4.deleted,
        d1_rows_deleted: step5.deleted,
        r2_objects_deleted: step6.deleted,
        provider_deletions_enqueued: step7.deleted,
    };

    let deleted_at = time::now_iso();
    let proof_hash = compute_proof_hash("user", user_id, &deleted_at, &summary)?;
    let signature = sign(&proof_hash, master_key)?;
    let certificate = DeletionCertificate {
        certificate_id: time::new_id(),
        entity_type: "user".to_string(),
        entity_id: user_id.to_string(),
        deleted_at,
        deletion_summary: summary,
        proof_hash,
        signature,
    };
    registry::insert_deletion_certificate(registry_conn, &certificate)?;
    let step8 = StepOutcome { step: 8, deleted: 1, ok: true };

    registry::complete_deletion_request(registry_conn, request_id)?;
    let step9 = StepOutcome { step: 9, deleted: 1, ok: true };

    tracing::info!(user_id, request_id, "deletion workflow completed");

    Ok(DeletionOutcome {
        steps: vec![step1, step2, step3, step4, step5, step6, step7, step8, step9],
        certificate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TminusConfig;
    use crate::blob_store::FsBlobStore;
    use crate::queue::InMemoryQueue;
    use crate::model::event::{DeltaKind, EventFieldPatch};
    use crate::relationship::crud::{create_relationship, NewRelationship};
    use crate::model::relationship::RelationshipCategory;
    use crate::store::{apply_provider_delta, ProviderDelta};

    fn harness() -> (ActorRegistry, Connection, FsBlobStore, InMemoryQueue, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let mut config = TminusConfig::default();
        config.actors_dir = dir.path().join("actors");
        let actors = ActorRegistry::new(config);

        let mut registry_conn = Connection::open_in_memory().unwrap();
        registry::ensure_migrated(&mut registry_conn).unwrap();

        let blobs = FsBlobStore::new(dir.path().join("blobs"));
        let queue = InMemoryQueue::new();
        (actors, registry_conn, blobs, queue, dir)
    }

    fn seed_user(actors: &ActorRegistry, registry_conn: &Connection, blobs: &FsBlobStore, user_id: &str) {
        registry::create_user(registry_conn, user_id, None, "user@example.com", None).unwrap();
        registry::create_account(registry_conn, user_id, "google", Some("sub-1"), None).unwrap();
        registry::create_account(registry_conn, user_id, "outlook", Some("sub-2"), None).unwrap();
        registry::create_api_key(registry_conn, user_id, Some("primary")).unwrap();

        actors
            .with_user_conn(user_id, |conn| {
                apply_provider_delta(
                    conn,
                    &ProviderDelta {
                        origin_account_id: "acc-1".to_string(),
                        origin_event_id: "ev-1".to_string(),
                        kind: DeltaKind::Created,
                        fields: EventFieldPatch {
                            title: Some("Standup".to_string()),
                            start_ts: Some("2026-03-01T10:00:00Z".to_string()),
                            end_ts: Some("2026-03-01T10:15:00Z".to_string()),
                            ..Default::default()
                        },
                    },
                    "provider:acc-1",
                )?;
                create_relationship(
                    conn,
                    NewRelationship {
                        participant_hash: "contact-1".to_string(),
                        display_name: Some("Contact".to_string()),
                        category: RelationshipCategory::Friend,
                        closeness_weight: None,
                        city: None,
                        timezone: None,
                        interaction_frequency_target: None,
                    },
                )?;
                Ok(())
            })
            .unwrap();

        blobs.put(&format!("{user_id}/audit/1.json"), b"{}").unwrap();
        blobs.put(&format!("{user_id}/audit/2.json"), b"{}").unwrap();
    }

    #[test]
    fn deletion_workflow_clears_all_tables_and_is_idempotent() {
        let (actors, mut registry_conn, blobs, queue, _dir) = harness();
        seed_user(&actors, &registry_conn, &blobs, "user_1");

        let request = registry::create_deletion_request(&registry_conn, "user_1").unwrap();
        let master_key = b"test-master-key";

        let outcome = execute_deletion(&actors, &mut registry_conn, &blobs, &queue, master_key, &request.request_id, "user_1").unwrap();
        assert_eq!(outcome.steps.len(), 9);
        assert!(outcome.steps.iter().all(|s| s.ok));
        assert_eq!(outcome.steps[0].deleted, 1); // events
        assert_eq!(outcome.steps[4].deleted, 4); // 2 accounts + 1 api_key + 1 user
        assert_eq!(outcome.steps[5].deleted, 2); // blobs
        assert_eq!(outcome.steps[6].deleted, 2); // DELETE_USER_MIRRORS per account
        assert_eq!(queue.len(), 2);

        let reloaded_request = registry::get_deletion_request(&registry_conn, &request.request_id).unwrap().unwrap();
        assert_eq!(reloaded_request.status, crate::model::registry::DeletionRequestStatus::Completed);

        assert!(verify_certificate(&outcome.certificate, master_key).unwrap());

        // Re-run from scratch: every step still ok, nothing left to delete
        // except certificate generation, which always reports 1.
        let second_request = registry::create_deletion_request(&registry_conn, "user_1").unwrap();
        let second = execute_deletion(&actors, &mut registry_conn, &blobs, &queue, master_key, &second_request.request_id, "user_1").unwrap();
        assert!(second.steps.iter().all(|s| s.ok));
        for step in &second.steps {
            if step.step == 8 || step.step == 9 {
                assert_eq!(step.deleted, 1);
            } else {
                assert_eq!(step.deleted, 0, "step {} should delete nothing on retry", step.step);
            }
        }
    }

    #[test]
    fn verify_certificate_detects_tampering_and_wrong_key() {
        let (actors, mut registry_conn, blobs, queue, _dir) = harness();
        seed_user(&actors, &registry_conn, &blobs, "user_2");
        let request = registry::create_deletion_request(&registry_conn, "user_2").unwrap();
        let master_key = b"correct-key";

        let outcome = execute_deletion(&actors, &mut registry_conn, &blobs, &queue, master_key, &request.request_id, "user_2").unwrap();
        assert!(verify_certificate(&outcome.certificate, master_key).unwrap());
        assert!(!verify_certificate(&outcome.certificate, b"wrong-key").unwrap());

        let mut tampered = outcome.certificate.clone();
        tampered.deletion_summary.events_deleted += 1;
        assert!(!verify_certificate(&tampered, master_key).unwrap());
    }
}
