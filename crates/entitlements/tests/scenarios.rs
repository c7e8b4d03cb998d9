//! End-to-end entitlement scenarios.
//!
//! Each test drives the [`Entitlements`] facade over the in-memory
//! backends, with faults injected where a scenario needs them.

mod common;

use std::sync::Arc;

use atrium_core::{EntityRef, MB, SubscriptionStatus, UserId};
use atrium_entitlements::{
    ALL_AI_MODELS, AdmissionDecision, DenialReason, EntitlementError, EntitlementsConfig,
    ErrorKind, MessageAllowance, UploadRequest,
};
use chrono::Duration;
use common::{Harness, harness, harness_with};
use parking_lot::Mutex;

fn upload_request(user: &str, note: &str, name: &str, size: usize) -> UploadRequest {
    UploadRequest::new(
        user,
        EntityRef::note(note),
        name,
        "text/plain",
        vec![7u8; size],
    )
}

async fn upload_one(h: &Harness, user: &str, note: &str, name: &str, size: usize) {
    h.entitlements
        .upload(upload_request(user, note, name, size), None)
        .await
        .unwrap();
}

// -- Plans and evaluation --

mod plans {
    use super::*;

    #[tokio::test]
    async fn new_user_gets_free_defaults() {
        let h = harness();
        let user = UserId::new("u1");
        let sub = h.entitlements.subscription(&user).await.unwrap();
        assert_eq!(sub.plan_id.as_str(), "free");
        assert_eq!(sub.status, SubscriptionStatus::Active);

        let evaluator = h.entitlements.evaluator();
        assert_eq!(evaluator.max_file_size_bytes(None), 5 * MB);
        assert_eq!(
            evaluator.max_file_size_bytes(Some(&sub)),
            sub.limits.max_file_size_bytes
        );
        assert_eq!(evaluator.limits(None), &sub.limits);
        assert!(!h.entitlements.is_pro(&user).await.unwrap());
    }

    #[tokio::test]
    async fn free_user_sees_only_basic_models() {
        let h = harness();
        let user = UserId::new("u1");
        let models = h.entitlements.available_models(&user).await.unwrap();
        assert!(!models.is_empty());
        assert!(models.iter().all(|m| !m.requires_pro));

        h.entitlements.upgrade(&user, "pro").await.unwrap();
        let all = h.entitlements.available_models(&user).await.unwrap();
        assert_eq!(all.len(), h.entitlements.config().models.len());
    }

    #[tokio::test]
    async fn model_access_follows_the_injected_clock() {
        let mut config = EntitlementsConfig::default();
        for plan in &mut config.plans {
            plan.features.retain(|f| f != ALL_AI_MODELS);
        }
        let h = harness_with(config);
        let user = UserId::new("u1");
        h.entitlements.upgrade(&user, "pro").await.unwrap();
        h.entitlements.cancel(&user).await.unwrap();

        // Still inside the paid period on the manual clock.
        h.clock.advance(Duration::days(29));
        assert!(h.entitlements.can_use_model(&user, "gpt-4.5").await.unwrap());
        assert!(h.entitlements.can_access(&user, "some_future_feature").await.unwrap());
        let models = h.entitlements.available_models(&user).await.unwrap();
        assert_eq!(models.len(), h.entitlements.config().models.len());

        h.clock.advance(Duration::days(2));
        assert!(!h.entitlements.can_use_model(&user, "gpt-4.5").await.unwrap());
        assert!(!h.entitlements.can_access(&user, "some_future_feature").await.unwrap());
        let models = h.entitlements.available_models(&user).await.unwrap();
        assert!(models.iter().all(|m| !m.requires_pro));
    }

    #[tokio::test]
    async fn unknown_plan_is_rejected() {
        let h = harness();
        let err = h
            .entitlements
            .upgrade(&UserId::new("u1"), "platinum")
            .await
            .unwrap_err();
        assert!(matches!(err, EntitlementError::PlanNotFound(_)));
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn custom_plan_table_from_toml() {
        let config = EntitlementsConfig::from_toml_str(
            r#"
            default_plan = "starter"

            [[plans]]
            id = "starter"
            name = "Starter"
            features = ["basic_ai_access"]
            [plans.limits]
            maxMessagesPerDay = 2
            maxStorageBytes = 1000
            maxFileSizeBytes = 600
            "#,
        )
        .unwrap();
        let h = harness_with(config);
        h.note("u1", "n1").await;

        let sub = h.entitlements.subscription(&UserId::new("u1")).await.unwrap();
        assert_eq!(sub.plan_id.as_str(), "starter");

        upload_one(&h, "u1", "n1", "a.txt", 600).await;
        let err = h
            .entitlements
            .upload(upload_request("u1", "n1", "b.txt", 500), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EntitlementError::QuotaExceeded {
                used: 600,
                requested: 500,
                limit: 1000
            }
        ));
        assert_eq!(
            h.entitlements
                .check_message_allowance(&UserId::new("u1"))
                .await
                .unwrap(),
            MessageAllowance::Allowed { remaining: Some(2) }
        );
    }
}

// -- Storage accounting --

mod storage {
    use super::*;

    #[tokio::test]
    async fn user_without_blobs_uses_nothing() {
        let h = harness();
        assert_eq!(
            h.entitlements
                .current_usage(&UserId::new("nobody"))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn free_user_near_quota() {
        let h = harness();
        let user = UserId::new("u1");
        h.note("u1", "n1").await;
        h.seed_blob("u1", "old.bin", 98 * MB).await;

        let denied = h.entitlements.can_admit(&user, 3 * MB).await.unwrap();
        assert_eq!(
            denied,
            AdmissionDecision::Denied {
                reason: DenialReason::QuotaExceeded {
                    used: 98 * MB,
                    requested: 3 * MB,
                    limit: 100 * MB,
                }
            }
        );
        let err = h
            .entitlements
            .upload(
                upload_request("u1", "n1", "big.bin", usize::try_from(3 * MB).unwrap()),
                None,
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert!(err.user_message().to_lowercase().contains("upgrade"));

        upload_one(&h, "u1", "n1", "ok.bin", usize::try_from(MB).unwrap()).await;
        let report = h.entitlements.usage_report(&user).await.unwrap();
        assert_eq!(report.used_bytes, 99 * MB);
        assert_eq!(report.remaining_bytes, MB);
    }

    #[tokio::test]
    async fn usage_is_isolated_per_user() {
        let h = harness();
        h.seed_blob("u1", "a.bin", 100).await;
        h.seed_blob("u10", "b.bin", 50).await;
        assert_eq!(
            h.entitlements.current_usage(&UserId::new("u1")).await.unwrap(),
            100
        );
    }
}

// -- Uploads and deletion --

mod uploads {
    use super::*;

    #[tokio::test]
    async fn uploaded_file_is_listed() {
        let h = harness();
        let user = UserId::new("u1");
        h.note("u1", "n1").await;
        upload_one(&h, "u1", "n1", "notes.txt", 1234).await;

        let listed = h
            .entitlements
            .attachments(&user, &EntityRef::note("n1"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].display_name, "notes.txt");
        assert_eq!(listed[0].size_bytes, 1234);
        assert_eq!(listed[0].thumbnail_url, "/icons/file.svg");

        let files = h
            .entitlements
            .entity_files(&user, &EntityRef::note("n1"))
            .await
            .unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].storage_path, listed[0].storage_path);
        assert_eq!(files[0].size_bytes, 1234);
    }

    #[tokio::test]
    async fn entity_files_agree_with_attachments_on_upload_time() {
        let h = harness();
        let user = UserId::new("u1");
        let entity = EntityRef::note("n1");
        h.note("u1", "n1").await;
        for name in ["c.txt", "b.txt", "a.txt"] {
            upload_one(&h, "u1", "n1", name, 16).await;
            h.clock.advance(Duration::minutes(5));
        }

        let listed = h.entitlements.attachments(&user, &entity).await.unwrap();
        let files = h.entitlements.entity_files(&user, &entity).await.unwrap();
        assert_eq!(files.len(), 3);
        for (file, attachment) in files.iter().zip(&listed) {
            assert_eq!(file.storage_path, attachment.storage_path);
            assert_eq!(file.uploaded_at, attachment.uploaded_at);
        }
        assert_eq!(
            files[0].uploaded_at,
            common::start().timestamp_millis()
        );
    }

    #[tokio::test]
    async fn delete_frees_usage() {
        let h = harness();
        let user = UserId::new("u1");
        let entity = EntityRef::note("n1");
        h.note("u1", "n1").await;
        upload_one(&h, "u1", "n1", "a.txt", 4096).await;
        assert_eq!(h.entitlements.current_usage(&user).await.unwrap(), 4096);

        let path = h.entitlements.attachments(&user, &entity).await.unwrap()[0]
            .storage_path
            .clone();
        h.entitlements
            .delete_attachment(&user, &entity, &path)
            .await
            .unwrap();
        assert!(h.entitlements.attachments(&user, &entity).await.unwrap().is_empty());
        assert!(!h.blobs.inner.contains(&path));
        assert_eq!(h.entitlements.current_usage(&user).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_uploads_keep_every_attachment() {
        let h = Arc::new(harness());
        h.note("u1", "n1").await;
        let mut tasks = Vec::new();
        for i in 0..8 {
            let h = Arc::clone(&h);
            tasks.push(tokio::spawn(async move {
                h.entitlements
                    .upload(upload_request("u1", "n1", &format!("f{i}.txt"), 10), None)
                    .await
                    .unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        let listed = h
            .entitlements
            .attachments(&UserId::new("u1"), &EntityRef::note("n1"))
            .await
            .unwrap();
        assert_eq!(listed.len(), 8);
        assert_eq!(h.entitlements.metrics().uploads_completed, 8);
    }
}

// -- Subscription lifecycle --

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn upgrade_then_cancel_keeps_pro_until_end() {
        let h = harness();
        let user = UserId::new("u1");

        let sub = h.entitlements.upgrade(&user, "pro").await.unwrap();
        assert_eq!(sub.end_date, Some(common::start() + Duration::days(30)));
        assert!(h.entitlements.is_pro(&user).await.unwrap());
        assert!(h.profile(&user).await.unwrap().is_pro);

        let canceled = h.entitlements.cancel(&user).await.unwrap();
        assert_eq!(canceled.status, SubscriptionStatus::Canceled);
        assert!(h.entitlements.is_pro(&user).await.unwrap());

        h.clock.advance(Duration::days(29));
        assert!(h.entitlements.is_pro(&user).await.unwrap());

        h.clock.advance(Duration::days(2));
        assert!(!h.entitlements.is_pro(&user).await.unwrap());
        let sub = h.entitlements.subscription(&user).await.unwrap();
        assert_eq!(sub.plan_id.as_str(), "free");
        assert_eq!(sub.status, SubscriptionStatus::Active);
        assert!(!h.profile(&user).await.unwrap().is_pro);
        assert_eq!(h.entitlements.metrics().expirations, 1);
    }

    #[tokio::test]
    async fn canceled_free_subscription_stops_consuming_quota() {
        let h = harness();
        let user = UserId::new("u1");
        h.note("u1", "n1").await;
        upload_one(&h, "u1", "n1", "before.txt", 1024).await;

        h.entitlements.cancel(&user).await.unwrap();
        h.clock.advance(Duration::days(400));
        let sub = h.entitlements.subscription(&user).await.unwrap();
        assert_eq!(sub.status, SubscriptionStatus::Canceled);

        assert_eq!(
            h.entitlements.can_admit(&user, 1024).await.unwrap(),
            AdmissionDecision::Denied {
                reason: DenialReason::SubscriptionLapsed { ended_at: None }
            }
        );
        let err = h
            .entitlements
            .upload(upload_request("u1", "n1", "after.txt", 1024), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EntitlementError::SubscriptionLapsed { .. }));
        assert_eq!(err.kind(), ErrorKind::QuotaExceeded);
        assert_eq!(h.entitlements.current_usage(&user).await.unwrap(), 1024);
        assert_eq!(h.entitlements.metrics().rejected_lapsed, 1);

        // Subscribing again restores uploads.
        h.entitlements.upgrade(&user, "free").await.unwrap();
        upload_one(&h, "u1", "n1", "after.txt", 1024).await;
        assert_eq!(h.entitlements.current_usage(&user).await.unwrap(), 2048);
    }

    #[tokio::test]
    async fn second_cancel_keeps_first_date() {
        let h = harness();
        let user = UserId::new("u1");
        h.entitlements.upgrade(&user, "pro").await.unwrap();

        let first = h.entitlements.cancel(&user).await.unwrap();
        h.clock.advance(Duration::hours(3));
        let second = h.entitlements.cancel(&user).await.unwrap();
        assert_eq!(first.cancellation_date, Some(common::start()));
        assert_eq!(second.cancellation_date, first.cancellation_date);

        let stored = h.entitlements.lifecycle().stored(&user).await.unwrap().unwrap();
        assert_eq!(stored.cancellation_date, first.cancellation_date);
    }

    #[tokio::test]
    async fn reconcile_repairs_profile_flag() {
        let h = harness();
        let user = UserId::new("u1");
        h.persistence.fail_profile_updates(true);
        let err = h.entitlements.upgrade(&user, "pro").await.unwrap_err();
        assert!(matches!(
            err,
            EntitlementError::PartialFailure {
                operation: "upgrade",
                ..
            }
        ));
        assert!(err.is_retryable());
        assert!(!h.profile(&user).await.unwrap().is_pro);

        h.persistence.fail_profile_updates(false);
        assert!(h.entitlements.reconcile_profile(&user).await.unwrap());
        assert!(h.profile(&user).await.unwrap().is_pro);
    }

    #[tokio::test]
    async fn pro_limits_apply_after_upgrade() {
        let h = harness();
        let user = UserId::new("u1");
        h.note("u1", "n1").await;
        let six_mb = usize::try_from(6 * MB).unwrap();

        let err = h
            .entitlements
            .upload(upload_request("u1", "n1", "big.bin", six_mb), None)
            .await
            .unwrap_err();
        assert!(matches!(err, EntitlementError::FileTooLarge { .. }));

        h.entitlements.upgrade(&user, "pro").await.unwrap();
        upload_one(&h, "u1", "n1", "big.bin", six_mb).await;
    }
}

// -- Watchers --

mod watch {
    use super::*;

    #[tokio::test]
    async fn watcher_sees_current_value_then_writes() {
        let h = harness();
        let user = UserId::new("u1");
        let seen: Arc<Mutex<Vec<Option<String>>>> = Arc::default();
        let sink = Arc::clone(&seen);
        let handle = h
            .entitlements
            .watch(&user, move |sub| {
                sink.lock().push(sub.map(|s| s.plan_id.to_string()));
            })
            .await
            .unwrap();

        h.entitlements.upgrade(&user, "pro").await.unwrap();
        h.entitlements.cancel(&user).await.unwrap();
        assert_eq!(
            *seen.lock(),
            [None, Some("pro".to_owned()), Some("pro".to_owned())]
        );

        handle.unsubscribe();
        h.entitlements.upgrade(&user, "pro").await.unwrap();
        assert_eq!(seen.lock().len(), 3);
        assert_eq!(h.entitlements.lifecycle().watcher_count(), 0);
    }

    #[tokio::test]
    async fn dropped_handle_stops_notifications() {
        let h = harness();
        let user = UserId::new("u1");
        let count = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&count);
        let handle = h
            .entitlements
            .watch(&user, move |_| *sink.lock() += 1)
            .await
            .unwrap();
        drop(handle);
        h.entitlements.upgrade(&user, "pro").await.unwrap();
        assert_eq!(*count.lock(), 1);
    }
}

// -- Fault handling --

mod faults {
    use super::*;

    #[tokio::test]
    async fn attach_failure_removes_blob() {
        let h = harness();
        h.note("u1", "n1").await;
        h.persistence.fail_array_ops(true);

        let err = h
            .entitlements
            .upload(upload_request("u1", "n1", "a.txt", 100), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EntitlementError::PartialFailure {
                operation: "upload",
                compensated: true,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::PartialFailure);
        assert!(h.blobs.inner.is_empty());
        assert_eq!(h.entitlements.metrics().compensations, 1);
    }

    #[tokio::test]
    async fn failed_compensation_is_reported_not_escalated() {
        let h = harness();
        h.note("u1", "n1").await;
        h.persistence.fail_array_ops(true);
        h.blobs.fail_deletes(true);

        let err = h
            .entitlements
            .upload(upload_request("u1", "n1", "a.txt", 100), None)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EntitlementError::PartialFailure {
                compensated: false,
                ..
            }
        ));
        assert_eq!(h.blobs.inner.len(), 1, "orphaned blob remains");
        assert_eq!(h.entitlements.metrics().compensation_failures, 1);
    }

    #[tokio::test]
    async fn delete_leaves_dangling_reference_then_converges() {
        let h = harness();
        let user = UserId::new("u1");
        let entity = EntityRef::note("n1");
        h.note("u1", "n1").await;
        upload_one(&h, "u1", "n1", "a.txt", 100).await;
        let path = h.entitlements.attachments(&user, &entity).await.unwrap()[0]
            .storage_path
            .clone();

        h.persistence.fail_array_ops(true);
        let err = h
            .entitlements
            .delete_attachment(&user, &entity, &path)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            EntitlementError::PartialFailure {
                operation: "delete",
                ..
            }
        ));
        assert!(!h.blobs.inner.contains(&path));
        assert_eq!(h.entitlements.attachments(&user, &entity).await.unwrap().len(), 1);

        h.persistence.fail_array_ops(false);
        h.entitlements
            .delete_attachment(&user, &entity, &path)
            .await
            .unwrap();
        assert!(h.entitlements.attachments(&user, &entity).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn blob_delete_failure_keeps_reference() {
        let h = harness();
        let user = UserId::new("u1");
        let entity = EntityRef::note("n1");
        h.note("u1", "n1").await;
        upload_one(&h, "u1", "n1", "a.txt", 100).await;
        let path = h.entitlements.attachments(&user, &entity).await.unwrap()[0]
            .storage_path
            .clone();

        h.blobs.fail_deletes(true);
        let err = h
            .entitlements
            .delete_attachment(&user, &entity, &path)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Transport);
        assert_eq!(h.entitlements.attachments(&user, &entity).await.unwrap().len(), 1);
    }
}
