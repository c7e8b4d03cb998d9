use std::sync::Arc;

use atrium_core::{Subscription, SubscriptionStatus, UserId, UserProfile};
use atrium_persistence::{Collection, Document, PersistenceError, PersistenceGateway, to_document};
use serde_json::Value;
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::error::EntitlementError;
use crate::evaluator::EntitlementEvaluator;
use crate::metrics::EntitlementMetrics;
use crate::profile::{load_profile, set_pro_flag, timestamp};
use crate::registry::PlanRegistry;
use crate::watch::{SubscriptionCallback, WatchHandle, WatchHub};

/// Owns every write to the `subscriptions` collection.
///
/// One document per user, keyed by user id. Each successful write is
/// published to the user's watchers after it lands.
pub struct SubscriptionLifecycle {
    persistence: Arc<dyn PersistenceGateway>,
    registry: Arc<PlanRegistry>,
    evaluator: Arc<EntitlementEvaluator>,
    clock: Arc<dyn Clock>,
    billing_period: chrono::Duration,
    hub: Arc<WatchHub>,
    metrics: Arc<EntitlementMetrics>,
}

impl SubscriptionLifecycle {
    pub fn new(
        persistence: Arc<dyn PersistenceGateway>,
        registry: Arc<PlanRegistry>,
        evaluator: Arc<EntitlementEvaluator>,
        clock: Arc<dyn Clock>,
        billing_period: chrono::Duration,
        metrics: Arc<EntitlementMetrics>,
    ) -> Self {
        Self {
            persistence,
            registry,
            evaluator,
            clock,
            billing_period,
            hub: WatchHub::new(),
            metrics,
        }
    }

    /// Read the stored subscription without creating or expiring it.
    pub async fn stored(&self, user_id: &UserId) -> Result<Option<Subscription>, EntitlementError> {
        let record = self
            .persistence
            .get(Collection::Subscriptions, user_id)
            .await?;
        Ok(record.map(|r| r.decode()).transpose()?)
    }

    /// Return the user's subscription, creating a default-plan one if absent.
    ///
    /// A lapsed subscription on any plan other than the default is replaced
    /// by a fresh default-plan snapshot. A canceled default-plan subscription
    /// is returned as is; admission refuses it until the user subscribes
    /// again through [`upgrade`](Self::upgrade).
    #[instrument(name = "lifecycle.subscription", skip_all, fields(user_id = %user_id))]
    pub async fn subscription(&self, user_id: &UserId) -> Result<Subscription, EntitlementError> {
        let now = self.clock.now();
        if let Some(sub) = self.stored(user_id).await? {
            let default_id = &self.registry.default_plan().id;
            if sub.is_lapsed_at(now) && sub.plan_id != *default_id {
                return self.expire(user_id, &sub).await;
            }
            return Ok(sub);
        }

        let sub = Subscription::grant(user_id.clone(), self.registry.default_plan(), now, None);
        match self
            .persistence
            .create(
                Collection::Subscriptions,
                Some(user_id.as_str()),
                to_document(&sub)?,
            )
            .await
        {
            Ok(_) => {
                info!(plan_id = %sub.plan_id, "default subscription created");
                self.hub.notify(user_id, Some(&sub));
                Ok(sub)
            }
            // Another caller created it first; theirs wins.
            Err(PersistenceError::Conflict { .. }) => self
                .stored(user_id)
                .await?
                .ok_or_else(|| EntitlementError::Persistence(atrium_persistence::not_found(
                    Collection::Subscriptions,
                    user_id,
                ))),
            Err(e) => Err(e.into()),
        }
    }

    /// Move the user onto `plan_id` for one billing period.
    ///
    /// Writes a fresh snapshot, then the profile's `isPro` flag. The writes
    /// are independent: if the second fails the result is a partial failure
    /// and calling `upgrade` again converges.
    #[instrument(name = "lifecycle.upgrade", skip_all, fields(user_id = %user_id, plan_id = %plan_id))]
    pub async fn upgrade(
        &self,
        user_id: &UserId,
        plan_id: &str,
    ) -> Result<Subscription, EntitlementError> {
        let plan = self.registry.get(plan_id)?;
        let now = self.clock.now();
        let mut sub = Subscription::grant(user_id.clone(), plan, now, Some(self.billing_period));

        let existing = self.stored(user_id).await?;
        if let Some(previous) = &existing {
            sub.created_at = previous.created_at;
        }
        self.write(user_id, &sub, existing.is_some()).await?;
        self.metrics.increment_upgrades();
        info!(end_date = ?sub.end_date, "subscription upgraded");

        let is_pro = self.evaluator.is_pro_at(Some(&sub), now);
        if let Err(e) = set_pro_flag(self.persistence.as_ref(), user_id, is_pro, now).await {
            warn!(error = %e, "profile flag update failed after upgrade");
            self.metrics.increment_partial_failures();
            return Err(EntitlementError::PartialFailure {
                operation: "upgrade",
                detail: format!("subscription saved but profile not updated: {e}"),
                compensated: false,
            });
        }
        Ok(sub)
    }

    /// Cancel the user's subscription.
    ///
    /// Benefits run until `end_date`; the profile flag is left alone. A
    /// second call is a no-op and keeps the first cancellation date.
    #[instrument(name = "lifecycle.cancel", skip_all, fields(user_id = %user_id))]
    pub async fn cancel(&self, user_id: &UserId) -> Result<Subscription, EntitlementError> {
        let mut sub = self.subscription(user_id).await?;
        if sub.status == SubscriptionStatus::Canceled {
            return Ok(sub);
        }

        let now = self.clock.now();
        let mut partial = Document::new();
        partial.insert(
            "status".into(),
            Value::String(SubscriptionStatus::Canceled.to_string()),
        );
        partial.insert("cancellationDate".into(), timestamp(now));
        partial.insert("updatedAt".into(), timestamp(now));
        self.persistence
            .update(Collection::Subscriptions, user_id, partial)
            .await?;

        sub.status = SubscriptionStatus::Canceled;
        sub.cancellation_date = Some(now);
        sub.updated_at = now;
        self.metrics.increment_cancellations();
        info!(end_date = ?sub.end_date, "subscription canceled");
        self.hub.notify(user_id, Some(&sub));
        Ok(sub)
    }

    /// Align the profile's `isPro` flag with the subscription. Returns the
    /// flag written.
    #[instrument(name = "lifecycle.reconcile_profile", skip_all, fields(user_id = %user_id))]
    pub async fn reconcile_profile(&self, user_id: &UserId) -> Result<bool, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        let now = self.clock.now();
        let is_pro = self.evaluator.is_pro_at(Some(&sub), now);
        set_pro_flag(self.persistence.as_ref(), user_id, is_pro, now).await?;
        Ok(is_pro)
    }

    /// The user's stored profile, if one exists.
    pub async fn profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, EntitlementError> {
        Ok(load_profile(self.persistence.as_ref(), user_id).await?)
    }

    /// Watch the user's subscription.
    ///
    /// `callback` runs once with the currently stored value, then after
    /// every write made through this manager. It runs on the writer's task
    /// and must not itself write the subscription.
    pub async fn watch<F>(&self, user_id: &UserId, callback: F) -> Result<WatchHandle, EntitlementError>
    where
        F: Fn(Option<&Subscription>) + Send + Sync + 'static,
    {
        let callback: SubscriptionCallback = Arc::new(callback);
        let handle = self.hub.register(user_id, Arc::clone(&callback));
        let current = self.stored(user_id).await?;
        callback(current.as_ref());
        Ok(handle)
    }

    /// Number of live watchers across all users.
    pub fn watcher_count(&self) -> usize {
        self.hub.watcher_count()
    }

    async fn write(
        &self,
        user_id: &UserId,
        sub: &Subscription,
        exists: bool,
    ) -> Result<(), EntitlementError> {
        let doc = to_document(sub)?;
        if exists {
            self.persistence
                .update(Collection::Subscriptions, user_id, doc)
                .await?;
        } else {
            self.persistence
                .create(Collection::Subscriptions, Some(user_id.as_str()), doc)
                .await?;
        }
        self.hub.notify(user_id, Some(sub));
        Ok(())
    }

    async fn expire(
        &self,
        user_id: &UserId,
        lapsed: &Subscription,
    ) -> Result<Subscription, EntitlementError> {
        let now = self.clock.now();
        let mut sub = Subscription::grant(user_id.clone(), self.registry.default_plan(), now, None);
        sub.created_at = lapsed.created_at;
        self.write(user_id, &sub, true).await?;
        self.metrics.increment_expirations();
        info!(previous_plan = %lapsed.plan_id, "lapsed subscription moved to default plan");

        let is_pro = self.evaluator.is_pro_at(Some(&sub), now);
        if let Err(e) = set_pro_flag(self.persistence.as_ref(), user_id, is_pro, now).await {
            warn!(error = %e, "profile flag update failed after expiry");
        }
        Ok(sub)
    }
}
