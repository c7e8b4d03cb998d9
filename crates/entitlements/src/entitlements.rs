use std::sync::Arc;

use atrium_core::{AiModel, EntityRef, FileAttachment, Plan, Subscription, UserId, UserProfile};
use tracing::instrument;

use crate::accountant::{AdmissionDecision, StorageAccountant, StorageUsage};
use crate::admission::{UploadController, UploadObserver, UploadRequest};
use crate::clock::Clock;
use crate::config::EntitlementsConfig;
use crate::error::EntitlementError;
use crate::evaluator::{EntitlementEvaluator, MessageAllowance};
use crate::lifecycle::SubscriptionLifecycle;
use crate::messages::MessageAllowanceChecker;
use crate::metrics::{EntitlementMetrics, MetricsSnapshot};
use crate::registry::PlanRegistry;
use crate::watch::WatchHandle;

/// Entry point tying subscriptions, storage accounting and uploads together.
///
/// Constructed through [`EntitlementsBuilder`](crate::EntitlementsBuilder).
/// Operations that need limits read the user's subscription first, so a
/// lapsed paid plan is moved to the default plan before it is applied.
pub struct Entitlements {
    pub(crate) config: EntitlementsConfig,
    pub(crate) registry: Arc<PlanRegistry>,
    pub(crate) evaluator: Arc<EntitlementEvaluator>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) lifecycle: SubscriptionLifecycle,
    pub(crate) accountant: Arc<StorageAccountant>,
    pub(crate) uploads: UploadController,
    pub(crate) messages: MessageAllowanceChecker,
    pub(crate) metrics: Arc<EntitlementMetrics>,
}

impl std::fmt::Debug for Entitlements {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entitlements")
            .field("plans", &self.registry.plans().len())
            .field("default_plan", &self.registry.default_plan().id)
            .field("storage_root", &self.config.storage_root)
            .finish_non_exhaustive()
    }
}

impl Entitlements {
    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn config(&self) -> &EntitlementsConfig {
        &self.config
    }

    pub fn registry(&self) -> &PlanRegistry {
        &self.registry
    }

    pub fn evaluator(&self) -> &EntitlementEvaluator {
        &self.evaluator
    }

    pub fn lifecycle(&self) -> &SubscriptionLifecycle {
        &self.lifecycle
    }

    pub fn accountant(&self) -> &StorageAccountant {
        &self.accountant
    }

    pub fn uploads(&self) -> &UploadController {
        &self.uploads
    }

    /// Look up a plan by id.
    pub fn plan(&self, plan_id: &str) -> Result<&Plan, EntitlementError> {
        self.registry.get(plan_id)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    pub async fn subscription(&self, user_id: &UserId) -> Result<Subscription, EntitlementError> {
        self.lifecycle.subscription(user_id).await
    }

    pub async fn upgrade(
        &self,
        user_id: &UserId,
        plan_id: &str,
    ) -> Result<Subscription, EntitlementError> {
        self.lifecycle.upgrade(user_id, plan_id).await
    }

    pub async fn cancel(&self, user_id: &UserId) -> Result<Subscription, EntitlementError> {
        self.lifecycle.cancel(user_id).await
    }

    pub async fn reconcile_profile(&self, user_id: &UserId) -> Result<bool, EntitlementError> {
        self.lifecycle.reconcile_profile(user_id).await
    }

    pub async fn profile(&self, user_id: &UserId) -> Result<Option<UserProfile>, EntitlementError> {
        self.lifecycle.profile(user_id).await
    }

    pub async fn watch<F>(
        &self,
        user_id: &UserId,
        callback: F,
    ) -> Result<WatchHandle, EntitlementError>
    where
        F: Fn(Option<&Subscription>) + Send + Sync + 'static,
    {
        self.lifecycle.watch(user_id, callback).await
    }

    /// Whether the user is on the pro plan and in good standing now.
    pub async fn is_pro(&self, user_id: &UserId) -> Result<bool, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        Ok(self.evaluator.is_pro_at(Some(&sub), self.clock.now()))
    }

    pub async fn has_feature(&self, user_id: &UserId, tag: &str) -> Result<bool, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        Ok(self.evaluator.has_feature(Some(&sub), tag))
    }

    /// Feature gate: the user carries `tag` or is Pro now.
    pub async fn can_access(&self, user_id: &UserId, tag: &str) -> Result<bool, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        Ok(self.evaluator.can_access(Some(&sub), tag, self.clock.now()))
    }

    /// Models from the configured catalogue the user may select.
    pub async fn available_models(&self, user_id: &UserId) -> Result<Vec<AiModel>, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        Ok(self
            .evaluator
            .available_models(Some(&sub), &self.config.models, self.clock.now())
            .into_iter()
            .cloned()
            .collect())
    }

    pub async fn can_use_model(
        &self,
        user_id: &UserId,
        model_id: &str,
    ) -> Result<bool, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        Ok(self.evaluator.can_use_model(
            Some(&sub),
            &self.config.models,
            model_id,
            self.clock.now(),
        ))
    }

    pub async fn check_message_allowance(
        &self,
        user_id: &UserId,
    ) -> Result<MessageAllowance, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        self.messages.check(user_id, Some(&sub)).await
    }

    // =========================================================================
    // Storage
    // =========================================================================

    pub async fn current_usage(&self, user_id: &UserId) -> Result<u64, EntitlementError> {
        self.accountant.current_usage(user_id).await
    }

    pub async fn usage_report(&self, user_id: &UserId) -> Result<StorageUsage, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        self.accountant.usage_report(user_id, Some(&sub)).await
    }

    pub async fn can_admit(
        &self,
        user_id: &UserId,
        candidate_size: u64,
    ) -> Result<AdmissionDecision, EntitlementError> {
        let sub = self.subscription(user_id).await?;
        self.accountant
            .can_admit(user_id, candidate_size, Some(&sub))
            .await
    }

    /// Upload a file under the user's current subscription.
    #[instrument(name = "entitlements.upload", skip_all, fields(user_id = %request.user_id))]
    pub async fn upload(
        &self,
        request: UploadRequest,
        observer: Option<&dyn UploadObserver>,
    ) -> Result<FileAttachment, EntitlementError> {
        let sub = self.subscription(&request.user_id).await?;
        self.uploads.upload(request, Some(&sub), observer).await
    }

    pub async fn delete_attachment(
        &self,
        user_id: &UserId,
        entity: &EntityRef,
        storage_path: &str,
    ) -> Result<(), EntitlementError> {
        self.uploads.delete(user_id, entity, storage_path).await
    }

    pub async fn attachments(
        &self,
        user_id: &UserId,
        entity: &EntityRef,
    ) -> Result<Vec<FileAttachment>, EntitlementError> {
        self.uploads.attachments(user_id, entity).await
    }

    pub async fn entity_files(
        &self,
        user_id: &UserId,
        entity: &EntityRef,
    ) -> Result<Vec<FileAttachment>, EntitlementError> {
        self.uploads.entity_files(user_id, entity).await
    }
}
