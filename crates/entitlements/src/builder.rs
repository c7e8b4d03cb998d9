use std::sync::Arc;

use atrium_blob::BlobStore;
use atrium_persistence::PersistenceGateway;

use crate::accountant::StorageAccountant;
use crate::admission::UploadController;
use crate::clock::{Clock, SystemClock};
use crate::config::EntitlementsConfig;
use crate::entitlements::Entitlements;
use crate::error::EntitlementError;
use crate::evaluator::EntitlementEvaluator;
use crate::lifecycle::SubscriptionLifecycle;
use crate::messages::MessageAllowanceChecker;
use crate::metrics::EntitlementMetrics;
use crate::registry::PlanRegistry;

/// Fluent builder for constructing an [`Entitlements`] instance.
///
/// A [`PersistenceGateway`] and a [`BlobStore`] must be supplied. The
/// configuration defaults to the built-in plans and the clock to the
/// system clock.
pub struct EntitlementsBuilder {
    persistence: Option<Arc<dyn PersistenceGateway>>,
    blobs: Option<Arc<dyn BlobStore>>,
    config: EntitlementsConfig,
    clock: Arc<dyn Clock>,
}

impl EntitlementsBuilder {
    pub fn new() -> Self {
        Self {
            persistence: None,
            blobs: None,
            config: EntitlementsConfig::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Set the document store.
    #[must_use]
    pub fn persistence(mut self, persistence: Arc<dyn PersistenceGateway>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    /// Set the blob store.
    #[must_use]
    pub fn blobs(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    #[must_use]
    pub fn config(mut self, config: EntitlementsConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the time source. Tests use a manual clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Consume the builder and produce a configured [`Entitlements`].
    ///
    /// Returns [`EntitlementError::Configuration`] if a backend is missing
    /// or the configuration does not validate.
    pub fn build(self) -> Result<Entitlements, EntitlementError> {
        let persistence = self.persistence.ok_or_else(|| {
            EntitlementError::Configuration("persistence gateway is required".into())
        })?;
        let blobs = self
            .blobs
            .ok_or_else(|| EntitlementError::Configuration("blob store is required".into()))?;

        self.config.validate()?;
        let registry = Arc::new(PlanRegistry::new(
            self.config.plans.clone(),
            &self.config.default_plan,
        )?);
        let evaluator = Arc::new(EntitlementEvaluator::from_registry(&registry));
        let metrics = Arc::new(EntitlementMetrics::default());

        let lifecycle = SubscriptionLifecycle::new(
            Arc::clone(&persistence),
            Arc::clone(&registry),
            Arc::clone(&evaluator),
            Arc::clone(&self.clock),
            self.config.billing_period(),
            Arc::clone(&metrics),
        );
        let accountant = Arc::new(StorageAccountant::new(
            Arc::clone(&blobs),
            Arc::clone(&evaluator),
            Arc::clone(&self.clock),
            self.config.storage_root.clone(),
        ));
        let uploads = UploadController::new(
            Arc::clone(&persistence),
            blobs,
            Arc::clone(&accountant),
            Arc::clone(&evaluator),
            Arc::clone(&self.clock),
            self.config.storage_root.clone(),
            Arc::clone(&metrics),
        );
        let messages = MessageAllowanceChecker::new(
            persistence,
            Arc::clone(&evaluator),
            Arc::clone(&self.clock),
        );

        Ok(Entitlements {
            config: self.config,
            registry,
            evaluator,
            clock: self.clock,
            lifecycle,
            accountant,
            uploads,
            messages,
            metrics,
        })
    }
}

impl Default for EntitlementsBuilder {
    fn default() -> Self {
        Self::new()
    }
}
