//! Plan entitlements and storage quota enforcement.
//!
//! [`Entitlements`] is the usual entry point: build it with
//! [`EntitlementsBuilder`] over a persistence gateway and a blob store. The
//! pieces it composes are public for callers that need only one concern.

pub mod accountant;
pub mod admission;
pub mod builder;
pub mod clock;
pub mod config;
pub mod entitlements;
pub mod error;
pub mod evaluator;
pub mod lifecycle;
pub mod messages;
pub mod metrics;
mod profile;
pub mod registry;
pub mod watch;

pub use accountant::{AdmissionDecision, DenialReason, StorageAccountant, StorageUsage};
pub use admission::{
    ATTACHMENTS_FIELD, DEFAULT_MIME_TYPE, UPLOAD_TIME_KEY, UploadController, UploadObserver,
    UploadRequest, collection_for,
};
pub use builder::EntitlementsBuilder;
pub use clock::{Clock, ManualClock, MonotonicMillis, SystemClock};
pub use config::EntitlementsConfig;
pub use entitlements::Entitlements;
pub use error::{EntitlementError, ErrorKind, format_bytes};
pub use evaluator::{ALL_AI_MODELS, EntitlementDefaults, EntitlementEvaluator, MessageAllowance};
pub use lifecycle::SubscriptionLifecycle;
pub use messages::{MessageAllowanceChecker, USER_ROLE, start_of_utc_day};
pub use metrics::{EntitlementMetrics, MetricsSnapshot};
pub use registry::PlanRegistry;
pub use watch::{SubscriptionCallback, WatchHandle, WatchHub};
