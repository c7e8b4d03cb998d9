pub mod attachment;
pub mod model;
pub mod plan;
pub mod profile;
pub mod subscription;
pub mod types;
pub mod upload;

pub use attachment::{
    DEFAULT_STORAGE_ROOT, EntityRef, EntityType, FileAttachment, entity_folder, file_extension,
    storage_path, thumbnail_url_for, user_namespace,
};
pub use model::AiModel;
pub use plan::{FREE_PLAN_ID, GB, MB, PRO_PLAN_ID, Plan, PlanLimits};
pub use profile::UserProfile;
pub use subscription::{DEFAULT_BILLING_PERIOD_DAYS, Subscription, SubscriptionStatus};
pub use types::{EntityId, PlanId, UserId, is_valid_path_segment};
pub use upload::{InvalidTransition, UploadState};
