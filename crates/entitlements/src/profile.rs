use atrium_core::{UserId, UserProfile};
use atrium_persistence::{Collection, Document, PersistenceError, PersistenceGateway, to_document};
use chrono::{DateTime, Utc};
use serde_json::Value;

/// Create the user's profile document if it does not exist yet.
pub(crate) async fn ensure_profile(
    gateway: &dyn PersistenceGateway,
    user_id: &UserId,
    now: DateTime<Utc>,
) -> Result<(), PersistenceError> {
    if gateway
        .get(Collection::UserProfiles, user_id)
        .await?
        .is_some()
    {
        return Ok(());
    }
    let doc = to_document(&UserProfile::new_default(now))?;
    match gateway
        .create(Collection::UserProfiles, Some(user_id.as_str()), doc)
        .await
    {
        Ok(_) | Err(PersistenceError::Conflict { .. }) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Write the denormalized `isPro` flag, creating the profile when missing.
pub(crate) async fn set_pro_flag(
    gateway: &dyn PersistenceGateway,
    user_id: &UserId,
    is_pro: bool,
    now: DateTime<Utc>,
) -> Result<(), PersistenceError> {
    ensure_profile(gateway, user_id, now).await?;
    let mut partial = Document::new();
    partial.insert("isPro".into(), Value::Bool(is_pro));
    partial.insert("updatedAt".into(), timestamp(now));
    gateway
        .update(Collection::UserProfiles, user_id, partial)
        .await
}

/// Read the stored profile, if any.
pub(crate) async fn load_profile(
    gateway: &dyn PersistenceGateway,
    user_id: &UserId,
) -> Result<Option<UserProfile>, PersistenceError> {
    gateway
        .get(Collection::UserProfiles, user_id)
        .await?
        .map(|r| r.decode())
        .transpose()
}

/// A timestamp in the same encoding serde uses for document fields.
pub(crate) fn timestamp(at: DateTime<Utc>) -> Value {
    Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::AutoSi, true))
}
