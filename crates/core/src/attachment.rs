use serde::{Deserialize, Serialize};

use crate::types::{EntityId, UserId};

/// Root folder under which every user's blobs live.
pub const DEFAULT_STORAGE_ROOT: &str = "users";

/// Kind of record that can own attachments.
///
/// The serialized form is the folder name used in storage paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Notes,
    Tasks,
    Chats,
    Profile,
}

impl EntityType {
    /// Folder name used in storage paths.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Notes => "notes",
            Self::Tasks => "tasks",
            Self::Chats => "chats",
            Self::Profile => "profile",
        }
    }

    /// Parse a storage folder name back into an entity type.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "notes" => Some(Self::Notes),
            "tasks" => Some(Self::Tasks),
            "chats" => Some(Self::Chats),
            "profile" => Some(Self::Profile),
            _ => None,
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A concrete record that owns attachments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRef {
    pub entity_type: EntityType,
    pub entity_id: EntityId,
}

impl EntityRef {
    #[must_use]
    pub fn new(entity_type: EntityType, entity_id: impl Into<EntityId>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }

    #[must_use]
    pub fn note(id: impl Into<EntityId>) -> Self {
        Self::new(EntityType::Notes, id)
    }

    #[must_use]
    pub fn task(id: impl Into<EntityId>) -> Self {
        Self::new(EntityType::Tasks, id)
    }

    #[must_use]
    pub fn chat_message(id: impl Into<EntityId>) -> Self {
        Self::new(EntityType::Chats, id)
    }

    /// The user's own profile. Its document id is the user id.
    #[must_use]
    pub fn profile(user_id: &UserId) -> Self {
        Self::new(EntityType::Profile, user_id.as_str())
    }
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.entity_id)
    }
}

/// A stored file referenced from exactly one owning entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileAttachment {
    /// Original filename as supplied by the user.
    pub display_name: String,
    pub size_bytes: u64,
    pub mime_type: String,
    /// Lower-cased extension of `display_name`, empty if there is none.
    #[serde(default)]
    pub extension: String,
    /// Blob store locator. Unique across all attachments.
    pub storage_path: String,
    pub public_url: String,
    pub thumbnail_url: String,
    /// Upload time, Unix milliseconds.
    pub uploaded_at: i64,
}

/// Build the folder holding every blob of `user_id`.
#[must_use]
pub fn user_namespace(root: &str, user_id: &UserId) -> String {
    format!("{root}/{user_id}")
}

/// Build the folder holding the blobs of one entity.
#[must_use]
pub fn entity_folder(root: &str, user_id: &UserId, entity: &EntityRef) -> String {
    format!(
        "{root}/{user_id}/{}/{}",
        entity.entity_type, entity.entity_id
    )
}

/// Build the storage path of a new upload:
/// `{root}/{userId}/{entityType}/{entityId}/{timestamp}_{name}`.
#[must_use]
pub fn storage_path(
    root: &str,
    user_id: &UserId,
    entity: &EntityRef,
    timestamp_ms: i64,
    file_name: &str,
) -> String {
    format!(
        "{}/{timestamp_ms}_{file_name}",
        entity_folder(root, user_id, entity)
    )
}

/// Extract the lower-cased extension of a filename.
#[must_use]
pub fn file_extension(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => ext.to_ascii_lowercase(),
        _ => String::new(),
    }
}

/// Pick the thumbnail for an attachment from its MIME type.
///
/// Images use their own URL. Everything else maps to a static icon.
#[must_use]
pub fn thumbnail_url_for(mime_type: &str, public_url: &str) -> String {
    let mime = mime_type.to_ascii_lowercase();
    if mime.starts_with("image/") {
        return public_url.to_owned();
    }
    let icon = if mime.contains("pdf") {
        "pdf"
    } else if mime.contains("word") || mime.contains("document") {
        "doc"
    } else if mime.contains("sheet") || mime.contains("excel") {
        "sheet"
    } else if mime.contains("presentation") || mime.contains("powerpoint") {
        "presentation"
    } else if mime.contains("audio") {
        "audio"
    } else if mime.contains("video") {
        "video"
    } else if mime.contains("zip") || mime.contains("archive") {
        "archive"
    } else {
        "file"
    };
    format!("/icons/{icon}.svg")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_path_layout() {
        let user = UserId::new("u1");
        let entity = EntityRef::note("n1");
        let path = storage_path(DEFAULT_STORAGE_ROOT, &user, &entity, 1_700_000, "a b.pdf");
        assert_eq!(path, "users/u1/notes/n1/1700000_a b.pdf");
        assert!(path.starts_with(&user_namespace(DEFAULT_STORAGE_ROOT, &user)));
        assert!(path.starts_with(&entity_folder(DEFAULT_STORAGE_ROOT, &user, &entity)));
    }

    #[test]
    fn profile_entity_uses_user_id() {
        let user = UserId::new("u9");
        let entity = EntityRef::profile(&user);
        assert_eq!(entity.entity_type, EntityType::Profile);
        assert_eq!(entity.entity_id.as_str(), "u9");
        assert_eq!(entity.to_string(), "profile/u9");
    }

    #[test]
    fn entity_type_parse_matches_as_str() {
        for t in [
            EntityType::Notes,
            EntityType::Tasks,
            EntityType::Chats,
            EntityType::Profile,
        ] {
            assert_eq!(EntityType::parse(t.as_str()), Some(t));
        }
        assert_eq!(EntityType::parse("photos"), None);
    }

    #[test]
    fn extensions() {
        assert_eq!(file_extension("Report.PDF"), "pdf");
        assert_eq!(file_extension("archive.tar.gz"), "gz");
        assert_eq!(file_extension("README"), "");
        assert_eq!(file_extension(".bashrc"), "");
    }

    #[test]
    fn thumbnails_by_mime_type() {
        let url = "https://blobs/x";
        assert_eq!(thumbnail_url_for("image/png", url), url);
        assert_eq!(thumbnail_url_for("application/pdf", url), "/icons/pdf.svg");
        assert_eq!(
            thumbnail_url_for(
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
                url
            ),
            "/icons/doc.svg"
        );
        assert_eq!(
            thumbnail_url_for("application/vnd.ms-excel", url),
            "/icons/sheet.svg"
        );
        assert_eq!(
            thumbnail_url_for("application/vnd.ms-powerpoint", url),
            "/icons/presentation.svg"
        );
        assert_eq!(thumbnail_url_for("audio/mpeg", url), "/icons/audio.svg");
        assert_eq!(thumbnail_url_for("video/mp4", url), "/icons/video.svg");
        assert_eq!(thumbnail_url_for("application/zip", url), "/icons/archive.svg");
        assert_eq!(thumbnail_url_for("text/plain", url), "/icons/file.svg");
    }
}
