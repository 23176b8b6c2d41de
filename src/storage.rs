use std::path::{Path, PathBuf};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{error, info};

use crate::models::AttachmentKind;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not_found")]
    NotFound,
    #[error("other: {0}")]
    Other(String),
}

/// Content-addressed blob storage for chat attachments.
#[async_trait]
pub trait AttachmentStore: Send + Sync {
    /// Saving the same name twice is a no-op.
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError>;
    async fn load(&self, name: &str) -> Result<Vec<u8>, StoreError>;
}

/// Rejects anything that could escape the storage directory.
pub fn is_safe_name(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
}

pub struct FsAttachmentStore {
    root: PathBuf,
}

impl FsAttachmentStore {
    pub async fn new(root: impl Into<PathBuf>) -> anyhow::Result<Self> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        info!("attachment store rooted at '{}'", root.display());
        Ok(Self { root })
    }

    fn path_for(&self, name: &str) -> Result<PathBuf, StoreError> {
        if !is_safe_name(name) {
            return Err(StoreError::NotFound);
        }
        Ok(self.root.join(name))
    }
}

#[async_trait]
impl AttachmentStore for FsAttachmentStore {
    async fn save(&self, name: &str, bytes: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(name).map_err(|_| StoreError::Other(format!("unsafe name '{name}'")))?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            error!("write failed path={} err={e}", path.display());
            StoreError::Other(e.to_string())
        })
    }

    async fn load(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.path_for(name)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(e) => Err(StoreError::Other(e.to_string())),
        }
    }
}

/// Extensions accepted for chat uploads and the content types each may sniff as.
const ALLOWED: &[(&str, &[&str])] = &[
    ("jpg", &["image/jpeg"]),
    ("jpeg", &["image/jpeg"]),
    ("png", &["image/png"]),
    ("gif", &["image/gif"]),
    ("pdf", &["application/pdf"]),
    ("doc", &["application/msword", "application/x-ole-storage"]),
    ("docx", &["application/vnd.openxmlformats-officedocument.wordprocessingml.document", "application/zip"]),
    ("txt", &["text/plain"]),
];

/// What an accepted upload turned out to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inspected {
    pub kind: AttachmentKind,
    pub mime: String,
    /// Content-addressed storage name, `<sha256>.<ext>`.
    pub stored_name: String,
}

fn sniff(bytes: &[u8]) -> Option<String> {
    if let Some(t) = infer::get(bytes) {
        return Some(t.mime_type().to_string());
    }
    std::str::from_utf8(bytes).ok().map(|_| "text/plain".to_string())
}

/// Checks extension and sniffed content type against the allow-list.
/// Returns `None` when the file is not acceptable.
pub fn inspect_upload(filename: &str, bytes: &[u8]) -> Option<Inspected> {
    let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
    let (_, mimes) = ALLOWED.iter().find(|(e, _)| *e == ext)?;
    let mime = sniff(bytes)?;
    if !mimes.contains(&mime.as_str()) {
        return None;
    }
    let kind = if mime.starts_with("image/") { AttachmentKind::Image } else { AttachmentKind::Document };
    let hash = hex::encode(Sha256::digest(bytes));
    let mime = if ext == "docx" {
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document".to_string()
    } else {
        mime
    };
    Some(Inspected { kind, mime, stored_name: format!("{hash}.{ext}") })
}

/// Content type to serve a stored attachment with, derived from its extension.
pub fn mime_for_name(name: &str) -> &'static str {
    let ext = name.rsplit('.').next().unwrap_or_default().to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}
