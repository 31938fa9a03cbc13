/// Avatar storage
///
/// Uploaded avatars are first staged in a temp directory, then normalized to a
/// 250×250 JPEG in the public avatars directory and addressed by the relative
/// URL `avatars/<uuid>.jpg`. Users without an upload get a gravatar URL
/// derived from their email.
///
/// Removing files is always best-effort: failures are logged with
/// [`remove_best_effort`] and never reach the caller.
///
/// # Example
///
/// ```no_run
/// use passgate_shared::avatar::{gravatar_url, is_local_avatar, AvatarStorage};
///
/// # async fn example(data: bytes::Bytes) -> Result<(), Box<dyn std::error::Error>> {
/// let storage = AvatarStorage::new("tmp", "public/avatars");
/// storage.ensure_dirs().await?;
///
/// let staged = storage.stage(Some("image/png"), data).await?;
/// let url = storage.persist(staged).await?;
/// assert!(is_local_avatar(&url));
///
/// assert!(!is_local_avatar(&gravatar_url("a@x.com")));
/// # Ok(())
/// # }
/// ```

use bytes::Bytes;
use image::{imageops::FilterType, DynamicImage, ImageFormat};
use sha2::{Digest, Sha256};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::models::user::normalize_email;

/// Width and height of stored avatars in pixels
pub const AVATAR_SIZE: u32 = 250;

/// Largest accepted upload
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

/// Accepted upload content types
pub const ALLOWED_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/webp"];

/// URL prefix (and public subdirectory name) of stored avatars
pub const PUBLIC_PREFIX: &str = "avatars";

/// Extension of stored avatars; also how local avatars are recognized
const LOCAL_EXTENSION: &str = "jpg";

/// Error type for avatar operations
#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    /// Content type is not an accepted image type
    #[error("Unsupported avatar type '{0}'. Allowed types: image/jpeg, image/png, image/gif, image/webp")]
    UnsupportedType(String),

    /// Upload exceeds [`MAX_AVATAR_BYTES`]
    #[error("Avatar too large: {0} bytes (max 5 MiB)")]
    TooLarge(usize),

    /// Upload could not be decoded as an image
    #[error("Invalid image: {0}")]
    InvalidImage(String),

    /// Filesystem failure
    #[error("Avatar storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An upload written to the temp directory, waiting to be persisted or discarded
///
/// Dropping it without [`AvatarStorage::discard`] (for example when a request
/// is cancelled mid-handler) still removes the temp file.
#[derive(Debug)]
pub struct StagedUpload {
    path: PathBuf,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for StagedUpload {
    fn drop(&mut self) {
        // Empty once discard has taken the path
        if self.path.as_os_str().is_empty() {
            return;
        }

        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "Failed to remove dropped staged avatar");
            }
        }
    }
}

/// Filesystem locations for avatars
#[derive(Debug, Clone)]
pub struct AvatarStorage {
    temp_dir: PathBuf,
    public_dir: PathBuf,
}

impl AvatarStorage {
    pub fn new(temp_dir: impl Into<PathBuf>, public_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
            public_dir: public_dir.into(),
        }
    }

    /// Directory served under `/avatars`
    pub fn public_dir(&self) -> &Path {
        &self.public_dir
    }

    /// Creates the temp and public directories if missing
    pub async fn ensure_dirs(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.temp_dir).await?;
        tokio::fs::create_dir_all(&self.public_dir).await
    }

    /// Validates an upload and writes it to the temp directory
    ///
    /// # Errors
    ///
    /// - `AvatarError::UnsupportedType` for a missing or non-image content type
    /// - `AvatarError::TooLarge` above [`MAX_AVATAR_BYTES`]
    pub async fn stage(&self, content_type: Option<&str>, data: Bytes) -> Result<StagedUpload, AvatarError> {
        let content_type = content_type.unwrap_or_default();
        if !ALLOWED_TYPES.contains(&content_type) {
            return Err(AvatarError::UnsupportedType(content_type.to_string()));
        }
        if data.len() > MAX_AVATAR_BYTES {
            return Err(AvatarError::TooLarge(data.len()));
        }

        let path = self.temp_dir.join(format!("{}.upload", Uuid::new_v4()));
        tokio::fs::write(&path, &data).await?;

        debug!(path = %path.display(), bytes = data.len(), "Staged avatar upload");
        Ok(StagedUpload { path })
    }

    /// Moves a staged upload into the public directory as a normalized JPEG
    ///
    /// The staged file is removed whether or not this succeeds.
    ///
    /// # Returns
    ///
    /// Public URL of the stored avatar, `avatars/<uuid>.jpg`
    pub async fn persist(&self, staged: StagedUpload) -> Result<String, AvatarError> {
        let result = self.store_normalized(&staged).await;
        self.discard(staged).await;
        result
    }

    async fn store_normalized(&self, staged: &StagedUpload) -> Result<String, AvatarError> {
        let data = tokio::fs::read(&staged.path).await?;

        let jpeg = tokio::task::spawn_blocking(move || normalize(&data))
            .await
            .map_err(|e| AvatarError::InvalidImage(format!("Image processing aborted: {}", e)))??;

        let file_name = format!("{}.{}", Uuid::new_v4(), LOCAL_EXTENSION);
        tokio::fs::write(self.public_dir.join(&file_name), jpeg).await?;

        Ok(format!("{}/{}", PUBLIC_PREFIX, file_name))
    }

    /// Removes a staged upload, best-effort
    pub async fn discard(&self, mut staged: StagedUpload) {
        let path = std::mem::take(&mut staged.path);
        remove_best_effort(&path, "staged avatar").await;
    }

    /// Filesystem path of a local avatar URL, or `None` for remote URLs
    ///
    /// Only the final path component of the URL is used.
    pub fn local_path(&self, url: &str) -> Option<PathBuf> {
        if !is_local_avatar(url) {
            return None;
        }

        Path::new(url)
            .file_name()
            .map(|name| self.public_dir.join(name))
    }

    /// Removes the file behind a local avatar URL, best-effort
    ///
    /// Remote URLs are ignored. Returns whether a file was removed.
    pub async fn remove(&self, url: &str) -> bool {
        match self.local_path(url) {
            Some(path) => remove_best_effort(&path, "previous avatar").await,
            None => false,
        }
    }
}

/// Decodes any supported image and re-encodes it as a square JPEG
fn normalize(data: &[u8]) -> Result<Vec<u8>, AvatarError> {
    let img = image::load_from_memory(data).map_err(|e| AvatarError::InvalidImage(e.to_string()))?;

    let resized = img.resize_to_fill(AVATAR_SIZE, AVATAR_SIZE, FilterType::Lanczos3);
    let rgb = DynamicImage::ImageRgb8(resized.to_rgb8());

    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)
        .map_err(|e| AvatarError::InvalidImage(e.to_string()))?;

    Ok(out.into_inner())
}

/// Deterministic fallback avatar for `email`
///
/// Gravatar accepts SHA-256 hashes of the trimmed, lowercased address.
pub fn gravatar_url(email: &str) -> String {
    let hash = Sha256::digest(normalize_email(email).as_bytes());
    format!("https://www.gravatar.com/avatar/{}?d=identicon", hex::encode(hash))
}

/// Whether `url` points at a file stored by this service
pub fn is_local_avatar(url: &str) -> bool {
    if url.starts_with("http://") || url.starts_with("https://") {
        return false;
    }

    Path::new(url)
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(LOCAL_EXTENSION))
}

/// Deletes a file, logging instead of failing
///
/// Returns `true` if the file was removed.
pub async fn remove_best_effort(path: &Path, what: &str) -> bool {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            debug!(path = %path.display(), "Removed {}", what);
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove {}", what);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageBuffer, Rgba};

    fn png_bytes(width: u32, height: u32) -> Bytes {
        let img = ImageBuffer::from_pixel(width, height, Rgba([200u8, 30, 30, 255]));
        let mut out = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        Bytes::from(out.into_inner())
    }

    fn storage(dir: &tempfile::TempDir) -> AvatarStorage {
        AvatarStorage::new(dir.path().join("tmp"), dir.path().join("public/avatars"))
    }

    #[test]
    fn test_gravatar_url_is_deterministic() {
        let url = gravatar_url("a@x.com");

        assert!(url.starts_with("https://www.gravatar.com/avatar/"));
        assert!(url.ends_with("?d=identicon"));
        assert_eq!(url, gravatar_url("  A@X.COM "));
        assert_ne!(url, gravatar_url("b@x.com"));
    }

    #[test]
    fn test_is_local_avatar() {
        assert!(is_local_avatar("avatars/9f2c.jpg"));
        assert!(is_local_avatar("avatars/9f2c.JPG"));
        assert!(!is_local_avatar(&gravatar_url("a@x.com")));
        assert!(!is_local_avatar("https://cdn.example.com/a.jpg"));
        assert!(!is_local_avatar("avatars/9f2c.png"));
    }

    #[test]
    fn test_local_path_uses_file_name_only() {
        let storage = AvatarStorage::new("tmp", "public/avatars");

        assert_eq!(
            storage.local_path("avatars/a.jpg"),
            Some(PathBuf::from("public/avatars/a.jpg"))
        );
        assert_eq!(
            storage.local_path("../../etc/x.jpg"),
            Some(PathBuf::from("public/avatars/x.jpg"))
        );
        assert_eq!(storage.local_path("https://www.gravatar.com/avatar/x"), None);
    }

    #[tokio::test]
    async fn test_stage_rejects_bad_type_and_size() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let err = storage.stage(Some("text/plain"), Bytes::from_static(b"hi")).await.unwrap_err();
        assert!(matches!(err, AvatarError::UnsupportedType(_)));

        let err = storage.stage(None, Bytes::from_static(b"hi")).await.unwrap_err();
        assert!(matches!(err, AvatarError::UnsupportedType(_)));

        let big = Bytes::from(vec![0u8; MAX_AVATAR_BYTES + 1]);
        let err = storage.stage(Some("image/png"), big).await.unwrap_err();
        assert!(matches!(err, AvatarError::TooLarge(_)));
    }

    #[tokio::test]
    async fn test_persist_normalizes_and_cleans_staging() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let staged = storage.stage(Some("image/png"), png_bytes(40, 20)).await.unwrap();
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());

        let url = storage.persist(staged).await.unwrap();
        assert!(url.starts_with("avatars/"));
        assert!(is_local_avatar(&url));
        assert!(!staged_path.exists());

        let stored = storage.local_path(&url).unwrap();
        let img = image::open(&stored).unwrap();
        assert_eq!((img.width(), img.height()), (AVATAR_SIZE, AVATAR_SIZE));
    }

    #[tokio::test]
    async fn test_persist_invalid_image_still_cleans_staging() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let staged = storage
            .stage(Some("image/png"), Bytes::from_static(b"not really a png"))
            .await
            .unwrap();
        let staged_path = staged.path().to_path_buf();

        let err = storage.persist(staged).await.unwrap_err();
        assert!(matches!(err, AvatarError::InvalidImage(_)));
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn test_dropped_staged_upload_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let staged = storage.stage(Some("image/png"), png_bytes(8, 8)).await.unwrap();
        let staged_path = staged.path().to_path_buf();
        assert!(staged_path.exists());

        drop(staged);
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn test_discard_removes_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let staged = storage.stage(Some("image/png"), png_bytes(8, 8)).await.unwrap();
        let staged_path = staged.path().to_path_buf();

        storage.discard(staged).await;
        assert!(!staged_path.exists());
    }

    #[tokio::test]
    async fn test_remove_local_and_remote() {
        let dir = tempfile::tempdir().unwrap();
        let storage = storage(&dir);
        storage.ensure_dirs().await.unwrap();

        let staged = storage.stage(Some("image/png"), png_bytes(8, 8)).await.unwrap();
        let url = storage.persist(staged).await.unwrap();

        assert!(storage.remove(&url).await);
        assert!(!storage.local_path(&url).unwrap().exists());

        // Already gone: logged, not an error
        assert!(!storage.remove(&url).await);
        assert!(!storage.remove(&gravatar_url("a@x.com")).await);
    }

    #[tokio::test]
    async fn test_remove_best_effort_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!remove_best_effort(&dir.path().join("missing.jpg"), "test file").await);
    }
}
