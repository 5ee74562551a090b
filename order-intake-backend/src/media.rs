//! Upload storage on the local filesystem
//!

use std::path::{Component, Path, PathBuf};

use order_intake_shared::error::OrderError;
use rand::distr::{Alphanumeric, SampleString};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

/// Where order attachments land, relative to the media root.
pub const ORDER_UPLOAD_TO: &str = "order";

/// Longest stored name we'll hand back, prefix included.
pub const MAX_NAME_LENGTH: usize = 100;

/// Longest extension kept, dot included.
pub const MAX_EXTENSION_LENGTH: usize = 16;

const FALLBACK_NAME: &str = "upload";
const SUFFIX_LENGTH: usize = 7;

#[derive(Clone, Debug)]
pub struct MediaStore {
    root: PathBuf,
}

impl MediaStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute path for a stored name, refusing anything that climbs out of the root.
    pub fn path(&self, name: &str) -> Result<PathBuf, OrderError> {
        let relative = Path::new(name);
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(OrderError::ValidationError(format!(
                "invalid stored file name {name:?}"
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Writes `data` under `upload_to/` and returns the name it was stored as.
    ///
    /// Never overwrites: a taken name gets a random suffix before its extension.
    pub async fn save(
        &self,
        upload_to: &str,
        original_name: &str,
        data: &[u8],
    ) -> Result<String, OrderError> {
        let dir = self.path(upload_to)?;
        tokio::fs::create_dir_all(&dir).await?;

        let valid_name = valid_filename(original_name);
        let (stem, extension) = split_extension(&valid_name);
        let extension = truncate_bytes(extension, MAX_EXTENSION_LENGTH);
        let budget = MAX_NAME_LENGTH
            .saturating_sub(upload_to.len() + 1 + extension.len() + SUFFIX_LENGTH + 1)
            .max(1);
        let stem = truncate_bytes(stem, budget);

        let mut candidate = format!("{stem}{extension}");
        loop {
            let target = dir.join(&candidate);
            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&target)
                .await
            {
                Ok(file) => {
                    write_or_remove(file, &target, data).await?;
                    let stored = format!("{upload_to}/{candidate}");
                    debug!(
                        stored = stored.as_str(),
                        bytes = data.len(),
                        "Stored uploaded file"
                    );
                    return Ok(stored);
                }
                Err(err) if err.kind() == std::io::ErrorKind::AlreadyExists => {
                    let suffix = Alphanumeric.sample_string(&mut rand::rng(), SUFFIX_LENGTH);
                    candidate = format!("{stem}_{suffix}{extension}");
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Removes a stored file. Already gone is fine.
    pub async fn delete(&self, name: &str) -> Result<(), OrderError> {
        let target = self.path(name)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!("Stored file {} was already missing", target.display());
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }
}

/// Writes `data` out, deleting `target` again if the write doesn't complete.
async fn write_or_remove<W>(mut writer: W, target: &Path, data: &[u8]) -> Result<(), OrderError>
where
    W: AsyncWrite + Unpin,
{
    let written = match writer.write_all(data).await {
        Ok(()) => writer.flush().await,
        Err(err) => Err(err),
    };
    drop(writer);

    if let Err(err) = written {
        error!("Failed to write {}: {:?}", target.display(), err);
        if let Err(remove_err) = tokio::fs::remove_file(target).await {
            warn!(
                "Failed to remove partial file {}: {:?}",
                target.display(),
                remove_err
            );
        }
        return Err(err.into());
    }
    Ok(())
}

/// Reduce a client-supplied filename to something safe to put on disk.
pub fn valid_filename(name: &str) -> String {
    // browsers on windows send the full path
    let basename = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = basename
        .trim()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        .collect();
    match cleaned.trim_matches('.') {
        "" => FALLBACK_NAME.to_string(),
        _ => cleaned,
    }
}

fn truncate_bytes(value: &str, max: usize) -> &str {
    let mut end = value.len().min(max);
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    &value[..end]
}

fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(0) | None => (name, ""),
        Some(idx) => name.split_at(idx),
    }
}
