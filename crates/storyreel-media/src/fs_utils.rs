//! Moving rendered output out of the per-run temp directory.
//!
//! The temp root and the output directory are often on different
//! filesystems (tmpfs vs. a mounted volume), so a plain rename can fail
//! with EXDEV.

use std::path::Path;

use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// EXDEV on Linux and macOS.
const EXDEV: i32 = 18;

/// Move `src` to `dst`, replacing `dst` and creating its parent directory.
///
/// Falls back to copy-then-delete across filesystems. The copy lands in a
/// sibling `.partial` file first so `dst` never holds a truncated video.
pub async fn move_file(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<()> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if let Some(parent) = dst.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await?;
    }

    match fs::rename(src, dst).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(EXDEV) => {
            debug!(
                src = %src.display(),
                dst = %dst.display(),
                "Cross-device rename, copying instead"
            );
            copy_across_devices(src, dst).await
        }
        Err(e) => Err(e.into()),
    }
}

async fn copy_across_devices(src: &Path, dst: &Path) -> MediaResult<()> {
    let partial = dst.with_extension("partial");

    if let Err(e) = fs::copy(src, &partial).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    if let Err(e) = fs::rename(&partial, dst).await {
        let _ = fs::remove_file(&partial).await;
        return Err(e.into());
    }

    // The source lives in a temp dir that is removed anyway.
    if let Err(e) = fs::remove_file(src).await {
        warn!(src = %src.display(), "Failed to remove source after copy: {}", e);
    }

    Ok(())
}
