use davfs_core::{FsError, FsResult};
use tokio_util::sync::CancellationToken;

/// Checked before and after each backend round trip, so a cancellation that
/// fires mid-operation is observed rather than silently ignored.
pub fn check_cancelled(ctx: &CancellationToken) -> FsResult<()> {
    if ctx.is_cancelled() {
        Err(FsError::Cancelled)
    } else {
        Ok(())
    }
}
