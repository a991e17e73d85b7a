use tracing::warn;

use crate::domain::ports::SnapshotStore;
use crate::domain::product::ProductRecord;

pub mod git;
pub mod local;
pub mod realtime;
pub mod remote;

pub use git::GitFileBackend;
pub use local::LocalBackend;
pub use realtime::RealtimeBackend;
pub use remote::RemoteDocumentBackend;

/// Copy `records` into the local snapshot. `false` when the write failed.
pub(crate) async fn mirror_local(
    local: &dyn SnapshotStore,
    records: &[ProductRecord],
    backend: &'static str,
) -> bool {
    match local.save(records).await {
        Ok(()) => true,
        Err(e) => {
            warn!(backend, error = %format!("{e:#}"), "local snapshot write failed");
            false
        }
    }
}
