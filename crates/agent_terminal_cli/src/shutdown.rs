//! Exit sequencing for the event sink.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

/// How long the sink may keep printing queued events after the loop exits.
pub const SINK_GRACE: Duration = Duration::from_millis(250);

/// Lets the sink finish printing what is queued, then stops it.
///
/// The sink ends on its own once every sender is gone. An interrupted reader
/// that never sees its stream close keeps a sender alive, so the wait is
/// bounded by `grace`. Returns true when the sink ended on its own.
pub async fn settle_sink(mut sink: JoinHandle<()>, grace: Duration) -> bool {
    match tokio::time::timeout(grace, &mut sink).await {
        Ok(_) => true,
        Err(_) => {
            debug!("event sink still open after the grace period");
            sink.abort();
            false
        }
    }
}
