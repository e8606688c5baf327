use std::{sync::Arc, time::Duration};

use tokio::time::{Instant, interval_at};

use crate::{storage::SessionCollection, utils::utc_now};

/// Deletes expired records every `every`, starting one period from now.
pub(crate) async fn sweep_task<C: SessionCollection>(collection: Arc<C>, every: Duration) {
    let mut interval = interval_at(Instant::now() + every, every);
    loop {
        interval.tick().await;
        match collection.delete_expired(utc_now()).await {
            Ok(0) => {}
            Ok(deleted) => tracing::debug!(deleted, "removed expired sessions"),
            Err(e) => tracing::warn!("failed to remove expired sessions: {e}"),
        }
    }
}
