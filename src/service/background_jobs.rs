// service/background_jobs.rs
use std::sync::Arc;

use chrono::Utc;
use tokio::time::{interval, Duration};

use crate::AppState;

/// Hourly sweep that completes delivered orders the client never closed.
pub async fn start_auto_completion_job(app_state: Arc<AppState>) {
    let after_days = app_state.env.auto_complete_after_days;
    if after_days <= 0 {
        tracing::info!("Auto-completion job disabled");
        return;
    }

    let mut interval = interval(Duration::from_secs(3600));

    loop {
        interval.tick().await;

        tracing::info!("Running auto-completion job at {}", Utc::now());

        match app_state
            .order_service
            .auto_complete_stale_orders(after_days)
            .await
        {
            Ok(count) => tracing::info!("Auto-completion job completed: {} orders closed", count),
            Err(e) => tracing::error!("Auto-completion job failed: {}", e),
        }
    }
}
