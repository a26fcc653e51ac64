//! Run command - startup sequence, wait for Ctrl-C, teardown sequence

use anyhow::Result;
use desk_client::{DeskHandler, StartupOptions};
use tracing::error;

use super::ctrl_c_token;
use crate::output::OutputContext;

/// Drive the arm through startup, then tear down once interrupted
///
/// Returns false when startup or any teardown step failed.
pub async fn run(
    handler: &DeskHandler,
    options: &StartupOptions,
    ctx: &OutputContext,
) -> Result<bool> {
    let cancel = ctrl_c_token();

    let started = match handler.startup(options, &cancel).await {
        Ok(()) => {
            ctx.info("Arm ready, press Ctrl-C to shut down");
            cancel.cancelled().await;
            true
        }
        Err(e) if cancel.is_cancelled() => {
            ctx.warn(&format!("Startup interrupted: {}", e));
            false
        }
        Err(e) => {
            error!("Startup failed: {}", e);
            ctx.warn(&format!("Startup failed: {}", e));
            false
        }
    };

    ctx.info("Shutting down...");
    let report = handler.shutdown().await;
    ctx.teardown(&report);

    Ok(started && report.all_succeeded())
}
