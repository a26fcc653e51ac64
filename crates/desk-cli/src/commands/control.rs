//! Control authority commands - acquire and release

use anyhow::Result;
use desk_client::DeskHandler;

use super::ctrl_c_token;
use crate::output::OutputContext;

/// Acquire control authority
///
/// With `hold`, keeps the authority until Ctrl-C and then releases it.
pub async fn acquire(
    handler: &DeskHandler,
    force: bool,
    hold: bool,
    ctx: &OutputContext,
) -> Result<bool> {
    let cancel = ctrl_c_token();

    if force {
        ctx.info("Waiting for the confirmation button on the arm (Ctrl-C to abort)...");
    }

    let outcome = handler.acquire_control_with_cancel(force, &cancel).await;
    if !ctx.outcome(&outcome) || !hold {
        return Ok(outcome.success);
    }

    ctx.info("Holding control authority, press Ctrl-C to release");
    cancel.cancelled().await;

    Ok(ctx.outcome(&handler.release_control().await))
}

/// Release control authority held by this session
pub async fn release(handler: &DeskHandler, ctx: &OutputContext) -> Result<bool> {
    Ok(ctx.outcome(&handler.release_control().await))
}
