//! Arm commands - brakes, gripper and FCI

use anyhow::Result;
use desk_client::DeskHandler;

use crate::output::OutputContext;

pub async fn open_brakes(handler: &DeskHandler, ctx: &OutputContext) -> Result<bool> {
    let outcome = handler.open_brakes().await;
    if outcome.success {
        ctx.warn("Brakes are open, approach the robot with caution");
    }
    Ok(ctx.outcome(&outcome))
}

pub async fn close_brakes(handler: &DeskHandler, ctx: &OutputContext) -> Result<bool> {
    Ok(ctx.outcome(&handler.close_brakes().await))
}

pub async fn home_gripper(handler: &DeskHandler, ctx: &OutputContext) -> Result<bool> {
    Ok(ctx.outcome(&handler.home_gripper().await))
}

pub async fn enable_fci(handler: &DeskHandler, ctx: &OutputContext) -> Result<bool> {
    Ok(ctx.outcome(&handler.enable_fci().await))
}

pub async fn disable_fci(handler: &DeskHandler, ctx: &OutputContext) -> Result<bool> {
    Ok(ctx.outcome(&handler.disable_fci().await))
}
