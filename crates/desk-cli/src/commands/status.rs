//! Status command - session and control authority overview

use anyhow::Result;
use desk_client::DeskHandler;

use crate::output::OutputContext;

/// Show session details and whether this client may command the arm
pub async fn status(handler: &DeskHandler, ctx: &OutputContext) -> Result<bool> {
    let connector = handler.connector();
    let can_control = connector.authority().can_control().await.ok();

    ctx.status(
        &connector.session().session(),
        connector.authority().state().name(),
        can_control,
    );
    Ok(true)
}
