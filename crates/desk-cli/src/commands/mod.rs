//! Command implementations for desk-cli

pub mod arm;
pub mod control;
pub mod run;
pub mod status;

pub use arm::{close_brakes, disable_fci, enable_fci, home_gripper, open_brakes};
pub use control::{acquire, release};
pub use run::run;
pub use status::status;

use desk_client::CancellationToken;

/// Cancellation token that fires on the first Ctrl-C
pub fn ctrl_c_token() -> CancellationToken {
    let token = CancellationToken::new();
    let child = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            child.cancel();
        }
    });
    token
}
