//! Built-in runner functions.

use crate::{App, AppExit};

/// The standard runner: one startup pass, then the main loop until an
/// [`AppExit`] event is observed between frames, then the exit orders.
pub fn loop_runner(mut app: App) -> AppExit {
    app.startup();
    loop {
        app.update();
        if let Some(exit) = app.should_exit() {
            log::info!("exiting app: {exit:?}");
            app.exit();
            return exit;
        }
    }
}

/// Runs startup, a single frame, and the exit orders. Useful for tools and
/// tests driving the app themselves.
pub fn run_once_runner(mut app: App) -> AppExit {
    app.startup();
    app.update();
    app.exit();
    app.should_exit().unwrap_or(AppExit::Success)
}
