//! Interactive TUI for debease.
//!
//! Shows the live install queue, the package catalog, and per-job logs. All
//! state comes from a running [`Session`](crate::session::Session); the TUI
//! only renders dashboards and sends commands back.

mod app;
mod input;
mod ui;

use std::io::{self, stdout};

use anyhow::{Context, Result};
use crossterm::{
    event::EventStream,
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use futures_util::StreamExt;
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::watch;

use crate::context::AppContext;
use crate::session::{Command, Dashboard};
use app::TuiApp;

/// Run the TUI against the configured backend.
pub async fn run(ctx: &AppContext, query: Option<String>) -> Result<()> {
    let (session, handle) = ctx.session()?;
    let session_task = tokio::spawn(session.run());
    handle.send(Command::Search(query)).await;

    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut app = TuiApp::new(handle.commands());
    let result = run_app(&mut terminal, &mut app, handle.dashboard()).await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    handle.send(Command::Shutdown).await;
    drop(handle);
    session_task.await.context("Session task panicked")?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
    mut dashboard: watch::Receiver<Dashboard>,
) -> Result<()> {
    let mut events = EventStream::new();
    app.update(dashboard.borrow_and_update().clone());

    while app.running {
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    if let Some(action) = input::handle_event(event) {
                        app.handle_action(action);
                    }
                }
                Some(Err(e)) => return Err(e).context("Failed to read terminal input"),
                None => break,
            },
            changed = dashboard.changed() => {
                if changed.is_err() {
                    // Session stopped underneath us
                    break;
                }
                app.update(dashboard.borrow_and_update().clone());
            }
        }
    }

    Ok(())
}
