//! TUI application state and logic.

use tokio::sync::mpsc;
use tracing::debug;

use crate::session::{Command, Dashboard};

/// Current view being displayed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    /// Install queue with progress bars.
    Queue {
        /// Selected row in the queue
        selected: usize,
    },
    /// Package catalog loaded from the startup query.
    Catalog {
        /// Selected package
        selected: usize,
    },
    /// Single job detail view with its log tail.
    Detail {
        /// Job ID being viewed
        job_id: String,
        /// Lines scrolled up from the newest log line
        scroll: u16,
    },
}

impl Default for View {
    fn default() -> Self {
        View::Queue { selected: 0 }
    }
}

/// Actions that can be triggered by user input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Quit,
    Up,
    Down,
    SwitchPane,
    Select,
    Back,
    Refresh,
    Dismiss,
}

/// Main TUI application state.
pub struct TuiApp {
    commands: mpsc::Sender<Command>,
    pub view: View,
    pub data: Dashboard,
    pub running: bool,
}

impl TuiApp {
    pub fn new(commands: mpsc::Sender<Command>) -> Self {
        Self {
            commands,
            view: View::default(),
            data: Dashboard::default(),
            running: true,
        }
    }

    /// Take a newly published dashboard, keeping the selection in range.
    pub fn update(&mut self, data: Dashboard) {
        self.data = data;
        match &mut self.view {
            View::Queue { selected } => {
                *selected = (*selected).min(self.data.queue.jobs.len().saturating_sub(1));
            }
            View::Catalog { selected } => {
                *selected = (*selected).min(self.data.catalog.len().saturating_sub(1));
            }
            View::Detail { .. } => {}
        }
    }

    /// Handle an action and update state accordingly.
    pub fn handle_action(&mut self, action: Action) {
        match action {
            Action::Quit => {
                self.send(Command::Shutdown);
                self.running = false;
            }
            Action::Refresh => self.send(Command::Refresh),
            Action::Dismiss => self.send(Command::DismissNotice),
            Action::SwitchPane => {
                self.view = match self.view {
                    View::Queue { .. } => View::Catalog { selected: 0 },
                    View::Catalog { .. } | View::Detail { .. } => View::Queue { selected: 0 },
                };
            }
            Action::Back => {
                if matches!(self.view, View::Detail { .. }) {
                    self.view = View::Queue { selected: 0 };
                }
            }
            Action::Up => self.navigate_up(),
            Action::Down => self.navigate_down(),
            Action::Select => self.select_item(),
        }
    }

    fn send(&self, command: Command) {
        if self.commands.try_send(command).is_err() {
            debug!("Session busy or stopped; dropping command");
        }
    }

    fn navigate_up(&mut self) {
        match &mut self.view {
            View::Queue { selected } | View::Catalog { selected } => {
                *selected = selected.saturating_sub(1);
            }
            View::Detail { scroll, .. } => *scroll = scroll.saturating_add(1),
        }
    }

    fn navigate_down(&mut self) {
        match &mut self.view {
            View::Queue { selected } => {
                if *selected + 1 < self.data.queue.jobs.len() {
                    *selected += 1;
                }
            }
            View::Catalog { selected } => {
                if *selected + 1 < self.data.catalog.len() {
                    *selected += 1;
                }
            }
            View::Detail { scroll, .. } => *scroll = scroll.saturating_sub(1),
        }
    }

    fn select_item(&mut self) {
        match &self.view {
            View::Queue { selected } => {
                if let Some(job) = self.data.queue.jobs.get(*selected) {
                    self.view = View::Detail {
                        job_id: job.job_id.clone(),
                        scroll: 0,
                    };
                }
            }
            View::Catalog { selected } => {
                if let Some(row) = self.data.catalog.get(*selected) {
                    self.send(Command::Enqueue(row.name.clone()));
                    self.view = View::Queue { selected: 0 };
                }
            }
            View::Detail { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::projector::{CatalogRow, JobRow};

    fn row(id: &str) -> JobRow {
        JobRow {
            job_id: id.to_string(),
            package: format!("pkg-{id}"),
            status: "running".to_string(),
            terminal: false,
            progress: None,
            exit_code: None,
            last_updated: 0.0,
            log: vec![],
            log_len: 0,
        }
    }

    fn app_with_data() -> (TuiApp, mpsc::Receiver<Command>) {
        let (tx, rx) = mpsc::channel(8);
        let mut app = TuiApp::new(tx);
        let mut data = Dashboard::default();
        data.queue.jobs = vec![row("1"), row("2")];
        data.catalog = vec![CatalogRow {
            name: "htop".to_string(),
            label: "htop 3.3".to_string(),
        }];
        app.update(data);
        (app, rx)
    }

    #[test]
    fn test_navigation_stays_in_bounds() {
        let (mut app, _rx) = app_with_data();
        app.handle_action(Action::Up);
        assert_eq!(app.view, View::Queue { selected: 0 });
        app.handle_action(Action::Down);
        app.handle_action(Action::Down);
        assert_eq!(app.view, View::Queue { selected: 1 });
    }

    #[test]
    fn test_enter_opens_job_detail() {
        let (mut app, _rx) = app_with_data();
        app.handle_action(Action::Down);
        app.handle_action(Action::Select);
        assert_eq!(
            app.view,
            View::Detail {
                job_id: "2".to_string(),
                scroll: 0
            }
        );
        app.handle_action(Action::Back);
        assert_eq!(app.view, View::Queue { selected: 0 });
    }

    #[test]
    fn test_enter_on_catalog_installs() {
        let (mut app, mut rx) = app_with_data();
        app.handle_action(Action::SwitchPane);
        app.handle_action(Action::Select);
        assert_eq!(rx.try_recv().unwrap(), Command::Enqueue("htop".to_string()));
        assert_eq!(app.view, View::Queue { selected: 0 });
    }

    #[test]
    fn test_selection_clamped_when_queue_shrinks() {
        let (mut app, _rx) = app_with_data();
        app.handle_action(Action::Down);
        let mut data = app.data.clone();
        data.queue.jobs.truncate(1);
        app.update(data);
        assert_eq!(app.view, View::Queue { selected: 0 });
    }

    #[test]
    fn test_detail_scroll_saturates() {
        let (mut app, _rx) = app_with_data();
        app.view = View::Detail {
            job_id: "1".to_string(),
            scroll: u16::MAX,
        };
        app.handle_action(Action::Up);
        assert_eq!(
            app.view,
            View::Detail {
                job_id: "1".to_string(),
                scroll: u16::MAX
            }
        );
    }

    #[test]
    fn test_quit_shuts_down_session() {
        let (mut app, mut rx) = app_with_data();
        app.handle_action(Action::Refresh);
        app.handle_action(Action::Dismiss);
        app.handle_action(Action::Quit);
        assert!(!app.running);
        assert_eq!(rx.try_recv().unwrap(), Command::Refresh);
        assert_eq!(rx.try_recv().unwrap(), Command::DismissNotice);
        assert_eq!(rx.try_recv().unwrap(), Command::Shutdown);
    }
}
