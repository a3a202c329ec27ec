use crate::{
    commands::PendingCommand,
    config::Config,
    sync::SyncEvent,
    table::{ServiceRow, ServiceTable},
};
use chrono::{DateTime, Utc};
use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind};
use serveroute_core::{
    registry::{apply_event, EventOutcome, RegistryView, StatusStore},
    ControlCommand, ServiceStatus,
};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SnapshotState {
    Loading,
    Loaded,
    Failed,
}

/// Owns the registry and the rendered rows. All mutation happens through
/// `apply_sync_event`, one event at a time.
pub struct App {
    pub config: Config,
    command_tx: mpsc::Sender<PendingCommand>,
    registry: RegistryView,
    table: ServiceTable,
    pub snapshot: SnapshotState,
    pub connected: bool,
    pub disconnected_at: Option<DateTime<Utc>>,
    pub last_update_at: Option<DateTime<Utc>>,
    pub status_note: Option<String>,
    pub selected: usize,
    pub help_open: bool,
}

impl App {
    pub fn new(config: Config, command_tx: mpsc::Sender<PendingCommand>) -> Self {
        Self {
            config,
            command_tx,
            registry: RegistryView::new(),
            table: ServiceTable::default(),
            snapshot: SnapshotState::Loading,
            connected: false,
            disconnected_at: None,
            last_update_at: None,
            status_note: Some("loading services".to_string()),
            selected: 0,
            help_open: false,
        }
    }

    pub fn registry(&self) -> &RegistryView {
        &self.registry
    }

    pub fn table(&self) -> &ServiceTable {
        &self.table
    }

    pub fn selected_row(&self) -> Option<&ServiceRow> {
        self.table.rows().get(self.selected)
    }

    pub fn apply_sync_event(&mut self, event: SyncEvent) {
        match event {
            SyncEvent::Snapshot(listing) => {
                self.registry.replace_all(listing);
                self.table.render_all(&self.registry);
                self.snapshot = SnapshotState::Loaded;
                self.last_update_at = Some(Utc::now());
                self.clamp_selection();
                self.status_note = Some(format!("loaded {} services", self.registry.len()));
            }
            SyncEvent::SnapshotFailed(reason) => {
                self.snapshot = SnapshotState::Failed;
                self.status_note = Some(format!("service list unavailable: {reason}"));
            }
            SyncEvent::Connected => {
                self.connected = true;
                self.disconnected_at = None;
                self.status_note = Some("live updates connected".to_string());
            }
            SyncEvent::Disconnected(reason) => {
                if self.connected {
                    self.disconnected_at = Some(Utc::now());
                }
                self.connected = false;
                self.status_note = Some(format!("live updates reconnecting: {reason}"));
            }
            SyncEvent::StatusChange(change) => match apply_event(&mut self.registry, &change) {
                EventOutcome::Updated { status, previous } => {
                    self.table.patch_row(&change.service, &status);
                    self.last_update_at = Some(Utc::now());
                    info!(
                        event = "status_applied",
                        service = %change.service,
                        previous = %previous,
                        status = %status
                    );
                }
                EventOutcome::Unchanged => {
                    debug!(event = "status_unchanged", service = %change.service);
                }
                EventOutcome::UnknownService => {
                    debug!(event = "status_unknown_service", service = %change.service);
                }
                EventOutcome::UnknownKind => {
                    warn!(
                        event = "status_unknown_kind",
                        kind = %change.kind,
                        service = %change.service
                    );
                }
            },
            SyncEvent::CommandFailed {
                command,
                service,
                error,
            } => {
                self.status_note = Some(format!("{command} {service} failed: {error}"));
            }
        }
    }

    /// Queues the command bound to the selected row's trigger. The row is not
    /// touched; its status changes only when the event stream reports it.
    pub fn invoke_trigger(&mut self, command: ControlCommand) {
        let Some(pending) = self.table.trigger(self.selected, command) else {
            let note = self
                .selected_row()
                .map(|row| format!("{} is already {}", row.name, row.status));
            if note.is_some() {
                self.status_note = note;
            }
            return;
        };
        let note = format!("{} requested for {}", pending.command, pending.service);
        match self.command_tx.try_send(pending) {
            Ok(()) => self.status_note = Some(note),
            Err(TrySendError::Full(pending)) => {
                warn!(event = "command_queue_full", service = %pending.service);
                self.status_note = Some("command queue full; try again".to_string());
            }
            Err(TrySendError::Closed(_)) => {
                self.status_note = Some("command dispatcher stopped".to_string());
            }
        }
    }

    pub fn move_selection(&mut self, delta: isize) {
        if self.table.is_empty() {
            self.selected = 0;
            return;
        }
        let max = self.table.len() as isize - 1;
        self.selected = (self.selected as isize + delta).clamp(0, max) as usize;
    }

    fn clamp_selection(&mut self) {
        self.selected = self.selected.min(self.table.len().saturating_sub(1));
    }

    pub fn count_with(&self, status: &ServiceStatus) -> usize {
        self.registry.count_with(status)
    }
}

pub fn handle_input(event: Event, app: &mut App) -> bool {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key(key, app),
        _ => false,
    }
}

fn handle_key(key: KeyEvent, app: &mut App) -> bool {
    if matches!(key.code, KeyCode::Char('?') | KeyCode::F(1)) {
        app.help_open = !app.help_open;
        return false;
    }
    if key.code == KeyCode::Esc && app.help_open {
        app.help_open = false;
        return false;
    }
    if app.help_open {
        return false;
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => true,
        KeyCode::Down | KeyCode::Char('j') => {
            app.move_selection(1);
            false
        }
        KeyCode::Up | KeyCode::Char('k') => {
            app.move_selection(-1);
            false
        }
        KeyCode::Char('g') => {
            app.selected = 0;
            false
        }
        KeyCode::Char('G') => {
            app.move_selection(isize::MAX / 2);
            false
        }
        KeyCode::Char('s') => {
            app.invoke_trigger(ControlCommand::Start);
            false
        }
        KeyCode::Char('x') => {
            app.invoke_trigger(ControlCommand::Stop);
            false
        }
        _ => false,
    }
}
