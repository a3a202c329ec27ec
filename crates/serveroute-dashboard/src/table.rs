use crate::commands::PendingCommand;
use serveroute_core::{registry::RegistryView, ControlCommand, ServiceEntry, ServiceStatus};
use std::collections::HashMap;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ServiceRow {
    pub name: String,
    pub status: ServiceStatus,
    pub subdomain: Option<String>,
    pub start_enabled: bool,
    pub stop_enabled: bool,
}

impl ServiceRow {
    fn new(name: &str, entry: &ServiceEntry) -> Self {
        let mut row = Self {
            name: name.to_string(),
            status: entry.status.clone(),
            subdomain: entry.subdomain.clone(),
            start_enabled: false,
            stop_enabled: false,
        };
        row.set_status(entry.status.clone());
        row
    }

    fn set_status(&mut self, status: ServiceStatus) {
        self.start_enabled = !status.satisfies(ControlCommand::Start);
        self.stop_enabled = !status.satisfies(ControlCommand::Stop);
        self.status = status;
    }

    pub fn trigger_enabled(&self, command: ControlCommand) -> bool {
        match command {
            ControlCommand::Start => self.start_enabled,
            ControlCommand::Stop => self.stop_enabled,
        }
    }
}

/// Rendered rows of the registry, one per service, addressable by name.
#[derive(Debug, Default)]
pub struct ServiceTable {
    rows: Vec<ServiceRow>,
    index: HashMap<String, usize>,
}

impl ServiceTable {
    pub fn render_all(&mut self, registry: &RegistryView) {
        self.rows.clear();
        self.index.clear();
        for (name, entry) in registry.iter() {
            self.index.insert(name.clone(), self.rows.len());
            self.rows.push(ServiceRow::new(name, entry));
        }
    }

    /// Updates one row in place. Names without a row are ignored.
    pub fn patch_row(&mut self, name: &str, status: &ServiceStatus) -> bool {
        let Some(&idx) = self.index.get(name) else {
            return false;
        };
        self.rows[idx].set_status(status.clone());
        true
    }

    pub fn rows(&self) -> &[ServiceRow] {
        &self.rows
    }

    pub fn row(&self, name: &str) -> Option<&ServiceRow> {
        self.index.get(name).map(|idx| &self.rows[*idx])
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Command bound to a row's trigger, if that trigger is enabled.
    pub fn trigger(&self, idx: usize, command: ControlCommand) -> Option<PendingCommand> {
        let row = self.rows.get(idx)?;
        if !row.trigger_enabled(command) {
            return None;
        }
        Some(PendingCommand {
            command,
            service: row.name.clone(),
        })
    }
}
