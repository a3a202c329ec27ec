use crate::{api::ControlApi, sync::SyncEvent};
use serveroute_core::ControlCommand;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub const COMMAND_QUEUE_CAPACITY: usize = 64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingCommand {
    pub command: ControlCommand,
    pub service: String,
}

/// Drains queued start/stop commands. Each one is dispatched on its own task
/// so a slow start never holds up later commands.
pub async fn command_loop(
    api: ControlApi,
    mut command_rx: mpsc::Receiver<PendingCommand>,
    tx: mpsc::Sender<SyncEvent>,
) {
    while let Some(pending) = command_rx.recv().await {
        let api = api.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            dispatch(&api, pending, &tx).await;
        });
    }
}

async fn dispatch(api: &ControlApi, pending: PendingCommand, tx: &mpsc::Sender<SyncEvent>) {
    info!(event = "command_sent", command = %pending.command, service = %pending.service);
    if let Err(err) = api.send_command(pending.command, &pending.service).await {
        warn!(
            event = "command_error",
            command = %pending.command,
            service = %pending.service,
            error = %err
        );
        let _ = tx
            .send(SyncEvent::CommandFailed {
                command: pending.command,
                service: pending.service,
                error: err.to_string(),
            })
            .await;
    }
}
