use pm_core::{ConfigError, PanelId, PanelStatus};
use uuid::Uuid;

/// Recoverable failures of monitor operations. Every variant leaves the fleet unchanged.
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    #[error("panel {0} not found")]
    PanelNotFound(PanelId),
    #[error("alert {alert_id} not found on panel {panel_id}")]
    AlertNotFound { panel_id: PanelId, alert_id: Uuid },
    #[error("alert {alert_id} on panel {panel_id} is already resolved")]
    AlertAlreadyResolved { panel_id: PanelId, alert_id: Uuid },
    #[error("panel {0} is already registered")]
    DuplicatePanel(PanelId),
    #[error("panel {panel_id} cannot move from {from} to {to}")]
    InvalidTransition { panel_id: PanelId, from: PanelStatus, to: PanelStatus },
    #[error("start() needs a running tokio runtime")]
    NoRuntime,
    #[error(transparent)]
    Config(#[from] ConfigError),
}
