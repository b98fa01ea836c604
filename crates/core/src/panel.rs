use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::alert::Alert;
use crate::sensor::SensorReading;
use crate::{CoreError, OperatorId, PanelId, ProjectId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum PanelType {
    #[serde(rename = "Parede Interna")]
    InteriorWall,
    #[serde(rename = "Parede Externa")]
    ExteriorWall,
    #[serde(rename = "Fachada")]
    Facade,
    #[serde(rename = "Divisória")]
    Partition,
    #[serde(rename = "Laje")]
    Slab,
}

impl PanelType {
    pub fn label(self) -> &'static str {
        match self {
            PanelType::InteriorWall => "Parede Interna",
            PanelType::ExteriorWall => "Parede Externa",
            PanelType::Facade => "Fachada",
            PanelType::Partition => "Divisória",
            PanelType::Slab => "Laje",
        }
    }
}

/// Production status of a panel.
///
/// The intended flow is
/// `Preparing → Curing → AwaitingDemolding → Demolding → QualityControl`, then either
/// `Approved → Storing → Transporting → Installed` or `Rejected`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PanelStatus {
    #[serde(rename = "Preparação")]
    Preparing,
    #[serde(rename = "Em Cura")]
    Curing,
    #[serde(rename = "Aguardando Desforma")]
    AwaitingDemolding,
    #[serde(rename = "Desforma")]
    Demolding,
    #[serde(rename = "Controle de Qualidade")]
    QualityControl,
    #[serde(rename = "Aprovado")]
    Approved,
    #[serde(rename = "Rejeitado")]
    Rejected,
    #[serde(rename = "Armazenado")]
    Storing,
    #[serde(rename = "Em Transporte")]
    Transporting,
    #[serde(rename = "Instalado")]
    Installed,
}

impl PanelStatus {
    pub const ALL: [PanelStatus; 10] = [
        PanelStatus::Preparing,
        PanelStatus::Curing,
        PanelStatus::AwaitingDemolding,
        PanelStatus::Demolding,
        PanelStatus::QualityControl,
        PanelStatus::Approved,
        PanelStatus::Rejected,
        PanelStatus::Storing,
        PanelStatus::Transporting,
        PanelStatus::Installed,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PanelStatus::Preparing => "Preparação",
            PanelStatus::Curing => "Em Cura",
            PanelStatus::AwaitingDemolding => "Aguardando Desforma",
            PanelStatus::Demolding => "Desforma",
            PanelStatus::QualityControl => "Controle de Qualidade",
            PanelStatus::Approved => "Aprovado",
            PanelStatus::Rejected => "Rejeitado",
            PanelStatus::Storing => "Armazenado",
            PanelStatus::Transporting => "Em Transporte",
            PanelStatus::Installed => "Instalado",
        }
    }

    fn ident(self) -> &'static str {
        match self {
            PanelStatus::Preparing => "preparing",
            PanelStatus::Curing => "curing",
            PanelStatus::AwaitingDemolding => "awaiting_demolding",
            PanelStatus::Demolding => "demolding",
            PanelStatus::QualityControl => "quality_control",
            PanelStatus::Approved => "approved",
            PanelStatus::Rejected => "rejected",
            PanelStatus::Storing => "storing",
            PanelStatus::Transporting => "transporting",
            PanelStatus::Installed => "installed",
        }
    }

    /// Statuses reachable from `self` along the forward production flow.
    pub fn next_stages(self) -> &'static [PanelStatus] {
        match self {
            PanelStatus::Preparing => &[PanelStatus::Curing],
            PanelStatus::Curing => &[PanelStatus::AwaitingDemolding],
            PanelStatus::AwaitingDemolding => &[PanelStatus::Demolding],
            PanelStatus::Demolding => &[PanelStatus::QualityControl],
            PanelStatus::QualityControl => &[PanelStatus::Approved, PanelStatus::Rejected],
            PanelStatus::Approved => &[PanelStatus::Storing],
            PanelStatus::Storing => &[PanelStatus::Transporting],
            PanelStatus::Transporting => &[PanelStatus::Installed],
            PanelStatus::Rejected | PanelStatus::Installed => &[],
        }
    }

    pub fn can_transition_to(self, next: PanelStatus) -> bool {
        self.next_stages().contains(&next)
    }

    pub fn is_final(self) -> bool {
        self.next_stages().is_empty()
    }
}

impl fmt::Display for PanelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for PanelStatus {
    type Err = CoreError;

    /// Accepts either the display label (`"Em Cura"`) or the snake_case name (`"curing"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        PanelStatus::ALL
            .into_iter()
            .find(|status| {
                status.label().eq_ignore_ascii_case(trimmed)
                    || status.ident().eq_ignore_ascii_case(trimmed)
            })
            .ok_or_else(|| CoreError::UnknownStatus(trimmed.to_string()))
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum StageState {
    #[serde(rename = "Em Andamento")]
    InProgress,
    #[serde(rename = "Concluído")]
    Completed,
    #[serde(rename = "Interrompido")]
    Interrupted,
}

impl StageState {
    pub fn label(self) -> &'static str {
        match self {
            StageState::InProgress => "Em Andamento",
            StageState::Completed => "Concluído",
            StageState::Interrupted => "Interrompido",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, StageState::InProgress)
    }
}

/// One production-status interval. `end` is set exactly when `status` is terminal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageHistoryEntry {
    pub stage: PanelStatus,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub status: StageState,
    pub notes: Option<String>,
    pub operator: Option<OperatorId>,
}

impl StageHistoryEntry {
    pub fn open(stage: PanelStatus, start: DateTime<Utc>) -> Self {
        Self {
            stage,
            start,
            end: None,
            status: StageState::InProgress,
            notes: None,
            operator: None,
        }
    }

    pub fn closed(stage: PanelStatus, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self {
            stage,
            start,
            end: Some(end),
            status: StageState::Completed,
            notes: None,
            operator: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == StageState::InProgress
    }

    pub fn duration(&self, now: DateTime<Utc>) -> Duration {
        self.end.unwrap_or(now) - self.start
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Panel {
    pub id: PanelId,
    pub qr_code: String,
    pub nfc_id: String,
    #[serde(rename = "type")]
    pub panel_type: PanelType,
    pub current_status: PanelStatus,
    pub created_at: DateTime<Utc>,
    pub origin_project_id: ProjectId,
    pub stage_history: Vec<StageHistoryEntry>,
    pub last_reading: Option<SensorReading>,
    pub alerts: Vec<Alert>,
}

impl Panel {
    /// A freshly registered panel, with one open entry for `status` starting at `created_at`.
    pub fn new(
        id: impl Into<PanelId>,
        panel_type: PanelType,
        status: PanelStatus,
        origin_project_id: impl Into<ProjectId>,
        created_at: DateTime<Utc>,
    ) -> Self {
        let id = id.into();
        Self {
            qr_code: format!("QR-{id}"),
            nfc_id: format!("NFC-{id}"),
            id,
            panel_type,
            current_status: status,
            created_at,
            origin_project_id: origin_project_id.into(),
            stage_history: vec![StageHistoryEntry::open(status, created_at)],
            last_reading: None,
            alerts: Vec::new(),
        }
    }

    pub fn current_stage(&self) -> Option<&StageHistoryEntry> {
        self.stage_history.iter().rev().find(|entry| entry.is_open())
    }

    /// Closes the open entry (if any) and opens a new one for `status`.
    pub fn advance_to(&mut self, status: PanelStatus, notes: Option<&str>, at: DateTime<Utc>) {
        if let Some(open) = self.stage_history.iter_mut().rev().find(|entry| entry.is_open()) {
            open.end = Some(at);
            open.status = StageState::Completed;
            if let Some(notes) = notes {
                open.notes = Some(notes.to_string());
            }
        }
        self.stage_history.push(StageHistoryEntry::open(status, at));
        self.current_status = status;
    }

    pub fn time_in_current_stage(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.current_stage().map(|entry| entry.duration(now))
    }

    pub fn unresolved_alerts(&self) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(|alert| !alert.resolved)
    }

    pub fn alert_mut(&mut self, alert_id: uuid::Uuid) -> Option<&mut Alert> {
        self.alerts.iter_mut().find(|alert| alert.id == alert_id)
    }

    /// Validates the stage history: one open entry at most, `end` set iff terminal.
    pub fn check_history(&self) -> Result<(), CoreError> {
        let open = self.stage_history.iter().filter(|e| e.is_open()).count();
        if open > 1 {
            return Err(CoreError::MultipleOpenStages { panel_id: self.id.clone(), open });
        }
        for (index, entry) in self.stage_history.iter().enumerate() {
            if entry.end.is_some() != entry.status.is_terminal() {
                return Err(CoreError::InconsistentStageEnd { panel_id: self.id.clone(), index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn panel() -> Panel {
        let created = Utc::now() - Duration::hours(10);
        Panel::new("PL900", PanelType::Slab, PanelStatus::Curing, "PRJ-1", created)
    }

    #[test]
    fn status_parses_labels_and_idents() {
        assert_eq!("Em Cura".parse::<PanelStatus>().unwrap(), PanelStatus::Curing);
        assert_eq!("quality_control".parse::<PanelStatus>().unwrap(), PanelStatus::QualityControl);
        assert_eq!(" aprovado ".parse::<PanelStatus>().unwrap(), PanelStatus::Approved);
        assert!("Quebrado".parse::<PanelStatus>().is_err());
    }

    #[test]
    fn status_serializes_as_label() {
        let json = serde_json::to_string(&PanelStatus::AwaitingDemolding).unwrap();
        assert_eq!(json, "\"Aguardando Desforma\"");
        let state = serde_json::to_string(&StageState::Completed).unwrap();
        assert_eq!(state, "\"Concluído\"");
    }

    #[test]
    fn forward_flow_branches_at_quality_control() {
        assert!(PanelStatus::QualityControl.can_transition_to(PanelStatus::Approved));
        assert!(PanelStatus::QualityControl.can_transition_to(PanelStatus::Rejected));
        assert!(!PanelStatus::Curing.can_transition_to(PanelStatus::Installed));
        assert!(PanelStatus::Installed.is_final());
        assert!(PanelStatus::Rejected.is_final());
    }

    #[test]
    fn advance_closes_open_entry_and_opens_new_one() {
        let mut p = panel();
        let at = Utc::now();
        p.advance_to(PanelStatus::AwaitingDemolding, Some("cura ok"), at);

        assert_eq!(p.stage_history.len(), 2);
        let closed = &p.stage_history[0];
        assert_eq!(closed.status, StageState::Completed);
        assert_eq!(closed.end, Some(at));
        assert_eq!(closed.notes.as_deref(), Some("cura ok"));

        let open = p.current_stage().unwrap();
        assert_eq!(open.stage, PanelStatus::AwaitingDemolding);
        assert_eq!(open.start, at);
        assert_eq!(p.current_status, PanelStatus::AwaitingDemolding);
        p.check_history().unwrap();
    }

    #[test]
    fn advance_without_open_entry_only_appends() {
        let mut p = panel();
        p.stage_history.clear();
        p.advance_to(PanelStatus::Demolding, None, Utc::now());
        assert_eq!(p.stage_history.len(), 1);
        assert!(p.stage_history[0].is_open());
    }

    #[test]
    fn check_history_flags_two_open_entries() {
        let mut p = panel();
        p.stage_history.push(StageHistoryEntry::open(PanelStatus::Demolding, Utc::now()));
        assert!(matches!(
            p.check_history(),
            Err(CoreError::MultipleOpenStages { open: 2, .. })
        ));
    }

    #[test]
    fn check_history_flags_end_on_open_entry() {
        let mut p = panel();
        p.stage_history[0].end = Some(Utc::now());
        assert!(matches!(
            p.check_history(),
            Err(CoreError::InconsistentStageEnd { index: 0, .. })
        ));
    }

    #[test]
    fn time_in_current_stage_counts_from_open_start() {
        let p = panel();
        let elapsed = p.time_in_current_stage(p.created_at + Duration::hours(3)).unwrap();
        assert_eq!(elapsed, Duration::hours(3));
    }
}
