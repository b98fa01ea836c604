//! Seed fleets: panels with an elapsed production timeline relative to "now".

use chrono::{DateTime, Duration, Utc};

use pm_core::{Panel, PanelStatus, PanelType, StageHistoryEntry};

/// Builds a panel whose history walks through `stages`, each lasting the paired number of
/// hours, ending with the last stage still open at `now`.
pub fn panel_with_timeline(
    id: &str,
    panel_type: PanelType,
    project: &str,
    now: DateTime<Utc>,
    stages: &[(PanelStatus, i64)],
) -> Panel {
    let total: i64 = stages.iter().map(|(_, hours)| hours).sum();
    let created_at = now - Duration::hours(total);
    let mut panel = Panel::new(id, panel_type, PanelStatus::Preparing, project, created_at);
    panel.stage_history.clear();

    let mut cursor = created_at;
    for (index, (stage, hours)) in stages.iter().enumerate() {
        if index + 1 == stages.len() {
            panel.stage_history.push(StageHistoryEntry::open(*stage, cursor));
            panel.current_status = *stage;
        } else {
            let end = cursor + Duration::hours(*hours);
            panel.stage_history.push(StageHistoryEntry::closed(*stage, cursor, end));
            cursor = end;
        }
    }
    panel
}

/// The three-panel demonstration fleet: PL001 curing, PL002 being demolded, PL003 in QC.
pub fn seed_fleet(now: DateTime<Utc>) -> Vec<Panel> {
    let mut pl001 = panel_with_timeline(
        "PL001",
        PanelType::ExteriorWall,
        "PRJ-001",
        now,
        &[(PanelStatus::Preparing, 4), (PanelStatus::Curing, 10)],
    );
    pl001.stage_history[0].notes = Some("Armadura conferida".to_string());

    let pl002 = panel_with_timeline(
        "PL002",
        PanelType::Facade,
        "PRJ-001",
        now,
        &[
            (PanelStatus::Preparing, 3),
            (PanelStatus::Curing, 18),
            (PanelStatus::AwaitingDemolding, 2),
            (PanelStatus::Demolding, 1),
        ],
    );

    let pl003 = panel_with_timeline(
        "PL003",
        PanelType::Slab,
        "PRJ-002",
        now,
        &[
            (PanelStatus::Preparing, 5),
            (PanelStatus::Curing, 24),
            (PanelStatus::AwaitingDemolding, 4),
            (PanelStatus::Demolding, 2),
            (PanelStatus::QualityControl, 1),
        ],
    );

    vec![pl001, pl002, pl003]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_fleet_has_three_consistent_panels() {
        let now = Utc::now();
        let fleet = seed_fleet(now);
        let ids: Vec<_> = fleet.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["PL001", "PL002", "PL003"]);

        for panel in &fleet {
            panel.check_history().unwrap();
            let open = panel.current_stage().expect("every seed panel has an open stage");
            assert_eq!(open.stage, panel.current_status);
            assert!(open.start <= now);
            assert!(panel.alerts.is_empty());
            assert!(panel.last_reading.is_none());
        }
        assert_eq!(fleet[0].current_status, PanelStatus::Curing);
        assert_eq!(fleet[1].current_status, PanelStatus::Demolding);
        assert_eq!(fleet[2].current_status, PanelStatus::QualityControl);
    }

    #[test]
    fn timeline_entries_are_contiguous() {
        let now = Utc::now();
        let panel = panel_with_timeline(
            "PLX",
            PanelType::Partition,
            "PRJ",
            now,
            &[(PanelStatus::Preparing, 2), (PanelStatus::Curing, 3), (PanelStatus::Demolding, 1)],
        );
        assert_eq!(panel.created_at, now - Duration::hours(6));
        for pair in panel.stage_history.windows(2) {
            assert_eq!(pair[0].end, Some(pair[1].start));
        }
        assert_eq!(panel.stage_history[2].start, now - Duration::hours(1));
    }
}
