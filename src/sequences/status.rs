//! Read-only player status report: HUD alerts and which status bars are
//! on screen. Bar fill levels are not measured.
use std::collections::BTreeMap;

use serde::Serialize;

use crate::perception::locator::ElementLocator;
use crate::perception::types::DetectionRecord;

const ALERTS: [(&str, &str); 3] = [
    ("starvation_alert", "starvation"),
    ("dehydration_alert", "dehydration"),
    ("overweight_alert", "overweight"),
];

const BARS: [&str; 5] = ["health", "stamina", "food", "water", "weight"];

#[derive(Debug, Clone, Default, Serialize)]
pub struct PlayerStatus {
    pub warnings: Vec<&'static str>,
    /// Bar name (`health`, `food`, ...) to its detection, if visible.
    pub bars: BTreeMap<&'static str, Option<DetectionRecord>>,
}

impl PlayerStatus {
    pub fn is_ok(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn visible_bars(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.bars
            .iter()
            .filter(|(_, rec)| rec.is_some())
            .map(|(name, _)| *name)
    }
}

pub fn check_player_status(locator: &ElementLocator) -> PlayerStatus {
    let warnings = ALERTS
        .iter()
        .filter(|(element, _)| locator.is_present(element))
        .map(|(_, warning)| *warning)
        .collect::<Vec<_>>();
    let bars = BARS
        .iter()
        .map(|bar| (*bar, locator.find(&format!("{bar}_bar"), false)))
        .collect();

    let status = PlayerStatus { warnings, bars };
    if status.is_ok() {
        tracing::info!(bars = status.visible_bars().count(), "player status ok");
    } else {
        tracing::warn!(warnings = ?status.warnings, "player status warnings");
    }
    status
}

#[cfg(test)]
mod tests {
    use crate::testing::{harness, raw};

    #[test]
    fn reports_alerts_and_visible_bars() {
        let h = harness();
        h.detector.set_default(vec![
            raw("starvation_alert", 0.8, [0.0, 0.0, 10.0, 10.0]),
            raw("health_bar", 0.9, [0.0, 20.0, 100.0, 30.0]),
            raw("water_bar", 0.9, [0.0, 40.0, 100.0, 50.0]),
        ]);

        let status = h.session.player_status();
        assert_eq!(status.warnings, vec!["starvation"]);
        assert!(!status.is_ok());
        assert_eq!(status.visible_bars().collect::<Vec<_>>(), vec!["health", "water"]);
        assert_eq!(status.bars.len(), 5);
        assert!(h.input.events().is_empty());
    }

    #[test]
    fn clean_screen_is_ok() {
        let h = harness();
        let status = h.session.player_status();
        assert!(status.is_ok());
        assert_eq!(status.visible_bars().count(), 0);
    }
}
