//! Crafting: single items with optional engram unlock, repeated crafts and
//! batches of orders.
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::sequences::inventory::tab_sequence;
use crate::sequences::{GameProfile, Sequence, SequenceOutcome, Step};
use crate::session::AutomationSession;

/// Time the crafting queue needs to accept the previous click.
const CRAFT_SETTLE: Duration = Duration::from_secs(2);

/// `item` or `item=count`, as given on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CraftOrder {
    pub item: String,
    pub engram: Option<String>,
    pub count: u32,
}

#[derive(Debug, Error)]
#[error("bad craft order '{0}' (expected ITEM or ITEM=COUNT with COUNT >= 1)")]
pub struct BadCraftOrder(pub String);

impl FromStr for CraftOrder {
    type Err = BadCraftOrder;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (item, count) = match s.split_once('=') {
            Some((item, count)) => {
                let count = count
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| BadCraftOrder(s.to_string()))?;
                (item.trim(), count)
            }
            None => (s.trim(), 1),
        };
        if item.is_empty() || count == 0 {
            return Err(BadCraftOrder(s.to_string()));
        }
        Ok(CraftOrder {
            item: item.to_string(),
            engram: None,
            count,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CraftReport {
    pub item: String,
    pub requested: u32,
    pub crafted: u32,
    pub failure: Option<String>,
}

impl CraftReport {
    pub fn complete(&self) -> bool {
        self.crafted == self.requested
    }
}

impl fmt::Display for CraftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}/{} crafted", self.item, self.crafted, self.requested)?;
        if let Some(reason) = &self.failure {
            write!(f, " ({reason})")?;
        }
        Ok(())
    }
}

impl GameProfile {
    /// Select `item` in the crafting tab and press craft. With an engram
    /// given, an item missing from the crafting list is learned first.
    pub fn craft_item(&self, item: &str, engram: Option<&str>) -> Sequence {
        let mut steps = vec![
            Step::run(self.open_inventory()),
            Step::run(tab_sequence("crafting_tab")),
        ];
        if let Some(engram) = engram {
            steps.push(Step::branch(
                item,
                vec![],
                vec![
                    Step::run(tab_sequence("engram_tab")),
                    Step::click(engram),
                    Step::click("learn_button"),
                    Step::run(tab_sequence("crafting_tab")),
                ],
            ));
        }
        steps.push(Step::click(item));
        steps.push(Step::click("craft_button"));
        steps.push(Step::Settle(CRAFT_SETTLE));
        Sequence::new(format!("craft {item}"), steps)
    }

    /// Craft `order.count` copies one at a time, stopping at the first failure.
    pub fn craft_many(&self, session: &AutomationSession, order: &CraftOrder) -> CraftReport {
        let sequence = self.craft_item(&order.item, order.engram.as_deref());
        let mut report = CraftReport {
            item: order.item.clone(),
            requested: order.count,
            crafted: 0,
            failure: None,
        };
        for i in 1..=order.count {
            if let SequenceOutcome::Failed { reason } = session.run(&sequence) {
                tracing::warn!(item = %order.item, attempt = i, of = order.count, "craft failed");
                report.failure = Some(reason);
                break;
            }
            report.crafted += 1;
        }
        tracing::info!(item = %order.item, crafted = report.crafted, requested = report.requested, "crafting done");
        report
    }

    /// Work through `orders` with the inventory open, then close it again.
    pub fn craft_batch(&self, session: &AutomationSession, orders: &[CraftOrder]) -> Vec<CraftReport> {
        if let SequenceOutcome::Failed { reason } = session.run(&self.open_inventory()) {
            return orders
                .iter()
                .map(|order| CraftReport {
                    item: order.item.clone(),
                    requested: order.count,
                    crafted: 0,
                    failure: Some(format!("inventory did not open: {reason}")),
                })
                .collect();
        }
        let reports = orders
            .iter()
            .map(|order| self.craft_many(session, order))
            .collect();
        if let SequenceOutcome::Failed { reason } = session.run(&self.close_inventory()) {
            tracing::warn!(reason = %reason, "inventory left open after batch");
        }
        reports
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::input::KeyCode;
    use crate::perception::types::{Point, RawDetection};
    use crate::sequences::INVENTORY_TAB;
    use crate::testing::{harness, raw};

    fn at(name: &str, x: f32) -> RawDetection {
        raw(name, 0.9, [x, 0.0, x + 10.0, 10.0])
    }

    fn panel(with_item: bool) -> Vec<RawDetection> {
        let mut dets = vec![
            at(INVENTORY_TAB, 0.0),
            at("crafting_tab", 20.0),
            at("engram_tab", 40.0),
            at("engram_stone_pick", 60.0),
            at("learn_button", 80.0),
            at("craft_button", 100.0),
        ];
        if with_item {
            dets.push(at("stone_pick", 120.0));
        }
        dets
    }

    #[test]
    fn crafts_known_item() {
        let h = harness();
        h.detector.set_default(panel(true));
        let outcome = h.session.run(&GameProfile::default().craft_item("stone_pick", None));

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(
            h.input.clicks(),
            vec![Point::new(25, 5), Point::new(125, 5), Point::new(105, 5)]
        );
    }

    #[test]
    fn learns_engram_when_item_missing() {
        let h = harness();
        h.detector.push(panel(false));
        h.detector.push(panel(false));
        h.detector.set_default(panel(true));
        let outcome = h
            .session
            .run(&GameProfile::default().craft_item("stone_pick", Some("engram_stone_pick")));

        assert_eq!(outcome, SequenceOutcome::Completed);
        assert_eq!(
            h.input.clicks(),
            vec![
                Point::new(25, 5),
                Point::new(45, 5),
                Point::new(65, 5),
                Point::new(85, 5),
                Point::new(25, 5),
                Point::new(125, 5),
                Point::new(105, 5),
            ]
        );
    }

    #[test]
    fn missing_item_without_engram_fails() {
        let h = harness();
        h.detector.set_default(panel(false));
        let outcome = h.session.run(&GameProfile::default().craft_item("stone_pick", None));
        assert_eq!(
            outcome,
            SequenceOutcome::Failed {
                reason: "stone_pick not found".into()
            }
        );
        assert!(!h.input.clicks().contains(&Point::new(105, 5)));
    }

    fn order(item: &str, count: u32) -> CraftOrder {
        CraftOrder {
            item: item.into(),
            engram: None,
            count,
        }
    }

    #[test]
    fn craft_order_parses_optional_count() {
        assert_eq!("stone_pick".parse::<CraftOrder>().unwrap(), order("stone_pick", 1));
        assert_eq!("stone_pick=3".parse::<CraftOrder>().unwrap(), order("stone_pick", 3));
        assert!("stone_pick=0".parse::<CraftOrder>().is_err());
        assert!("stone_pick=lots".parse::<CraftOrder>().is_err());
        assert!("=2".parse::<CraftOrder>().is_err());
    }

    #[test]
    fn craft_many_repeats_the_whole_craft() {
        let h = harness();
        h.detector.set_default(panel(true));
        let report = GameProfile::default().craft_many(&h.session, &order("stone_pick", 3));

        assert!(report.complete());
        assert_eq!(report.crafted, 3);
        let crafts = h.input.clicks().iter().filter(|p| **p == Point::new(105, 5)).count();
        assert_eq!(crafts, 3);
    }

    #[test]
    fn craft_many_stops_at_first_failure() {
        let h = harness();
        h.detector.set_default(panel(true));
        // three clicks per craft, a move and a click each
        h.input.fail_after(6, "display lost");
        let report = GameProfile::default().craft_many(&h.session, &order("stone_pick", 3));

        assert_eq!(report.crafted, 1);
        assert!(!report.complete());
        assert!(report.failure.unwrap().contains("display lost"));
        assert_eq!(h.input.clicks().len(), 3);
    }

    #[test]
    fn batch_reports_each_order_and_closes_inventory() {
        let h = harness();
        h.detector.set_default(panel(true));
        let orders = [order("stone_pick", 2), order("wooden_spear", 1)];
        let reports = GameProfile::default().craft_batch(&h.session, &orders);

        assert_eq!(reports.len(), 2);
        assert!(reports[0].complete());
        assert_eq!(reports[1].crafted, 0);
        assert_eq!(reports[1].failure.as_deref(), Some("wooden_spear not found"));
        // no close button on this panel: escape is the fallback
        assert_eq!(h.input.keys(), vec![KeyCode::Escape]);
    }

    #[test]
    fn batch_without_inventory_crafts_nothing() {
        let h = harness();
        let reports = GameProfile::default().craft_batch(&h.session, &[order("stone_pick", 2)]);

        assert_eq!(reports[0].crafted, 0);
        assert!(reports[0].failure.as_deref().unwrap().starts_with("inventory did not open"));
        assert_eq!(h.input.keys(), vec![KeyCode::Char('i')]);
        assert!(h.input.clicks().is_empty());
    }
}
