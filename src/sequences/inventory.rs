//! Inventory panel sequences: open/close, tabs, transfer, equip, drop, eat.
use thiserror::Error;

use crate::sequences::{Action, GameProfile, Goal, Sequence, Step, INVENTORY_TAB};

pub const VALID_TABS: [&str; 6] = [
    "inventory_tab",
    "crafting_tab",
    "engram_tab",
    "cosmetics_tab",
    "tribe_tab",
    "structure_tab",
];

pub const DEFAULT_FOOD: &str = "inventory_item_berry";

#[derive(Debug, Error)]
#[error("unknown tab '{0}' (expected one of: {})", VALID_TABS.join(", "))]
pub struct UnknownTab(pub String);

impl GameProfile {
    pub fn open_inventory(&self) -> Sequence {
        Sequence::new("open inventory", vec![Step::press(self.keys.inventory)])
            .until(Goal::Present(INVENTORY_TAB.into()))
    }

    /// Close button first; escape if the panel is still up afterwards.
    pub fn close_inventory(&self) -> Sequence {
        Sequence::new("close inventory", vec![Step::click("close_button")])
            .until(Goal::Absent(INVENTORY_TAB.into()))
            .or_else(vec![Step::press(self.keys.escape)])
    }

    pub fn switch_tab(&self, tab: &str) -> Result<Sequence, UnknownTab> {
        if !VALID_TABS.contains(&tab) {
            return Err(UnknownTab(tab.to_string()));
        }
        Ok(tab_sequence(tab))
    }

    /// Move everything into the open container. The dedicated button comes
    /// in two detector classes; with neither on screen nothing is moved.
    pub fn transfer_all(&self) -> Sequence {
        Sequence::new("transfer all", vec![Step::click("transfer_all")])
            .requires(Goal::Present(INVENTORY_TAB.into()))
            .or_else(vec![Step::branch(
                "transfer_button",
                vec![Step::click("transfer_button")],
                vec![Step::fail("no transfer button")],
            )])
    }

    pub fn equip_item(&self, item: &str) -> Sequence {
        Sequence::new(
            format!("equip {item}"),
            vec![
                Step::run(self.open_inventory()),
                Step::Act(Action::DoubleClick(item.to_string())),
            ],
        )
    }

    pub fn drop_item(&self, item: &str) -> Sequence {
        Sequence::new(
            format!("drop {item}"),
            vec![
                Step::run(self.open_inventory()),
                Step::click(item),
                Step::branch(
                    "drop_item",
                    vec![Step::click("drop_item")],
                    vec![Step::press(self.keys.drop)],
                ),
            ],
        )
    }

    /// Consume `food`, then try to close the inventory. Eating counts as
    /// success even when the panel refuses to close.
    pub fn eat_food(&self, food: &str) -> Sequence {
        Sequence::new(
            format!("eat {food}"),
            vec![
                Step::run(self.open_inventory()),
                Step::branch(
                    food,
                    vec![
                        Step::Act(Action::DoubleClick(food.to_string())),
                        Step::best_effort(self.close_inventory()),
                    ],
                    vec![
                        Step::best_effort(self.close_inventory()),
                        Step::fail(format!("no {food} in inventory")),
                    ],
                ),
            ],
        )
    }
}

pub(crate) fn tab_sequence(tab: &str) -> Sequence {
    Sequence::new(format!("switch to {tab}"), vec![Step::click(tab)])
}
