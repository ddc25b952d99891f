//! Interaction sequences.
//!
//! A sequence is plain data: a few locate/act/branch steps, an optional
//! goal that decides whether it needs to run at all, and at most one
//! fallback path. [`runner::SequenceRunner`] is the only interpreter.
//! The game-specific builders live on [`GameProfile`] in the submodules.

pub mod crafting;
pub mod inventory;
pub mod runner;
pub mod status;
pub mod taming;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use crate::executor::input::KeyCode;

pub const INVENTORY_TAB: &str = "inventory_tab";

/// Element-level input. Each variant locates its element(s) first.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Click { element: String, offset: (i32, i32) },
    DoubleClick(String),
    RightClick(String),
    Drag { source: String, target: String },
    PressKey(KeyCode),
    HoldKey(KeyCode, Duration),
}

impl Action {
    pub fn click(element: impl Into<String>) -> Self {
        Action::Click {
            element: element.into(),
            offset: (0, 0),
        }
    }

    pub fn drag(source: impl Into<String>, target: impl Into<String>) -> Self {
        Action::Drag {
            source: source.into(),
            target: target.into(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Click { element, .. } => write!(f, "click {element}"),
            Action::DoubleClick(e) => write!(f, "double-click {e}"),
            Action::RightClick(e) => write!(f, "right-click {e}"),
            Action::Drag { source, target } => write!(f, "drag {source} -> {target}"),
            Action::PressKey(k) => write!(f, "press {k}"),
            Action::HoldKey(k, d) => write!(f, "hold {k} for {d:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Fails unless the element is currently visible.
    Locate(String),
    /// Fails unless the element shows up within the session wait timeout.
    WaitFor(String),
    Act(Action),
    Branch {
        element: String,
        if_present: Vec<Step>,
        if_absent: Vec<Step>,
    },
    Settle(Duration),
    /// Nested sequence; fails the parent only if the child ends `Failed`.
    Run(Box<Sequence>),
    /// Nested sequence whose failure is logged and otherwise ignored.
    Try(Box<Sequence>),
    Fail(String),
}

impl Step {
    pub fn locate(element: impl Into<String>) -> Self {
        Step::Locate(element.into())
    }

    pub fn wait_for(element: impl Into<String>) -> Self {
        Step::WaitFor(element.into())
    }

    pub fn click(element: impl Into<String>) -> Self {
        Step::Act(Action::click(element))
    }

    pub fn press(key: KeyCode) -> Self {
        Step::Act(Action::PressKey(key))
    }

    pub fn branch(element: impl Into<String>, if_present: Vec<Step>, if_absent: Vec<Step>) -> Self {
        Step::Branch {
            element: element.into(),
            if_present,
            if_absent,
        }
    }

    pub fn run(sequence: Sequence) -> Self {
        Step::Run(Box::new(sequence))
    }

    pub fn best_effort(sequence: Sequence) -> Self {
        Step::Try(Box::new(sequence))
    }

    pub fn fail(reason: impl Into<String>) -> Self {
        Step::Fail(reason.into())
    }
}

/// A visibility condition on one element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Goal {
    Present(String),
    Absent(String),
}

impl fmt::Display for Goal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Goal::Present(e) => write!(f, "{e} visible"),
            Goal::Absent(e) => write!(f, "{e} gone"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub name: String,
    pub precondition: Option<Goal>,
    pub goal: Option<Goal>,
    pub primary: Vec<Step>,
    pub fallback: Option<Vec<Step>>,
}

impl Sequence {
    pub fn new(name: impl Into<String>, primary: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            precondition: None,
            goal: None,
            primary,
            fallback: None,
        }
    }

    pub fn requires(mut self, precondition: Goal) -> Self {
        self.precondition = Some(precondition);
        self
    }

    pub fn until(mut self, goal: Goal) -> Self {
        self.goal = Some(goal);
        self
    }

    pub fn or_else(mut self, fallback: Vec<Step>) -> Self {
        self.fallback = Some(fallback);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SequenceOutcome {
    AlreadySatisfied,
    Completed,
    CompletedViaFallback,
    Failed { reason: String },
}

impl SequenceOutcome {
    pub fn succeeded(&self) -> bool {
        !matches!(self, SequenceOutcome::Failed { .. })
    }
}

impl fmt::Display for SequenceOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SequenceOutcome::AlreadySatisfied => f.write_str("already satisfied"),
            SequenceOutcome::Completed => f.write_str("completed"),
            SequenceOutcome::CompletedViaFallback => f.write_str("completed via fallback"),
            SequenceOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyBindings {
    pub inventory: KeyCode,
    pub drop: KeyCode,
    pub escape: KeyCode,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            inventory: KeyCode::Char('i'),
            drop: KeyCode::Char('o'),
            escape: KeyCode::Escape,
        }
    }
}

/// Game-specific knobs the sequence builders need.
#[derive(Debug, Clone)]
pub struct GameProfile {
    pub keys: KeyBindings,
    /// Lowercase creature name to preferred food suffixes, best first.
    pub taming_foods: HashMap<String, Vec<String>>,
    pub fallback_foods: Vec<String>,
    /// Lowercase creature name to narcotics needed per hour of taming.
    pub narcotics_per_hour: HashMap<String, u32>,
}

const DEFAULT_NARCOTICS_PER_HOUR: u32 = 10;

impl Default for GameProfile {
    fn default() -> Self {
        let table: &[(&str, &[&str])] = &[
            ("parasaur", &["berry_mejoberry", "berry_amarberry"]),
            ("raptor", &["raw_meat", "cooked_meat"]),
            ("triceratops", &["berry_mejoberry", "vegetable"]),
            ("pteranodon", &["raw_meat", "cooked_meat"]),
            ("dodo", &["berry", "seed"]),
            ("rex", &["raw_prime_meat", "raw_meat"]),
            ("argentavis", &["raw_meat", "raw_prime_meat"]),
            ("ankylosaurus", &["berry_mejoberry", "vegetable"]),
        ];
        fn owned(foods: &[&str]) -> Vec<String> {
            foods.iter().map(|f| f.to_string()).collect()
        }
        Self {
            keys: KeyBindings::default(),
            taming_foods: table
                .iter()
                .map(|(creature, foods)| (creature.to_string(), owned(*foods)))
                .collect(),
            fallback_foods: owned(&["raw_meat", "berry"]),
            narcotics_per_hour: [
                ("parasaur", 5),
                ("raptor", 10),
                ("triceratops", 15),
                ("pteranodon", 8),
                ("dodo", 2),
                ("rex", 40),
                ("argentavis", 25),
                ("ankylosaurus", 20),
            ]
            .into_iter()
            .map(|(creature, n)| (creature.to_string(), n))
            .collect(),
        }
    }
}

impl GameProfile {
    pub fn foods_for(&self, creature: &str) -> &[String] {
        self.taming_foods
            .get(&creature.to_ascii_lowercase())
            .unwrap_or(&self.fallback_foods)
    }

    pub fn narcotics_for(&self, creature: &str) -> u32 {
        self.narcotics_per_hour
            .get(&creature.to_ascii_lowercase())
            .copied()
            .unwrap_or(DEFAULT_NARCOTICS_PER_HOUR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_is_the_only_unsuccessful_outcome() {
        assert!(SequenceOutcome::AlreadySatisfied.succeeded());
        assert!(SequenceOutcome::CompletedViaFallback.succeeded());
        assert!(!SequenceOutcome::Failed { reason: "x".into() }.succeeded());
    }

    #[test]
    fn narcotic_rate_defaults_for_unknown_creatures() {
        let profile = GameProfile::default();
        assert_eq!(profile.narcotics_for("Rex"), 40);
        assert_eq!(profile.narcotics_for("megalodon"), 10);
    }

    #[test]
    fn unknown_creature_gets_fallback_foods() {
        let profile = GameProfile::default();
        assert_eq!(profile.foods_for("Raptor")[0], "raw_meat");
        assert_eq!(profile.foods_for("wyvern"), &["raw_meat", "berry"]);
    }
}
