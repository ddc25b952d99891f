pub mod actions;
pub mod cooldown;
pub mod input;
