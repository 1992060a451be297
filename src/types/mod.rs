pub mod actions;
pub mod events;
pub mod inputs;
pub mod mode;
pub mod status;
