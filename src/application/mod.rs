pub mod bootstrap;
pub mod break_registry;
pub mod clock;
pub mod commands;
pub mod decision;
pub mod host;
pub mod ticker;
