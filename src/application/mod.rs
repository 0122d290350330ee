pub mod bootstrap;
pub mod commands;
pub mod dispatch;
