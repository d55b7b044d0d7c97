pub mod commands;
pub mod executions;
pub mod health;
