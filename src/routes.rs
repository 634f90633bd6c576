pub mod admin;
pub mod attendance;
pub mod course;
pub mod cron;
pub mod error;
pub mod group;
pub mod health;
pub mod session;
pub mod user;
