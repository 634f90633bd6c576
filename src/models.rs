pub mod attendance;
pub mod auth_session;
pub mod course;
pub mod group;
pub mod health;
pub mod qr;
pub mod session;
pub mod user;
