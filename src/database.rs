pub mod attendance;
pub mod auth_session;
pub mod course;
pub mod group;
pub mod postgres_repository;
pub mod session;
pub mod user;
