pub mod attendance;
pub mod course;
pub mod group;
pub mod scan;
pub mod session;
pub mod token;
pub mod user;
