pub mod courier;
pub mod hub;
pub mod lifecycle;
pub mod pickup;
pub mod proof;
pub mod registry;
pub mod route;
pub mod tracking;
