pub mod courier;
pub mod hub;
pub mod parcel;
pub mod pickup;
pub mod proof;
pub mod route;
pub mod scan;
pub mod vehicle;
