pub mod coordinate;
pub mod driver;
pub mod fare;
pub mod message;
pub mod ride;
pub mod route;
