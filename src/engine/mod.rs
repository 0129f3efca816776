pub mod conversation;
pub mod dispatcher;
pub mod driver_pool;
pub mod expiry;
pub mod pricing;
pub mod session;
