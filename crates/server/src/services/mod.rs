pub mod bootstrap;
pub mod notify;
pub mod stripe;
