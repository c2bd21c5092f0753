pub mod admin;
pub mod analytics;
pub mod auth;
pub mod invoices;
pub mod leases;
pub mod maintenance;
pub mod messages;
pub mod notifications;
pub mod payments;
pub mod properties;
pub mod stripe;
pub mod units;
