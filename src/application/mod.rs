pub mod aggregate;
pub mod auth;
pub mod catalog;
pub mod error;
pub mod repos;
