//! To-do list sample: a bearer-token protected list service and a client
//! that acquires Azure AD tokens to call it.

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod models;
pub mod service;
pub mod settings;
