pub mod config;
pub mod error;
pub mod observability;
pub mod path_validation;
pub mod protocol;
