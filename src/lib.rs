pub mod binding;
pub mod capabilities;
pub mod config;
pub mod error;
pub mod feature;
pub mod filter;
pub mod services;
pub mod suite;
pub mod validation;
pub mod xml;
