pub mod logger;
pub mod settings;

pub mod domain_model;
pub mod domain_port;

pub mod application_port;
pub mod application_impl;

pub mod infra_memory;
