//! Microsoft.Network handlers

pub mod parse;
mod private_link_endpoint_connection;
mod private_link_service;

pub use private_link_endpoint_connection::PrivateLinkEndpointConnection;
pub use private_link_service::{PrivateLinkService, validate_nat_ip_configuration};
