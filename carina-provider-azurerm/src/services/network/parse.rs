//! Typed parsers for Microsoft.Network resource IDs

use crate::azure::{IdParseError, parse_azure_resource_id};

/// A top-level network resource within a resource group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkResourceId {
    pub subscription_id: String,
    pub resource_group: String,
    pub name: String,
}

fn parse_named(id: &str, key: &str) -> Result<NetworkResourceId, IdParseError> {
    let mut parsed = parse_azure_resource_id(id)?;
    let name = parsed.pop_segment(key)?;
    parsed.validate_no_empty_segments(id)?;
    Ok(NetworkResourceId {
        subscription_id: parsed.subscription_id,
        resource_group: parsed.resource_group,
        name,
    })
}

pub fn parse_point_to_site_vpn_gateway_id(id: &str) -> Result<NetworkResourceId, IdParseError> {
    parse_named(id, "p2sVpnGateways")
}

pub fn parse_private_link_service_id(id: &str) -> Result<NetworkResourceId, IdParseError> {
    parse_named(id, "privateLinkServices")
}

pub fn parse_private_endpoint_id(id: &str) -> Result<NetworkResourceId, IdParseError> {
    parse_named(id, "privateEndpoints")
}

pub fn parse_network_interface_id(id: &str) -> Result<NetworkResourceId, IdParseError> {
    parse_named(id, "networkInterfaces")
}
