//! Private DNS handlers

mod aaaa_record;
mod zone;

pub use aaaa_record::{PrivateDnsAaaaRecord, normalize_ipv6};
pub use zone::PrivateDnsZone;

const API_VERSION: &str = "2018-09-01";
