//! Deterministic object names
//!
//! Names are composed from the backend identity and, for alias routes and
//! certificate secrets, a host. Compositions longer than the store's limit
//! are truncated and suffixed with a digest of the full name, so the same
//! inputs always land on the same object.

use sha2::{Digest, Sha256};

use crate::options::BackendId;

/// Maximum object name length accepted by the store
pub const MAX_NAME_LEN: usize = 253;

/// Hex characters of the digest kept in a shortened name
const HASH_LEN: usize = 16;

/// Name of the primary route object
pub fn route_name(id: &BackendId) -> String {
    hashed_name(id, &format!("ingress-router-{}-ingress", id.app))
}

/// Name of the sibling route object for an alias host
pub fn alias_route_name(id: &BackendId, alias: &str) -> String {
    hashed_name(id, &format!("ingress-router-{}-cname-{}", id.app, alias))
}

/// Name of the TLS secret for a host
pub fn secret_name(id: &BackendId, host: &str) -> String {
    hashed_name(id, &format!("kr-{}-{}", id.app, host))
}

fn hashed_name(id: &BackendId, base: &str) -> String {
    let name = match &id.process {
        Some(process) => format!("{base}-{process}"),
        None => base.to_string(),
    };
    shorten(name, MAX_NAME_LEN)
}

fn shorten(name: String, limit: usize) -> String {
    if name.len() <= limit {
        return name;
    }

    let digest = hex::encode(Sha256::digest(name.as_bytes()));
    let mut keep = limit - HASH_LEN - 1;
    while !name.is_char_boundary(keep) {
        keep -= 1;
    }
    format!("{}-{}", &name[..keep], &digest[..HASH_LEN])
}
