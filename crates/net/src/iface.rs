/// One local endpoint for diagnostics: the address text plus the adapter
/// it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAddress {
    pub name: String,
    pub adapter: String,
}

/// Enumerates local addresses with usable address information. The list
/// is rebuilt on every call, never cached, so it tracks adapters coming
/// and going between calls.
pub fn local_addresses() -> impl Iterator<Item = LocalAddress> {
    let interfaces = match if_addrs::get_if_addrs() {
        Ok(interfaces) => interfaces,
        Err(e) => {
            log::warn!("net: interface enumeration failed: {}", e);
            Vec::new()
        }
    };
    interfaces.into_iter().map(|iface| LocalAddress {
        name: iface.ip().to_string(),
        adapter: iface.name,
    })
}
