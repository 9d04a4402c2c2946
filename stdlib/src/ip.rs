use std::net::IpAddr;

use hogvm_core::{
    VmResult,
    module::{Module, StlContext, StlFunction},
    val::Value,
};

#[derive(Debug, Default)]
pub struct IpModule;

impl IpModule {
    pub fn new() -> Self {
        Self
    }

    /// `isIPAddressInRange(address, cidr)`. Never fails: malformed input and
    /// mixed address families are simply not in range.
    fn is_ip_address_in_range(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let (Some(address), Some(cidr)) = (args[0].as_str(), args[1].as_str()) else {
            return Ok(Value::Bool(false));
        };
        Ok(Value::Bool(in_range(address, cidr).unwrap_or(false)))
    }
}

fn in_range(address: &str, cidr: &str) -> Option<bool> {
    let address: IpAddr = address.trim().parse().ok()?;
    let (network, prefix) = match cidr.trim().split_once('/') {
        Some((network, prefix)) => (network.parse::<IpAddr>().ok()?, Some(prefix.parse::<u32>().ok()?)),
        None => (cidr.trim().parse::<IpAddr>().ok()?, None),
    };
    match (address, network) {
        (IpAddr::V4(a), IpAddr::V4(n)) => {
            let prefix = prefix.unwrap_or(32);
            if prefix > 32 {
                return None;
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            Some(u32::from(a) & mask == u32::from(n) & mask)
        }
        (IpAddr::V6(a), IpAddr::V6(n)) => {
            let prefix = prefix.unwrap_or(128);
            if prefix > 128 {
                return None;
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            Some(u128::from(a) & mask == u128::from(n) & mask)
        }
        _ => Some(false),
    }
}

impl Module for IpModule {
    fn name(&self) -> &str {
        "ip"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![StlFunction::pure("isIPAddressInRange", 2, Some(2), Self::is_ip_address_in_range)]
    }
}
