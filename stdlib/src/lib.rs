//! Standard library for HogVM programs.
//!
//! Every function is reached by name through `CALL_GLOBAL`. Embedders build a
//! registry once with [`stdlib_registry`] (or borrow the process-wide
//! [`shared_registry`]) and hand it to every run.

pub mod convert;
pub mod crypto;
pub mod datetime;
pub mod ip;
pub mod json;
pub mod list;
pub mod map;
pub mod math;
pub mod string;

#[cfg(test)]
mod test_util;


use hogvm_core::{FunctionRegistry, Module, VmResult};
use once_cell::sync::OnceCell;

/// All stdlib modules, in registration order.
pub fn modules() -> Vec<Box<dyn Module>> {
    vec![
        Box::new(string::StringModule::new()),
        Box::new(math::MathModule::new()),
        Box::new(convert::ConvertModule::new()),
        Box::new(list::ListModule::new()),
        Box::new(map::MapModule::new()),
        Box::new(json::JsonModule::new()),
        Box::new(datetime::DateTimeModule::new()),
        Box::new(crypto::CryptoModule::new()),
        Box::new(ip::IpModule::new()),
    ]
}

/// Adds every stdlib module to `registry`. Fails if a name is already taken.
pub fn register_stdlib(registry: &mut FunctionRegistry) -> VmResult<()> {
    for module in modules() {
        registry.register_module(module.as_ref())?;
    }
    Ok(())
}

/// Core builtins plus the full stdlib.
pub fn stdlib_registry() -> VmResult<FunctionRegistry> {
    let mut registry = FunctionRegistry::new();
    register_stdlib(&mut registry)?;
    Ok(registry)
}

static SHARED: OnceCell<FunctionRegistry> = OnceCell::new();

/// Process-wide registry, built on first use.
pub fn shared_registry() -> VmResult<&'static FunctionRegistry> {
    SHARED.get_or_try_init(stdlib_registry)
}
