use hogvm_core::{
    VmResult,
    module::{Module, StlContext, StlFunction},
    val::Value,
};

#[derive(Debug, Default)]
pub struct MapModule;

impl MapModule {
    pub fn new() -> Self {
        Self
    }

    /// Keys of an object (or of a boxed value's fields). Anything else has no
    /// keys.
    fn keys(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let keys = args[0]
            .to_entries()
            .map(|entries| entries.keys().map(|k| Value::from(k.as_str())).collect())
            .unwrap_or_default();
        Ok(Value::array(keys))
    }

    /// Values of an object, or the elements of a sequence.
    fn values(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let values = match args[0].as_items() {
            Some(items) => items,
            None => args[0]
                .to_entries()
                .map(|entries| entries.into_values().collect())
                .unwrap_or_default(),
        };
        Ok(Value::array(values))
    }

    fn tuple(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(Value::tuple(args.to_vec()))
    }
}

impl Module for MapModule {
    fn name(&self) -> &str {
        "object"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::pure("keys", 1, Some(1), Self::keys),
            StlFunction::pure("values", 1, Some(1), Self::values),
            StlFunction::pure("tuple", 0, None, Self::tuple),
        ]
    }
}
