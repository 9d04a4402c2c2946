use std::cmp::Ordering;

use hogvm_core::{
    VmError, VmResult,
    module::{Module, StlContext, StlFunction, arg, int_arg, items_arg},
    val::Value,
};

/// Longest array `range()` will build.
pub const MAX_RANGE_LEN: usize = 1_000_000;

/// Array functions. Every function returns a new array and leaves its input
/// untouched.
#[derive(Debug, Default)]
pub struct ListModule;

impl ListModule {
    pub fn new() -> Self {
        Self
    }

    fn items_or_empty(name: &str, args: &[Value], idx: usize) -> VmResult<Vec<Value>> {
        match args.get(idx) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(_) => items_arg(name, args, idx),
        }
    }

    fn has(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let items = Self::items_or_empty("has", args, 0)?;
        let needle = arg(args, 1);
        Ok(Value::Bool(items.contains(&needle)))
    }

    fn index_of(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let items = Self::items_or_empty("indexOf", args, 0)?;
        let needle = arg(args, 1);
        let pos = items.iter().position(|item| *item == needle).map_or(0, |idx| idx + 1);
        Ok(Value::from(pos))
    }

    fn push_back(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut items = Self::items_or_empty("arrayPushBack", args, 0)?;
        items.push(arg(args, 1));
        Ok(Value::array(items))
    }

    fn push_front(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut items = Self::items_or_empty("arrayPushFront", args, 0)?;
        items.insert(0, arg(args, 1));
        Ok(Value::array(items))
    }

    fn pop_back(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut items = Self::items_or_empty("arrayPopBack", args, 0)?;
        items.pop();
        Ok(Value::array(items))
    }

    fn pop_front(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut items = Self::items_or_empty("arrayPopFront", args, 0)?;
        if !items.is_empty() {
            items.remove(0);
        }
        Ok(Value::array(items))
    }

    /// Sorts with the `<` ordering; the first incomparable pair fails the
    /// whole sort.
    fn sorted(name: &str, args: &[Value]) -> VmResult<Vec<Value>> {
        let mut items = Self::items_or_empty(name, args, 0)?;
        let mut failure = None;
        items.sort_by(|a, b| match a.compare(b) {
            Ok(ord) => ord,
            Err(err) => {
                failure.get_or_insert(err);
                Ordering::Equal
            }
        });
        match failure {
            Some(err) => Err(err),
            None => Ok(items),
        }
    }

    fn sort(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(Value::array(Self::sorted("arraySort", args)?))
    }

    fn reverse_sort(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut items = Self::sorted("arrayReverseSort", args)?;
        items.reverse();
        Ok(Value::array(items))
    }

    fn reverse(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut items = Self::items_or_empty("arrayReverse", args, 0)?;
        items.reverse();
        Ok(Value::array(items))
    }

    fn string_concat(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let items = Self::items_or_empty("arrayStringConcat", args, 0)?;
        let separator = match args.get(1) {
            None | Some(Value::Null) => String::new(),
            Some(sep) => sep.to_string(),
        };
        let parts: Vec<String> = items.iter().map(ToString::to_string).collect();
        Ok(Value::from(parts.join(&separator)))
    }

    /// Calls `func` (argument 0) on every element of argument 1.
    fn each<F>(name: &str, args: &[Value], ctx: &mut dyn StlContext, mut f: F) -> VmResult<()>
    where
        F: FnMut(Value, Value) -> bool,
    {
        let func = &args[0];
        if func.as_closure().is_none() {
            return Err(VmError::type_mismatch(format!(
                "{name}() expects a function as argument 1, got {}",
                func.type_name()
            )));
        }
        for item in Self::items_or_empty(name, args, 1)? {
            let result = ctx.call(func, vec![item.clone()])?;
            if !f(item, result) {
                break;
            }
        }
        Ok(())
    }

    fn map(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut out = Vec::new();
        Self::each("arrayMap", args, ctx, |_, result| {
            out.push(result);
            true
        })?;
        Ok(Value::array(out))
    }

    fn filter(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut out = Vec::new();
        Self::each("arrayFilter", args, ctx, |item, result| {
            if result.truthy() {
                out.push(item);
            }
            true
        })?;
        Ok(Value::array(out))
    }

    fn exists(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut found = false;
        Self::each("arrayExists", args, ctx, |_, result| {
            found = result.truthy();
            !found
        })?;
        Ok(Value::Bool(found))
    }

    fn count(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut count = 0usize;
        Self::each("arrayCount", args, ctx, |_, result| {
            if result.truthy() {
                count += 1;
            }
            true
        })?;
        Ok(Value::from(count))
    }

    /// `range(end)`, `range(start, end)` or `range(start, end, step)`; `end`
    /// is exclusive.
    fn range(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let (start, end) = match args.len() {
            1 => (0, int_arg("range", args, 0)?),
            _ => (int_arg("range", args, 0)?, int_arg("range", args, 1)?),
        };
        let step = if args.len() > 2 { int_arg("range", args, 2)? } else { 1 };
        if step == 0 {
            return Err(VmError::InvalidOperation("range() step must not be zero".into()));
        }
        let span = if step > 0 {
            i128::from(end) - i128::from(start)
        } else {
            i128::from(start) - i128::from(end)
        };
        let len = if span <= 0 {
            0
        } else {
            let step = i128::from(step).abs();
            (span + step - 1) / step
        };
        if len > MAX_RANGE_LEN as i128 {
            return Err(VmError::InvalidOperation(format!(
                "range() would produce {len} elements, the limit is {MAX_RANGE_LEN}"
            )));
        }
        let items = (0..len as i64).map(|i| Value::Int(start + i * step)).collect();
        Ok(Value::array(items))
    }
}

impl Module for ListModule {
    fn name(&self) -> &str {
        "array"
    }

    fn description(&self) -> &str {
        "Array construction, search, sorting and higher-order helpers"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::pure("has", 2, Some(2), Self::has),
            StlFunction::pure("indexOf", 2, Some(2), Self::index_of),
            StlFunction::pure("arrayPushBack", 2, Some(2), Self::push_back),
            StlFunction::pure("arrayPushFront", 2, Some(2), Self::push_front),
            StlFunction::pure("arrayPopBack", 1, Some(1), Self::pop_back),
            StlFunction::pure("arrayPopFront", 1, Some(1), Self::pop_front),
            StlFunction::pure("arraySort", 1, Some(1), Self::sort),
            StlFunction::pure("arrayReverse", 1, Some(1), Self::reverse),
            StlFunction::pure("arrayReverseSort", 1, Some(1), Self::reverse_sort),
            StlFunction::pure("arrayStringConcat", 1, Some(2), Self::string_concat),
            StlFunction::pure("arrayCount", 2, Some(2), Self::count),
            StlFunction::pure("arrayMap", 2, Some(2), Self::map),
            StlFunction::pure("arrayFilter", 2, Some(2), Self::filter),
            StlFunction::pure("arrayExists", 2, Some(2), Self::exists),
            StlFunction::pure("range", 1, Some(3), Self::range),
        ]
    }
}
