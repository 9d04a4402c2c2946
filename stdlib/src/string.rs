use hogvm_core::{
    VmError, VmResult,
    module::{Module, StlContext, StlFunction, arg, int_arg, str_arg},
    op::{like, regex_match},
    val::Value,
};

/// Text functions. All character positions are 1-based and count Unicode
/// scalar values, not bytes.
#[derive(Debug, Default)]
pub struct StringModule;

impl StringModule {
    pub fn new() -> Self {
        Self
    }

    fn length(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let len = match &args[0] {
            Value::Null => 0,
            Value::Str(s) => s.chars().count(),
            Value::Array(items) => items.borrow().len(),
            Value::Tuple(items) => items.len(),
            Value::Map(map) => map.borrow().len(),
            other => {
                return Err(VmError::type_mismatch(format!(
                    "length() expects a string or a collection, got {}",
                    other.type_name()
                )));
            }
        };
        Ok(Value::from(len))
    }

    fn is_empty(value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Int(i) => *i == 0,
            Value::Float(f) => *f == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::Array(items) => items.borrow().is_empty(),
            Value::Tuple(items) => items.is_empty(),
            Value::Map(map) => map.borrow().is_empty(),
            _ => false,
        }
    }

    fn empty(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(Value::Bool(Self::is_empty(&args[0])))
    }

    fn not_empty(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Ok(Value::Bool(!Self::is_empty(&args[0])))
    }

    /// Applies `f` to a string argument; null passes through.
    fn map_str(name: &str, args: &[Value], f: impl FnOnce(&str) -> String) -> VmResult<Value> {
        if args[0].is_null() {
            return Ok(Value::Null);
        }
        Ok(Value::from(f(str_arg(name, args, 0)?)))
    }

    fn lower(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::map_str("lower", args, str::to_lowercase)
    }

    fn upper(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::map_str("upper", args, str::to_uppercase)
    }

    fn reverse(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::map_str("reverse", args, |s| s.chars().rev().collect())
    }

    /// Character to strip; a multi-character argument strips nothing and
    /// yields an empty string.
    fn trim_char(name: &str, args: &[Value]) -> VmResult<Option<char>> {
        if args.len() < 2 || args[1].is_null() {
            return Ok(Some(' '));
        }
        let chars = str_arg(name, args, 1)?;
        let mut it = chars.chars();
        match (it.next(), it.next()) {
            (Some(c), None) => Ok(Some(c)),
            _ => Ok(None),
        }
    }

    fn trim_with(name: &str, args: &[Value], f: fn(&str, char) -> &str) -> VmResult<Value> {
        let s = str_arg(name, args, 0)?;
        Ok(match Self::trim_char(name, args)? {
            Some(c) => Value::from(f(s, c)),
            None => Value::from(""),
        })
    }

    fn trim(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::trim_with("trim", args, |s, c| s.trim_matches(c))
    }

    fn trim_left(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::trim_with("trimLeft", args, |s, c| s.trim_start_matches(c))
    }

    fn trim_right(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::trim_with("trimRight", args, |s, c| s.trim_end_matches(c))
    }

    fn replace_one(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let s = str_arg("replaceOne", args, 0)?;
        let search = str_arg("replaceOne", args, 1)?;
        let replacement = str_arg("replaceOne", args, 2)?;
        Ok(Value::from(s.replacen(search, replacement, 1)))
    }

    fn replace_all(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let s = str_arg("replaceAll", args, 0)?;
        let search = str_arg("replaceAll", args, 1)?;
        let replacement = str_arg("replaceAll", args, 2)?;
        Ok(Value::from(s.replace(search, replacement)))
    }

    /// `splitByString(separator, s, max?)`. An empty separator splits into
    /// characters. With `max`, only the first `max` pieces are kept.
    fn split_by_string(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let separator = str_arg("splitByString", args, 0)?;
        let s = str_arg("splitByString", args, 1)?;
        let mut parts: Vec<Value> = if separator.is_empty() {
            s.chars().map(|c| Value::from(c.to_string())).collect()
        } else {
            s.split(separator).map(Value::from).collect()
        };
        if args.len() > 2 && !args[2].is_null() {
            let max = int_arg("splitByString", args, 2)?;
            if max > 0 {
                parts.truncate(max as usize);
            }
        }
        Ok(Value::array(parts))
    }

    fn char_position(haystack: &str, needle: &str) -> i64 {
        haystack
            .find(needle)
            .map_or(0, |byte_idx| haystack[..byte_idx].chars().count() as i64 + 1)
    }

    fn position(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let haystack = str_arg("position", args, 0)?;
        let needle = str_arg("position", args, 1)?;
        Ok(Value::Int(Self::char_position(haystack, needle)))
    }

    /// Matches on lowercased text but reports the position in the original
    /// string, since lowercasing may change the number of characters.
    fn position_case_insensitive(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let haystack = str_arg("positionCaseInsensitive", args, 0)?;
        let needle = str_arg("positionCaseInsensitive", args, 1)?.to_lowercase();

        let mut lowered = String::with_capacity(haystack.len());
        let mut starts = Vec::new();
        for (char_idx, c) in haystack.chars().enumerate() {
            starts.push((lowered.len(), char_idx));
            lowered.extend(c.to_lowercase());
        }
        let pos = lowered.find(&needle).map_or(0, |byte_idx| {
            let seen = starts.partition_point(|(offset, _)| *offset <= byte_idx);
            starts[..seen].last().map_or(0, |(_, char_idx)| *char_idx) as i64 + 1
        });
        Ok(Value::Int(pos))
    }

    /// `substring(s, start, length?)`: `start` is 1-based, negative counts
    /// from the end.
    fn substring(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let s = str_arg("substring", args, 0)?;
        let start = int_arg("substring", args, 1)?;
        let chars: Vec<char> = s.chars().collect();
        let len = chars.len() as i64;
        let from = match start {
            0 => return Ok(Value::from("")),
            n if n > 0 => n - 1,
            n => (len + n).max(0),
        };
        if from >= len {
            return Ok(Value::from(""));
        }
        let take = match args.get(2) {
            None | Some(Value::Null) => len - from,
            Some(_) => int_arg("substring", args, 2)?.max(0),
        };
        let end = from.saturating_add(take).min(len);
        Ok(Value::from(chars[from as usize..end as usize].iter().collect::<String>()))
    }

    /// Joins the printed form of every argument; null contributes nothing.
    fn concat(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let mut out = String::new();
        for value in args.iter().filter(|v| !v.is_null()) {
            out.push_str(&value.to_string());
        }
        Ok(Value::from(out))
    }

    fn like_with(name: &str, args: &[Value], ctx: &mut dyn StlContext, ci: bool, negate: bool) -> VmResult<Value> {
        let pattern = str_arg(name, args, 1)?;
        let subject = arg(args, 0);
        if subject.is_null() {
            return Ok(Value::Bool(negate));
        }
        let matched = like(ctx.regex_cache(), &subject.to_string(), pattern, ci)?;
        Ok(Value::Bool(matched != negate))
    }

    fn like(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::like_with("like", args, ctx, false, false)
    }

    fn ilike(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::like_with("ilike", args, ctx, true, false)
    }

    fn not_like(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::like_with("notLike", args, ctx, false, true)
    }

    fn not_ilike(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        Self::like_with("notILike", args, ctx, true, true)
    }

    fn match_regex(args: &[Value], ctx: &mut dyn StlContext) -> VmResult<Value> {
        let pattern = str_arg("match", args, 1)?;
        let subject = arg(args, 0);
        if subject.is_null() {
            return Ok(Value::Bool(false));
        }
        Ok(Value::Bool(regex_match(ctx.regex_cache(), &subject.to_string(), pattern, false)?))
    }

    fn starts_with(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let s = str_arg("startsWith", args, 0)?;
        let prefix = str_arg("startsWith", args, 1)?;
        Ok(Value::Bool(s.starts_with(prefix)))
    }

    fn ends_with(args: &[Value], _ctx: &mut dyn StlContext) -> VmResult<Value> {
        let s = str_arg("endsWith", args, 0)?;
        let suffix = str_arg("endsWith", args, 1)?;
        Ok(Value::Bool(s.ends_with(suffix)))
    }
}

impl Module for StringModule {
    fn name(&self) -> &str {
        "string"
    }

    fn description(&self) -> &str {
        "String inspection, slicing and pattern matching"
    }

    fn functions(&self) -> Vec<StlFunction> {
        vec![
            StlFunction::pure("length", 1, Some(1), Self::length),
            StlFunction::pure("empty", 1, Some(1), Self::empty),
            StlFunction::pure("notEmpty", 1, Some(1), Self::not_empty),
            StlFunction::pure("lower", 1, Some(1), Self::lower),
            StlFunction::pure("upper", 1, Some(1), Self::upper),
            StlFunction::pure("reverse", 1, Some(1), Self::reverse),
            StlFunction::pure("trim", 1, Some(2), Self::trim),
            StlFunction::pure("trimLeft", 1, Some(2), Self::trim_left),
            StlFunction::pure("trimRight", 1, Some(2), Self::trim_right),
            StlFunction::pure("replaceOne", 3, Some(3), Self::replace_one),
            StlFunction::pure("replaceAll", 3, Some(3), Self::replace_all),
            StlFunction::pure("splitByString", 2, Some(3), Self::split_by_string),
            StlFunction::pure("position", 2, Some(2), Self::position),
            StlFunction::pure("positionCaseInsensitive", 2, Some(2), Self::position_case_insensitive),
            StlFunction::pure("substring", 2, Some(3), Self::substring),
            StlFunction::pure("concat", 0, None, Self::concat),
            StlFunction::pure("like", 2, Some(2), Self::like),
            StlFunction::pure("ilike", 2, Some(2), Self::ilike),
            StlFunction::pure("notLike", 2, Some(2), Self::not_like),
            StlFunction::pure("notILike", 2, Some(2), Self::not_ilike),
            StlFunction::pure("match", 2, Some(2), Self::match_regex),
            StlFunction::pure("startsWith", 2, Some(2), Self::starts_with),
            StlFunction::pure("endsWith", 2, Some(2), Self::ends_with),
        ]
    }
}
