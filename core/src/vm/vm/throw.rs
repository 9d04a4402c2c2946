use crate::error::{ScriptError, VmError, VmResult};
use crate::val::{HogError, Value};

use super::Vm;

/// Script-facing form of an error raised by native code.
pub(super) fn error_value(err: &ScriptError) -> Value {
    Value::error(HogError::new(
        err.kind.clone(),
        err.message.clone(),
        err.payload.as_ref().map(Value::from_json),
    ))
}

pub(super) fn script_error(value: &Value) -> ScriptError {
    match value {
        Value::Error(err) => ScriptError {
            kind: err.kind.clone(),
            message: err.message.clone(),
            payload: err.payload.as_ref().map(Value::to_json),
        },
        other => ScriptError {
            kind: "Error".into(),
            message: other.to_string(),
            payload: None,
        },
    }
}

impl Vm<'_> {
    /// Transfers control to the innermost try handler owned by this run.
    ///
    /// Handlers are owned by a run when they were entered above its exit
    /// depth. Without one the error escapes as `VmError::Uncaught`, and the
    /// value is parked in `pending_throw` so an enclosing run can rethrow it
    /// unchanged.
    pub(crate) fn throw_value(&mut self, value: Value, exit_depth: usize) -> VmResult<()> {
        let marker = match self.tries.last() {
            Some(marker) if marker.call_depth > exit_depth => *marker,
            _ => {
                let err = script_error(&value);
                tracing::debug!(kind = %err.kind, message = %err.message, "error not caught in this run");
                self.pending_throw = Some(value);
                return Err(VmError::Uncaught(err));
            }
        };
        self.tries.pop();
        self.frames.truncate(marker.call_depth);
        self.close_upvalues(marker.stack_len);
        self.truncate_stack(marker.stack_len);
        self.push(value)?;
        if let Some(frame) = self.frames.last_mut() {
            frame.ip = marker.catch_ip;
        }
        tracing::trace!(catch_ip = marker.catch_ip, depth = marker.call_depth, "caught error");
        Ok(())
    }
}
