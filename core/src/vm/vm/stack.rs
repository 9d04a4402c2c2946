//! Operand stack with memory accounting.
//!
//! `mem_stack` mirrors `stack` and holds the cost charged for each slot, so
//! popping refunds exactly what the push charged.

use crate::error::{VmError, VmResult};
use crate::val::{Footprint, MAX_NESTING_DEPTH, Value};

use super::Vm;

const FOOTPRINT_CACHE_SLOTS: usize = 16;
/// Smaller containers are re-measured on every push.
const FOOTPRINT_CACHE_MIN_COST: usize = 1024;

/// Footprints of recently pushed large containers, matched by identity.
///
/// Each entry keeps its container alive, so a cached address is never reused
/// by another allocation. Any `SET_PROPERTY` clears the cache.
#[derive(Default)]
pub(crate) struct FootprintCache {
    entries: Vec<(Value, Footprint)>,
    next: usize,
}

impl FootprintCache {
    fn measure(&mut self, value: &Value) -> Footprint {
        if !matches!(value, Value::Array(_) | Value::Tuple(_) | Value::Map(_)) {
            return value.footprint();
        }
        if let Some((_, footprint)) = self.entries.iter().find(|(cached, _)| cached.same_ref(value)) {
            return *footprint;
        }
        let footprint = value.footprint();
        if footprint.cost >= FOOTPRINT_CACHE_MIN_COST {
            if self.entries.len() < FOOTPRINT_CACHE_SLOTS {
                self.entries.push((value.clone(), footprint));
            } else {
                self.entries[self.next] = (value.clone(), footprint);
                self.next = (self.next + 1) % FOOTPRINT_CACHE_SLOTS;
            }
        }
        footprint
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
        self.next = 0;
    }
}

impl Vm<'_> {
    #[inline]
    pub(crate) fn push(&mut self, value: Value) -> VmResult<()> {
        let limits = &self.options.limits;
        if self.stack.len() >= limits.max_stack_depth {
            return Err(VmError::StackOverflow(format!(
                "operand stack exceeded {} entries",
                limits.max_stack_depth
            )));
        }
        let cost = self.measure(&value)?;
        self.charge(cost)?;
        self.stack.push(value);
        self.mem_stack.push(cost);
        Ok(())
    }

    /// Cost of a value about to enter the stack. Values nested deeper than
    /// [`MAX_NESTING_DEPTH`] are refused.
    fn measure(&mut self, value: &Value) -> VmResult<usize> {
        let footprint = self.footprints.measure(value);
        if footprint.depth > MAX_NESTING_DEPTH {
            return Err(VmError::StackOverflow(format!(
                "value nesting exceeded {MAX_NESTING_DEPTH} levels"
            )));
        }
        Ok(footprint.cost)
    }

    fn charge(&mut self, cost: usize) -> VmResult<()> {
        let requested = self.mem_used + cost;
        if requested > self.options.limits.max_memory {
            return Err(VmError::MemoryLimitExceeded {
                limit: self.options.limits.max_memory,
                requested,
            });
        }
        self.mem_used = requested;
        self.max_mem_used = self.max_mem_used.max(requested);
        Ok(())
    }

    #[inline]
    pub(crate) fn pop(&mut self) -> VmResult<Value> {
        let value = self.stack.pop().ok_or(VmError::StackUnderflow)?;
        let cost = self.mem_stack.pop().unwrap_or(0);
        self.mem_used = self.mem_used.saturating_sub(cost);
        Ok(value)
    }

    /// Removes the top `n` values, returned in push order.
    pub(crate) fn pop_n(&mut self, n: usize) -> VmResult<Vec<Value>> {
        let at = self.stack.len().checked_sub(n).ok_or(VmError::StackUnderflow)?;
        let refund: usize = self.mem_stack.drain(at..).sum();
        self.mem_used = self.mem_used.saturating_sub(refund);
        Ok(self.stack.drain(at..).collect())
    }

    #[inline]
    pub(crate) fn peek(&self) -> Option<&Value> {
        self.stack.last()
    }

    pub(crate) fn truncate_stack(&mut self, len: usize) {
        if len >= self.stack.len() {
            return;
        }
        let refund: usize = self.mem_stack.drain(len..).sum();
        self.mem_used = self.mem_used.saturating_sub(refund);
        self.stack.truncate(len);
    }

    pub(crate) fn slot(&self, idx: usize) -> VmResult<Value> {
        self.stack.get(idx).cloned().ok_or(VmError::StackUnderflow)
    }

    /// Overwrites a live slot, re-charging its cost.
    pub(crate) fn set_slot(&mut self, idx: usize, value: Value) -> VmResult<()> {
        if idx >= self.stack.len() {
            return Err(VmError::StackUnderflow);
        }
        let cost = self.measure(&value)?;
        let old = std::mem::replace(&mut self.mem_stack[idx], 0);
        self.mem_used = self.mem_used.saturating_sub(old);
        self.charge(cost)?;
        self.mem_stack[idx] = cost;
        self.stack[idx] = value;
        Ok(())
    }
}
