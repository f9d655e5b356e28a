//! Deferred script callbacks.
//!
//! Scripts can schedule a callable to run after a delay, once or a fixed
//! number of times. Timers advance only on the environment's update
//! path; a reload cancels every pending timer before the interpreter is
//! torn down.

use mlua::{Function, Lua, RegistryKey};
use tracing::warn;

/// Unique identifier for a scheduled callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

impl TimerId {
    pub fn raw(self) -> u64 {
        self.0
    }

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

struct TimedEvent {
    id: TimerId,
    func: RegistryKey,
    /// Delay between firings, in milliseconds.
    delay: u32,
    /// Remaining firings; 0 repeats forever.
    remaining: u32,
    elapsed: u32,
}

/// A timer that came due during an update tick.
pub struct FiredTimer {
    pub id: TimerId,
    pub func: Function,
    pub delay: u32,
    /// Firings left after this one; 0 for the last firing of a finite
    /// timer and for timers that repeat forever.
    pub remaining: u32,
}

/// Manages deferred callbacks for one environment.
pub struct TimerManager {
    events: Vec<TimedEvent>,
    next_id: u64,
}

impl TimerManager {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            next_id: 1,
        }
    }

    /// Schedules `func` to run every `delay` milliseconds, `repeats`
    /// times (0 = forever). The callable is retained until the timer is
    /// exhausted or cancelled.
    pub fn schedule(
        &mut self,
        lua: &Lua,
        func: Function,
        delay: u32,
        repeats: u32,
    ) -> mlua::Result<TimerId> {
        let func = lua.create_registry_value(func)?;
        let id = TimerId(self.next_id);
        self.next_id += 1;
        self.events.push(TimedEvent {
            id,
            func,
            delay,
            remaining: repeats,
            elapsed: 0,
        });
        Ok(id)
    }

    /// Cancels a timer; a no-op for ids that already fired out or were
    /// cancelled before.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        let before = self.events.len();
        self.events.retain(|e| e.id != id);
        self.events.len() != before
    }

    /// Drops every pending timer, releasing the held callables.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.events.len();
        self.events.clear();
        count
    }

    pub fn active_count(&self) -> usize {
        self.events.len()
    }

    /// Advances all timers by `diff` milliseconds and collects the ones
    /// that came due, resolving their callables for the caller to
    /// invoke. Each timer fires at most once per tick.
    pub fn advance(&mut self, lua: &Lua, diff: u32) -> Vec<FiredTimer> {
        let mut fired = Vec::new();
        self.events.retain_mut(|event| {
            event.elapsed = event.elapsed.saturating_add(diff);
            if event.elapsed < event.delay {
                return true;
            }
            event.elapsed = 0;
            let keep = match event.remaining {
                0 => true,
                1 => false,
                _ => {
                    event.remaining -= 1;
                    true
                }
            };
            let remaining = if keep && event.remaining > 0 {
                event.remaining
            } else {
                0
            };
            match lua.registry_value::<Function>(&event.func) {
                Ok(func) => fired.push(FiredTimer {
                    id: event.id,
                    func,
                    delay: event.delay,
                    remaining,
                }),
                Err(err) => {
                    warn!(target: "scripting", "Dropping timed event {}: {err}", event.id.raw());
                    return false;
                }
            }
            keep
        });
        fired
    }
}

impl Default for TimerManager {
    fn default() -> Self {
        Self::new()
    }
}
