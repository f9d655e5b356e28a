//! Callback dispatch.
//!
//! A dispatch runs in three steps: snapshot the registrations for the
//! key (up to two stores, e.g. a creature's entry bindings plus its
//! unique bindings), invoke each callable with its own copy of the
//! shared arguments, then unwind — and when the unwind returns control
//! fully to the host, advance the handle epoch. Every invocation is
//! protected: a failing callback is logged, its results are synthesized
//! as nil and the rest of the batch still runs.

use mlua::{Function, MultiValue, Value};
use tracing::error;

use aldera_events::BindingKey;

use crate::bindings::{BindStores, Bindings};
use crate::env::ScriptEnv;
use crate::marshal::Args;

impl ScriptEnv {
    /// Invokes one callable behind the protected boundary.
    ///
    /// Nesting depth is held for the duration of the call, so handles
    /// created anywhere in a nested chain stay valid until the chain
    /// unwinds. On failure the error is logged (with the full chain
    /// when tracebacks are configured), a collection pass sweeps the
    /// failed call's leavings and `n_results` nils stand in for the
    /// results, so callers proceed uniformly.
    pub(crate) fn execute_call(
        &self,
        func: &Function,
        args: MultiValue,
        n_results: usize,
    ) -> (bool, Vec<Value>) {
        self.state.borrow_mut().event_level += 1;
        let outcome = func.call::<MultiValue>(args);
        self.state.borrow_mut().event_level -= 1;

        match outcome {
            Ok(results) => {
                let mut results = results.into_vec();
                results.resize(n_results, Value::Nil);
                (true, results)
            }
            Err(err) => {
                if self.state.borrow().traceback {
                    error!(target: "scripting", "Script error: {err:?}");
                } else {
                    error!(target: "scripting", "Script error: {err}");
                }
                if let Err(gc_err) = self.lua.gc_collect() {
                    error!(target: "scripting", "Collection after failed call: {gc_err}");
                }
                (false, vec![Value::Nil; n_results])
            }
        }
    }

    /// Closes one dispatch; with the stack fully unwound, invalidates
    /// every handle created during it.
    pub(crate) fn end_dispatch(&self) {
        let unwound = {
            let mut state = self.state.borrow_mut();
            if state.event_level == 0 {
                state.epoch = state.epoch.wrapping_add(1);
                true
            } else {
                false
            }
        };
        if unwound {
            self.lua.expire_registry_values();
        }
    }

    /// The cheap gate hooks use before doing any marshaling work.
    pub fn has_bindings<K: BindingKey>(
        &self,
        sel: impl for<'a> Fn(&'a BindStores) -> &'a Bindings<K>,
        key: &K,
    ) -> bool {
        sel(&self.state.borrow().stores).has_bindings(key)
    }

    /// Invokes every registration for `key` with the same arguments.
    pub fn call_all<K: BindingKey>(
        &self,
        sel: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K>,
        key: &K,
        args: Args,
    ) {
        self.call_core(
            sel,
            key,
            None::<(fn(&mut BindStores) -> &mut Bindings<K>, &K)>,
            args,
            0,
            &mut |_, _| {},
        );
    }

    /// Same traversal over two stores sharing one event family.
    pub fn call_all_dual<K1: BindingKey, K2: BindingKey>(
        &self,
        sel1: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K1>,
        key1: &K1,
        sel2: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K2>,
        key2: &K2,
        args: Args,
    ) {
        self.call_core(sel1, key1, Some((sel2, key2)), args, 0, &mut |_, _| {});
    }

    /// Boolean-aggregating traversal: yields `default` when nothing is
    /// registered, otherwise true iff any callback returned true.
    /// Hooks with a different aggregation rule build on
    /// [`Self::call_all_with`] instead.
    pub fn call_all_bool<K: BindingKey>(
        &self,
        sel: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K>,
        key: &K,
        args: Args,
        default: bool,
    ) -> bool {
        let mut result = default;
        self.call_core(
            sel,
            key,
            None::<(fn(&mut BindStores) -> &mut Bindings<K>, &K)>,
            args,
            1,
            &mut |_, results| {
                if matches!(results.first(), Some(Value::Boolean(true))) {
                    result = true;
                }
            },
        );
        result
    }

    /// Two-store variant of [`Self::call_all_bool`].
    pub fn call_all_dual_bool<K1: BindingKey, K2: BindingKey>(
        &self,
        sel1: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K1>,
        key1: &K1,
        sel2: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K2>,
        key2: &K2,
        args: Args,
        default: bool,
    ) -> bool {
        let mut result = default;
        self.call_core(
            sel1,
            key1,
            Some((sel2, key2)),
            args,
            1,
            &mut |_, results| {
                if matches!(results.first(), Some(Value::Boolean(true))) {
                    result = true;
                }
            },
        );
        result
    }

    /// Traversal that lets the hook inspect each successful call's
    /// results and rewrite the shared arguments before the next call;
    /// later callbacks and the caller observe the rewrite. Returns the
    /// final argument list (event id first).
    pub fn call_all_with<K: BindingKey>(
        &self,
        sel: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K>,
        key: &K,
        args: Args,
        n_results: usize,
        sink: &mut dyn FnMut(&mut Vec<Value>, &[Value]),
    ) -> Vec<Value> {
        self.call_core(
            sel,
            key,
            None::<(fn(&mut BindStores) -> &mut Bindings<K>, &K)>,
            args,
            n_results,
            sink,
        )
    }

    /// Two-store variant of [`Self::call_all_with`].
    pub fn call_all_dual_with<K1: BindingKey, K2: BindingKey>(
        &self,
        sel1: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K1>,
        key1: &K1,
        sel2: impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K2>,
        key2: &K2,
        args: Args,
        n_results: usize,
        sink: &mut dyn FnMut(&mut Vec<Value>, &[Value]),
    ) -> Vec<Value> {
        self.call_core(sel1, key1, Some((sel2, key2)), args, n_results, sink)
    }

    fn call_core<K1, K2, F1, F2>(
        &self,
        sel1: F1,
        key1: &K1,
        dual: Option<(F2, &K2)>,
        args: Args,
        n_results: usize,
        sink: &mut dyn FnMut(&mut Vec<Value>, &[Value]),
    ) -> Vec<Value>
    where
        K1: BindingKey,
        K2: BindingKey,
        F1: for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K1>,
        F2: for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K2>,
    {
        // Shared argument list; the event id rides in front so handlers
        // can share one function across several events.
        let mut shared = Vec::with_capacity(args.len() + 1);
        shared.push(Value::Integer(key1.event_id() as mlua::Integer));
        shared.extend(args.into_values());

        self.run_store(&sel1, key1, &mut shared, n_results, sink);
        if let Some((sel2, key2)) = dual {
            self.run_store(&sel2, key2, &mut shared, n_results, sink);
        }
        self.end_dispatch();
        shared
    }

    fn run_store<K: BindingKey>(
        &self,
        sel: &impl for<'a> Fn(&'a mut BindStores) -> &'a mut Bindings<K>,
        key: &K,
        shared: &mut Vec<Value>,
        n_results: usize,
        sink: &mut dyn FnMut(&mut Vec<Value>, &[Value]),
    ) {
        // Snapshot first: a callback cancelling itself or a neighbour
        // mid-dispatch must neither skip nor double-invoke the batch.
        let snapshot = {
            let mut state = self.state.borrow_mut();
            sel(&mut state.stores).snapshot(&self.lua, key)
        };
        for (id, func) in snapshot {
            // Every callable gets its own copy of the shared arguments.
            let call_args = MultiValue::from_vec(shared.clone());
            let (ok, results) = self.execute_call(&func, call_args, n_results);
            if ok {
                sel(&mut self.state.borrow_mut().stores).note_success(key, id);
                sink(shared, &results);
            }
        }
    }
}
