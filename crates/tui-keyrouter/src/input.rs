//! The dispatch state machine: counts, buffered sequences, deferred
//! disambiguation, the router stack, and macro recording.

use crate::error::Result;
use crate::key::Key;
use crate::pattern::format_pattern;
use crate::reader::Reader;
use crate::router::{Handler, Match, Router};
use crate::timer::DeferredTimer;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::{Arc, Weak};

/// Where the state machine currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchState {
    /// Nothing buffered.
    Idle,
    /// Count digits typed, no keys yet.
    AccumulatingCount,
    /// Keys buffered, waiting for more to complete a pattern.
    BufferingSequence,
    /// A complete match is waiting to see whether a longer one arrives.
    PendingAmbiguous,
}

/// Read-only view of buffered input, for status lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInput {
    /// Count digits typed so far.
    pub count: String,
    /// Keys buffered so far.
    pub keys: Vec<Key>,
}

/// A matched handler waiting for its disambiguation timeout.
struct Deferred {
    handler: Handler,
    router: Arc<Router>,
    keys: Vec<Key>,
    count: usize,
    generation: u64,
}

struct State {
    /// Never empty; the last router is active.
    stack: Vec<Arc<Router>>,
    buffer: Vec<Key>,
    count: String,
    deferred: Option<Deferred>,
    generation: u64,
    recording: Option<Vec<Key>>,
    /// Nesting depth of macro playback; recording is suspended while > 0.
    playing: usize,
}

impl State {
    fn active(&self) -> &Arc<Router> {
        // `pop` never removes the root.
        &self.stack[self.stack.len() - 1]
    }

    fn count_digit(&self, key: Key) -> Option<char> {
        let digit = key.digit()?;
        (digit != '0' || !self.count.is_empty()).then_some(digit)
    }

    fn parsed_count(&self) -> usize {
        self.count
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(1)
    }

    fn take_count(&mut self) -> usize {
        let count = self.parsed_count();
        self.count.clear();
        count
    }
}

struct Inner {
    state: Mutex<State>,
    /// `None` only if the worker thread could not be spawned; ambiguous
    /// matches then fire immediately.
    timer: Option<DeferredTimer>,
}

impl Inner {
    fn cancel_deferred(&self, state: &mut State) -> bool {
        if let Some(timer) = &self.timer {
            timer.cancel();
        }
        state.deferred.take().is_some()
    }

    fn reset(&self, state: &mut State) {
        self.cancel_deferred(state);
        state.buffer.clear();
        state.count.clear();
    }

    /// Timer callback. Does nothing if the snapshot was superseded.
    fn fire_deferred(&self, generation: u64) {
        let mut state = self.state.lock();
        let Some(deferred) = state.deferred.take_if(|d| d.generation == generation) else {
            tracing::debug!(generation, "deferred match superseded");
            return;
        };

        let consumed = deferred.keys.len().min(state.buffer.len());
        state.buffer.drain(..consumed);
        state.count.clear();
        tracing::debug!(generation, keys = %format_pattern(&deferred.keys), "deferred match fired");

        let m = Match {
            keys: deferred.keys,
            count: deferred.count,
        };
        MutexGuard::unlocked(&mut state, || deferred.router.invoke(&deferred.handler, &m));
    }
}

/// Routes keys through a stack of [`Router`]s.
///
/// `Input` is a cheap handle; clones share the same state, so one can live
/// in an input thread while another pushes and pops modes.
#[derive(Clone)]
pub struct Input {
    inner: Arc<Inner>,
}

impl Input {
    /// Create an input with `root` as the bottom of the router stack.
    pub fn new(root: impl Into<Arc<Router>>) -> Self {
        let root = root.into();
        let inner = Arc::new_cyclic(|weak: &Weak<Inner>| {
            let weak = weak.clone();
            let timer = DeferredTimer::spawn(move |generation| {
                if let Some(inner) = weak.upgrade() {
                    inner.fire_deferred(generation);
                }
            })
            .map_err(|err| tracing::error!(%err, "failed to spawn timer thread"))
            .ok();

            Inner {
                state: Mutex::new(State {
                    stack: vec![root],
                    buffer: Vec::new(),
                    count: String::new(),
                    deferred: None,
                    generation: 0,
                    recording: None,
                    playing: 0,
                }),
                timer,
            }
        });
        Self { inner }
    }

    /// Feed one key through the state machine.
    ///
    /// Returns true if the key was accepted: it fired a handler, extended a
    /// count or a buffered sequence, or armed a pending match. Returns false
    /// when it led nowhere, in which case everything buffered is dropped.
    pub fn dispatch(&self, key: Key) -> bool {
        let inner = &*self.inner;
        let mut state = inner.state.lock();

        if state.playing == 0 {
            if let Some(recording) = &mut state.recording {
                recording.push(key);
            }
        }

        if state.buffer.is_empty() {
            if let Some(digit) = state.count_digit(key) {
                state.count.push(digit);
                tracing::trace!(%key, count = %state.count, "count digit");
                return true;
            }
        }

        let was_pending = inner.cancel_deferred(&mut state);
        state.buffer.push(key);

        let router = Arc::clone(state.active());
        let found = router.lookup(&state.buffer);

        if was_pending && found.consumed < state.buffer.len() && !found.has_longer {
            tracing::trace!(%key, "pending sequence abandoned");
            inner.reset(&mut state);
            return false;
        }

        match found.handler {
            Some(handler) if !found.has_longer || inner.timer.is_none() => {
                let keys: Vec<Key> = state.buffer.drain(..found.consumed).collect();
                let count = state.take_count();
                tracing::trace!(keys = %format_pattern(&keys), count, "matched");

                let m = Match { keys, count };
                MutexGuard::unlocked(&mut state, || router.invoke(&handler, &m));
                true
            }
            Some(handler) => {
                state.generation += 1;
                let generation = state.generation;
                let keys = state.buffer[..found.consumed].to_vec();
                let count = state.parsed_count();
                state.deferred = Some(Deferred {
                    handler,
                    router: Arc::clone(&router),
                    keys,
                    count,
                    generation,
                });
                if let Some(timer) = &inner.timer {
                    timer.arm(router.timeout(), generation);
                }
                tracing::debug!(generation, timeout = ?router.timeout(), "ambiguous match deferred");
                true
            }
            None if found.has_longer => {
                tracing::trace!(%key, buffered = state.buffer.len(), "awaiting more keys");
                true
            }
            None => {
                tracing::trace!(%key, "no match");
                inner.reset(&mut state);
                false
            }
        }
    }

    /// Fire a pending ambiguous match now instead of waiting for its timeout.
    ///
    /// Everything buffered is cleared. Does nothing if no match is pending.
    pub fn flush(&self) {
        let inner = &*self.inner;
        let mut state = inner.state.lock();
        if let Some(timer) = &inner.timer {
            timer.cancel();
        }
        let Some(deferred) = state.deferred.take() else {
            return;
        };
        state.buffer.clear();
        state.count.clear();

        let m = Match {
            keys: deferred.keys,
            count: deferred.count,
        };
        MutexGuard::unlocked(&mut state, || deferred.router.invoke(&deferred.handler, &m));
    }

    /// Drop buffered keys, the count, and any pending match without firing.
    pub fn clear(&self) {
        let mut state = self.inner.state.lock();
        self.inner.reset(&mut state);
    }

    /// Make `router` the active router. Pending input is discarded.
    pub fn push(&self, router: impl Into<Arc<Router>>) {
        let router = router.into();
        let mut state = self.inner.state.lock();
        self.inner.reset(&mut state);
        tracing::debug!(router = %router.name(), depth = state.stack.len() + 1, "push router");
        state.stack.push(router);
    }

    /// Return to the previous router. The root router is never popped.
    pub fn pop(&self) {
        let mut state = self.inner.state.lock();
        if state.stack.len() <= 1 {
            return;
        }
        self.inner.reset(&mut state);
        if let Some(router) = state.stack.pop() {
            tracing::debug!(router = %router.name(), depth = state.stack.len(), "pop router");
        }
    }

    /// The active router.
    pub fn current(&self) -> Arc<Router> {
        Arc::clone(self.inner.state.lock().active())
    }

    /// Number of routers on the stack, at least 1.
    pub fn depth(&self) -> usize {
        self.inner.state.lock().stack.len()
    }

    /// Count digits and keys typed so far.
    pub fn pending(&self) -> PendingInput {
        let state = self.inner.state.lock();
        PendingInput {
            count: state.count.clone(),
            keys: state.buffer.clone(),
        }
    }

    pub fn state(&self) -> DispatchState {
        let state = self.inner.state.lock();
        if state.deferred.is_some() {
            DispatchState::PendingAmbiguous
        } else if !state.buffer.is_empty() {
            DispatchState::BufferingSequence
        } else if !state.count.is_empty() {
            DispatchState::AccumulatingCount
        } else {
            DispatchState::Idle
        }
    }

    /// Start capturing dispatched keys. Restarts an ongoing recording.
    pub fn start_recording(&self) {
        self.inner.state.lock().recording = Some(Vec::new());
        tracing::debug!("recording started");
    }

    /// Stop capturing and return the keys, minus the one that stopped it.
    ///
    /// Returns `None` if nothing was being recorded.
    pub fn stop_recording(&self) -> Option<Vec<Key>> {
        let mut keys = self.inner.state.lock().recording.take()?;
        keys.pop();
        tracing::debug!(keys = keys.len(), "recording stopped");
        Some(keys)
    }

    /// Discard an ongoing recording.
    pub fn cancel_recording(&self) {
        self.inner.state.lock().recording = None;
    }

    pub fn is_recording(&self) -> bool {
        self.inner.state.lock().recording.is_some()
    }

    /// Dispatch a recorded sequence in order.
    ///
    /// Played keys are never captured by an active recording.
    pub fn play(&self, keys: &[Key]) {
        self.inner.state.lock().playing += 1;
        let _guard = Playback(&self.inner);
        for key in keys {
            self.dispatch(*key);
        }
    }

    /// Read keys from `reader` and dispatch them until the reader fails.
    ///
    /// `after_dispatch` is called with the result of every dispatch. The
    /// reader's escape parsing follows the active router, so a mode that
    /// binds arrow keys gets them decoded while it is on top.
    pub fn run(&self, reader: &mut Reader, mut after_dispatch: impl FnMut(bool)) -> Result<()> {
        loop {
            let needs_escapes = self.current().has_escape_sequences();
            reader.set_parse_escape_sequences(needs_escapes);

            let key = reader.read_key()?;
            let handled = self.dispatch(key);
            after_dispatch(handled);
        }
    }
}

/// Ends one level of playback, even if a handler panics.
struct Playback<'a>(&'a Inner);

impl Drop for Playback<'_> {
    fn drop(&mut self) {
        let mut state = self.0.state.lock();
        state.playing = state.playing.saturating_sub(1);
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Input")
            .field("depth", &state.stack.len())
            .field("buffer", &state.buffer)
            .field("count", &state.count)
            .field("pending", &state.deferred.is_some())
            .field("recording", &state.recording.is_some())
            .finish()
    }
}
