//! Plugin lifecycle state, shared between the plugin handle and the gRPC service

use std::sync::atomic::AtomicBool;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;

/// Lifecycle of a device plugin instance
///
/// `Unbound -> Listening -> Registered -> Advertising -> Stopped`, where
/// `Stopped` is reachable from every state and is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display)]
#[repr(u8)]
pub enum PluginState {
    #[display("unbound")]
    Unbound = 0,
    #[display("listening")]
    Listening = 1,
    #[display("registered")]
    Registered = 2,
    #[display("advertising")]
    Advertising = 3,
    #[display("stopped")]
    Stopped = 4,
}

impl PluginState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => PluginState::Unbound,
            1 => PluginState::Listening,
            2 => PluginState::Registered,
            3 => PluginState::Advertising,
            _ => PluginState::Stopped,
        }
    }
}

/// Atomic holder for [`PluginState`]
#[derive(Debug)]
pub struct Lifecycle {
    state: AtomicU8,
    /// a ListAndWatch stream was opened, possibly before registration finished
    subscribed: AtomicBool,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    pub fn new() -> Self {
        Self {
            state: AtomicU8::new(PluginState::Unbound as u8),
            subscribed: AtomicBool::new(false),
        }
    }

    pub fn current(&self) -> PluginState {
        PluginState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// move `from -> to`, returns false if the current state is not `from`
    pub fn transition(&self, from: PluginState, to: PluginState) -> bool {
        let moved = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok();
        if moved {
            tracing::info!("device plugin state: {} -> {}", from, to);
        }
        moved
    }

    /// record a ListAndWatch subscriber, moving `Registered -> Advertising`
    pub fn subscribe(&self) {
        self.subscribed.store(true, Ordering::SeqCst);
        self.transition(PluginState::Registered, PluginState::Advertising);
    }

    /// move `Listening -> Registered`, continuing to `Advertising` when a
    /// subscriber arrived while registration was in flight
    pub fn registered(&self) -> bool {
        if !self.transition(PluginState::Listening, PluginState::Registered) {
            return false;
        }
        if self.subscribed.load(Ordering::SeqCst) {
            self.transition(PluginState::Registered, PluginState::Advertising);
        }
        true
    }

    /// move to `Stopped` from any state, returns the previous state
    pub fn stop(&self) -> PluginState {
        let previous =
            PluginState::from_u8(self.state.swap(PluginState::Stopped as u8, Ordering::SeqCst));
        if previous != PluginState::Stopped {
            tracing::info!("device plugin state: {} -> {}", previous, PluginState::Stopped);
        }
        previous
    }
}
