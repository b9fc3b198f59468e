//! Small helpers shared by the command handlers and background tasks.

use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard};

use super::events::UserEvent;
use super::proxy::EventProxy;
use super::state::AppState;
use super::view_model::generate_ui_state;

pub fn lock_state(state: &Arc<Mutex<AppState>>) -> MutexGuard<'_, AppState> {
    state
        .lock()
        .expect("Mutex was poisoned. This should not happen.")
}

/// Locks the state, runs `update_fn`, then sends a `StateUpdate` with the result.
pub fn with_state_and_notify<F, R, P: EventProxy>(
    state: &Arc<Mutex<AppState>>,
    proxy: &P,
    update_fn: F,
) -> R
where
    F: FnOnce(&mut AppState) -> R,
{
    let mut state_guard = lock_state(state);
    let result = update_fn(&mut state_guard);
    let ui_state = generate_ui_state(&state_guard);
    proxy.send_event(UserEvent::StateUpdate(Box::new(ui_state)));
    result
}

/// Logs `message` and reports it to the host.
pub fn send_error<P: EventProxy>(proxy: &P, message: impl Into<String>) {
    let message = message.into();
    tracing::warn!("{}", message);
    proxy.send_event(UserEvent::Error(message));
}

/// Deserializes a command payload, reporting a malformed one to the host.
pub fn parse_payload<T: DeserializeOwned, P: EventProxy>(
    command: &str,
    payload: serde_json::Value,
    proxy: &P,
) -> Option<T> {
    match serde_json::from_value(payload) {
        Ok(parsed) => Some(parsed),
        Err(e) => {
            send_error(proxy, format!("Invalid payload for {}: {}", command, e));
            None
        }
    }
}
