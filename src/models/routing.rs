//! Routing-key derivation for events published without an `rk`.

use super::event::Event;

/// Builds `connector.connector_name.event_type.source_type.component` and
/// appends `.resource` when the event names one. Returns `None` when any of the
/// mandatory parts is missing.
pub fn routing_key(event: &Event) -> Option<String> {
    let mut parts = vec![
        event.connector.as_deref()?,
        event.connector_name.as_deref()?,
        event.event_type.as_deref()?,
        event.source_type.as_deref()?,
        event.component.as_deref()?,
    ];
    if let Some(resource) = event.resource.as_deref() {
        parts.push(resource);
    }
    Some(parts.join("."))
}
