//! A builder for creating `Event` instances for testing.

use serde_json::Value;

use crate::models::Event;

/// A builder for creating `Event` instances for testing.
#[derive(Debug, Clone)]
pub struct EventBuilder {
    event: Event,
}

impl Default for EventBuilder {
    fn default() -> Self {
        Self { event: Event { state_type: 1, ..Event::default() } }
    }
}

impl EventBuilder {
    /// Creates a new `EventBuilder` for a hard OK event.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the alarm state.
    pub fn state(mut self, state: u32) -> Self {
        self.event.state = state;
        self
    }

    /// Sets the state type.
    pub fn state_type(mut self, state_type: u8) -> Self {
        self.event.state_type = state_type;
        self
    }

    /// Sets the timestamp, in epoch seconds.
    pub fn timestamp(mut self, timestamp: i64) -> Self {
        self.event.timestamp = Some(timestamp);
        self
    }

    /// Sets the routing key carried by the event.
    pub fn rk(mut self, rk: &str) -> Self {
        self.event.rk = Some(rk.to_string());
        self
    }

    /// Sets the connector type and name.
    pub fn connector(mut self, connector: &str, connector_name: &str) -> Self {
        self.event.connector = Some(connector.to_string());
        self.event.connector_name = Some(connector_name.to_string());
        self
    }

    /// Sets the event type.
    pub fn event_type(mut self, event_type: &str) -> Self {
        self.event.event_type = Some(event_type.to_string());
        self
    }

    /// Sets the source type.
    pub fn source_type(mut self, source_type: &str) -> Self {
        self.event.source_type = Some(source_type.to_string());
        self
    }

    /// Sets the component.
    pub fn component(mut self, component: &str) -> Self {
        self.event.component = Some(component.to_string());
        self
    }

    /// Sets the resource.
    pub fn resource(mut self, resource: &str) -> Self {
        self.event.resource = Some(resource.to_string());
        self
    }

    /// Sets the check output.
    pub fn output(mut self, output: &str) -> Self {
        self.event.output = Some(output.to_string());
        self
    }

    /// Sets the acknowledgement.
    pub fn ack(mut self, ack: Value) -> Self {
        self.event.ack = Some(ack);
        self
    }

    /// Sets the cancellation.
    pub fn cancel(mut self, cancel: Value) -> Self {
        self.event.cancel = Some(cancel);
        self
    }

    /// Sets the operator pin.
    pub fn keep_state(mut self, keep_state: bool) -> Self {
        self.event.keep_state = Some(keep_state);
        self
    }

    /// Marks the event as already resolved by the expiry sweep.
    pub fn pass_status(mut self) -> Self {
        self.event.pass_status = true;
        self
    }

    /// Adds a free-form field.
    pub fn extra(mut self, key: &str, value: Value) -> Self {
        self.event.extra.insert(key.to_string(), value);
        self
    }

    /// Builds the `Event`.
    pub fn build(self) -> Event {
        self.event
    }
}
