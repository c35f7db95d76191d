use flow_monitor::FlowEvent;

/// Puts recorded events in the order the simulation would have emitted them
///
/// Events at the same instant keep their relative order from the trace.
pub fn order_events(mut events: Vec<FlowEvent>) -> Vec<FlowEvent> {
    events.sort_by_key(|e| e.time());
    events
}
