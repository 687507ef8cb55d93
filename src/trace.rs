pub(crate) const REGISTRY_TRACING_EVENT_TARGET: &str = "mongodb::registry";

pub(crate) const SERVER_SELECTION_TRACING_EVENT_TARGET: &str = "mongodb::server_selection";
