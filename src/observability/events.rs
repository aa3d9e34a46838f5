//! Observable events
//!
//! Events are explicit and typed; each carries an uppercase wire name for
//! structured log output.

use std::fmt;

/// Observable events emitted by the core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Conformance
    /// An attribute's type was resolved against its alternatives
    AttributeResolved,
    /// A document was conformed for storage
    DocumentConformed,
    /// A stored record was restored to application shape
    DocumentRestored,
    /// Conformance rejected a document
    DocumentRejected,

    // Planning
    /// An access path (table or index) was selected
    IndexSelected,
    /// A query plan was rejected
    QueryRejected,

    // Model operations
    /// Save begins
    SaveBegin,
    /// Save complete
    SaveComplete,
    /// Get begins
    GetBegin,
    /// Get complete
    GetComplete,
    /// Query begins
    QueryBegin,
    /// Query complete
    QueryComplete,
}

impl Event {
    /// Returns the wire name of the event
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::AttributeResolved => "ATTRIBUTE_RESOLVED",
            Event::DocumentConformed => "DOCUMENT_CONFORMED",
            Event::DocumentRestored => "DOCUMENT_RESTORED",
            Event::DocumentRejected => "DOCUMENT_REJECTED",
            Event::IndexSelected => "INDEX_SELECTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::SaveBegin => "SAVE_BEGIN",
            Event::SaveComplete => "SAVE_COMPLETE",
            Event::GetBegin => "GET_BEGIN",
            Event::GetComplete => "GET_COMPLETE",
            Event::QueryBegin => "QUERY_BEGIN",
            Event::QueryComplete => "QUERY_COMPLETE",
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_events_have_uppercase_names() {
        let events = [
            Event::AttributeResolved,
            Event::DocumentConformed,
            Event::DocumentRestored,
            Event::DocumentRejected,
            Event::IndexSelected,
            Event::QueryRejected,
            Event::SaveBegin,
            Event::SaveComplete,
            Event::GetBegin,
            Event::GetComplete,
            Event::QueryBegin,
            Event::QueryComplete,
        ];
        for event in events {
            let name = event.as_str();
            assert!(!name.is_empty());
            assert!(name.chars().all(|c| c.is_uppercase() || c == '_'));
        }
    }

    #[test]
    fn test_display_matches_wire_name() {
        assert_eq!(format!("{}", Event::IndexSelected), "INDEX_SELECTED");
    }
}
