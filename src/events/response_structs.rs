//! Response structures for the event store REST endpoint.
//!
//! This module contains structures for deserializing JSON responses from
//! the MongoDB Data API `aggregate` action.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Envelope returned by the `aggregate` action.
///
/// ```json
/// { "documents": [ { "title": "Standup", "startTime": "2024-03-04T09:30:00Z" } ] }
/// ```
#[derive(Deserialize, Debug)]
pub struct DocumentsResponse {
    /// Projected event documents, sorted by start time.
    pub documents: Vec<EventDocument>,
}

/// Projection of one document of the `events` collection.
#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct EventDocument {
    /// Title of the event.
    pub title: String,
    /// Start of the event, encoded as RFC 3339.
    pub start_time: DateTime<Utc>,
}

impl fmt::Display for EventDocument {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "title={}, start_time={}", self.title, self.start_time)
    }
}
