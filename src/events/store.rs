//! HTTP client for the event store.
//!
//! This module provides the [`MongoEventStore`] struct that queries the
//! MongoDB Data API for the next upcoming events.

use anyhow::Context;
use log::{debug, info};
use mockall::automock;
use reqwest::Client;
use serde_json::{Value, json};

use crate::config::Store;
use crate::events::{Event, response_structs::DocumentsResponse};

/// Maximum number of upcoming events requested per fetch.
const FETCH_LIMIT: u32 = 5;

/// Trait for fetching events from the remote store.
///
/// This trait abstracts the HTTP operations for easier testing with mocks.
#[automock]
pub trait EventStore {
    /// Fetches future events, sorted by start time ascending.
    async fn fetch_events(&self) -> anyhow::Result<Vec<Event>>;
}

/// HTTP client for the MongoDB Data API.
///
/// # Examples
///
/// ```no_run
/// let store = MongoEventStore::new(&config.store);
/// let events = store.fetch_events().await?;
/// println!("Events: {:?}", events);
/// ```
pub struct MongoEventStore {
    /// Base URL of the Data API actions, without trailing slash
    url: String,
    /// Data API key sent in the `api-key` header
    api_key: String,
    /// Atlas cluster name, used as the `dataSource`
    cluster: String,
    /// Database holding the events collection
    database: String,
    /// Collection holding the events
    collection: String,
    /// HTTP client
    client: Client,
}

impl MongoEventStore {
    /// Create a new [MongoEventStore] from the store configuration.
    pub fn new(store: &Store) -> Self {
        MongoEventStore {
            url: store.url.trim_end_matches('/').to_owned(),
            api_key: store.api_key.to_owned(),
            cluster: store.cluster.to_owned(),
            database: store.database.to_owned(),
            collection: store.collection.to_owned(),
            client: Client::new(),
        }
    }

    /// Builds the aggregation query.
    ///
    /// The pipeline keeps the events starting after `$$NOW`, sorts them by
    /// start time and only projects the fields we need.
    fn query(&self) -> Value {
        json!({
            "dataSource": self.cluster,
            "database": self.database,
            "collection": self.collection,
            "pipeline": [
                {
                    "$addFields": {
                        "timeDiff": {
                            "$dateDiff": {
                                "startDate": "$$NOW",
                                "endDate": "$startTime",
                                "unit": "second"
                            }
                        }
                    }
                },
                { "$match": { "$expr": { "$gt": ["$timeDiff", 0] } } },
                { "$sort": { "startTime": 1 } },
                { "$limit": FETCH_LIMIT },
                { "$project": { "_id": 0, "title": 1, "startTime": 1 } }
            ]
        })
    }
}

impl EventStore for MongoEventStore {
    /// Request `{url}/aggregate` to get the upcoming events.
    ///
    /// This api call returns a json object wrapping the projected documents:
    /// ```json
    /// {
    ///   "documents": [
    ///     { "title": "Standup", "startTime": "2024-03-04T09:30:00Z" },
    ///     { "title": "Review", "startTime": "2024-03-04T11:00:00Z" }
    ///   ]
    /// }
    /// ```
    /// Non-2xx statuses and undecodable bodies are returned as errors.
    async fn fetch_events(&self) -> anyhow::Result<Vec<Event>> {
        let url = format!("{}/aggregate", &self.url);
        info!("request events");
        debug!("request {} on {}", &url, &self.cluster);

        let response: DocumentsResponse = self
            .client
            .post(&url)
            .header("Access-Control-Request-Headers", "*")
            .header("api-key", &self.api_key)
            .json(&self.query())
            .send()
            .await
            .with_context(|| format!("failed to reach {}", url))?
            .error_for_status()?
            .json()
            .await
            .context("failed to decode events")?;

        debug!("response from {} -> {:?}", &url, &response);

        Ok(response
            .documents
            .into_iter()
            .map(|document| {
                debug!("document {}", document);
                Event::new(&document.title, document.start_time)
            })
            .collect())
    }
}
