//! Fixture-backed transport used by mock mode.

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use serde_json::{json, Value as JsonValue};

use crate::{ApiResponse, Query, Result, Transport};

pub const STARTUP_PATH: &str = "ext/generic/startup";
pub const EVENTS_SUMMARY_PATH: &str = "ext/events/summary";
pub const PATROLS_PATH: &str = "ext/members/patrols";
pub const MEMBERS_EVENTS_SUMMARY_PATH: &str = "members-events-summary";

/// Answers requests from an in-memory fixture table.
///
/// Lookups ignore leading/trailing slashes and any inline query string, so
/// `"/ext/events/summary/?termid=1"` resolves to the `ext/events/summary`
/// fixture. Unknown paths answer `404`.
#[derive(Clone, Debug, Default)]
pub struct MockTransport {
    fixtures: HashMap<String, JsonValue>,
}

impl MockTransport {
    /// Creates a transport with no fixtures; every path is a 404.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Creates a transport preloaded with a small mock group: three
    /// sections, their terms, three events and three patrols.
    pub fn with_default_fixtures() -> Self {
        let events = default_events();
        let patrols = default_patrols();
        Self::empty()
            .with_fixture(STARTUP_PATH, default_startup())
            .with_fixture(EVENTS_SUMMARY_PATH, json!({ "items": events.clone() }))
            .with_fixture(PATROLS_PATH, patrols.clone())
            .with_fixture(
                MEMBERS_EVENTS_SUMMARY_PATH,
                json!({
                    "events": events,
                    "patrols": patrols,
                    "members": [],
                }),
            )
    }

    /// Registers or replaces the fixture served for `path`.
    pub fn with_fixture(mut self, path: &str, data: JsonValue) -> Self {
        self.fixtures.insert(fixture_key(path), data);
        self
    }

    pub fn contains(&self, path: &str) -> bool {
        self.fixtures.contains_key(&fixture_key(path))
    }

    pub(crate) fn respond(&self, path: &str) -> ApiResponse {
        match self.fixtures.get(&fixture_key(path)) {
            Some(data) => ApiResponse::ok(data.clone()),
            None => ApiResponse::failure(404, format!("Mock data not found for {path}")),
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn get(&self, path: &str, _query: &Query) -> Result<ApiResponse> {
        Ok(self.respond(path))
    }

    async fn post(
        &self,
        path: &str,
        _body: Option<&JsonValue>,
        _headers: &HeaderMap,
    ) -> Result<ApiResponse> {
        Ok(self.respond(path))
    }

    async fn put(&self, path: &str, _body: Option<&JsonValue>) -> Result<ApiResponse> {
        Ok(self.respond(path))
    }

    async fn delete(&self, path: &str) -> Result<ApiResponse> {
        Ok(self.respond(path))
    }
}

fn fixture_key(path: &str) -> String {
    let without_query = path.split('?').next().unwrap_or_default();
    without_query.trim_matches('/').to_owned()
}

fn default_startup() -> JsonValue {
    let permissions = json!({ "event": 20, "member": 20, "programme": 20 });
    json!({
        "globals": {
            "roles": [
                { "sectionid": "mock-s1", "sectionname": "Mock Beavers", "groupname": "Mock Group",
                  "section": "beavers", "isDefault": "1", "permissions": permissions },
                { "sectionid": "mock-s2", "sectionname": "Mock Cubs", "groupname": "Mock Group",
                  "section": "cubs", "isDefault": "0", "permissions": permissions },
                { "sectionid": "mock-s3", "sectionname": "Mock Scouts", "groupname": "Mock Group",
                  "section": "scouts", "isDefault": "0", "permissions": permissions },
            ],
            "terms": {
                "mock-s1": [
                    { "termid": "mock-t1-s1", "sectionid": "mock-s1", "name": "Spring 2025",
                      "startdate": "2025-01-01", "enddate": "2025-03-31", "isPast": false },
                    { "termid": "mock-t2-s1", "sectionid": "mock-s1", "name": "Summer 2025",
                      "startdate": "2025-04-01", "enddate": "2025-08-31", "isPast": false },
                ],
                "mock-s2": [
                    { "termid": "mock-t1-s2", "sectionid": "mock-s2", "name": "Spring 2025",
                      "startdate": "2025-01-01", "enddate": "2025-03-31", "isPast": false },
                ],
            },
        }
    })
}

fn default_events() -> JsonValue {
    json!([
        { "eventid": "mock-e1", "name": "Mock Camp", "startdate": "2025-06-15",
          "enddate": "2025-06-17", "location": "Mock Campsite", "sectionid": "mock-s1",
          "cost": "25.00", "meeting_type": "Camp", "invited": 30, "yes": 25, "no": 5 },
        { "eventid": "mock-e2", "name": "Mock Hike", "startdate": "2025-05-01",
          "enddate": "2025-05-01", "location": "Mock Hills", "sectionid": "mock-s1",
          "cost": "0.00", "meeting_type": "Hike", "invited": 20, "yes": 18, "no": 2 },
        { "eventid": "mock-e3", "name": "Mock Meeting", "startdate": "2025-04-05",
          "enddate": "2025-04-05", "location": "Mock Hut", "sectionid": "mock-s2",
          "cost": "0.00", "meeting_type": "Meeting", "invited": 15, "yes": 12, "no": 3 },
    ])
}

fn default_patrols() -> JsonValue {
    json!([
        { "patrolid": "mock-p1", "name": "Red Patrol", "members": [] },
        { "patrolid": "mock-p2", "name": "Blue Patrol", "members": [] },
        { "patrolid": "mock-p3", "name": "Green Patrol", "members": [] },
    ])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{MockTransport, EVENTS_SUMMARY_PATH};

    #[test]
    fn lookup_ignores_slashes_and_inline_query() {
        let mock = MockTransport::with_default_fixtures();
        assert!(mock.contains("/ext/events/summary/?action=get&termid=1"));
        assert!(mock.contains("ext/members/patrols?action=getPatrols"));
        assert!(!mock.contains("unknown/path"));
    }

    #[test]
    fn events_summary_is_wrapped_in_items() {
        let response = MockTransport::with_default_fixtures().respond(EVENTS_SUMMARY_PATH);
        assert_eq!(response.status, 200);
        let items = response.data().and_then(|data| data.get("items")).expect("items");
        assert_eq!(items.as_array().map(Vec::len), Some(3));
    }

    #[test]
    fn unknown_path_is_404() {
        let response = MockTransport::empty().respond("unknown/path");
        assert_eq!(response.status, 404);
        assert_eq!(response.error(), Some("Mock data not found for unknown/path"));
    }

    #[test]
    fn custom_fixture_replaces_default() {
        let mock = MockTransport::with_default_fixtures()
            .with_fixture("ext/events/summary/", json!({ "items": [] }));
        let response = mock.respond("ext/events/summary");
        assert_eq!(response.data(), Some(&json!({ "items": [] })));
    }
}
