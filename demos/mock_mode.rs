use serde::Deserialize;
use smart_queue::{HttpTransport, SmartQueue};

#[derive(Debug, Deserialize)]
struct EventsSummary {
    items: Vec<Event>,
}

#[derive(Debug, Deserialize)]
struct Event {
    eventid: String,
    name: String,
    startdate: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // The transport is never reached while mock mode is on.
    let queue = SmartQueue::builder(HttpTransport::new("http://localhost:3000"))
        .mock_mode(true)
        .build();

    let summary: EventsSummary = queue
        .get_json("ext/events/summary/", [("action", "get"), ("sectionid", "mock-s1")])
        .await?;

    for event in summary.items {
        println!("{} {} ({})", event.startdate, event.name, event.eventid);
    }

    let missing = queue.get("v3/unknown", ()).await?;
    println!("unknown path: HTTP {} {:?}", missing.status, missing.error());
    Ok(())
}
