use smart_queue::{HttpTransport, SmartQueue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let transport = HttpTransport::from_env()?;
    let queue = SmartQueue::new(transport);

    let startup = queue
        .get("ext/generic/startup", [("action", "getData")])
        .await?;
    println!("startup: HTTP {}", startup.status);

    let sections = ["1001", "1002"];
    let pending: Vec<_> = sections
        .iter()
        .map(|section| {
            queue.get(
                "ext/members/patrols",
                [("action", "getPatrols"), ("sectionid", *section)],
            )
        })
        .collect();

    for (section, response) in sections.iter().zip(pending) {
        let response = response.await?;
        println!("patrols for {section}: HTTP {}", response.status);
    }

    println!("rate limit: {:?}", queue.rate_limit());
    Ok(())
}
