use idm_rest::{ManagementClient, Params};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = ManagementClient::from_env()?;
    let logs = client.retrying(client.resource("/logs").with_cursor_param("from"));

    let mut page = logs.get_all(Params::new().with("take", 50)).await?;
    let mut seen = 0usize;

    loop {
        seen += page.items.len();
        for entry in &page.items {
            println!("{} {}", entry["date"], entry["type"]);
        }
        match page.next_cursor.take() {
            Some(cursor) if seen < 500 => page = logs.get_next(&cursor).await?,
            _ => break,
        }
    }

    println!("{seen} log entries");
    Ok(())
}
