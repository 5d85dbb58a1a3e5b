use idm_rest::{ClientOptions, ManagementClient, RetryPolicy};
use serde_json::json;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = ManagementClient::from_env()?
        .with_options(ClientOptions::default().with_retry(RetryPolicy::new(5)))?;
    let users = client.users();

    let user = users
        .create(&json!({
            "connection": "Username-Password-Authentication",
            "email": "kit@example.com",
            "password": std::env::var("DEMO_PASSWORD")?,
        }))
        .await?;
    let id = user["user_id"].as_str().unwrap_or_default().to_owned();

    users
        .update_user_metadata(&id, &json!({"theme": "dark"}))
        .await?;

    for found in users.get_by_email("kit@example.com").await? {
        println!("{found}");
    }

    users.delete(&id).await?;
    Ok(())
}
