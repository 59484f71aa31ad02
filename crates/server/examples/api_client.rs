//! Examples for using the intent recognition API

use reqwest::Client;
use serde_json::json;

const SERVER_URL: &str = "http://localhost:8000";
const API_KEY: &str = "demo-key-12345";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let client = Client::new();

    // Example 1: Health check
    println!("1. Health Check:");
    let resp = client.get(format!("{SERVER_URL}/health")).send().await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);
    println!();

    // Example 2: Recognize a single utterance
    println!("2. Recognize:");
    let resp = client
        .post(format!("{SERVER_URL}/intent/recognize"))
        .header("X-API-Key", API_KEY)
        .json(&json!({
            "app_key": "plm_assistant",
            "text": "查找零件 P-12345",
            "context": {"user": "engineer-7"}
        }))
        .send()
        .await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);
    println!();

    // Example 3: Batch recognition
    println!("3. Batch Recognize:");
    let resp = client
        .post(format!("{SERVER_URL}/intent/recognize/batch"))
        .header("X-API-Key", API_KEY)
        .json(&json!({
            "app_key": "plm_assistant",
            "texts": [
                "查找零件",
                "查询BOM结构",
                "打开装配图纸"
            ]
        }))
        .send()
        .await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);
    println!();

    // Example 4: LLM fallback status
    println!("4. LLM Status:");
    let resp = client
        .get(format!("{SERVER_URL}/status/llm"))
        .send()
        .await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);
    println!();

    // Example 5: Recognition statistics
    println!("5. Stats:");
    let resp = client
        .get(format!("{SERVER_URL}/intent/stats"))
        .header("X-API-Key", API_KEY)
        .send()
        .await?;
    println!("Status: {}", resp.status());
    println!("Body: {}", resp.text().await?);

    Ok(())
}
