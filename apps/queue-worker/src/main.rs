//! Queue Worker Service - Entry Point
//!
//! Background worker that claims and processes records from `processing_queue`.

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let flow_name = std::env::var("QUEUE_FLOW_NAME").unwrap_or_else(|_| "default".to_string());
    queue_worker::run(&flow_name).await
}
