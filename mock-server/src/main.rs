use base64::{engine::general_purpose::STANDARD, Engine};
use mock_server::MockConfig;
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut config = MockConfig::default();
    if let Ok(user_id) = std::env::var("MOCK_USER_ID") {
        config.user_id = user_id.parse()?;
    }
    if let Ok(key) = std::env::var("MOCK_AUTHENTICATION_KEY") {
        config.secret = STANDARD.decode(key)?;
    }

    let port = std::env::var("PORT").unwrap_or_else(|_| "3000".to_string());
    let addr = format!("127.0.0.1:{port}");
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!(
        %addr,
        user_id = config.user_id,
        authentication_key = %config.authentication_key(),
        "mock payment API listening"
    );
    mock_server::run(listener, config).await?;
    Ok(())
}
