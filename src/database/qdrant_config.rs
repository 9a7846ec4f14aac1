use qdrant_client::{Qdrant, config::QdrantConfig};
use std::env;
use std::time::Duration;
use url::Url;

use super::vector_db::VectorDBError;

const REST_PORT: u16 = 6333;
const GRPC_PORT: u16 = 6334;

/// The gRPC address for a Qdrant URL. The client speaks gRPC only, so the
/// REST port (or no port at all) becomes 6334. `https` stays `https`.
pub fn grpc_url(url: &str) -> Result<String, VectorDBError> {
    let url = url.trim().trim_end_matches('/');
    let with_scheme = if url.contains("://") {
        url.to_string()
    } else {
        format!("http://{}", url)
    };
    let parsed = Url::parse(&with_scheme)
        .map_err(|e| VectorDBError::Connection(format!("Invalid Qdrant URL {}: {}", url, e)))?;
    let host = parsed
        .host_str()
        .ok_or_else(|| VectorDBError::Connection(format!("Qdrant URL {} has no host", url)))?;

    let port = match parsed.port() {
        Some(REST_PORT) | None => GRPC_PORT,
        Some(port) => port,
    };
    let scheme = if parsed.scheme() == "https" { "https" } else { "http" };
    Ok(format!("{}://{}:{}", scheme, host, port))
}

pub async fn create_qdrant_client(url: &str) -> Result<Qdrant, VectorDBError> {
    let url_with_scheme = grpc_url(url)?;
    log::info!("Attempting to connect to Qdrant with URL: {}", url_with_scheme);

    let mut config = QdrantConfig::from_url(&url_with_scheme);
    config.check_compatibility = false;
    config.timeout = Duration::from_secs(30);
    config.connect_timeout = Duration::from_secs(10);
    config.api_key = env::var("QDRANT_API_KEY").ok().filter(|key| !key.is_empty());

    let client = Qdrant::new(config).map_err(|e| VectorDBError::Connection(e.to_string()))?;

    match client.list_collections().await {
        Ok(_) => {
            log::info!("Successfully connected to Qdrant");
            Ok(client)
        }
        Err(e) => {
            log::error!("Connection test failed: {}", e);
            Err(VectorDBError::Connection(format!("Failed to connect to Qdrant: {}", e)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grpc_url() {
        assert_eq!(grpc_url("http://localhost:6333").unwrap(), "http://localhost:6334");
        assert_eq!(grpc_url("localhost:6333/").unwrap(), "http://localhost:6334");
        assert_eq!(grpc_url("http://qdrant").unwrap(), "http://qdrant:6334");
        assert_eq!(grpc_url("https://qdrant.lan:7000").unwrap(), "https://qdrant.lan:7000");
        assert_eq!(grpc_url("https://cloud.qdrant.io").unwrap(), "https://cloud.qdrant.io:6334");
    }

    #[test]
    fn test_grpc_url_needs_a_host() {
        assert!(grpc_url("http://").is_err());
    }
}
