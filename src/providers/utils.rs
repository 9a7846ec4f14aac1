use anyhow::{anyhow, Result};
use serde_json::{json, Map, Value};
use url::Url;

use crate::config::DeviceType;

/// Joins `path` onto a server base URL, keeping any path prefix the base carries.
pub fn endpoint(base_url: &str, path: &str) -> Result<Url> {
    let mut base = Url::parse(base_url).map_err(|e| anyhow!("Invalid server URL {}: {}", base_url, e))?;
    if !matches!(base.scheme(), "http" | "https") {
        return Err(anyhow!("Unsupported URL scheme for {}", base_url));
    }
    if !base.path().ends_with('/') {
        let with_slash = format!("{}/", base.path());
        base.set_path(&with_slash);
    }
    base.join(path.trim_start_matches('/'))
        .map_err(|e| anyhow!("Invalid endpoint {}: {}", path, e))
}

/// Inference-server options that place work on the requested device.
pub fn device_options(device: DeviceType) -> Map<String, Value> {
    let mut options = Map::new();
    if device.is_gpu() {
        options.insert("num_gpu".to_string(), json!(1000));
    } else if device == DeviceType::Cpu {
        options.insert("num_gpu".to_string(), json!(0));
    }
    options
}
