use anyhow::Context;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

pub mod cli;
pub mod trace;
pub mod traffic;

pub fn load_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let json = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&json).with_context(|| format!("invalid JSON in {}", path.display()))
}
