use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use chatline::config::BackendConfig;
use chatline::identity::{AuthState, Identity, IdentityHandle, StaticIdentityProvider};

#[allow(dead_code)]
pub fn backend_config(graphql_url: &str) -> BackendConfig {
    BackendConfig {
        graphql_url: graphql_url.to_string(),
        ws_url: "ws://127.0.0.1:9/v1/graphql".to_string(),
        request_timeout_seconds: 5,
        connect_timeout_seconds: 1,
    }
}

#[allow(dead_code)]
pub fn signed_in(user_id: &str, token: Option<&str>) -> IdentityHandle {
    let mut identity = Identity::new(user_id);
    if let Some(token) = token {
        identity = identity.with_token(token);
    }
    Arc::new(StaticIdentityProvider::authenticated(identity))
}

#[allow(dead_code)]
pub fn signed_out() -> IdentityHandle {
    Arc::new(StaticIdentityProvider::new(AuthState::Unauthenticated))
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

#[allow(dead_code)]
pub fn live_config(ws_url: &str) -> BackendConfig {
    BackendConfig {
        ws_url: ws_url.to_string(),
        ..backend_config("http://127.0.0.1:9/v1/graphql")
    }
}
