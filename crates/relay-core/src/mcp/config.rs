//! Tool-server configuration
//!
//! `servers.json` holds an ordered list of server descriptors. Entries are
//! parsed one by one so a malformed entry only loses itself; a missing or
//! unreadable file means zero servers.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::constants::mcp::{DEFAULT_CLIENT_NAME, HTTP_PATH};

/// How the pool reaches a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Stdio,
    Http,
    Https,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransportKind::Stdio => "stdio",
            TransportKind::Http => "http",
            TransportKind::Https => "https",
        })
    }
}

/// One configured tool server. Identity is `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerDescriptor {
    pub name: String,
    pub transport: TransportKind,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default)]
    pub streaming: bool,
    /// Program to spawn (stdio only)
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

fn default_client_name() -> String {
    DEFAULT_CLIENT_NAME.to_string()
}

impl ServerDescriptor {
    /// `scheme://host[:port]/mcp` for http(s) servers
    pub fn endpoint(&self) -> Result<Url> {
        let scheme = match self.transport {
            TransportKind::Http => "http",
            TransportKind::Https => "https",
            TransportKind::Stdio => bail!("stdio server '{}' has no HTTP endpoint", self.name),
        };
        let authority = match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        };
        Url::parse(&format!("{}://{}{}", scheme, authority, HTTP_PATH))
            .with_context(|| format!("Invalid endpoint for server '{}'", self.name))
    }

    fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("empty server name");
        }
        match self.transport {
            TransportKind::Stdio => {
                if self.command.as_deref().map_or(true, |c| c.trim().is_empty()) {
                    bail!("stdio server '{}' needs a command", self.name);
                }
            }
            TransportKind::Http | TransportKind::Https => {
                if self.host.trim().is_empty() {
                    bail!("{} server '{}' needs a host", self.transport, self.name);
                }
                self.endpoint()?;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize)]
struct ServersFile {
    #[serde(default)]
    servers: Vec<Value>,
}

/// Load `servers.json`. Never fails: problems are logged and cost servers.
pub async fn load_servers(path: &Path) -> Vec<ServerDescriptor> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!("No server config at {:?}, starting with zero servers", path);
            return Vec::new();
        }
        Err(e) => {
            tracing::warn!("Failed to read {:?}: {}", path, e);
            return Vec::new();
        }
    };
    let servers = parse_servers(&content);
    tracing::info!("Loaded {} tool servers from {:?}", servers.len(), path);
    servers
}

/// Parse the file body into descriptors, in file order
pub fn parse_servers(content: &str) -> Vec<ServerDescriptor> {
    let file: ServersFile = match serde_json::from_str(content) {
        Ok(file) => file,
        Err(e) => {
            tracing::warn!("Server config is not valid JSON: {}", e);
            return Vec::new();
        }
    };

    let mut seen = HashSet::new();
    let mut servers = Vec::with_capacity(file.servers.len());
    for (index, raw) in file.servers.into_iter().enumerate() {
        let server = match parse_entry(raw) {
            Ok(server) => server,
            Err(e) => {
                tracing::warn!("Skipping server entry #{}: {:#}", index, e);
                continue;
            }
        };
        if !seen.insert(server.name.clone()) {
            tracing::warn!(server = %server.name, "Skipping duplicate server entry #{}", index);
            continue;
        }
        servers.push(server);
    }
    servers
}

fn parse_entry(raw: Value) -> Result<ServerDescriptor> {
    let mut server: ServerDescriptor =
        serde_json::from_value(raw).map_err(|e| anyhow!("malformed entry: {}", e))?;
    server.validate()?;
    for value in server.env.values_mut() {
        *value = expand_env_vars(value);
    }
    Ok(server)
}

/// Replace `${VAR}` with the variable's value (empty when unset)
pub fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("${") {
        let Some(len) = rest[start..].find('}') else {
            break;
        };
        result.push_str(&rest[..start]);
        let var = &rest[start + 2..start + len];
        match std::env::var(var) {
            Ok(value) => result.push_str(&value),
            Err(_) => tracing::warn!("Environment variable {} is not set", var),
        }
        rest = &rest[start + len + 1..];
    }
    result.push_str(rest);
    result
}

/// Value safe to log: secrets keep their first 8 and last 4 chars
pub fn mask_secret(key: &str, value: &str) -> String {
    let upper = key.to_ascii_uppercase();
    let secret = ["KEY", "TOKEN", "SECRET", "PASSWORD"]
        .iter()
        .any(|marker| upper.contains(marker));
    if !secret {
        return value.to_string();
    }
    let chars: Vec<char> = value.chars().collect();
    if chars.len() <= 12 {
        return "***".to_string();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}
