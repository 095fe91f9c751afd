use serde::{Deserialize, Serialize};
use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::{Path, PathBuf},
};

/// Environment variable holding the server config path.
pub const CONFIG_PATH_ENV: &str = "SERVER_CONFIG";

/// File looked up next to the executable when no path is configured.
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct McpConfig {
    #[serde(rename = "mcpServers", default)]
    pub mcp_servers: BTreeMap<String, McpServerEntry>,
}

impl McpConfig {
    pub fn is_empty(&self) -> bool {
        self.mcp_servers.is_empty()
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct McpServerEntry {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Path of the file that failed to load.
    pub fn path(&self) -> &Path {
        match self {
            Self::Read { path, .. } | Self::Parse { path, .. } => path,
        }
    }
}

/// Where the server config comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Path given explicitly (flag or `SERVER_CONFIG`).
    Explicit(PathBuf),
    /// No path given; `config.json` beside the executable.
    Fallback(PathBuf),
}

impl ConfigSource {
    pub fn resolve(explicit: Option<&str>) -> Self {
        match explicit.map(str::trim).filter(|p| !p.is_empty()) {
            Some(p) => Self::Explicit(PathBuf::from(p)),
            None => Self::Fallback(default_config_path()),
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Explicit(p) | Self::Fallback(p) => p,
        }
    }
}

fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_CONFIG_FILE)
}

pub fn load_mcp_config(path: impl AsRef<Path>) -> Result<McpConfig, ConfigError> {
    let path = path.as_ref();
    let txt = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&txt).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Expand "${VAR}" placeholders from the process environment.
/// Unknown variables are left as-is.
pub fn expand_env_placeholders(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                match std::env::var(name) {
                    Ok(v) => out.push_str(&v),
                    Err(_) => {
                        out.push_str("${");
                        out.push_str(name);
                        out.push('}');
                    }
                }
                rest = &after[end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

pub fn expand_env_map(map: &HashMap<String, String>) -> HashMap<String, String> {
    map.iter()
        .map(|(k, v)| (k.clone(), expand_env_placeholders(v)))
        .collect()
}
