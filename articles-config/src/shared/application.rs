use serde::{Deserialize, Serialize};

const fn default_port() -> u16 {
    ApplicationSettings::DEFAULT_PORT
}

fn default_host() -> String {
    ApplicationSettings::DEFAULT_HOST.to_string()
}

/// HTTP server settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSettings {
    /// Address the server binds to.
    #[serde(default = "default_host")]
    pub host: String,
    /// Port the server binds to. `0` picks a random free port.
    #[serde(default = "default_port")]
    pub port: u16,
}

impl ApplicationSettings {
    pub const DEFAULT_HOST: &'static str = "0.0.0.0";

    pub const DEFAULT_PORT: u16 = 8080;
}

impl Default for ApplicationSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}
