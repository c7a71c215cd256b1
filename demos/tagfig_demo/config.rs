//! Configuration structs for the tagfig demo application.
//!
//! Every source a field can come from is written next to it:
//!
//! | Field                 | Default      | Env var                | Flag                    |
//! |-----------------------|--------------|------------------------|-------------------------|
//! | `name`                | `tagfig-demo`| `TAGFIG_DEMO_NAME`     |                         |
//! | `verbose`             |              | `TAGFIG_DEMO_VERBOSE`  | `--verbose`, `-v` (all) |
//! | `server.host`         | `127.0.0.1`  | `TAGFIG_DEMO_HOST`     | `serve --host`          |
//! | `server.port`         | `8080`       | `TAGFIG_DEMO_PORT`     | `serve --port`, `-p`    |
//! | `server.origins`      | `localhost`  | `TAGFIG_DEMO_ORIGINS`  |                         |
//! | `display.color`       | `yellow`     | `TAGFIG_DEMO_COLOR`    | `--color` (all)         |
//! | `display.format`      | `plain`      |                        |                         |
//!
//! The same keys can be set in `tagfig-demo.toml`; the file is read first,
//! then defaults fill whatever it left empty.

use serde::Deserialize;
use tagfig::Tagged;

#[derive(Tagged, Deserialize, Debug, Default)]
#[serde(default)]
pub struct DemoConfig {
    /// Application name shown in the banner.
    #[tagfig(default = "tagfig-demo", env = "TAGFIG_DEMO_NAME")]
    pub name: String,

    #[tagfig(
        env = "TAGFIG_DEMO_VERBOSE",
        cflag = "verbose,v",
        cmd = "tagfig-demo,persistent",
        usage = "Enable verbose output"
    )]
    pub verbose: bool,

    #[tagfig(nested)]
    pub server: ServerConfig,

    #[tagfig(nested)]
    pub display: DisplayConfig,
}

/// Lives under `[server]`.
#[derive(Tagged, Deserialize, Debug, Default)]
#[serde(default)]
pub struct ServerConfig {
    #[tagfig(
        default = "127.0.0.1",
        env = "TAGFIG_DEMO_HOST",
        cflag = "host",
        cmd = "serve",
        usage = "Address to bind to"
    )]
    pub host: String,

    #[tagfig(
        default = "8080",
        env = "TAGFIG_DEMO_PORT",
        cflag = "port,p",
        cmd = "serve",
        usage = "Port to listen on",
        test = ">=1024,<65536"
    )]
    pub port: u16,

    /// Comma separated in the environment.
    #[tagfig(default = "localhost", env = "TAGFIG_DEMO_ORIGINS")]
    pub origins: Vec<String>,
}

/// Lives under `[display]`.
#[derive(Tagged, Deserialize, Debug, Default)]
#[serde(default)]
pub struct DisplayConfig {
    #[tagfig(
        default = "yellow",
        env = "TAGFIG_DEMO_COLOR",
        cflag = "color",
        cmd = "tagfig-demo,persistent",
        usage = "Banner color",
        test = "$(known_color)"
    )]
    pub color: String,

    #[tagfig(default = "plain", test = "~^(plain|json)$")]
    pub format: String,
}
