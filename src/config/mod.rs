pub mod schema;

pub use schema::{
    BrowserConfig, Config, DiscoveryConfig, OutputConfig, PacingConfig, PlatformConfig,
    SearchConfig, Viewport,
};
