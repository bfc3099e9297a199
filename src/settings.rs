//! Maps the user's [`Config`] onto the launch and pipeline settings.

use nsbridge_config::Config;
use nsbridge_dap::{SourceMapTransformer, TransformPipeline};
use nsbridge_launch::{PortDiscoveryPolicy, ProjectSettings};

pub fn project_settings(config: &Config) -> ProjectSettings {
    let port_discovery = match config.android.port_discovery_timeout() {
        Some(timeout) => PortDiscoveryPolicy::with_timeout(timeout),
        None => PortDiscoveryPolicy::default(),
    };
    ProjectSettings {
        tool: config.cli.tool.clone(),
        env: config.cli.env.clone(),
        extra_args: Vec::new(),
        ios_debug_port: config.ios.debug_port,
        ios_attach_grace: config.ios.attach_grace(),
        ios_proxy_ready_phrase: config.ios.proxy_ready_phrase.clone(),
        ios_cli_ready_phrase: config.ios.cli_ready_phrase.clone(),
        ios_backend_ready_phrase: config.ios.backend_ready_phrase.clone(),
        android_started_phrase: config.android.debugger_started_phrase.clone(),
        android_launch_settle: config.android.launch_settle(),
        port_discovery,
    }
}

/// Lines, then source maps, then device paths.
pub fn transform_pipeline(config: &Config) -> TransformPipeline {
    TransformPipeline::standard(
        config.adapter.target_lines_start_at1,
        SourceMapTransformer::new(),
        config.adapter.remote_root.clone(),
    )
}
