use anyhow::Context;
use anyhow::Result;
use clap::Parser;
use mosvector_device_plugin::config::Cli;
use mosvector_device_plugin::logging;
use mosvector_device_plugin::shutdown::ShutdownSignals;
use mosvector_device_plugin::MosvectorDevicePlugin;
use mosvector_device_plugin::PluginConfig;
use utils::version;

/// Sets up global panic hooks.
fn setup_global_hooks() {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |panic_info| {
        default_hook(panic_info);
        tracing::error!("Thread panicked: {}", panic_info);
    }));
}

#[tokio::main]
async fn main() -> Result<()> {
    setup_global_hooks();

    let cli = Cli::parse();
    let _guard = logging::init(cli.log_file.as_deref()).context("init logging failed")?;

    tracing::info!("Starting mosvector device plugin {}", &**version::VERSION);

    // a signal during start is held until start returns and the plugin is stopped
    let mut signals = ShutdownSignals::install().context("install signal handlers")?;

    let plugin = MosvectorDevicePlugin::new(PluginConfig::from(&cli));
    plugin
        .start()
        .await
        .context("error starting device plugin")?;

    tracing::info!("device plugin is running, waiting for shutdown signal");
    let received = signals.recv().await;
    tracing::info!("Received {}, initiating graceful shutdown", received);
    plugin.stop().await;

    Ok(())
}
