#[macro_use]
extern crate tracing;

use std::path::PathBuf;

use color_eyre::eyre::{eyre, WrapErr};
use structopt::StructOpt;
use tokio::{runtime::Builder, signal, sync::watch};

use ambientled::{
    models::Config,
    pipeline::{self, PauseFlag},
};

#[derive(Debug, StructOpt)]
struct Opts {
    #[structopt(short, long, parse(from_occurrences))]
    verbose: u32,
    #[structopt(short, long = "config")]
    config_path: Option<PathBuf>,
    #[structopt(long)]
    dump_config: bool,
    /// Start with refresh cycles paused
    #[structopt(long)]
    paused: bool,
}

#[cfg(unix)]
async fn toggle_pause_on_signal(pause: PauseFlag) -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut usr1 = signal(SignalKind::user_defined1())?;

    while usr1.recv().await.is_some() {
        let paused = pause.toggle();
        info!(paused, "toggled pause");
    }

    Ok(())
}

async fn run(opts: Opts) -> color_eyre::eyre::Result<()> {
    // Load configuration
    let config_path = opts
        .config_path
        .or_else(Config::default_path)
        .ok_or_else(|| eyre!("no configuration path given and no default location"))?;

    let config = Config::load_file(&config_path)
        .await
        .wrap_err_with(|| format!("loading {}", config_path.display()))?;

    // Dump configuration if this was asked
    if opts.dump_config {
        print!("{}", config.to_string()?);
        return Ok(());
    }

    let pause = PauseFlag::new(opts.paused);

    // Initialize every device before spawning any of them
    let startup = pipeline::start_all(&config, &pause).await;

    if startup.pipelines.is_empty() {
        if !startup.failed.is_empty() {
            return Err(eyre!(
                "no device could be started: {}",
                startup.failed.join(", ")
            ));
        }

        warn!("no enabled devices");
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let handles: Vec<_> = startup
        .pipelines
        .into_iter()
        .map(|(pipeline, sampler)| {
            let shutdown_rx = shutdown_rx.clone();

            tokio::spawn(async move {
                let name = pipeline.name().to_owned();
                let result = pipeline.run(sampler, shutdown_rx).await;

                if let Err(error) = &result {
                    error!(device = %name, %error, "device shutdown failed");
                }

                result
            })
        })
        .collect();

    #[cfg(unix)]
    tokio::spawn({
        let pause = pause.clone();

        async move {
            if let Err(error) = toggle_pause_on_signal(pause).await {
                error!(%error, "cannot listen for SIGUSR1");
            }
        }
    });

    if let Err(error) = signal::ctrl_c().await {
        error!(%error, "cannot listen for ctrl-c");
    }

    info!("shutting down");
    // Every pipeline holds a receiver, so this only fails once they are all gone
    shutdown_tx.send(true).ok();

    let mut failed = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => failed += 1,
            Err(error) => {
                error!(%error, "device task failed");
                failed += 1;
            }
        }
    }

    if failed > 0 {
        return Err(eyre!("{} device(s) failed to shut down cleanly", failed));
    }

    if !startup.failed.is_empty() {
        return Err(eyre!(
            "device(s) failed to start: {}",
            startup.failed.join(", ")
        ));
    }

    Ok(())
}

fn install_tracing(opts: &Opts) -> Result<(), tracing_subscriber::util::TryInitError> {
    use tracing_error::ErrorLayer;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let fmt_layer = fmt::layer();

    let filter_layer = EnvFilter::try_from_env("AMBIENTLED_LOG").unwrap_or_else(|_| {
        EnvFilter::new(match opts.verbose {
            0 => "ambientled=warn,ambientledd=warn",
            1 => "ambientled=info,ambientledd=info",
            2 => "ambientled=debug,ambientledd=debug",
            _ => "ambientled=trace,ambientledd=trace",
        })
    });

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(fmt_layer)
        .with(ErrorLayer::default())
        .try_init()
}

#[paw::main]
fn main(opts: Opts) -> color_eyre::eyre::Result<()> {
    color_eyre::install()?;
    install_tracing(&opts)?;

    // Create tokio runtime
    let thd_count = match num_cpus::get() {
        1 => 2,
        other => other.min(4),
    };

    let rt = Builder::new_multi_thread()
        .worker_threads(thd_count)
        .enable_all()
        .build()?;
    rt.block_on(run(opts))
}
