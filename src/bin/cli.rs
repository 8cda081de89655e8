use std::fs::File;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::Parser;
use color_eyre::eyre::eyre;
use log::{info, warn};

use proxytop::cli::display::{self, TerminalDisplay};
use proxytop::cli::sampler::ConnectionSampler;
use proxytop::cli::tail::LogTailer;
use proxytop::cli::tui::Dashboard;
use proxytop::cli::{Args, Config};

fn init_logging(args: &Args) -> color_eyre::Result<()> {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(path) = &args.debug_log {
        let file = File::create(path)?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
    Ok(())
}

/// Sets `flag` on SIGINT or SIGTERM. Only runs while the dashboard sleeps.
fn watch_signals(flag: Arc<AtomicBool>) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match signal(SignalKind::terminate()) {
                Ok(mut term) => {
                    tokio::select! {
                        _ = tokio::signal::ctrl_c() => {}
                        _ = term.recv() => {}
                    }
                }
                Err(e) => {
                    warn!("cannot watch SIGTERM: {}", e);
                    let _ = tokio::signal::ctrl_c().await;
                }
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        flag.store(true, Ordering::SeqCst);
    });
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_logging(&args)?;

    let config = Config::from_args(&args)?;
    info!(
        "watching {} on {}",
        config.log_file.display(),
        config.listen.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    );

    let tailer = LogTailer::open(&config.log_file, config.columns)?;
    let mut sampler = ConnectionSampler::new(config.tcp_table.clone(), config.listen.clone());
    let stats = sampler.sample()?;
    info!("socket table {} readable, {:?}", sampler.path().display(), stats);

    // Leave the alternate screen before color-eyre prints a panic report.
    let hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        display::restore_terminal();
        hook(info);
    }));

    let shutdown = Arc::new(AtomicBool::new(false));
    watch_signals(shutdown.clone());

    // The dashboard owns the terminal and the log handle; both are released
    // when it drops at the end of this block, before any error is reported.
    let outcome = {
        let terminal = TerminalDisplay::new().map_err(|e| eyre!("{e:#}"))?;
        let mut dashboard = Dashboard::new(tailer, sampler, terminal, config.view, stats, Instant::now());
        dashboard.run(shutdown).await
    };
    outcome.map_err(|e| eyre!("{e:#}"))
}
