use clap::Parser;
use pedal_cli::cli::{Cli, Commands};
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

mod commands;

use commands::util::configure_threads;

fn main() {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    configure_threads(&cli.threads);

    let Some(command) = &cli.command else {
        info!("No subcommand given; run `pedal --help` for usage");
        return;
    };

    let (label, result) = match command {
        Commands::Models { config, stations } => {
            ("Model listing", commands::models::handle(config, stations.as_ref()))
        }
        Commands::Panel {
            config,
            inputs,
            out,
        } => ("Panel build", commands::panel::handle(config, inputs, out)),
        Commands::Holdout {
            config,
            inputs,
            out_dir,
            format,
        } => (
            "Holdout evaluation",
            commands::holdout::handle(config, inputs, out_dir, *format),
        ),
        Commands::Cv {
            config,
            inputs,
            out_dir,
            format,
        } => (
            "Cross-validation",
            commands::cv::handle(config, inputs, out_dir, *format),
        ),
    };

    match result {
        Ok(_) => info!("{label} successful!"),
        Err(e) => {
            error!("{label} failed: {:?}", e);
            std::process::exit(1);
        }
    }
}
