use anyhow::Context as _;
use dropmaild::{Config, Daemon};
use std::path::PathBuf;
use structopt::StructOpt;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(StructOpt, Debug)]
struct Args {
    /// set log levels
    ///
    /// useful for trying to debug the exchanges with the node
    #[structopt(long = "log-level", default_value = "info")]
    log_level: Level,

    /// path of the configuration file of the daemon
    ///
    /// the defaults are used if no configuration file is given
    #[structopt(long = "config")]
    config: Option<PathBuf>,

    /// print an example configuration file and exit
    #[structopt(long = "example-config")]
    example_config: bool,
}

#[tokio::main]
async fn main() {
    if let Err(error) = main_run().await {
        eprintln!("{:?}", error);
        std::process::exit(1);
    }
}

async fn main_run() -> anyhow::Result<()> {
    let args = Args::from_args();

    if args.example_config {
        print!("{}", Config::EXAMPLE);
        return Ok(());
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("setting default subscriber failed")?;

    let config = match args.config {
        Some(path) => Config::from_file(path).context("cannot load initial settings")?,
        None => Config::default(),
    };

    let daemon = Daemon::new(config).context("Cannot start the daemon")?;

    println!("ctrl-c to stop the daemon...");

    tokio::signal::ctrl_c()
        .await
        .context("Cannot listen for the CTRL-C signal")?;
    tracing::info!("shuting down via CTRL-C instruction");

    daemon
        .shutdown()
        .await
        .context("Cannot shutdown the daemon")?;

    Ok(())
}
