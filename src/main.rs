use anyhow::Result;
use clap::{Arg, ArgAction, Command};
use reqwest::Client;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let matches = Command::new("fleetenv")
        .version("0.1.0")
        .about("Provisions runtime fleets on remote Docker hosts behind secured tunnels")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .help("Increase log verbosity (-v for debug, -vv for trace)")
                .long("verbose")
                .short('v')
                .global(true)
                .action(ArgAction::Count),
        )
        .subcommand(fleetenv::start::command())
        .subcommand(fleetenv::stop::command())
        .get_matches();

    let default_level = match matches.get_count("verbose") {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();

    let http_client = Client::new();

    // Match on the subcommands and handle logic
    let r = match matches.subcommand() {
        Some(("start", start_matches)) => fleetenv::start::handle(&http_client, start_matches).await,
        Some(("stop", stop_matches)) => fleetenv::stop::handle(stop_matches).await,
        _ => {
            eprintln!("Unknown command");
            Ok(())
        }
    };

    if let Err(e) = r {
        log::debug!("Error: {e:?}");
        eprintln!("{} {}", console::style("error:").red().bold(), e);
        std::process::exit(1);
    }

    Ok(())
}
