use std::path::PathBuf;

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use console::Emoji;
use dialoguer::Confirm;

use crate::cloud;
use crate::descriptor;
use crate::driver;
use crate::tunnel::{self, Tunnel};
use crate::{check_binaries, default_spinner};

static CHECK: Emoji = Emoji("✅ ", "");
static GLOBE: Emoji = Emoji("🌐 ", "");
static LINK: Emoji = Emoji("🔗 ", "");

/// External tools `stop` shells out to.
const REQUIRED_BINARIES: &[&str] = &[tunnel::SSH_BINARY, driver::COMPOSE_BINARY, cloud::AWS_BINARY];

pub fn command() -> Command {
    Command::new("stop")
        .about("Tear down a runtime's replicas on a fleet stack")
        .arg(
            Arg::new("stack")
                .help("Name of the fleet stack the runtime was started on")
                .required(true),
        )
        .arg(
            Arg::new("runtime")
                .help("Runtime identifier (e.g. 'flashgames')")
                .required(true),
        )
        .arg(
            Arg::new("local_port")
                .help("Local port the tunnel publishes the remote Docker socket on")
                .long("local-port")
                .short('p')
                .value_parser(clap::value_parser!(u16).range(1024..))
                .default_value("12375"),
        )
        .arg(
            Arg::new("identity")
                .help("Private key file for the tunnel login")
                .long("identity")
                .short('i')
                .value_name("KEY"),
        )
        .arg(
            Arg::new("yes")
                .help("Skip the confirmation prompt")
                .long("yes")
                .short('y')
                .action(ArgAction::SetTrue),
        )
}

pub async fn handle(matches: &ArgMatches) -> Result<()> {
    let stack_name = matches
        .get_one::<String>("stack")
        .expect("stack should be required");
    let runtime = matches
        .get_one::<String>("runtime")
        .expect("runtime should be required");
    let local_port = *matches.get_one::<u16>("local_port").unwrap();
    let identity = matches.get_one::<String>("identity").map(PathBuf::from);
    let skip_confirm = matches.get_flag("yes");

    check_binaries(REQUIRED_BINARIES)?;

    // The descriptor written by `start` is the contract for what to remove;
    // without it there is nothing this runtime ever deployed here.
    let path = descriptor::descriptor_path(runtime);
    let parsed = descriptor::load(&path, runtime)?;

    let progress = default_spinner();
    progress.set_prefix("Resolving stack");
    progress.set_message(format!("{GLOBE} Looking up stack '{stack_name}'..."));
    let stack = cloud::describe_stack(stack_name).await;
    progress.finish_and_clear();
    let stack = stack?;

    if !skip_confirm {
        let confirm = Confirm::new()
            .with_prompt(format!(
                "Tear down {} service(s) of {} on {}?",
                parsed.services.len(),
                console::style(runtime).bold(),
                console::style(&stack.name).cyan()
            ))
            .default(false)
            .interact()?;
        if !confirm {
            println!("Aborted.");
            return Ok(());
        }
    }

    let progress = default_spinner();
    progress.set_prefix("Opening tunnel");
    progress.set_message(format!(
        "{LINK} Forwarding localhost:{local_port} to {}...",
        stack.control_host
    ));
    let tunnel = Tunnel::open(&stack.control_host, local_port, identity.as_deref()).await;
    progress.finish_and_clear();
    let tunnel = tunnel?;

    let result = driver::down(&tunnel.compose_host(), &path).await;
    tunnel.close().await;
    result?;

    println!(
        "{}Stopped {} on {} ({} service(s) removed)",
        CHECK,
        console::style(runtime).bold(),
        console::style(&stack.name).cyan(),
        parsed.services.len()
    );
    Ok(())
}
