//! Multiboot through FireWire with the help of the boot agent.

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use fwboot::cli::{BOOT_USAGE, BootOptions, USAGE_EXIT};
use fwboot::{BootSession, Config, FsSource, ProcessTransport, config_rom, logging};

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    if args.iter().any(|a| a == "-h" || a == "--help") {
        println!("{BOOT_USAGE}");
        return ExitCode::SUCCESS;
    }
    let options = match BootOptions::parse(&args) {
        Ok(options) => options,
        Err(msg) => {
            eprintln!("{msg}");
            eprintln!("{BOOT_USAGE}");
            return ExitCode::from(USAGE_EXIT);
        }
    };

    match run(&options) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fwboot: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(options: &BootOptions) -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    let _ = logging::init(config.log_level());

    let mut fw = ProcessTransport::new(&config.transport);
    if !options.once {
        log::info!("Waiting for an agent on node {}...", fw.node());
        config_rom::wait_for_agent(&mut fw, config.poll_interval());
    }

    let report = BootSession::new(&FsSource)
        .load_address(config.initial_load_address)
        .run(&mut fw, &options.manifest, &config.boot_dir)
        .with_context(|| format!("booting {}", options.manifest.display()))?;
    log::info!(
        "{} modules handed to the agent at {:#x}",
        report.modules.len(),
        report.control_block
    );
    Ok(())
}
