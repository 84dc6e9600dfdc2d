//! Maintenance commands against a node on the bus.

use std::env;
use std::process::ExitCode;

use anyhow::Context;
use fwboot::cli::{TOOL_USAGE, ToolCommand, USAGE_EXIT};
use fwboot::reboot::{self, ApicMessage};
use fwboot::{Config, ElfImage, ProcessTransport, RebootController, RemoteMemory, config_rom, logging};

/// Quadlets shown by `crom`
const ROM_QUADLETS: u32 = 0x100;

fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();
    let command = match ToolCommand::parse(&args) {
        Ok(command) => command,
        Err(msg) => {
            eprintln!("{msg}");
            eprintln!("{TOOL_USAGE}");
            return ExitCode::from(USAGE_EXIT);
        }
    };

    match run(command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("fwtool: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(command: ToolCommand) -> anyhow::Result<()> {
    let config = Config::load().context("loading configuration")?;
    let _ = logging::init(config.log_level());
    let mut fw = ProcessTransport::new(&config.transport);

    match command {
        ToolCommand::Reboot { hypervisor } => {
            let path = hypervisor.unwrap_or_else(|| config.hypervisor.clone());
            let image = ElfImage::open(&path)?;
            RebootController::with_symbols(&image, &config.idt_symbol, &config.reset_symbol)
                .reboot(&mut fw)
                .context("rebooting node")?;
        }
        ToolCommand::Load { image } => {
            let image = ElfImage::open(&image)?;
            let entry = image.load(&mut fw).context("loading image")?;
            println!("entry {entry:#x}");
        }
        ToolCommand::Peek { address, length } => {
            let data = fw.read(address, length)?;
            for (line, chunk) in data.chunks(16).enumerate() {
                let hex: Vec<String> = chunk.iter().map(|b| format!("{b:02x}")).collect();
                println!("{:#012x}: {}", address + line as u64 * 16, hex.join(" "));
            }
        }
        ToolCommand::Poke { address, value } => fw.write_word(address, value)?,
        ToolCommand::Crom => {
            let discovery = config_rom::discover(&mut fw);
            println!(
                "agent: {} (vendor {:#08x}, model {:#08x})",
                discovery.is_agent, discovery.vendor_id, discovery.model_id
            );
            for (index, quadlet) in config_rom::read_rom(&mut fw, ROM_QUADLETS)?.iter().enumerate() {
                println!("{index:3}: {quadlet:08x}");
            }
        }
        ToolCommand::ExtInt { vector } => reboot::signal(&mut fw, ApicMessage::ExtInt(vector))?,
    }
    Ok(())
}
