//! One boot invocation against an idle agent

use std::path::Path;

use fwboot_api::constants::DEFAULT_LOAD_ADDRESS;
use fwboot_api::{Error, ManifestError, Module, RemoteMemory, Result};

use crate::config_rom;
use crate::manifest::{self, FileSource, ManifestEntry};
use crate::multiboot::MultibootBuilder;

/// What a completed session put into the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BootReport {
    pub control_block: u64,
    pub modules: Vec<Module>,
}

/// Discovers the agent, pushes a manifest's modules and arms the agent
pub struct BootSession<'s> {
    source: &'s dyn FileSource,
    load_address: u64,
}

impl<'s> BootSession<'s> {
    pub fn new(source: &'s dyn FileSource) -> Self {
        Self {
            source,
            load_address: DEFAULT_LOAD_ADDRESS,
        }
    }

    /// Initial module cursor
    pub fn load_address(mut self, address: u64) -> Self {
        self.load_address = address;
        self
    }

    pub fn run(&self, fw: &mut dyn RemoteMemory, manifest: &Path, root: &Path) -> Result<BootReport> {
        config_rom::discover(fw).ensure_agent()?;

        let control_block = config_rom::control_block_address(fw)?;
        log::info!("MBI: {:#x}", control_block);
        let mut builder = MultibootBuilder::begin(fw, control_block, self.load_address)?;

        let entries = manifest::parse(self.source, manifest, root)?;
        log::debug!("{} manifest entries", entries.len());

        for entry in &entries {
            match entry {
                ManifestEntry::SetLoadAddress(address) => builder.set_load_address(*address)?,
                ManifestEntry::LoadModule { path, cmdline } => {
                    let data = self
                        .source
                        .read(path)
                        .map_err(|err| Error::manifest(path, ManifestError::Unreadable(err)))?;
                    builder.push_module(fw, &data, cmdline)?;
                }
            }
        }

        builder.arm(fw)?;
        Ok(BootReport {
            control_block,
            modules: builder.modules().to_vec(),
        })
    }
}
