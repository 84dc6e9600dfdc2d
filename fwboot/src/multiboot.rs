//! Module placement and the arm sequence
//!
//! The agent waits in a loop on the `mods_count` word of its multiboot
//! information block. Everything it will look at once that word changes
//! (module payloads, the descriptor array, the command lines, the flags and
//! the array pointer) has to be in target memory before the count is
//! written. The count is therefore always the last write of a session.

use fwboot_api::constants::{DESCRIPTOR_OFFSET, MODULE_ALIGN};
use fwboot_api::{
    Assertion, ControlBlock, Error, Module, ModuleDescriptor, MultibootFlags, RemoteMemory, Result,
};

/// Builder lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuilderState {
    /// Nothing written yet
    Idle,
    /// At least one module is in target memory
    Pushing,
    /// Module count written; the target is booting
    Armed,
}

/// Places modules in target memory and arms the agent
#[derive(Debug)]
pub struct MultibootBuilder {
    control_block: u64,
    state: BuilderState,
    cursor: u64,
    modules: Vec<Module>,
}

/// Reads the leading words of the control block at `address`
pub fn read_control_block(fw: &mut dyn RemoteMemory, address: u64) -> Result<ControlBlock> {
    let bytes = fw.read(address, ControlBlock::SIZE)?;
    ControlBlock::from_bytes(&bytes).ok_or_else(|| {
        Error::short_transfer("read", address, ControlBlock::SIZE as usize, bytes.len())
    })
}

fn align_up(value: u64, align: u64) -> u64 {
    (value + align - 1) & !(align - 1)
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| Error::AddressOutOfRange(value))
}

impl MultibootBuilder {
    /// Starts a session against the control block at `control_block`
    ///
    /// Fails before anything is written if the agent did not come up
    /// through a multiboot loader or already lists modules.
    pub fn begin(fw: &mut dyn RemoteMemory, control_block: u64, load_address: u64) -> Result<Self> {
        if control_block == 0 {
            return Err(Assertion::MultibootMagicMissing.into());
        }
        let block = read_control_block(fw, control_block)?;
        if block.mods_count != 0 {
            return Err(Assertion::AlreadyBooted {
                modules: block.mods_count,
            }
            .into());
        }
        Ok(Self {
            control_block,
            state: BuilderState::Idle,
            cursor: load_address,
            modules: Vec::new(),
        })
    }

    pub fn state(&self) -> BuilderState {
        self.state
    }

    /// Where the next module will be written
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn control_block(&self) -> u64 {
        self.control_block
    }

    pub fn descriptor_address(&self) -> u64 {
        self.control_block + DESCRIPTOR_OFFSET
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state == BuilderState::Armed {
            return Err(Error::InvalidState("session already armed"));
        }
        Ok(())
    }

    /// Moves the cursor without pushing anything
    pub fn set_load_address(&mut self, address: u64) -> Result<()> {
        self.ensure_open()?;
        log::debug!("load address {:#x}", address);
        self.cursor = address;
        Ok(())
    }

    /// Writes `data` at the cursor and advances it to the next page
    pub fn push_module(&mut self, fw: &mut dyn RemoteMemory, data: &[u8], cmdline: &str) -> Result<Module> {
        self.ensure_open()?;
        let start = self.cursor;
        to_u32(start)?;
        let end = start + data.len() as u64;
        to_u32(end)?;

        fw.write(start, data)?;

        let name = cmdline.split_whitespace().next().unwrap_or_default();
        log::info!("mod[{:02}] {:<60} [{:08x} - {:08x}]", self.modules.len(), name, start, end);

        let module = Module {
            start,
            end,
            cmdline: cmdline.to_string(),
        };
        self.modules.push(module.clone());
        self.cursor = align_up(end, MODULE_ALIGN);
        self.state = BuilderState::Pushing;
        Ok(module)
    }

    /// Descriptor array followed by the NUL-terminated command lines
    pub fn descriptor_block(&self) -> Result<Vec<u8>> {
        let base = self.descriptor_address();
        let strings_base = base + ModuleDescriptor::SIZE * self.modules.len() as u64;

        let mut descriptors = Vec::with_capacity(self.modules.len() * ModuleDescriptor::SIZE as usize);
        let mut strings = Vec::new();
        for module in &self.modules {
            let cmdline = to_u32(strings_base + strings.len() as u64)?;
            let descriptor = ModuleDescriptor::new(to_u32(module.start)?, to_u32(module.end)?, cmdline);
            descriptors.extend_from_slice(&descriptor.to_bytes());
            strings.extend_from_slice(module.cmdline.as_bytes());
            strings.push(0);
        }
        to_u32(strings_base + strings.len() as u64)?;

        descriptors.extend_from_slice(&strings);
        Ok(descriptors)
    }

    /// Publishes the modules to the agent
    ///
    /// Write order: descriptor block, flags, array pointer, module count.
    pub fn arm(&mut self, fw: &mut dyn RemoteMemory) -> Result<()> {
        match self.state {
            BuilderState::Armed => return Err(Error::InvalidState("session already armed")),
            BuilderState::Idle => return Err(Assertion::NoModules.into()),
            BuilderState::Pushing => {}
        }

        let base = self.descriptor_address();
        let block = self.descriptor_block()?;
        log::info!("add modules at {:#x}", base);
        fw.write(base, &block)?;

        let control = read_control_block(fw, self.control_block)?;
        let flags = control.flags | MultibootFlags::MODS;
        fw.write_word(self.control_block + ControlBlock::FLAGS_OFFSET, flags.bits())?;
        fw.write_word(self.control_block + ControlBlock::MODS_ADDR_OFFSET, to_u32(base)?)?;

        log::info!("Boot!");
        let count = self.modules.len() as u32;
        fw.write_word(self.control_block + ControlBlock::MODS_COUNT_OFFSET, count)?;
        self.state = BuilderState::Armed;

        if count == 1 {
            log::warn!("only one module loaded; the node may have been running already");
        }
        Ok(())
    }
}
