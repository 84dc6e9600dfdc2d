//! Boot manifest parser
//!
//! Manifests are line-oriented. `#` starts a comment, a trailing backslash
//! continues a line, and the first word of a line selects the directive:
//!
//! ```text
//! root /boot/nova            # base for relative paths below
//! load hypervisor serial     # push a module, whole tail is its cmdline
//! exec sigma0                # same as load
//! addr 0x2000000             # move the load cursor
//! conf common.conf           # splice in another manifest
//! ```
//!
//! Unknown directives are skipped so older hosts can read newer manifests.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

use fwboot_api::{Error, ManifestError, Result};

/// One step of a boot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    /// Push the file at `path`; `cmdline` becomes the module string
    LoadModule { path: PathBuf, cmdline: String },
    /// Continue placing modules at this physical address
    SetLoadAddress(u64),
}

/// Where manifests and module payloads are read from
pub trait FileSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    fn read_to_string(&self, path: &Path) -> io::Result<String> {
        String::from_utf8(self.read(path)?)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
    }
}

/// The host filesystem
#[derive(Debug, Clone, Copy, Default)]
pub struct FsSource;

impl FileSource for FsSource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }
}

/// Files held in memory, keyed by their absolute path
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    files: HashMap<PathBuf, Vec<u8>>,
}

impl MemorySource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) {
        self.files.insert(normalize(&path.into()), contents.into());
    }

    pub fn with(mut self, path: impl Into<PathBuf>, contents: impl Into<Vec<u8>>) -> Self {
        self.insert(path, contents);
        self
    }
}

impl FileSource for MemorySource {
    fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.files
            .get(&normalize(path))
            .cloned()
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.display().to_string()))
    }
}

/// Parses the manifest `path`, resolved against `root`
pub fn parse(source: &dyn FileSource, path: &Path, root: &Path) -> Result<Vec<ManifestEntry>> {
    let mut parser = Parser {
        source,
        chain: Vec::new(),
        entries: Vec::new(),
    };
    parser.parse_file(path, root.to_path_buf())?;
    Ok(parser.entries)
}

struct Parser<'s> {
    source: &'s dyn FileSource,
    /// Files currently being parsed, outermost first
    chain: Vec<PathBuf>,
    entries: Vec<ManifestEntry>,
}

impl Parser<'_> {
    fn parse_file(&mut self, name: &Path, mut root: PathBuf) -> Result<()> {
        let path = normalize(&root.join(name));
        if self.chain.contains(&path) {
            return Err(Error::manifest(&path, ManifestError::IncludeCycle(path.clone())));
        }
        let text = self
            .source
            .read_to_string(&path)
            .map_err(|err| Error::manifest(&path, ManifestError::Unreadable(err)))?;
        log::debug!("reading manifest {}", path.display());

        self.chain.push(path.clone());
        let text = text.replace("\r\n", "\n").replace("\\\n", "");
        for raw in text.split('\n') {
            let line = raw.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let (directive, param) = match line.split_once(char::is_whitespace) {
                Some((directive, param)) => (directive, param.trim()),
                None => (line, ""),
            };

            match directive {
                "root" => root = PathBuf::from(param),
                "exec" | "load" => match param.split_whitespace().next() {
                    Some(file) => self.entries.push(ManifestEntry::LoadModule {
                        path: root.join(file),
                        cmdline: param.to_string(),
                    }),
                    None => log::warn!("{}: `{}` without a file", path.display(), directive),
                },
                "conf" => self.parse_file(Path::new(param), root.clone())?,
                "addr" => {
                    let address = parse_hex(param).ok_or_else(|| {
                        Error::manifest(&path, ManifestError::InvalidAddress(param.to_string()))
                    })?;
                    self.entries.push(ManifestEntry::SetLoadAddress(address));
                }
                _ => log::warn!("ignored line: {:?}", line),
            }
        }
        self.chain.pop();
        Ok(())
    }
}

fn parse_hex(text: &str) -> Option<u64> {
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// Lexically resolves `.` and `..` so one file has one spelling
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
