//! List, test or extract an archive through the native engine.
//!
//! ```text
//! cargo run --example list_archive -- data.7z
//! cargo run --example list_archive -- --test --password hunter2 data.7z
//! cargo run --example list_archive -- --extract out/ data.zip
//! ```
//!
//! The engine is located through `--library`, then `--config`, then
//! `SEVENZIP_LIBRARY_PATH`, then next to the executable.

use anyhow::{bail, Context, Result};
use clap::Parser;
use lib_archive_types::{ArchiveFormat, ArchiveItem, AskMode, HostResult, OperationResult, PropId};
use lib_sevenzip_ffi::{
    load_config, ArchiveExtractCallback, FixedPassword, InArchive, LibraryConfig, LibraryManager,
    PasswordOpenCallback, PasswordProvider, SeekableReadStream, SequentialOutStream, WriteStream,
};
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "list_archive")]
#[command(about = "List, test or extract an archive with the 7-Zip engine", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Path to the engine module (7z.dll / 7z.so)
    #[arg(long)]
    library: Option<PathBuf>,

    /// TOML or JSON config file with `library_path`
    #[arg(long)]
    config: Option<PathBuf>,

    /// Archive format; guessed from the extension when omitted
    #[arg(short, long)]
    format: Option<ArchiveFormat>,

    /// Password for encrypted archives
    #[arg(short, long)]
    password: Option<String>,

    /// Print items as JSON
    #[arg(long)]
    json: bool,

    /// Test every item instead of listing
    #[arg(long, conflicts_with = "extract")]
    test: bool,

    /// Extract every item below this directory
    #[arg(long)]
    extract: Option<PathBuf>,

    /// Archive to open
    archive: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    let config = match (&cli.library, &cli.config) {
        (Some(path), _) => LibraryConfig::with_path(path),
        (None, Some(file)) => load_config(file)?,
        (None, None) => LibraryConfig::default().with_env_override(),
    };
    let manager = LibraryManager::from_config(&config);

    let format = match cli.format {
        Some(format) => format,
        None => guess_format(&cli.archive)?,
    };

    let mut archive = InArchive::create(&manager, format)
        .with_context(|| format!("engine at {}", manager.path().display()))?;
    let stream = SeekableReadStream::open(&cli.archive)
        .with_context(|| format!("opening {}", cli.archive.display()))?;
    let callback = PasswordOpenCallback::new(cli.password.clone().unwrap_or_default());
    archive
        .open(stream, None, callback)?
        .check()
        .with_context(|| format!("{} is not a readable {:?} archive", cli.archive.display(), format))?;

    if cli.test {
        run_extract(&archive, Extractor::testing(cli.password.clone()))
    } else if let Some(root) = &cli.extract {
        run_extract(&archive, Extractor::to_directory(root, &archive, cli.password.clone())?)
    } else {
        list(&archive, cli.json)
    }
}

fn guess_format(path: &Path) -> Result<ArchiveFormat> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match ArchiveFormat::ALL.iter().find(|f| f.extension() == extension) {
        Some(format) => Ok(*format),
        None => bail!("cannot guess the format of {}; pass --format", path.display()),
    }
}

fn list(archive: &InArchive, json: bool) -> Result<()> {
    let count = archive.number_of_items()?;
    let items: Vec<_> = (0..count).map(|index| archive.item(index)).collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }

    for item in &items {
        let kind = if item.is_dir { "D" } else { "-" };
        let crc = item.crc.map(|c| format!("{c:08X}")).unwrap_or_default();
        println!("{kind} {:>12} {:>12} {:>8}  {}", item.size, item.packed_size, crc, item.path);
    }
    if let Some(size) = archive.archive_property(PropId::PHY_SIZE).as_u64() {
        println!("{count} items, {size} bytes on disk");
    }
    Ok(())
}

fn run_extract(archive: &InArchive, extractor: Extractor) -> Result<()> {
    let test_mode = extractor.root.is_none();
    let extractor = archive.extract_all(test_mode, extractor)?.check()?;

    println!("{} ok, {} failed", extractor.ok, extractor.failed.len());
    for (index, result) in &extractor.failed {
        eprintln!("  item {index}: {result:?}");
    }
    if !extractor.failed.is_empty() {
        bail!("{} items failed", extractor.failed.len());
    }
    Ok(())
}

/// Extract callback that writes items below `root`, or only tests them.
struct Extractor {
    root: Option<PathBuf>,
    items: Vec<ArchiveItem>,
    password: Option<FixedPassword>,
    current: Option<u32>,
    ok: usize,
    failed: Vec<(u32, OperationResult)>,
}

impl Extractor {
    fn testing(password: Option<String>) -> Self {
        Self {
            root: None,
            items: Vec::new(),
            password: password.map(FixedPassword),
            current: None,
            ok: 0,
            failed: Vec::new(),
        }
    }

    fn to_directory(root: &Path, archive: &InArchive, password: Option<String>) -> Result<Self> {
        fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
        let count = archive.number_of_items()?;
        Ok(Self {
            root: Some(root.to_path_buf()),
            items: (0..count).map(|index| archive.item(index)).collect(),
            ..Self::testing(password)
        })
    }

    /// Destination of item `index`. Items escaping `root` are refused.
    fn destination(&self, root: &Path, index: u32) -> Option<(PathBuf, bool)> {
        let item = self.items.get(index as usize)?;
        let relative = Path::new(&item.path);
        if relative.components().all(|c| matches!(c, Component::Normal(_))) {
            Some((root.join(relative), item.is_dir))
        } else {
            tracing::warn!(index, path = %relative.display(), "Refusing path outside the target directory");
            None
        }
    }
}

impl ArchiveExtractCallback for Extractor {
    fn get_stream(&mut self, index: u32, mode: AskMode) -> HostResult<Option<Box<dyn SequentialOutStream>>> {
        self.current = Some(index);
        let Some(root) = self.root.clone() else {
            return Ok(None);
        };
        if mode != AskMode::Extract {
            return Ok(None);
        }
        let Some((target, is_dir)) = self.destination(&root, index) else {
            return Ok(None);
        };

        if is_dir {
            fs::create_dir_all(&target)?;
            return Ok(None);
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(Some(Box::new(WriteStream::new(File::create(&target)?))))
    }

    fn set_operation_result(&mut self, result: OperationResult) -> HostResult<()> {
        let index = self.current.take().unwrap_or(u32::MAX);
        if result.is_ok() {
            self.ok += 1;
        } else {
            self.failed.push((index, result));
        }
        Ok(())
    }

    fn password(&mut self) -> Option<&mut dyn PasswordProvider> {
        self.password.as_mut().map(|p| p as &mut dyn PasswordProvider)
    }
}
