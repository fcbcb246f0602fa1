use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use datapack::archive::EntryReader;
use datapack::config::{self, Config};
use datapack::extract::DirectoryExtractor;
use datapack::key_manager::{Passphrase, PrivateKeyMaterial, PublicKeyMaterial};
use datapack::metadata::{ManifestHook, MetadataHook, NoMetadata, PackageContext};
use datapack::pipeline::{self, EntrySink, Packer, Summary};
use datapack::{format, PackageFormat};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, IsTerminal, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

/// Name that selects standard input or output instead of a file.
const STDIO: &str = "-";

/// datapack - pack directories into tar.gz, zip or OpenPGP-encrypted packages
#[derive(Parser)]
#[command(name = "datapack")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Pack a directory into a package
    Pack {
        /// Directory to pack
        dir: PathBuf,

        /// Package file to create (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compression override, e.g. .tar.gz or .zip
        #[arg(long = "comp")]
        compression: Option<String>,

        /// Armored public key of the recipient
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// Only verify the directory metadata, do not pack
        #[arg(long)]
        verify_only: bool,

        /// Maintain manifest.json in the directory
        #[arg(long)]
        manifest: bool,
    },

    /// Unpack a package into a directory
    Unpack {
        /// Package file, or - for stdin
        package: PathBuf,

        /// Destination directory (defaults to the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Compression override, e.g. .tar.gz or .zip
        #[arg(long = "comp")]
        compression: Option<String>,

        /// Armored private key
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// File holding the private key passphrase
        #[arg(long)]
        passphrase_file: Option<PathBuf>,

        /// Verify manifest.json after unpacking
        #[arg(long)]
        manifest: bool,
    },

    /// List the entries of a package without extracting
    Inspect {
        /// Package file, or - for stdin
        package: PathBuf,

        /// Compression override, e.g. .tar.gz or .zip
        #[arg(long = "comp")]
        compression: Option<String>,

        /// Armored private key
        #[arg(short, long)]
        key: Option<PathBuf>,

        /// File holding the private key passphrase
        #[arg(long)]
        passphrase_file: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    // Logs go to stderr so a package written to stdout stays clean.
    // Use RUST_LOG to control the level (e.g., RUST_LOG=debug,datapack=trace)
    fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    let cli = Cli::parse();
    info!(command = ?cli.command, "datapack starting");
    let config = Config::load_with_env(cli.config.as_deref())?;

    match cli.command {
        Commands::Pack {
            dir,
            output,
            compression,
            key,
            verify_only,
            manifest,
        } => {
            let cfg = config.with_overrides(key, None, compression)?;
            cmd_pack(&cfg, &dir, output.as_deref(), verify_only, manifest)
        }

        Commands::Unpack {
            package,
            output,
            compression,
            key,
            passphrase_file,
            manifest,
        } => {
            let cfg = config.with_overrides(key, passphrase_file, compression)?;
            cmd_unpack(&cfg, &package, output.as_deref(), manifest)
        }

        Commands::Inspect {
            package,
            compression,
            key,
            passphrase_file,
        } => {
            let cfg = config.with_overrides(key, passphrase_file, compression)?;
            cmd_inspect(&cfg, &package)
        }
    }
}

/// Create a spinner for indeterminate operations, drawn only on a terminal
fn create_spinner(message: &str) -> ProgressBar {
    if !io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn metadata_hook(manifest: bool) -> Box<dyn MetadataHook> {
    if manifest {
        Box::new(ManifestHook)
    } else {
        Box::new(NoMetadata)
    }
}

fn is_stdio(path: &Path) -> bool {
    path.as_os_str() == STDIO
}

/// Pack a directory
fn cmd_pack(cfg: &Config, dir: &Path, output: Option<&Path>, verify_only: bool, manifest: bool) -> Result<()> {
    if !dir.is_dir() {
        anyhow::bail!("{} is not a directory", dir.display());
    }

    metadata_hook(manifest)
        .create_or_verify(&PackageContext::new(dir).verify_only(verify_only))
        .with_context(|| format!("checking metadata in {}", dir.display()))?;
    if verify_only {
        eprintln!("Metadata in {} verified", dir.display());
        return Ok(());
    }

    let key_given = cfg.key_path.is_some();
    let compression = cfg.compression.as_deref();
    let output = output.filter(|p| !is_stdio(p));
    let format = match output {
        Some(path) => format::resolve(path, compression, key_given)?,
        None => format::resolve_unnamed(compression, key_given)?,
    };
    let key = cfg
        .key_path
        .as_deref()
        .map(PublicKeyMaterial::load)
        .transpose()
        .context("loading public key")?;

    let spinner = create_spinner(&format!("Packing {}", dir.display()));
    let (summary, written) = match output {
        Some(path) => {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(path)
                .with_context(|| format!("creating {}", path.display()))?;
            let result = pack_into(BufWriter::new(file), dir, format, key.as_ref(), &spinner);
            if result.is_err() {
                warn!(path = %path.display(), "removing incomplete package");
                let _ = fs::remove_file(path);
            }
            result?
        }
        None => pack_into(io::stdout().lock(), dir, format, key.as_ref(), &spinner)?,
    };

    spinner.finish_and_clear();
    eprintln!(
        "Packed {} files ({} bytes) as {}",
        summary.entries,
        summary.bytes,
        written.suffix()
    );
    Ok(())
}

/// Pack `dir` into `sink`; returns the format actually written.
fn pack_into<W: Write>(
    sink: W,
    dir: &Path,
    format: PackageFormat,
    key: Option<&PublicKeyMaterial>,
    spinner: &ProgressBar,
) -> Result<(Summary, PackageFormat)> {
    let mut packer = Packer::new(sink, format, key)?;
    let written = packer.format();
    packer.pack_dir_with(dir, |entry| spinner.set_message(format!("Packing {}", entry.name)))?;
    let (_sink, summary) = packer.finish()?;
    Ok((summary, written))
}

/// Resolve the format of an existing package and load the key it needs
fn open_for_reading(cfg: &Config, package: &Path) -> Result<(PackageFormat, Option<PrivateKeyMaterial>)> {
    let key_given = cfg.key_path.is_some();
    let compression = cfg.compression.as_deref();
    let format = if is_stdio(package) {
        format::resolve_unnamed(compression, key_given)?
    } else {
        format::resolve(package, compression, key_given)?
    };

    let key = match cfg.key_path.as_deref() {
        Some(path) => {
            config::warn_if_public(path, "private key file");
            let passphrase = Passphrase::resolve(cfg.passphrase_path.as_deref())?;
            Some(PrivateKeyMaterial::load(path, &passphrase).context("loading private key")?)
        }
        None => None,
    };
    Ok((format, key))
}

fn read_package(
    package: &Path,
    format: PackageFormat,
    key: Option<&PrivateKeyMaterial>,
    sink: &mut dyn EntrySink,
) -> Result<Summary> {
    if is_stdio(package) {
        return Ok(pipeline::unpack(io::stdin().lock(), format, key, sink)?);
    }
    let file = File::open(package).with_context(|| format!("opening {}", package.display()))?;
    Ok(pipeline::unpack_seekable(file, format, key, sink)?)
}

/// Unpack a package into a directory
fn cmd_unpack(cfg: &Config, package: &Path, output: Option<&Path>, manifest: bool) -> Result<()> {
    let (format, key) = open_for_reading(cfg, package)?;
    let root = output.unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;

    let spinner = create_spinner(&format!("Unpacking {}", package.display()));
    let mut extractor = DirectoryExtractor::new(root);
    let summary = read_package(package, format, key.as_ref(), &mut extractor)?;
    spinner.finish_and_clear();

    metadata_hook(manifest)
        .create_or_verify(&PackageContext::new(root).verify_only(true))
        .with_context(|| format!("verifying metadata in {}", root.display()))?;

    eprintln!(
        "Unpacked {} files ({} bytes) into {}",
        summary.entries,
        summary.bytes,
        root.display()
    );
    Ok(())
}

/// List package entries
fn cmd_inspect(cfg: &Config, package: &Path) -> Result<()> {
    let (format, key) = open_for_reading(cfg, package)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();

    writeln!(out, "{:<6} {:>12}  {}", "MODE", "SIZE", "NAME")?;
    let mut list = |entry: &mut EntryReader<'_>| -> datapack::error::Result<()> {
        let meta = entry.entry();
        writeln!(out, "{:04o}   {:>12}  {}", meta.mode, meta.size, meta.name)?;
        Ok(())
    };
    let summary = read_package(package, format, key.as_ref(), &mut list)?;

    eprintln!(
        "{} entries, {} bytes ({})",
        summary.entries,
        summary.bytes,
        format.suffix()
    );
    Ok(())
}
