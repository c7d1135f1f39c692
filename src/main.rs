/*!
 * UVFS - Command-Line Front End
 *
 * Drives the filesystem adapter directly, without a kernel bridge:
 * - Browse documents, categories and saved searches
 * - Read originals and dump the expanded tree
 * - Drop local files into the repository
 */

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use uvfs::vfs::paths::{top_level, SEARCH};
use uvfs::{init_tracing, Config, HttpRepository, OpenFlags, Pathname, Uvfs, UvfsError};

const READ_CHUNK: usize = 64 * 1024;

/// How long `put` waits for its upload before giving up
const UPLOAD_WAIT: Duration = Duration::from_secs(120);

#[derive(Debug, Parser)]
#[command(name = "uvfs", version, about = "Browse a document repository as a filesystem")]
struct Cli {
    /// Repository base URL
    #[arg(long, env = "UVFS_REPO_URL", global = true, default_value = "https://127.0.0.1:8090")]
    repo: String,

    /// Repository password
    #[arg(long, env = "UVFS_PASSWORD", global = true, hide_env_values = true)]
    password: Option<String>,

    /// Directory for searches.txt and the content cache
    #[arg(long, env = "UVFS_STATE_DIR", global = true)]
    state_dir: Option<PathBuf>,

    /// Seconds a fetched listing is trusted
    #[arg(long, env = "UVFS_EXPIRE_SECS", global = true)]
    expire_secs: Option<u64>,

    /// Keep fetched originals on disk
    #[arg(long, global = true)]
    cache_content: bool,

    /// Accept self-signed repository certificates
    #[arg(long, global = true)]
    insecure: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List a directory
    Ls { path: String },
    /// Print a file to stdout
    Cat { path: String },
    /// Print a node's attributes as JSON
    Stat { path: String },
    /// Dump the tree under a path, expanding it first
    Tree {
        #[arg(default_value = "/")]
        path: String,
    },
    /// Copy a local file into the mount, e.g. into a category
    Put { local: PathBuf, path: String },
    /// Save a search and list its hits
    Search { query: String },
    /// Print filesystem statistics
    Statfs,
    /// Delete a document from the repository
    Delete { doc_id: String },
}

impl Cli {
    fn config(&self) -> Config {
        let mut config = Config::from_env();
        config.repo_url = self.repo.clone();
        if let Some(password) = &self.password {
            config = config.with_password(password.clone());
        }
        if let Some(dir) = &self.state_dir {
            config = config.with_state_dir(dir.clone());
        }
        if let Some(secs) = self.expire_secs {
            config = config.with_expire_interval(Duration::from_secs(secs));
        }
        let cache_content = self.cache_content || config.cache_content;
        let accept_invalid_certs = self.insecure || config.accept_invalid_certs;
        config
            .with_cache_content(cache_content)
            .with_accept_invalid_certs(accept_invalid_certs)
    }
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = cli.config();

    let repo = HttpRepository::new(&config).context("cannot build repository client")?;
    let fs = Uvfs::mount(config, Arc::new(repo)).context("mount failed")?;

    let result = run(&fs, cli.command);
    if !fs.destroy(UPLOAD_WAIT) {
        eprintln!("uvfs: uploads still running at exit");
    }
    result
}

fn run(fs: &Uvfs, command: Command) -> Result<()> {
    let mut out = std::io::stdout().lock();
    match command {
        Command::Ls { path } => {
            for name in fs.readdir(&path)? {
                writeln!(out, "{}", name)?;
            }
        }
        Command::Cat { path } => {
            let fd = fs.open(&path, OpenFlags::read_only())?;
            let copied = copy_out(fs, fd, &mut out);
            fs.release(fd)?;
            copied?;
        }
        Command::Stat { path } => {
            let stat = fs.getattr(&path, None)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&stat)?)?;
        }
        Command::Tree { path } => {
            let path = Pathname::normalized(&path)?;
            write!(out, "{}", fs.store().display_tree(&path)?)?;
        }
        Command::Put { local, path } => {
            let bytes = std::fs::read(&local)
                .with_context(|| format!("cannot read {}", local.display()))?;
            let fd = match fs.create(&path, 0o644) {
                Ok(fd) => fd,
                Err(UvfsError::AlreadyExists(_)) => fs.open(&path, OpenFlags {
                    truncate: true,
                    ..OpenFlags::write_only()
                })?,
                Err(e) => return Err(e).with_context(|| format!("cannot create {}", path)),
            };
            let written = fs.write(fd, &bytes, 0);
            fs.release(fd)?;
            let written = written?;
            info!(path = %path, bytes = written, "copied into the mount");
        }
        Command::Search { query } => {
            let dir = format!("{}/{}", top_level(SEARCH), query);
            match fs.mkdir(&dir, 0o755) {
                Ok(()) | Err(UvfsError::AlreadyExists(_)) => {}
                Err(e) => return Err(e).with_context(|| format!("cannot save search {:?}", query)),
            }
            for name in fs.readdir(&dir)? {
                let entry = format!("{}/{}", dir, name);
                match fs.readlink(&entry) {
                    Ok(target) => writeln!(out, "{}\t-> {}", name, target)?,
                    Err(_) => writeln!(out, "{}", name)?,
                }
            }
        }
        Command::Statfs => {
            let stats = fs.statvfs("/")?;
            writeln!(out, "{}", serde_json::to_string_pretty(&stats)?)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&fs.store().stats())?)?;
        }
        Command::Delete { doc_id } => {
            fs.store().delete_document(&doc_id)?;
            writeln!(out, "deleted {}", doc_id)?;
        }
    }
    Ok(())
}

fn copy_out(fs: &Uvfs, fd: u64, out: &mut impl Write) -> Result<()> {
    let mut offset = 0u64;
    loop {
        let chunk = fs.read(fd, READ_CHUNK, offset)?;
        if chunk.is_empty() {
            return Ok(());
        }
        out.write_all(&chunk)?;
        offset += chunk.len() as u64;
    }
}
