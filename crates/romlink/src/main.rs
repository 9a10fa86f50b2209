use std::{io, process::Command, sync::Arc};

use clap::{Parser, Subcommand};
use log::info;
use romlink_catalog::{mp, Catalog, Client};
use romlink_cfg::Romlink;
use romlink_install::{
    host::{HostError, HostLibrary},
    store::{self, JsonStateStore, StateStore},
    CancellationToken, InstallRequest, Installer, Settings, UninstallRequest, Uninstaller,
};

use crate::{library::JsonLibrary, progress::BarSink};

mod library;
mod progress;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List catalog platforms and the library platforms mapped to them
    Platforms,
    /// List catalog roms of a mapped library platform
    Roms { platform: String },
    /// Add catalog roms of a mapped library platform to the library
    Import { platform: String },
    /// Download and install a library item
    Install { item: String },
    /// Remove the installed content of a library item
    Uninstall {
        item: String,
        /// Forget the install but keep the files on disk
        #[arg(long)]
        keep_files: bool,
    },
    /// Show install state of one or all library items
    Status { item: Option<String> },
    /// Config related commands
    Config {
        #[command(subcommand)]
        command: Config,
    },
}

#[derive(Subcommand)]
enum Config {
    /// Open config file in the editor
    Edit,
}

fn main() {
    let log = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Info)
        .with_module_level("romlink", log::LevelFilter::Trace)
        .with_module_level("romlink_install", log::LevelFilter::Trace)
        .with_module_level("romlink_catalog", log::LevelFilter::Trace);
    let max_level = log.max_level();
    let _ = indicatif_log_bridge::LogWrapper::new(mp().clone(), log).try_init();
    log::set_max_level(max_level);

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

#[derive(Debug)]
struct Platforms(Vec<String>);

impl std::fmt::Display for Platforms {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for platform in &self.0 {
            writeln!(f, "  - {platform}")?;
        }
        Ok(())
    }
}

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error("Xdg error. {0}")]
    Xdg(#[from] xdg::BaseDirectoriesError),
    #[error("Config error. {0}")]
    Config(#[from] romlink_cfg::Error),
    #[error("Catalog error. {0}")]
    Catalog(#[from] romlink_catalog::Error),
    #[error("Library error. {0}")]
    Library(#[from] HostError),
    #[error("State error. {0}")]
    State(#[from] store::Error),
    #[error("Import error. {0}")]
    Import(#[from] romlink_install::ImportError),
    #[error("Platform `{0}` is not configured. Configured platforms:\n{1}")]
    UnknownPlatform(String, Platforms),
    #[error("Install failed while {0}. {1}")]
    Install(romlink_install::InstallPhase, String),
    #[error("Uninstall failed. {0}")]
    Uninstall(String),
    #[error("IO error. {0}")]
    Io(#[from] io::Error),
}

struct Env {
    config: Romlink,
    xdg: xdg::BaseDirectories,
}

impl Env {
    fn client(&self) -> Result<Client, Error> {
        let credentials = self.config.server.credentials()?;
        Ok(Client::new(&self.config.server.url, credentials)?)
    }

    fn library(&self) -> Result<JsonLibrary, Error> {
        let path = match &self.config.paths.library {
            Some(path) => romlink_cfg::expand(path)?,
            None => self.xdg.place_data_file("library.json")?,
        };

        Ok(JsonLibrary::open(path)?)
    }

    fn store(&self) -> Result<JsonStateStore, Error> {
        let path = match &self.config.paths.state {
            Some(path) => romlink_cfg::expand(path)?,
            None => self.xdg.place_data_file("installs.json")?,
        };

        Ok(JsonStateStore::new(path))
    }

    fn settings(&self) -> Result<Settings, Error> {
        let temp = self.xdg.get_cache_home().join("tmp");
        Ok(Settings::from_config(&self.config, temp)?)
    }

    fn platform(&self, name: &str) -> Result<(&str, &romlink_cfg::PlatformMapping), Error> {
        self.config
            .platforms
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(n, m)| (n.as_str(), m))
            .ok_or_else(|| {
                Error::UnknownPlatform(
                    name.to_owned(),
                    Platforms(self.config.platforms.keys().cloned().collect()),
                )
            })
    }
}

fn run() -> Result<(), Error> {
    let cli = Cli::parse();
    let xdg = xdg::BaseDirectories::with_prefix("romlink")?;
    let config_file = xdg.get_config_file("romlink.yaml");

    if let Commands::Config {
        command: Config::Edit,
    } = cli.command
    {
        if let Some(path) = config_file.parent() {
            let _ = std::fs::create_dir_all(path);
        }
        let editor = std::env::var("EDITOR")
            .or(std::env::var("VISUAL"))
            .unwrap_or_else(|_| "vi".to_string());
        Command::new(editor).arg(&config_file).status()?;
        return Ok(());
    }

    let env = Env {
        config: romlink_cfg::read(config_file)?,
        xdg,
    };

    match cli.command {
        Commands::Platforms => platforms(&env)?,
        Commands::Roms { platform } => roms(&env, &platform)?,
        Commands::Import { platform } => import(&env, &platform)?,
        Commands::Install { item } => install(&env, item)?,
        Commands::Uninstall { item, keep_files } => uninstall(&env, item, keep_files)?,
        Commands::Status { item } => status(&env, item.as_deref())?,
        Commands::Config { .. } => {}
    }

    Ok(())
}

fn platforms(env: &Env) -> Result<(), Error> {
    for platform in env.client()?.platforms()? {
        let mapped = env
            .config
            .host_platforms(&platform.slug)
            .collect::<Vec<_>>()
            .join(", ");

        println!(
            "{:<16} {:<40} {:>6} roms  {}",
            platform.slug,
            platform.name,
            platform.rom_count,
            if mapped.is_empty() { "-" } else { &mapped }
        );
    }

    Ok(())
}

fn roms(env: &Env, platform: &str) -> Result<(), Error> {
    let (_, mapping) = env.platform(platform)?;
    let client = env.client()?;

    let remote = client
        .platforms()?
        .into_iter()
        .find(|p| p.slug == mapping.catalog)
        .ok_or_else(|| romlink_catalog::Error::NotFound(format!("platform {}", mapping.catalog)))?;

    for rom in client.all_roms(remote.id)? {
        println!("{:>8}  {:<50} {}", rom.id, rom.title(), rom.fs_name);
    }

    Ok(())
}

fn import(env: &Env, platform: &str) -> Result<(), Error> {
    let (name, mapping) = env.platform(platform)?;
    let client = env.client()?;
    let library = env.library()?;
    let store = env.store()?;

    let summary = romlink_install::import_platform(&client, &library, &store, name, mapping)?;
    println!(
        "{} added, {} linked, {} already imported",
        summary.added, summary.linked, summary.skipped
    );

    Ok(())
}

fn install(env: &Env, item: String) -> Result<(), Error> {
    let library = env.library()?;
    let title = library
        .item(&item)
        .map_or_else(|| item.clone(), |i| i.title);

    let installer = Installer::new(
        Arc::new(env.client()?),
        Arc::new(env.store()?),
        env.settings()?,
    );

    let sink = BarSink::new(&title);
    let result = installer.run(
        &InstallRequest::new(item, &library),
        &sink,
        &CancellationToken::new(),
    );
    sink.finish(&result.message);

    if !result.success {
        return Err(Error::Install(result.phase, result.message));
    }

    info!("{}", result.message);
    Ok(())
}

fn uninstall(env: &Env, item: String, keep_files: bool) -> Result<(), Error> {
    let library = env.library()?;
    let uninstaller = Uninstaller::new(
        env.config.server.origin(),
        Arc::new(env.store()?),
        env.settings()?,
    );

    let sink = BarSink::new(&item);
    let result = uninstaller.run(
        &UninstallRequest {
            item_id: item,
            host: &library,
            keep_files,
        },
        &sink,
    );
    sink.finish(&result.message);

    if !result.success {
        return Err(Error::Uninstall(result.message));
    }

    Ok(())
}

fn status(env: &Env, item: Option<&str>) -> Result<(), Error> {
    let store = env.store()?;
    let snapshots: Vec<_> = match item {
        Some(id) => store.get(id)?.into_iter().collect(),
        None => store.all()?,
    };

    for s in snapshots {
        let path = s
            .installed_path
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        let message = s.message.as_deref().unwrap_or_default();

        println!(
            "{:<38} {:<12} {:<22} {path} {message}",
            s.item_id,
            s.status.to_string(),
            s.phase.to_string()
        );
    }

    Ok(())
}
