use std::{
    env::VarError,
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use indexmap::IndexMap;
use path_absolutize::Absolutize;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(30);

#[serde_as]
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Romlink {
    pub server: Server,
    #[serde(default)]
    pub paths: Paths,
    #[serde(default)]
    pub installer: Installer,
    /// Upper bound for the metadata request made at the start of an install.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout: Duration,
    /// Host platform name to catalog platform mapping. Order is preserved for listings.
    #[serde(default)]
    pub platforms: IndexMap<String, PlatformMapping>,
}

fn default_metadata_timeout() -> Duration {
    DEFAULT_METADATA_TIMEOUT
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub url: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl Server {
    /// Credentials with environment references expanded.
    pub fn credentials(&self) -> Result<Option<(String, String)>, Error> {
        let (Some(username), Some(password)) = (&self.username, &self.password) else {
            return Ok(None);
        };

        let username = shellexpand::env(username)?.into_owned();
        let password = shellexpand::env(password)?.into_owned();

        Ok(Some((username, password)))
    }

    /// Scheme and host of the server url, used as the origin recorded in install state.
    #[must_use]
    pub fn origin(&self) -> &str {
        self.url.trim_end_matches('/')
    }
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Paths {
    pub host_root: Option<String>,
    pub temp: Option<String>,
    pub library: Option<String>,
    pub state: Option<String>,
}

#[derive(Default, Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Installer {
    /// Command prefix for running Windows installers, e.g. `["wine"]`.
    #[serde(default)]
    pub wrapper: Vec<String>,
}

#[derive(Serialize, Deserialize, Default, Copy, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "kebab-case")]
pub enum Extraction {
    #[default]
    None,
    Direct,
    Subfolder,
}

#[derive(Serialize, Deserialize, Default, Copy, Clone, PartialEq, Eq, Debug)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    #[default]
    Basic,
    Enhanced,
    Installer,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlatformMapping {
    /// Platform slug on the catalog server.
    pub catalog: String,
    /// Content for this platform is installed with the Windows install subsystem.
    #[serde(default)]
    pub native: bool,
    pub install_dir: String,
    #[serde(default)]
    pub download_dir: Option<String>,
    #[serde(default)]
    pub extraction: Extraction,
    #[serde(default)]
    pub scenario: Scenario,
    #[serde(default)]
    pub target_file: Option<String>,
    #[serde(default)]
    pub installer_file: Option<String>,
    #[serde(default)]
    pub installer_args: Vec<String>,
    #[serde(default)]
    pub target_dir_flag: Option<String>,
    #[serde(default)]
    pub emulator: Option<String>,
}

impl PlatformMapping {
    pub fn install_dir(&self) -> Result<PathBuf, Error> {
        expand(&self.install_dir)
    }

    pub fn download_dir(&self) -> Result<PathBuf, Error> {
        expand(self.download_dir.as_deref().unwrap_or(&self.install_dir))
    }
}

impl Romlink {
    /// Finds a mapping by host platform name, ignoring case.
    #[must_use]
    pub fn platform(&self, host_platform: &str) -> Option<&PlatformMapping> {
        self.platforms
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(host_platform))
            .map(|(_, mapping)| mapping)
    }

    /// Host platform names mapped to the given catalog slug.
    pub fn host_platforms<'a>(&'a self, slug: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.platforms
            .iter()
            .filter(move |(_, m)| m.catalog == slug)
            .map(|(name, _)| name.as_str())
    }
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO error. {0}")]
    Io(#[from] io::Error),
    #[error("Yaml error. {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config file does not exist at `{0}`")]
    NoConfig(PathBuf),
    #[error("Unable to expand path. {0}")]
    Expand(#[from] shellexpand::LookupError<VarError>),
}

/// Expands `~` and environment variables and makes the path absolute.
pub fn expand(path: &str) -> Result<PathBuf, Error> {
    let path = shellexpand::full(path)?;
    Ok(Path::new(path.as_ref()).absolutize()?.into_owned())
}

pub fn read(path: PathBuf) -> Result<Romlink, Error> {
    if !path.exists() {
        return Err(Error::NoConfig(path));
    }

    let cfg = std::fs::read(&path)?;
    parse(&cfg)
}

pub fn parse(cfg: &[u8]) -> Result<Romlink, Error> {
    let mut cfg: serde_yaml::Value = serde_yaml::from_slice(cfg)?;
    cfg.apply_merge()?;
    let cfg: Romlink = serde_yaml::from_value(cfg)?;

    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use std::{path::Path, time::Duration};

    use pretty_assertions::assert_eq;

    use crate::{expand, parse, read, Error, Extraction, Scenario};

    #[test]
    fn deserialize() {
        let cfg = parse(include_bytes!("../tests/test.yaml")).unwrap();

        assert_eq!(cfg.server.url, "https://romm.example.org/");
        assert_eq!(cfg.server.origin(), "https://romm.example.org");
        assert_eq!(cfg.metadata_timeout, Duration::from_secs(45));
        assert_eq!(cfg.installer.wrapper, vec!["wine".to_owned()]);

        let names = cfg.platforms.keys().map(String::as_str).collect::<Vec<_>>();
        assert_eq!(
            names,
            ["Windows", "Windows Installers", "Sony Playstation", "Nintendo 64"]
        );

        let windows = cfg.platform("windows").unwrap();
        assert!(windows.native);
        assert_eq!(windows.extraction, Extraction::Direct);

        // Merged from the `windows` anchor, with the slug overridden.
        let installers = cfg.platform("Windows Installers").unwrap();
        assert!(installers.native);
        assert_eq!(installers.catalog, "win-setup");
        assert_eq!(installers.install_dir, windows.install_dir);

        let psx = cfg.platform("Sony Playstation").unwrap();
        assert_eq!(psx.scenario, Scenario::Enhanced);
        assert_eq!(psx.extraction, Extraction::Subfolder);
        assert_eq!(psx.target_file.as_deref(), Some("*.cue"));
        assert_eq!(psx.emulator.as_deref(), Some("DuckStation"));

        let n64 = cfg.platform("Nintendo 64").unwrap();
        assert_eq!(n64.scenario, Scenario::Basic);
        assert_eq!(n64.extraction, Extraction::None);

        assert_eq!(
            cfg.host_platforms("win").collect::<Vec<_>>(),
            vec!["Windows"]
        );
    }

    #[test]
    fn defaults() {
        let cfg = parse(b"server:\n  url: http://localhost\n").unwrap();

        assert_eq!(cfg.metadata_timeout, Duration::from_secs(30));
        assert!(cfg.platforms.is_empty());
        assert!(cfg.installer.wrapper.is_empty());
        assert_eq!(cfg.server.credentials().unwrap(), None);
    }

    #[test]
    fn missing_config() {
        let err = read(Path::new("does/not/exist.yaml").to_path_buf()).unwrap_err();
        assert!(matches!(err, Error::NoConfig(_)));
    }

    #[test]
    fn expand_absolute() {
        assert_eq!(expand("/a/b/../c").unwrap(), Path::new("/a/c"));
    }
}
