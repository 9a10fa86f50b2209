use std::io;

use serde::{Deserialize, Serialize};

pub use client::Client;
pub use download::{mp, DownloadStream};

mod client;
mod download;

pub const USER_AGENT_HEADER: &str = "romlink";

/// Page size used when walking a platform listing.
pub const PAGE_SIZE: u64 = 250;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("TLS error. {0}")]
    Tls(#[from] native_tls::Error),
    #[error("Authentication expired or was rejected (HTTP {0}).")]
    AuthExpired(u16),
    #[error("Not found: {0}.")]
    NotFound(String),
    #[error("Rate limited by the catalog server.")]
    RateLimited,
    #[error("Catalog server error (HTTP {0}).")]
    Server(u16),
    #[error("Bad response from the catalog server. {0}")]
    BadResponse(String),
    #[error("Unable to reach the catalog server. {0}")]
    Transport(#[from] Box<ureq::Transport>),
    #[error("Invalid catalog url. {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Maps a failed request onto the error taxonomy. `what` names the requested resource.
    #[must_use]
    pub fn from_ureq(err: ureq::Error, what: &str) -> Self {
        match err {
            ureq::Error::Status(code @ (401 | 403), _) => Error::AuthExpired(code),
            ureq::Error::Status(404, _) => Error::NotFound(what.to_owned()),
            ureq::Error::Status(429, _) => Error::RateLimited,
            ureq::Error::Status(code, _) if code >= 500 => Error::Server(code),
            ureq::Error::Status(code, _) => {
                Error::BadResponse(format!("Unexpected HTTP status {code} for {what}"))
            }
            ureq::Error::Transport(t) => Error::Transport(Box::new(t)),
        }
    }

    fn parse(err: &io::Error, what: &str) -> Self {
        Error::BadResponse(format!("Unable to parse {what}. {err}"))
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub id: u64,
    pub slug: String,
    pub name: String,
    #[serde(default)]
    pub rom_count: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RomFile {
    pub file_name: String,
    #[serde(default)]
    pub file_size_bytes: u64,
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct Rom {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub fs_name: String,
    #[serde(default)]
    pub fs_size_bytes: u64,
    pub platform_id: u64,
    #[serde(default)]
    pub platform_slug: String,
    #[serde(default)]
    pub files: Vec<RomFile>,
}

impl Rom {
    /// Display name, falling back to the file name without its extension.
    #[must_use]
    pub fn title(&self) -> &str {
        match &self.name {
            Some(name) if !name.trim().is_empty() => name,
            _ => self
                .fs_name
                .rsplit_once('.')
                .map_or(self.fs_name.as_str(), |(stem, _)| stem),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq, Eq)]
pub struct RomPage {
    pub items: Vec<Rom>,
    pub total: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

pub trait Catalog: Send + Sync {
    /// Server origin recorded alongside imported items.
    fn origin(&self) -> &str;

    fn platforms(&self) -> Result<Vec<Platform>, Error>;

    fn roms(&self, platform_id: u64, offset: u64, limit: u64) -> Result<RomPage, Error>;

    fn rom(&self, id: u64) -> Result<Rom, Error>;

    /// Streams the content file of a rom.
    fn content(&self, rom: &Rom) -> Result<DownloadStream<Box<dyn io::Read + Send>>, Error>;

    fn all_roms(&self, platform_id: u64) -> Result<Vec<Rom>, Error> {
        let mut roms = Vec::new();

        loop {
            let page = self.roms(platform_id, roms.len() as u64, PAGE_SIZE)?;
            let done = page.items.is_empty();
            roms.extend(page.items);

            if done || roms.len() as u64 >= page.total {
                break;
            }
        }

        Ok(roms)
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex};

    use pretty_assertions::assert_eq;

    use crate::{Catalog, DownloadStream, Error, Platform, Rom, RomPage};

    fn rom(id: u64) -> Rom {
        Rom {
            id,
            name: None,
            fs_name: format!("Game {id}.zip"),
            fs_size_bytes: 0,
            platform_id: 1,
            platform_slug: "n64".into(),
            files: vec![],
        }
    }

    struct Paged {
        total: u64,
        calls: Mutex<Vec<(u64, u64)>>,
    }

    impl Catalog for Paged {
        fn origin(&self) -> &str {
            "http://test"
        }

        fn platforms(&self) -> Result<Vec<Platform>, Error> {
            Ok(vec![])
        }

        fn roms(&self, _: u64, offset: u64, limit: u64) -> Result<RomPage, Error> {
            self.calls.lock().unwrap().push((offset, limit));
            let end = (offset + 2).min(self.total);
            Ok(RomPage {
                items: (offset..end).map(rom).collect(),
                total: self.total,
                offset,
                limit,
            })
        }

        fn rom(&self, id: u64) -> Result<Rom, Error> {
            Ok(rom(id))
        }

        fn content(&self, _: &Rom) -> Result<DownloadStream<Box<dyn io::Read + Send>>, Error> {
            Err(Error::NotFound("content".into()))
        }
    }

    #[test]
    fn all_roms_walks_pages() {
        let catalog = Paged {
            total: 5,
            calls: Mutex::default(),
        };

        let roms = catalog.all_roms(1).unwrap();

        assert_eq!(roms.iter().map(|r| r.id).collect::<Vec<_>>(), [0, 1, 2, 3, 4]);
        assert_eq!(catalog.calls.lock().unwrap().len(), 3);
    }

    #[test]
    fn title_fallback() {
        let mut r = rom(3);
        assert_eq!(r.title(), "Game 3");

        r.name = Some("Super Game".into());
        assert_eq!(r.title(), "Super Game");

        r.name = Some("  ".into());
        r.fs_name = "noext".into();
        assert_eq!(r.title(), "noext");
    }

    #[test]
    fn rom_deserialize() {
        let rom: Rom = serde_json::from_str(include_str!("../tests/rom.json")).unwrap();

        assert_eq!(rom.id, 42);
        assert_eq!(rom.title(), "Outer Wilds");
        assert_eq!(rom.platform_slug, "win");
        assert_eq!(rom.files.len(), 1);
    }
}
