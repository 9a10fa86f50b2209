use std::{io, sync::Arc};

use base64::{engine::general_purpose::STANDARD, Engine};
use log::{debug, info};
use serde::de::DeserializeOwned;
use url::Url;

use crate::{Catalog, DownloadStream, Error, Platform, Rom, RomPage, USER_AGENT_HEADER};

const ACCEPT_HEADER: &str = "application/json";

/// Blocking client for the catalog REST API.
pub struct Client {
    agent: ureq::Agent,
    base: Url,
    origin: String,
    /// Precomputed `Authorization` header value.
    authorization: Option<String>,
}

impl Client {
    pub fn new(url: &str, credentials: Option<(String, String)>) -> Result<Self, Error> {
        let tls = native_tls::TlsConnector::new()?;
        let agent = ureq::AgentBuilder::new()
            .tls_connector(Arc::new(tls))
            .user_agent(USER_AGENT_HEADER)
            .build();

        let origin = url.trim_end_matches('/').to_owned();
        let base = Url::parse(&format!("{origin}/"))?;

        let authorization = credentials.map(|(username, password)| {
            format!("Basic {}", STANDARD.encode(format!("{username}:{password}")))
        });

        Ok(Self {
            agent,
            base,
            origin,
            authorization,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, Error> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|()| Error::BadResponse("Catalog url cannot be a base".to_owned()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn call(&self, url: &Url, what: &str) -> Result<ureq::Response, Error> {
        debug!("GET {url}");

        let mut req = self.agent.request_url("GET", url);
        if let Some(authorization) = &self.authorization {
            req = req.set("Authorization", authorization);
        }

        req.set("Accept", ACCEPT_HEADER)
            .call()
            .map_err(|e| Error::from_ureq(e, what))
    }

    fn json<T: DeserializeOwned>(&self, url: &Url, what: &str) -> Result<T, Error> {
        self.call(url, what)?
            .into_json()
            .map_err(|e| Error::parse(&e, what))
    }
}

impl Catalog for Client {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn platforms(&self) -> Result<Vec<Platform>, Error> {
        info!("Fetching platform list from {}", self.origin);
        self.json(&self.url(&["api", "platforms"])?, "platform list")
    }

    fn roms(&self, platform_id: u64, offset: u64, limit: u64) -> Result<RomPage, Error> {
        let mut url = self.url(&["api", "roms"])?;
        url.query_pairs_mut()
            .append_pair("platform_id", &platform_id.to_string())
            .append_pair("offset", &offset.to_string())
            .append_pair("limit", &limit.to_string());

        self.json(&url, &format!("roms of platform {platform_id}"))
    }

    fn rom(&self, id: u64) -> Result<Rom, Error> {
        let id = id.to_string();
        self.json(&self.url(&["api", "roms", &id])?, &format!("rom {id}"))
    }

    fn content(&self, rom: &Rom) -> Result<DownloadStream<Box<dyn io::Read + Send>>, Error> {
        let id = rom.id.to_string();
        let url = self.url(&["api", "roms", &id, "content", &rom.fs_name])?;

        info!("Downloading content of rom {id} from {url}");
        let response = self.call(&url, &format!("content of rom {id}"))?;

        let len = response
            .header("Content-Length")
            .and_then(|h| h.parse::<u64>().ok());

        Ok(DownloadStream::new(response.into_reader(), len).boxed())
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Catalog, Error};

    use super::Client;

    #[test]
    fn urls() {
        let client = Client::new("https://romm.example.org/sub/", None).unwrap();

        assert_eq!(client.origin(), "https://romm.example.org/sub");
        assert_eq!(
            client
                .url(&["api", "roms", "1", "content", "Game (USA) #1.zip"])
                .unwrap()
                .as_str(),
            "https://romm.example.org/sub/api/roms/1/content/Game%20(USA)%20%231.zip"
        );
    }

    #[test]
    fn basic_auth() {
        let client =
            Client::new("http://localhost", Some(("user".into(), "pass".into()))).unwrap();
        assert_eq!(client.authorization.as_deref(), Some("Basic dXNlcjpwYXNz"));
    }

    #[test]
    fn status_taxonomy() {
        let status = |code| {
            let response = ureq::Response::new(code, "status", "").unwrap();
            Error::from_ureq(ureq::Error::Status(code, response), "rom 1")
        };

        assert!(matches!(status(401), Error::AuthExpired(401)));
        assert!(matches!(status(403), Error::AuthExpired(403)));
        assert!(matches!(status(404), Error::NotFound(_)));
        assert!(matches!(status(429), Error::RateLimited));
        assert!(matches!(status(502), Error::Server(502)));
        assert!(matches!(status(418), Error::BadResponse(_)));
    }

    #[test]
    #[ignore]
    fn list_platforms() {
        let client = Client::new("http://localhost:8080", None).unwrap();
        let platforms = client.platforms().unwrap();
        assert!(!platforms.is_empty());
    }
}
