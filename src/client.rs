use std::fs;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::REFERER;
use reqwest::Url;
use scraper::Html;

use crate::error::Error;
use crate::flaresolverr::FlareSolverr;

const RETRY_PAUSE: Duration = Duration::from_secs(1);

/// Facilitates response type selection in `Transport`
/// by converting the fetched and cached bytes to the requested type.
pub trait DataType: AsRef<[u8]> {
    fn from_response(response: Response) -> Result<Self, Error>
    where
        Self: Sized;
    fn from_bytes(contents: &[u8]) -> Self
    where
        Self: Sized;
}

impl DataType for String {
    fn from_response(response: Response) -> Result<Self, Error> {
        // While reqwest supports determining response’s character encoding from
        // the Content-Type HTTP header, sites that use a different encoding
        // will likely specify it inside the document anyway. Cached bytes are
        // decoded as UTF-8, so do the same for live responses to stay
        // consistent.
        let contents = response.bytes()?;
        Ok(String::from_utf8_lossy(&contents).to_string())
    }

    fn from_bytes(contents: &[u8]) -> Self {
        String::from_utf8_lossy(contents).to_string()
    }
}

impl DataType for Vec<u8> {
    fn from_response(response: Response) -> Result<Self, Error> {
        Ok(Vec::from(response.bytes()?))
    }

    fn from_bytes(contents: &[u8]) -> Self {
        Vec::from(contents)
    }
}

/// Blocking HTTP transport with an optional on-disk page cache and an
/// optional FlareSolverr detour for pages behind anti-bot challenges.
///
/// Transient failures (connection trouble, timeouts, 429/5xx) are retried
/// indefinitely with a short pause; there is no cap and no cancellation
/// path, so a persistently-down source blocks the caller. Non-transient
/// failures surface immediately.
pub struct Transport {
    client: Client,
    cache_dir: Option<PathBuf>,
    solver: Option<FlareSolverr>,
}

impl Transport {
    pub fn new(cache_dir: Option<PathBuf>) -> Result<Self, Error> {
        if let Some(dir) = &cache_dir {
            fs::create_dir_all(dir)?;
        }
        Ok(Transport {
            client: Client::new(),
            cache_dir,
            solver: None,
        })
    }

    /// Routes page fetches through the given FlareSolverr instance.
    pub fn with_solver(mut self, solver: FlareSolverr) -> Self {
        self.solver = Some(solver);
        self
    }

    /// Fetches and parses an HTML page.
    pub fn fetch_document(&self, url: &Url) -> Result<Html, Error> {
        let page = self.fetch_page(url)?;
        Ok(Html::parse_document(&page))
    }

    /// Fetches a page as text, through the solver when one is attached.
    /// Solver failures are configuration problems, not transient weather,
    /// so they are not retried.
    pub fn fetch_page(&self, url: &Url) -> Result<String, Error> {
        if let Some(cached) = self.cached(url)? {
            return Ok(String::from_utf8_lossy(&cached).to_string());
        }
        let page = match &self.solver {
            Some(solver) => solver.get(url)?,
            None => self.fetch_retrying::<String>(url, None)?,
        };
        self.store(url, page.as_bytes())?;
        Ok(page)
    }

    /// Fetches a binary resource, always over the direct connection. The
    /// cover host wants to see the story page as referer.
    pub fn fetch_bytes(&self, url: &Url, referer: Option<&Url>) -> Result<Vec<u8>, Error> {
        if let Some(cached) = self.cached(url)? {
            return Ok(cached);
        }
        let contents = self.fetch_retrying::<Vec<u8>>(url, referer)?;
        self.store(url, &contents)?;
        Ok(contents)
    }

    fn fetch_retrying<T: DataType>(&self, url: &Url, referer: Option<&Url>) -> Result<T, Error> {
        loop {
            match self.fetch_once(url, referer) {
                Ok(contents) => return Ok(contents),
                Err(error) if error.is_transient() => thread::sleep(RETRY_PAUSE),
                Err(error) => return Err(error),
            }
        }
    }

    fn fetch_once<T: DataType>(&self, url: &Url, referer: Option<&Url>) -> Result<T, Error> {
        let mut request = self.client.get(url.clone());
        if let Some(referer) = referer {
            request = request.header(REFERER, referer.as_str());
        }
        let response = request.send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Status {
                url: url.to_string(),
                status,
            });
        }
        T::from_response(response)
    }

    fn cache_path(&self, url: &Url) -> Option<PathBuf> {
        self.cache_dir
            .as_ref()
            .map(|dir| dir.join(url.to_string().replace('/', "%2F")))
    }

    fn cached(&self, url: &Url) -> Result<Option<Vec<u8>>, Error> {
        match self.cache_path(url) {
            Some(path) if path.exists() => Ok(Some(fs::read(path)?)),
            _ => Ok(None),
        }
    }

    fn store(&self, url: &Url, contents: &[u8]) -> Result<(), Error> {
        if let Some(path) = self.cache_path(url) {
            fs::write(path, contents)?;
        }
        Ok(())
    }
}

#[test]
fn test_cache_paths_flatten_urls() {
    let transport = Transport {
        client: Client::new(),
        cache_dir: Some(PathBuf::from("/tmp/fanrip-test")),
        solver: None,
    };
    let url = Url::parse("https://www.fanfiction.net/s/12345/3").unwrap();
    assert_eq!(
        PathBuf::from("/tmp/fanrip-test/https:%2F%2Fwww.fanfiction.net%2Fs%2F12345%2F3"),
        transport.cache_path(&url).unwrap()
    );
}

#[test]
fn test_cacheless_transport_has_no_cache_paths() {
    let transport = Transport::new(None).unwrap();
    let url = Url::parse("https://www.fanfiction.net/s/12345/").unwrap();
    assert!(transport.cache_path(&url).is_none());
    assert!(transport.cached(&url).unwrap().is_none());
}
