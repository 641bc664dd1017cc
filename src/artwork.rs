use std::{
    collections::hash_map::DefaultHasher,
    hash::{Hash, Hasher},
    io::Read,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
    time::Duration,
};

use image::{imageops::FilterType, RgbaImage};
use log::{debug, info};
use thiserror::Error;

pub const DEFAULT_ARTWORK_SIZE: u32 = 300;
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArtworkError {
    #[error("artwork request failed: {0}")]
    Transport(String),

    #[error("artwork request returned status {0}")]
    Status(u16),

    #[error("artwork response was empty")]
    Empty,

    #[error("failed to decode artwork: {0}")]
    Decode(String),

    #[error("artwork request was superseded")]
    Cancelled,
}

/// A decoded cover, already resized to the display canvas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artwork {
    pub url: String,
    /// Hash of the raw bytes as downloaded.
    pub hash: u64,
    pub image: RgbaImage,
}

impl Artwork {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Source of raw artwork bytes.
pub trait ArtworkFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ArtworkError>;
}

/// HTTP fetcher with a per-request timeout.
#[derive(Clone, Debug)]
pub struct UreqFetcher {
    agent: ureq::Agent,
}

impl UreqFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }
}

impl Default for UreqFetcher {
    fn default() -> Self {
        Self::new(DEFAULT_FETCH_TIMEOUT)
    }
}

impl ArtworkFetcher for UreqFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, ArtworkError> {
        debug!("GET artwork {}", url);

        let response = match self.agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) => return Err(ArtworkError::Status(code)),
            Err(err) => return Err(ArtworkError::Transport(err.to_string())),
        };

        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| ArtworkError::Transport(e.to_string()))?;

        if bytes.is_empty() {
            return Err(ArtworkError::Empty);
        }
        Ok(bytes)
    }
}

fn hash_bytes(data: &[u8]) -> u64 {
    let mut hasher = DefaultHasher::new();
    data.hash(&mut hasher);
    hasher.finish()
}

/// Decodes `bytes` and resizes the result to a `size` x `size` canvas.
pub fn decode_artwork(bytes: &[u8], size: u32) -> Result<RgbaImage, ArtworkError> {
    let image = image::load_from_memory(bytes).map_err(|e| ArtworkError::Decode(e.to_string()))?;
    Ok(image
        .resize_exact(size, size, FilterType::Lanczos3)
        .to_rgba8())
}

pub fn load_artwork(
    fetcher: &dyn ArtworkFetcher,
    url: &str,
    size: u32,
) -> Result<Artwork, ArtworkError> {
    let bytes = fetcher.fetch(url)?;
    let hash = hash_bytes(&bytes);
    let image = decode_artwork(&bytes, size)?;
    Ok(Artwork {
        url: url.to_string(),
        hash,
        image,
    })
}

/// A background fetch the cache expects to hear back about.
#[derive(Debug, Clone)]
pub struct ArtworkRequest {
    pub request_id: u64,
    pub url: String,
    cancel: Arc<AtomicBool>,
}

impl ArtworkRequest {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.cancel.store(true, Ordering::Release);
    }
}

/// Result of a background fetch, fed back into the update queue.
#[derive(Debug)]
pub struct ArtworkMessage {
    pub request_id: u64,
    pub url: String,
    pub result: Result<Artwork, ArtworkError>,
}

/// What the cache wants done for a newly seen URL.
#[derive(Debug)]
pub enum ArtworkLookup {
    /// Same URL as last time; nothing to do.
    Unchanged,
    /// The URL went empty; the cached picture was dropped.
    Cleared,
    Fetch(ArtworkRequest),
}

/// Remembers the last requested URL and the last decoded picture.
///
/// The URL is recorded as soon as a fetch is issued, so a failing URL is not
/// retried until a different URL shows up.
pub struct ArtworkCache {
    size: u32,
    url: String,
    current: Option<Arc<Artwork>>,
    inflight: Option<ArtworkRequest>,
    next_request_id: u64,
}

impl ArtworkCache {
    pub fn new(size: u32) -> Self {
        Self {
            size: size.max(1),
            url: String::new(),
            current: None,
            inflight: None,
            next_request_id: 1,
        }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn current(&self) -> Option<Arc<Artwork>> {
        self.current.clone()
    }

    pub fn inflight(&self) -> Option<&ArtworkRequest> {
        self.inflight.as_ref()
    }

    /// Blocking resolution: fetches and decodes inline when `url` is new.
    ///
    /// On failure the previous picture stays cached.
    pub fn resolve(
        &mut self,
        url: &str,
        fetcher: &dyn ArtworkFetcher,
    ) -> Result<Option<Arc<Artwork>>, ArtworkError> {
        if url == self.url {
            return Ok(self.current());
        }

        self.url = url.to_string();
        self.supersede_inflight();
        if url.is_empty() {
            self.current = None;
            return Ok(None);
        }

        let artwork = load_artwork(fetcher, url, self.size)?;
        info!("Resolved artwork {} ({}x{})", url, artwork.width(), artwork.height());
        self.current = Some(Arc::new(artwork));
        Ok(self.current())
    }

    /// Non-blocking counterpart of [`resolve`](Self::resolve): decides whether
    /// a fetch is needed and hands out the request to run elsewhere.
    pub fn begin(&mut self, url: &str) -> ArtworkLookup {
        if url == self.url {
            return ArtworkLookup::Unchanged;
        }

        self.url = url.to_string();
        self.supersede_inflight();
        if url.is_empty() {
            self.current = None;
            return ArtworkLookup::Cleared;
        }

        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let request = ArtworkRequest {
            request_id,
            url: url.to_string(),
            cancel: Arc::new(AtomicBool::new(false)),
        };
        self.inflight = Some(request.clone());
        ArtworkLookup::Fetch(request)
    }

    /// Applies a finished background fetch. Returns `None` for results of
    /// superseded requests.
    pub fn complete(
        &mut self,
        message: ArtworkMessage,
    ) -> Option<Result<Arc<Artwork>, ArtworkError>> {
        let expected = self.inflight.as_ref().map(|request| request.request_id);
        if expected != Some(message.request_id) {
            debug!(
                "Dropping stale artwork result #{} for {}",
                message.request_id, message.url
            );
            return None;
        }
        self.inflight = None;

        match message.result {
            Ok(artwork) => {
                info!(
                    "Loaded artwork {} ({}x{})",
                    artwork.url,
                    artwork.width(),
                    artwork.height()
                );
                let artwork = Arc::new(artwork);
                self.current = Some(artwork.clone());
                Some(Ok(artwork))
            }
            Err(err) => Some(Err(err)),
        }
    }

    fn supersede_inflight(&mut self) {
        if let Some(request) = self.inflight.take() {
            debug!("Cancelling artwork request #{} for {}", request.request_id, request.url);
            request.cancel();
        }
    }
}

/// Runs artwork fetches on their own threads.
#[derive(Clone)]
pub struct ArtworkLoader {
    fetcher: Arc<dyn ArtworkFetcher>,
    size: u32,
}

impl ArtworkLoader {
    pub fn new(fetcher: Arc<dyn ArtworkFetcher>, size: u32) -> Self {
        Self {
            fetcher,
            size: size.max(1),
        }
    }

    pub fn fetcher(&self) -> &dyn ArtworkFetcher {
        self.fetcher.as_ref()
    }

    /// Starts `request` in the background and passes the outcome to `deliver`.
    pub fn spawn<F>(&self, request: ArtworkRequest, deliver: F) -> std::io::Result<()>
    where
        F: FnOnce(ArtworkMessage) + Send + 'static,
    {
        let fetcher = self.fetcher.clone();
        let size = self.size;

        thread::Builder::new()
            .name(format!("artwork-{}", request.request_id))
            .spawn(move || {
                let result = if request.is_cancelled() {
                    Err(ArtworkError::Cancelled)
                } else {
                    fetcher.fetch(&request.url).and_then(|bytes| {
                        if request.is_cancelled() {
                            return Err(ArtworkError::Cancelled);
                        }
                        let hash = hash_bytes(&bytes);
                        decode_artwork(&bytes, size).map(|image| Artwork {
                            url: request.url.clone(),
                            hash,
                            image,
                        })
                    })
                };

                deliver(ArtworkMessage {
                    request_id: request.request_id,
                    url: request.url,
                    result,
                });
            })?;

        Ok(())
    }
}
