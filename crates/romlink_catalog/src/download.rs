use std::{io, sync::OnceLock};

use indicatif::MultiProgress;

/// Progress bars and log lines of a process share this.
pub fn mp() -> &'static MultiProgress {
    static MP: OnceLock<MultiProgress> = OnceLock::new();
    MP.get_or_init(MultiProgress::new)
}

/// A streamed response body together with its advertised length.
pub struct DownloadStream<R: io::Read> {
    pub body: R,
    pub len: Option<u64>,
}

impl<R: io::Read> DownloadStream<R> {
    #[must_use]
    pub fn new(body: R, len: Option<u64>) -> Self {
        Self { body, len }
    }

    /// Erases the body type, for passing streams across trait objects.
    pub fn boxed(self) -> DownloadStream<Box<dyn io::Read + Send>>
    where
        R: Send + 'static,
    {
        DownloadStream {
            body: Box::new(self.body),
            len: self.len,
        }
    }
}
