//! Transport abstraction: one connector opens many independent frame sources

use std::time::Duration;

use crate::capture::Frame;
use crate::error::SourceError;

/// One open network video connection.
///
/// Implementations are owned by a single session worker and are never shared.
pub trait FrameSource: Send {
    /// Block for at most `wait` for the next frame.
    ///
    /// `Ok(None)` means nothing arrived within `wait`; the caller treats that as a stall.
    fn read(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError>;

    /// Frame rate advertised by the stream, if the transport knows it.
    fn fps(&self) -> Option<f64> {
        None
    }

    /// Release the connection. Called exactly once per opened source.
    fn close(&mut self);
}

/// Opens frame sources by URI.
pub trait SourceConnector: Send + Sync {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>, SourceError>;
}

/// Dispatches on the URI scheme to the transports compiled into this build.
#[derive(Default)]
pub struct DefaultConnector {
    synthetic: super::synthetic::SyntheticConnector,
    #[cfg(feature = "gstreamer-source")]
    gstreamer: super::gst_source::GstConnector,
}

impl DefaultConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SourceConnector for DefaultConnector {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        if uri.starts_with(super::synthetic::SCHEME) {
            return self.synthetic.open(uri);
        }
        #[cfg(feature = "gstreamer-source")]
        {
            self.gstreamer.open(uri)
        }
        #[cfg(not(feature = "gstreamer-source"))]
        {
            Err(SourceError::UnsupportedUri(uri.to_string()))
        }
    }
}
