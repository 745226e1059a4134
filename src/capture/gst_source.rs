//! GStreamer-backed network transport (rtsp://, http://, file:// ...)

use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use tracing::{debug, info, warn};

use crate::capture::frame::{Frame, FrameMetadata, PixelFormat};
use crate::capture::source::{FrameSource, SourceConnector};
use crate::error::SourceError;

/// How long `open` waits for the pipeline to reach PLAYING.
const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// Launch line for `uri`. The URI is quoted so `&`, `;` and spaces in query
/// strings stay part of the property value.
fn pipeline_description(uri: &str) -> String {
    let quoted = uri.replace('\\', "\\\\").replace('"', "\\\"");
    // Latest-frame semantics: never queue behind a slow consumer
    format!(
        "uridecodebin uri=\"{quoted}\" ! \
         queue max-size-buffers=2 leaky=downstream ! \
         videoconvert ! \
         video/x-raw,format=RGB ! \
         appsink name=appsink"
    )
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GstConnector;

impl SourceConnector for GstConnector {
    fn open(&self, uri: &str) -> Result<Box<dyn FrameSource>, SourceError> {
        Ok(Box::new(GstSource::open(uri)?))
    }
}

/// Decoded RGB frames pulled from a `uridecodebin` pipeline
pub struct GstSource {
    uri: String,
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    sequence: u64,
    fps: Option<f64>,
    closed: bool,
}

impl GstSource {
    pub fn open(uri: &str) -> Result<Self, SourceError> {
        let open_err = |reason: String| SourceError::Open {
            uri: uri.to_string(),
            reason,
        };

        gst::init().map_err(|e| open_err(format!("failed to initialize GStreamer: {e}")))?;

        let pipeline_str = pipeline_description(uri);
        debug!("Pipeline: {}", pipeline_str);

        let pipeline = gst::parse::launch(&pipeline_str)
            .map_err(|e| open_err(e.to_string()))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| open_err("failed to create pipeline".into()))?;

        let appsink = pipeline
            .by_name("appsink")
            .ok_or_else(|| open_err("failed to find appsink element".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| open_err("failed to cast to AppSink".into()))?;

        appsink.set_property("emit-signals", false);
        appsink.set_property("max-buffers", 1u32);
        appsink.set_property("drop", true);
        appsink.set_property("sync", false);

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(open_err(format!("failed to start pipeline: {e:?}")));
        }

        let (state_change, _, _) = pipeline.state(Some(gst::ClockTime::from_mseconds(
            OPEN_TIMEOUT.as_millis() as u64,
        )));
        if let Err(e) = state_change {
            let _ = pipeline.set_state(gst::State::Null);
            return Err(open_err(format!("pipeline did not start: {e:?}")));
        }

        info!("GStreamer source opened: {}", uri);
        Ok(Self {
            uri: uri.to_string(),
            pipeline,
            appsink,
            sequence: 0,
            fps: None,
            closed: false,
        })
    }

    fn bus_error(&self) -> Option<String> {
        let bus = self.pipeline.bus()?;
        let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
        match msg.view() {
            gst::MessageView::Error(err) => Some(err.error().to_string()),
            _ => None,
        }
    }
}

impl FrameSource for GstSource {
    fn read(&mut self, wait: Duration) -> Result<Option<Frame>, SourceError> {
        if self.closed {
            return Err(SourceError::Closed);
        }
        if let Some(err) = self.bus_error() {
            return Err(SourceError::Read(err));
        }

        let timestamp = Instant::now();
        let Some(sample) = self
            .appsink
            .try_pull_sample(gst::ClockTime::from_nseconds(wait.as_nanos() as u64))
        else {
            if self.appsink.is_eos() {
                return Err(SourceError::Closed);
            }
            return Ok(None);
        };

        let buffer = sample
            .buffer()
            .ok_or_else(|| SourceError::Read("sample contains no buffer".into()))?;
        let map = buffer
            .map_readable()
            .map_err(|_| SourceError::Read("failed to map buffer".into()))?;
        let caps = sample
            .caps()
            .ok_or_else(|| SourceError::Read("sample has no caps".into()))?;
        let video_info = gst_video::VideoInfo::from_caps(caps)
            .map_err(|_| SourceError::Read("failed to parse video info from caps".into()))?;

        let fps = video_info.fps();
        if fps.denom() > 0 && fps.numer() > 0 {
            self.fps = Some(fps.numer() as f64 / fps.denom() as f64);
        }

        self.sequence += 1;
        let meta = Arc::new(FrameMetadata {
            sequence: self.sequence,
            width: video_info.width(),
            height: video_info.height(),
            stride: video_info.stride()[0] as u32,
            format: PixelFormat::Rgb24, // Output is always RGB after conversion
            device_timestamp: buffer.pts().map(|pts| pts.into()),
        });

        Ok(Some(Frame {
            data: Bytes::copy_from_slice(map.as_slice()),
            meta,
            timestamp,
        }))
    }

    fn fps(&self) -> Option<f64> {
        self.fps
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!("Failed to stop pipeline for {}: {:?}", self.uri, e);
        }
    }
}

impl Drop for GstSource {
    fn drop(&mut self) {
        self.close();
    }
}
