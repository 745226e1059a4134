pub mod monitor;
pub mod motion;
pub mod recording;
pub mod ringbuf;
pub mod session;
pub mod supervisor;

pub use monitor::ActivityMonitor;
pub use session::{CameraSession, ConnectionState, SessionHandle, SessionSnapshot};
pub use supervisor::Supervisor;
