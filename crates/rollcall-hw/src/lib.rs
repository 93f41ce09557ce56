//! rollcall-hw: webcam capture for the live recognition loop.

pub mod camera;
pub mod frame;

pub use camera::{Camera, CameraError, DeviceInfo, FrameStream, PixelFormat};
pub use frame::{Frame, FrameError};
