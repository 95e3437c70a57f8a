//! Capture session lifecycle

pub mod lifecycle;

pub use lifecycle::{
    AudioOpenFn, RelayObserver, RelaySession, SessionEvent, SessionState, VideoOpenFn,
};
