//! # Bobcaygeon Speaker API
//!
//! Typed client for the control surface of a bobcaygeon speaker: renaming
//! its advertised service, toggling broadcast, managing forward targets and
//! reading playback state. Hard mute goes over the audio transport instead,
//! see [`rtsp::set_mute`].
//!
//! Each call is modelled as a [`SpeakerOperation`] with a typed request and
//! response; [`SpeakerClient`] carries them over HTTP/JSON.

pub mod client;
pub mod error;
pub mod operation;
pub mod operations;
pub mod rtsp;

pub use client::SpeakerClient;
pub use error::{ApiError, Result};
pub use operation::{Ack, EmptyRequest, SpeakerOperation, RETURN_OK};
pub use operations::{MutedResponse, TrackResponse};
