//! # Audio Module
//!
//! Queue and playback control for every guild the bot plays in.
//!
//! ## Architecture
//!
//! - [`controller`]: one task per guild owning the queue, the output session
//!   and the active command context. Everything that changes playback goes
//!   through its inbox.
//! - [`manager`]: maps guilds to controller handles, restarting controllers
//!   that exited after being idle.
//! - [`session`]: the seam between the controller and the audio backend.
//!   [`songbird_session`] implements it on top of a songbird `Call`.
//! - [`queue`]: bounded FIFO of track references.
//! - [`context`]: command addressing and the outbound [`context::Responder`].

pub mod context;
pub mod controller;
pub mod manager;
pub mod queue;
pub mod session;
pub mod songbird_session;

#[cfg(test)]
mod tests;

pub use controller::{ControllerMsg, ControllerSettings};
pub use manager::PlayerManager;
pub use songbird_session::SongbirdGateway;
