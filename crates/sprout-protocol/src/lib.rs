//! Wire protocol for Sprout.
//!
//! This crate defines the frames that travel over the farming channel:
//!
//! - **Types** ([`OutboundFrame`], [`InboundFrame`], [`AuthData`],
//!   [`PointsUpdate`]): what the client sends and how server frames are
//!   classified.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]): how frames are converted
//!   to and from text.
//! - **Errors** ([`ProtocolError`]): what can go wrong while doing so.
//!
//! ```text
//! Transport (text frames) → Protocol (frames) → Session (auth, heartbeat)
//! ```

mod codec;
mod error;
mod types;

pub use codec::{Codec, JsonCodec};
pub use error::ProtocolError;
pub use types::{AuthData, InboundFrame, OutboundFrame, PointsUpdate, frame_type};
