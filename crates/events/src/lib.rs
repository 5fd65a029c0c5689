//! Typed event families and their JSON wire form.
//!
//! Every aggregate type owns one closed enum of event payloads (an *event
//! family*). Stores only ever see `(event_type, payload)` pairs; this crate
//! converts between the two representations.

pub mod event;

pub use event::{decode, encode, CodecError, EventFamily};
