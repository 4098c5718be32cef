//! Shared data model and push-channel protocol for `pairchat`.

pub mod codec;
pub mod event;
pub mod identity;
pub mod message;
