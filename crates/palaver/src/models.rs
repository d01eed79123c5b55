//! These models represent the objects passed around by the session
//!
//! There are a few related formats we need to interact with:
//! - the JSON bodies the browser client sends and renders
//! - the wire format of the model API, including the structured content
//!   blocks an assistant turn accumulates while using the search tool
//! - the documents the conversation store persists
//!
//! Incoming and outgoing data is converted to these internal structs at the
//! boundary; only plain text participates in titles and client rendering,
//! while tool blocks ride along for mid-turn continuation.
pub mod content;
pub mod message;
pub mod role;
pub mod tool;
