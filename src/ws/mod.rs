//! WebSocket layer: connection handling and the client event protocol.
//!
//! The endpoint at `/ws` carries authentication, location updates and
//! voice detections from the client, and every [`crate::domain::ServerEvent`]
//! addressed to the bound user back to it.

pub mod connection;
pub mod handler;
pub mod messages;
