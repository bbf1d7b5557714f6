//! padsync server engine
//!
//! Rooms, the room registry, debounced persistence, per-connection sync
//! sessions, broadcast fan-out, the WebSocket transport and the health
//! endpoint.

pub mod engine;
pub mod health;
#[cfg(feature = "metrics")]
pub mod metrics;
pub mod persist;
pub mod registry;
pub mod room;
pub mod session;
#[cfg(feature = "websocket")]
pub mod websocket;

pub use engine::{Engine, EngineConfig, EngineStatus};
pub use health::HealthServer;
pub use persist::PersistScheduler;
pub use registry::RoomRegistry;
pub use room::{Room, RoomEvent};
pub use session::{Action, SessionError, SessionState, SyncSession};
#[cfg(feature = "websocket")]
pub use websocket::WebSocketServer;
