// airly-api: Async Rust client for the SystemAIR Home Solutions cloud API.
//
// The coordinator in `airly-core` only sees the `VentilationApi` and
// `PushChannel` traits. `SystemairClient` and `WebSocketPush` are the
// shipped implementations.

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod transport;
pub mod websocket;

pub use api::{ModeTimer, Parameter, PushChannel, PushSubscription, VentilationApi};
pub use auth::{AccessToken, Authenticator, Credentials};
pub use client::SystemairClient;
pub use error::Error;
pub use transport::TransportConfig;
pub use websocket::{ReconnectConfig, WebSocketPush};
