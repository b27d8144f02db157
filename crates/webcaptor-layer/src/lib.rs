//! Tower/axum middleware for webcaptor
//!
//! Wrap a router with [`CaptureLayer`] to publish one request event and one
//! response event per exchange:
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/users/{id}", get(user))
//!     .layer(CaptureLayer::new(pipeline));
//! ```
//!
//! Applied with `Router::layer` the capture service runs after routing, so the
//! request event is published before the handler runs. When the layer wraps
//! the router from outside, add [`mark_route`] as a route layer to keep that
//! ordering; otherwise the request event is published when the handler
//! returns.

pub mod buffer;
mod funnel;
pub mod resolver;
pub mod route;
pub mod service;

pub use buffer::{BufferedBody, ReplayBody, TeeBody};
pub use resolver::JsonExceptionResolver;
pub use route::{mark_route, CaptureHandle};
pub use service::{CaptureLayer, CaptureService};
