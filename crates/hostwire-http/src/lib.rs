//! hostwire-http: an HTTP resource model on top of hostwire-io.
//!
//! Request and response messages are split into an immutable head and a
//! body that streams through hostwire-io pipes:
//! - **fields**: validated, case-insensitive header/trailer [`Fields`]
//! - **request** / **response**: incoming and outgoing message heads
//! - **body**: [`OutgoingBody`] / [`IncomingBody`] with explicit finish and [`FutureTrailers`]
//! - **outparam**: the one-shot [`ResponseOutparam`] a handler answers through
//! - **server**: the [`Handler`] contract and [`dispatch`]
//! - **client**: the [`Transport`] seam and [`FutureIncomingResponse`]
//! - **loopback**: an in-process [`Transport`] that serves requests with a [`Handler`]
//! - **builder**: [`ResponseBuilder`] and canned responses
//! - **config**: [`HostConfig`] loaded from TOML
//! - **convert**: conversions to and from the `http` crate's request/response types
//!
//! # Example
//!
//! ```ignore
//! async fn hello(_request: IncomingRequest, mut outparam: ResponseOutparam) {
//!     let response = ResponseBuilder::new()
//!         .with_header("Content-Type", "text/plain")
//!         .and_then(|builder| builder.text("Hello!"));
//!     let _ = outparam.set(response);
//! }
//!
//! let transport = LoopbackTransport::new(hello);
//! let request = OutgoingRequest::new(Method::Get, Some("/"), None, None, Fields::new());
//! let response = hostwire_http::send(&transport, request, None).await?;
//! ```

pub mod body;
pub mod builder;
pub mod client;
pub mod config;
pub mod convert;
pub mod error;
pub mod fields;
pub mod loopback;
pub mod outparam;
pub mod request;
pub mod response;
pub mod server;
pub mod types;

pub use body::{BodyReceiver, FutureTrailers, IncomingBody, OutgoingBody};
pub use builder::{ResponseBuilder, forbidden, internal_server_error, temporary_redirect};
pub use client::{FutureIncomingResponse, Transport, send};
pub use config::HostConfig;
pub use convert::{fields_from_header_map, header_map_from_fields, into_http_response};
pub use error::{BodyError, ErrorCode, HeaderError};
pub use fields::Fields;
pub use loopback::LoopbackTransport;
pub use outparam::{HandlerResult, OutparamReceiver, ResponseOutparam};
pub use request::{IncomingRequest, OutgoingRequest};
pub use response::{IncomingResponse, OutgoingResponse};
pub use server::{Handler, HandlerFuture, dispatch};
pub use types::{Method, RequestOptions, Scheme};
