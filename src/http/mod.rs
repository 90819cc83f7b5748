pub mod client;
pub mod method;
pub mod request;
pub mod response;
mod tunnel;

pub use client::{DEFAULT_USER_AGENT, Dispatcher, WireRequest};
pub use method::HttpMethod;
pub use request::{RequestSpec, Transport, request};
pub use response::Response;
