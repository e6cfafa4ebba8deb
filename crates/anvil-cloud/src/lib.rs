pub mod client;
pub mod executor;
pub mod http;

pub use client::{AnvilClient, Endpoints, RemoteBuild};
pub use executor::{HttpExecutor, RealExecutor};
pub use http::{Body, HttpError, HttpRequest, HttpResponse, Method, StreamingResponse};
