//! Shared HTTP client type for probes and request forwarding.

use http_body_util::Full;
use hyper::body::Bytes;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

pub type HttpClient = Client<HttpConnector, Full<Bytes>>;

pub fn build_http_client() -> HttpClient {
    Client::builder(TokioExecutor::new()).build_http()
}
