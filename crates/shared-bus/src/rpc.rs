//! RPC boundary.
//!
//! A tower layer that prepares the [`Context`] of every incoming request:
//! it stores the request metadata (headers, peer address) and attaches an
//! `rpc:<method>:<request id>` correlation ID. Handlers read the context
//! from the request extensions.
//!
//! The layer applies to unary and streaming calls alike, since both arrive
//! as a single `http::Request`.

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::task::{Context as TaskContext, Poll};

use http::{HeaderMap, Request};
use lazy_static::lazy_static;
use tower::{Layer, Service};
use tracing::trace;

use crate::context::Context;
use crate::correlation::{new_correlation_id, register_correlation_prefix, CorrelationPrefix};
use crate::event::Authentication;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

lazy_static! {
    static ref RPC_CORRELATION: CorrelationPrefix = register_correlation_prefix("rpc", "rpc");
}

/// Metadata of the request that created a context.
#[derive(Debug, Clone, Default)]
pub struct RequestMetadata {
    pub headers: HeaderMap,
    /// Remote address of the connection; `None` for local pipes.
    pub peer: Option<SocketAddr>,
}

impl RequestMetadata {
    pub fn new(headers: HeaderMap, peer: Option<SocketAddr>) -> Self {
        Self { headers, peer }
    }

    /// Capture headers and the peer address a transport stored as a
    /// `SocketAddr` extension.
    pub fn from_request<B>(req: &Request<B>) -> Self {
        Self {
            headers: req.headers().clone(),
            peer: req.extensions().get::<SocketAddr>().copied(),
        }
    }

    /// The last value of a header, if it is valid text.
    pub fn last_value(&self, name: &str) -> Option<&str> {
        self.headers
            .get_all(name)
            .iter()
            .last()
            .and_then(|v| v.to_str().ok())
    }
}

/// Store the metadata on the context and attach an RPC correlation ID.
///
/// The ID uses the last `x-request-id` value, or a fresh ID. A context that
/// already carries an RPC correlation ID keeps it.
pub fn correlation_context_for_request(
    ctx: &Context,
    full_method: &str,
    metadata: RequestMetadata,
) -> Context {
    let request_id = metadata
        .last_value(REQUEST_ID_HEADER)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(new_correlation_id);
    let ctx = ctx.with_value(metadata);
    RPC_CORRELATION.attach(&ctx, &[full_method, request_id.as_str()])
}

/// Parse `Authorization: <scheme> <token>`.
///
/// Tokens look like `<PREFIX>.<ID>.<KEY>`; only the type and ID are kept. An
/// unrecognized token still records the scheme.
pub fn authentication_from_metadata(metadata: &RequestMetadata) -> Option<Authentication> {
    let value = metadata.last_value(http::header::AUTHORIZATION.as_str())?;
    let (scheme, token) = value.split_once(' ')?;
    let mut auth = Authentication {
        auth_type: scheme.to_string(),
        ..Default::default()
    };
    if let Some((token_type, token_id)) = parse_token(token.trim()) {
        auth.token_type = token_type.to_string();
        auth.token_id = token_id.to_string();
    }
    Some(auth)
}

fn parse_token(token: &str) -> Option<(&'static str, &str)> {
    let mut parts = token.splitn(3, '.');
    let prefix = parts.next()?;
    let id = parts.next().filter(|id| !id.is_empty())?;
    parts.next()?;
    let token_type = match prefix {
        "NNSXS" => "APIKey",
        "MFRWG" => "AccessToken",
        "MZWXE" => "SessionToken",
        _ => return None,
    };
    Some((token_type, id))
}

/// Remote IP and user agent of the request.
///
/// The first `x-forwarded-for` entry wins over the connection's peer.
pub fn client_info_from_metadata(metadata: &RequestMetadata) -> (Option<String>, Option<String>) {
    let forwarded = metadata
        .headers
        .get(FORWARDED_FOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string);
    let remote_ip = forwarded.or_else(|| metadata.peer.map(|peer| peer.ip().to_string()));
    let user_agent = metadata
        .last_value(http::header::USER_AGENT.as_str())
        .map(str::to_string);
    (remote_ip, user_agent)
}

/// Layer that attaches request contexts.
#[derive(Clone, Default)]
pub struct CorrelationLayer {
    ignored: Arc<HashSet<String>>,
}

impl CorrelationLayer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Skip requests to these method paths, e.g. health checks.
    pub fn ignore_methods<I, S>(methods: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            ignored: Arc::new(methods.into_iter().map(Into::into).collect()),
        }
    }
}

impl<S> Layer<S> for CorrelationLayer {
    type Service = CorrelationService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        CorrelationService {
            inner,
            ignored: Arc::clone(&self.ignored),
        }
    }
}

#[derive(Clone)]
pub struct CorrelationService<S> {
    inner: S,
    ignored: Arc<HashSet<String>>,
}

impl<S, B> Service<Request<B>> for CorrelationService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut TaskContext<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: Request<B>) -> Self::Future {
        let method = req.uri().path().to_string();
        if !self.ignored.contains(&method) {
            let parent = req
                .extensions()
                .get::<Context>()
                .cloned()
                .unwrap_or_default();
            let ctx = correlation_context_for_request(&parent, &method, RequestMetadata::from_request(&req));
            trace!(method = %method, correlation_ids = ?ctx.correlation_ids(), "Attached request context");
            req.extensions_mut().insert(ctx);
        }
        self.inner.call(req)
    }
}
