use std::{
    collections::HashMap,
    sync::Arc,
    task::{Context, Poll},
};

use bytes::Bytes;
use futures::future::BoxFuture;
use http::{
    header::{ETAG, IF_NONE_MATCH},
    HeaderMap, HeaderValue, Method, Request, Response, StatusCode,
};
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full};
use parking_lot::Mutex;
use tower::{BoxError, Layer, Service};
use tracing::trace;

struct CachedResponse {
    etag: HeaderValue,
    headers: HeaderMap,
    body: Bytes,
}

/// Response bodies remembered by URI together with their `ETag`.
///
/// Cloning shares the underlying map, so clients rebuilt for the same
/// cluster keep revalidating against what earlier clients downloaded.
#[derive(Clone, Default)]
pub struct TransportCacheStore {
    responses: Arc<Mutex<HashMap<String, CachedResponse>>>,
}

impl TransportCacheStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.responses.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.responses.lock().is_empty()
    }

    fn etag(&self, key: &str) -> Option<HeaderValue> {
        self.responses.lock().get(key).map(|r| r.etag.clone())
    }

    fn replay(&self, key: &str) -> Option<Response<CacheBody>> {
        let responses = self.responses.lock();
        let cached = responses.get(key)?;
        let mut response = Response::new(boxed(Full::new(cached.body.clone())));
        *response.headers_mut() = cached.headers.clone();
        Some(response)
    }

    fn insert(&self, key: String, etag: HeaderValue, headers: HeaderMap, body: Bytes) {
        self.responses.lock().insert(
            key,
            CachedResponse {
                etag,
                headers,
                body,
            },
        );
    }
}

type CacheBody = UnsyncBoxBody<Bytes, BoxError>;

fn boxed<B>(body: B) -> CacheBody
where
    B: http_body::Body<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// Discovery documents are plain GETs. Anything with a query string is a
/// list or watch, whose body is streamed through untouched.
fn is_cacheable<B>(req: &Request<B>) -> bool {
    req.method() == Method::GET && req.uri().query().is_none()
}

/// Installs ETag revalidation on GET requests.
#[derive(Clone, Default)]
pub struct TransportCacheLayer {
    store: TransportCacheStore,
}

impl TransportCacheLayer {
    pub fn new(store: TransportCacheStore) -> Self {
        Self { store }
    }
}

impl<S> Layer<S> for TransportCacheLayer {
    type Service = TransportCache<S>;

    fn layer(&self, inner: S) -> Self::Service {
        TransportCache {
            inner,
            store: self.store.clone(),
        }
    }
}

/// Sends `If-None-Match` for GET requests it has an `ETag` for and
/// answers a `304 Not Modified` with the remembered body. Only bodies that
/// come with an `ETag` are buffered.
#[derive(Clone)]
pub struct TransportCache<S> {
    inner: S,
    store: TransportCacheStore,
}

impl<S, ReqBody, ResBody> Service<Request<ReqBody>> for TransportCache<S>
where
    S: Service<Request<ReqBody>, Response = Response<ResBody>>,
    S::Error: Into<BoxError>,
    S::Future: Send + 'static,
    ResBody: http_body::Body<Data = Bytes> + Send + 'static,
    ResBody::Error: Into<BoxError>,
{
    type Response = Response<CacheBody>;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx).map_err(Into::into)
    }

    fn call(&mut self, mut req: Request<ReqBody>) -> Self::Future {
        let cacheable = is_cacheable(&req);
        let key = req.uri().to_string();
        if cacheable {
            if let Some(etag) = self.store.etag(&key) {
                req.headers_mut().insert(IF_NONE_MATCH, etag);
            }
        }

        let store = self.store.clone();
        let response = self.inner.call(req);
        Box::pin(async move {
            let response = response.await.map_err(Into::into)?;
            if !cacheable {
                return Ok(response.map(boxed));
            }
            let (parts, body) = response.into_parts();

            if parts.status == StatusCode::NOT_MODIFIED {
                if let Some(cached) = store.replay(&key) {
                    trace!(uri = %key, "serving not modified response from transport cache");
                    return Ok(cached);
                }
            }

            let etag = match parts.headers.get(ETAG) {
                Some(etag) if parts.status == StatusCode::OK => etag.clone(),
                _ => return Ok(Response::from_parts(parts, boxed(body))),
            };
            let body = body.collect().await.map_err(Into::into)?.to_bytes();
            store.insert(key, etag, parts.headers.clone(), body.clone());
            Ok(Response::from_parts(parts, boxed(Full::new(body))))
        })
    }
}
