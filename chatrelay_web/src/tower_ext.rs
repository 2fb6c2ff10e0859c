use axum::{
    body::Body,
    http::{header, HeaderName, HeaderValue, Request, Response},
};
use tower::util::{MapResponse, ServiceExt};

/// Keeps browsers from holding on to the chat page and its scripts between
/// deploys.
pub(crate) const NO_CACHE_HEADERS: [(HeaderName, &str); 2] = [
    (header::CACHE_CONTROL, "no-cache, no-store"),
    (header::EXPIRES, "-1"),
];

pub(crate) trait NoCacheExt<T>
where
    T: tower::Service<Request<Body>>,
{
    fn no_cache(self) -> MapResponse<T, fn(T::Response) -> T::Response>;
}

impl<T, ResponseBody> NoCacheExt<T> for T
where
    T: tower::Service<Request<Body>, Response = Response<ResponseBody>>,
    ResponseBody: http_body::Body,
{
    fn no_cache(self) -> MapResponse<T, fn(T::Response) -> T::Response> {
        ServiceExt::<Request<Body>>::map_response(self, with_no_cache_headers)
    }
}

fn with_no_cache_headers<B>(mut response: Response<B>) -> Response<B> {
    for (name, value) in NO_CACHE_HEADERS {
        response
            .headers_mut()
            .insert(name, HeaderValue::from_static(value));
    }
    response
}
