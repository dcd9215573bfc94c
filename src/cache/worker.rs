use async_std::task::spawn_local;
use js_sys::{Array, ArrayBuffer};
use log::{debug, warn};
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::{future_to_promise, JsFuture};
use web_sys::{
    ExtendableEvent, FetchEvent, Headers, Request, RequestMode, Response, ResponseInit,
    ServiceWorkerGlobalScope,
};

use crate::error::{Result, ShowError};

use super::offline::open_cache;
use super::range::{parse_range, ByteRange};
use super::{CACHE_PREFIX, PAGES_CACHE, SHOW_CACHE};

const DEFAULT_AUDIO_TYPE: &str = "audio/mpeg";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchRoute {
    /// Let the browser handle the request normally.
    PassThrough,
    /// Ranged request for show audio: slice the cached full file if present.
    ShowRange,
    ShowCacheFirst,
    NavigationNetworkFirst,
}

pub fn route_request(
    method: &str,
    url: &Url,
    scope_origin: &Url,
    has_range: bool,
    is_navigation: bool,
) -> FetchRoute {
    if method != "GET" || url.origin() != scope_origin.origin() {
        return FetchRoute::PassThrough;
    }
    let path = url.path();
    if path == "/sw.js" {
        return FetchRoute::PassThrough;
    }
    if path.starts_with("/show/") {
        if path.ends_with(".mp3") && has_range {
            return FetchRoute::ShowRange;
        }
        return FetchRoute::ShowCacheFirst;
    }
    if is_navigation {
        return FetchRoute::NavigationNetworkFirst;
    }
    FetchRoute::PassThrough
}

/// Caches from older deployments of this site; other origins' caches are
/// never touched.
pub fn is_stale_cache(name: &str) -> bool {
    name.starts_with(&format!("{CACHE_PREFIX}:")) && name != SHOW_CACHE && name != PAGES_CACHE
}

/// Headers of a 206 slice, layered over the cached response's headers.
pub fn partial_content_headers(
    range: &ByteRange,
    total: u64,
    content_type: Option<String>,
) -> Vec<(&'static str, String)> {
    let mut headers = vec![
        ("Accept-Ranges", "bytes".to_string()),
        ("Content-Range", range.content_range(total)),
        ("Content-Length", range.len().to_string()),
    ];
    if content_type.as_deref().map_or(true, str::is_empty) {
        headers.push(("Content-Type", DEFAULT_AUDIO_TYPE.to_string()));
    }
    headers
}

fn worker_scope() -> Result<ServiceWorkerGlobalScope> {
    js_sys::global()
        .dyn_into::<ServiceWorkerGlobalScope>()
        .map_err(|_| ShowError::Unavailable("ServiceWorkerGlobalScope"))
}

async fn fetch(request: &Request) -> Result<Response> {
    let scope = worker_scope()?;
    let response = JsFuture::from(scope.fetch_with_request(request)).await?;
    Ok(response.dyn_into::<Response>()?)
}

async fn fetch_url(url: &str) -> Result<Response> {
    let scope = worker_scope()?;
    let response = JsFuture::from(scope.fetch_with_str(url)).await?;
    Ok(response.dyn_into::<Response>()?)
}

fn put_in_background(cache: web_sys::Cache, request: Request, response: Response) {
    spawn_local(async move {
        if let Err(err) = JsFuture::from(cache.put_with_request(&request, &response)).await {
            debug!("Cache put failed: {:?}", err);
        }
    });
}

async fn cache_first(request: Request, cache_name: &str) -> Result<Response> {
    let cache = open_cache(cache_name).await?;
    let cached = JsFuture::from(cache.match_with_request(&request)).await?;
    if !cached.is_undefined() {
        return Ok(cached.dyn_into::<Response>()?);
    }
    let response = fetch(&request).await?;
    if response.ok() {
        put_in_background(cache, request, response.clone()?);
    }
    Ok(response)
}

async fn network_first(request: Request, cache_name: &str) -> Result<Response> {
    let cache = open_cache(cache_name).await?;
    match fetch(&request).await {
        Ok(response) => {
            if response.ok() {
                put_in_background(cache, request, response.clone()?);
            }
            Ok(response)
        }
        Err(err) => {
            let cached = JsFuture::from(cache.match_with_request(&request)).await?;
            if cached.is_undefined() {
                Err(err)
            } else {
                Ok(cached.dyn_into::<Response>()?)
            }
        }
    }
}

async fn serve_range_from_cached_full(request: &Request, range_header: &str) -> Result<Option<Response>> {
    let cache = open_cache(SHOW_CACHE).await?;
    let full = JsFuture::from(cache.match_with_str(&request.url())).await?;
    if full.is_undefined() {
        return Ok(None);
    }
    let full = full.dyn_into::<Response>()?;
    let body = JsFuture::from(full.array_buffer()?)
        .await?
        .dyn_into::<ArrayBuffer>()?;
    let total = body.byte_length() as u64;
    let Some(range) = parse_range(range_header, total) else {
        return Ok(None);
    };

    let chunk = body.slice_with_end(range.start as u32, (range.end + 1) as u32);
    let headers = Headers::new_with_headers(&full.headers())?;
    let content_type = headers.get("Content-Type")?;
    for (name, value) in partial_content_headers(&range, total, content_type) {
        headers.set(name, &value)?;
    }
    let init = ResponseInit::new();
    init.set_status(206);
    init.set_headers(&headers);
    Ok(Some(Response::new_with_opt_buffer_source_and_init(
        Some(chunk.as_ref()),
        &init,
    )?))
}

async fn cache_full_file(path: String) -> Result<()> {
    let cache = open_cache(SHOW_CACHE).await?;
    let existing = JsFuture::from(cache.match_with_str(&path)).await?;
    if !existing.is_undefined() {
        return Ok(());
    }
    let response = fetch_url(&path).await?;
    if response.ok() {
        JsFuture::from(cache.put_with_str(&path, &response)).await?;
    }
    Ok(())
}

async fn serve_show_range(event: FetchEvent, path: String) -> Result<Response> {
    let request = event.request();
    if let Some(range_header) = request.headers().get("range")? {
        if let Some(response) = serve_range_from_cached_full(&request, &range_header).await? {
            return Ok(response);
        }
    }

    let response = fetch(&request).await?;
    let background = future_to_promise(async move {
        if let Err(err) = cache_full_file(path).await {
            debug!("Background audio caching failed: {}", err);
        }
        Ok(JsValue::UNDEFINED)
    });
    if let Err(err) = event.wait_until(&background) {
        debug!("waitUntil rejected: {:?}", err);
    }
    Ok(response)
}

async fn handle_fetch(event: FetchEvent, route: FetchRoute, path: String) -> Result<Response> {
    match route {
        FetchRoute::ShowRange => serve_show_range(event, path).await,
        FetchRoute::ShowCacheFirst => cache_first(event.request(), SHOW_CACHE).await,
        FetchRoute::NavigationNetworkFirst => network_first(event.request(), PAGES_CACHE).await,
        FetchRoute::PassThrough => fetch(&event.request()).await,
    }
}

async fn activate() -> Result<()> {
    let scope = worker_scope()?;
    let caches = scope.caches()?;
    let keys = JsFuture::from(caches.keys()).await?.dyn_into::<Array>()?;
    for name in keys.iter().filter_map(|key| key.as_string()) {
        if is_stale_cache(&name) {
            debug!("Deleting stale cache {}", name);
            JsFuture::from(caches.delete(&name)).await?;
        }
    }
    JsFuture::from(scope.clients().claim()).await?;
    Ok(())
}

fn on_fetch(event: FetchEvent, scope_origin: &Url) -> Result<()> {
    let request = event.request();
    let Ok(url) = Url::parse(&request.url()) else {
        return Ok(());
    };
    let has_range = request.headers().get("range")?.is_some();
    let route = route_request(
        &request.method(),
        &url,
        scope_origin,
        has_range,
        request.mode() == RequestMode::Navigate,
    );
    if route == FetchRoute::PassThrough {
        return Ok(());
    }

    let path = url.path().to_string();
    let handled = event.clone();
    let response = future_to_promise(async move {
        handle_fetch(handled, route, path)
            .await
            .map(JsValue::from)
            .map_err(JsValue::from)
    });
    event.respond_with(&response)?;
    Ok(())
}

/// Registers the install, activate and fetch listeners on the current
/// service worker global scope.
pub fn install() -> Result<()> {
    let scope = worker_scope()?;
    let scope_origin = Url::parse(&scope.location().href())
        .map_err(|err| ShowError::Js(format!("Invalid worker location: {err}")))?;

    let install_scope = scope.clone();
    let on_install = Closure::<dyn FnMut(ExtendableEvent)>::new(move |event: ExtendableEvent| {
        let result = install_scope
            .skip_waiting()
            .and_then(|promise| event.wait_until(&promise));
        if let Err(err) = result {
            warn!("skipWaiting failed: {:?}", err);
        }
    });

    let on_activate = Closure::<dyn FnMut(ExtendableEvent)>::new(move |event: ExtendableEvent| {
        let promise = future_to_promise(async {
            activate()
                .await
                .map(|_| JsValue::UNDEFINED)
                .map_err(JsValue::from)
        });
        if let Err(err) = event.wait_until(&promise) {
            warn!("Activation failed: {:?}", err);
        }
    });

    let on_fetch_listener = Closure::<dyn FnMut(FetchEvent)>::new(move |event: FetchEvent| {
        if let Err(err) = on_fetch(event, &scope_origin) {
            warn!("Fetch routing failed: {}", err);
        }
    });

    scope.add_event_listener_with_callback("install", on_install.as_ref().unchecked_ref())?;
    scope.add_event_listener_with_callback("activate", on_activate.as_ref().unchecked_ref())?;
    scope.add_event_listener_with_callback("fetch", on_fetch_listener.as_ref().unchecked_ref())?;

    // Listeners live as long as the worker.
    on_install.forget();
    on_activate.forget();
    on_fetch_listener.forget();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn origin() -> Url {
        Url::parse("https://example.com/").unwrap()
    }

    fn route(method: &str, url: &str, has_range: bool, is_navigation: bool) -> FetchRoute {
        route_request(method, &Url::parse(url).unwrap(), &origin(), has_range, is_navigation)
    }

    #[test]
    fn test_routes() {
        assert_eq!(
            route("GET", "https://example.com/show/pilot-v1/pilot.mp3", true, false),
            FetchRoute::ShowRange
        );
        assert_eq!(
            route("GET", "https://example.com/show/pilot-v1/pilot.mp3", false, false),
            FetchRoute::ShowCacheFirst
        );
        assert_eq!(
            route("GET", "https://example.com/show/pilot-v1/script.json", true, false),
            FetchRoute::ShowCacheFirst
        );
        assert_eq!(
            route("GET", "https://example.com/docs", false, true),
            FetchRoute::NavigationNetworkFirst
        );
    }

    #[test]
    fn test_pass_through() {
        assert_eq!(
            route("POST", "https://example.com/show/a.mp3", false, false),
            FetchRoute::PassThrough
        );
        assert_eq!(
            route("GET", "https://cdn.example.net/show/a.mp3", true, false),
            FetchRoute::PassThrough
        );
        assert_eq!(
            route("GET", "https://example.com/sw.js", false, true),
            FetchRoute::PassThrough
        );
        assert_eq!(
            route("GET", "https://example.com/app.js", false, false),
            FetchRoute::PassThrough
        );
    }

    #[test]
    fn test_stale_caches() {
        assert!(is_stale_cache("swm-site:show:v0"));
        assert!(!is_stale_cache(SHOW_CACHE));
        assert!(!is_stale_cache(PAGES_CACHE));
        assert!(!is_stale_cache("other-app:v1"));
    }

    #[test]
    fn test_partial_content_headers() {
        let range = ByteRange { start: 10, end: 19 };
        let headers = partial_content_headers(&range, 100, None);
        assert!(headers.contains(&("Content-Range", "bytes 10-19/100".to_string())));
        assert!(headers.contains(&("Content-Length", "10".to_string())));
        assert!(headers.contains(&("Content-Type", "audio/mpeg".to_string())));

        let headers = partial_content_headers(&range, 100, Some("audio/ogg".to_string()));
        assert!(!headers.iter().any(|(name, _)| *name == "Content-Type"));
    }
}
