use std::{cell::RefCell, rc::Rc};

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use log::{debug, warn};
use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Cache, Response};

use crate::error::{Result, ShowError};

use super::SHOW_CACHE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineState {
    Idle,
    Saving,
    Saved,
    Error,
}

impl OfflineState {
    pub fn as_str(self) -> &'static str {
        match self {
            OfflineState::Idle => "idle",
            OfflineState::Saving => "saving",
            OfflineState::Saved => "saved",
            OfflineState::Error => "error",
        }
    }
}

/// Where offline copies of show assets live.
#[allow(async_fn_in_trait)]
pub trait AssetStore {
    async fn contains(&self, url: &str) -> Result<bool>;
    /// Fetch `url` and store it if the response is successful. Non-2xx
    /// responses are skipped, transport failures are errors.
    async fn fetch_and_store(&self, url: &str) -> Result<()>;
    /// Ask the browser not to evict stored assets.
    async fn persist(&self) -> Result<()>;
}

pub type PrefetchFuture = Shared<LocalBoxFuture<'static, OfflineState>>;
type StateListener = Rc<dyn Fn(OfflineState)>;

struct PrefetchInner {
    state: OfflineState,
    pending: Option<PrefetchFuture>,
    listener: Option<StateListener>,
}

/// Copies every show asset into the store, at most one run at a time.
pub struct OfflinePrefetcher<S: AssetStore + 'static> {
    store: Rc<S>,
    assets: Rc<Vec<String>>,
    inner: Rc<RefCell<PrefetchInner>>,
}

impl<S: AssetStore + 'static> OfflinePrefetcher<S> {
    pub fn new(store: S, assets: Vec<String>) -> OfflinePrefetcher<S> {
        OfflinePrefetcher {
            store: Rc::new(store),
            assets: Rc::new(assets),
            inner: Rc::new(RefCell::new(PrefetchInner {
                state: OfflineState::Idle,
                pending: None,
                listener: None,
            })),
        }
    }

    pub fn state(&self) -> OfflineState {
        self.inner.borrow().state
    }

    pub fn is_pending(&self) -> bool {
        self.inner.borrow().pending.is_some()
    }

    pub fn set_listener<F: Fn(OfflineState) + 'static>(&self, listener: F) {
        self.inner.borrow_mut().listener = Some(Rc::new(listener));
    }

    /// Start a prefetch, or join the one already running.
    pub fn ensure(&self) -> PrefetchFuture {
        if let Some(pending) = self.inner.borrow().pending.clone() {
            return pending;
        }

        let store = Rc::clone(&self.store);
        let assets = Rc::clone(&self.assets);
        let inner = Rc::clone(&self.inner);
        let future = async move {
            let state = match prefetch_all(store.as_ref(), &assets).await {
                Ok(()) => {
                    if let Err(err) = store.persist().await {
                        debug!("Persistent storage request failed: {}", err);
                    }
                    OfflineState::Saved
                }
                Err(err) => {
                    warn!("Offline prefetch failed: {}", err);
                    OfflineState::Error
                }
            };
            inner.borrow_mut().pending = None;
            set_state(&inner, state);
            state
        }
        .boxed_local()
        .shared();

        self.inner.borrow_mut().pending = Some(future.clone());
        if self.state() != OfflineState::Saved {
            set_state(&self.inner, OfflineState::Saving);
        }
        future
    }
}

fn set_state(inner: &Rc<RefCell<PrefetchInner>>, state: OfflineState) {
    let listener = {
        let mut inner = inner.borrow_mut();
        inner.state = state;
        inner.listener.clone()
    };
    if let Some(listener) = listener {
        listener(state);
    }
}

async fn prefetch_all<S: AssetStore>(store: &S, assets: &[String]) -> Result<()> {
    for url in assets {
        if store.contains(url).await? {
            continue;
        }
        store.fetch_and_store(url).await?;
    }
    Ok(())
}

pub async fn open_cache(name: &str) -> Result<Cache> {
    let caches = match web_sys::window() {
        Some(window) => window.caches()?,
        None => js_sys::global()
            .dyn_into::<web_sys::WorkerGlobalScope>()
            .map_err(|_| ShowError::Unavailable("CacheStorage"))?
            .caches()?,
    };
    // The getter hands back `undefined` on insecure origins instead of throwing.
    if caches.is_undefined() {
        return Err(ShowError::Unavailable("CacheStorage"));
    }
    let cache = JsFuture::from(caches.open(name)).await?;
    Ok(cache.dyn_into::<Cache>()?)
}

/// Browser Cache API store shared with the service worker.
pub struct BrowserCacheStore {
    cache_name: &'static str,
}

impl BrowserCacheStore {
    pub fn show_cache() -> BrowserCacheStore {
        BrowserCacheStore {
            cache_name: SHOW_CACHE,
        }
    }

    /// False on pages without the Cache API (insecure origins, old browsers).
    pub fn is_supported() -> bool {
        web_sys::window().map_or(false, |window| {
            js_sys::Reflect::has(&window, &JsValue::from_str("caches")).unwrap_or(false)
        })
    }
}

impl AssetStore for BrowserCacheStore {
    async fn contains(&self, url: &str) -> Result<bool> {
        let cache = open_cache(self.cache_name).await?;
        let found = JsFuture::from(cache.match_with_str(url)).await?;
        Ok(!found.is_undefined())
    }

    async fn fetch_and_store(&self, url: &str) -> Result<()> {
        let window = web_sys::window().ok_or(ShowError::Unavailable("window"))?;
        let response = JsFuture::from(window.fetch_with_str(url))
            .await
            .map_err(|err| ShowError::Fetch {
                url: url.to_string(),
                message: ShowError::from(err).to_string(),
            })?
            .dyn_into::<Response>()?;
        if !response.ok() {
            debug!("Skipping {} ({})", url, response.status());
            return Ok(());
        }
        let cache = open_cache(self.cache_name).await?;
        JsFuture::from(cache.put_with_str(url, &response)).await?;
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let window = web_sys::window().ok_or(ShowError::Unavailable("window"))?;
        let storage = window.navigator().storage();
        JsFuture::from(storage.persist()?).await?;
        Ok(())
    }
}
