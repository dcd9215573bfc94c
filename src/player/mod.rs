pub mod audience;
pub mod audio_analysis;
pub mod captions;
pub mod clock;
pub mod commands;
pub mod cursor;
pub mod director;
pub mod keyboard_events;
pub mod rig;
pub mod settings;
pub mod stage;
pub mod sync;

use std::{cell::RefCell, rc::Rc};

use async_std::{channel::Sender, task::spawn_local};
use log::{debug, info, warn};
use url::Url;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::{HtmlElement, HtmlMediaElement, HtmlTrackElement};

use crate::{
    cache::offline::{BrowserCacheStore, OfflinePrefetcher, OfflineState, PrefetchFuture},
    error::{Result, ShowError},
    js_api::{with_dispatch_held, JsApi, PlaybackSnapshot},
    rendering::{self, with_renderer_mut, FrameLoop},
    show::{
        loader::{load_script, ScriptState},
        meta::{resolve_asset_url, ShowMeta},
        script::ScriptTimeline,
    },
};

use self::{
    audience::AudienceAudio,
    audio_analysis::{mouth_amplitude, AnalysisTap},
    captions::CaptionBinding,
    commands::PlayerExecutionItem,
    settings::{open_store, save_time, PlaybackSpeed, PlayerSettings, SettingsStore, TimeSaveThrottle},
    sync::{FrameOptions, FrameSynchronizer},
};

pub const STAGE_SEED: u32 = 1337;
pub const SEEK_STEP_SEC: f64 = 10.0;

const MEDIA_EVENTS: [&str; 5] = ["play", "pause", "ended", "seeking", "loadedmetadata"];

fn ui_language() -> String {
    web_sys::window()
        .and_then(|window| window.navigator().language())
        .unwrap_or_else(|| "en".to_string())
}

fn prefers_reduced_motion() -> bool {
    web_sys::window()
        .and_then(|window| window.match_media("(prefers-reduced-motion: reduce)").ok().flatten())
        .map_or(false, |query| query.matches())
}

struct MediaListener {
    target: web_sys::EventTarget,
    event: &'static str,
    callback: Closure<dyn FnMut()>,
}

impl MediaListener {
    fn attach(target: &web_sys::EventTarget, event: &'static str) -> Result<MediaListener> {
        let callback = Closure::<dyn FnMut()>::new(move || {
            reserve_player_mut(|player| player.on_media_event(event));
        });
        target.add_event_listener_with_callback(event, callback.as_ref().unchecked_ref())?;
        Ok(MediaListener {
            target: target.clone(),
            event,
            callback,
        })
    }

    fn detach(self) {
        let _ = self
            .target
            .remove_event_listener_with_callback(self.event, self.callback.as_ref().unchecked_ref());
    }
}

/// Everything the showcase player owns: settings, the synchronized stage, the
/// media element and the optional audio enhancements.
pub struct ShowPlayer {
    pub meta: ShowMeta,
    pub base_url: Option<Url>,
    pub settings: PlayerSettings,
    store: Box<dyn SettingsStore>,
    pub script_state: ScriptState,
    pub sync: FrameSynchronizer,
    pub options: FrameOptions,
    media: Option<HtmlMediaElement>,
    container: Option<HtmlElement>,
    listeners: Vec<MediaListener>,
    captions: CaptionBinding,
    analysis: Option<AnalysisTap>,
    analysis_failed: bool,
    audience: Option<AudienceAudio>,
    offline: Option<OfflinePrefetcher<BrowserCacheStore>>,
    frame_loop: Option<FrameLoop>,
    pub is_playing: bool,
    pub resume_offered: bool,
    time_throttle: TimeSaveThrottle,
    last_speaker: Option<String>,
}

impl ShowPlayer {
    pub fn new(meta: ShowMeta) -> ShowPlayer {
        let store = open_store();
        let settings = PlayerSettings::load(store.as_ref(), &meta, &ui_language());
        let options = FrameOptions {
            reduce_motion: prefers_reduced_motion(),
            audience_mode: settings.audience_mode,
            speaker_override: None,
        };
        ShowPlayer {
            resume_offered: settings.can_resume(),
            meta,
            base_url: None,
            settings,
            store,
            script_state: ScriptState::Loading,
            sync: FrameSynchronizer::new(Rc::new(ScriptTimeline::idle()), STAGE_SEED),
            options,
            media: None,
            container: None,
            listeners: Vec::new(),
            captions: CaptionBinding::new(),
            analysis: None,
            analysis_failed: false,
            audience: None,
            offline: None,
            frame_loop: None,
            is_playing: false,
            time_throttle: TimeSaveThrottle::default(),
            last_speaker: None,
        }
    }

    pub fn asset_url(&self, path: &str) -> String {
        resolve_asset_url(self.base_url.as_ref(), path)
    }

    pub fn set_base_url(&mut self, url: Url) {
        debug!("Base URL set to {}", url);
        self.base_url = Some(url);
    }

    // Mounting

    pub fn mount(&mut self, container: HtmlElement, media: HtmlMediaElement) -> Result<()> {
        self.unmount();

        let stage_available = match rendering::mount(container.clone()) {
            Ok(available) => available,
            Err(err) => {
                warn!("Stage renderer unavailable: {}", err);
                false
            }
        };
        JsApi::dispatch_stage_available(stage_available);

        self.add_caption_tracks(&media)?;
        media.set_preload("none");
        media.set_cross_origin(Some("anonymous"));
        media.set_volume(self.settings.volume);
        self.apply_speed(&media);

        for event in MEDIA_EVENTS {
            self.listeners.push(MediaListener::attach(&media, event)?);
        }
        if let Some(document) = web_sys::window().and_then(|window| window.document()) {
            self.listeners
                .push(MediaListener::attach(&document, "fullscreenchange")?);
        }

        self.captions.bind(
            &media,
            self.settings.captions_enabled,
            &self.settings.caption_lang,
        );
        self.media = Some(media);
        self.container = Some(container);

        if self.frame_loop.is_none() {
            self.frame_loop = Some(FrameLoop::start(|now_ms| {
                reserve_player_mut(|player| {
                    player.on_frame(now_ms);
                    with_renderer_mut(|renderer_lock| {
                        if let Some(renderer) = renderer_lock {
                            renderer.draw(player.sync.stage());
                        }
                    });
                });
            }));
        }

        JsApi::dispatch_settings_changed(&self.settings);
        self.dispatch_playback_state();
        info!("Player mounted");
        Ok(())
    }

    /// Tear down everything `mount` created. Safe to call when not mounted.
    pub fn unmount(&mut self) {
        if let Some(frame_loop) = self.frame_loop.take() {
            frame_loop.cancel();
        }
        for listener in self.listeners.drain(..) {
            listener.detach();
        }
        self.captions.unbind();
        rendering::unmount();
        if self.is_playing {
            if let Some(t) = self.current_time() {
                save_time(self.store.as_mut(), &self.meta, t);
            }
        }
        self.audience = None;
        self.analysis = None;
        self.media = None;
        self.container = None;
        self.is_playing = false;
    }

    fn add_caption_tracks(&self, media: &HtmlMediaElement) -> Result<()> {
        if media.query_selector("track")?.is_some() {
            return Ok(());
        }
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or(ShowError::Unavailable("document"))?;
        for caption in &self.meta.captions {
            let track = document
                .create_element("track")?
                .dyn_into::<HtmlTrackElement>()?;
            track.set_kind("subtitles");
            track.set_srclang(&caption.lang);
            track.set_label(&caption.label);
            track.set_src(&self.asset_url(&caption.src));
            media.append_child(&track)?;
        }
        Ok(())
    }

    /// Assign the media source on first use so nothing is downloaded before
    /// the visitor asks for it.
    pub fn ensure_media(&mut self) {
        let Some(media) = self.media.clone() else {
            return;
        };
        if media.get_attribute("src").is_none() {
            media.set_src(&self.asset_url(&self.meta.audio_src));
            media.load();
            self.apply_speed(&media);
            self.rebind_captions();
        }
    }

    fn apply_speed(&self, media: &HtmlMediaElement) {
        let rate = self.settings.speed.rate();
        media.set_default_playback_rate(rate);
        media.set_playback_rate(rate);
    }

    fn rebind_captions(&mut self) {
        if let Some(media) = &self.media {
            self.captions.bind(
                media,
                self.settings.captions_enabled,
                &self.settings.caption_lang,
            );
        }
    }

    pub fn current_time(&self) -> Option<f64> {
        self.media.as_ref().map(|media| media.current_time())
    }

    // Frame

    pub fn on_frame(&mut self, now_ms: f64) {
        let media_time = self.current_time();
        let measured = self.analysis.as_mut().map(|tap| tap.amplitude());
        let report = self.sync.tick(now_ms, media_time, &self.options, &mut |t| {
            mouth_amplitude(measured, t)
        });

        if report.speaker != self.last_speaker {
            JsApi::dispatch_speaker_changed(report.speaker.as_deref());
            self.last_speaker = report.speaker;
        }

        let reduce_motion = self.options.reduce_motion;
        if self.options.audience_mode {
            if let Some(audience) = self.audience.as_mut() {
                audience.set_ambient(self.is_playing, reduce_motion);
                if self.is_playing {
                    for laugh in &report.laughs {
                        if let Err(err) = audience.play_laugh(laugh.intensity, reduce_motion) {
                            debug!("Laugh playback failed: {}", err);
                        }
                    }
                }
            }
        }

        let t = report.sample.t_media;
        if self.is_playing && media_time.is_some() && self.time_throttle.should_save(t) {
            save_time(self.store.as_mut(), &self.meta, t);
        }
    }

    fn on_media_event(&mut self, event: &str) {
        match event {
            "play" => {
                self.is_playing = true;
                self.resume_offered = false;
            }
            "pause" | "ended" => {
                self.is_playing = false;
                if let Some(t) = self.current_time() {
                    save_time(self.store.as_mut(), &self.meta, t);
                    self.time_throttle.reset(t);
                }
            }
            "seeking" => self.sync.mark_seek(),
            _ => {}
        }
        self.dispatch_playback_state();
    }

    pub fn playback_snapshot(&self) -> PlaybackSnapshot {
        let duration = self
            .media
            .as_ref()
            .map(|media| media.duration())
            .filter(|d| d.is_finite())
            .unwrap_or(0.0);
        let fullscreen = web_sys::window()
            .and_then(|window| window.document())
            .map_or(false, |document| document.fullscreen_element().is_some());
        PlaybackSnapshot {
            playing: self.is_playing,
            current_time: self.current_time().unwrap_or(0.0),
            duration,
            fullscreen,
            resume_available: self.resume_offered,
            saved_time: self.settings.saved_time,
        }
    }

    fn dispatch_playback_state(&self) {
        JsApi::dispatch_playback_state(&self.playback_snapshot());
    }

    // Script

    pub fn apply_script_state(&mut self, state: ScriptState) {
        match &state {
            ScriptState::Ready(timeline) => {
                self.sync.set_timeline(Rc::clone(timeline));
                JsApi::dispatch_show_loaded(&self.meta, timeline);
            }
            ScriptState::Failed(message) => JsApi::dispatch_script_error(message),
            ScriptState::Loading => {}
        }
        self.script_state = state;
    }

    // Playback

    /// Prepare everything a user-initiated play needs and start the media.
    /// Returns the `play()` promise to await outside the player borrow.
    fn begin_play(&mut self, from: Option<f64>) -> Result<Option<js_sys::Promise>> {
        let Some(media) = self.media.clone() else {
            return Ok(None);
        };
        self.ensure_media();
        self.ensure_analysis(&media);
        if self.settings.audience_mode {
            self.ensure_audience();
        }
        self.spawn_offline_prefetch();
        if let Some(from) = from {
            self.seek_to(from);
        }
        Ok(Some(media.play()?))
    }

    fn on_play_started(&mut self) {
        self.is_playing = true;
        self.resume_offered = false;
        self.dispatch_playback_state();
    }

    pub fn pause(&mut self) {
        if let Some(media) = &self.media {
            if let Err(err) = media.pause() {
                warn!("Pause failed: {:?}", err);
            }
        }
        self.is_playing = false;
        self.dispatch_playback_state();
    }

    /// Pause when playing, otherwise play from the offered resume point if
    /// there is one.
    pub fn toggle_play(&mut self) {
        if self.is_playing {
            self.pause();
            return;
        }
        let from = self.resume_offered.then_some(self.settings.saved_time);
        commands::player_dispatch(commands::PlayerCommand::Play { from });
    }

    fn seek_to(&mut self, t: f64) {
        let Some(media) = self.media.clone() else {
            return;
        };
        self.ensure_media();
        let t = t.max(0.0);
        media.set_current_time(t);
        self.sync.mark_seek();
        self.time_throttle.reset(t);
    }

    pub fn seek_by(&mut self, delta: f64) {
        let t = self.current_time().unwrap_or(0.0) + delta;
        self.seek_to(t);
        self.dispatch_playback_state();
    }

    pub fn skip_intro(&mut self) {
        let intro_end = self.sync.timeline().intro_end_sec;
        self.seek_to(intro_end);
        self.dispatch_playback_state();
    }

    /// Dismiss the resume offer and rewind to the beginning.
    pub fn start_over(&mut self) {
        if self.media.is_none() {
            return;
        }
        self.seek_to(0.0);
        save_time(self.store.as_mut(), &self.meta, 0.0);
        self.settings.saved_time = 0.0;
        self.resume_offered = false;
        self.dispatch_playback_state();
    }

    pub fn resume(&mut self) {
        let from = self.settings.saved_time;
        commands::player_dispatch(commands::PlayerCommand::Play { from: Some(from) });
    }

    // Settings

    pub fn set_captions_enabled(&mut self, enabled: bool) {
        self.settings
            .save_captions_enabled(self.store.as_mut(), &self.meta, enabled);
        self.rebind_captions();
        JsApi::dispatch_settings_changed(&self.settings);
    }

    pub fn toggle_captions(&mut self) {
        self.set_captions_enabled(!self.settings.captions_enabled);
    }

    /// Only languages with a caption track are accepted.
    pub fn set_caption_lang(&mut self, lang: &str) -> bool {
        if !self.meta.has_caption_lang(lang) {
            warn!("No caption track for {}", lang);
            return false;
        }
        self.settings
            .save_caption_lang(self.store.as_mut(), &self.meta, lang);
        self.rebind_captions();
        JsApi::dispatch_settings_changed(&self.settings);
        true
    }

    pub fn set_speed(&mut self, rate: f64) -> bool {
        let Some(speed) = PlaybackSpeed::from_rate(rate) else {
            warn!("Unsupported playback speed {}", rate);
            return false;
        };
        self.settings.save_speed(self.store.as_mut(), &self.meta, speed);
        if let Some(media) = &self.media {
            self.apply_speed(media);
        }
        JsApi::dispatch_settings_changed(&self.settings);
        true
    }

    pub fn set_volume(&mut self, volume: f64) -> f64 {
        let volume = self
            .settings
            .save_volume(self.store.as_mut(), &self.meta, volume);
        if let Some(media) = &self.media {
            media.set_volume(volume);
        }
        JsApi::dispatch_settings_changed(&self.settings);
        volume
    }

    pub fn set_audience_mode(&mut self, enabled: bool) {
        self.settings
            .save_audience_mode(self.store.as_mut(), &self.meta, enabled);
        self.options.audience_mode = enabled;
        if enabled {
            self.ensure_audience();
        } else if let Some(audience) = &self.audience {
            audience.mute();
        }
        JsApi::dispatch_settings_changed(&self.settings);
    }

    pub fn toggle_audience_mode(&mut self) {
        self.set_audience_mode(!self.settings.audience_mode);
    }

    pub fn set_reduce_motion(&mut self, reduce: bool) {
        self.options.reduce_motion = reduce;
    }

    pub fn set_active_speaker(&mut self, speaker: Option<String>) {
        self.options.speaker_override = speaker.filter(|id| !id.is_empty());
    }

    pub fn toggle_fullscreen(&self) -> Result<()> {
        let document = web_sys::window()
            .and_then(|window| window.document())
            .ok_or(ShowError::Unavailable("document"))?;
        if document.fullscreen_element().is_some() {
            document.exit_fullscreen();
        } else if let Some(container) = &self.container {
            container.request_fullscreen()?;
        }
        Ok(())
    }

    // Enhancements; each must only be created from a user gesture.

    fn ensure_analysis(&mut self, media: &HtmlMediaElement) {
        if self.analysis.is_some() || self.analysis_failed {
            return;
        }
        match AnalysisTap::attach(media) {
            Ok(tap) => self.analysis = Some(tap),
            Err(err) => {
                debug!("Audio analysis unavailable: {}", err);
                self.analysis_failed = true;
            }
        }
    }

    fn ensure_audience(&mut self) {
        if self.audience.is_some() {
            return;
        }
        match AudienceAudio::start(STAGE_SEED) {
            Ok(audience) => self.audience = Some(audience),
            Err(err) => debug!("Audience audio unavailable: {}", err),
        }
    }

    fn offline_prefetcher(&mut self) -> Option<&OfflinePrefetcher<BrowserCacheStore>> {
        if self.offline.is_none() {
            if !BrowserCacheStore::is_supported() {
                return None;
            }
            let assets = self
                .meta
                .offline_asset_paths()
                .iter()
                .map(|path| self.asset_url(path))
                .collect();
            let prefetcher = OfflinePrefetcher::new(BrowserCacheStore::show_cache(), assets);
            prefetcher.set_listener(JsApi::dispatch_offline_state);
            self.offline = Some(prefetcher);
        }
        self.offline.as_ref()
    }

    /// Join or start the offline prefetch. `None` when the Cache API is
    /// missing.
    pub fn ensure_offline(&mut self) -> Option<PrefetchFuture> {
        self.offline_prefetcher().map(|prefetcher| prefetcher.ensure())
    }

    pub fn offline_state(&self) -> OfflineState {
        self.offline
            .as_ref()
            .map_or(OfflineState::Idle, |prefetcher| prefetcher.state())
    }

    fn spawn_offline_prefetch(&mut self) {
        if let Some(prefetch) = self.ensure_offline() {
            spawn_local(async move {
                prefetch.await;
            });
        }
    }
}

thread_local! {
    pub static PLAYER: RefCell<ShowPlayer> = RefCell::new(ShowPlayer::new(ShowMeta::pilot_v1()));
    pub static PLAYER_TX: RefCell<Option<Sender<PlayerExecutionItem>>> = RefCell::new(None);
}

pub fn reserve_player_mut<F, R>(f: F) -> R
where
    F: FnOnce(&mut ShowPlayer) -> R,
{
    with_dispatch_held(|| PLAYER.with_borrow_mut(f))
}

pub fn reserve_player_ref<F, R>(f: F) -> R
where
    F: FnOnce(&ShowPlayer) -> R,
{
    with_dispatch_held(|| PLAYER.with_borrow(f))
}

pub async fn player_load_show() -> Result<()> {
    let url = reserve_player_mut(|player| {
        player.script_state = ScriptState::Loading;
        player.asset_url(&player.meta.script_src)
    });
    let state = load_script(&url).await;
    let result = match &state {
        ScriptState::Failed(message) => Err(ShowError::Js(message.clone())),
        _ => Ok(()),
    };
    reserve_player_mut(|player| player.apply_script_state(state));
    result
}

pub async fn player_play(from: Option<f64>) -> Result<()> {
    let promise = reserve_player_mut(|player| player.begin_play(from))?;
    let Some(promise) = promise else {
        return Err(ShowError::Unavailable("media element"));
    };
    JsFuture::from(promise).await?;
    reserve_player_mut(|player| player.on_play_started());
    Ok(())
}

pub async fn player_save_offline() -> Result<OfflineState> {
    let prefetch = reserve_player_mut(|player| player.ensure_offline());
    match prefetch {
        Some(prefetch) => Ok(prefetch.await),
        None => {
            info!("Cache API unavailable, offline copy skipped");
            Ok(OfflineState::Idle)
        }
    }
}
