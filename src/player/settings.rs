use fxhash::FxHashMap;
use log::warn;

use crate::show::meta::ShowMeta;
use crate::utils::clamp01;

pub const DEFAULT_VOLUME: f64 = 0.9;
/// Saved positions shorter than this are not worth offering a resume for.
pub const MIN_RESUME_SEC: f64 = 5.0;
pub const TIME_SAVE_INTERVAL_SEC: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackSpeed {
    X075,
    X1,
    X125,
    X15,
    X2,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 5] = [
        PlaybackSpeed::X075,
        PlaybackSpeed::X1,
        PlaybackSpeed::X125,
        PlaybackSpeed::X15,
        PlaybackSpeed::X2,
    ];

    pub fn from_rate(rate: f64) -> Option<PlaybackSpeed> {
        PlaybackSpeed::ALL
            .iter()
            .copied()
            .find(|speed| speed.rate() == rate)
    }

    pub fn rate(self) -> f64 {
        match self {
            PlaybackSpeed::X075 => 0.75,
            PlaybackSpeed::X1 => 1.0,
            PlaybackSpeed::X125 => 1.25,
            PlaybackSpeed::X15 => 1.5,
            PlaybackSpeed::X2 => 2.0,
        }
    }
}

impl Default for PlaybackSpeed {
    fn default() -> Self {
        PlaybackSpeed::X1
    }
}

/// String key/value persistence, normally `window.localStorage`.
pub trait SettingsStore {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
}

pub struct LocalStorageStore {
    storage: web_sys::Storage,
}

impl LocalStorageStore {
    /// `None` when storage is unavailable (private mode, sandboxed iframe).
    pub fn open() -> Option<LocalStorageStore> {
        let storage = web_sys::window()?.local_storage().ok()??;
        Some(LocalStorageStore { storage })
    }
}

impl SettingsStore for LocalStorageStore {
    fn get(&self, key: &str) -> Option<String> {
        self.storage.get_item(key).ok().flatten()
    }

    fn set(&mut self, key: &str, value: &str) {
        if let Err(err) = self.storage.set_item(key, value) {
            warn!("Failed to persist {}: {:?}", key, err);
        }
    }
}

/// In-memory stand-in used when local storage cannot be opened.
#[derive(Debug, Default)]
pub struct MemoryStore {
    values: FxHashMap<String, String>,
}

impl SettingsStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

pub fn open_store() -> Box<dyn SettingsStore> {
    match LocalStorageStore::open() {
        Some(store) => Box::new(store),
        None => {
            warn!("localStorage unavailable, settings will not persist");
            Box::new(MemoryStore::default())
        }
    }
}

fn flag(value: bool) -> &'static str {
    if value {
        "1"
    } else {
        "0"
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlayerSettings {
    pub captions_enabled: bool,
    pub caption_lang: String,
    pub speed: PlaybackSpeed,
    pub volume: f64,
    pub audience_mode: bool,
    /// Last saved position, zero when below the resume threshold.
    pub saved_time: f64,
}

impl PlayerSettings {
    pub fn load(store: &dyn SettingsStore, meta: &ShowMeta, ui_lang: &str) -> PlayerSettings {
        let key = |suffix: &str| meta.storage_key(suffix);
        let number = |suffix: &str| {
            store
                .get(&key(suffix))
                .and_then(|raw| raw.trim().parse::<f64>().ok())
                .filter(|n| n.is_finite())
        };

        let caption_lang = store
            .get(&key("ccLang"))
            .filter(|lang| !lang.is_empty())
            .unwrap_or_else(|| meta.default_caption_lang(ui_lang));

        PlayerSettings {
            captions_enabled: store.get(&key("cc")).as_deref() == Some("1"),
            caption_lang,
            speed: number("speed")
                .and_then(PlaybackSpeed::from_rate)
                .unwrap_or_default(),
            volume: clamp01(number("vol").unwrap_or(DEFAULT_VOLUME)),
            audience_mode: store.get(&key("audience")).as_deref() == Some("1"),
            saved_time: number("time")
                .filter(|t| *t >= MIN_RESUME_SEC)
                .unwrap_or(0.0),
        }
    }

    pub fn can_resume(&self) -> bool {
        self.saved_time > 0.0
    }

    pub fn save_captions_enabled(&mut self, store: &mut dyn SettingsStore, meta: &ShowMeta, enabled: bool) {
        self.captions_enabled = enabled;
        store.set(&meta.storage_key("cc"), flag(enabled));
    }

    pub fn save_caption_lang(&mut self, store: &mut dyn SettingsStore, meta: &ShowMeta, lang: &str) {
        self.caption_lang = lang.to_string();
        store.set(&meta.storage_key("ccLang"), lang);
    }

    pub fn save_speed(&mut self, store: &mut dyn SettingsStore, meta: &ShowMeta, speed: PlaybackSpeed) {
        self.speed = speed;
        store.set(&meta.storage_key("speed"), &speed.rate().to_string());
    }

    /// Returns the clamped volume actually stored.
    pub fn save_volume(&mut self, store: &mut dyn SettingsStore, meta: &ShowMeta, volume: f64) -> f64 {
        let volume = if volume.is_finite() { clamp01(volume) } else { DEFAULT_VOLUME };
        self.volume = volume;
        store.set(&meta.storage_key("vol"), &volume.to_string());
        volume
    }

    pub fn save_audience_mode(&mut self, store: &mut dyn SettingsStore, meta: &ShowMeta, enabled: bool) {
        self.audience_mode = enabled;
        store.set(&meta.storage_key("audience"), flag(enabled));
    }
}

pub fn save_time(store: &mut dyn SettingsStore, meta: &ShowMeta, t: f64) {
    store.set(&meta.storage_key("time"), &t.to_string());
}

/// Limits position writes to one per five seconds of media time.
#[derive(Debug, Default)]
pub struct TimeSaveThrottle {
    last_saved_at: f64,
}

impl TimeSaveThrottle {
    /// True when `t` is at least the interval away from the last save, in
    /// either direction, so rewinds are persisted too.
    pub fn should_save(&mut self, t: f64) -> bool {
        if (t - self.last_saved_at).abs() >= TIME_SAVE_INTERVAL_SEC {
            self.last_saved_at = t;
            true
        } else {
            false
        }
    }

    pub fn reset(&mut self, t: f64) {
        self.last_saved_at = t;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(pairs: &[(&str, &str)]) -> MemoryStore {
        let mut store = MemoryStore::default();
        for (key, value) in pairs {
            store.set(&format!("show.pilot-v1.{key}"), value);
        }
        store
    }

    #[test]
    fn test_defaults() {
        let meta = ShowMeta::pilot_v1();
        let settings = PlayerSettings::load(&MemoryStore::default(), &meta, "ja-JP");
        assert!(!settings.captions_enabled);
        assert_eq!(settings.caption_lang, "ja");
        assert_eq!(settings.speed, PlaybackSpeed::X1);
        assert_eq!(settings.volume, DEFAULT_VOLUME);
        assert!(!settings.audience_mode);
        assert!(!settings.can_resume());
    }

    #[test]
    fn test_load_saved_values() {
        let meta = ShowMeta::pilot_v1();
        let store = store_with(&[
            ("cc", "1"),
            ("ccLang", "fr"),
            ("speed", "1.5"),
            ("vol", "0.4"),
            ("audience", "1"),
            ("time", "42.5"),
        ]);
        let settings = PlayerSettings::load(&store, &meta, "en");
        assert!(settings.captions_enabled);
        assert_eq!(settings.caption_lang, "fr");
        assert_eq!(settings.speed, PlaybackSpeed::X15);
        assert_eq!(settings.volume, 0.4);
        assert!(settings.audience_mode);
        assert_eq!(settings.saved_time, 42.5);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let meta = ShowMeta::pilot_v1();
        let store = store_with(&[("speed", "3"), ("vol", "7"), ("time", "4.9")]);
        let settings = PlayerSettings::load(&store, &meta, "en");
        assert_eq!(settings.speed, PlaybackSpeed::X1);
        assert_eq!(settings.volume, 1.0);
        assert_eq!(settings.saved_time, 0.0);

        let store = store_with(&[("vol", "NaN"), ("time", "abc")]);
        let settings = PlayerSettings::load(&store, &meta, "en");
        assert_eq!(settings.volume, DEFAULT_VOLUME);
        assert_eq!(settings.saved_time, 0.0);
    }

    #[test]
    fn test_save_round_trips_through_store() {
        let meta = ShowMeta::pilot_v1();
        let mut store = MemoryStore::default();
        let mut settings = PlayerSettings::load(&store, &meta, "en");
        settings.save_speed(&mut store, &meta, PlaybackSpeed::X075);
        assert_eq!(settings.save_volume(&mut store, &meta, -2.0), 0.0);
        settings.save_captions_enabled(&mut store, &meta, true);
        assert_eq!(store.get("show.pilot-v1.cc").as_deref(), Some("1"));
        assert_eq!(PlayerSettings::load(&store, &meta, "en"), settings);
    }

    #[test]
    fn test_speed_rejects_unlisted_rates() {
        assert_eq!(PlaybackSpeed::from_rate(1.25), Some(PlaybackSpeed::X125));
        assert_eq!(PlaybackSpeed::from_rate(1.1), None);
    }

    #[test]
    fn test_time_save_throttle() {
        let mut throttle = TimeSaveThrottle::default();
        assert!(!throttle.should_save(4.9));
        assert!(throttle.should_save(5.0));
        assert!(!throttle.should_save(9.0));
        assert!(throttle.should_save(10.2));
        assert!(throttle.should_save(1.0));
    }
}
