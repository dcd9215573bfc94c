use url::Url;

#[derive(Debug, Clone, PartialEq)]
pub struct CaptionTrack {
    pub lang: String,
    pub label: String,
    pub src: String,
}

/// Static asset manifest for one episode.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowMeta {
    pub id: String,
    pub audio_src: String,
    pub poster_src: String,
    pub script_src: String,
    pub captions: Vec<CaptionTrack>,
}

const PILOT_CAPTIONS: [(&str, &str); 9] = [
    ("en", "English"),
    ("es", "Español"),
    ("fr", "Français"),
    ("de", "Deutsch"),
    ("pt", "Português"),
    ("ja", "日本語"),
    ("ko", "한국어"),
    ("zh", "中文"),
    ("ar", "العربية"),
];

impl ShowMeta {
    pub fn pilot_v1() -> ShowMeta {
        let root = "/show/pilot-v1";
        ShowMeta {
            id: "pilot-v1".to_string(),
            audio_src: format!("{root}/pilot.mp3"),
            poster_src: format!("{root}/poster.svg"),
            script_src: format!("{root}/script.json"),
            captions: PILOT_CAPTIONS
                .iter()
                .map(|(lang, label)| CaptionTrack {
                    lang: lang.to_string(),
                    label: label.to_string(),
                    src: format!("{root}/captions/{lang}.vtt"),
                })
                .collect(),
        }
    }

    /// Local storage key for a per-show setting, e.g. `show.pilot-v1.cc`.
    pub fn storage_key(&self, suffix: &str) -> String {
        format!("show.{}.{}", self.id, suffix)
    }

    pub fn has_caption_lang(&self, lang: &str) -> bool {
        self.captions.iter().any(|c| c.lang.eq_ignore_ascii_case(lang))
    }

    /// Caption language to use when the user never picked one: the UI language
    /// if a track exists for it, English otherwise.
    pub fn default_caption_lang(&self, ui_lang: &str) -> String {
        let lang = base_lang(ui_lang);
        if self.has_caption_lang(&lang) {
            lang
        } else {
            "en".to_string()
        }
    }

    /// Every asset needed to replay the episode offline.
    pub fn offline_asset_paths(&self) -> Vec<String> {
        let mut paths = vec![
            self.audio_src.clone(),
            self.poster_src.clone(),
            self.script_src.clone(),
        ];
        paths.extend(self.captions.iter().map(|c| c.src.clone()));
        paths
    }
}

/// `pt-BR` -> `pt`; empty -> `en`.
pub fn base_lang(lang: &str) -> String {
    match lang.split('-').next() {
        Some(base) if !base.is_empty() => base.to_lowercase(),
        _ => "en".to_string(),
    }
}

/// Resolve an asset path against the page base, leaving it untouched when no
/// base is known or the join fails.
pub fn resolve_asset_url(base: Option<&Url>, path: &str) -> String {
    base.and_then(|base| base.join(path).ok())
        .map(|url| url.to_string())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pilot_has_nine_caption_tracks() {
        let meta = ShowMeta::pilot_v1();
        assert_eq!(meta.captions.len(), 9);
        assert_eq!(meta.captions[1].src, "/show/pilot-v1/captions/es.vtt");
    }

    #[test]
    fn test_offline_assets_cover_media_poster_script_and_captions() {
        let meta = ShowMeta::pilot_v1();
        let paths = meta.offline_asset_paths();
        assert_eq!(paths.len(), 12);
        assert_eq!(paths[0], "/show/pilot-v1/pilot.mp3");
        assert!(paths.contains(&"/show/pilot-v1/captions/ar.vtt".to_string()));
    }

    #[test]
    fn test_default_caption_lang() {
        let meta = ShowMeta::pilot_v1();
        assert_eq!(meta.default_caption_lang("pt-BR"), "pt");
        assert_eq!(meta.default_caption_lang("it"), "en");
        assert_eq!(meta.default_caption_lang(""), "en");
    }

    #[test]
    fn test_storage_key() {
        assert_eq!(ShowMeta::pilot_v1().storage_key("vol"), "show.pilot-v1.vol");
    }

    #[test]
    fn test_resolve_asset_url() {
        let base = Url::parse("https://example.com/site/").unwrap();
        assert_eq!(
            resolve_asset_url(Some(&base), "/show/pilot-v1/pilot.mp3"),
            "https://example.com/show/pilot-v1/pilot.mp3"
        );
        assert_eq!(resolve_asset_url(None, "/a.vtt"), "/a.vtt");
    }
}
