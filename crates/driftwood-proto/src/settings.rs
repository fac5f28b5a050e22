use serde::{Deserialize, Serialize};

pub const DEFAULT_PRIMARY_COLOR: &str = "#3b82f6";
pub const DEFAULT_BACKGROUND_VALUE: &str = "#1e293b";
pub const DEFAULT_SEARCH_ENGINE: &str = "duckduckgo";
pub const DEFAULT_LANGUAGE: &str = "en";

/// Full, current-version settings object of one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub primary_color: String,
    pub theme: Theme,
    pub background: Background,
    pub clock: ClockSettings,
    pub show_bookmarks: bool,
    pub search_engine: String,
    pub language: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            primary_color: DEFAULT_PRIMARY_COLOR.into(),
            theme: Theme::Auto,
            background: Background::default(),
            clock: ClockSettings::default(),
            show_bookmarks: true,
            search_engine: DEFAULT_SEARCH_ENGINE.into(),
            language: DEFAULT_LANGUAGE.into(),
        }
    }
}

impl Settings {
    /// Copy that is safe to leave the device: every local-only field is reset
    /// to its default.
    ///
    /// Local-only fields are the cached blob handle of the background and any
    /// background backed by a device-local file, which no other device can
    /// resolve.
    pub fn redacted(&self) -> Settings {
        let mut out = self.clone();
        if out.background.kind == BackgroundKind::LocalFile {
            out.background = Background::default();
        }
        out.background.local_blob_id = None;
        out
    }

    /// Re-applies this device's local-only fields on top of settings pulled from
    /// the replicated store.
    pub fn with_device_fields(mut self, device: &Settings) -> Settings {
        if device.background.kind == BackgroundKind::LocalFile {
            self.background = device.background.clone();
        } else {
            self.background.local_blob_id = device.background.local_blob_id.clone();
        }
        self
    }

    /// True when no local-only field carries a device value.
    pub fn is_redacted(&self) -> bool {
        self.background.local_blob_id.is_none()
            && self.background.kind != BackgroundKind::LocalFile
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Theme {
    #[default]
    Auto,
    Light,
    Dark,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Background {
    pub kind: BackgroundKind,
    pub value: String,
    /// Handle into the device's blob storage; never valid on another device.
    #[serde(default)]
    pub local_blob_id: Option<String>,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            kind: BackgroundKind::Solid,
            value: DEFAULT_BACKGROUND_VALUE.into(),
            local_blob_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackgroundKind {
    Solid,
    Gradient,
    Remote,
    LocalFile,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSettings {
    pub enabled: bool,
    pub format24h: bool,
}

impl Default for ClockSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            format24h: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bookmark {
    pub url: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub favicon: Option<String>,
}

impl Bookmark {
    pub fn new(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: title.into(),
            favicon: None,
        }
    }

    pub fn with_favicon(mut self, favicon: impl Into<String>) -> Self {
        self.favicon = Some(favicon.into());
        self
    }
}

pub type BookmarkList = Vec<Bookmark>;
