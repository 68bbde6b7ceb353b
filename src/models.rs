use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Station {
    pub stationuuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub url_resolved: String,
    #[serde(default)]
    pub homepage: String,
    #[serde(default)]
    pub favicon: String,
    #[serde(default)]
    pub country: String,
    #[serde(default)]
    pub countrycode: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub tags: String,
    #[serde(default)]
    pub codec: String,
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default)]
    pub votes: u32,
}

impl Station {
    /// Resolved stream URL when the directory has one, the raw URL otherwise.
    pub fn stream_url(&self) -> Option<&str> {
        [self.url_resolved.trim(), self.url.trim()]
            .into_iter()
            .find(|u| !u.is_empty())
    }

    pub fn tag_list(&self) -> Vec<&str> {
        self.tags
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .collect()
    }

    pub fn is_playable(&self) -> bool {
        !self.name.trim().is_empty() && self.stream_url().is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayMode {
    All,
    Genre(String),
    TopVoted,
    Favorites,
    Search,
}

impl DisplayMode {
    pub fn label(&self) -> String {
        match self {
            DisplayMode::All => "all stations".to_string(),
            DisplayMode::Genre(tag) => format!("genre: {tag}"),
            DisplayMode::TopVoted => "top voted".to_string(),
            DisplayMode::Favorites => "favorites".to_string(),
            DisplayMode::Search => "search results".to_string(),
        }
    }
}

pub const DEFAULT_LIMIT: u32 = 300;
pub const ALL_GENRES: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowseOptions {
    pub language: String,
    pub country: String,
    pub codec: String,
    /// 0 means any bitrate.
    pub bitrate: u32,
    pub limit: u32,
    pub genre: String,
}

impl Default for BrowseOptions {
    fn default() -> Self {
        Self {
            language: String::new(),
            country: String::new(),
            codec: String::new(),
            bitrate: 0,
            limit: DEFAULT_LIMIT,
            genre: ALL_GENRES.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchFilters {
    pub name: Option<String>,
    pub country: Option<String>,
    pub language: Option<String>,
    pub genre: Option<String>,
    pub bitrate: Option<u32>,
    pub codecs: Vec<String>,
}
