use serde::Deserialize;

use crate::models::{
    CatalogAnime, ExternalResource, Overlap, Theme, ThemeEntry, ThemeType, Video, VideoSource,
};

// ── Shape normalization ──────────────────────────────────────────

/// A field the API sends either as a single value or as a list.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::One(v) => vec![v],
            Self::Many(v) => v,
        }
    }
}

// ── Resource lookup ──────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ResourceIndexResponse {
    #[serde(default)]
    pub resources: Vec<RawResource>,
}

#[derive(Debug, Deserialize)]
pub struct RawResource {
    pub site: Option<String>,
    pub external_id: Option<u64>,
    pub anime: Option<OneOrMany<RawAnimeStub>>,
}

#[derive(Debug, Deserialize)]
pub struct RawAnimeStub {
    pub slug: Option<String>,
}

impl ResourceIndexResponse {
    /// First non-blank anime slug attached to any returned resource.
    pub fn first_slug(self) -> Option<String> {
        self.resources
            .into_iter()
            .filter_map(|r| r.anime)
            .flat_map(OneOrMany::into_vec)
            .filter_map(|stub| stub.slug)
            .find(|slug| !slug.trim().is_empty())
    }
}

// ── Anime show ───────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AnimeShowResponse {
    pub anime: RawAnime,
}

#[derive(Debug, Deserialize)]
pub struct RawAnime {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub year: Option<i32>,
    pub season: Option<String>,
    #[serde(default)]
    pub resources: Vec<RawResource>,
    #[serde(default)]
    pub animethemes: Vec<RawTheme>,
}

#[derive(Debug, Deserialize)]
pub struct RawTheme {
    #[serde(rename = "type")]
    pub theme_type: Option<String>,
    pub slug: Option<String>,
    #[serde(default)]
    pub animethemeentries: Vec<RawEntry>,
}

#[derive(Debug, Deserialize)]
pub struct RawEntry {
    pub version: Option<u32>,
    pub spoiler: Option<bool>,
    #[serde(default)]
    pub videos: Vec<RawVideo>,
}

#[derive(Debug, Deserialize)]
pub struct RawVideo {
    pub basename: String,
    pub link: String,
    pub resolution: Option<u32>,
    pub nc: Option<bool>,
    pub overlap: Option<String>,
    pub source: Option<String>,
    pub tags: Option<OneOrMany<String>>,
    pub audio: Option<RawAudio>,
}

#[derive(Debug, Deserialize)]
pub struct RawAudio {
    pub link: Option<String>,
}

// ── Conversions ──────────────────────────────────────────────────

impl RawAnime {
    pub fn into_catalog(self) -> CatalogAnime {
        CatalogAnime {
            id: self.id,
            name: self.name,
            slug: self.slug,
            year: self.year,
            season: self.season,
            resources: self
                .resources
                .into_iter()
                .filter_map(|r| {
                    Some(ExternalResource {
                        site: r.site?,
                        external_id: r.external_id,
                    })
                })
                .collect(),
            themes: self.animethemes.into_iter().map(RawTheme::into_theme).collect(),
        }
    }
}

impl RawTheme {
    fn into_theme(self) -> Theme {
        Theme {
            theme_type: ThemeType::from(self.theme_type.as_deref().unwrap_or_default()),
            slug: self.slug.unwrap_or_default(),
            entries: self
                .animethemeentries
                .into_iter()
                .map(|e| ThemeEntry {
                    version: e.version.unwrap_or(1).max(1),
                    spoiler: e.spoiler.unwrap_or(false),
                    videos: e.videos.into_iter().map(RawVideo::into_video).collect(),
                })
                .collect(),
        }
    }
}

impl RawVideo {
    fn into_video(self) -> Video {
        Video {
            overlap: Overlap::from(self.overlap.as_deref()),
            source: VideoSource::from(self.source.as_deref()),
            creditless: self.nc.unwrap_or(false),
            tags: self
                .tags
                .map(OneOrMany::into_vec)
                .unwrap_or_default()
                .into_iter()
                .filter(|t| !t.is_empty())
                .collect(),
            audio_link: self
                .audio
                .and_then(|a| a.link)
                .filter(|l| !l.trim().is_empty()),
            basename: self.basename,
            link: self.link,
            resolution: self.resolution,
        }
    }
}
