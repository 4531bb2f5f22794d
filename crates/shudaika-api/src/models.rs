use serde::{Deserialize, Serialize};

/// One title in the theme catalog, with its full theme graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogAnime {
    pub id: u64,
    pub name: String,
    pub slug: String,
    pub year: Option<i32>,
    pub season: Option<String>,
    pub resources: Vec<ExternalResource>,
    pub themes: Vec<Theme>,
}

impl CatalogAnime {
    /// External id listed for a resource site (e.g. "AniList"), if any.
    pub fn external_id(&self, site: &str) -> Option<u64> {
        self.resources
            .iter()
            .find(|r| r.site.eq_ignore_ascii_case(site))
            .and_then(|r| r.external_id)
    }

    /// Lowercased theme slugs, used to recognise files that belong to this title.
    /// Themes without a slug contribute nothing; their type alone is too
    /// generic to identify a file.
    pub fn theme_slugs(&self) -> Vec<String> {
        self.themes
            .iter()
            .map(|t| t.slug.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalResource {
    pub site: String,
    pub external_id: Option<u64>,
}

/// Opening or ending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThemeType {
    Op,
    Ed,
    Other(String),
}

impl ThemeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Op => "OP",
            Self::Ed => "ED",
            Self::Other(s) => s,
        }
    }
}

impl From<&str> for ThemeType {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_uppercase().as_str() {
            "OP" => Self::Op,
            "ED" => Self::Ed,
            _ => Self::Other(s.trim().to_string()),
        }
    }
}

impl std::fmt::Display for ThemeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A logical theme slot, e.g. "OP1".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Theme {
    pub theme_type: ThemeType,
    pub slug: String,
    pub entries: Vec<ThemeEntry>,
}

impl Theme {
    /// Slug used for file names; falls back to the type when the slug is blank.
    pub fn file_stem(&self) -> &str {
        let slug = self.slug.trim();
        if slug.is_empty() {
            self.theme_type.as_str()
        } else {
            slug
        }
    }
}

/// One version (v1, v2, ...) of a theme.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThemeEntry {
    pub version: u32,
    pub spoiler: bool,
    pub videos: Vec<Video>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Overlap {
    None,
    Over,
    Transition,
    Other(String),
}

impl From<Option<&str>> for Overlap {
    fn from(s: Option<&str>) -> Self {
        match s.map(str::trim) {
            None | Some("") => Self::None,
            Some(v) if v.eq_ignore_ascii_case("none") => Self::None,
            Some(v) if v.eq_ignore_ascii_case("over") => Self::Over,
            Some(v) if v.eq_ignore_ascii_case("transition") => Self::Transition,
            Some(v) => Self::Other(v.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum VideoSource {
    Bd,
    Dvd,
    Ld,
    Vhs,
    Web,
    Raw,
    Other(String),
    Unknown,
}

impl From<Option<&str>> for VideoSource {
    fn from(s: Option<&str>) -> Self {
        let Some(v) = s.map(str::trim).filter(|v| !v.is_empty()) else {
            return Self::Unknown;
        };
        match v.to_ascii_uppercase().as_str() {
            "BD" => Self::Bd,
            "DVD" => Self::Dvd,
            "LD" => Self::Ld,
            "VHS" => Self::Vhs,
            "WEB" => Self::Web,
            "RAW" => Self::Raw,
            _ => Self::Other(v.to_string()),
        }
    }
}

/// A downloadable rendition of a theme entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Video {
    pub basename: String,
    pub link: String,
    pub resolution: Option<u32>,
    pub creditless: bool,
    pub tags: Vec<String>,
    pub overlap: Overlap,
    pub source: VideoSource,
    pub audio_link: Option<String>,
}

impl Video {
    /// Explicitly flagged creditless, or tagged "NC" / "Creditless".
    pub fn is_creditless(&self) -> bool {
        self.creditless
            || self.tags.iter().any(|tag| {
                let tag = tag.to_lowercase();
                tag.contains("nc") || tag.contains("creditless")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(tags: &[&str], nc: bool) -> Video {
        Video {
            basename: "Test-OP1.webm".into(),
            link: "https://v.animethemes.moe/Test-OP1.webm".into(),
            resolution: Some(1080),
            creditless: nc,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            overlap: Overlap::None,
            source: VideoSource::Bd,
            audio_link: None,
        }
    }

    #[test]
    fn test_creditless_from_flag_or_tags() {
        assert!(video(&[], true).is_creditless());
        assert!(video(&["NCBD1080"], false).is_creditless());
        assert!(video(&["Creditless"], false).is_creditless());
        assert!(!video(&["BD1080"], false).is_creditless());
    }

    #[test]
    fn test_overlap_and_source_parsing() {
        assert_eq!(Overlap::from(None), Overlap::None);
        assert_eq!(Overlap::from(Some("Over")), Overlap::Over);
        assert_eq!(Overlap::from(Some("transition")), Overlap::Transition);
        assert_eq!(VideoSource::from(Some("vhs")), VideoSource::Vhs);
        assert_eq!(VideoSource::from(None), VideoSource::Unknown);
        assert_eq!(
            VideoSource::from(Some("Laser")),
            VideoSource::Other("Laser".into())
        );
    }

    #[test]
    fn test_file_stem_falls_back_to_type() {
        let theme = Theme {
            theme_type: ThemeType::from("ed"),
            slug: "  ".into(),
            entries: vec![],
        };
        assert_eq!(theme.file_stem(), "ED");
    }
}
