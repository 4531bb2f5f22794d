//! Upstream clients for shudaika: AniList search, the AnimeThemes catalog,
//! and the reactive rate limiter both share.

pub mod anilist;
pub mod animethemes;
pub mod models;
pub mod rate_limit;
pub mod traits;
