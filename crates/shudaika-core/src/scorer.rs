//! Penalty scoring of theme videos.
//!
//! Every video gets a penalty (lower is better) from independent
//! components. Each theme entry contributes at most one candidate: its
//! cheapest video that survives the policy's exclusion filters.

use shudaika_api::models::{Overlap, Theme, ThemeEntry, ThemeType, Video, VideoSource};

use crate::config::ThemePolicy;

pub const SPOILER_PENALTY: u32 = 50;
pub const OVERLAP_OVER_PENALTY: u32 = 20;
pub const OVERLAP_TRANSITION_PENALTY: u32 = 15;
pub const ANALOG_SOURCE_PENALTY: u32 = 10;
pub const WEB_SOURCE_PENALTY: u32 = 5;
pub const CREDITS_PENALTY: u32 = 10;

/// A (theme, entry, video) choice and its penalty.
#[derive(Debug, Clone, Copy)]
pub struct ScoredCandidate<'a> {
    pub theme: &'a Theme,
    pub entry: &'a ThemeEntry,
    pub video: &'a Video,
    pub score: u32,
}

/// Which candidates a policy excludes outright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CandidateFilter {
    pub ignore_op: bool,
    pub ignore_ed: bool,
    pub ignore_overlaps: bool,
    pub ignore_credits: bool,
}

impl From<&ThemePolicy> for CandidateFilter {
    fn from(policy: &ThemePolicy) -> Self {
        Self {
            ignore_op: policy.ignore_op,
            ignore_ed: policy.ignore_ed,
            ignore_overlaps: policy.ignore_overlaps,
            ignore_credits: policy.ignore_credits,
        }
    }
}

impl CandidateFilter {
    fn keeps_theme(&self, theme: &Theme) -> bool {
        match theme.theme_type {
            ThemeType::Op => !self.ignore_op,
            ThemeType::Ed => !self.ignore_ed,
            ThemeType::Other(_) => true,
        }
    }

    fn keeps_video(&self, video: &Video) -> bool {
        if self.ignore_overlaps && video.overlap != Overlap::None {
            return false;
        }
        if self.ignore_credits && !video.is_creditless() {
            return false;
        }
        true
    }
}

/// Penalty for one video of one entry.
pub fn rate(entry: &ThemeEntry, video: &Video) -> u32 {
    let mut score = 0;

    if entry.spoiler {
        score += SPOILER_PENALTY;
    }

    score += match video.overlap {
        Overlap::Over => OVERLAP_OVER_PENALTY,
        Overlap::Transition => OVERLAP_TRANSITION_PENALTY,
        Overlap::None | Overlap::Other(_) => 0,
    };

    score += match video.source {
        VideoSource::Ld | VideoSource::Vhs => ANALOG_SOURCE_PENALTY,
        VideoSource::Web | VideoSource::Raw => WEB_SOURCE_PENALTY,
        _ => 0,
    };

    if !video.is_creditless() {
        score += CREDITS_PENALTY;
    }

    score
}

/// Best eligible video per entry across all kept themes, sorted by score.
pub fn scored_candidates<'a>(
    themes: &'a [Theme],
    filter: CandidateFilter,
) -> Vec<ScoredCandidate<'a>> {
    let mut candidates: Vec<ScoredCandidate<'a>> = themes
        .iter()
        .filter(|theme| filter.keeps_theme(theme))
        .flat_map(|theme| {
            theme
                .entries
                .iter()
                .filter_map(move |entry| best_for_entry(theme, entry, filter))
        })
        .collect();

    // Stable: equal scores keep catalog order.
    candidates.sort_by_key(|c| c.score);
    candidates
}

fn best_for_entry<'a>(
    theme: &'a Theme,
    entry: &'a ThemeEntry,
    filter: CandidateFilter,
) -> Option<ScoredCandidate<'a>> {
    let mut ranked: Vec<(&Video, u32)> =
        entry.videos.iter().map(|v| (v, rate(entry, v))).collect();
    ranked.sort_by_key(|(_, score)| *score);

    ranked
        .into_iter()
        .find(|(video, _)| filter.keeps_video(video))
        .map(|(video, score)| ScoredCandidate {
            theme,
            entry,
            video,
            score,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn video(name: &str, overlap: Overlap, source: VideoSource, nc: bool) -> Video {
        Video {
            basename: format!("{name}.webm"),
            link: format!("https://v.animethemes.moe/{name}.webm"),
            resolution: Some(1080),
            creditless: nc,
            tags: vec![],
            overlap,
            source,
            audio_link: None,
        }
    }

    fn entry(version: u32, spoiler: bool, videos: Vec<Video>) -> ThemeEntry {
        ThemeEntry {
            version,
            spoiler,
            videos,
        }
    }

    fn theme(kind: &str, slug: &str, entries: Vec<ThemeEntry>) -> Theme {
        Theme {
            theme_type: ThemeType::from(kind),
            slug: slug.into(),
            entries,
        }
    }

    #[test]
    fn test_rate_sums_components() {
        let spoiler = entry(1, true, vec![]);
        let v = video("a", Overlap::Over, VideoSource::Web, true);
        assert_eq!(rate(&spoiler, &v), 50 + 20 + 5);

        let clean = entry(1, false, vec![]);
        let best = video("b", Overlap::None, VideoSource::Bd, true);
        assert_eq!(rate(&clean, &best), 0);

        let worst = video("c", Overlap::Over, VideoSource::Vhs, false);
        assert_eq!(rate(&spoiler, &worst), 50 + 20 + 10 + 10);

        let transition = video("d", Overlap::Transition, VideoSource::Raw, false);
        assert_eq!(rate(&clean, &transition), 15 + 5 + 10);
    }

    #[test]
    fn test_rate_counts_creditless_tags() {
        let e = entry(1, false, vec![]);
        let mut v = video("a", Overlap::None, VideoSource::Bd, false);
        assert_eq!(rate(&e, &v), CREDITS_PENALTY);
        v.tags = vec!["NCBD1080".into()];
        assert_eq!(rate(&e, &v), 0);
    }

    #[test]
    fn test_one_candidate_per_entry_sorted() {
        let themes = vec![
            theme(
                "OP",
                "OP1",
                vec![
                    entry(
                        1,
                        false,
                        vec![
                            video("op1-credits", Overlap::None, VideoSource::Bd, false),
                            video("op1-nc", Overlap::None, VideoSource::Bd, true),
                        ],
                    ),
                    entry(
                        2,
                        true,
                        vec![video("op1v2", Overlap::None, VideoSource::Bd, true)],
                    ),
                ],
            ),
            theme(
                "ED",
                "ED1",
                vec![entry(
                    1,
                    false,
                    vec![video("ed1", Overlap::Over, VideoSource::Web, true)],
                )],
            ),
        ];

        let candidates = scored_candidates(&themes, CandidateFilter::default());
        let names: Vec<&str> = candidates.iter().map(|c| c.video.basename.as_str()).collect();
        assert_eq!(names, vec!["op1-nc.webm", "ed1.webm", "op1v2.webm"]);

        let scores: Vec<u32> = candidates.iter().map(|c| c.score).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(scores, vec![0, 25, 50]);
    }

    #[test]
    fn test_type_filters() {
        let themes = vec![
            theme(
                "OP",
                "OP1",
                vec![entry(1, false, vec![video("op", Overlap::None, VideoSource::Bd, true)])],
            ),
            theme(
                "ED",
                "ED1",
                vec![entry(1, false, vec![video("ed", Overlap::None, VideoSource::Bd, true)])],
            ),
        ];

        let no_ed = scored_candidates(
            &themes,
            CandidateFilter {
                ignore_ed: true,
                ..Default::default()
            },
        );
        assert_eq!(no_ed.len(), 1);
        assert_eq!(no_ed[0].theme.slug, "OP1");

        let none = scored_candidates(
            &themes,
            CandidateFilter {
                ignore_op: true,
                ignore_ed: true,
                ..Default::default()
            },
        );
        assert!(none.is_empty());
    }

    #[test]
    fn test_overlap_filter_falls_through_to_next_ranked() {
        // Ranked first (0 + over 20 = 20) loses to the filter; the worse but
        // clean video (credits 10 + LD 10 = 20, listed second) is taken.
        let themes = vec![theme(
            "OP",
            "OP1",
            vec![entry(
                1,
                false,
                vec![
                    video("over", Overlap::Over, VideoSource::Bd, true),
                    video("clean", Overlap::None, VideoSource::Ld, false),
                ],
            )],
        )];

        let filtered = scored_candidates(
            &themes,
            CandidateFilter { ignore_overlaps: true, ..Default::default() },
        );
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].video.basename, "clean.webm");
        assert_eq!(filtered[0].score, 20);
    }

    #[test]
    fn test_credits_filter_can_empty_an_entry() {
        let themes = vec![theme(
            "ED",
            "ED2",
            vec![entry(1, false, vec![video("credits", Overlap::None, VideoSource::Bd, false)])],
        )];
        let filtered = scored_candidates(
            &themes,
            CandidateFilter { ignore_credits: true, ..Default::default() },
        );
        assert!(filtered.is_empty());
    }

    #[test]
    fn test_filter_from_policy() {
        let policy = ThemePolicy {
            max_themes: 1,
            volume: 100,
            ignore_op: false,
            ignore_ed: true,
            ignore_overlaps: true,
            ignore_credits: false,
        };
        let filter = CandidateFilter::from(&policy);
        assert!(filter.ignore_ed && filter.ignore_overlaps);
        assert!(!filter.ignore_op && !filter.ignore_credits);
    }
}
