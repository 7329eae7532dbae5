//! Duplicate detection across the inventory.
//!
//! Groups items by logical identity and ranks each group by a quality key
//! built from the last probe: pixel count first, then codec-adjusted
//! bitrate, then file size as the tie-breaker for never-probed files.
//! Runs over a full inventory snapshot on demand or after a generation
//! completes, never inline with per-file scanning.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;
use vigil_model::{DuplicateGroup, DuplicateMember, MediaItem, MediaKind};

use crate::classify::codec_efficiency;

/// "Avatar (2009)" and "Avatar" are the same movie; "Blade Runner 2049" is
/// not "Blade Runner", so only parenthesized years are stripped.
static PAREN_YEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\(\d{4}\)").expect("static year pattern compiles"));

/// Logical identity a duplicate group shares. Movies collapse to a title
/// slug; episodes to series slug + season/episode number.
fn identity(item: &MediaItem) -> Option<String> {
    if item.missing {
        return None;
    }
    match &item.kind {
        MediaKind::Movie => {
            let slug = slug(&item.title);
            (!slug.is_empty()).then_some(slug)
        }
        MediaKind::Episode {
            series,
            season,
            episode,
        } => {
            let slug = slug(series);
            (!slug.is_empty()).then(|| format!("{slug}/s{season:02}e{episode:02}"))
        }
    }
}

fn slug(title: &str) -> String {
    let title = PAREN_YEAR.replace_all(title, "");
    let mut out = String::with_capacity(title.len());
    let mut last_dash = true;
    for c in title.chars() {
        if c.is_alphanumeric() {
            out.push(c.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            out.push('-');
            last_dash = true;
        }
    }
    out.trim_end_matches('-').to_string()
}

/// Ordering key, higher is better.
fn quality_rank(item: &MediaItem) -> (u64, u64, u64) {
    let info = item.media_info.as_ref();
    let pixels = info.and_then(|i| i.pixels()).unwrap_or(0);
    let adjusted_kbps = info
        .and_then(|i| i.bitrate_kbps)
        .map(|kbps| {
            let efficiency = codec_efficiency(info.and_then(|i| i.video_codec.as_deref()));
            (kbps as f64 / efficiency) as u64
        })
        .unwrap_or(0);
    (pixels, adjusted_kbps, item.size_bytes.unwrap_or(0))
}

/// Find every group of two or more copies of the same logical item,
/// best-first within each group, largest savings first across groups.
pub fn find_duplicates(items: &[MediaItem]) -> Vec<DuplicateGroup> {
    let mut by_identity: BTreeMap<String, Vec<&MediaItem>> = BTreeMap::new();
    for item in items {
        if let Some(identity) = identity(item) {
            by_identity.entry(identity).or_default().push(item);
        }
    }

    let mut groups: Vec<DuplicateGroup> = by_identity
        .into_iter()
        .filter(|(_, members)| members.len() >= 2)
        .map(|(identity, mut members)| {
            members.sort_by(|a, b| quality_rank(b).cmp(&quality_rank(a)));
            let savings_bytes = members
                .iter()
                .skip(1)
                .filter_map(|m| m.size_bytes)
                .sum();
            let members = members
                .into_iter()
                .enumerate()
                .map(|(i, item)| DuplicateMember {
                    key: item.key.clone(),
                    title: item.title.clone(),
                    path: item.path.clone(),
                    size_bytes: item.size_bytes,
                    quality: item.quality.clone(),
                    pixels: item.media_info.as_ref().and_then(|info| info.pixels()),
                    keep: i == 0,
                })
                .collect();
            DuplicateGroup {
                identity,
                members,
                savings_bytes,
            }
        })
        .collect();

    groups.sort_by(|a, b| b.savings_bytes.cmp(&a.savings_bytes));
    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vigil_model::{ItemKey, MediaInfo};

    fn copy(instance: &str, id: i64, title: &str, size: u64, info: Option<MediaInfo>) -> MediaItem {
        MediaItem {
            key: ItemKey::new(instance, id),
            kind: MediaKind::Movie,
            title: title.to_string(),
            path: Some(PathBuf::from(format!("/movies/{title}/{id}.mkv"))),
            file_id: Some(id),
            size_bytes: Some(size),
            quality: None,
            runtime_minutes: None,
            media_info: info,
            last_verdict: None,
            verdict_at: None,
            scanned_generation: 0,
            missing: false,
        }
    }

    fn info(width: u32, height: u32, kbps: u64, codec: &str) -> MediaInfo {
        MediaInfo {
            duration_secs: Some(6_000.0),
            bitrate_kbps: Some(kbps),
            width: Some(width),
            height: Some(height),
            video_codec: Some(codec.to_string()),
            hdr: false,
        }
    }

    #[test]
    fn higher_resolution_wins_the_group() {
        let items = vec![
            copy("radarr-hd", 1, "Avatar (2009)", 8_000_000_000, Some(info(1920, 1080, 8_000, "h264"))),
            copy("radarr-4k", 2, "Avatar (2009)", 20_000_000_000, Some(info(3840, 2160, 12_000, "hevc"))),
        ];
        let groups = find_duplicates(&items);
        assert_eq!(groups.len(), 1);
        let group = &groups[0];
        assert_eq!(group.identity, "avatar");
        assert!(group.members[0].keep);
        assert_eq!(group.members[0].key, ItemKey::new("radarr-4k", 2));
        assert_eq!(group.savings_bytes, 8_000_000_000);
    }

    #[test]
    fn efficient_codec_outranks_equal_bitrate_at_same_resolution() {
        let items = vec![
            copy("a", 1, "Dune", 5_000_000_000, Some(info(1920, 1080, 5_000, "h264"))),
            copy("b", 2, "Dune", 4_000_000_000, Some(info(1920, 1080, 5_000, "hevc"))),
        ];
        let groups = find_duplicates(&items);
        assert_eq!(groups[0].members[0].key, ItemKey::new("b", 2));
    }

    #[test]
    fn year_variants_collapse_to_one_identity() {
        let items = vec![
            copy("a", 1, "Avatar (2009)", 1, None),
            copy("b", 2, "Avatar", 2, None),
        ];
        assert_eq!(find_duplicates(&items).len(), 1);
    }

    #[test]
    fn a_year_in_the_title_proper_is_not_stripped() {
        let items = vec![
            copy("a", 1, "Blade Runner", 1, None),
            copy("b", 2, "Blade Runner 2049", 2, None),
        ];
        assert!(find_duplicates(&items).is_empty());
    }

    #[test]
    fn missing_items_and_singletons_are_not_duplicates() {
        let mut gone = copy("a", 1, "Avatar", 1, None);
        gone.missing = true;
        let items = vec![gone, copy("b", 2, "Avatar", 2, None), copy("c", 3, "Dune", 3, None)];
        assert!(find_duplicates(&items).is_empty());
    }
}
