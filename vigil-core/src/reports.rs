//! On-demand reports derived from the inventory snapshot.

use std::collections::BTreeMap;

use chrono::Utc;
use vigil_model::{
    CodecBreakdown, FileStat, LibrarySizeReport, MediaItem, MismatchEntry, MismatchReport, Report,
    ReportKind, ReportSource, ResolutionTier, Verdict,
};

use crate::duplicates::find_duplicates;

const TOP_N: usize = 50;

fn matches_source(item: &MediaItem, source: ReportSource) -> bool {
    match source {
        ReportSource::All => true,
        ReportSource::Movies => item.kind.is_movie(),
        ReportSource::Tv => !item.kind.is_movie(),
    }
}

/// Build one report from an inventory snapshot.
pub fn build_report(kind: ReportKind, source: ReportSource, snapshot: &[MediaItem]) -> Report {
    let items: Vec<&MediaItem> = snapshot
        .iter()
        .filter(|item| matches_source(item, source))
        .collect();
    match kind {
        ReportKind::Mismatches => Report::Mismatches(mismatch_report(&items)),
        ReportKind::Duplicates => {
            let owned: Vec<MediaItem> = items.into_iter().cloned().collect();
            Report::Duplicates {
                groups: find_duplicates(&owned),
            }
        }
        ReportKind::CodecBreakdown => Report::CodecBreakdown(codec_breakdown(&items)),
        ReportKind::LibrarySize => Report::LibrarySize(library_size(&items)),
    }
}

fn mismatch_report(items: &[&MediaItem]) -> MismatchReport {
    let entries = items
        .iter()
        .filter_map(|item| match &item.last_verdict {
            Some(Verdict::PathMismatch { expected, found }) => Some(MismatchEntry {
                key: item.key.clone(),
                title: item.title.clone(),
                expected: expected.clone(),
                found: found.clone(),
                path: item.path.clone(),
            }),
            _ => None,
        })
        .collect();
    MismatchReport {
        generated_at: Utc::now(),
        entries,
    }
}

fn codec_breakdown(items: &[&MediaItem]) -> CodecBreakdown {
    let mut by_codec: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_tier: BTreeMap<String, usize> = BTreeMap::new();
    let mut unprobed = 0;
    for item in items {
        match &item.media_info {
            Some(info) => {
                let codec = info.video_codec.clone().unwrap_or_else(|| "unknown".to_string());
                *by_codec.entry(codec).or_default() += 1;
                if let (Some(w), Some(h)) = (info.width, info.height) {
                    let tier = ResolutionTier::from_dimensions(w, h);
                    *by_tier.entry(tier.label().to_string()).or_default() += 1;
                }
            }
            None => unprobed += 1,
        }
    }
    CodecBreakdown {
        generated_at: Utc::now(),
        by_codec,
        by_tier,
        unprobed,
    }
}

fn library_size(items: &[&MediaItem]) -> LibrarySizeReport {
    let mut sized: Vec<&MediaItem> = items
        .iter()
        .copied()
        .filter(|item| item.size_bytes.is_some() && !item.missing)
        .collect();
    sized.sort_by_key(|item| std::cmp::Reverse(item.size_bytes.unwrap_or(0)));

    let stat = |item: &MediaItem| FileStat {
        key: item.key.clone(),
        title: item.title.clone(),
        path: item.path.clone(),
        size_bytes: item.size_bytes.unwrap_or(0),
        quality: item.quality.clone(),
    };

    let largest: Vec<FileStat> = sized.iter().take(TOP_N).map(|i| stat(i)).collect();
    let smallest: Vec<FileStat> = sized.iter().rev().take(TOP_N).map(|i| stat(i)).collect();

    let mut by_quality: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_instance: BTreeMap<String, usize> = BTreeMap::new();
    for item in &sized {
        let quality = item.quality.clone().unwrap_or_else(|| "Unknown".to_string());
        *by_quality.entry(quality).or_default() += 1;
        *by_instance
            .entry(item.key.instance.as_str().to_string())
            .or_default() += 1;
    }

    LibrarySizeReport {
        generated_at: Utc::now(),
        total_files: sized.len(),
        total_bytes: sized.iter().filter_map(|i| i.size_bytes).sum(),
        largest,
        smallest,
        by_quality,
        by_instance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use vigil_model::{ItemKey, MediaKind};

    fn item(id: i64, title: &str, size: u64, verdict: Option<Verdict>) -> MediaItem {
        MediaItem {
            key: ItemKey::new("radarr-main", id),
            kind: MediaKind::Movie,
            title: title.to_string(),
            path: Some(PathBuf::from(format!("/movies/{title}.mkv"))),
            file_id: Some(id),
            size_bytes: Some(size),
            quality: Some("Bluray-1080p".to_string()),
            runtime_minutes: None,
            media_info: None,
            last_verdict: verdict,
            verdict_at: None,
            scanned_generation: 1,
            missing: false,
        }
    }

    #[test]
    fn mismatch_report_collects_only_path_mismatches() {
        let snapshot = vec![
            item(1, "Avatar", 100, Some(Verdict::Healthy)),
            item(
                2,
                "Dune",
                200,
                Some(Verdict::PathMismatch {
                    expected: "Dune".to_string(),
                    found: "Teletubbies".to_string(),
                }),
            ),
            item(3, "Heat", 300, Some(Verdict::Corrupt)),
        ];
        let report = build_report(ReportKind::Mismatches, ReportSource::All, &snapshot);
        let Report::Mismatches(report) = report else {
            panic!("wrong report kind");
        };
        assert_eq!(report.entries.len(), 1);
        assert_eq!(report.entries[0].found, "Teletubbies");
    }

    #[test]
    fn library_size_orders_largest_first() {
        let snapshot = vec![
            item(1, "Small", 100, None),
            item(2, "Big", 10_000, None),
            item(3, "Mid", 5_000, None),
        ];
        let Report::LibrarySize(report) =
            build_report(ReportKind::LibrarySize, ReportSource::All, &snapshot)
        else {
            panic!("wrong report kind");
        };
        assert_eq!(report.total_files, 3);
        assert_eq!(report.total_bytes, 15_100);
        assert_eq!(report.largest[0].title, "Big");
        assert_eq!(report.smallest[0].title, "Small");
        assert_eq!(report.by_quality.get("Bluray-1080p"), Some(&3));
    }
}
