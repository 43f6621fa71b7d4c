//! File ranking and the retention gate.

use super::policy::{ConfigError, CountRule, FilterOperator, QualityCriterion, QualityPolicy, SetRule};
use super::resolution::Resolution;
use crate::library::{FileMediaInfo, VideoFile};
use std::cmp::Ordering;
use std::sync::{Arc, RwLock};
use tracing::info;

/// Decides which files are kept and which of several files for the same
/// episode is the best one.
///
/// The active policy is swapped atomically by [`QualityFilter::replace_policy`];
/// callers in flight keep using the snapshot they started with.
pub struct QualityFilter {
    policy: RwLock<Arc<QualityPolicy>>,
}

impl Default for QualityFilter {
    fn default() -> Self {
        Self::new(QualityPolicy::default())
    }
}

impl QualityFilter {
    pub fn new(policy: QualityPolicy) -> Self {
        Self {
            policy: RwLock::new(Arc::new(policy.normalized())),
        }
    }

    /// Validated constructor for policies coming from configuration.
    pub fn from_policy(policy: QualityPolicy) -> Result<Self, ConfigError> {
        policy.validate()?;
        Ok(Self::new(policy))
    }

    pub fn policy(&self) -> Arc<QualityPolicy> {
        match self.policy.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Replaces the active policy. An invalid policy is rejected and the
    /// previous one stays active.
    pub fn replace_policy(&self, policy: QualityPolicy) -> Result<(), ConfigError> {
        policy.validate()?;
        let policy = Arc::new(policy.normalized());
        match self.policy.write() {
            Ok(mut guard) => *guard = policy,
            Err(poisoned) => *poisoned.into_inner() = policy,
        }
        info!("Quality policy replaced");
        Ok(())
    }

    /// Retention gate. Unidentified files are never kept.
    pub fn should_keep(&self, file: &VideoFile) -> bool {
        let policy = self.policy();
        if !policy.enabled {
            return true;
        }
        let Some(media) = &file.media else {
            return false;
        };
        policy
            .required
            .iter()
            .all(|criterion| check_requirement(&policy, *criterion, media))
    }

    /// Ranks two files. `Ordering::Less` means `a` is the better file.
    pub fn compare(&self, a: &VideoFile, b: &VideoFile) -> Ordering {
        let policy = self.policy();
        if !policy.enabled {
            return Ordering::Equal;
        }
        let (a_media, b_media) = match (&a.media, &b.media) {
            (Some(a), Some(b)) => (a, b),
            (None, Some(_)) => return Ordering::Greater,
            (Some(_), None) => return Ordering::Less,
            (None, None) => return Ordering::Equal,
        };

        for criterion in &policy.comparison_order {
            let result = compare_by(&policy, *criterion, a_media, b_media);
            if result != Ordering::Equal {
                return result;
            }
        }
        Ordering::Equal
    }

    /// Index of the best file, earliest wins ties.
    pub fn best_of(&self, files: &[VideoFile]) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (i, file) in files.iter().enumerate() {
            match best {
                None => best = Some(i),
                Some(current) => {
                    if self.compare(file, &files[current]) == Ordering::Less {
                        best = Some(i);
                    }
                }
            }
        }
        best
    }
}

fn check_requirement(policy: &QualityPolicy, criterion: QualityCriterion, media: &FileMediaInfo) -> bool {
    match criterion {
        QualityCriterion::Source => {
            if media.source.is_empty() {
                return false;
            }
            check_set(&policy.source_rule, std::slice::from_ref(&media.source))
        }
        QualityCriterion::Resolution => match media.resolution {
            Some(resolution) => check_resolution(policy, resolution),
            None => false,
        },
        QualityCriterion::VideoCodec => {
            !media.video_codecs.is_empty() && check_set(&policy.video_codec_rule, &media.video_codecs)
        }
        QualityCriterion::AudioCodec => {
            !media.audio_codecs.is_empty() && check_set(&policy.audio_codec_rule, &media.audio_codecs)
        }
        QualityCriterion::AudioStreamCount => {
            check_count(&policy.audio_stream_count_rule, media.audio_stream_count())
        }
        QualityCriterion::SubStreamCount => {
            check_count(&policy.sub_stream_count_rule, media.subtitle_stream_count)
        }
        QualityCriterion::SubGroup => {
            let names: Vec<String> = media
                .release_group
                .iter()
                .flat_map(|g| [g.name.clone(), g.short_name.clone()])
                .filter(|n| !n.is_empty())
                .collect();
            check_set(&policy.release_group_rule, &names)
        }
        QualityCriterion::Version => !media.is_deprecated,
        QualityCriterion::Chapter => media.is_chaptered,
    }
}

/// `in` passes when any value is listed, `not_in` when none is.
fn check_set(rule: &SetRule, values: &[String]) -> bool {
    let listed = values.iter().any(|v| rule.contains(v));
    match rule.operator {
        FilterOperator::In => listed,
        FilterOperator::NotIn => !listed,
        _ => true,
    }
}

fn check_count(rule: &CountRule, count: u32) -> bool {
    match rule.operator {
        FilterOperator::Equals => count == rule.count,
        FilterOperator::AtLeast => count >= rule.count,
        FilterOperator::AtMost => count <= rule.count,
        _ => true,
    }
}

fn check_resolution(policy: &QualityPolicy, resolution: Resolution) -> bool {
    let rule = &policy.resolution_rule;
    let label = resolution.label();
    match rule.operator {
        FilterOperator::In => rule.values.iter().any(|v| v == label),
        FilterOperator::NotIn => !rule.values.iter().any(|v| v == label),
        operator => {
            // Both sides are snapped to their named resolution first
            let Some(reference) = rule.values.first().and_then(|v| Resolution::from_label(v))
            else {
                return true;
            };
            let area = Resolution::from_label(label)
                .map(|r| r.area())
                .unwrap_or_else(|| resolution.area());
            match operator {
                FilterOperator::Equals => area == reference.area(),
                FilterOperator::AtLeast => area >= reference.area(),
                FilterOperator::AtMost => area <= reference.area(),
                _ => true,
            }
        }
    }
}

fn rank(preferred: &[String], value: &str) -> Option<usize> {
    preferred.iter().position(|p| p == value)
}

fn compare_by(
    policy: &QualityPolicy,
    criterion: QualityCriterion,
    a: &FileMediaInfo,
    b: &FileMediaInfo,
) -> Ordering {
    match criterion {
        QualityCriterion::Source => {
            match (
                rank(&policy.preferred_sources, &a.source),
                rank(&policy.preferred_sources, &b.source),
            ) {
                (Some(a_rank), Some(b_rank)) => a_rank.cmp(&b_rank),
                _ => Ordering::Equal,
            }
        }
        QualityCriterion::Resolution => match (a.resolution, b.resolution) {
            (Some(a_res), Some(b_res)) => b_res.area().cmp(&a_res.area()),
            _ => Ordering::Equal,
        },
        QualityCriterion::VideoCodec => compare_codecs(
            &policy.preferred_video_codecs,
            &a.video_codecs,
            &b.video_codecs,
            Some((a.video_bit_depth, b.video_bit_depth, policy.prefer_8bit_video)),
        ),
        QualityCriterion::AudioCodec => compare_codecs(
            &policy.preferred_audio_codecs,
            &a.audio_codecs,
            &b.audio_codecs,
            None,
        ),
        QualityCriterion::AudioStreamCount => b.audio_stream_count().cmp(&a.audio_stream_count()),
        QualityCriterion::SubStreamCount => b.subtitle_stream_count.cmp(&a.subtitle_stream_count),
        QualityCriterion::SubGroup => {
            let group_rank = |m: &FileMediaInfo| {
                m.release_group_name()
                    .and_then(|name| rank(&policy.preferred_release_groups, &name.to_lowercase()))
            };
            match (group_rank(a), group_rank(b)) {
                (Some(a_rank), Some(b_rank)) => a_rank.cmp(&b_rank),
                _ => Ordering::Equal,
            }
        }
        QualityCriterion::Version => {
            if a.release_group_name() != b.release_group_name()
                || a.resolution != b.resolution
                || a.video_bit_depth != b.video_bit_depth
            {
                return Ordering::Equal;
            }
            b.version.cmp(&a.version)
        }
        QualityCriterion::Chapter => b.is_chaptered.cmp(&a.is_chaptered),
    }
}

/// Compares codec lists stream by stream. Lists of different length are not
/// compared at all, and streams with an unranked codec on either side are
/// skipped. For video, a rank tie between 8 and 10 bit streams is settled by
/// the bit depth preference.
fn compare_codecs(
    preferred: &[String],
    a: &[String],
    b: &[String],
    bit_depth: Option<(Option<u8>, Option<u8>, bool)>,
) -> Ordering {
    if a.len() != b.len() {
        return Ordering::Equal;
    }
    for (a_codec, b_codec) in a.iter().zip(b.iter()) {
        let (Some(a_rank), Some(b_rank)) = (rank(preferred, a_codec), rank(preferred, b_codec))
        else {
            continue;
        };
        let result = a_rank.cmp(&b_rank);
        if result != Ordering::Equal {
            return result;
        }
        if let Some((Some(a_depth), Some(b_depth), prefer_8bit)) = bit_depth {
            match (a_depth, b_depth) {
                (8, 10) => {
                    return if prefer_8bit {
                        Ordering::Less
                    } else {
                        Ordering::Greater
                    }
                }
                (10, 8) => {
                    return if prefer_8bit {
                        Ordering::Greater
                    } else {
                        Ordering::Less
                    }
                }
                _ => {}
            }
        }
    }
    Ordering::Equal
}
