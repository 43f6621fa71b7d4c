//! Quality policy configuration.
//!
//! A policy is replaced as a whole through [`super::QualityFilter::replace_policy`],
//! which runs [`QualityPolicy::validate`] first.

use super::resolution::Resolution;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

/// A single quality dimension files can be compared or filtered on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityCriterion {
    Source,
    Resolution,
    VideoCodec,
    AudioCodec,
    AudioStreamCount,
    SubStreamCount,
    SubGroup,
    Version,
    Chapter,
}

impl QualityCriterion {
    pub const ALL: [QualityCriterion; 9] = [
        QualityCriterion::Source,
        QualityCriterion::Resolution,
        QualityCriterion::VideoCodec,
        QualityCriterion::AudioCodec,
        QualityCriterion::AudioStreamCount,
        QualityCriterion::SubStreamCount,
        QualityCriterion::SubGroup,
        QualityCriterion::Version,
        QualityCriterion::Chapter,
    ];

    fn accepts_operator(&self, operator: FilterOperator) -> bool {
        match self {
            QualityCriterion::Source
            | QualityCriterion::VideoCodec
            | QualityCriterion::AudioCodec
            | QualityCriterion::SubGroup => operator.is_set_operator(),
            QualityCriterion::AudioStreamCount | QualityCriterion::SubStreamCount => {
                !operator.is_set_operator()
            }
            QualityCriterion::Resolution => true,
            // Boolean gates, the operator is ignored
            QualityCriterion::Version | QualityCriterion::Chapter => true,
        }
    }
}

/// How a file's value is checked against a rule's accepted values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    AtMost,
    AtLeast,
    In,
    NotIn,
}

impl FilterOperator {
    pub fn is_set_operator(&self) -> bool {
        matches!(self, FilterOperator::In | FilterOperator::NotIn)
    }
}

/// Rule over a set of lower-cased names (sources, codecs, groups).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetRule {
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

impl SetRule {
    pub fn new(operator: FilterOperator, values: &[&str]) -> Self {
        Self {
            operator,
            values: values.iter().map(|v| v.to_lowercase()).collect(),
        }
    }

    pub(super) fn contains(&self, value: &str) -> bool {
        let value = value.to_lowercase();
        self.values.iter().any(|v| *v == value)
    }
}

/// Rule over a stream count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountRule {
    pub operator: FilterOperator,
    pub count: u32,
}

/// Rule over named resolutions (`1080p`, `720p`, ...).
///
/// `equals`, `at_most` and `at_least` use the first value as the reference
/// resolution and compare pixel areas.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolutionRule {
    pub operator: FilterOperator,
    pub values: Vec<String>,
}

/// Errors raised when a configuration is rejected.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("criterion {0:?} appears more than once in the comparison order")]
    DuplicateCriterion(QualityCriterion),
    #[error("criterion {0:?} appears more than once in the required list")]
    DuplicateRequirement(QualityCriterion),
    #[error("operator {operator:?} is not valid for criterion {criterion:?}")]
    InvalidOperator {
        criterion: QualityCriterion,
        operator: FilterOperator,
    },
    #[error("required criterion {0:?} has an empty value set")]
    EmptyValueSet(QualityCriterion),
    #[error("unknown resolution name '{0}'")]
    UnknownResolution(String),
    #[error("invalid rate limit for {limiter}: {reason}")]
    InvalidRateLimit {
        limiter: &'static str,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QualityPolicy {
    /// When false, every file is kept and no file supersedes another.
    pub enabled: bool,
    /// Criteria consulted by `compare`, most significant first.
    pub comparison_order: Vec<QualityCriterion>,
    /// Criteria a file must satisfy to be kept at all.
    pub required: Vec<QualityCriterion>,

    pub preferred_sources: Vec<String>,
    pub preferred_video_codecs: Vec<String>,
    pub preferred_audio_codecs: Vec<String>,
    pub preferred_release_groups: Vec<String>,
    pub prefer_8bit_video: bool,

    pub source_rule: SetRule,
    pub resolution_rule: ResolutionRule,
    pub video_codec_rule: SetRule,
    pub audio_codec_rule: SetRule,
    pub release_group_rule: SetRule,
    pub audio_stream_count_rule: CountRule,
    pub sub_stream_count_rule: CountRule,
}

impl Default for QualityPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            comparison_order: vec![
                QualityCriterion::Source,
                QualityCriterion::Resolution,
                QualityCriterion::AudioCodec,
                QualityCriterion::AudioStreamCount,
                QualityCriterion::VideoCodec,
                QualityCriterion::SubStreamCount,
                QualityCriterion::SubGroup,
                QualityCriterion::Chapter,
                QualityCriterion::Version,
            ],
            required: vec![QualityCriterion::Source],
            preferred_sources: lowercase(&["bd", "dvd", "hdtv", "tv", "www"]),
            preferred_video_codecs: lowercase(&["hevc", "h264/avc", "vc-1", "mpeg-4 asp", "mpeg-2"]),
            preferred_audio_codecs: lowercase(&["flac", "opus", "aac", "ac3", "dts", "vorbis", "mp3"]),
            preferred_release_groups: Vec::new(),
            prefer_8bit_video: false,
            source_rule: SetRule::new(FilterOperator::In, &["bd", "dvd", "hdtv", "tv", "www"]),
            resolution_rule: ResolutionRule {
                operator: FilterOperator::AtLeast,
                values: vec!["480p".to_string()],
            },
            video_codec_rule: SetRule::new(FilterOperator::NotIn, &["real", "wmv9 (also wmv3)"]),
            audio_codec_rule: SetRule::new(FilterOperator::NotIn, &["real audio"]),
            release_group_rule: SetRule::new(FilterOperator::NotIn, &[]),
            audio_stream_count_rule: CountRule {
                operator: FilterOperator::AtLeast,
                count: 1,
            },
            sub_stream_count_rule: CountRule {
                operator: FilterOperator::AtLeast,
                count: 1,
            },
        }
    }
}

fn lowercase(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_lowercase()).collect()
}

impl QualityPolicy {
    /// Checks the policy for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for criterion in &self.comparison_order {
            if !seen.insert(*criterion) {
                return Err(ConfigError::DuplicateCriterion(*criterion));
            }
        }

        let mut seen = HashSet::new();
        for criterion in &self.required {
            if !seen.insert(*criterion) {
                return Err(ConfigError::DuplicateRequirement(*criterion));
            }
        }

        for criterion in QualityCriterion::ALL {
            let operator = match criterion {
                QualityCriterion::Source => self.source_rule.operator,
                QualityCriterion::Resolution => self.resolution_rule.operator,
                QualityCriterion::VideoCodec => self.video_codec_rule.operator,
                QualityCriterion::AudioCodec => self.audio_codec_rule.operator,
                QualityCriterion::SubGroup => self.release_group_rule.operator,
                QualityCriterion::AudioStreamCount => self.audio_stream_count_rule.operator,
                QualityCriterion::SubStreamCount => self.sub_stream_count_rule.operator,
                QualityCriterion::Version | QualityCriterion::Chapter => continue,
            };
            if !criterion.accepts_operator(operator) {
                return Err(ConfigError::InvalidOperator {
                    criterion,
                    operator,
                });
            }
        }

        for value in &self.resolution_rule.values {
            if Resolution::from_label(value).is_none() {
                return Err(ConfigError::UnknownResolution(value.clone()));
            }
        }

        for criterion in &self.required {
            let empty = match criterion {
                QualityCriterion::Source => {
                    self.source_rule.operator == FilterOperator::In
                        && self.source_rule.values.is_empty()
                }
                QualityCriterion::VideoCodec => {
                    self.video_codec_rule.operator == FilterOperator::In
                        && self.video_codec_rule.values.is_empty()
                }
                QualityCriterion::AudioCodec => {
                    self.audio_codec_rule.operator == FilterOperator::In
                        && self.audio_codec_rule.values.is_empty()
                }
                QualityCriterion::SubGroup => {
                    self.release_group_rule.operator == FilterOperator::In
                        && self.release_group_rule.values.is_empty()
                }
                QualityCriterion::Resolution => self.resolution_rule.values.is_empty(),
                _ => false,
            };
            if empty {
                return Err(ConfigError::EmptyValueSet(*criterion));
            }
        }

        Ok(())
    }

    /// Returns a copy with every name lower-cased, so lookups can compare
    /// lower-cased file metadata directly.
    pub(super) fn normalized(mut self) -> Self {
        for list in [
            &mut self.preferred_sources,
            &mut self.preferred_video_codecs,
            &mut self.preferred_audio_codecs,
            &mut self.preferred_release_groups,
            &mut self.source_rule.values,
            &mut self.video_codec_rule.values,
            &mut self.audio_codec_rule.values,
            &mut self.release_group_rule.values,
            &mut self.resolution_rule.values,
        ] {
            for value in list.iter_mut() {
                *value = value.trim().to_lowercase();
            }
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        QualityPolicy::default().validate().unwrap();
    }

    #[test]
    fn test_duplicate_criterion_rejected() {
        let policy = QualityPolicy {
            comparison_order: vec![
                QualityCriterion::Resolution,
                QualityCriterion::Source,
                QualityCriterion::Resolution,
            ],
            ..Default::default()
        };
        assert_eq!(
            policy.validate(),
            Err(ConfigError::DuplicateCriterion(QualityCriterion::Resolution))
        );
    }

    #[test]
    fn test_subset_order_is_valid() {
        let policy = QualityPolicy {
            comparison_order: vec![QualityCriterion::Resolution, QualityCriterion::Source],
            ..Default::default()
        };
        policy.validate().unwrap();
    }

    #[test]
    fn test_count_operator_on_set_criterion_rejected() {
        let mut policy = QualityPolicy::default();
        policy.source_rule.operator = FilterOperator::AtLeast;
        assert_eq!(
            policy.validate(),
            Err(ConfigError::InvalidOperator {
                criterion: QualityCriterion::Source,
                operator: FilterOperator::AtLeast,
            })
        );
    }

    #[test]
    fn test_set_operator_on_count_criterion_rejected() {
        let mut policy = QualityPolicy::default();
        policy.sub_stream_count_rule.operator = FilterOperator::In;
        assert!(matches!(
            policy.validate(),
            Err(ConfigError::InvalidOperator {
                criterion: QualityCriterion::SubStreamCount,
                ..
            })
        ));
    }

    #[test]
    fn test_empty_required_source_set_rejected() {
        let mut policy = QualityPolicy::default();
        policy.source_rule.values.clear();
        assert_eq!(
            policy.validate(),
            Err(ConfigError::EmptyValueSet(QualityCriterion::Source))
        );
    }

    #[test]
    fn test_unknown_resolution_rejected() {
        let mut policy = QualityPolicy::default();
        policy.resolution_rule.values = vec!["1081p".to_string()];
        assert_eq!(
            policy.validate(),
            Err(ConfigError::UnknownResolution("1081p".to_string()))
        );
    }

    #[test]
    fn test_policy_from_toml() {
        let policy: QualityPolicy = toml::from_str(
            r#"
            comparison_order = ["resolution", "source"]
            required = ["source", "version"]
            preferred_sources = ["BD", "DVD"]

            [source_rule]
            operator = "not_in"
            values = ["unknown"]
            "#,
        )
        .unwrap();

        assert_eq!(
            policy.comparison_order,
            vec![QualityCriterion::Resolution, QualityCriterion::Source]
        );
        assert_eq!(policy.source_rule.operator, FilterOperator::NotIn);
        assert!(policy.prefer_8bit_video == QualityPolicy::default().prefer_8bit_video);
        policy.validate().unwrap();

        let normalized = policy.normalized();
        assert_eq!(normalized.preferred_sources, vec!["bd", "dvd"]);
    }
}
