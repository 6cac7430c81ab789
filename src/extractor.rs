//! Feature extraction: trial samples → behavioral metrics + interpretation
//!
//! Converts one trial's ordered frame samples into a persisted Seed. The
//! extraction is a pure function of its input series; running it twice on the
//! same samples yields identical metrics and interpretation.
//!
//! Statistics follow the calibration source: variances and standard
//! deviations use the sample (n-1) denominator, and the nose series is
//! smoothed with a trailing moving average whose warm-up region is
//! back-filled with the first complete window value.

use crate::error::{DataError, PipelineError};
use crate::store::SeedStore;
use crate::types::{
    BehaviorMetrics, DominantEmotion, GazeLabel, GazeMetrics, GestureLabel, GestureMetrics,
    PoseSample, PostureLabel, PostureMetrics, Sample, Seed, SeedMeta, TrialRecording,
};
use chrono::Utc;
use std::collections::BTreeMap;

/// Emotion classes read as positive signals
const POSITIVE_EMOTIONS: &[&str] = &["Happiness", "Surprise"];

/// Emotion classes read as negative signals
const NEGATIVE_EMOTIONS: &[&str] = &["Anger", "Disgust", "Contempt"];

/// The neutral class excluded from dominant-emotion selection
const NEUTRAL_EMOTION: &str = "Neutral";

/// Fallback interpretation when no behavioral condition fires
const NEUTRAL_INTERPRETATION: &str =
    "User showed neutral behavior with no significant signals.";

/// Classification thresholds, hoisted out of the classifiers so they are
/// tunable without touching the code. The defaults are the calibrated values;
/// do not alter them without new calibration data.
#[derive(Debug, Clone)]
pub struct ExtractorThresholds {
    /// Minimum number of samples for any extraction
    pub min_samples: usize,
    /// Fraction of frames that must carry pose data before pose signals are
    /// classified (strictly greater-than)
    pub pose_coverage_min: f64,
    /// Minimum mean landmark visibility for a pose signal to be trusted
    pub visibility_min: f64,
    /// Trailing moving-average window over the nose series
    pub smoothing_window: usize,
    /// Both smoothed variances below this → "Static"
    pub static_variance_max: f64,
    /// One axis must exceed the other by this factor to dominate
    pub axis_dominance_ratio: f64,
    /// Dominant-axis variance must also exceed this floor
    pub gesture_variance_min: f64,
    /// Absolute shoulder-depth drift that counts as a lean
    pub lean_depth_diff: f64,
    /// Combined nose dispersion below this → "Highly Focused"
    pub gaze_focused_max: f64,
    /// Combined nose dispersion above this → "Distracted/Searching"
    pub gaze_distracted_min: f64,
    /// Fraction of the trial treated as "early" for the posture comparison
    pub posture_early_frac: f64,
    /// Start fraction of the "late" region for the posture comparison
    pub posture_late_frac: f64,
}

impl Default for ExtractorThresholds {
    fn default() -> Self {
        Self {
            min_samples: 5,
            pose_coverage_min: 0.5,
            visibility_min: 0.5,
            smoothing_window: 5,
            static_variance_max: 0.05,
            axis_dominance_ratio: 1.5,
            gesture_variance_min: 0.1,
            lean_depth_diff: 0.05,
            gaze_focused_max: 2.0,
            gaze_distracted_min: 8.0,
            posture_early_frac: 0.3,
            posture_late_frac: 0.7,
        }
    }
}

/// Deterministic feature extractor for one trial's sample series
#[derive(Debug, Clone, Default)]
pub struct FeatureExtractor {
    thresholds: ExtractorThresholds,
}

impl FeatureExtractor {
    /// Extractor with the calibrated default thresholds
    pub fn new() -> Self {
        Self::default()
    }

    /// Extractor with custom thresholds
    pub fn with_thresholds(thresholds: ExtractorThresholds) -> Self {
        Self { thresholds }
    }

    /// Extract a Seed from one trial recording.
    ///
    /// Fails with a [`DataError`] (non-fatal to the overall run) when the
    /// sample sequence is shorter than the minimum, carries no emotion
    /// probabilities at all, or contains no pose frames whatsoever.
    pub fn extract(&self, recording: &TrialRecording) -> Result<Seed, DataError> {
        let th = &self.thresholds;
        let samples = &recording.samples;

        if samples.len() < th.min_samples {
            return Err(DataError::TooFewSamples {
                got: samples.len(),
                min: th.min_samples,
            });
        }
        if samples.iter().all(|s| s.emotions.is_empty()) {
            return Err(DataError::MissingEmotions);
        }

        let visible: Vec<&PoseSample> = samples.iter().filter_map(|s| s.pose.as_ref()).collect();
        if visible.is_empty() {
            return Err(DataError::NoPoseData);
        }

        // Pose signals are classified only when more than the coverage
        // fraction of frames carry landmarks; otherwise they fall back to
        // their "not detected" labels and the seed is still produced.
        let has_pose =
            visible.len() as f64 > samples.len() as f64 * th.pose_coverage_min;

        let gesture = if has_pose {
            classify_gesture(&visible, th)
        } else {
            GestureMetrics {
                label: GestureLabel::NotDetected,
                var_x: 0.0,
                var_y: 0.0,
            }
        };
        let posture = if has_pose {
            classify_posture(&visible, th)
        } else {
            PostureMetrics {
                label: PostureLabel::Unknown,
                z_diff: 0.0,
            }
        };
        let gaze = if has_pose {
            classify_gaze(&visible, th)
        } else {
            GazeMetrics {
                label: GazeLabel::Unknown,
            }
        };

        let emotion_full_stats = average_emotions(samples);
        let dominant_emotion = dominant_emotion(&emotion_full_stats);

        let duration_sec = samples.iter().map(|s| s.t).fold(0.0_f64, f64::max);
        let fps_mean = samples.iter().map(|s| s.fps).sum::<f64>() / samples.len() as f64;

        let metrics = BehaviorMetrics {
            duration_sec,
            fps_mean,
            dominant_emotion,
            emotion_full_stats,
            posture,
            gesture,
            gaze,
        };
        let rule_based_interpretation = build_interpretation(&metrics);

        Ok(Seed {
            meta: SeedMeta {
                session_id: recording.session_id.clone(),
                option_id: recording.stimulus.id.clone(),
                recorded_at: Utc::now(),
                user_context: recording.user_context.clone(),
                source: recording.source.clone(),
            },
            stimulus_content: recording.stimulus.clone(),
            behavior_metrics: metrics,
            rule_based_interpretation,
            label: None,
        })
    }

    /// Extract a Seed and persist it under `(session_id, option_id)`,
    /// overwriting any previous Seed for the same pair.
    pub fn extract_and_store(
        &self,
        recording: &TrialRecording,
        store: &mut SeedStore,
    ) -> Result<Seed, PipelineError> {
        let seed = self.extract(recording)?;
        store.put(&seed)?;
        Ok(seed)
    }
}

/// Classify head gesture from the nose-coordinate series of pose-visible
/// frames. Fewer than `min_samples` visible frames, or mean nose visibility
/// below the floor, yields "Not Detected" with zero variances.
pub fn classify_gesture(visible: &[&PoseSample], th: &ExtractorThresholds) -> GestureMetrics {
    let not_detected = GestureMetrics {
        label: GestureLabel::NotDetected,
        var_x: 0.0,
        var_y: 0.0,
    };

    if visible.len() < th.min_samples {
        return not_detected;
    }
    let mean_vis = visible.iter().map(|p| p.nose_vis).sum::<f64>() / visible.len() as f64;
    if mean_vis < th.visibility_min {
        return not_detected;
    }

    let xs: Vec<f64> = visible.iter().map(|p| p.nose_x).collect();
    let ys: Vec<f64> = visible.iter().map(|p| p.nose_y).collect();

    let var_x = sample_variance(&moving_average(&xs, th.smoothing_window)) * 10_000.0;
    let var_y = sample_variance(&moving_average(&ys, th.smoothing_window)) * 10_000.0;

    let label = if var_x < th.static_variance_max && var_y < th.static_variance_max {
        GestureLabel::Static
    } else if var_x > var_y * th.axis_dominance_ratio && var_x > th.gesture_variance_min {
        GestureLabel::HeadShaking
    } else if var_y > var_x * th.axis_dominance_ratio && var_y > th.gesture_variance_min {
        GestureLabel::HeadNodding
    } else {
        GestureLabel::Dynamic
    };

    GestureMetrics { label, var_x, var_y }
}

/// Classify posture lean from shoulder-depth drift: mean depth over the early
/// fraction of frames against the late fraction. Insufficient frames or
/// shoulder visibility yields "Unknown" with zero diff.
pub fn classify_posture(visible: &[&PoseSample], th: &ExtractorThresholds) -> PostureMetrics {
    let unknown = PostureMetrics {
        label: PostureLabel::Unknown,
        z_diff: 0.0,
    };

    if visible.len() < th.min_samples {
        return unknown;
    }

    let vis_values: Vec<f64> = visible
        .iter()
        .flat_map(|p| [p.left_shoulder_vis, p.right_shoulder_vis])
        .flatten()
        .collect();
    match mean(&vis_values) {
        Some(v) if v >= th.visibility_min => {}
        _ => return unknown,
    }

    let n = visible.len();
    let early_end = (n as f64 * th.posture_early_frac) as usize;
    let late_start = (n as f64 * th.posture_late_frac) as usize;

    let early = shoulder_depth_mean(&visible[..early_end]);
    let late = shoulder_depth_mean(&visible[late_start..]);

    let (early, late) = match (early, late) {
        (Some(e), Some(l)) => (e, l),
        _ => return unknown,
    };

    // Depth decreases toward the camera, so a positive diff means the
    // subject moved closer over the trial.
    let z_diff = early - late;

    let label = if z_diff > th.lean_depth_diff {
        PostureLabel::LeaningForward
    } else if z_diff < -th.lean_depth_diff {
        PostureLabel::LeaningBackward
    } else {
        PostureLabel::Stable
    };

    PostureMetrics { label, z_diff }
}

/// Classify gaze stability from the combined nose-coordinate standard
/// deviation (scaled by 100). Fewer than `min_samples` visible frames yields
/// "Unknown".
pub fn classify_gaze(visible: &[&PoseSample], th: &ExtractorThresholds) -> GazeMetrics {
    if visible.len() < th.min_samples {
        return GazeMetrics {
            label: GazeLabel::Unknown,
        };
    }

    let xs: Vec<f64> = visible.iter().map(|p| p.nose_x).collect();
    let ys: Vec<f64> = visible.iter().map(|p| p.nose_y).collect();
    let instability = (sample_std(&xs) + sample_std(&ys)) * 100.0;

    let label = if instability < th.gaze_focused_max {
        GazeLabel::HighlyFocused
    } else if instability > th.gaze_distracted_min {
        GazeLabel::Distracted
    } else {
        GazeLabel::Normal
    };

    GazeMetrics { label }
}

/// Mean probability per emotion class across all frames carrying that class
pub fn average_emotions(samples: &[Sample]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for sample in samples {
        for (class, p) in &sample.emotions {
            let entry = sums.entry(class.clone()).or_insert((0.0, 0));
            entry.0 += p;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(class, (sum, count))| (class, sum / count as f64))
        .collect()
}

/// Highest mean-probability class excluding Neutral. Ties resolve to the
/// lexically-first class; an empty (or neutral-only) map yields "None".
pub fn dominant_emotion(stats: &BTreeMap<String, f64>) -> DominantEmotion {
    let mut best: Option<(&str, f64)> = None;
    for (class, score) in stats {
        if class == NEUTRAL_EMOTION {
            continue;
        }
        match best {
            Some((_, top)) if *score <= top => {}
            _ => best = Some((class, *score)),
        }
    }
    match best {
        Some((class, score)) => DominantEmotion {
            emotion: class.to_string(),
            score,
        },
        None => DominantEmotion {
            emotion: "None".to_string(),
            score: 0.0,
        },
    }
}

/// Build the rule-based interpretation sentence sequence.
///
/// Conditions are tested in fixed order (posture forward, posture backward,
/// nodding, shaking, positive emotions, negative emotions, sadness, gaze) and
/// the matching fragments joined with single spaces. When nothing fires, the
/// neutral default sentence is emitted.
pub fn build_interpretation(metrics: &BehaviorMetrics) -> String {
    let mut sentences: Vec<String> = Vec::new();

    match metrics.posture.label {
        PostureLabel::LeaningForward => sentences.push(
            "The user leaned forward, indicating active interest or cognitive engagement."
                .to_string(),
        ),
        PostureLabel::LeaningBackward => sentences.push(
            "The user leaned backward, suggesting a relaxed state or potential disinterest."
                .to_string(),
        ),
        _ => {}
    }

    match metrics.gesture.label {
        GestureLabel::HeadNodding => sentences.push(
            "Frequent head nodding was observed, a strong sign of agreement or understanding."
                .to_string(),
        ),
        GestureLabel::HeadShaking => sentences.push(
            "Head shaking was detected, indicating confusion, disagreement, or rejection."
                .to_string(),
        ),
        _ => {}
    }

    let dominant = metrics.dominant_emotion.emotion.as_str();
    if POSITIVE_EMOTIONS.contains(&dominant) {
        sentences.push(format!(
            "Positive micro-expressions ({}) were detected.",
            dominant
        ));
    } else if NEGATIVE_EMOTIONS.contains(&dominant) {
        sentences.push(format!(
            "Negative micro-expressions ({}) suggest dissatisfaction.",
            dominant
        ));
    } else if dominant == "Sadness" {
        sentences.push(
            "Traces of 'Sadness' were found, which in this context often implies deep concentration."
                .to_string(),
        );
    }

    if metrics.gaze.label == GazeLabel::Distracted {
        sentences.push(
            "Gaze was unstable, suggesting the user was skimming or looking for information."
                .to_string(),
        );
    }

    if sentences.is_empty() {
        NEUTRAL_INTERPRETATION.to_string()
    } else {
        sentences.join(" ")
    }
}

/// Trailing moving average with back-filled warm-up: positions before the
/// first complete window take the first complete window's value. A series
/// shorter than the window is returned unchanged.
fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    if window <= 1 || values.len() < window {
        return values.to_vec();
    }
    let mut out = Vec::with_capacity(values.len());
    for i in (window - 1)..values.len() {
        let sum: f64 = values[i + 1 - window..=i].iter().sum();
        out.push(sum / window as f64);
    }
    let first = out[0];
    let mut filled = vec![first; window - 1];
    filled.append(&mut out);
    filled
}

/// Sample variance (n-1 denominator); 0 for fewer than two values
fn sample_variance(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
}

/// Sample standard deviation (n-1 denominator)
fn sample_std(values: &[f64]) -> f64 {
    sample_variance(values).sqrt()
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Mean of the per-shoulder depth means over a slice of frames, skipping
/// missing readings the way column-wise averaging does
fn shoulder_depth_mean(frames: &[&PoseSample]) -> Option<f64> {
    let left: Vec<f64> = frames.iter().filter_map(|p| p.left_shoulder_z).collect();
    let right: Vec<f64> = frames.iter().filter_map(|p| p.right_shoulder_z).collect();

    let columns: Vec<f64> = [mean(&left), mean(&right)].into_iter().flatten().collect();
    mean(&columns)
}
