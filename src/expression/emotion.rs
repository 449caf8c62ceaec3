use super::frame::{Expression, ExpressionFrame};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Coarse emotion label a reply backend may attach to its text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Happy,
    Sad,
    Excited,
    Surprised,
    Thoughtful,
    Neutral,
}

/// Morph target a preset writes to. Targets outside [`Expression`] travel in
/// `Expressions::extra` under their own name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Morph {
    Known(Expression),
    Named(&'static str),
}

use Morph::{Known, Named};

impl Emotion {
    /// Morph-target values at full intensity.
    pub fn preset(self) -> &'static [(Morph, f64)] {
        match self {
            Emotion::Happy => &[(Known(Expression::Smile), 0.8), (Named("eyebrows"), 0.3)],
            Emotion::Sad => &[(Known(Expression::Frown), 0.7), (Named("eyebrows"), -0.4)],
            Emotion::Excited => &[(Known(Expression::Smile), 1.0), (Named("eyes_wide"), 0.6)],
            Emotion::Surprised => &[
                (Known(Expression::Surprise), 0.9),
                (Known(Expression::Blink), 1.0),
            ],
            Emotion::Thoughtful => &[(Named("eyebrows"), 0.5), (Named("slight_frown"), 0.2)],
            Emotion::Neutral => &[],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EmotionCue {
    pub emotion: Emotion,
    #[serde(default = "default_intensity")]
    pub intensity: f64,
}

fn default_intensity() -> f64 {
    1.0
}

impl EmotionCue {
    pub fn new(emotion: Emotion, intensity: f64) -> Self {
        Self { emotion, intensity }
    }

    /// Writes the scaled preset into `frame`, replacing values already there.
    pub fn apply(&self, frame: &mut ExpressionFrame) {
        let scale = if self.intensity.is_nan() {
            0.0
        } else {
            self.intensity.clamp(0.0, 1.0)
        };
        for &(morph, value) in self.emotion.preset() {
            match morph {
                Known(expression) => frame.expressions.set(expression, value * scale),
                Named(name) => {
                    frame
                        .expressions
                        .extra
                        .insert(name.to_owned(), Value::from(value * scale));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preset_scales_by_intensity() {
        let mut frame = ExpressionFrame::default();
        EmotionCue::new(Emotion::Excited, 0.5).apply(&mut frame);
        assert_eq!(frame.expressions.smile, Some(0.5));
        assert_eq!(frame.expressions.surprise, None);
        assert_eq!(frame.expressions.extra["eyes_wide"], Value::from(0.3));
    }

    #[test]
    fn rig_specific_targets_go_to_extra() {
        let mut frame = ExpressionFrame::default();
        EmotionCue::new(Emotion::Thoughtful, 1.0).apply(&mut frame);
        assert_eq!(frame.expressions.active().count(), 0);
        assert_eq!(frame.expressions.extra["eyebrows"], Value::from(0.5));
        assert_eq!(frame.expressions.extra["slight_frown"], Value::from(0.2));

        let wire = serde_json::to_value(&frame).unwrap();
        assert_eq!(wire["expressions"]["slight_frown"], 0.2);
    }

    #[test]
    fn sad_lowers_the_eyebrows() {
        let mut frame = ExpressionFrame::default();
        EmotionCue::new(Emotion::Sad, 1.0).apply(&mut frame);
        assert_eq!(frame.expressions.frown, Some(0.7));
        assert_eq!(frame.expressions.extra["eyebrows"], Value::from(-0.4));
        // only known expressions are range checked
        assert!(frame.intensities_in_range());
    }

    #[test]
    fn intensity_is_clamped() {
        let mut frame = ExpressionFrame::default();
        EmotionCue::new(Emotion::Happy, 7.0).apply(&mut frame);
        assert_eq!(frame.expressions.smile, Some(0.8));
        assert!(frame.intensities_in_range());
    }

    #[test]
    fn neutral_leaves_frame_alone() {
        let mut frame = ExpressionFrame::default();
        EmotionCue::new(Emotion::Neutral, 1.0).apply(&mut frame);
        assert_eq!(frame, ExpressionFrame::default());
    }

    #[test]
    fn label_parses_lowercase() {
        let cue: EmotionCue = serde_json::from_str(r#"{"emotion":"surprised"}"#).unwrap();
        assert_eq!(cue.emotion, Emotion::Surprised);
        assert_eq!(cue.intensity, 1.0);
    }
}
