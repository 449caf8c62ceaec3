//! Heuristic text-to-expression generator.
//!
//! Lexical cues drive the facial expressions, a periodic function of
//! wall-clock time drives idle head motion. Writes are layered in a fixed
//! order (positive, negative, surprise, random blink, emotion preset) and a
//! later layer overwrites any key an earlier one set. `blink` is the key that
//! actually collides.

use super::emotion::EmotionCue;
use super::frame::{Expression, ExpressionFrame, HeadMovement};
use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::HashSet;

static POSITIVE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["happy", "good", "great", "wonderful", "excellent", "love", "like"]
        .into_iter()
        .collect()
});

static NEGATIVE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["sad", "bad", "terrible", "awful", "horrible", "hate", "dislike"]
        .into_iter()
        .collect()
});

static SURPRISE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["wow", "amazing", "unbelievable", "incredible", "surprising"]
        .into_iter()
        .collect()
});

/// Chance per call that a blink is forced regardless of lexicon hits.
pub const RANDOM_BLINK_CHANCE: f64 = 0.1;

/// Upper bound for the length-driven mouth opening.
pub const MOUTH_OPEN_MAX: f64 = 0.8;

/// Characters of text that map to a fully scaled mouth opening (before the cap).
const MOUTH_OPEN_SCALE: f64 = 50.0;

#[derive(Debug, Clone)]
pub struct ExpressionGenerator {
    blink_chance: f64,
}

impl Default for ExpressionGenerator {
    fn default() -> Self {
        Self {
            blink_chance: RANDOM_BLINK_CHANCE,
        }
    }
}

impl ExpressionGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the random blink probability (clamped to `[0, 1]`, NaN
    /// disables random blinks).
    pub fn with_blink_chance(mut self, chance: f64) -> Self {
        self.blink_chance = if chance.is_nan() {
            0.0
        } else {
            chance.clamp(0.0, 1.0)
        };
        self
    }

    /// Builds a frame for `text` using the current time and thread RNG.
    pub fn generate(&self, text: &str) -> ExpressionFrame {
        let random_blink = rand::rng().random_bool(self.blink_chance);
        self.generate_at(text, now_seconds(), random_blink)
    }

    /// Like [`generate`](Self::generate), then overlays the emotion preset.
    pub fn generate_with_emotion(&self, text: &str, cue: Option<EmotionCue>) -> ExpressionFrame {
        let mut frame = self.generate(text);
        if let Some(cue) = cue {
            cue.apply(&mut frame);
        }
        frame
    }

    /// Deterministic core: every input that varies between calls is a parameter.
    pub fn generate_at(&self, text: &str, now_seconds: f64, random_blink: bool) -> ExpressionFrame {
        let words: Vec<String> = text.split_whitespace().map(str::to_lowercase).collect();

        let mut frame = ExpressionFrame::default();
        let e = &mut frame.expressions;

        if any_in(&words, &POSITIVE) {
            e.set(Expression::Smile, 0.8);
            e.set(Expression::Blink, 0.5);
        }
        if any_in(&words, &NEGATIVE) {
            e.set(Expression::Frown, 0.7);
            e.set(Expression::Anger, 0.3);
        }
        if any_in(&words, &SURPRISE) {
            e.set(Expression::Surprise, 0.9);
            e.set(Expression::Blink, 1.0);
        }
        if random_blink {
            e.set(Expression::Blink, 1.0);
        }

        e.set(Expression::MouthOpen, mouth_open(text));
        frame.head_movement = head_movement(now_seconds);
        frame
    }
}

fn any_in(words: &[String], lexicon: &HashSet<&'static str>) -> bool {
    words.iter().any(|w| lexicon.contains(w.as_str()))
}

/// `min(len / 50, 0.8)` where `len` counts UTF-16 code units, the unit browser
/// clients measure text in.
pub fn mouth_open(text: &str) -> f64 {
    let len = text.encode_utf16().count() as f64;
    (len / MOUTH_OPEN_SCALE).min(MOUTH_OPEN_MAX)
}

/// Idle sway with a period of 2π seconds.
pub fn head_movement(now_seconds: f64) -> HeadMovement {
    HeadMovement {
        x: now_seconds.sin() * 0.1,
        y: now_seconds.cos() * 0.05,
        z: 0.0,
    }
}

fn now_seconds() -> f64 {
    chrono::Utc::now().timestamp_millis() as f64 / 1000.0
}
