use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Named facial expressions understood by the avatar rig.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Expression {
    Smile,
    Frown,
    Surprise,
    Anger,
    Blink,
    MouthOpen,
}

impl Expression {
    pub const ALL: [Expression; 6] = [
        Expression::Smile,
        Expression::Frown,
        Expression::Surprise,
        Expression::Anger,
        Expression::Blink,
        Expression::MouthOpen,
    ];

    /// Wire / morph-target name.
    pub fn as_str(self) -> &'static str {
        match self {
            Expression::Smile => "smile",
            Expression::Frown => "frown",
            Expression::Surprise => "surprise",
            Expression::Anger => "anger",
            Expression::Blink => "blink",
            Expression::MouthOpen => "mouthOpen",
        }
    }
}

/// Active expression intensities. A missing key means "no signal", not zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expressions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smile: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frown: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub surprise: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anger: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blink: Option<f64>,
    #[serde(
        rename = "mouthOpen",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub mouth_open: Option<f64>,
    /// Expression names this build does not know, kept for forward compatibility.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Expressions {
    pub fn get(&self, expression: Expression) -> Option<f64> {
        match expression {
            Expression::Smile => self.smile,
            Expression::Frown => self.frown,
            Expression::Surprise => self.surprise,
            Expression::Anger => self.anger,
            Expression::Blink => self.blink,
            Expression::MouthOpen => self.mouth_open,
        }
    }

    pub fn set(&mut self, expression: Expression, intensity: f64) {
        let slot = match expression {
            Expression::Smile => &mut self.smile,
            Expression::Frown => &mut self.frown,
            Expression::Surprise => &mut self.surprise,
            Expression::Anger => &mut self.anger,
            Expression::Blink => &mut self.blink,
            Expression::MouthOpen => &mut self.mouth_open,
        };
        *slot = Some(intensity);
    }

    /// Known expressions that carry a value, in declaration order.
    pub fn active(&self) -> impl Iterator<Item = (Expression, f64)> + '_ {
        Expression::ALL
            .into_iter()
            .filter_map(|e| self.get(e).map(|v| (e, v)))
    }
}

/// Normalized head pose delta. `z` is reserved and generated as 0.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HeadMovement {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// One animation update carried over the data channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpressionFrame {
    #[serde(default)]
    pub expressions: Expressions,
    #[serde(rename = "headMovement")]
    pub head_movement: HeadMovement,
    /// Top-level fields from newer senders.
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl ExpressionFrame {
    /// True when every known expression intensity lies in `[0, 1]`.
    ///
    /// Decoding never clamps, so renderers that care about range call this.
    pub fn intensities_in_range(&self) -> bool {
        self.expressions
            .active()
            .all(|(_, v)| (0.0..=1.0).contains(&v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_overwrites_previous_value() {
        let mut e = Expressions::default();
        e.set(Expression::Blink, 0.5);
        e.set(Expression::Blink, 1.0);
        assert_eq!(e.get(Expression::Blink), Some(1.0));
        assert_eq!(e.active().count(), 1);
    }

    #[test]
    fn range_check_flags_out_of_range_values() {
        let mut frame = ExpressionFrame::default();
        frame.expressions.set(Expression::Smile, 0.8);
        assert!(frame.intensities_in_range());
        frame.expressions.set(Expression::Anger, 1.5);
        assert!(!frame.intensities_in_range());
    }
}
