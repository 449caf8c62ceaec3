use super::frame::{Expression, ExpressionFrame, HeadMovement};
use std::collections::HashMap;

/// Receiver of decoded frames, typically the avatar renderer.
pub trait ExpressionSink: Send {
    fn apply(&mut self, frame: &ExpressionFrame);
}

/// Current morph-target weights and accumulated head offset.
///
/// Present intensities overwrite, absent ones keep their prior value, head
/// movement is additive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AvatarPose {
    targets: HashMap<Expression, f64>,
    head: HeadMovement,
    frames_applied: u64,
}

impl AvatarPose {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(&self, expression: Expression) -> Option<f64> {
        self.targets.get(&expression).copied()
    }

    pub fn head(&self) -> HeadMovement {
        self.head
    }

    pub fn frames_applied(&self) -> u64 {
        self.frames_applied
    }
}

impl ExpressionSink for AvatarPose {
    fn apply(&mut self, frame: &ExpressionFrame) {
        for (expression, value) in frame.expressions.active() {
            self.targets.insert(expression, value);
        }
        self.head.x += frame.head_movement.x;
        self.head.y += frame.head_movement.y;
        self.head.z += frame.head_movement.z;
        self.frames_applied += 1;
    }
}
