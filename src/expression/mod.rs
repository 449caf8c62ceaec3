pub mod codec;
pub mod emotion;
pub mod frame;
pub mod generator;
pub mod render;

pub use codec::{decode, encode};
pub use emotion::{Emotion, EmotionCue, Morph};
pub use frame::{Expression, ExpressionFrame, Expressions, HeadMovement};
pub use generator::ExpressionGenerator;
pub use render::{AvatarPose, ExpressionSink};
