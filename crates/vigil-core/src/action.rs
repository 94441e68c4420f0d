//! Challenge-action verification.
//!
//! A challenge is a composite descriptor such as `TURN_LEFT+OPEN_MOUTH`: every
//! sub-action must hold in the same frame. Each token maps to exactly one
//! predicate over head pose and face ratios. Tokens outside the vocabulary are
//! kept and reported as [`Verdict::Unknown`] so they always fail.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Thresholds;
use crate::types::{FaceRatios, PoseAngles};

pub const SEPARATOR: char = '+';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    TurnLeft,
    TurnRight,
    LookUp,
    LookDown,
    TiltLeft,
    TiltRight,
    OpenMouth,
    Blink,
    /// Not measured. Always fails; a smile detector has not been built.
    Smile,
}

impl Action {
    pub const ALL: [Action; 9] = [
        Action::TurnLeft,
        Action::TurnRight,
        Action::LookUp,
        Action::LookDown,
        Action::TiltLeft,
        Action::TiltRight,
        Action::OpenMouth,
        Action::Blink,
        Action::Smile,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::TurnLeft => "TURN_LEFT",
            Action::TurnRight => "TURN_RIGHT",
            Action::LookUp => "LOOK_UP",
            Action::LookDown => "LOOK_DOWN",
            Action::TiltLeft => "TILT_LEFT",
            Action::TiltRight => "TILT_RIGHT",
            Action::OpenMouth => "OPEN_MOUTH",
            Action::Blink => "BLINK",
            Action::Smile => "SMILE",
        }
    }

    /// Whether the predicate reads head pose.
    pub fn requires_pose(&self) -> bool {
        matches!(
            self,
            Action::TurnLeft
                | Action::TurnRight
                | Action::LookUp
                | Action::LookDown
                | Action::TiltLeft
                | Action::TiltRight
        )
    }

    /// Evaluate this action against one frame's features.
    pub fn check(&self, pose: Option<&PoseAngles>, ratios: &FaceRatios, t: &Thresholds) -> Verdict {
        let pose = match (self.requires_pose(), pose) {
            (true, None) => return Verdict::PoseUnavailable,
            (_, pose) => pose.copied().unwrap_or_default(),
        };

        let passed = match self {
            Action::TurnLeft => pose.yaw < -t.turn_yaw,
            Action::TurnRight => pose.yaw > t.turn_yaw,
            Action::LookUp => pose.pitch > t.look_pitch,
            Action::LookDown => pose.pitch < -t.look_pitch,
            Action::TiltLeft => pose.roll > t.tilt_roll,
            Action::TiltRight => pose.roll < -t.tilt_roll,
            Action::OpenMouth => ratios.mar > t.open_mouth_mar,
            Action::Blink => ratios.left_ear < t.blink_ear || ratios.right_ear < t.blink_ear,
            Action::Smile => return Verdict::Unsupported,
        };

        if passed {
            Verdict::Passed
        } else {
            Verdict::Failed
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown action '{0}'")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// One `+`-separated token of a challenge descriptor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionToken {
    Known(Action),
    Unknown(String),
}

impl ActionToken {
    pub fn as_str(&self) -> &str {
        match self {
            ActionToken::Known(action) => action.as_str(),
            ActionToken::Unknown(raw) => raw,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
    /// Token is not part of the action vocabulary.
    Unknown,
    /// Action is in the vocabulary but cannot be measured.
    Unsupported,
    /// Action needs head pose and pose estimation failed for this frame.
    PoseUnavailable,
}

impl Verdict {
    pub fn passed(&self) -> bool {
        matches!(self, Verdict::Passed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubActionResult {
    pub token: String,
    pub verdict: Verdict,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionOutcome {
    pub success: bool,
    pub sub_actions: Vec<SubActionResult>,
}

/// A parsed composite challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionDescriptor {
    tokens: Vec<ActionToken>,
}

impl ActionDescriptor {
    /// Split on `+` and classify each trimmed token. Never fails: empty and
    /// unrecognised tokens are kept as [`ActionToken::Unknown`].
    pub fn parse(raw: &str) -> Self {
        let tokens = raw
            .split(SEPARATOR)
            .map(str::trim)
            .map(|token| match token.parse::<Action>() {
                Ok(action) => ActionToken::Known(action),
                Err(UnknownAction(raw)) => ActionToken::Unknown(raw),
            })
            .collect();
        Self { tokens }
    }

    pub fn from_actions(actions: impl IntoIterator<Item = Action>) -> Self {
        Self {
            tokens: actions.into_iter().map(ActionToken::Known).collect(),
        }
    }

    pub fn tokens(&self) -> &[ActionToken] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Evaluate every sub-action. The overall result passes only when the
    /// descriptor is non-empty, pose is available, and every sub-action passes.
    pub fn evaluate(
        &self,
        pose: Option<&PoseAngles>,
        ratios: &FaceRatios,
        thresholds: &Thresholds,
    ) -> ActionOutcome {
        let sub_actions: Vec<SubActionResult> = self
            .tokens
            .iter()
            .map(|token| SubActionResult {
                token: token.as_str().to_string(),
                verdict: match token {
                    ActionToken::Known(action) => action.check(pose, ratios, thresholds),
                    ActionToken::Unknown(_) => Verdict::Unknown,
                },
            })
            .collect();

        let success = !sub_actions.is_empty()
            && pose.is_some()
            && sub_actions.iter().all(|r| r.verdict.passed());

        ActionOutcome {
            success,
            sub_actions,
        }
    }
}

impl fmt::Display for ActionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, token) in self.tokens.iter().enumerate() {
            if i > 0 {
                write!(f, "{SEPARATOR}")?;
            }
            f.write_str(token.as_str())?;
        }
        Ok(())
    }
}
