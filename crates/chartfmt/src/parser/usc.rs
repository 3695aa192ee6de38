//! USC (JSON) chart parser.
//!
//! USC already uses the playfield-centred lane convention and beat positions,
//! so parsing is a serde pass plus a mapping onto the score model.

use serde::Deserialize;

use crate::error::ParseError;
use crate::score::{
    BpmChange, ConnectionKind, Ease, FlickDirection, Guide, GuidePoint, JudgeType, Note,
    SingleNote, Slide, SlideConnection, Score, TimeScaleChange, TimeScaleGroup,
};

#[derive(Debug, Deserialize)]
struct UscDocument {
    usc: UscBody,
}

#[derive(Debug, Deserialize)]
struct UscBody {
    #[serde(default)]
    offset: f64,
    objects: Vec<UscObject>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum UscObject {
    Bpm {
        beat: f64,
        bpm: f64,
    },
    TimeScaleGroup {
        changes: Vec<UscTimeScale>,
    },
    Single {
        beat: f64,
        lane: f64,
        size: f64,
        #[serde(default)]
        critical: bool,
        #[serde(default)]
        trace: bool,
        #[serde(default)]
        direction: Option<UscDirection>,
        #[serde(default, rename = "timeScaleGroup")]
        group: usize,
    },
    Slide {
        #[serde(default)]
        critical: bool,
        connections: Vec<UscConnection>,
    },
    Guide {
        #[serde(default = "default_guide_color")]
        color: String,
        #[serde(default = "default_guide_fade")]
        fade: String,
        midpoints: Vec<UscGuidePoint>,
    },
    /// Visual-only objects the model does not carry.
    Damage {},
}

fn default_guide_color() -> String {
    "green".to_string()
}

fn default_guide_fade() -> String {
    "out".to_string()
}

#[derive(Debug, Deserialize)]
struct UscTimeScale {
    beat: f64,
    #[serde(rename = "timeScale")]
    scale: f64,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UscDirection {
    Left,
    Up,
    Right,
    None,
}

impl UscDirection {
    fn into_flick(self) -> Option<FlickDirection> {
        match self {
            UscDirection::Left => Some(FlickDirection::Left),
            UscDirection::Up => Some(FlickDirection::Up),
            UscDirection::Right => Some(FlickDirection::Right),
            UscDirection::None => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UscEase {
    #[default]
    Linear,
    In,
    Out,
    #[serde(rename = "inout")]
    InOut,
    #[serde(rename = "outin")]
    OutIn,
}

impl From<UscEase> for Ease {
    fn from(ease: UscEase) -> Self {
        match ease {
            UscEase::Linear => Ease::Linear,
            UscEase::In | UscEase::InOut => Ease::In,
            UscEase::Out | UscEase::OutIn => Ease::Out,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UscJudge {
    #[default]
    Normal,
    Trace,
    None,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UscConnection {
    #[serde(rename = "type")]
    kind: UscConnectionKind,
    beat: f64,
    #[serde(default)]
    lane: f64,
    #[serde(default)]
    size: f64,
    #[serde(default)]
    critical: bool,
    #[serde(default)]
    ease: UscEase,
    #[serde(default)]
    judge_type: UscJudge,
    #[serde(default)]
    direction: Option<UscDirection>,
    #[serde(default, rename = "timeScaleGroup")]
    group: usize,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum UscConnectionKind {
    Start,
    Tick,
    Attach,
    End,
}

#[derive(Debug, Deserialize)]
struct UscGuidePoint {
    beat: f64,
    lane: f64,
    size: f64,
    #[serde(default)]
    ease: UscEase,
    #[serde(default, rename = "timeScaleGroup")]
    group: usize,
}

/// Parse USC JSON into a score.
pub fn parse(input: &str) -> Result<Score, ParseError> {
    let doc: UscDocument =
        serde_json::from_str(input).map_err(|e| ParseError::Usc(e.to_string()))?;

    let mut score = Score {
        offset: doc.usc.offset,
        time_scale_groups: Vec::new(),
        ..Score::default()
    };

    for object in doc.usc.objects {
        match object {
            UscObject::Bpm { beat, bpm } => score.bpm_changes.push(BpmChange { beat, bpm }),
            UscObject::TimeScaleGroup { changes } => {
                score.time_scale_groups.push(TimeScaleGroup {
                    changes: changes
                        .into_iter()
                        .map(|c| TimeScaleChange {
                            beat: c.beat,
                            scale: c.scale,
                        })
                        .collect(),
                });
            }
            UscObject::Single {
                beat,
                lane,
                size,
                critical,
                trace,
                direction,
                group,
            } => score.notes.push(Note::Single(SingleNote {
                beat,
                lane,
                size,
                critical,
                trace,
                direction: direction.and_then(UscDirection::into_flick),
                group,
            })),
            UscObject::Slide {
                critical,
                connections,
            } => score.notes.push(Note::Slide(Slide {
                critical,
                connections: connections
                    .into_iter()
                    .map(|c| SlideConnection {
                        kind: match c.kind {
                            UscConnectionKind::Start => ConnectionKind::Start,
                            UscConnectionKind::Tick => ConnectionKind::Tick,
                            UscConnectionKind::Attach => ConnectionKind::Attach,
                            UscConnectionKind::End => ConnectionKind::End,
                        },
                        beat: c.beat,
                        lane: c.lane,
                        size: c.size,
                        critical: c.critical || critical,
                        ease: c.ease.into(),
                        judge: match c.judge_type {
                            UscJudge::Normal => JudgeType::Normal,
                            UscJudge::Trace => JudgeType::Trace,
                            UscJudge::None => JudgeType::None,
                        },
                        direction: c.direction.and_then(UscDirection::into_flick),
                        group: c.group,
                    })
                    .collect(),
            })),
            UscObject::Guide {
                color,
                fade,
                midpoints,
            } => score.notes.push(Note::Guide(Guide {
                color,
                fade,
                midpoints: midpoints
                    .into_iter()
                    .map(|p| GuidePoint {
                        beat: p.beat,
                        lane: p.lane,
                        size: p.size,
                        ease: p.ease.into(),
                        group: p.group,
                    })
                    .collect(),
            })),
            UscObject::Damage {} => {}
        }
    }

    if score.time_scale_groups.is_empty() {
        score.time_scale_groups.push(TimeScaleGroup::default());
    }
    score.normalize();
    Ok(score)
}
