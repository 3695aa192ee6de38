//! Intermediate note/timing model.
//!
//! Every script dialect parses into a [`Score`]; the canonical exporter only
//! ever reads this model. Positions are in beats from the start of the chart.
//! Lanes use the playfield-centred convention: `lane` is the note centre in
//! `[-6, 6]` and `size` is the half width, so a full-width note is
//! `lane = 0, size = 6`.

use serde::{Deserialize, Serialize};

/// Half of the playfield width in lanes.
pub const HALF_FIELD: f64 = 6.0;

/// A complete chart in dialect-neutral form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub metadata: ScoreMetadata,
    /// Audio offset in seconds (positive delays the chart).
    pub offset: f64,
    pub bpm_changes: Vec<BpmChange>,
    /// Time scale groups. Notes refer to them by index; group 0 always exists.
    pub time_scale_groups: Vec<TimeScaleGroup>,
    pub notes: Vec<Note>,
}

impl Default for Score {
    fn default() -> Self {
        Score {
            metadata: ScoreMetadata::default(),
            offset: 0.0,
            bpm_changes: Vec::new(),
            time_scale_groups: vec![TimeScaleGroup::default()],
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScoreMetadata {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub designer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BpmChange {
    pub beat: f64,
    pub bpm: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeScaleGroup {
    pub changes: Vec<TimeScaleChange>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeScaleChange {
    pub beat: f64,
    pub scale: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Note {
    Single(SingleNote),
    Slide(Slide),
    Guide(Guide),
}

impl Note {
    /// Beat of the note head (first connection for slides and guides).
    pub fn beat(&self) -> f64 {
        match self {
            Note::Single(n) => n.beat,
            Note::Slide(s) => s.connections.first().map(|c| c.beat).unwrap_or(0.0),
            Note::Guide(g) => g.midpoints.first().map(|p| p.beat).unwrap_or(0.0),
        }
    }

    /// Lane of the note head.
    pub fn lane(&self) -> f64 {
        match self {
            Note::Single(n) => n.lane,
            Note::Slide(s) => s.connections.first().map(|c| c.lane).unwrap_or(0.0),
            Note::Guide(g) => g.midpoints.first().map(|p| p.lane).unwrap_or(0.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FlickDirection {
    Left,
    Up,
    Right,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Ease {
    #[default]
    Linear,
    In,
    Out,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum JudgeType {
    #[default]
    Normal,
    Trace,
    None,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SingleNote {
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub critical: bool,
    pub trace: bool,
    pub direction: Option<FlickDirection>,
    pub group: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionKind {
    Start,
    /// Visible tick, judged.
    Tick,
    /// Invisible tick, lane interpolated from neighbours.
    Attach,
    End,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlideConnection {
    pub kind: ConnectionKind,
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub critical: bool,
    pub ease: Ease,
    pub judge: JudgeType,
    /// Only meaningful on the end connection.
    pub direction: Option<FlickDirection>,
    pub group: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slide {
    pub critical: bool,
    pub connections: Vec<SlideConnection>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuidePoint {
    pub beat: f64,
    pub lane: f64,
    pub size: f64,
    pub ease: Ease,
    pub group: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Guide {
    pub color: String,
    pub fade: String,
    pub midpoints: Vec<GuidePoint>,
}

impl Score {
    /// Sort timing events and notes into export order.
    pub fn normalize(&mut self) {
        self.bpm_changes.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        for group in &mut self.time_scale_groups {
            group.changes.sort_by(|a, b| a.beat.total_cmp(&b.beat));
        }
        for note in &mut self.notes {
            if let Note::Slide(slide) = note {
                slide.connections.sort_by(|a, b| a.beat.total_cmp(&b.beat));
            }
        }
        self.notes.sort_by(|a, b| {
            a.beat()
                .total_cmp(&b.beat())
                .then(a.lane().total_cmp(&b.lane()))
        });
    }

    /// Check structural invariants, returning every violation found.
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();

        match self.bpm_changes.first() {
            None => problems.push("chart has no BPM".to_string()),
            Some(first) if first.beat > 0.0 => {
                problems.push(format!("first BPM change is at beat {}, not 0", first.beat))
            }
            _ => {}
        }
        for change in &self.bpm_changes {
            if !(change.bpm.is_finite() && change.bpm > 0.0) {
                problems.push(format!("invalid BPM {} at beat {}", change.bpm, change.beat));
            }
        }
        if self.time_scale_groups.is_empty() {
            problems.push("chart has no time scale group".to_string());
        }

        let groups = self.time_scale_groups.len();
        let check_lane = |problems: &mut Vec<String>, beat: f64, lane: f64, size: f64, group| {
            if !beat.is_finite() || beat < 0.0 {
                problems.push(format!("note at invalid beat {}", beat));
            }
            if !(size > 0.0) || lane - size < -HALF_FIELD - 1e-9 || lane + size > HALF_FIELD + 1e-9 {
                problems.push(format!(
                    "note at beat {} lies outside the playfield (lane {}, size {})",
                    beat, lane, size
                ));
            }
            if group >= groups {
                problems.push(format!("note at beat {} uses unknown time scale group {}", beat, group));
            }
        };

        for note in &self.notes {
            match note {
                Note::Single(n) => check_lane(&mut problems, n.beat, n.lane, n.size, n.group),
                Note::Slide(slide) => {
                    let kinds: Vec<_> = slide.connections.iter().map(|c| c.kind).collect();
                    if kinds.first() != Some(&ConnectionKind::Start)
                        || kinds.last() != Some(&ConnectionKind::End)
                        || kinds.len() < 2
                    {
                        problems.push(format!(
                            "slide at beat {} must begin with a start and finish with an end",
                            note.beat()
                        ));
                    }
                    let inner_edges = kinds
                        .iter()
                        .skip(1)
                        .take(kinds.len().saturating_sub(2))
                        .any(|k| matches!(k, ConnectionKind::Start | ConnectionKind::End));
                    if inner_edges {
                        problems.push(format!(
                            "slide at beat {} has a start or end in the middle",
                            note.beat()
                        ));
                    }
                    for c in &slide.connections {
                        if c.kind == ConnectionKind::Attach {
                            if !c.beat.is_finite() || c.beat < 0.0 {
                                problems.push(format!("note at invalid beat {}", c.beat));
                            }
                        } else {
                            check_lane(&mut problems, c.beat, c.lane, c.size, c.group);
                        }
                    }
                }
                Note::Guide(guide) => {
                    if guide.midpoints.len() < 2 {
                        problems.push(format!(
                            "guide at beat {} needs at least two points",
                            note.beat()
                        ));
                    }
                    for p in &guide.midpoints {
                        check_lane(&mut problems, p.beat, p.lane, p.size, p.group);
                    }
                }
            }
        }

        problems
    }
}
