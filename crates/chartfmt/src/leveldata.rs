//! Canonical LevelData payload and the deterministic exporter.
//!
//! LevelData is a flat list of entities, each with an archetype name and a
//! list of named data fields that hold either a number or a reference to
//! another entity's name. The exporter walks a normalized [`Score`] in a fixed
//! order and names entities by position, so the same score always serializes
//! to the same bytes.

use serde::{Deserialize, Serialize};

use crate::score::{
    ConnectionKind, Ease, FlickDirection, Guide, JudgeType, Note, Score, SingleNote, Slide,
    SlideConnection,
};

/// Archetype that marks a NextSekai payload.
pub const TIMESCALE_GROUP: &str = "#TIMESCALE_GROUP";
pub const TIMESCALE_CHANGE: &str = "#TIMESCALE_CHANGE";
pub const BPM_CHANGE: &str = "#BPM_CHANGE";
pub const INITIALIZATION: &str = "Initialization";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    #[serde(rename = "bgmOffset")]
    pub bgm_offset: f64,
    pub entities: Vec<Entity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub archetype: String,
    #[serde(default)]
    pub data: Vec<EntityData>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityData {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
}

impl EntityData {
    fn value(name: &str, value: f64) -> Self {
        EntityData {
            name: name.to_string(),
            value: Some(value),
            reference: None,
        }
    }

    fn reference(name: &str, target: impl Into<String>) -> Self {
        EntityData {
            name: name.to_string(),
            value: None,
            reference: Some(target.into()),
        }
    }
}

impl Entity {
    fn new(archetype: impl Into<String>, data: Vec<EntityData>) -> Self {
        Entity {
            name: None,
            archetype: archetype.into(),
            data,
        }
    }

    fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Look up a numeric field.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.data.iter().find(|d| d.name == name).and_then(|d| d.value)
    }

    /// Look up a reference field.
    pub fn reference(&self, name: &str) -> Option<&str> {
        self.data
            .iter()
            .find(|d| d.name == name)
            .and_then(|d| d.reference.as_deref())
    }
}

impl LevelData {
    pub fn archetypes(&self) -> impl Iterator<Item = &str> {
        self.entities.iter().map(|e| e.archetype.as_str())
    }

    pub fn to_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(self)
    }
}

fn group_name(index: usize) -> String {
    format!("tsg{}", index)
}

fn flick_code(direction: FlickDirection) -> f64 {
    match direction {
        FlickDirection::Up => 0.0,
        FlickDirection::Left => 1.0,
        FlickDirection::Right => 2.0,
    }
}

fn ease_code(ease: Ease) -> f64 {
    match ease {
        Ease::Linear => 0.0,
        Ease::In => 1.0,
        Ease::Out => 2.0,
    }
}

fn guide_color_code(color: &str) -> f64 {
    match color {
        "neutral" => 0.0,
        "red" => 1.0,
        "green" => 2.0,
        "blue" => 3.0,
        "yellow" => 4.0,
        "purple" => 5.0,
        "cyan" => 6.0,
        "black" => 7.0,
        _ => 2.0,
    }
}

fn guide_fade_code(fade: &str) -> f64 {
    match fade {
        "none" => 1.0,
        "in" => 2.0,
        _ => 0.0,
    }
}

fn prefix(critical: bool) -> &'static str {
    if critical {
        "Critical"
    } else {
        "Normal"
    }
}

fn single_archetype(note: &SingleNote) -> String {
    let kind = match (note.trace, note.direction.is_some()) {
        (true, true) => "TraceFlickNote",
        (true, false) => "TraceNote",
        (false, true) => "FlickNote",
        (false, false) => "TapNote",
    };
    format!("{}{}", prefix(note.critical), kind)
}

fn connection_archetype(c: &SlideConnection) -> String {
    let p = prefix(c.critical);
    match (c.kind, c.judge) {
        (ConnectionKind::Start, JudgeType::None) => "HiddenSlideStartNote".to_string(),
        (ConnectionKind::Start, JudgeType::Trace) => format!("{}SlideStartTraceNote", p),
        (ConnectionKind::Start, JudgeType::Normal) => format!("{}SlideStartNote", p),
        (ConnectionKind::Tick, _) => format!("{}SlideTickNote", p),
        (ConnectionKind::Attach, _) => format!("{}AttachedSlideTickNote", p),
        (ConnectionKind::End, JudgeType::None) => "HiddenSlideEndNote".to_string(),
        (ConnectionKind::End, JudgeType::Trace) if c.direction.is_some() => {
            format!("{}SlideEndTraceFlickNote", p)
        }
        (ConnectionKind::End, JudgeType::Trace) => format!("{}SlideEndTraceNote", p),
        (ConnectionKind::End, JudgeType::Normal) if c.direction.is_some() => {
            format!("{}SlideEndFlickNote", p)
        }
        (ConnectionKind::End, JudgeType::Normal) => format!("{}SlideEndNote", p),
    }
}

/// Export a normalized score as NextSekai LevelData.
pub fn export_level_data(score: &Score) -> LevelData {
    let mut exporter = Exporter {
        entities: Vec::new(),
        next_id: 0,
    };
    exporter.timing(score);
    for note in &score.notes {
        match note {
            Note::Single(single) => exporter.single(single),
            Note::Slide(slide) => exporter.slide(slide),
            Note::Guide(guide) => exporter.guide(guide),
        }
    }
    LevelData {
        bgm_offset: score.offset,
        entities: exporter.entities,
    }
}

struct Exporter {
    entities: Vec<Entity>,
    next_id: usize,
}

impl Exporter {
    fn fresh_name(&mut self) -> String {
        let name = format!("n{}", self.next_id);
        self.next_id += 1;
        name
    }

    fn timing(&mut self, score: &Score) {
        self.entities.push(Entity::new(INITIALIZATION, Vec::new()));

        for change in &score.bpm_changes {
            self.entities.push(Entity::new(
                BPM_CHANGE,
                vec![
                    EntityData::value("#BEAT", change.beat),
                    EntityData::value("#BPM", change.bpm),
                ],
            ));
        }

        for (index, group) in score.time_scale_groups.iter().enumerate() {
            let mut data = vec![EntityData::value("length", group.changes.len() as f64)];
            if !group.changes.is_empty() {
                data.insert(0, EntityData::reference("first", format!("tsc{}_0", index)));
            }
            self.entities
                .push(Entity::new(TIMESCALE_GROUP, data).named(group_name(index)));

            for (j, change) in group.changes.iter().enumerate() {
                let mut data = vec![
                    EntityData::value("#BEAT", change.beat),
                    EntityData::value("timeScale", change.scale),
                    EntityData::reference("timeScaleGroup", group_name(index)),
                ];
                if j + 1 < group.changes.len() {
                    data.push(EntityData::reference("next", format!("tsc{}_{}", index, j + 1)));
                }
                self.entities.push(
                    Entity::new(TIMESCALE_CHANGE, data).named(format!("tsc{}_{}", index, j)),
                );
            }
        }
    }

    fn single(&mut self, note: &SingleNote) {
        let mut data = vec![
            EntityData::value("#BEAT", note.beat),
            EntityData::value("lane", note.lane),
            EntityData::value("size", note.size),
            EntityData::reference("timeScaleGroup", group_name(note.group)),
        ];
        if let Some(direction) = note.direction {
            data.push(EntityData::value("direction", flick_code(direction)));
        }
        let name = self.fresh_name();
        self.entities
            .push(Entity::new(single_archetype(note), data).named(name));
    }

    fn slide(&mut self, slide: &Slide) {
        let names: Vec<String> = slide.connections.iter().map(|_| self.fresh_name()).collect();
        let (Some(head), Some(tail)) = (names.first().cloned(), names.last().cloned()) else {
            return;
        };

        let mut joints = Vec::new();
        for (i, (connection, name)) in slide.connections.iter().zip(&names).enumerate() {
            let mut data = vec![
                EntityData::value("#BEAT", connection.beat),
                EntityData::reference("timeScaleGroup", group_name(connection.group)),
            ];
            if connection.kind == ConnectionKind::Attach {
                // Attached ticks follow the segment they sit on.
                let prev = joints.last().cloned().unwrap_or_else(|| head.clone());
                let next = slide.connections[i + 1..]
                    .iter()
                    .zip(&names[i + 1..])
                    .find(|(c, _)| c.kind != ConnectionKind::Attach)
                    .map(|(_, n)| n.clone())
                    .unwrap_or_else(|| tail.clone());
                data.push(EntityData::reference("attachHead", prev));
                data.push(EntityData::reference("attachTail", next));
            } else {
                data.push(EntityData::value("lane", connection.lane));
                data.push(EntityData::value("size", connection.size));
                if connection.kind != ConnectionKind::End {
                    data.push(EntityData::value("ease", ease_code(connection.ease)));
                }
                joints.push(name.clone());
            }
            if let Some(direction) = connection.direction {
                data.push(EntityData::value("direction", flick_code(direction)));
            }
            if connection.kind != ConnectionKind::Start {
                data.push(EntityData::reference("slide", head.clone()));
            }
            self.entities
                .push(Entity::new(connection_archetype(connection), data).named(name.clone()));
        }

        for pair in joints.windows(2) {
            self.entities.push(Entity::new(
                format!("{}SlideConnector", prefix(slide.critical)),
                vec![
                    EntityData::reference("start", head.clone()),
                    EntityData::reference("end", tail.clone()),
                    EntityData::reference("head", pair[0].clone()),
                    EntityData::reference("tail", pair[1].clone()),
                ],
            ));
        }
    }

    fn guide(&mut self, guide: &Guide) {
        for pair in guide.midpoints.windows(2) {
            let (from, to) = (&pair[0], &pair[1]);
            self.entities.push(Entity::new(
                "Guide",
                vec![
                    EntityData::value("startBeat", from.beat),
                    EntityData::value("startLane", from.lane),
                    EntityData::value("startSize", from.size),
                    EntityData::reference("startTimeScaleGroup", group_name(from.group)),
                    EntityData::value("endBeat", to.beat),
                    EntityData::value("endLane", to.lane),
                    EntityData::value("endSize", to.size),
                    EntityData::reference("endTimeScaleGroup", group_name(to.group)),
                    EntityData::value("ease", ease_code(from.ease)),
                    EntityData::value("color", guide_color_code(&guide.color)),
                    EntityData::value("fade", guide_fade_code(&guide.fade)),
                ],
            ));
        }
    }
}
