//! SUS text chart parser.
//!
//! A SUS file is a list of `#` directives. Header directives (`#TITLE "x"`,
//! `#BPM01: 120`, `#TIL00: "0'0:1.0"`) set chart-wide values; data directives
//! (`#mmmcc: data`) place notes inside measure `mmm`. The data string is a run
//! of two-character cells that divide the measure evenly, `00` being empty.
//!
//! Channels:
//! - `02` bar length in beats, `08` BPM reference
//! - `1x` tap in lane `x` (cell = type, width)
//! - `5x` directional modifier (flick or ease) in lane `x`
//! - `3xy` slide point on slide channel `y`, `9xy` guide point
//!
//! Taps and directionals that coincide with a slide point modify that slide
//! point instead of becoming notes of their own.

use std::collections::{BTreeMap, HashMap};

use winnow::ascii::{digit1, float, space0};
use winnow::combinator::{alt, opt, preceded, separated};
use winnow::prelude::*;
use winnow::token::{rest, take_while};

use crate::feedback::{FeedbackCollector, ParseResult};
use crate::score::{
    BpmChange, ConnectionKind, Ease, FlickDirection, Guide, GuidePoint, JudgeType, Note,
    SingleNote, Slide, SlideConnection, Score, TimeScaleChange, TimeScaleGroup,
};

type PResult<T> = winnow::ModalResult<T>;

pub const DEFAULT_TICKS_PER_BEAT: u32 = 480;
const DEFAULT_BAR_BEATS: f64 = 4.0;

/// Upper bounds for header values that scale tick arithmetic.
pub const MAX_TICKS_PER_BEAT: i64 = 1 << 20;
pub const MAX_MEASURE_BASE: u32 = 1_000_000;
const MAX_BAR_BEATS: f64 = 1024.0;

#[derive(Debug, Clone, PartialEq)]
enum Line<'a> {
    Data {
        measure: u32,
        channel: &'a str,
        data: &'a str,
    },
    Header {
        key: &'a str,
        value: &'a str,
    },
}

fn data_line<'a>(input: &mut &'a str) -> PResult<Line<'a>> {
    let measure = take_while(3, |c: char| c.is_ascii_digit())
        .try_map(str::parse::<u32>)
        .parse_next(input)?;
    let channel = take_while(1..=3, |c: char| c.is_ascii_alphanumeric()).parse_next(input)?;
    ':'.parse_next(input)?;
    space0.parse_next(input)?;
    let data = rest.parse_next(input)?;
    Ok(Line::Data {
        measure,
        channel,
        data: data.trim(),
    })
}

fn header_line<'a>(input: &mut &'a str) -> PResult<Line<'a>> {
    let key = take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_').parse_next(input)?;
    opt(':').parse_next(input)?;
    space0.parse_next(input)?;
    let value = rest.parse_next(input)?;
    Ok(Line::Header {
        key,
        value: value.trim(),
    })
}

fn directive<'a>(input: &mut &'a str) -> PResult<Line<'a>> {
    preceded('#', alt((data_line, header_line))).parse_next(input)
}

/// One `m'tick:scale` entry of a `#TIL` definition.
fn til_entry(input: &mut &str) -> PResult<(u32, u32, f64)> {
    space0.parse_next(input)?;
    let measure = digit1.try_map(str::parse::<u32>).parse_next(input)?;
    '\''.parse_next(input)?;
    let tick = digit1.try_map(str::parse::<u32>).parse_next(input)?;
    ':'.parse_next(input)?;
    let scale: f64 = float.parse_next(input)?;
    space0.parse_next(input)?;
    Ok((measure, tick, scale))
}

fn til_entries(input: &mut &str) -> PResult<Vec<(u32, u32, f64)>> {
    separated(0.., til_entry, ',').parse_next(input)
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

/// Measure number to absolute tick, honouring `#mmm02` bar length changes.
#[derive(Debug)]
struct BarTimeline {
    /// (first measure, ticks per measure), sorted, always starting at 0.
    bars: Vec<(u32, i64)>,
}

impl BarTimeline {
    fn new(mut lengths: BTreeMap<u32, i64>, ticks_per_beat: i64) -> Self {
        lengths
            .entry(0)
            .or_insert((DEFAULT_BAR_BEATS * ticks_per_beat as f64) as i64);
        BarTimeline {
            bars: lengths.into_iter().collect(),
        }
    }

    /// `None` when the tick does not fit in an `i64`.
    fn measure_start(&self, measure: u32) -> Option<i64> {
        let mut tick = 0i64;
        for (i, &(start, len)) in self.bars.iter().enumerate() {
            match self.bars.get(i + 1) {
                Some(&(next, _)) if measure >= next => {
                    tick = tick.checked_add(i64::from(next - start).checked_mul(len)?)?;
                }
                _ => return tick.checked_add(i64::from(measure - start).checked_mul(len)?),
            }
        }
        Some(tick)
    }

    fn bar_ticks(&self, measure: u32) -> i64 {
        self.bars
            .iter()
            .rev()
            .find(|(start, _)| *start <= measure)
            .map(|(_, len)| *len)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
struct Position {
    tick: i64,
    lane: u32,
    width: u32,
}

#[derive(Debug, Clone, Copy)]
struct RawPoint {
    pos: Position,
    kind: u32,
    group: usize,
    line: usize,
}

#[derive(Debug)]
struct DataRecord<'a> {
    line: usize,
    measure: u32,
    channel: &'a str,
    data: &'a str,
    group: usize,
}

/// Parse SUS text into a score, collecting feedback.
pub fn parse(input: &str) -> ParseResult<Score> {
    let mut collector = FeedbackCollector::new();
    let mut score = Score::default();

    let mut ticks_per_beat = i64::from(DEFAULT_TICKS_PER_BEAT);
    let mut measure_base = 0u32;
    let mut current_group = 0usize;
    let mut bpm_defs: HashMap<String, f64> = HashMap::new();
    let mut til_ids: HashMap<String, usize> = HashMap::new();
    let mut til_defs: Vec<(usize, &str)> = Vec::new();
    let mut records: Vec<DataRecord> = Vec::new();

    for (idx, raw) in input.lines().enumerate() {
        let line_num = idx + 1;
        collector.set_line(line_num);
        let trimmed = raw.trim();
        if !trimmed.starts_with('#') {
            continue;
        }
        let Ok(line) = directive.parse(trimmed) else {
            collector.warning(format!("unreadable directive: {}", trimmed));
            continue;
        };

        match line {
            Line::Data {
                measure,
                channel,
                data,
            } => records.push(DataRecord {
                line: line_num,
                measure: measure_base.saturating_add(measure),
                channel,
                data,
                group: current_group,
            }),
            Line::Header { key, value } => {
                let upper = key.to_ascii_uppercase();
                match upper.as_str() {
                    "TITLE" => score.metadata.title = Some(unquote(value).to_string()),
                    "ARTIST" => score.metadata.artist = Some(unquote(value).to_string()),
                    "DESIGNER" => score.metadata.designer = Some(unquote(value).to_string()),
                    "WAVEOFFSET" => match value.parse::<f64>() {
                        Ok(offset) => score.offset = offset,
                        Err(_) => collector.error(format!("invalid WAVEOFFSET {}", value)),
                    },
                    "REQUEST" => {
                        let request = unquote(value);
                        if let Some(tpb) = request.strip_prefix("ticks_per_beat") {
                            match tpb.trim().parse::<i64>() {
                                Ok(tpb) if (1..=MAX_TICKS_PER_BEAT).contains(&tpb) => {
                                    ticks_per_beat = tpb
                                }
                                _ => collector.error(format!("invalid ticks_per_beat {}", tpb.trim())),
                            }
                        }
                    }
                    "MEASUREBS" => match value.parse::<u32>() {
                        Ok(base) if base <= MAX_MEASURE_BASE => measure_base = base,
                        _ => collector.error(format!("invalid MEASUREBS {}", value)),
                    },
                    "HISPEED" | "MEASUREHS" => match til_ids.get(&value.to_ascii_uppercase()) {
                        Some(&group) => current_group = group,
                        None => collector.error(format!("unknown time scale group {}", value)),
                    },
                    "NOSPEED" => current_group = 0,
                    _ if upper.starts_with("BPM") && upper.len() == 5 => match value.parse::<f64>() {
                        Ok(bpm) => {
                            bpm_defs.insert(upper[3..].to_string(), bpm);
                        }
                        Err(_) => collector.error(format!("invalid BPM definition {}", value)),
                    },
                    _ if upper.starts_with("TIL") && upper.len() == 5 => {
                        let id = upper[3..].to_string();
                        let next = til_ids.len();
                        let group = *til_ids.entry(id).or_insert(next);
                        til_defs.push((group, unquote(value)));
                    }
                    _ => {}
                }
            }
        }
    }

    // Bar lengths first: every tick computation depends on them.
    let mut bar_lengths = BTreeMap::new();
    for record in records.iter().filter(|r| r.channel == "02") {
        collector.set_line(record.line);
        match record.data.parse::<f64>() {
            Ok(beats) if beats > 0.0 && beats <= MAX_BAR_BEATS => {
                bar_lengths.insert(record.measure, (beats * ticks_per_beat as f64).round() as i64);
            }
            _ => collector.error(format!("invalid bar length {}", record.data)),
        }
    }
    let timeline = BarTimeline::new(bar_lengths, ticks_per_beat);
    let beat_of = |tick: i64| tick as f64 / ticks_per_beat as f64;

    if !til_ids.is_empty() {
        score.time_scale_groups = vec![TimeScaleGroup::default(); til_ids.len()];
    }
    for (group, body) in til_defs {
        match til_entries.parse(body) {
            Ok(entries) => {
                for (measure, tick, scale) in entries {
                    let Some(at) = timeline
                        .measure_start(measure)
                        .and_then(|start| start.checked_add(i64::from(tick)))
                    else {
                        collector.error(format!("time scale change at measure {} is out of range", measure));
                        continue;
                    };
                    score.time_scale_groups[group].changes.push(TimeScaleChange {
                        beat: beat_of(at),
                        scale,
                    });
                }
            }
            Err(_) => collector.error(format!("invalid time scale definition {}", body)),
        }
    }

    let mut taps: BTreeMap<Position, RawPoint> = BTreeMap::new();
    let mut directionals: BTreeMap<Position, RawPoint> = BTreeMap::new();
    let mut slide_points: BTreeMap<char, Vec<RawPoint>> = BTreeMap::new();
    let mut guide_points: BTreeMap<char, Vec<RawPoint>> = BTreeMap::new();

    for record in &records {
        collector.set_line(record.line);
        if record.channel == "02" {
            continue;
        }

        let cells: Vec<char> = record.data.chars().filter(|c| !c.is_whitespace()).collect();
        if cells.len() % 2 != 0 {
            collector.error(format!("odd data length in channel {}", record.channel));
            continue;
        }
        let count = (cells.len() / 2) as i64;
        let Some(start) = timeline.measure_start(record.measure) else {
            collector.error(format!("measure {} is out of range", record.measure));
            continue;
        };
        let bar = timeline.bar_ticks(record.measure);

        let mut channel = record.channel.chars();
        let (kind, lane, slot) = (channel.next(), channel.next(), channel.next());

        for (i, cell) in cells.chunks(2).enumerate() {
            if cell == ['0', '0'] {
                continue;
            }
            let Some(tick) = bar
                .checked_mul(i as i64)
                .and_then(|offset| start.checked_add(offset / count))
            else {
                collector.error(format!("measure {} is out of range", record.measure));
                break;
            };

            if record.channel == "08" {
                let id: String = cell.iter().collect::<String>().to_ascii_uppercase();
                match bpm_defs.get(&id) {
                    Some(&bpm) => score.bpm_changes.push(BpmChange {
                        beat: beat_of(tick),
                        bpm,
                    }),
                    None => collector.error(format!("undefined BPM reference {}", id)),
                }
                continue;
            }

            let (Some(lane), Some(note_kind), Some(width)) = (
                lane.and_then(|c| c.to_digit(36)),
                cell[0].to_digit(36),
                cell[1].to_digit(36),
            ) else {
                collector.error(format!("malformed cell in channel {}", record.channel));
                continue;
            };
            let point = RawPoint {
                pos: Position { tick, lane, width },
                kind: note_kind,
                group: record.group,
                line: record.line,
            };

            match (kind, slot) {
                (Some('1'), None) => {
                    taps.insert(point.pos, point);
                }
                (Some('5'), None) => {
                    directionals.insert(point.pos, point);
                }
                (Some('3'), Some(id)) => slide_points.entry(id).or_default().push(point),
                (Some('9'), Some(id)) => guide_points.entry(id).or_default().push(point),
                _ => {
                    collector.warning(format!("unsupported channel {}, skipped", record.channel));
                    break;
                }
            }
        }
    }

    for (id, mut points) in slide_points {
        points.sort_by_key(|p| p.pos.tick);
        let mut open: Option<Vec<RawPoint>> = None;
        for point in points {
            collector.set_line(point.line);
            match (point.kind, open.as_mut()) {
                (1, None) => open = Some(vec![point]),
                (1, Some(_)) => {
                    collector.error(format!("slide on channel {} starts before the previous one ended", id));
                }
                (3 | 5, Some(current)) => current.push(point),
                (2, Some(current)) => {
                    current.push(point);
                    if let Some(done) = open.take() {
                        score.notes.push(Note::Slide(build_slide(
                            &done,
                            ticks_per_beat,
                            &mut taps,
                            &mut directionals,
                        )));
                    }
                }
                (3 | 5 | 2, None) => {
                    collector.error(format!("slide point on channel {} outside a slide", id));
                }
                (other, _) => collector.error(format!("unknown slide point type {}", other)),
            }
        }
        if open.is_some() {
            collector.error(format!("slide on channel {} never ends", id));
        }
    }

    for (id, mut points) in guide_points {
        points.sort_by_key(|p| p.pos.tick);
        let mut open: Option<Vec<RawPoint>> = None;
        for point in points {
            collector.set_line(point.line);
            match (point.kind, open.as_mut()) {
                (1, None) => open = Some(vec![point]),
                (3 | 5, Some(current)) => current.push(point),
                (2, Some(current)) => {
                    current.push(point);
                    if let Some(done) = open.take() {
                        score
                            .notes
                            .push(Note::Guide(build_guide(&done, ticks_per_beat, &mut directionals)));
                    }
                }
                _ => collector.error(format!("malformed guide on channel {}", id)),
            }
        }
        if open.is_some() {
            collector.error(format!("guide on channel {} never ends", id));
        }
    }

    for (pos, tap) in taps {
        collector.set_line(tap.line);
        let (critical, trace) = match tap.kind {
            1 => (false, false),
            2 => (true, false),
            5 => (false, true),
            6 => (true, true),
            other => {
                collector.warning(format!("tap type {} has no standalone meaning, skipped", other));
                continue;
            }
        };
        let direction = directionals.remove(&pos).and_then(|d| flick(d.kind));
        let (lane, size) = lane_and_size(pos);
        score.notes.push(Note::Single(SingleNote {
            beat: beat_of(pos.tick),
            lane,
            size,
            critical,
            trace,
            direction,
            group: tap.group,
        }));
    }

    for point in directionals.values() {
        collector.set_line(point.line);
        collector.warning("directional without a note underneath, skipped");
    }

    score.normalize();
    ParseResult::new(score, collector.into_feedback())
}

fn lane_and_size(pos: Position) -> (f64, f64) {
    let width = f64::from(pos.width);
    (f64::from(pos.lane) - 8.0 + width / 2.0, width / 2.0)
}

fn flick(kind: u32) -> Option<FlickDirection> {
    match kind {
        1 => Some(FlickDirection::Up),
        3 => Some(FlickDirection::Left),
        4 => Some(FlickDirection::Right),
        _ => None,
    }
}

fn ease(kind: u32) -> Option<Ease> {
    match kind {
        2 => Some(Ease::In),
        5 | 6 => Some(Ease::Out),
        _ => None,
    }
}

fn build_slide(
    points: &[RawPoint],
    ticks_per_beat: i64,
    taps: &mut BTreeMap<Position, RawPoint>,
    directionals: &mut BTreeMap<Position, RawPoint>,
) -> Slide {
    let critical = points
        .first()
        .and_then(|p| taps.get(&p.pos))
        .is_some_and(|t| matches!(t.kind, 2 | 6));

    let last = points.len().saturating_sub(1);
    let connections = points
        .iter()
        .enumerate()
        .map(|(i, point)| {
            let kind = match (i, point.kind) {
                (0, _) => ConnectionKind::Start,
                (i, _) if i == last => ConnectionKind::End,
                (_, 5) => ConnectionKind::Attach,
                _ => ConnectionKind::Tick,
            };

            let mut judge = JudgeType::Normal;
            let mut point_critical = critical;
            if matches!(kind, ConnectionKind::Start | ConnectionKind::End) {
                if let Some(tap) = taps.remove(&point.pos) {
                    match tap.kind {
                        2 => point_critical = true,
                        3 => judge = JudgeType::None,
                        5 => judge = JudgeType::Trace,
                        6 => {
                            point_critical = true;
                            judge = JudgeType::Trace;
                        }
                        _ => {}
                    }
                }
            }

            let mut connection_ease = Ease::Linear;
            let mut direction = None;
            if let Some(dir) = directionals.remove(&point.pos) {
                if kind == ConnectionKind::End {
                    direction = flick(dir.kind);
                }
                if let Some(e) = ease(dir.kind) {
                    connection_ease = e;
                }
            }

            let (lane, size) = lane_and_size(point.pos);
            SlideConnection {
                kind,
                beat: point.pos.tick as f64 / ticks_per_beat as f64,
                lane,
                size,
                critical: point_critical,
                ease: connection_ease,
                judge,
                direction,
                group: point.group,
            }
        })
        .collect();

    Slide {
        critical,
        connections,
    }
}

fn build_guide(
    points: &[RawPoint],
    ticks_per_beat: i64,
    directionals: &mut BTreeMap<Position, RawPoint>,
) -> Guide {
    let midpoints = points
        .iter()
        .map(|point| {
            let ease = directionals
                .remove(&point.pos)
                .and_then(|d| ease(d.kind))
                .unwrap_or_default();
            let (lane, size) = lane_and_size(point.pos);
            GuidePoint {
                beat: point.pos.tick as f64 / ticks_per_beat as f64,
                lane,
                size,
                ease,
                group: point.group,
            }
        })
        .collect();

    Guide {
        color: "green".to_string(),
        fade: "out".to_string(),
        midpoints,
    }
}
