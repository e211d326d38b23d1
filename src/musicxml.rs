use crate::ast::*;

/// Output options for the MusicXML transpiler.
#[derive(Debug, Clone, Copy)]
pub struct MusicXmlOptions {
    pub include_xml_declaration: bool,
    pub pretty_print: bool,
}

impl Default for MusicXmlOptions {
    fn default() -> Self {
        Self {
            include_xml_declaration: true,
            pretty_print: true,
        }
    }
}

/// Divisions per quarter note.
const DIVISIONS: u32 = 4;

/// Line-oriented XML writer with a pretty-print switch.
struct XmlWriter {
    out: String,
    depth: usize,
    pretty: bool,
}

impl XmlWriter {
    fn new(pretty: bool) -> Self {
        Self {
            out: String::new(),
            depth: 0,
            pretty,
        }
    }

    fn line(&mut self, s: &str) {
        if self.pretty {
            for _ in 0..self.depth {
                self.out.push_str("  ");
            }
            self.out.push_str(s);
            self.out.push('\n');
        } else {
            self.out.push_str(s);
        }
    }

    /// Opening tag; `tag` may carry attributes, `name` is the bare element
    /// name used by the matching [`close`](Self::close).
    fn open(&mut self, tag: &str) {
        self.line(&format!("<{tag}>"));
        self.depth += 1;
    }

    fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.line(&format!("</{name}>"));
    }

    fn leaf(&mut self, name: &str, value: impl std::fmt::Display) {
        self.line(&format!("<{name}>{value}</{name}>"));
    }

    fn empty(&mut self, tag: &str) {
        self.line(&format!("<{tag}/>"));
    }
}

/// Convert a Score to MusicXML format
pub fn to_musicxml(score: &Score, options: &MusicXmlOptions) -> String {
    let mut w = XmlWriter::new(options.pretty_print);

    if options.include_xml_declaration {
        w.line(r#"<?xml version="1.0" encoding="UTF-8"?>"#);
        w.line(r#"<!DOCTYPE score-partwise PUBLIC "-//Recordare//DTD MusicXML 4.0 Partwise//EN" "http://www.musicxml.org/dtds/partwise.dtd">"#);
    }

    w.open(r#"score-partwise version="4.0""#);

    if let Some(title) = &score.metadata.title {
        w.open("work");
        w.leaf("work-title", escape_xml(title));
        w.close("work");
    }

    if let Some(composer) = &score.metadata.composer {
        w.open("identification");
        w.line(&format!(
            "<creator type=\"composer\">{}</creator>",
            escape_xml(composer)
        ));
        w.close("identification");
    }

    let bracket = score.staves.len() > 1;
    w.open("part-list");
    if bracket {
        w.open(r#"part-group type="start" number="1""#);
        w.leaf("group-symbol", "bracket");
        w.close("part-group");
    }
    for (i, staff) in score.staves.iter().enumerate() {
        w.open(&format!("score-part id=\"P{}\"", i + 1));
        w.leaf("part-name", escape_xml(&staff.name));
        w.close("score-part");
    }
    if bracket {
        w.empty(r#"part-group type="stop" number="1""#);
    }
    w.close("part-list");

    let max_measures = score
        .staves
        .iter()
        .map(|s| s.measures.len())
        .max()
        .unwrap_or(0);

    for (i, staff) in score.staves.iter().enumerate() {
        write_part(&mut w, score, staff, i + 1, max_measures);
    }

    w.close("score-partwise");
    w.out
}

fn write_part(w: &mut XmlWriter, score: &Score, staff: &Staff, part_no: usize, max_measures: usize) {
    w.open(&format!("part id=\"P{part_no}\""));

    // Prevailing context, updated by measure attributes as we walk.
    let mut key = score.metadata.key.clone();
    let mut time = score.metadata.time.unwrap_or_default();
    let mut clef = staff.clef;

    for idx in 0..max_measures {
        w.open(&format!("measure number=\"{}\"", idx + 1));
        let measure = staff.measures.get(idx);

        let changed = measure.and_then(|m| m.attributes.as_ref());
        if let Some(attrs) = changed {
            if let Some(k) = &attrs.key {
                key = Some(k.clone());
            }
            if let Some(t) = attrs.time {
                time = t;
            }
            if let Some(c) = attrs.clef {
                clef = c;
            }
        }

        if idx == 0 {
            w.open("attributes");
            w.leaf("divisions", DIVISIONS);
            write_key(w, key.as_deref());
            write_time(w, time);
            write_clef(w, clef);
            w.close("attributes");
            if part_no == 1 {
                if let Some(tempo) = score.metadata.tempo {
                    w.open("direction placement=\"above\"");
                    w.empty(&format!("sound tempo=\"{tempo}\""));
                    w.close("direction");
                }
            }
        } else if let Some(attrs) = changed {
            w.open("attributes");
            if let Some(k) = &attrs.key {
                write_key(w, Some(k));
            }
            if let Some(t) = attrs.time {
                write_time(w, t);
            }
            if let Some(c) = attrs.clef {
                write_clef(w, c);
            }
            w.close("attributes");
        }

        match measure {
            Some(measure) => {
                write_measure_elements(w, measure);
                if measure.barline == Barline::Final {
                    w.open("barline location=\"right\"");
                    w.leaf("bar-style", "light-heavy");
                    w.close("barline");
                }
            }
            None => write_whole_measure_rest(w, time),
        }

        w.close("measure");
    }

    w.close("part");
}

fn write_key(w: &mut XmlWriter, key: Option<&str>) {
    let name = key.unwrap_or("C");
    w.open("key");
    w.leaf("fifths", key_fifths(name));
    w.leaf("mode", key_mode(name));
    w.close("key");
}

fn write_time(w: &mut XmlWriter, time: TimeSignature) {
    w.open("time");
    w.leaf("beats", time.beats);
    w.leaf("beat-type", time.beat_type);
    w.close("time");
}

fn write_clef(w: &mut XmlWriter, clef: Clef) {
    w.open("clef");
    w.leaf("sign", clef.sign());
    w.leaf("line", clef.line());
    if let Some(change) = clef.octave_change() {
        w.leaf("clef-octave-change", change);
    }
    w.close("clef");
}

/// A staff with no measure at this index gets a whole rest sized to the
/// prevailing time signature.
fn write_whole_measure_rest(w: &mut XmlWriter, time: TimeSignature) {
    w.open("note");
    w.empty(r#"rest measure="yes""#);
    w.leaf("duration", time.beats as u32 * DIVISIONS);
    w.close("note");
}

/// Beam state for a note
#[derive(Clone, Copy, PartialEq)]
enum BeamState {
    None,
    Begin,
    Continue,
    End,
}

fn is_beamed(element: &Element) -> bool {
    matches!(element, Element::Note(note) if note.beamed)
}

/// Neighbor-based beam states: `begin` when only the next element is
/// beamed, `continue` when both neighbors are, `end` when only the
/// previous is; an isolated beamed note gets no beam tag.
fn calculate_beam_states(elements: &[Element]) -> Vec<BeamState> {
    let mut states = vec![BeamState::None; elements.len()];
    for i in 0..elements.len() {
        if !is_beamed(&elements[i]) {
            continue;
        }
        let prev = i > 0 && is_beamed(&elements[i - 1]);
        let next = i + 1 < elements.len() && is_beamed(&elements[i + 1]);
        states[i] = match (prev, next) {
            (false, true) => BeamState::Begin,
            (true, true) => BeamState::Continue,
            (true, false) => BeamState::End,
            (false, false) => BeamState::None,
        };
    }
    states
}

fn write_measure_elements(w: &mut XmlWriter, measure: &Measure) {
    let beam_states = calculate_beam_states(&measure.elements);
    for (element, beam) in measure.elements.iter().zip(beam_states.iter()) {
        match element {
            Element::Note(note) => {
                write_directions(w, note.annotation.as_ref());
                write_note(w, note, *beam);
            }
            Element::Rest(rest) => write_rest(w, rest),
            Element::Chord(chord) => {
                write_directions(w, chord.annotation.as_ref());
                write_chord(w, chord);
            }
        }
    }
}

/// Dynamics, wedges, and pedal marks render as directions immediately
/// before the note that carries them.
fn write_directions(w: &mut XmlWriter, annotation: Option<&Annotation>) {
    let Some(annotation) = annotation else { return };

    if let Some(dynamic) = annotation.dynamic {
        w.open("direction placement=\"below\"");
        w.open("direction-type");
        w.open("dynamics");
        w.empty(dynamic.as_str());
        w.close("dynamics");
        w.close("direction-type");
        w.close("direction");
    }
    if let Some(text) = &annotation.text {
        w.open("direction placement=\"above\"");
        w.open("direction-type");
        w.leaf("words", escape_xml(text));
        w.close("direction-type");
        w.close("direction");
    }
    match annotation.crescendo {
        Some(WedgeEvent::Start) => write_wedge(w, "crescendo"),
        Some(WedgeEvent::End) => write_wedge(w, "stop"),
        None => {}
    }
    match annotation.decrescendo {
        Some(WedgeEvent::Start) => write_wedge(w, "diminuendo"),
        Some(WedgeEvent::End) => write_wedge(w, "stop"),
        None => {}
    }
    if annotation.pedal_start {
        write_pedal(w, "start");
    }
    if annotation.pedal_end {
        write_pedal(w, "stop");
    }
}

fn write_wedge(w: &mut XmlWriter, kind: &str) {
    w.open("direction");
    w.open("direction-type");
    w.empty(&format!("wedge type=\"{kind}\""));
    w.close("direction-type");
    w.close("direction");
}

fn write_pedal(w: &mut XmlWriter, kind: &str) {
    w.open("direction");
    w.open("direction-type");
    w.empty(&format!("pedal type=\"{kind}\""));
    w.close("direction-type");
    w.close("direction");
}

fn write_note(w: &mut XmlWriter, note: &Note, beam: BeamState) {
    w.open("note");
    if note.grace {
        w.empty("grace");
    }
    write_pitch(w, &note.pitch);
    w.leaf("duration", note.duration.divisions());
    if note.tied {
        w.empty(r#"tie type="start""#);
    }
    w.leaf("type", note.duration.base.musicxml_type());
    for _ in 0..note.duration.dots {
        w.empty("dot");
    }
    if let Some(name) = note.pitch.accidental.musicxml_name() {
        w.leaf("accidental", name);
    }
    match beam {
        BeamState::Begin => w.line(r#"<beam number="1">begin</beam>"#),
        BeamState::Continue => w.line(r#"<beam number="1">continue</beam>"#),
        BeamState::End => w.line(r#"<beam number="1">end</beam>"#),
        BeamState::None => {}
    }
    write_notations(w, note.tied, note.annotation.as_ref());
    w.close("note");
}

fn write_rest(w: &mut XmlWriter, rest: &Rest) {
    w.open("note");
    w.empty("rest");
    w.leaf("duration", rest.duration.divisions());
    w.leaf("type", rest.duration.base.musicxml_type());
    for _ in 0..rest.duration.dots {
        w.empty("dot");
    }
    w.close("note");
}

/// First pitch as a normal note; subsequent pitches carry `<chord/>` and no
/// beam. Notations attach to the first emitted note.
fn write_chord(w: &mut XmlWriter, chord: &Chord) {
    for (i, pitch) in chord.pitches.iter().enumerate() {
        w.open("note");
        if i > 0 {
            w.empty("chord");
        }
        write_pitch(w, pitch);
        w.leaf("duration", chord.duration.divisions());
        if i == 0 && chord.tied {
            w.empty(r#"tie type="start""#);
        }
        w.leaf("type", chord.duration.base.musicxml_type());
        for _ in 0..chord.duration.dots {
            w.empty("dot");
        }
        if let Some(name) = pitch.accidental.musicxml_name() {
            w.leaf("accidental", name);
        }
        if i == 0 {
            write_notations(w, chord.tied, chord.annotation.as_ref());
        }
        w.close("note");
    }
}

fn write_pitch(w: &mut XmlWriter, pitch: &Pitch) {
    w.open("pitch");
    w.leaf("step", pitch.note.as_str());
    let alter = pitch.accidental.alter();
    if alter != 0 {
        w.leaf("alter", alter);
    }
    w.leaf("octave", pitch.octave);
    w.close("pitch");
}

fn write_notations(w: &mut XmlWriter, tied: bool, annotation: Option<&Annotation>) {
    let empty = Annotation::default();
    let annotation = annotation.unwrap_or(&empty);

    let articulations: Vec<Articulation> = annotation
        .articulations
        .iter()
        .copied()
        .filter(|a| *a != Articulation::Trill)
        .collect();
    let has_trill = annotation.articulations.contains(&Articulation::Trill);
    let has_notations = tied
        || annotation.slur_start
        || annotation.slur_end
        || !articulations.is_empty()
        || has_trill
        || annotation.fingering.is_some();
    if !has_notations {
        return;
    }

    w.open("notations");
    if tied {
        w.empty(r#"tied type="start""#);
    }
    if annotation.slur_start {
        w.empty(r#"slur type="start" number="1""#);
    }
    if annotation.slur_end {
        w.empty(r#"slur type="stop" number="1""#);
    }
    if !articulations.is_empty() {
        w.open("articulations");
        for articulation in &articulations {
            w.empty(articulation.musicxml_name());
        }
        w.close("articulations");
    }
    if has_trill {
        w.open("ornaments");
        w.empty("trill-mark");
        w.close("ornaments");
    }
    if let Some(finger) = annotation.fingering {
        w.open("technical");
        w.leaf("fingering", finger);
        w.close("technical");
    }
    w.close("notations");
}

/// Fixed key-fifths table, C/Am = 0 through F#/D#m = +6 and Gb/Ebm = -6.
/// Unknown keys fall back to 0.
fn key_fifths(name: &str) -> i8 {
    match normalize_key(name).as_str() {
        "C" => 0,
        "G" => 1,
        "D" => 2,
        "A" => 3,
        "E" => 4,
        "B" => 5,
        "F#" => 6,
        "F" => -1,
        "Bb" => -2,
        "Eb" => -3,
        "Ab" => -4,
        "Db" => -5,
        "Gb" => -6,
        "Am" => 0,
        "Em" => 1,
        "Bm" => 2,
        "F#m" => 3,
        "C#m" => 4,
        "G#m" => 5,
        "D#m" => 6,
        "Dm" => -1,
        "Gm" => -2,
        "Cm" => -3,
        "Fm" => -4,
        "Bbm" => -5,
        "Ebm" => -6,
        _ => 0,
    }
}

fn key_mode(name: &str) -> &'static str {
    if normalize_key(name).ends_with('m') {
        "minor"
    } else {
        "major"
    }
}

/// Strip " major"/"maj" and collapse " minor"/"min" to a trailing `m`.
fn normalize_key(name: &str) -> String {
    let s = name.trim();
    let lower = s.to_lowercase();
    if let Some(stripped) = strip_suffix_ci(s, &lower, " major") {
        return stripped.trim_end().to_string();
    }
    if let Some(stripped) = strip_suffix_ci(s, &lower, "major") {
        return stripped.trim_end().to_string();
    }
    if let Some(stripped) = strip_suffix_ci(s, &lower, "maj") {
        return stripped.trim_end().to_string();
    }
    if let Some(stripped) = strip_suffix_ci(s, &lower, " minor") {
        return format!("{}m", stripped.trim_end());
    }
    if let Some(stripped) = strip_suffix_ci(s, &lower, "minor") {
        return format!("{}m", stripped.trim_end());
    }
    if let Some(stripped) = strip_suffix_ci(s, &lower, "min") {
        return format!("{}m", stripped.trim_end());
    }
    s.to_string()
}

fn strip_suffix_ci<'a>(original: &'a str, lower: &str, suffix: &str) -> Option<&'a str> {
    if lower.ends_with(suffix) {
        Some(&original[..original.len() - suffix.len()])
    } else {
        None
    }
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
