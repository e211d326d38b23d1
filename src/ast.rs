use serde::Deserialize;

/// A half-open span in the source, with 1-based line/column of its start.
///
/// Composite nodes carry the span from their first to their last child.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

impl SourceLocation {
    /// Span covering `first` through `last`.
    pub fn merge(first: SourceLocation, last: SourceLocation) -> Self {
        Self {
            line: first.line,
            column: first.column,
            byte_start: first.byte_start,
            byte_end: last.byte_end,
        }
    }
}

/// Note names A through G
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NoteName {
    #[default]
    C,
    D,
    E,
    F,
    G,
    A,
    B,
}

impl NoteName {
    pub fn from_char(c: char) -> Option<Self> {
        match c {
            'C' => Some(NoteName::C),
            'D' => Some(NoteName::D),
            'E' => Some(NoteName::E),
            'F' => Some(NoteName::F),
            'G' => Some(NoteName::G),
            'A' => Some(NoteName::A),
            'B' => Some(NoteName::B),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NoteName::C => "C",
            NoteName::D => "D",
            NoteName::E => "E",
            NoteName::F => "F",
            NoteName::G => "G",
            NoteName::A => "A",
            NoteName::B => "B",
        }
    }
}

/// Accidentals: up to two sharps or two flats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Accidental {
    #[default]
    Natural,
    Sharp,
    DoubleSharp,
    Flat,
    DoubleFlat,
}

impl Accidental {
    /// Chromatic alteration in semitones, as MusicXML `<alter>` expects.
    pub fn alter(&self) -> i8 {
        match self {
            Accidental::Natural => 0,
            Accidental::Sharp => 1,
            Accidental::DoubleSharp => 2,
            Accidental::Flat => -1,
            Accidental::DoubleFlat => -2,
        }
    }

    /// MusicXML `<accidental>` label, if one should be printed.
    pub fn musicxml_name(&self) -> Option<&'static str> {
        match self {
            Accidental::Natural => None,
            Accidental::Sharp => Some("sharp"),
            Accidental::DoubleSharp => Some("double-sharp"),
            Accidental::Flat => Some("flat"),
            Accidental::DoubleFlat => Some("flat-flat"),
        }
    }

    /// Source spelling (`""`, `"#"`, `"##"`, `"b"`, `"bb"`).
    pub fn as_suffix(&self) -> &'static str {
        match self {
            Accidental::Natural => "",
            Accidental::Sharp => "#",
            Accidental::DoubleSharp => "##",
            Accidental::Flat => "b",
            Accidental::DoubleFlat => "bb",
        }
    }
}

/// A pitch: note letter, accidental, and absolute octave in 0..=8.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pitch {
    pub note: NoteName,
    pub accidental: Accidental,
    pub octave: u8,
    pub location: SourceLocation,
}

/// Note duration base, expressed as the source symbols `/1` through `/32`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurationBase {
    Whole,
    Half,
    #[default]
    Quarter,
    Eighth,
    Sixteenth,
    ThirtySecond,
}

impl DurationBase {
    /// Beats relative to a quarter note.
    pub fn beats(&self) -> f64 {
        match self {
            DurationBase::Whole => 4.0,
            DurationBase::Half => 2.0,
            DurationBase::Quarter => 1.0,
            DurationBase::Eighth => 0.5,
            DurationBase::Sixteenth => 0.25,
            DurationBase::ThirtySecond => 0.125,
        }
    }

    /// MusicXML type name
    pub fn musicxml_type(&self) -> &'static str {
        match self {
            DurationBase::Whole => "whole",
            DurationBase::Half => "half",
            DurationBase::Quarter => "quarter",
            DurationBase::Eighth => "eighth",
            DurationBase::Sixteenth => "16th",
            DurationBase::ThirtySecond => "32nd",
        }
    }

    pub fn from_denominator(d: u32) -> Option<Self> {
        match d {
            1 => Some(DurationBase::Whole),
            2 => Some(DurationBase::Half),
            4 => Some(DurationBase::Quarter),
            8 => Some(DurationBase::Eighth),
            16 => Some(DurationBase::Sixteenth),
            32 => Some(DurationBase::ThirtySecond),
            _ => None,
        }
    }
}

/// A duration: base plus dot count.
///
/// Durations are plain values rather than located nodes: most elements
/// inherit theirs from the sticky current duration, which has no span of its
/// own. The owning element's span covers an explicit duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Duration {
    pub base: DurationBase,
    pub dots: u8,
}

impl Duration {
    pub fn new(base: DurationBase, dots: u8) -> Self {
        Self { base, dots }
    }

    /// Beats relative to a quarter note, with the dotted extension
    /// `d0 + d0/2 + d0/4` truncated at the dot count.
    pub fn beats(&self) -> f64 {
        let base = self.base.beats();
        let mut total = base;
        if self.dots >= 1 {
            total += base / 2.0;
        }
        if self.dots >= 2 {
            total += base / 4.0;
        }
        total
    }

    /// MusicXML divisions at 4 per quarter note.
    pub fn divisions(&self) -> u32 {
        (self.beats() * 4.0).round() as u32
    }
}

/// Dynamic markings, from pianississimo through sforzando.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dynamic {
    Ppp,
    Pp,
    P,
    Mp,
    Mf,
    F,
    Ff,
    Fff,
    Fp,
    Sfz,
}

impl Dynamic {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "ppp" => Some(Dynamic::Ppp),
            "pp" => Some(Dynamic::Pp),
            "p" => Some(Dynamic::P),
            "mp" => Some(Dynamic::Mp),
            "mf" => Some(Dynamic::Mf),
            "f" => Some(Dynamic::F),
            "ff" => Some(Dynamic::Ff),
            "fff" => Some(Dynamic::Fff),
            "fp" => Some(Dynamic::Fp),
            "sfz" => Some(Dynamic::Sfz),
            _ => None,
        }
    }

    /// MusicXML element name inside `<dynamics>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dynamic::Ppp => "ppp",
            Dynamic::Pp => "pp",
            Dynamic::P => "p",
            Dynamic::Mp => "mp",
            Dynamic::Mf => "mf",
            Dynamic::F => "f",
            Dynamic::Ff => "ff",
            Dynamic::Fff => "fff",
            Dynamic::Fp => "fp",
            Dynamic::Sfz => "sfz",
        }
    }
}

/// Articulations and ornaments applicable to a note or chord.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Articulation {
    Staccato,  // st
    Tenuto,    // tn
    Accent,    // ac
    Marcato,   // mc
    Fermata,   // fm
    Trill,     // tr
}

impl Articulation {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "st" => Some(Articulation::Staccato),
            "tn" => Some(Articulation::Tenuto),
            "ac" => Some(Articulation::Accent),
            "mc" => Some(Articulation::Marcato),
            "fm" => Some(Articulation::Fermata),
            "tr" => Some(Articulation::Trill),
            _ => None,
        }
    }

    /// MusicXML element name inside `<articulations>`. Trill is emitted as
    /// an ornament instead.
    pub fn musicxml_name(&self) -> &'static str {
        match self {
            Articulation::Staccato => "staccato",
            Articulation::Tenuto => "tenuto",
            Articulation::Accent => "accent",
            Articulation::Marcato => "strong-accent",
            Articulation::Fermata => "fermata",
            Articulation::Trill => "trill-mark",
        }
    }
}

/// Whether a wedge (crescendo/decrescendo hairpin) opens or closes here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WedgeEvent {
    Start,
    End,
}

/// Optional expressive markings attached to a note or chord.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Annotation {
    pub dynamic: Option<Dynamic>,
    pub articulations: Vec<Articulation>,
    pub fingering: Option<u8>,
    pub text: Option<String>,
    pub crescendo: Option<WedgeEvent>,
    pub decrescendo: Option<WedgeEvent>,
    pub slur_start: bool,
    pub slur_end: bool,
    pub pedal_start: bool,
    pub pedal_end: bool,
}

impl Annotation {
    pub fn is_empty(&self) -> bool {
        self.dynamic.is_none()
            && self.articulations.is_empty()
            && self.fingering.is_none()
            && self.text.is_none()
            && self.crescendo.is_none()
            && self.decrescendo.is_none()
            && !self.slur_start
            && !self.slur_end
            && !self.pedal_start
            && !self.pedal_end
    }
}

/// A single note.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub pitch: Pitch,
    pub duration: Duration,
    pub tied: bool,
    pub beamed: bool,
    pub grace: bool,
    pub annotation: Option<Annotation>,
    pub location: SourceLocation,
}

/// A rest.
#[derive(Debug, Clone, PartialEq)]
pub struct Rest {
    pub duration: Duration,
    pub location: SourceLocation,
}

/// Simultaneous pitches sharing one duration.
#[derive(Debug, Clone, PartialEq)]
pub struct Chord {
    pub pitches: Vec<Pitch>,
    pub duration: Duration,
    pub tied: bool,
    pub annotation: Option<Annotation>,
    pub location: SourceLocation,
}

/// An element in a measure.
#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    Note(Note),
    Rest(Rest),
    Chord(Chord),
}

impl Element {
    pub fn location(&self) -> SourceLocation {
        match self {
            Element::Note(n) => n.location,
            Element::Rest(r) => r.location,
            Element::Chord(c) => c.location,
        }
    }

    pub fn duration(&self) -> Duration {
        match self {
            Element::Note(n) => n.duration,
            Element::Rest(r) => r.duration,
            Element::Chord(c) => c.duration,
        }
    }

    /// Beats this element occupies within a measure.
    pub fn beats(&self) -> f64 {
        self.duration().beats()
    }

    /// The element's annotation, materialized on first access. Rests carry
    /// no annotation and return `None`.
    pub fn annotation_mut(&mut self) -> Option<&mut Annotation> {
        match self {
            Element::Note(n) => Some(n.annotation.get_or_insert_with(Annotation::default)),
            Element::Chord(c) => Some(c.annotation.get_or_insert_with(Annotation::default)),
            Element::Rest(_) => None,
        }
    }

    pub fn annotation(&self) -> Option<&Annotation> {
        match self {
            Element::Note(n) => n.annotation.as_ref(),
            Element::Chord(c) => c.annotation.as_ref(),
            Element::Rest(_) => None,
        }
    }

    pub fn set_tied(&mut self) {
        match self {
            Element::Note(n) => n.tied = true,
            Element::Chord(c) => c.tied = true,
            Element::Rest(_) => {}
        }
    }
}

/// Barline closing a measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Barline {
    #[default]
    Regular,
    Final,
}

/// Attributes emitted at the start of a measure.
///
/// Non-empty only on the first measure of a staff or where a mid-score
/// context change altered the key or time for that staff; only the changed
/// fields are set in the latter case.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeasureAttributes {
    pub key: Option<String>,
    pub time: Option<TimeSignature>,
    pub clef: Option<Clef>,
}

impl MeasureAttributes {
    pub fn is_empty(&self) -> bool {
        self.key.is_none() && self.time.is_none() && self.clef.is_none()
    }
}

/// A bounded span of music within a staff.
#[derive(Debug, Clone, PartialEq)]
pub struct Measure {
    pub elements: Vec<Element>,
    pub barline: Barline,
    pub attributes: Option<MeasureAttributes>,
}

/// Clefs supported by stave declarations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Clef {
    #[default]
    Treble,
    Bass,
    Alto,
    Tenor,
    Treble8,
    Bass8,
}

impl Clef {
    /// Unknown clef strings default to treble.
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "bass" => Clef::Bass,
            "alto" => Clef::Alto,
            "tenor" => Clef::Tenor,
            "treble-8" => Clef::Treble8,
            "bass-8" => Clef::Bass8,
            _ => Clef::Treble,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Clef::Treble => "treble",
            Clef::Bass => "bass",
            Clef::Alto => "alto",
            Clef::Tenor => "tenor",
            Clef::Treble8 => "treble-8",
            Clef::Bass8 => "bass-8",
        }
    }

    pub fn sign(&self) -> &'static str {
        match self {
            Clef::Treble | Clef::Treble8 => "G",
            Clef::Bass | Clef::Bass8 => "F",
            Clef::Alto | Clef::Tenor => "C",
        }
    }

    pub fn line(&self) -> u8 {
        match self {
            Clef::Treble | Clef::Treble8 => 2,
            Clef::Bass | Clef::Bass8 => 4,
            Clef::Alto => 3,
            Clef::Tenor => 4,
        }
    }

    /// Octave displacement for the `-8` clef variants.
    pub fn octave_change(&self) -> Option<i8> {
        match self {
            Clef::Treble8 | Clef::Bass8 => Some(-1),
            _ => None,
        }
    }
}

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub beats: u8,
    pub beat_type: u8,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            beat_type: 4,
        }
    }
}

/// A stave declared in a context block.
#[derive(Debug, Clone, PartialEq)]
pub struct StaveDecl {
    pub name: String,
    pub clef: Clef,
    pub voice: Option<String>,
}

/// Document metadata from the first context block.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub key: Option<String>,
    pub time: Option<TimeSignature>,
    pub tempo: Option<u16>,
    pub default_octave: u8,
    pub staves: Vec<StaveDecl>,
}

impl Default for Metadata {
    fn default() -> Self {
        Self {
            title: None,
            composer: None,
            key: None,
            time: None,
            tempo: None,
            default_octave: 4,
            staves: Vec::new(),
        }
    }
}

/// Raw context-block content for YAML deserialization.
///
/// Stave declarations (`&`-prefixed keys, quoted by a preprocessing step)
/// land in `staves`, which preserves their declaration order.
#[derive(Deserialize, Debug, Default)]
pub(crate) struct RawContext {
    pub title: Option<String>,
    pub composer: Option<String>,
    pub key: Option<String>,
    pub time: Option<String>,
    pub tempo: Option<u16>,
    pub octave: Option<i64>,
    #[serde(flatten)]
    pub staves: serde_yaml::Mapping,
}

/// One horizontal musical line; a part in MusicXML terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Staff {
    pub name: String,
    pub clef: Clef,
    pub measures: Vec<Measure>,
}

/// A complete musical score.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Score {
    pub metadata: Metadata,
    pub staves: Vec<Staff>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duration_beats() {
        assert_eq!(Duration::new(DurationBase::Whole, 0).beats(), 4.0);
        assert_eq!(Duration::new(DurationBase::Half, 0).beats(), 2.0);
        assert_eq!(Duration::new(DurationBase::Quarter, 0).beats(), 1.0);
        assert_eq!(Duration::new(DurationBase::Eighth, 0).beats(), 0.5);
        assert_eq!(Duration::new(DurationBase::ThirtySecond, 0).beats(), 0.125);
    }

    #[test]
    fn test_dotted_duration_beats() {
        assert_eq!(Duration::new(DurationBase::Quarter, 1).beats(), 1.5);
        assert_eq!(Duration::new(DurationBase::Quarter, 2).beats(), 1.75);
        assert_eq!(Duration::new(DurationBase::Half, 1).beats(), 3.0);
    }

    #[test]
    fn test_duration_divisions() {
        assert_eq!(Duration::new(DurationBase::Quarter, 0).divisions(), 4);
        assert_eq!(Duration::new(DurationBase::Half, 0).divisions(), 8);
        assert_eq!(Duration::new(DurationBase::Eighth, 1).divisions(), 3);
        assert_eq!(Duration::new(DurationBase::Quarter, 2).divisions(), 7);
    }

    #[test]
    fn test_accidental_alter() {
        assert_eq!(Accidental::Sharp.alter(), 1);
        assert_eq!(Accidental::DoubleSharp.alter(), 2);
        assert_eq!(Accidental::Flat.alter(), -1);
        assert_eq!(Accidental::DoubleFlat.alter(), -2);
        assert_eq!(Accidental::Natural.alter(), 0);
    }

    #[test]
    fn test_clef_sign_and_line() {
        assert_eq!(Clef::Treble.sign(), "G");
        assert_eq!(Clef::Treble.line(), 2);
        assert_eq!(Clef::Bass.sign(), "F");
        assert_eq!(Clef::Bass.line(), 4);
        assert_eq!(Clef::Alto.sign(), "C");
        assert_eq!(Clef::Alto.line(), 3);
        assert_eq!(Clef::Tenor.sign(), "C");
        assert_eq!(Clef::Tenor.line(), 4);
    }

    #[test]
    fn test_unknown_clef_defaults_to_treble() {
        assert_eq!(Clef::from_name("mezzo"), Clef::Treble);
    }

    #[test]
    fn test_annotation_is_empty() {
        let mut annotation = Annotation::default();
        assert!(annotation.is_empty());
        annotation.slur_start = true;
        assert!(!annotation.is_empty());
    }
}
