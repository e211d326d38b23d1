//! # Parser
//!
//! Parses tokens from the lexer into a [`Score`] AST.
//!
//! ## Phases
//!
//! ### Phase A: Context blocks
//! `---`-delimited blocks are decoded as YAML after a preprocessing step
//! quotes `&`-prefixed stave keys. The first block populates the score
//! metadata (title, composer, key, time, tempo, default octave, stave
//! declarations); later blocks update the active key/time mid-score and may
//! declare additional staves.
//!
//! ### Phase B: Stave bodies
//! `&name { … }` bodies are parsed by recursive descent into a flat element
//! list: notes with sticky durations and relative octaves, rests, chords,
//! beam groups, inline function calls, and connectives (`~`, `^`, `*`). An
//! optional trailing `{ … }` annotation block applies `fn(range, args…)`
//! calls to the flat list by 1-based index.
//!
//! ### Phase C: Measure partitioning
//! The flat list is split into measures against the staff's active time
//! signature. A single element is never split; the final measure may be
//! incomplete. The first measure of a body carries attributes when the staff
//! is new (full key/time/clef) or when a context change altered its key or
//! time (changed fields only).
//!
//! ## Failure semantics
//! Stray tokens are skipped without diagnostics. The whole parse runs under
//! a last-ditch guard: an internal panic is caught and recorded as an
//! "Unknown parse error" at the current token, with no AST returned.

use crate::ast::*;
use crate::error::{Diagnostic, ScoreError};
use crate::lexer::{tokenize, Token, TokenKind};
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Result of parsing a source string.
///
/// `ast` is absent only when the internal guard caught a failure.
pub struct ParseResult {
    pub ast: Option<Score>,
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
}

/// Per-staff key/time context used to detect mid-score changes.
struct StaffContext {
    key: Option<String>,
    time: TimeSignature,
    started: bool,
}

/// Argument of an annotation-block call.
enum Arg {
    Number(usize),
    Range(usize, usize),
    Text(String),
}

const BOUNDARY_EPS: f64 = 1e-6;

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
    errors: Vec<Diagnostic>,
    warnings: Vec<Diagnostic>,
    metadata: Metadata,
    seen_context: bool,
    active_key: Option<String>,
    active_time: TimeSignature,
    current_duration: Duration,
    staves: Vec<Staff>,
    staff_index: HashMap<String, usize>,
    contexts: HashMap<String, StaffContext>,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            metadata: Metadata::default(),
            seen_context: false,
            active_key: None,
            active_time: TimeSignature::default(),
            current_duration: Duration::default(),
            staves: Vec::new(),
            staff_index: HashMap::new(),
            contexts: HashMap::new(),
        }
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn kind(&self) -> TokenKind {
        self.current().map(|t| t.kind).unwrap_or(TokenKind::Eof)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn take(&mut self) -> Token {
        let token = self.tokens.get(self.position).cloned().unwrap_or(Token {
            kind: TokenKind::Eof,
            text: String::new(),
            line: 1,
            column: 1,
            byte_start: 0,
            byte_end: 0,
        });
        self.position += 1;
        token
    }

    fn skip_trivia(&mut self) {
        while matches!(
            self.kind(),
            TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment
        ) {
            self.advance();
        }
    }

    fn current_position(&self) -> (usize, usize) {
        let idx = self.position.min(self.tokens.len().saturating_sub(1));
        self.tokens
            .get(idx)
            .map(|t| (t.line, t.column))
            .unwrap_or((1, 1))
    }

    fn parse_score(&mut self) -> Score {
        loop {
            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::ContextDelim => self.parse_context_block(),
                TokenKind::StaveDecl => self.parse_stave_entry(),
                _ => self.advance(),
            }
        }
        let metadata = std::mem::take(&mut self.metadata);
        let staves = self.finalize_staves(&metadata);
        Score { metadata, staves }
    }

    /// Reorder staves to declaration order, then first-use order for
    /// undeclared ones, and mark each staff's closing barline.
    fn finalize_staves(&mut self, metadata: &Metadata) -> Vec<Staff> {
        let mut staves = std::mem::take(&mut self.staves);
        let mut ordered = Vec::with_capacity(staves.len());
        for decl in &metadata.staves {
            if let Some(pos) = staves.iter().position(|s| s.name == decl.name) {
                ordered.push(staves.remove(pos));
            }
        }
        ordered.extend(staves);
        for staff in &mut ordered {
            if let Some(last) = staff.measures.last_mut() {
                last.barline = Barline::Final;
            }
        }
        ordered
    }

    // ---- Phase A: context blocks -------------------------------------

    fn parse_context_block(&mut self) {
        let delim = self.take();
        let mut lines: Vec<String> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::YamlContent => lines.push(self.take().text),
                TokenKind::Newline | TokenKind::Whitespace => self.advance(),
                TokenKind::ContextDelim => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                _ => self.advance(),
            }
        }
        let content = lines.join("\n");
        if content.trim().is_empty() {
            return;
        }
        match decode_context(&content) {
            Ok(raw) => self.apply_context(raw, delim.line, delim.column),
            Err(err) => self
                .errors
                .push(Diagnostic::error(err.to_string(), delim.line, delim.column)),
        }
    }

    fn apply_context(&mut self, raw: RawContext, line: usize, column: usize) {
        let first = !self.seen_context;
        self.seen_context = true;

        if first {
            self.metadata.title = raw.title;
            self.metadata.composer = raw.composer;
            self.metadata.key = raw.key.clone();
            self.metadata.tempo = raw.tempo;
            if let Some(octave) = raw.octave {
                self.metadata.default_octave = octave.clamp(0, 8) as u8;
            }
            if let Some(time) = &raw.time {
                match parse_time_signature(time) {
                    Ok(ts) => self.metadata.time = Some(ts),
                    Err(err) => self
                        .errors
                        .push(Diagnostic::error(err.to_string(), line, column)),
                }
            }
            self.active_key = self.metadata.key.clone();
            if let Some(ts) = self.metadata.time {
                self.active_time = ts;
            }
        } else {
            if let Some(key) = raw.key {
                self.active_key = Some(key);
            }
            if let Some(time) = &raw.time {
                match parse_time_signature(time) {
                    Ok(ts) => self.active_time = ts,
                    Err(err) => self
                        .errors
                        .push(Diagnostic::error(err.to_string(), line, column)),
                }
            }
        }

        for (key, value) in &raw.staves {
            let Some(key) = key.as_str() else { continue };
            let Some(name) = key.strip_prefix('&') else { continue };
            if self.metadata.staves.iter().any(|d| d.name == name) {
                continue;
            }
            let decl = stave_decl_from_value(name, value);
            self.ensure_staff(&decl.name, decl.clef);
            self.metadata.staves.push(decl);
        }
    }

    fn ensure_staff(&mut self, name: &str, clef: Clef) -> usize {
        if let Some(&idx) = self.staff_index.get(name) {
            return idx;
        }
        let idx = self.staves.len();
        self.staves.push(Staff {
            name: name.to_string(),
            clef,
            measures: Vec::new(),
        });
        self.staff_index.insert(name.to_string(), idx);
        self.contexts.insert(
            name.to_string(),
            StaffContext {
                key: None,
                time: self.active_time,
                started: false,
            },
        );
        idx
    }

    // ---- Phase B: stave bodies ---------------------------------------

    fn parse_stave_entry(&mut self) {
        let decl = self.take();
        let name = decl.text.trim_start_matches('&').to_string();
        self.skip_trivia();
        if self.kind() != TokenKind::StaveBodyStart {
            return;
        }
        self.advance();
        self.current_duration = Duration::default();
        let mut elements = self.parse_element_group(TokenKind::StaveBodyEnd);
        if self.kind() == TokenKind::StaveBodyEnd {
            self.advance();
        }
        self.skip_trivia();
        if self.kind() == TokenKind::AnnotationBlockStart {
            self.parse_annotation_block(&mut elements);
        }
        let clef = self
            .metadata
            .staves
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.clef)
            .unwrap_or_default();
        let staff_idx = self.ensure_staff(&name, clef);
        self.partition_body(staff_idx, elements);
    }

    fn parse_element_group(&mut self, end: TokenKind) -> Vec<Element> {
        let mut elements: Vec<Element> = Vec::new();
        let mut pending_slur_end = false;
        let mut pedal_open = false;

        loop {
            let kind = self.kind();
            if kind == end || kind == TokenKind::Eof || kind == TokenKind::StaveBodyEnd {
                break;
            }
            match kind {
                TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment => self.advance(),
                TokenKind::Note => {
                    let note = self.parse_note(false);
                    self.push_element(&mut elements, Element::Note(note), &mut pending_slur_end);
                }
                TokenKind::Grace => {
                    self.advance();
                    self.skip_trivia();
                    if self.kind() == TokenKind::Note {
                        let note = self.parse_note(true);
                        self.push_element(&mut elements, Element::Note(note), &mut pending_slur_end);
                    }
                }
                TokenKind::Rest => {
                    let rest = self.parse_rest();
                    self.push_element(&mut elements, Element::Rest(rest), &mut pending_slur_end);
                }
                TokenKind::ChordStart => {
                    let chord = self.parse_chord();
                    self.push_element(&mut elements, Element::Chord(chord), &mut pending_slur_end);
                }
                TokenKind::BeamStart => {
                    self.advance();
                    let mut group = self.parse_element_group(TokenKind::ParenClose);
                    if self.kind() == TokenKind::ParenClose {
                        self.advance();
                    }
                    for element in &mut group {
                        if let Element::Note(note) = element {
                            note.beamed = true;
                        }
                    }
                    elements.extend(group);
                }
                TokenKind::Function => {
                    let call = self.take();
                    self.skip_trivia();
                    if self.kind() == TokenKind::ParenOpen {
                        self.advance();
                        let mut group = self.parse_element_group(TokenKind::ParenClose);
                        if self.kind() == TokenKind::ParenClose {
                            self.advance();
                        }
                        self.apply_inline_function(&call, &mut group);
                        elements.extend(group);
                    }
                }
                TokenKind::Slur => {
                    self.advance();
                    if let Some(last) = elements.last_mut() {
                        if let Some(annotation) = last.annotation_mut() {
                            annotation.slur_start = true;
                        }
                        pending_slur_end = true;
                    }
                }
                TokenKind::Tie => {
                    self.advance();
                    if let Some(last) = elements.last_mut() {
                        last.set_tied();
                    }
                }
                TokenKind::Pedal => {
                    self.advance();
                    if let Some(last) = elements.last_mut() {
                        if let Some(annotation) = last.annotation_mut() {
                            if pedal_open {
                                annotation.pedal_end = true;
                            } else {
                                annotation.pedal_start = true;
                            }
                            pedal_open = !pedal_open;
                        }
                    }
                }
                TokenKind::Duration => {
                    let token = self.take();
                    self.current_duration = duration_from_text(&token.text);
                }
                _ => self.advance(),
            }
        }
        elements
    }

    fn push_element(
        &mut self,
        elements: &mut Vec<Element>,
        mut element: Element,
        pending_slur_end: &mut bool,
    ) {
        if *pending_slur_end && !matches!(element, Element::Rest(_)) {
            if let Some(annotation) = element.annotation_mut() {
                annotation.slur_end = true;
            }
            *pending_slur_end = false;
        }
        elements.push(element);
    }

    fn parse_note(&mut self, grace: bool) -> Note {
        let token = self.take();
        let (name, accidental, explicit_octave) = split_note_text(&token.text);
        let mut location = token.location();
        let pitch_location = token.location();

        let mut octave = explicit_octave
            .map(|o| o as i32)
            .unwrap_or(self.metadata.default_octave as i32);
        let mut modified = false;
        while self.kind() == TokenKind::OctaveMod {
            let modifier = self.take();
            octave += octave_delta(&modifier.text);
            modified = true;
            location = SourceLocation::merge(location, modifier.location());
        }
        // Relative arithmetic saturates; a bare explicit digit is left for
        // the validator to judge.
        if modified {
            octave = octave.clamp(0, 8);
        }
        let octave = octave.clamp(0, 9) as u8;

        let mut duration = self.current_duration;
        if self.kind() == TokenKind::Duration {
            let token = self.take();
            duration = duration_from_text(&token.text);
            self.current_duration = duration;
            location = SourceLocation::merge(location, token.location());
        }

        let mut annotation = None;
        if self.kind() == TokenKind::Fingering {
            let token = self.take();
            let finger = token.text[1..].parse().unwrap_or(0);
            annotation = Some(Annotation {
                fingering: Some(finger),
                ..Annotation::default()
            });
            location = SourceLocation::merge(location, token.location());
        }

        Note {
            pitch: Pitch {
                note: name,
                accidental,
                octave,
                location: pitch_location,
            },
            duration,
            tied: false,
            beamed: false,
            grace,
            annotation,
            location,
        }
    }

    fn parse_rest(&mut self) -> Rest {
        let token = self.take();
        let mut location = token.location();
        let mut duration = self.current_duration;
        if self.kind() == TokenKind::Duration {
            let token = self.take();
            duration = duration_from_text(&token.text);
            self.current_duration = duration;
            location = SourceLocation::merge(location, token.location());
        }
        Rest { duration, location }
    }

    fn parse_chord(&mut self) -> Chord {
        let open = self.take();
        let mut location = open.location();
        let mut pitches = Vec::new();

        loop {
            match self.kind() {
                TokenKind::ChordEnd | TokenKind::Eof | TokenKind::StaveBodyEnd => break,
                TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment => self.advance(),
                TokenKind::Note => {
                    let token = self.take();
                    let (name, accidental, explicit_octave) = split_note_text(&token.text);
                    let mut pitch_location = token.location();
                    let mut octave = explicit_octave
                        .map(|o| o as i32)
                        .unwrap_or(self.metadata.default_octave as i32);
                    let mut modified = false;
                    while self.kind() == TokenKind::OctaveMod {
                        let modifier = self.take();
                        octave += octave_delta(&modifier.text);
                        modified = true;
                        pitch_location =
                            SourceLocation::merge(pitch_location, modifier.location());
                    }
                    if modified {
                        octave = octave.clamp(0, 8);
                    }
                    pitches.push(Pitch {
                        note: name,
                        accidental,
                        octave: octave.clamp(0, 9) as u8,
                        location: pitch_location,
                    });
                }
                _ => self.advance(),
            }
        }
        if self.kind() == TokenKind::ChordEnd {
            let close = self.take();
            location = SourceLocation::merge(location, close.location());
        }

        let mut duration = self.current_duration;
        if self.kind() == TokenKind::Duration {
            let token = self.take();
            duration = duration_from_text(&token.text);
            self.current_duration = duration;
            location = SourceLocation::merge(location, token.location());
        }

        Chord {
            pitches,
            duration,
            tied: false,
            annotation: None,
            location,
        }
    }

    /// Apply an inline function to the elements captured between its parens.
    fn apply_inline_function(&mut self, call: &Token, group: &mut [Element]) {
        let name = call.text.as_str();
        let targets: Vec<usize> = group
            .iter()
            .enumerate()
            .filter(|(_, e)| !matches!(e, Element::Rest(_)))
            .map(|(i, _)| i)
            .collect();
        if targets.is_empty() {
            return;
        }
        let first = targets[0];
        let last = targets[targets.len() - 1];

        if let Some(dynamic) = Dynamic::from_name(name) {
            if let Some(annotation) = group[first].annotation_mut() {
                annotation.dynamic = Some(dynamic);
            }
            return;
        }
        if let Some(articulation) = Articulation::from_name(name) {
            for &i in &targets {
                if let Some(annotation) = group[i].annotation_mut() {
                    annotation.articulations.push(articulation);
                }
            }
            return;
        }
        match name {
            "slur" | "legato" => {
                if let Some(annotation) = group[first].annotation_mut() {
                    annotation.slur_start = true;
                }
                if let Some(annotation) = group[last].annotation_mut() {
                    annotation.slur_end = true;
                }
            }
            "cresc" | "crescendo" | "<" => {
                if let Some(annotation) = group[first].annotation_mut() {
                    annotation.crescendo = Some(WedgeEvent::Start);
                }
                if let Some(annotation) = group[last].annotation_mut() {
                    annotation.crescendo = Some(WedgeEvent::End);
                }
            }
            "decresc" | "decrescendo" | "dim" | ">" => {
                if let Some(annotation) = group[first].annotation_mut() {
                    annotation.decrescendo = Some(WedgeEvent::Start);
                }
                if let Some(annotation) = group[last].annotation_mut() {
                    annotation.decrescendo = Some(WedgeEvent::End);
                }
            }
            _ => self.warnings.push(Diagnostic::warning(
                format!("unknown annotation function `{name}`"),
                call.line,
                call.column,
            )),
        }
    }

    // ---- Annotation blocks -------------------------------------------

    fn parse_annotation_block(&mut self, elements: &mut [Element]) {
        self.advance(); // {
        loop {
            match self.kind() {
                TokenKind::AnnotationBlockEnd => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                TokenKind::Function => self.parse_annotation_call(elements),
                _ => self.advance(),
            }
        }
    }

    fn parse_annotation_call(&mut self, elements: &mut [Element]) {
        let call = self.take();
        self.skip_trivia();
        if self.kind() != TokenKind::ParenOpen {
            return;
        }
        self.advance();
        let mut args = Vec::new();
        loop {
            match self.kind() {
                TokenKind::ParenClose => {
                    self.advance();
                    break;
                }
                TokenKind::Eof | TokenKind::AnnotationBlockEnd => break,
                TokenKind::Number => {
                    let token = self.take();
                    args.push(Arg::Number(token.text.parse().unwrap_or(0)));
                }
                TokenKind::Range => {
                    let token = self.take();
                    let (lo, hi) = token
                        .text
                        .split_once('-')
                        .map(|(a, b)| (a.parse().unwrap_or(0), b.parse().unwrap_or(0)))
                        .unwrap_or((0, 0));
                    args.push(Arg::Range(lo, hi));
                }
                TokenKind::String => {
                    let token = self.take();
                    args.push(Arg::Text(token.text.trim_matches('"').to_string()));
                }
                _ => self.advance(),
            }
        }
        self.apply_annotation_call(&call, &args, elements);
    }

    /// Apply one `fn(range, args…)` call to the body's flat element list.
    fn apply_annotation_call(&mut self, call: &Token, args: &[Arg], elements: &mut [Element]) {
        let (lo, hi) = match args.first() {
            Some(Arg::Number(n)) => (*n, *n),
            Some(Arg::Range(lo, hi)) => (*lo, *hi),
            _ => return,
        };
        if elements.is_empty() {
            return;
        }
        let lo = lo.max(1);
        let hi = hi.min(elements.len());
        if lo > hi {
            return;
        }
        let range = (lo - 1)..hi;
        let name = call.text.as_str();

        if let Some(dynamic) = Dynamic::from_name(name) {
            for element in &mut elements[range] {
                if let Some(annotation) = element.annotation_mut() {
                    annotation.dynamic = Some(dynamic);
                }
            }
            return;
        }
        if let Some(articulation) = Articulation::from_name(name) {
            for element in &mut elements[range] {
                if let Some(annotation) = element.annotation_mut() {
                    annotation.articulations.push(articulation);
                }
            }
            return;
        }
        match name {
            "cresc" | "crescendo" => {
                if let Some(annotation) = elements[lo - 1].annotation_mut() {
                    annotation.crescendo = Some(WedgeEvent::Start);
                }
                if let Some(annotation) = elements[hi - 1].annotation_mut() {
                    annotation.crescendo = Some(WedgeEvent::End);
                }
            }
            "decresc" | "decrescendo" | "dim" => {
                if let Some(annotation) = elements[lo - 1].annotation_mut() {
                    annotation.decrescendo = Some(WedgeEvent::Start);
                }
                if let Some(annotation) = elements[hi - 1].annotation_mut() {
                    annotation.decrescendo = Some(WedgeEvent::End);
                }
            }
            "slur" | "legato" => {
                if let Some(annotation) = elements[lo - 1].annotation_mut() {
                    annotation.slur_start = true;
                }
                if let Some(annotation) = elements[hi - 1].annotation_mut() {
                    annotation.slur_end = true;
                }
            }
            "pedal" => {
                if let Some(annotation) = elements[lo - 1].annotation_mut() {
                    annotation.pedal_start = true;
                }
                if let Some(annotation) = elements[hi - 1].annotation_mut() {
                    annotation.pedal_end = true;
                }
            }
            "tie" => {
                for element in &mut elements[range] {
                    element.set_tied();
                }
            }
            "finger" => {
                if let Some(Arg::Number(n)) = args.get(1) {
                    let finger = (*n).min(u8::MAX as usize) as u8;
                    for element in &mut elements[range] {
                        if let Some(annotation) = element.annotation_mut() {
                            annotation.fingering = Some(finger);
                        }
                    }
                }
            }
            "text" => {
                if let Some(Arg::Text(s)) = args.get(1) {
                    if let Some(annotation) = elements[lo - 1].annotation_mut() {
                        annotation.text = Some(s.clone());
                    }
                }
            }
            _ => self.warnings.push(Diagnostic::warning(
                format!("unknown annotation function `{name}`"),
                call.line,
                call.column,
            )),
        }
    }

    // ---- Phase C: measure partitioning -------------------------------

    fn partition_body(&mut self, staff_idx: usize, elements: Vec<Element>) {
        if elements.is_empty() {
            return;
        }
        let name = self.staves[staff_idx].name.clone();
        let clef = self.staves[staff_idx].clef;
        let active_key = self.active_key.clone();
        let active_time = self.active_time;

        let ctx = self.contexts.entry(name).or_insert_with(|| StaffContext {
            key: None,
            time: active_time,
            started: false,
        });
        let mut attrs = MeasureAttributes::default();
        if !ctx.started {
            ctx.started = true;
            ctx.key = active_key.clone();
            ctx.time = active_time;
            attrs = MeasureAttributes {
                key: active_key,
                time: Some(active_time),
                clef: Some(clef),
            };
        } else {
            if ctx.key != active_key {
                ctx.key = active_key.clone();
                attrs.key = active_key;
            }
            if ctx.time != active_time {
                ctx.time = active_time;
                attrs.time = Some(active_time);
            }
        }
        let capacity = ctx.time.beats as f64;

        let mut measures: Vec<Measure> = Vec::new();
        let mut current: Vec<Element> = Vec::new();
        let mut filled = 0.0;
        for element in elements {
            let beats = element.beats();
            if filled + beats > capacity + BOUNDARY_EPS && !current.is_empty() {
                measures.push(Measure {
                    elements: std::mem::take(&mut current),
                    barline: Barline::Regular,
                    attributes: None,
                });
                filled = 0.0;
            }
            filled += beats;
            current.push(element);
            if (filled - capacity).abs() <= BOUNDARY_EPS {
                measures.push(Measure {
                    elements: std::mem::take(&mut current),
                    barline: Barline::Regular,
                    attributes: None,
                });
                filled = 0.0;
            }
        }
        if !current.is_empty() {
            measures.push(Measure {
                elements: current,
                barline: Barline::Regular,
                attributes: None,
            });
        }
        if !attrs.is_empty() {
            if let Some(first) = measures.first_mut() {
                first.attributes = Some(attrs);
            }
        }
        self.staves[staff_idx].measures.extend(measures);
    }
}

fn decode_context(content: &str) -> Result<RawContext, ScoreError> {
    serde_yaml::from_str(&quote_stave_keys(content)).map_err(|e| ScoreError::Yaml(e.to_string()))
}

/// Quote `&name:` keys so a standard YAML decoder accepts them.
pub(crate) fn quote_stave_keys(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if let Some(rest) = trimmed.strip_prefix('&') {
                if let Some(colon) = rest.find(':') {
                    let indent = &line[..line.len() - trimmed.len()];
                    let key = &rest[..colon];
                    let value = &rest[colon + 1..];
                    return format!("{indent}\"&{key}\":{value}");
                }
            }
            line.to_string()
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn parse_time_signature(s: &str) -> Result<TimeSignature, ScoreError> {
    let parts: Vec<&str> = s.split('/').collect();
    if parts.len() != 2 {
        return Err(ScoreError::Metadata(format!("Invalid time signature: {s}")));
    }
    let beats: u8 = parts[0]
        .trim()
        .parse()
        .map_err(|_| ScoreError::Metadata(format!("Invalid time signature beats: {s}")))?;
    let beat_type: u8 = parts[1]
        .trim()
        .parse()
        .map_err(|_| ScoreError::Metadata(format!("Invalid time signature beat type: {s}")))?;
    if beats == 0 || !matches!(beat_type, 2 | 4 | 8 | 16) {
        return Err(ScoreError::Metadata(format!("Invalid time signature: {s}")));
    }
    Ok(TimeSignature { beats, beat_type })
}

fn stave_decl_from_value(name: &str, value: &serde_yaml::Value) -> StaveDecl {
    use serde_yaml::Value;
    match value {
        Value::String(clef) => StaveDecl {
            name: name.to_string(),
            clef: Clef::from_name(clef),
            voice: None,
        },
        Value::Mapping(map) => {
            let mut clef = Clef::default();
            let mut voice = None;
            for (k, v) in map {
                match k.as_str() {
                    Some("clef") => {
                        if let Some(s) = v.as_str() {
                            clef = Clef::from_name(s);
                        }
                    }
                    Some("voice") => {
                        voice = match v {
                            Value::String(s) => Some(s.clone()),
                            Value::Number(n) => Some(n.to_string()),
                            _ => None,
                        };
                    }
                    _ => {}
                }
            }
            StaveDecl {
                name: name.to_string(),
                clef,
                voice,
            }
        }
        _ => StaveDecl {
            name: name.to_string(),
            clef: Clef::default(),
            voice: None,
        },
    }
}

/// Split a NOTE token's text into letter, accidental, and explicit octave.
fn split_note_text(text: &str) -> (NoteName, Accidental, Option<u8>) {
    let mut chars = text.chars().peekable();
    let name = chars
        .next()
        .and_then(NoteName::from_char)
        .unwrap_or_default();
    let mut sharps = 0;
    let mut flats = 0;
    while let Some(&c) = chars.peek() {
        match c {
            '#' => {
                sharps += 1;
                chars.next();
            }
            'b' => {
                flats += 1;
                chars.next();
            }
            _ => break,
        }
    }
    let accidental = match (sharps, flats) {
        (1, 0) => Accidental::Sharp,
        (2, 0) => Accidental::DoubleSharp,
        (0, 1) => Accidental::Flat,
        (0, 2) => Accidental::DoubleFlat,
        _ => Accidental::Natural,
    };
    let octave = chars.next().and_then(|c| c.to_digit(10)).map(|d| d as u8);
    (name, accidental, octave)
}

fn octave_delta(text: &str) -> i32 {
    match text {
        "+" => 1,
        "++" => 2,
        "-" => -1,
        "--" => -2,
        _ => 0,
    }
}

fn duration_from_text(text: &str) -> Duration {
    if text == "." {
        return Duration::new(DurationBase::Quarter, 1);
    }
    let body = text.strip_prefix('/').unwrap_or(text);
    let digits: String = body.chars().take_while(|c| c.is_ascii_digit()).collect();
    let dots = body[digits.len()..].chars().filter(|&c| c == '.').count() as u8;
    let base = digits
        .parse()
        .ok()
        .and_then(DurationBase::from_denominator)
        .unwrap_or_default();
    Duration::new(base, dots)
}

/// Main parsing function
pub fn parse(source: &str) -> ParseResult {
    let lexed = tokenize(source);
    let mut parser = Parser::new(lexed.tokens);
    parser.errors.extend(lexed.errors);

    let outcome = catch_unwind(AssertUnwindSafe(|| parser.parse_score()));
    match outcome {
        Ok(score) => ParseResult {
            ast: Some(score),
            errors: std::mem::take(&mut parser.errors),
            warnings: std::mem::take(&mut parser.warnings),
        },
        Err(_) => {
            let (line, column) = parser.current_position();
            let mut errors = std::mem::take(&mut parser.errors);
            errors.push(Diagnostic::error("Unknown parse error", line, column));
            ParseResult {
                ast: None,
                errors,
                warnings: std::mem::take(&mut parser.warnings),
            }
        }
    }
}
