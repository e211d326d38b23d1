use crate::ast::*;
use crate::error::{Diagnostic, Severity};
use std::collections::HashSet;

/// Result of validating a score.
pub struct ValidationResult {
    pub valid: bool,
    pub diagnostics: Vec<Diagnostic>,
}

/// Validate a score, reporting semantic problems without changing the AST.
///
/// Beat totals are not re-checked here: measure partitioning is the source
/// of truth for measure contents.
pub fn validate(score: &Score) -> ValidationResult {
    let mut diagnostics = Vec::new();

    let declared: HashSet<&str> = score
        .metadata
        .staves
        .iter()
        .map(|d| d.name.as_str())
        .collect();

    for staff in &score.staves {
        if !score.metadata.staves.is_empty() && !declared.contains(staff.name.as_str()) {
            let (line, column) = staff
                .measures
                .first()
                .and_then(|m| m.elements.first())
                .map(|e| {
                    let loc = e.location();
                    (loc.line, loc.column)
                })
                .unwrap_or((1, 1));
            diagnostics.push(Diagnostic::warning(
                format!("Stave `{}` is used but not declared", staff.name),
                line,
                column,
            ));
        }
        for measure in &staff.measures {
            for element in &measure.elements {
                validate_element(element, &mut diagnostics);
            }
        }
    }

    let valid = !diagnostics.iter().any(|d| d.severity == Severity::Error);
    ValidationResult { valid, diagnostics }
}

fn validate_element(element: &Element, diagnostics: &mut Vec<Diagnostic>) {
    match element {
        Element::Note(note) => {
            validate_pitch(&note.pitch, diagnostics);
            validate_duration(&note.duration, note.location, diagnostics);
            validate_annotation(note.annotation.as_ref(), note.location, diagnostics);
        }
        Element::Rest(rest) => {
            validate_duration(&rest.duration, rest.location, diagnostics);
        }
        Element::Chord(chord) => {
            if chord.pitches.is_empty() {
                diagnostics.push(Diagnostic::error(
                    "Chord has no pitches",
                    chord.location.line,
                    chord.location.column,
                ));
            }
            for pitch in &chord.pitches {
                validate_pitch(pitch, diagnostics);
            }
            validate_duration(&chord.duration, chord.location, diagnostics);
            validate_annotation(chord.annotation.as_ref(), chord.location, diagnostics);
        }
    }
}

fn validate_pitch(pitch: &Pitch, diagnostics: &mut Vec<Diagnostic>) {
    if pitch.octave > 8 {
        diagnostics.push(Diagnostic::error(
            format!("Pitch octave {} is outside the range 0-8", pitch.octave),
            pitch.location.line,
            pitch.location.column,
        ));
    }
    let hint = match (pitch.note, pitch.accidental) {
        (NoteName::C, Accidental::Flat) => Some("Cb is enharmonic with B"),
        (NoteName::F, Accidental::Flat) => Some("Fb is enharmonic with E"),
        (NoteName::E, Accidental::Sharp) => Some("E# is enharmonic with F"),
        (NoteName::B, Accidental::Sharp) => Some("B# is enharmonic with C"),
        _ => None,
    };
    if let Some(hint) = hint {
        diagnostics.push(Diagnostic::info(
            hint,
            pitch.location.line,
            pitch.location.column,
        ));
    }
}

fn validate_duration(
    duration: &Duration,
    location: SourceLocation,
    diagnostics: &mut Vec<Diagnostic>,
) {
    // The lexer grammar caps dots at two; programmatically built ASTs can
    // still exceed it.
    if duration.dots > 2 {
        diagnostics.push(Diagnostic::warning(
            format!("Duration with {} dots", duration.dots),
            location.line,
            location.column,
        ));
    }
}

fn validate_annotation(
    annotation: Option<&Annotation>,
    location: SourceLocation,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if let Some(annotation) = annotation {
        if let Some(finger) = annotation.fingering {
            if !(1..=5).contains(&finger) {
                diagnostics.push(Diagnostic::error(
                    format!("Fingering {finger} is outside the range 1-5"),
                    location.line,
                    location.column,
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn validate_source(source: &str) -> ValidationResult {
        validate(&parse(source).ast.unwrap())
    }

    #[test]
    fn test_valid_score() {
        let result = validate_source("&m { C D E F }");
        assert!(result.valid);
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_invalid_octave() {
        let result = validate_source("&m { C9 }");
        assert!(!result.valid);
        assert!(result.diagnostics[0]
            .message
            .contains("outside the range 0-8"));
    }

    #[test]
    fn test_invalid_fingering_from_annotation_block() {
        let result = validate_source("&m { C D } { finger(1-2, 9) }");
        assert!(!result.valid);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("outside the range 1-5")));
    }

    #[test]
    fn test_valid_fingering() {
        let result = validate_source("&m { C@3 }");
        assert!(result.valid);
    }

    #[test]
    fn test_empty_chord() {
        let result = validate_source("&m { [] }");
        assert!(!result.valid);
        assert!(result
            .diagnostics
            .iter()
            .any(|d| d.message.contains("Chord has no pitches")));
    }

    #[test]
    fn test_undeclared_stave_warning() {
        let source = "---\n&a:\n  clef: treble\n---\n&a { C }\n&z { C }";
        let result = validate_source(source);
        assert!(result.valid);
        assert_eq!(result.diagnostics.len(), 1);
        assert_eq!(result.diagnostics[0].severity, Severity::Warning);
        assert!(result.diagnostics[0].message.contains("`z`"));
    }

    #[test]
    fn test_no_warning_when_nothing_declared() {
        let result = validate_source("&z { C }");
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_enharmonic_hints() {
        let result = validate_source("&m { Cb Fb E# B# }");
        assert!(result.valid);
        let messages: Vec<&str> = result
            .diagnostics
            .iter()
            .map(|d| d.message.as_str())
            .collect();
        assert_eq!(
            messages,
            vec![
                "Cb is enharmonic with B",
                "Fb is enharmonic with E",
                "E# is enharmonic with F",
                "B# is enharmonic with C",
            ]
        );
        assert!(result
            .diagnostics
            .iter()
            .all(|d| d.severity == Severity::Info));
    }

    #[test]
    fn test_excessive_dots_warn() {
        let score = Score {
            metadata: Metadata::default(),
            staves: vec![Staff {
                name: "m".to_string(),
                clef: Clef::Treble,
                measures: vec![Measure {
                    elements: vec![Element::Rest(Rest {
                        duration: Duration::new(DurationBase::Quarter, 3),
                        location: SourceLocation::default(),
                    })],
                    barline: Barline::Final,
                    attributes: None,
                }],
            }],
        };
        let result = validate(&score);
        assert!(result.valid);
        assert!(result.diagnostics[0].message.contains("3 dots"));
    }
}
