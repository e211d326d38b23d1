//! Integration tests for the Scorelang compiler core.
//!
//! Full-pipeline coverage: source → tokens → AST → MusicXML, plus the
//! formatter/minifier round trips.

use pretty_assertions::assert_eq;
use scorelang::{
    format, minify, parse, to_musicxml, tokenize, validate, Element, FormatOptions,
    MusicXmlOptions, Score, SourceLocation,
};

fn xml_for(source: &str) -> String {
    let result = parse(source);
    assert!(result.errors.is_empty(), "errors: {:?}", result.errors);
    to_musicxml(&result.ast.unwrap(), &MusicXmlOptions::default())
}

/// Zero out source locations so ASTs compare modulo trivia.
fn normalized(mut score: Score) -> Score {
    for staff in &mut score.staves {
        for measure in &mut staff.measures {
            for element in &mut measure.elements {
                match element {
                    Element::Note(n) => {
                        n.location = SourceLocation::default();
                        n.pitch.location = SourceLocation::default();
                    }
                    Element::Rest(r) => r.location = SourceLocation::default(),
                    Element::Chord(c) => {
                        c.location = SourceLocation::default();
                        for pitch in &mut c.pitches {
                            pitch.location = SourceLocation::default();
                        }
                    }
                }
            }
        }
    }
    score
}

#[test]
fn test_scale_splits_into_two_measures() {
    let source = "---\ntime: 4/4\n&main:\n  clef: treble\n---\n&main { C D E F G A B C }";
    let xml = xml_for(source);
    assert_eq!(xml.matches("<measure number=").count(), 2);
    assert_eq!(xml.matches("<note>").count(), 8);
    assert!(xml.contains("<fifths>0</fifths>"));
    assert!(xml.contains("<beats>4</beats>"));
    assert!(xml.contains("<sign>G</sign>"));
    assert!(xml.contains("<line>2</line>"));
}

#[test]
fn test_accidental_alters_and_labels() {
    let source = "---\n&m:\n  clef: treble\n---\n&m { C# Bb F## Ebb }";
    let xml = xml_for(source);
    assert!(xml.contains("<alter>1</alter>"));
    assert!(xml.contains("<alter>-1</alter>"));
    assert!(xml.contains("<alter>2</alter>"));
    assert!(xml.contains("<alter>-2</alter>"));
    assert!(xml.contains("<accidental>sharp</accidental>"));
    assert!(xml.contains("<accidental>flat</accidental>"));
    assert!(xml.contains("<accidental>double-sharp</accidental>"));
    assert!(xml.contains("<accidental>flat-flat</accidental>"));
}

#[test]
fn test_crescendo_wedge_wraps_the_range() {
    let source = "---\n&m:\n  clef: treble\n---\n&m { C D E F } { cresc(1-4) }";
    let xml = xml_for(source);
    let start = xml.find(r#"<wedge type="crescendo"/>"#).expect("wedge start");
    let stop = xml.find(r#"<wedge type="stop"/>"#).expect("wedge stop");
    let first_note = xml.find("<note>").expect("a note");
    assert!(start < first_note);
    assert!(stop > start);
}

#[test]
fn test_slur_spans_the_range() {
    let source = "---\n&m:\n  clef: treble\n---\n&m { C D E F } { slur(1-4) }";
    let xml = xml_for(source);
    let start = xml.find(r#"<slur type="start" number="1"/>"#).expect("slur start");
    let stop = xml.find(r#"<slur type="stop" number="1"/>"#).expect("slur stop");
    assert!(start < stop);
}

#[test]
fn test_chord_members_share_duration() {
    let source = "---\n&m:\n  clef: treble\n---\n&m { [C E G]/2 }";
    let xml = xml_for(source);
    assert_eq!(xml.matches("<note>").count(), 3);
    assert_eq!(xml.matches("<type>half</type>").count(), 3);
    assert_eq!(xml.matches("<duration>8</duration>").count(), 3);
    assert_eq!(xml.matches("<chord/>").count(), 2);
    let first_note_end = xml.find("</note>").expect("a note");
    assert!(!xml[..first_note_end].contains("<chord/>"));
}

#[test]
fn test_two_staves_bracketed_into_parts() {
    let source = "---\n&r:\n  clef: treble\n&l:\n  clef: bass\n---\n&r { C }\n&l { C }";
    let xml = xml_for(source);
    assert!(xml.contains(r#"<part-group type="start" number="1">"#));
    assert!(xml.contains("<group-symbol>bracket</group-symbol>"));
    assert!(xml.contains(r#"<score-part id="P1">"#));
    assert!(xml.contains(r#"<score-part id="P2">"#));
    assert!(xml.contains(r#"<part id="P1">"#));
    assert!(xml.contains(r#"<part id="P2">"#));
    let p1 = xml.find(r#"<part id="P1">"#).unwrap();
    let p2 = xml.find(r#"<part id="P2">"#).unwrap();
    let treble = xml.find("<sign>G</sign>").unwrap();
    let bass = xml.find("<sign>F</sign>").unwrap();
    assert!(p1 < treble && treble < p2);
    assert!(p2 < bass);
}

#[test]
fn test_every_part_has_the_same_measure_count() {
    let source =
        "---\n&a:\n  clef: treble\n&b:\n  clef: bass\n---\n&a { C D E F G A B C }\n&b { C }";
    let result = parse(source);
    let score = result.ast.unwrap();
    let xml = to_musicxml(&score, &MusicXmlOptions::default());
    let max_measures = score.staves.iter().map(|s| s.measures.len()).max().unwrap();
    assert_eq!(max_measures, 2);
    assert_eq!(
        xml.matches("<measure number=").count(),
        max_measures * score.staves.len()
    );
    assert!(xml.contains(r#"<rest measure="yes"/>"#));
}

#[test]
fn test_measure_beat_sums_stay_within_capacity() {
    let source = "&m { C/2. D/4 =(E/8 F G A) [C E G]/2 B C+ D/1 }";
    let score = parse(source).ast.unwrap();
    for staff in &score.staves {
        for measure in &staff.measures {
            let total: f64 = measure.elements.iter().map(|e| e.beats()).sum();
            let single = measure.elements.len() == 1;
            assert!(
                total <= 4.0 + 1e-6 || single,
                "measure over capacity: {total}"
            );
        }
    }
}

#[test]
fn test_beam_tags_form_a_begin_continue_end_run() {
    let xml = xml_for("&m { =(C/8 D E F) }");
    let tags: Vec<&str> = xml
        .match_indices("<beam number=\"1\">")
        .map(|(i, _)| {
            let rest = &xml[i + "<beam number=\"1\">".len()..];
            &rest[..rest.find('<').unwrap()]
        })
        .collect();
    assert_eq!(tags, vec!["begin", "continue", "continue", "end"]);
}

#[test]
fn test_tokenize_is_deterministic_and_ordered() {
    let source = "---\ntime: 4/4\n---\n&m { C D =(E/8 F) [G B]/2 } { cresc(1-3) }";
    let first = tokenize(source);
    let second = tokenize(source);
    assert_eq!(first.tokens, second.tokens);
    for pair in first.tokens.windows(2) {
        assert!(pair[0].byte_end <= pair[1].byte_start);
    }
}

#[test]
fn test_stave_order_is_declaration_then_first_use() {
    let source = "---\n&r:\n  clef: treble\n&l:\n  clef: bass\n---\n&extra { C }\n&l { C }\n&r { C }";
    let score = parse(source).ast.unwrap();
    let names: Vec<&str> = score.staves.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["r", "l", "extra"]);
}

#[test]
fn test_format_is_idempotent_on_a_full_document() {
    let source = "---\ncomposer: X\ntitle: Y\ntime: 3/4\n&r: treble\n&l:\n  clef: bass\n---\n&r {C D E F G A B C D E}\n&l { [C E]/2. } { mp(1) }";
    let options = FormatOptions::default();
    let once = format(source, &options);
    let twice = format(&once, &options);
    assert_eq!(once, twice);
}

#[test]
fn test_format_preserves_parse() {
    let source = "---\ntime: 3/4\n&m: treble\n---\n&m {C+/8@2 D ^ E =(F/8 G) [A C+]/2}";
    let original = normalized(parse(source).ast.unwrap());
    let formatted = normalized(parse(&format(source, &FormatOptions::default())).ast.unwrap());
    assert_eq!(original, formatted);
}

#[test]
fn test_minify_preserves_parse() {
    let source = "---\ntime: 3/4\n&m: treble\n---\n&m { C+ D /8 E ^ F }\n&m { G A B }";
    let original = normalized(parse(source).ast.unwrap());
    let minified = normalized(parse(&minify(source)).ast.unwrap());
    assert_eq!(original, minified);
}

#[test]
fn test_validation_does_not_block_xml_generation() {
    // Undeclared stave and enharmonic info are non-fatal.
    let source = "---\n&a:\n  clef: treble\n---\n&a { Cb }\n&z { E# }";
    let result = parse(source);
    let score = result.ast.unwrap();
    let validation = validate(&score);
    assert!(validation.valid);
    assert!(!validation.diagnostics.is_empty());
    let xml = to_musicxml(&score, &MusicXmlOptions::default());
    assert!(xml.contains("<score-partwise"));
}

#[test]
fn test_mid_score_context_change_round_trip() {
    let source = "---\nkey: C\ntime: 4/4\n---\n&m { C D E F }\n---\nkey: G\ntime: 3/4\n---\n&m { G A B }";
    let xml = xml_for(source);
    assert!(xml.contains("<fifths>0</fifths>"));
    assert!(xml.contains("<fifths>1</fifths>"));
    assert!(xml.contains("<beats>4</beats>"));
    assert!(xml.contains("<beats>3</beats>"));
}

#[test]
fn test_grace_and_fingering_and_articulation_together() {
    let source = "&m { `C st(D E) F@2 }";
    let xml = xml_for(source);
    assert!(xml.contains("<grace/>"));
    assert_eq!(xml.matches("<staccato/>").count(), 2);
    assert!(xml.contains("<fingering>2</fingering>"));
}

#[test]
fn test_dynamics_and_wedges_inline() {
    let source = "&m { mf(C D) <(E F) }";
    let xml = xml_for(source);
    assert!(xml.contains("<mf/>"));
    assert!(xml.contains(r#"<wedge type="crescendo"/>"#));
    assert!(xml.contains(r#"<wedge type="stop"/>"#));
}

#[test]
fn test_minor_key_fifths() {
    let source = "---\nkey: Dm\n---\n&m { D E F }";
    let xml = xml_for(source);
    assert!(xml.contains("<fifths>-1</fifths>"));
    assert!(xml.contains("<mode>minor</mode>"));
}

#[test]
fn test_lexer_separation_error_has_location() {
    let result = parse("&m { C D EF }");
    assert_eq!(result.errors.len(), 1);
    let diag = &result.errors[0];
    assert_eq!(diag.line, 1);
    assert!(diag.column > 1);
}

#[test]
fn test_unparseable_frontmatter_is_an_error_but_not_fatal() {
    let source = "---\ntitle: [broken\n---\n&m { C D }";
    let result = parse(source);
    assert!(result.errors.iter().any(|d| d.message.starts_with("YAML error:")));
    let score = result.ast.unwrap();
    assert_eq!(score.staves.len(), 1);
    assert_eq!(score.staves[0].measures[0].elements.len(), 2);
}
