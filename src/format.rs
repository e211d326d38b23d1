//! # Formatter and minifier
//!
//! Both consume the token stream directly rather than the AST, so trivia
//! (comments, stave layout) survives and unparseable fragments degrade
//! gracefully. Context blocks are re-dumped canonically: recognized keys in
//! a fixed order, stave declarations in their original order; content that
//! fails to decode as YAML is preserved verbatim.
//!
//! The formatter is idempotent: `format(format(s)) == format(s)`.

use crate::ast::RawContext;
use crate::lexer::{tokenize, Token, TokenKind};
use crate::parser::quote_stave_keys;

/// Formatting options.
#[derive(Debug, Clone, Copy)]
pub struct FormatOptions {
    pub indent_size: usize,
    pub max_line_length: usize,
    pub notes_per_line: usize,
    pub space_around_connectives: bool,
    pub align_context_values: bool,
}

impl Default for FormatOptions {
    fn default() -> Self {
        Self {
            indent_size: 2,
            max_line_length: 80,
            notes_per_line: 8,
            space_around_connectives: false,
            align_context_values: true,
        }
    }
}

/// A renderable piece of a stave body or call group.
enum Chunk {
    /// A self-contained element unit; `notes` counts toward line wrapping.
    Unit { text: String, notes: usize },
    /// `~`, `^`, `*`: glued to neighbors unless spaced by option.
    Connective(String),
    Comma,
    Comment(String),
}

/// Pretty-print a source string.
pub fn format(source: &str, options: &FormatOptions) -> String {
    let mut formatter = Formatter {
        tokens: tokenize(source).tokens,
        position: 0,
        out: String::new(),
    };
    formatter.run(options);
    let mut out = formatter.out;
    while out.ends_with('\n') {
        out.pop();
    }
    out.push('\n');
    out
}

struct Formatter {
    tokens: Vec<Token>,
    position: usize,
    out: String,
}

impl Formatter {
    fn kind(&self) -> TokenKind {
        self.tokens
            .get(self.position)
            .map(|t| t.kind)
            .unwrap_or(TokenKind::Eof)
    }

    fn current(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) {
        self.position += 1;
    }

    fn take_text(&mut self) -> String {
        let text = self
            .tokens
            .get(self.position)
            .map(|t| t.text.clone())
            .unwrap_or_default();
        self.position += 1;
        text
    }

    fn take_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        self.position += 1;
        token
    }

    fn run(&mut self, options: &FormatOptions) {
        loop {
            match self.kind() {
                TokenKind::Eof => break,
                TokenKind::ContextDelim => self.format_context_block(options),
                TokenKind::StaveDecl => self.format_stave(options),
                TokenKind::Comment => {
                    let text = self.take_text();
                    self.out.push_str(&text);
                    self.out.push('\n');
                }
                TokenKind::Whitespace | TokenKind::Newline => self.advance(),
                _ => {
                    let text = self.take_text();
                    self.out.push_str(&text);
                    self.out.push('\n');
                }
            }
        }
    }

    fn format_context_block(&mut self, options: &FormatOptions) {
        self.advance(); // opening ---
        let mut lines: Vec<String> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::YamlContent => lines.push(self.take_text()),
                TokenKind::Newline | TokenKind::Whitespace => self.advance(),
                TokenKind::ContextDelim => {
                    self.advance();
                    break;
                }
                TokenKind::Eof => break,
                _ => self.advance(),
            }
        }
        self.out.push_str("---\n");
        let content = lines.join("\n");
        match serde_yaml::from_str::<RawContext>(&quote_stave_keys(&content)) {
            Ok(raw) => self.emit_canonical_context(&raw, options),
            Err(_) => {
                for line in &lines {
                    self.out.push_str(line);
                    self.out.push('\n');
                }
            }
        }
        self.out.push_str("---\n");
    }

    /// Known keys in a fixed order, then any other scalars, then stave
    /// declarations in their original order.
    fn emit_canonical_context(&mut self, raw: &RawContext, options: &FormatOptions) {
        let mut scalars: Vec<(&str, String)> = Vec::new();
        if let Some(title) = &raw.title {
            scalars.push(("title", yaml_scalar(title)));
        }
        if let Some(composer) = &raw.composer {
            scalars.push(("composer", yaml_scalar(composer)));
        }
        if let Some(key) = &raw.key {
            scalars.push(("key", yaml_scalar(key)));
        }
        if let Some(time) = &raw.time {
            scalars.push(("time", yaml_scalar(time)));
        }
        if let Some(tempo) = raw.tempo {
            scalars.push(("tempo", tempo.to_string()));
        }
        if let Some(octave) = raw.octave {
            scalars.push(("octave", octave.to_string()));
        }

        let width = scalars
            .iter()
            .map(|(k, _)| k.len() + 1)
            .max()
            .unwrap_or(0);
        for (key, value) in &scalars {
            if options.align_context_values {
                self.out
                    .push_str(&format!("{:<width$} {}\n", format!("{key}:"), value));
            } else {
                self.out.push_str(&format!("{key}: {value}\n"));
            }
        }

        let indent = " ".repeat(options.indent_size);
        for (key, value) in &raw.staves {
            let Some(key) = key.as_str() else { continue };
            if !key.starts_with('&') {
                // Unrecognized scalar keys survive the canonical dump.
                match value {
                    serde_yaml::Value::String(s) => {
                        self.out.push_str(&format!("{key}: {}\n", yaml_scalar(s)));
                    }
                    serde_yaml::Value::Number(n) => {
                        self.out.push_str(&format!("{key}: {n}\n"));
                    }
                    serde_yaml::Value::Bool(b) => {
                        self.out.push_str(&format!("{key}: {b}\n"));
                    }
                    _ => {}
                }
                continue;
            }
            self.out.push_str(&format!("{key}:\n"));
            let (clef, voice) = clef_and_voice(value);
            self.out.push_str(&format!("{indent}clef: {clef}\n"));
            if let Some(voice) = voice {
                self.out.push_str(&format!("{indent}voice: {voice}\n"));
            }
        }
    }

    fn format_stave(&mut self, options: &FormatOptions) {
        let decl = self.take_text();
        loop {
            match self.kind() {
                TokenKind::Whitespace | TokenKind::Newline => self.advance(),
                TokenKind::Comment => {
                    let text = self.take_text();
                    self.out.push_str(&text);
                    self.out.push('\n');
                }
                _ => break,
            }
        }
        if self.kind() != TokenKind::StaveBodyStart {
            self.out.push_str(&decl);
            self.out.push('\n');
            return;
        }
        self.advance();
        let chunks = self.collect_chunks_until(TokenKind::StaveBodyEnd, options);
        if self.kind() == TokenKind::StaveBodyEnd {
            self.advance();
        }
        let mut trailing_comments: Vec<String> = Vec::new();
        loop {
            match self.kind() {
                TokenKind::Whitespace | TokenKind::Newline => self.advance(),
                TokenKind::Comment => trailing_comments.push(self.take_text()),
                _ => break,
            }
        }
        let annotation = if self.kind() == TokenKind::AnnotationBlockStart {
            self.advance();
            let chunks = self.collect_chunks_until(TokenKind::AnnotationBlockEnd, options);
            if self.kind() == TokenKind::AnnotationBlockEnd {
                self.advance();
            }
            Some(render_inline(&chunks, options).0)
        } else {
            None
        };
        let body = render_body(&decl, &chunks, annotation.as_deref(), options);
        self.out.push_str(&body);
        self.out.push('\n');
        for comment in trailing_comments {
            self.out.push_str(&comment);
            self.out.push('\n');
        }
    }

    fn collect_chunks_until(&mut self, end: TokenKind, options: &FormatOptions) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        loop {
            let kind = self.kind();
            if kind == end || kind == TokenKind::Eof || kind == TokenKind::StaveBodyEnd {
                break;
            }
            match kind {
                TokenKind::Whitespace | TokenKind::Newline => self.advance(),
                TokenKind::Comment => chunks.push(Chunk::Comment(self.take_text())),
                TokenKind::Slur | TokenKind::Tie | TokenKind::Pedal => {
                    chunks.push(Chunk::Connective(self.take_text()))
                }
                TokenKind::Comma => {
                    self.advance();
                    chunks.push(Chunk::Comma);
                }
                TokenKind::Note | TokenKind::Rest | TokenKind::ChordStart => {
                    let (text, notes) = self.take_element_unit();
                    chunks.push(Chunk::Unit { text, notes });
                }
                TokenKind::Grace => {
                    let mut text = self.take_text();
                    if self.kind() == TokenKind::Note {
                        let (unit, _) = self.take_element_unit();
                        text.push_str(&unit);
                    }
                    chunks.push(Chunk::Unit { text, notes: 1 });
                }
                TokenKind::BeamStart => {
                    self.advance();
                    let inner = self.collect_chunks_until(TokenKind::ParenClose, options);
                    if self.kind() == TokenKind::ParenClose {
                        self.advance();
                    }
                    let (text, notes) = render_inline(&inner, options);
                    chunks.push(Chunk::Unit {
                        text: format!("=({text})"),
                        notes,
                    });
                }
                TokenKind::Function => {
                    let name = self.take_text();
                    if self.kind() == TokenKind::ParenOpen {
                        self.advance();
                        let inner = self.collect_chunks_until(TokenKind::ParenClose, options);
                        if self.kind() == TokenKind::ParenClose {
                            self.advance();
                        }
                        let (text, notes) = render_inline(&inner, options);
                        chunks.push(Chunk::Unit {
                            text: format!("{name}({text})"),
                            notes,
                        });
                    } else {
                        chunks.push(Chunk::Unit { text: name, notes: 0 });
                    }
                }
                _ => {
                    let text = self.take_text();
                    chunks.push(Chunk::Unit { text, notes: 0 });
                }
            }
        }
        chunks
    }

    /// A note/rest/chord with its byte-adjacent modifiers glued on.
    /// Modifiers separated by whitespace in the source stay separate: they
    /// bind differently (a detached duration only updates stickiness).
    fn take_element_unit(&mut self) -> (String, usize) {
        let Some(first) = self.take_token() else {
            return (String::new(), 0);
        };
        match first.kind {
            TokenKind::Note | TokenKind::Rest => {
                let mut text = first.text;
                let mut prev_end = first.byte_end;
                while let Some(token) = self.current() {
                    let glue = if first.kind == TokenKind::Note {
                        matches!(
                            token.kind,
                            TokenKind::OctaveMod | TokenKind::Duration | TokenKind::Fingering
                        )
                    } else {
                        token.kind == TokenKind::Duration
                    };
                    if glue && token.byte_start == prev_end {
                        prev_end = token.byte_end;
                        text.push_str(&token.text);
                        self.advance();
                    } else {
                        break;
                    }
                }
                (text, 1)
            }
            TokenKind::ChordStart => {
                let mut text = String::from("[");
                let mut first_pitch = true;
                loop {
                    match self.kind() {
                        TokenKind::ChordEnd | TokenKind::Eof | TokenKind::StaveBodyEnd => break,
                        TokenKind::Whitespace | TokenKind::Newline | TokenKind::Comment => {
                            self.advance()
                        }
                        TokenKind::Note => {
                            let Some(note) = self.take_token() else { break };
                            let mut unit = note.text;
                            let mut prev_end = note.byte_end;
                            while let Some(token) = self.current() {
                                if token.kind == TokenKind::OctaveMod
                                    && token.byte_start == prev_end
                                {
                                    prev_end = token.byte_end;
                                    unit.push_str(&token.text);
                                    self.advance();
                                } else {
                                    break;
                                }
                            }
                            if !first_pitch {
                                text.push(' ');
                            }
                            text.push_str(&unit);
                            first_pitch = false;
                        }
                        _ => {
                            let stray = self.take_text();
                            if !first_pitch {
                                text.push(' ');
                            }
                            text.push_str(&stray);
                            first_pitch = false;
                        }
                    }
                }
                let mut close_end = None;
                if self.kind() == TokenKind::ChordEnd {
                    if let Some(token) = self.take_token() {
                        close_end = Some(token.byte_end);
                    }
                }
                text.push(']');
                if let (Some(end), Some(token)) = (close_end, self.current()) {
                    if token.kind == TokenKind::Duration && token.byte_start == end {
                        text.push_str(&token.text);
                        self.advance();
                    }
                }
                (text, 1)
            }
            _ => (first.text, 0),
        }
    }
}

/// Join chunks on one line: units space-separated, connectives glued (or
/// spaced by option), commas attached to the left.
fn render_inline(chunks: &[Chunk], options: &FormatOptions) -> (String, usize) {
    let mut out = String::new();
    let mut notes = 0;
    let mut glue_next = false;
    for chunk in chunks {
        match chunk {
            Chunk::Unit { text, notes: n } => {
                if !out.is_empty() && !glue_next {
                    out.push(' ');
                }
                out.push_str(text);
                notes += n;
                glue_next = false;
            }
            Chunk::Connective(c) => {
                if options.space_around_connectives {
                    if !out.is_empty() {
                        out.push(' ');
                    }
                    out.push_str(c);
                    glue_next = false;
                } else {
                    out.push_str(c);
                    glue_next = true;
                }
            }
            Chunk::Comma => {
                out.push(',');
                glue_next = false;
            }
            Chunk::Comment(text) => {
                if !out.is_empty() && !glue_next {
                    out.push(' ');
                }
                out.push_str(text);
                glue_next = false;
            }
        }
    }
    (out, notes)
}

/// Render a stave body as `&name { … }`, wrapping every `notes_per_line`
/// note units (or earlier at `max_line_length`) with continuation indent.
fn render_body(
    decl: &str,
    chunks: &[Chunk],
    annotation: Option<&str>,
    options: &FormatOptions,
) -> String {
    let indent = " ".repeat(options.indent_size);
    let mut lines: Vec<String> = Vec::new();
    let mut line = format!("{decl} {{");
    let mut notes_in_line = 0usize;
    let mut units_in_line = 0usize;
    let mut glue_next = false;

    for chunk in chunks {
        match chunk {
            Chunk::Comment(text) => {
                lines.push(std::mem::replace(&mut line, indent.clone()));
                lines.push(format!("{indent}{text}"));
                notes_in_line = 0;
                units_in_line = 0;
                glue_next = false;
            }
            Chunk::Connective(c) => {
                if options.space_around_connectives {
                    line.push(' ');
                    line.push_str(c);
                } else {
                    line.push_str(c);
                    glue_next = true;
                }
            }
            Chunk::Comma => line.push(','),
            Chunk::Unit { text, notes } => {
                if glue_next {
                    line.push_str(text);
                    notes_in_line += notes;
                    glue_next = false;
                    continue;
                }
                let wrap = units_in_line > 0
                    && ((*notes > 0 && notes_in_line >= options.notes_per_line)
                        || line.len() + 1 + text.len() > options.max_line_length);
                if wrap {
                    lines.push(std::mem::replace(&mut line, indent.clone()));
                    line.push_str(text);
                    notes_in_line = *notes;
                    units_in_line = 1;
                } else {
                    if line != indent {
                        line.push(' ');
                    }
                    line.push_str(text);
                    notes_in_line += notes;
                    units_in_line += 1;
                }
            }
        }
    }

    line.push_str(" }");
    if let Some(annotation) = annotation {
        if annotation.is_empty() {
            line.push_str(" { }");
        } else {
            line.push_str(&format!(" {{ {annotation} }}"));
        }
    }
    lines.push(line);
    lines.join("\n")
}

fn clef_and_voice(value: &serde_yaml::Value) -> (&'static str, Option<String>) {
    use serde_yaml::Value;
    match value {
        Value::String(s) => (crate::ast::Clef::from_name(s).name(), None),
        Value::Mapping(map) => {
            let mut clef = crate::ast::Clef::default();
            let mut voice = None;
            for (k, v) in map {
                match k.as_str() {
                    Some("clef") => {
                        if let Some(s) = v.as_str() {
                            clef = crate::ast::Clef::from_name(s);
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
            (clef.name(), voice)
        }
        _ => (crate::ast::Clef::default().name(), None),
    }
}

/// Quote a YAML scalar when plain style would change its meaning.
fn yaml_scalar(value: &str) -> String {
    let needs_quotes = value.is_empty()
        || value.contains(':')
        || value.contains('#')
        || value.contains('"')
        || value.starts_with(['&', '*', '!', '[', ']', '{', '}', '\'', '|', '>', '-', '?'])
        || value.trim() != value;
    if needs_quotes {
        format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

/// Strip a source down to its significant tokens: newlines only around
/// context blocks and stave declarations, single spaces only where element
/// tokens would otherwise merge or violate the separation rule.
pub fn minify(source: &str) -> String {
    let tokens = tokenize(source).tokens;
    let mut out = String::new();
    let mut prev: Option<&Token> = None;

    for token in &tokens {
        match token.kind {
            TokenKind::Whitespace
            | TokenKind::Newline
            | TokenKind::Comment
            | TokenKind::Eof => continue,
            TokenKind::ContextDelim => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str("---\n");
            }
            TokenKind::YamlContent => {
                out.push_str(&token.text);
                out.push('\n');
            }
            TokenKind::StaveDecl => {
                if !out.is_empty() && !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push_str(&token.text);
            }
            _ => {
                if needs_space(prev, token) && !out.is_empty() && !out.ends_with('\n') {
                    out.push(' ');
                }
                out.push_str(&token.text);
            }
        }
        prev = Some(token);
    }

    while out.ends_with('\n') {
        out.pop();
    }
    out.push('\n');
    out
}

fn needs_space(prev: Option<&Token>, token: &Token) -> bool {
    let Some(prev) = prev else { return false };
    let starts_element = matches!(
        token.kind,
        TokenKind::Note | TokenKind::Rest | TokenKind::ChordStart
    );
    let prev_elementish = matches!(
        prev.kind,
        TokenKind::Note
            | TokenKind::Rest
            | TokenKind::ChordEnd
            | TokenKind::Duration
            | TokenKind::OctaveMod
            | TokenKind::Fingering
    );
    if starts_element && prev_elementish {
        return true;
    }
    // A modifier that was detached in the source binds differently from a
    // glued one (it only updates the sticky duration), so keep the gap.
    matches!(
        token.kind,
        TokenKind::Duration | TokenKind::OctaveMod | TokenKind::Fingering
    ) && prev.byte_end != token.byte_start
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn fmt(source: &str) -> String {
        format(source, &FormatOptions::default())
    }

    #[test]
    fn test_basic_body() {
        assert_eq!(fmt("&m {C D E F}"), "&m { C D E F }\n");
    }

    #[test]
    fn test_collapses_extra_whitespace() {
        assert_eq!(fmt("&m {  C   D\n E F }"), "&m { C D E F }\n");
    }

    #[test]
    fn test_modifiers_stay_attached() {
        assert_eq!(fmt("&m { C+/8@2 D }"), "&m { C+/8@2 D }\n");
    }

    #[test]
    fn test_detached_duration_stays_detached() {
        // A detached duration only updates stickiness; gluing it would
        // change the preceding note's duration.
        assert_eq!(fmt("&m { C /8 D }"), "&m { C /8 D }\n");
    }

    #[test]
    fn test_connectives_without_spaces() {
        assert_eq!(fmt("&m { C ^ D }"), "&m { C^D }\n");
        assert_eq!(fmt("&m { C ~ D }"), "&m { C~D }\n");
    }

    #[test]
    fn test_connectives_with_spaces_option() {
        let options = FormatOptions {
            space_around_connectives: true,
            ..FormatOptions::default()
        };
        assert_eq!(format("&m { C^D }", &options), "&m { C ^ D }\n");
    }

    #[test]
    fn test_chord_unit() {
        assert_eq!(fmt("&m { [C  E  G]/2 }"), "&m { [C E G]/2 }\n");
    }

    #[test]
    fn test_beam_group_unit() {
        assert_eq!(fmt("&m { =(C/8 D E F) }"), "&m { =(C/8 D E F) }\n");
    }

    #[test]
    fn test_function_call_unit() {
        assert_eq!(fmt("&m { mp(C D E) }"), "&m { mp(C D E) }\n");
    }

    #[test]
    fn test_annotation_block_on_body_line() {
        assert_eq!(
            fmt("&m { C D E F }\n{ cresc(1-4) text(2, \"dolce\") }"),
            "&m { C D E F } { cresc(1-4) text(2, \"dolce\") }\n"
        );
    }

    #[test]
    fn test_wrapping_after_eight_notes() {
        assert_eq!(
            fmt("&m { C D E F G A B C D E }"),
            "&m { C D E F G A B C\n  D E }\n"
        );
    }

    #[test]
    fn test_comment_on_its_own_line() {
        assert_eq!(
            fmt("&m { C D // first half\nE F }"),
            "&m { C D\n  // first half\n  E F }\n"
        );
    }

    #[test]
    fn test_context_canonical_key_order() {
        let source = "---\ncomposer: X\ntitle: Y\n---\n";
        assert_eq!(fmt(source), "---\ntitle:    Y\ncomposer: X\n---\n");
    }

    #[test]
    fn test_context_alignment_disabled() {
        let options = FormatOptions {
            align_context_values: false,
            ..FormatOptions::default()
        };
        let source = "---\ncomposer: X\ntitle: Y\n---\n";
        assert_eq!(format(source, &options), "---\ntitle: Y\ncomposer: X\n---\n");
    }

    #[test]
    fn test_context_stave_decls_preserve_order() {
        let source = "---\n&r: treble\n&l:\n  clef: bass\n---\n";
        assert_eq!(
            fmt(source),
            "---\n&r:\n  clef: treble\n&l:\n  clef: bass\n---\n"
        );
    }

    #[test]
    fn test_invalid_yaml_preserved_verbatim() {
        let source = "---\ntitle: [unclosed\n---\n";
        assert_eq!(fmt(source), "---\ntitle: [unclosed\n---\n");
    }

    #[test]
    fn test_formatter_idempotent() {
        let sources = [
            "&m {C D E F}",
            "&m { C+/8@2 D ^ E }",
            "---\ncomposer: X\ntitle: Y\ntime: 3/4\n&a: bass\n---\n&a { C D E F G A B C D E }",
            "&m { =(C/8 D) [C E G]/2 mp(C) } { slur(1-3) }",
            "&m { C D // note\nE F }",
        ];
        for source in sources {
            let once = fmt(source);
            assert_eq!(fmt(&once), once, "not idempotent for {source:?}");
        }
    }

    #[test]
    fn test_single_trailing_newline() {
        assert_eq!(fmt("&m { C }\n\n\n"), "&m { C }\n");
    }

    #[test]
    fn test_minify_basic() {
        assert_eq!(
            minify("---\ntitle: x\n---\n&m { C D E F }"),
            "---\ntitle: x\n---\n&m{C D E F}\n"
        );
    }

    #[test]
    fn test_minify_keeps_required_spaces() {
        assert_eq!(minify("&m { C+ D /8 E }"), "&m{C+ D /8 E}\n");
    }

    #[test]
    fn test_minify_glues_connectives() {
        assert_eq!(minify("&m { C ^ D ~ E }"), "&m{C^D~E}\n");
    }

    #[test]
    fn test_minify_drops_comments() {
        assert_eq!(minify("&m { C // gone\nD }"), "&m{C D}\n");
    }

    #[test]
    fn test_minify_annotation_block() {
        assert_eq!(
            minify("&m { C D }\n{ cresc(1-2) }"),
            "&m{C D}{cresc(1-2)}\n"
        );
    }

    #[test]
    fn test_minify_separates_staves_with_newlines() {
        assert_eq!(minify("&a { C }\n&b { D }"), "&a{C}\n&b{D}\n");
    }

    /// Zero out source locations so ASTs compare modulo trivia.
    fn normalized(mut score: crate::ast::Score) -> crate::ast::Score {
        use crate::ast::{Element, SourceLocation};
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
    fn test_minified_source_reparses_identically() {
        use crate::parser::parse;
        let source = "---\ntime: 3/4\n&a: treble\n---\n&a { C+ D/8 E ^ F [C E]/2 }";
        let original = normalized(parse(source).ast.unwrap());
        let minified = normalized(parse(&minify(source)).ast.unwrap());
        assert_eq!(original, minified);
    }

    #[test]
    fn test_formatted_source_reparses_identically() {
        use crate::parser::parse;
        let sources = [
            "&m {C D E F G A B C D E}",
            "---\ncomposer: X\ntitle: Y\ntime: 3/4\n&a: bass\n---\n&a { C+/8@2 D ^ E }",
            "&m { =(C/8 D) [C E G]/2 mp(C D) } { slur(1-4) }",
        ];
        for source in sources {
            let original = normalized(parse(source).ast.unwrap());
            let formatted = normalized(parse(&fmt(source)).ast.unwrap());
            assert_eq!(original, formatted, "round-trip changed {source:?}");
        }
    }
}
