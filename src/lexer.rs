use crate::ast::SourceLocation;
use crate::error::Diagnostic;

/// Token kinds for the Scorelang language
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    // Context blocks
    ContextDelim,         // --- on its own line
    YamlContent,          // one line inside a context block
    ContextKey,           // reserved
    ContextValue,         // reserved

    // Staves
    StaveDecl,            // &name or &name+voice
    StaveBodyStart,       // {
    StaveBodyEnd,         // }
    AnnotationBlockStart, // { following a stave body
    AnnotationBlockEnd,   // }

    // Elements
    Note,                 // C, D#, Bb4, F##2
    Rest,                 // _
    Duration,             // /1 /2 /4 /8 /16 /32 with up to two dots, or lone .
    OctaveMod,            // + ++ - --
    Fingering,            // @1 through @5
    ChordStart,           // [
    ChordEnd,             // ]
    BeamStart,            // =(
    ParenOpen,            // (
    ParenClose,           // )

    // Connectives
    Slur,                 // ~
    Tie,                  // ^
    Pedal,                // *

    // Calls
    Function,             // cresc, mp, st, < , >
    Number,               // 3
    Range,                // 1-4
    Comma,                // ,
    String,               // "text"

    // Repeats (lexed only)
    RepeatStart,          // |:
    RepeatEnd,            // :|
    Volta,                // |1, |2

    Grace,                // ` or ``
    Comment,              // //... or /*...*/
    Newline,
    Whitespace,
    Eof,
    Unknown,
}

/// A token with its text and position in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub line: usize,
    pub column: usize,
    pub byte_start: usize,
    pub byte_end: usize,
}

impl Token {
    pub fn location(&self) -> SourceLocation {
        SourceLocation {
            line: self.line,
            column: self.column,
            byte_start: self.byte_start,
            byte_end: self.byte_end,
        }
    }
}

/// Result of tokenizing a source string.
pub struct LexResult {
    pub tokens: Vec<Token>,
    pub errors: Vec<Diagnostic>,
}

#[derive(Clone, Copy, PartialEq)]
enum Mode {
    Default,
    Context,
}

#[derive(Clone, Copy)]
enum BlockKind {
    Body,
    Annotation,
}

/// Lexer for Scorelang source.
///
/// Two modes: `Default` for music bodies and `Context` inside `---` blocks.
/// A `{` opens a stave body unless the one-shot `expect_annotation` flag is
/// set (by a preceding `}`), in which case it opens an annotation block.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    line: usize,
    column: usize,
    mode: Mode,
    block_stack: Vec<BlockKind>,
    expect_annotation: bool,
}

struct Start {
    pos: usize,
    line: usize,
    column: usize,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            line: 1,
            column: 1,
            mode: Mode::Default,
            block_stack: Vec::new(),
            expect_annotation: false,
        }
    }

    fn rest(&self) -> &str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_second(&self) -> Option<char> {
        let mut chars = self.rest().chars();
        chars.next();
        chars.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.rest().chars().next()?;
        self.pos += c.len_utf8();
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn at_line_start(&self) -> bool {
        self.column == 1
    }

    /// True when the current line contains only `---` (plus trailing blanks).
    fn at_delimiter_line(&self) -> bool {
        let rest = self.rest();
        if !rest.starts_with("---") {
            return false;
        }
        rest["---".len()..]
            .chars()
            .take_while(|&c| c != '\n')
            .all(|c| c == ' ' || c == '\t' || c == '\r')
    }

    fn start(&self) -> Start {
        Start {
            pos: self.pos,
            line: self.line,
            column: self.column,
        }
    }

    fn token(&self, kind: TokenKind, start: Start) -> Token {
        Token {
            kind,
            text: self.input[start.pos..self.pos].to_string(),
            line: start.line,
            column: start.column,
            byte_start: start.pos,
            byte_end: self.pos,
        }
    }

    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();

        while self.peek().is_some() {
            let token = match self.mode {
                Mode::Context => self.lex_context(),
                Mode::Default => self.lex_default(),
            };
            if !matches!(
                token.kind,
                TokenKind::Whitespace
                    | TokenKind::Newline
                    | TokenKind::Comment
                    | TokenKind::StaveBodyEnd
                    | TokenKind::AnnotationBlockEnd
            ) {
                self.expect_annotation = false;
            }
            tokens.push(token);
        }

        let start = self.start();
        tokens.push(self.token(TokenKind::Eof, start));
        tokens
    }

    fn lex_context(&mut self) -> Token {
        let start = self.start();

        if self.at_line_start() && self.at_delimiter_line() {
            self.advance();
            self.advance();
            self.advance();
            self.mode = Mode::Default;
            return self.token(TokenKind::ContextDelim, start);
        }

        match self.peek() {
            Some('\n') => {
                self.advance();
                self.token(TokenKind::Newline, start)
            }
            _ if self.at_line_start() => {
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                self.token(TokenKind::YamlContent, start)
            }
            Some(' ') | Some('\t') | Some('\r') => {
                while let Some(c) = self.peek() {
                    if c == ' ' || c == '\t' || c == '\r' {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.token(TokenKind::Whitespace, start)
            }
            _ => {
                // Stray text after a delimiter on the same line.
                while let Some(c) = self.peek() {
                    if c == '\n' {
                        break;
                    }
                    self.advance();
                }
                self.token(TokenKind::YamlContent, start)
            }
        }
    }

    fn lex_default(&mut self) -> Token {
        let start = self.start();
        let c = match self.peek() {
            Some(c) => c,
            None => return self.token(TokenKind::Eof, start),
        };

        match c {
            '\n' => {
                self.advance();
                self.token(TokenKind::Newline, start)
            }
            ' ' | '\t' | '\r' => {
                while let Some(c) = self.peek() {
                    if c == ' ' || c == '\t' || c == '\r' {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.token(TokenKind::Whitespace, start)
            }
            '-' => {
                if self.at_line_start() && self.at_delimiter_line() {
                    self.advance();
                    self.advance();
                    self.advance();
                    self.mode = Mode::Context;
                    return self.token(TokenKind::ContextDelim, start);
                }
                self.advance();
                if self.peek() == Some('-') {
                    self.advance();
                }
                self.token(TokenKind::OctaveMod, start)
            }
            '+' => {
                self.advance();
                if self.peek() == Some('+') {
                    self.advance();
                }
                self.token(TokenKind::OctaveMod, start)
            }
            '/' => match self.peek_second() {
                Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                    self.token(TokenKind::Comment, start)
                }
                Some('*') => {
                    self.advance();
                    self.advance();
                    // Unclosed block comments consume to EOF.
                    while self.peek().is_some() {
                        if self.rest().starts_with("*/") {
                            self.advance();
                            self.advance();
                            break;
                        }
                        self.advance();
                    }
                    self.token(TokenKind::Comment, start)
                }
                _ => self.lex_duration(start),
            },
            '.' => {
                self.advance();
                self.token(TokenKind::Duration, start)
            }
            '_' => {
                self.advance();
                self.token(TokenKind::Rest, start)
            }
            '&' => {
                self.advance();
                let mut seen = false;
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() {
                        seen = true;
                        self.advance();
                    } else {
                        break;
                    }
                }
                if !seen {
                    return self.token(TokenKind::Unknown, start);
                }
                if self.peek() == Some('+')
                    && self.peek_second().map_or(false, |c| c.is_ascii_alphanumeric())
                {
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_alphanumeric() {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                }
                self.token(TokenKind::StaveDecl, start)
            }
            '{' => {
                self.advance();
                if self.expect_annotation {
                    self.block_stack.push(BlockKind::Annotation);
                    self.token(TokenKind::AnnotationBlockStart, start)
                } else {
                    self.block_stack.push(BlockKind::Body);
                    self.token(TokenKind::StaveBodyStart, start)
                }
            }
            '}' => {
                self.advance();
                match self.block_stack.pop() {
                    Some(BlockKind::Body) => {
                        self.expect_annotation = true;
                        self.token(TokenKind::StaveBodyEnd, start)
                    }
                    Some(BlockKind::Annotation) => {
                        self.expect_annotation = true;
                        self.token(TokenKind::AnnotationBlockEnd, start)
                    }
                    None => self.token(TokenKind::Unknown, start),
                }
            }
            '[' => {
                self.advance();
                self.token(TokenKind::ChordStart, start)
            }
            ']' => {
                self.advance();
                self.token(TokenKind::ChordEnd, start)
            }
            '=' => {
                self.advance();
                if self.peek() == Some('(') {
                    self.advance();
                    self.token(TokenKind::BeamStart, start)
                } else {
                    self.token(TokenKind::Unknown, start)
                }
            }
            '(' => {
                self.advance();
                self.token(TokenKind::ParenOpen, start)
            }
            ')' => {
                self.advance();
                self.token(TokenKind::ParenClose, start)
            }
            '~' => {
                self.advance();
                self.token(TokenKind::Slur, start)
            }
            '^' => {
                self.advance();
                self.token(TokenKind::Tie, start)
            }
            '*' => {
                self.advance();
                self.token(TokenKind::Pedal, start)
            }
            '`' => {
                self.advance();
                if self.peek() == Some('`') {
                    self.advance();
                }
                self.token(TokenKind::Grace, start)
            }
            '|' => {
                self.advance();
                match self.peek() {
                    Some(':') => {
                        self.advance();
                        self.token(TokenKind::RepeatStart, start)
                    }
                    Some(c) if c.is_ascii_digit() => {
                        while let Some(c) = self.peek() {
                            if c.is_ascii_digit() {
                                self.advance();
                            } else {
                                break;
                            }
                        }
                        self.token(TokenKind::Volta, start)
                    }
                    _ => self.token(TokenKind::Unknown, start),
                }
            }
            ':' => {
                self.advance();
                if self.peek() == Some('|') {
                    self.advance();
                    self.token(TokenKind::RepeatEnd, start)
                } else {
                    self.token(TokenKind::Unknown, start)
                }
            }
            '"' => {
                self.advance();
                while let Some(c) = self.peek() {
                    if c == '"' || c == '\n' {
                        break;
                    }
                    self.advance();
                }
                if self.peek() == Some('"') {
                    self.advance();
                }
                self.token(TokenKind::String, start)
            }
            ',' => {
                self.advance();
                self.token(TokenKind::Comma, start)
            }
            '<' | '>' => {
                self.advance();
                self.token(TokenKind::Function, start)
            }
            '@' => match self.peek_second() {
                Some(d) if ('1'..='5').contains(&d) => {
                    self.advance();
                    self.advance();
                    self.token(TokenKind::Fingering, start)
                }
                _ => {
                    self.advance();
                    self.token(TokenKind::Unknown, start)
                }
            },
            '0'..='9' => {
                while let Some(c) = self.peek() {
                    if c.is_ascii_digit() {
                        self.advance();
                    } else {
                        break;
                    }
                }
                if self.peek() == Some('-')
                    && self.peek_second().map_or(false, |c| c.is_ascii_digit())
                {
                    self.advance();
                    while let Some(c) = self.peek() {
                        if c.is_ascii_digit() {
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    self.token(TokenKind::Range, start)
                } else {
                    self.token(TokenKind::Number, start)
                }
            }
            'A'..='G' => {
                self.advance();
                match self.peek() {
                    Some('#') => {
                        self.advance();
                        if self.peek() == Some('#') {
                            self.advance();
                        }
                    }
                    Some('b') => {
                        self.advance();
                        if self.peek() == Some('b') {
                            self.advance();
                        }
                    }
                    _ => {}
                }
                if self.peek().map_or(false, |c| c.is_ascii_digit()) {
                    self.advance();
                }
                self.token(TokenKind::Note, start)
            }
            'a'..='z' => {
                self.advance();
                while let Some(c) = self.peek() {
                    if c.is_ascii_alphanumeric() {
                        self.advance();
                    } else {
                        break;
                    }
                }
                self.token(TokenKind::Function, start)
            }
            _ => {
                self.advance();
                self.token(TokenKind::Unknown, start)
            }
        }
    }

    /// `/N` with N in {1,2,4,8,16,32}, plus up to two dots.
    fn lex_duration(&mut self, start: Start) -> Token {
        let rest = self.rest();
        let digits: String = rest[1..].chars().take_while(|c| c.is_ascii_digit()).collect();
        let valid = matches!(digits.as_str(), "1" | "2" | "4" | "8" | "16" | "32");
        if !valid {
            self.advance();
            return self.token(TokenKind::Unknown, start);
        }
        self.advance(); // /
        for _ in 0..digits.len() {
            self.advance();
        }
        let mut dots = 0;
        while dots < 2 && self.peek() == Some('.') {
            self.advance();
            dots += 1;
        }
        self.token(TokenKind::Duration, start)
    }
}

/// Tokenize a source string.
///
/// Never aborts: unrecognized bytes become `Unknown` tokens. The only
/// lexical error is the note-separation rule, checked on the token stream.
pub fn tokenize(source: &str) -> LexResult {
    let mut lexer = Lexer::new(source);
    let tokens = lexer.tokenize();
    let errors = separation_errors(&tokens);
    LexResult { tokens, errors }
}

/// Outside chord context, a NOTE/DURATION/OCTAVE_MOD/FINGERING token
/// immediately followed by a NOTE token is an error.
fn separation_errors(tokens: &[Token]) -> Vec<Diagnostic> {
    let mut errors = Vec::new();
    let mut chord_depth = 0usize;
    for pair in tokens.windows(2) {
        match pair[0].kind {
            TokenKind::ChordStart => chord_depth += 1,
            TokenKind::ChordEnd => chord_depth = chord_depth.saturating_sub(1),
            _ => {}
        }
        let glued = matches!(
            pair[0].kind,
            TokenKind::Note | TokenKind::Duration | TokenKind::OctaveMod | TokenKind::Fingering
        );
        if chord_depth == 0 && glued && pair[1].kind == TokenKind::Note {
            errors.push(Diagnostic::error(
                "Notes must be separated by whitespace or connectives",
                pair[1].line,
                pair[1].column,
            ));
        }
    }
    errors
}
