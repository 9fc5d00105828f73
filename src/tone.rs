//! Tone pattern scripts.
//!
//! A pattern is a whitespace separated list of instructions:
//!
//! ```text
//! tone A4 200ms
//! delay 100ms
//! loop 3 { tone C5 50ms delay 50ms }
//! ```
//!
//! Frequencies are note names (see [`crate::notes`]) or plain Hz. Loops
//! nest. Parsing is all-or-nothing: any error discards the whole script.
//! Durations, loop counts and nesting depth are capped so that a script
//! cannot ask for unbounded work.

use crate::notes;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Longest single tone or delay, in milliseconds (one hour).
pub const MAX_DURATION_MS: u64 = 3_600_000;
/// Largest repeat count of one loop.
pub const MAX_LOOP_COUNT: u32 = 100_000;
/// Deepest allowed loop nesting.
pub const MAX_NESTING: usize = 32;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("'{instruction}' is missing its {argument}")]
    MissingArgument {
        instruction: &'static str,
        argument: &'static str,
    },
    #[error("invalid frequency '{0}': expected a note name or a number of Hz")]
    InvalidFrequency(String),
    #[error("invalid duration '{0}': expected milliseconds such as 200ms")]
    InvalidDuration(String),
    #[error("invalid loop count '{0}'")]
    InvalidCount(String),
    #[error("duration '{0}' exceeds the {MAX_DURATION_MS}ms limit")]
    DurationTooLong(String),
    #[error("loop count '{0}' exceeds the limit of {MAX_LOOP_COUNT}")]
    CountTooLarge(String),
    #[error("loops nested deeper than {MAX_NESTING} levels")]
    NestingTooDeep,
    #[error("loop syntax is 'loop COUNT {{ ... }}', found '{found}' instead of '{{'")]
    ExpectedOpenBrace { found: String },
    #[error("closing '}}' missing for loop")]
    UnclosedLoop,
    #[error("unexpected '}}' outside of a loop")]
    UnexpectedCloseBrace,
    #[error("unknown instruction '{0}'")]
    UnknownInstruction(String),
}

#[derive(Error, Debug)]
pub enum ToneError {
    #[error("failed to read pattern {path}: {source}")]
    Read { path: PathBuf, source: io::Error },
    #[error("pattern {path}: {source}")]
    Parse { path: PathBuf, source: ParseError },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Tone { freq: f64, duration: Duration },
    Delay(Duration),
    Loop { count: u32, body: ToneProgram },
}

/// A parsed pattern script.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ToneProgram {
    instructions: Vec<Instruction>,
}

impl ToneProgram {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn parse(source: &str) -> Result<Self, ParseError> {
        let tokens: Vec<&str> = source.split_whitespace().collect();
        let mut parser = Parser { tokens, pos: 0 };
        parser.program(0)
    }

    /// Reads and parses a pattern file.
    pub fn load(path: &Path) -> Result<Self, ToneError> {
        let source = fs::read_to_string(path).map_err(|source| ToneError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&source).map_err(|source| ToneError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    /// Total play time including loop repetitions, saturating at
    /// `Duration::MAX`.
    pub fn duration(&self) -> Duration {
        self.instructions
            .iter()
            .map(|i| match i {
                Instruction::Tone { duration, .. } | Instruction::Delay(duration) => *duration,
                Instruction::Loop { count, body } => body.duration().saturating_mul(*count),
            })
            .fold(Duration::ZERO, Duration::saturating_add)
    }

    /// Number of tones emitted when the program runs to completion,
    /// saturating at `usize::MAX`.
    pub fn tone_count(&self) -> usize {
        self.instructions
            .iter()
            .map(|i| match i {
                Instruction::Tone { .. } => 1,
                Instruction::Delay(_) => 0,
                Instruction::Loop { count, body } => {
                    let count = usize::try_from(*count).unwrap_or(usize::MAX);
                    body.tone_count().saturating_mul(count)
                }
            })
            .fold(0, usize::saturating_add)
    }
}

impl ToneProgram {
    fn write_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let indent = "  ".repeat(depth);
        for instruction in &self.instructions {
            match instruction {
                Instruction::Tone { freq, duration } => {
                    writeln!(f, "{indent}tone {freq} Hz {}ms", duration.as_millis())?
                }
                Instruction::Delay(duration) => {
                    writeln!(f, "{indent}delay {}ms", duration.as_millis())?
                }
                Instruction::Loop { count, body } => {
                    writeln!(f, "{indent}loop {count}")?;
                    body.write_tree(f, depth + 1)?;
                }
            }
        }
        Ok(())
    }
}

/// Indented instruction tree, one instruction per line.
impl fmt::Display for ToneProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_tree(f, 0)
    }
}

impl FromStr for ToneProgram {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

struct Parser<'a> {
    tokens: Vec<&'a str>,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn next(&mut self) -> Option<&'a str> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn argument(
        &mut self,
        instruction: &'static str,
        argument: &'static str,
    ) -> Result<&'a str, ParseError> {
        self.next().ok_or(ParseError::MissingArgument {
            instruction,
            argument,
        })
    }

    /// Parses instructions until end of input, or until the closing brace
    /// when inside a loop body (`depth > 0`).
    fn program(&mut self, depth: usize) -> Result<ToneProgram, ParseError> {
        let in_loop = depth > 0;
        let mut instructions = Vec::new();
        loop {
            let Some(token) = self.next() else {
                if in_loop {
                    return Err(ParseError::UnclosedLoop);
                }
                return Ok(ToneProgram::new(instructions));
            };

            let instruction = match token {
                "tone" => {
                    let freq = parse_frequency(self.argument("tone", "frequency")?)?;
                    let duration = parse_duration(self.argument("tone", "duration")?)?;
                    Instruction::Tone { freq, duration }
                }
                "delay" => Instruction::Delay(parse_duration(self.argument("delay", "duration")?)?),
                "loop" => {
                    let count = self.argument("loop", "count")?;
                    let count = parse_count(count)?;
                    match self.next() {
                        Some("{") => {}
                        found => {
                            return Err(ParseError::ExpectedOpenBrace {
                                found: found.unwrap_or("end of input").to_string(),
                            })
                        }
                    }
                    if depth >= MAX_NESTING {
                        return Err(ParseError::NestingTooDeep);
                    }
                    let body = self.program(depth + 1)?;
                    Instruction::Loop { count, body }
                }
                "}" if in_loop => return Ok(ToneProgram::new(instructions)),
                "}" => return Err(ParseError::UnexpectedCloseBrace),
                other => return Err(ParseError::UnknownInstruction(other.to_string())),
            };
            instructions.push(instruction);
        }
    }
}

fn parse_frequency(token: &str) -> Result<f64, ParseError> {
    if let Some(hz) = notes::frequency(token) {
        return Ok(hz);
    }
    match token.parse::<f64>() {
        Ok(hz) if hz.is_finite() && hz > 0.0 => Ok(hz),
        _ => Err(ParseError::InvalidFrequency(token.to_string())),
    }
}

fn parse_duration(token: &str) -> Result<Duration, ParseError> {
    let millis = token
        .strip_suffix("ms")
        .unwrap_or(token)
        .parse::<u64>()
        .map_err(|_| ParseError::InvalidDuration(token.to_string()))?;
    if millis > MAX_DURATION_MS {
        return Err(ParseError::DurationTooLong(token.to_string()));
    }
    Ok(Duration::from_millis(millis))
}

fn parse_count(token: &str) -> Result<u32, ParseError> {
    let count = token
        .parse::<u32>()
        .map_err(|_| ParseError::InvalidCount(token.to_string()))?;
    if count > MAX_LOOP_COUNT {
        return Err(ParseError::CountTooLarge(token.to_string()));
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    #[test]
    fn test_parse_reference_pattern() {
        let program =
            ToneProgram::parse("tone A4 200ms delay 100ms loop 3 { tone C5 50ms }").unwrap();
        assert_eq!(
            program.instructions(),
            &[
                Instruction::Tone {
                    freq: 440.0,
                    duration: ms(200)
                },
                Instruction::Delay(ms(100)),
                Instruction::Loop {
                    count: 3,
                    body: ToneProgram::new(vec![Instruction::Tone {
                        freq: 523.0,
                        duration: ms(50)
                    }]),
                },
            ]
        );
        assert_eq!(program.tone_count(), 4);
        assert_eq!(program.duration(), ms(450));
    }

    #[test]
    fn test_display_tree() {
        let program =
            ToneProgram::parse("tone A4 200ms delay 100ms loop 3 { tone C5 50ms }").unwrap();
        assert_eq!(
            program.to_string(),
            "tone 440 Hz 200ms\ndelay 100ms\nloop 3\n  tone 523 Hz 50ms\n"
        );
    }

    #[test]
    fn test_loop_without_brace_fails() {
        let err = ToneProgram::parse("loop 3 tone A4 100ms").unwrap_err();
        assert_eq!(
            err,
            ParseError::ExpectedOpenBrace {
                found: "tone".to_string()
            }
        );
        assert!(err.to_string().contains("loop COUNT"));
    }

    #[test]
    fn test_nested_loops_and_multiline() {
        let source = "loop 2 {\n  loop 2 { tone 1000 10ms }\n  delay 5ms\n}\ntone NOTE_E6 20ms\n";
        let program: ToneProgram = source.parse().unwrap();
        assert_eq!(program.instructions().len(), 2);
        assert_eq!(program.tone_count(), 5);
        assert_eq!(program.duration(), ms(2 * (20 + 5) + 20));
    }

    #[test]
    fn test_zero_count_loop_is_legal() {
        let program = ToneProgram::parse("loop 0 { tone A4 100ms }").unwrap();
        assert_eq!(program.tone_count(), 0);
        assert_eq!(program.duration(), Duration::ZERO);
    }

    #[test]
    fn test_limits_rejected_at_parse() {
        assert_eq!(
            ToneProgram::parse("tone A4 3600001ms"),
            Err(ParseError::DurationTooLong("3600001ms".to_string()))
        );
        assert_eq!(
            ToneProgram::parse("delay 99999999999999999999"),
            Err(ParseError::InvalidDuration("99999999999999999999".to_string()))
        );
        assert_eq!(
            ToneProgram::parse("loop 4294967295 { tone A4 10ms }"),
            Err(ParseError::CountTooLarge("4294967295".to_string()))
        );
        assert!(ToneProgram::parse("tone A4 3600000ms loop 100000 { }").is_ok());

        let deep = "loop 1 { ".repeat(MAX_NESTING + 1) + &"} ".repeat(MAX_NESTING + 1);
        assert_eq!(ToneProgram::parse(&deep), Err(ParseError::NestingTooDeep));
        let allowed = "loop 1 { ".repeat(MAX_NESTING) + &"} ".repeat(MAX_NESTING);
        assert!(ToneProgram::parse(&allowed).is_ok());
    }

    #[test]
    fn test_totals_saturate_on_huge_loops() {
        let source = "loop 100000 { loop 100000 { loop 100000 { loop 100000 { tone A4 3600000ms } } } }";
        let program = ToneProgram::parse(source).unwrap();
        assert_eq!(program.duration(), Duration::MAX);
        assert_eq!(program.tone_count(), usize::MAX);

        let built = ToneProgram::new(vec![
            Instruction::Delay(Duration::MAX),
            Instruction::Loop {
                count: u32::MAX,
                body: ToneProgram::new(vec![Instruction::Tone {
                    freq: 440.0,
                    duration: Duration::MAX,
                }]),
            },
        ]);
        assert_eq!(built.duration(), Duration::MAX);
        assert_eq!(built.tone_count(), u32::MAX as usize);
    }

    #[test]
    fn test_empty_source() {
        assert!(ToneProgram::parse("  \n ").unwrap().is_empty());
    }

    #[test]
    fn test_unknown_note_names_offending_token() {
        let err = ToneProgram::parse("tone H4 100ms").unwrap_err();
        assert_eq!(err, ParseError::InvalidFrequency("H4".to_string()));
        assert!(err.to_string().contains("'H4'"));

        assert!(matches!(
            ToneProgram::parse("tone -20 100ms"),
            Err(ParseError::InvalidFrequency(_))
        ));
    }

    #[test]
    fn test_bare_millisecond_durations() {
        let program = ToneProgram::parse("delay 250").unwrap();
        assert_eq!(program.instructions(), &[Instruction::Delay(ms(250))]);
        assert_eq!(
            ToneProgram::parse("delay 1s"),
            Err(ParseError::InvalidDuration("1s".to_string()))
        );
    }

    #[test]
    fn test_brace_errors() {
        assert_eq!(
            ToneProgram::parse("loop 2 { tone A4 10ms"),
            Err(ParseError::UnclosedLoop)
        );
        assert_eq!(
            ToneProgram::parse("tone A4 10ms }"),
            Err(ParseError::UnexpectedCloseBrace)
        );
        assert_eq!(
            ToneProgram::parse("loop 2"),
            Err(ParseError::ExpectedOpenBrace {
                found: "end of input".to_string()
            })
        );
    }

    #[test]
    fn test_missing_arguments_and_unknown_instruction() {
        assert_eq!(
            ToneProgram::parse("tone A4"),
            Err(ParseError::MissingArgument {
                instruction: "tone",
                argument: "duration"
            })
        );
        assert_eq!(
            ToneProgram::parse("loop x { }"),
            Err(ParseError::InvalidCount("x".to_string()))
        );
        assert_eq!(
            ToneProgram::parse("beep 100ms"),
            Err(ParseError::UnknownInstruction("beep".to_string()))
        );
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alarm.tone");
        fs::write(&path, "tone A5 150ms\ndelay 100ms\n").unwrap();
        let program = ToneProgram::load(&path).unwrap();
        assert_eq!(program.tone_count(), 1);

        let missing = ToneProgram::load(&dir.path().join("missing.tone"));
        assert!(matches!(missing, Err(ToneError::Read { .. })));

        fs::write(&path, "tone A5").unwrap();
        assert!(matches!(
            ToneProgram::load(&path),
            Err(ToneError::Parse { .. })
        ));
    }
}
