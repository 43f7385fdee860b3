//! Parsing for scenario files.
//!
//! ## Supported Syntax
//!
//! - Bus write: `write 0x01 3`
//! - Bus read: `read 0x00`, `read 0x00 == 0x34363731`, `read 0x01 != 0`
//! - Gated register read: `peek 0x00 == 0x20220323`
//! - Step options after the operands: `pause=<ns>`, `abort=<bits>`,
//!   `extra=<clocks>`, `expect=<framing|timing|lookup|hook>`
//! - Comments: `;` to end of line
//! - Literals: decimal, `0x` hex, `0b` binary

#![allow(clippy::option_if_let_else, clippy::manual_strip)]

use std::fmt;

use tmc4671_core::{FaultClass, ADDRESS_MASK};

/// Comparison operator for reply checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    /// Assert equality (`==`).
    Equal,
    /// Assert inequality (`!=`).
    NotEqual,
}

impl ComparisonOp {
    /// Applies the operator.
    #[must_use]
    pub const fn holds(self, actual: u32, expected: u32) -> bool {
        match self {
            Self::Equal => actual == expected,
            Self::NotEqual => actual != expected,
        }
    }
}

impl fmt::Display for ComparisonOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equal => write!(f, "=="),
            Self::NotEqual => write!(f, "!="),
        }
    }
}

/// Expected register value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Check {
    /// Comparison operator.
    pub operator: ComparisonOp,
    /// Value compared against.
    pub expected: u32,
}

/// Per-step stimulus tweaks and expected outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StepOptions {
    /// Read pause the master honours, overriding the datasheet value.
    pub pause_ns: Option<u64>,
    /// Deasserts select after this many bits.
    pub abort_after_bits: Option<u32>,
    /// Extra clock pulses after the word.
    pub extra_clocks: u32,
    /// Fault class the slave must report for the step to pass.
    pub expect: Option<FaultClass>,
}

/// One scenario step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Bus write frame.
    Write {
        /// Register address.
        address: u8,
        /// Content to write.
        value: u32,
        /// Stimulus options.
        options: StepOptions,
    },
    /// Bus read frame.
    Read {
        /// Register address.
        address: u8,
        /// Optional check on the reply.
        check: Option<Check>,
        /// Stimulus options.
        options: StepOptions,
    },
    /// Register read through the idle gate, no bus traffic.
    Peek {
        /// Register address.
        address: u8,
        /// Check on the stored value.
        check: Check,
    },
}

/// A step with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScenarioStep {
    /// 1-indexed source line.
    pub line: usize,
    /// Source text without comment.
    pub text: String,
    /// Parsed step.
    pub step: Step,
}

/// A parsed scenario file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Scenario {
    /// Steps in file order.
    pub steps: Vec<ScenarioStep>,
}

/// Error parsing a scenario line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseScenarioError {
    /// 1-indexed line number.
    pub line: usize,
    /// The problematic text.
    pub text: String,
    /// Description of the error.
    pub message: String,
}

impl fmt::Display for ParseScenarioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {} (in '{}')", self.line, self.message, self.text)
    }
}

impl std::error::Error for ParseScenarioError {}

/// Parses scenario text into steps.
///
/// # Errors
///
/// Returns the first line that does not parse.
pub fn parse_scenario(content: &str) -> Result<Scenario, ParseScenarioError> {
    let mut steps = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let stripped = strip_comment(line).trim();
        if stripped.is_empty() {
            continue;
        }

        let step = parse_step(stripped).map_err(|message| ParseScenarioError {
            line: idx + 1,
            text: stripped.to_string(),
            message,
        })?;
        steps.push(ScenarioStep {
            line: idx + 1,
            text: stripped.to_string(),
            step,
        });
    }

    Ok(Scenario { steps })
}

fn strip_comment(line: &str) -> &str {
    match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    }
}

fn parse_step(text: &str) -> Result<Step, String> {
    let mut words = text.split_whitespace();
    let keyword = words.next().ok_or_else(|| "expected a step".to_string())?;
    let address = parse_address(words.next().ok_or_else(|| "expected an address".to_string())?)?;
    let rest: Vec<&str> = words.collect();

    match keyword.to_ascii_lowercase().as_str() {
        "write" => {
            let (value, rest) = rest
                .split_first()
                .ok_or_else(|| "expected a value to write".to_string())?;
            Ok(Step::Write {
                address,
                value: parse_u32(value)?,
                options: parse_options(rest)?,
            })
        }
        "read" => {
            let (check, rest) = match rest.as_slice() {
                [op, value, tail @ ..] if is_operator(op) => {
                    (Some(parse_check(op, value)?), tail)
                }
                tail => (None, tail),
            };
            Ok(Step::Read {
                address,
                check,
                options: parse_options(rest)?,
            })
        }
        "peek" => match rest.as_slice() {
            [op, value] => Ok(Step::Peek {
                address,
                check: parse_check(op, value)?,
            }),
            _ => Err("expected 'peek address operator value'".to_string()),
        },
        other => Err(format!("unknown step '{other}'")),
    }
}

fn is_operator(text: &str) -> bool {
    text == "==" || text == "!="
}

fn parse_check(op: &str, value: &str) -> Result<Check, String> {
    let operator = match op {
        "==" => ComparisonOp::Equal,
        "!=" => ComparisonOp::NotEqual,
        _ => return Err("expected '==' or '!='".to_string()),
    };
    Ok(Check {
        operator,
        expected: parse_u32(value)?,
    })
}

fn parse_options(words: &[&str]) -> Result<StepOptions, String> {
    let mut options = StepOptions::default();
    for word in words {
        let (key, value) = word
            .split_once('=')
            .ok_or_else(|| format!("expected 'key=value' option, got '{word}'"))?;
        match key {
            "pause" => options.pause_ns = Some(parse_literal(value)?),
            "abort" => options.abort_after_bits = Some(narrow(parse_literal(value)?, value)?),
            "extra" => options.extra_clocks = narrow(parse_literal(value)?, value)?,
            "expect" => {
                let class = FaultClass::from_name(value)
                    .ok_or_else(|| format!("unknown fault class '{value}'"))?;
                options.expect = Some(class);
            }
            _ => return Err(format!("unknown option '{key}'")),
        }
    }
    Ok(options)
}

fn parse_address(text: &str) -> Result<u8, String> {
    let address: u8 = narrow(parse_literal(text)?, text)?;
    if address > ADDRESS_MASK {
        return Err(format!("address '{text}' exceeds the 7-bit address field"));
    }
    Ok(address)
}

fn parse_u32(text: &str) -> Result<u32, String> {
    narrow(parse_literal(text)?, text)
}

fn narrow<T: TryFrom<u64>>(value: u64, text: &str) -> Result<T, String> {
    T::try_from(value).map_err(|_| format!("value '{text}' is out of range"))
}

/// Parses an unsigned literal (decimal, `0x` hex, or `0b` binary).
///
/// # Errors
///
/// Returns a description of the malformed literal.
pub fn parse_literal(text: &str) -> Result<u64, String> {
    let text = text.trim();
    if text.is_empty() {
        return Err("expected a value".to_string());
    }

    if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).map_err(|_| format!("invalid hex value '{text}'"))
    } else if let Some(bin) = text.strip_prefix("0b").or_else(|| text.strip_prefix("0B")) {
        u64::from_str_radix(bin, 2).map_err(|_| format!("invalid binary value '{text}'"))
    } else {
        text.parse::<u64>()
            .map_err(|_| format!("invalid decimal value '{text}'"))
    }
}
