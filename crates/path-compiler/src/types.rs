use crate::CompileError;
use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// One route token.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Instruction {
    /// Quarter turn counter-clockwise (+90 degrees)
    Left,
    /// Quarter turn clockwise (-90 degrees)
    Right,
    /// Move along the current heading, in metres
    Move(f64),
}

impl Instruction {
    /// Heading change in degrees; zero for moves.
    pub fn turn_degrees(&self) -> i32 {
        match self {
            Instruction::Left => 90,
            Instruction::Right => -90,
            Instruction::Move(_) => 0,
        }
    }
}

impl FromStr for Instruction {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        match token {
            "L" => return Ok(Instruction::Left),
            "R" => return Ok(Instruction::Right),
            _ => {}
        }

        let Some(rest) = token.strip_prefix('M') else {
            return Err(CompileError::UnknownToken {
                index: 0,
                token: token.to_string(),
            });
        };
        // "M" must be followed by whitespace, "MOVE 1" is not a move token
        if !rest.starts_with(char::is_whitespace) {
            return Err(CompileError::UnknownToken {
                index: 0,
                token: token.to_string(),
            });
        }

        let distance: f64 = rest
            .trim()
            .parse()
            .map_err(|_| CompileError::InvalidDistance {
                index: 0,
                token: token.to_string(),
            })?;
        if !distance.is_finite() {
            return Err(CompileError::InvalidDistance {
                index: 0,
                token: token.to_string(),
            });
        }
        if distance < 0.0 {
            return Err(CompileError::NegativeDistance { index: 0, distance });
        }
        Ok(Instruction::Move(distance))
    }
}

impl TryFrom<String> for Instruction {
    type Error = CompileError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Instruction> for String {
    fn from(value: Instruction) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instruction::Left => write!(f, "L"),
            Instruction::Right => write!(f, "R"),
            Instruction::Move(d) => write!(f, "M {d}"),
        }
    }
}

/// Human-readable direction of travel relative to the start heading.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Left,
    Back,
    Right,
}

impl Direction {
    /// Label for a normalized heading. Only exact quarter turns have a
    /// label of their own; anything else reads as `Forward`.
    pub fn from_degrees(heading: i32) -> Self {
        match heading {
            90 => Direction::Left,
            180 => Direction::Back,
            270 => Direction::Right,
            _ => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "Forward"),
            Direction::Left => write!(f, "Left"),
            Direction::Back => write!(f, "Back"),
            Direction::Right => write!(f, "Right"),
        }
    }
}

/// Target pose of one patrol leg, relative to the route origin.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f64,
    pub y: f64,
    /// Heading in radians, within [0, 2π)
    pub theta: f64,
    pub label: Direction,
}

impl Waypoint {
    pub fn new(x: f64, y: f64, theta: f64, label: Direction) -> Self {
        Self { x, y, theta, label }
    }
}

impl fmt::Display for Waypoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> ({:.2}, {:.2})", self.label, self.x, self.y)
    }
}
