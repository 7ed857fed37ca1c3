use crate::{CompileError, Direction, Instruction, Result, Waypoint};

/// Running turtle state while walking an instruction list.
#[derive(Debug, Default)]
struct Cursor {
    x: f64,
    y: f64,
    /// Degrees, kept within [0, 360)
    heading: i32,
}

impl Cursor {
    fn turn(&mut self, degrees: i32) {
        self.heading = (self.heading + degrees).rem_euclid(360);
    }

    fn advance(&mut self, distance: f64) -> Waypoint {
        match self.heading {
            0 => self.x += distance,
            90 => self.y += distance,
            180 => self.x -= distance,
            270 => self.y -= distance,
            other => {
                // Unreachable with quarter turns only; hold position
                tracing::warn!("Non-axis heading {} in route, position unchanged", other);
            }
        }
        let theta = f64::from(self.heading).to_radians();
        Waypoint::new(self.x, self.y, theta, Direction::from_degrees(self.heading))
    }
}

/// Compile an instruction list into the waypoints of its move tokens.
///
/// Pure: the walk always starts from the origin facing forward, so calling
/// it again on the same list gives the same result.
pub fn compile(instructions: &[Instruction]) -> Vec<Waypoint> {
    let mut cursor = Cursor::default();
    let mut waypoints = Vec::new();

    for instruction in instructions {
        match *instruction {
            Instruction::Left | Instruction::Right => cursor.turn(instruction.turn_degrees()),
            Instruction::Move(distance) => waypoints.push(cursor.advance(distance)),
        }
    }

    tracing::debug!(
        "Compiled {} instructions into {} waypoints",
        instructions.len(),
        waypoints.len()
    );
    waypoints
}

/// Parse text tokens, failing on the first malformed one.
pub fn parse_instructions<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Instruction>> {
    tokens
        .iter()
        .enumerate()
        .map(|(index, token)| {
            token
                .as_ref()
                .parse::<Instruction>()
                .map_err(|e: CompileError| e.at(index))
        })
        .collect()
}

/// Parse and compile text tokens such as `["M 1.0", "L", "M 2.5"]`.
pub fn compile_tokens<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<Waypoint>> {
    let instructions = parse_instructions(tokens)?;
    Ok(compile(&instructions))
}
