//! Vector tile geometry command stream decoding.
//!
//! A feature's geometry is a flat `u32` stream of command integers, each
//! followed by its zigzag-encoded parameters. Coordinates are deltas from a
//! cursor that persists across commands.

use glam::IVec2;

use crate::error::{DecodeError, DecodeResult};

/// A geometry command identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeometryCommand {
    /// Start a new part at the given point.
    MoveTo,
    /// Extend the current part with a point.
    LineTo,
    /// Close the current ring. Carries no parameters.
    ClosePath,
}

impl GeometryCommand {
    /// Command id as stored in the low 3 bits of a command integer.
    #[must_use]
    pub fn id(self) -> u32 {
        match self {
            Self::MoveTo => 1,
            Self::LineTo => 2,
            Self::ClosePath => 7,
        }
    }

    fn from_id(id: u32) -> Option<Self> {
        match id {
            1 => Some(Self::MoveTo),
            2 => Some(Self::LineTo),
            7 => Some(Self::ClosePath),
            _ => None,
        }
    }

    /// Pack this command and a repeat count into a command integer.
    #[must_use]
    pub fn integer(self, count: u32) -> u32 {
        (count << 3) | self.id()
    }
}

/// Decode a zigzag-encoded parameter integer.
#[must_use]
#[allow(clippy::cast_possible_wrap)]
pub fn zigzag_decode(value: u32) -> i32 {
    // The shifted value fits in 31 bits.
    let magnitude = (value >> 1) as i32;
    magnitude ^ -((value & 1) as i32)
}

/// Encode a signed parameter as a zigzag integer.
#[must_use]
#[allow(clippy::cast_sign_loss)]
pub fn zigzag_encode(value: i32) -> u32 {
    ((value << 1) ^ (value >> 31)) as u32
}

/// Decode a geometry command stream into parts.
///
/// Every `MoveTo` point starts a new part; `LineTo` points extend the
/// current one. For point features, each part therefore holds exactly one
/// point.
///
/// # Errors
///
/// Returns an error if the stream holds an unknown command, ends inside a
/// command's parameters, or starts with `LineTo`.
pub fn decode_geometry(stream: &[u32]) -> DecodeResult<Vec<Vec<IVec2>>> {
    let mut parts: Vec<Vec<IVec2>> = Vec::new();
    let mut cursor = IVec2::ZERO;
    let mut offset = 0;

    while offset < stream.len() {
        let command_integer = stream[offset];
        offset += 1;

        let id = command_integer & 0x7;
        let count = (command_integer >> 3) as usize;
        let command = GeometryCommand::from_id(id).ok_or_else(|| DecodeError::InvalidFormat {
            context: "geometry",
            detail: format!("unknown command id {id}"),
        })?;

        if command == GeometryCommand::ClosePath {
            continue;
        }

        if offset + count * 2 > stream.len() {
            return Err(DecodeError::UnexpectedEof {
                context: "geometry parameters",
            });
        }

        for _ in 0..count {
            let dx = zigzag_decode(stream[offset]);
            let dy = zigzag_decode(stream[offset + 1]);
            offset += 2;
            cursor += IVec2::new(dx, dy);

            match command {
                GeometryCommand::MoveTo => parts.push(vec![cursor]),
                GeometryCommand::LineTo => {
                    let Some(part) = parts.last_mut() else {
                        return Err(DecodeError::InvalidFormat {
                            context: "geometry",
                            detail: "LineTo before any MoveTo".to_string(),
                        });
                    };
                    part.push(cursor);
                }
                GeometryCommand::ClosePath => {}
            }
        }
    }

    Ok(parts)
}

/// Decode only the first point of a geometry command stream.
///
/// # Errors
///
/// Returns an error if the stream is malformed before its first point.
pub fn first_point(stream: &[u32]) -> DecodeResult<Option<IVec2>> {
    let [command_integer, x, y, ..] = stream else {
        return if stream.is_empty() {
            Ok(None)
        } else {
            Err(DecodeError::UnexpectedEof {
                context: "geometry parameters",
            })
        };
    };

    if command_integer & 0x7 != GeometryCommand::MoveTo.id() || command_integer >> 3 == 0 {
        return Err(DecodeError::InvalidFormat {
            context: "geometry",
            detail: format!("expected MoveTo, got command integer {command_integer}"),
        });
    }

    Ok(Some(IVec2::new(zigzag_decode(*x), zigzag_decode(*y))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_zigzag_known_values() {
        assert_eq!(zigzag_decode(0), 0);
        assert_eq!(zigzag_decode(1), -1);
        assert_eq!(zigzag_decode(2), 1);
        assert_eq!(zigzag_decode(3), -2);
        assert_eq!(zigzag_encode(-1), 1);
        assert_eq!(zigzag_encode(1), 2);
    }

    #[test]
    fn test_decode_single_point() {
        // MoveTo(1) with (25, 17).
        let stream = [9, 50, 34];
        let parts = decode_geometry(&stream).unwrap();
        assert_eq!(parts, vec![vec![IVec2::new(25, 17)]]);
        assert_eq!(first_point(&stream).unwrap(), Some(IVec2::new(25, 17)));
    }

    #[test]
    fn test_decode_multi_point_uses_deltas() {
        // MoveTo(2) with (5, 7) then (-2, -5) relative, giving (3, 2).
        let stream = [17, 10, 14, 3, 9];
        let parts = decode_geometry(&stream).unwrap();
        assert_eq!(
            parts,
            vec![vec![IVec2::new(5, 7)], vec![IVec2::new(3, 2)]]
        );
    }

    #[test]
    fn test_decode_line_and_close() {
        let stream = [
            GeometryCommand::MoveTo.integer(1),
            zigzag_encode(2),
            zigzag_encode(2),
            GeometryCommand::LineTo.integer(2),
            zigzag_encode(0),
            zigzag_encode(8),
            zigzag_encode(8),
            zigzag_encode(0),
            GeometryCommand::ClosePath.integer(1),
        ];
        let parts = decode_geometry(&stream).unwrap();
        assert_eq!(
            parts,
            vec![vec![IVec2::new(2, 2), IVec2::new(2, 10), IVec2::new(10, 10)]]
        );
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let stream = [9, 50];
        assert!(matches!(
            decode_geometry(&stream),
            Err(DecodeError::UnexpectedEof { .. })
        ));
        assert!(first_point(&stream).is_err());
    }

    #[test]
    fn test_unknown_command_is_error() {
        assert!(matches!(
            decode_geometry(&[4, 0, 0]),
            Err(DecodeError::InvalidFormat { .. })
        ));
    }

    #[test]
    fn test_line_to_without_move_to_is_error() {
        let stream = [GeometryCommand::LineTo.integer(1), 2, 2];
        assert!(decode_geometry(&stream).is_err());
    }

    #[test]
    fn test_empty_stream() {
        assert!(decode_geometry(&[]).unwrap().is_empty());
        assert_eq!(first_point(&[]).unwrap(), None);
    }

    proptest! {
        #[test]
        fn zigzag_inverts(value in any::<i32>()) {
            prop_assert_eq!(zigzag_decode(zigzag_encode(value)), value);
        }
    }
}
