use crate::card::Card;
use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// One of the two seats at a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Seat {
    Zero,
    One,
}

impl Seat {
    pub fn index(self) -> usize {
        match self {
            Seat::Zero => 0,
            Seat::One => 1,
        }
    }

    pub fn from_index(i: u64) -> Option<Seat> {
        match i {
            0 => Some(Seat::Zero),
            1 => Some(Seat::One),
            _ => None,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.index())
    }
}

impl Serialize for Seat {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.index() as u8)
    }
}

impl<'de> Deserialize<'de> for Seat {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let i = u64::deserialize(deserializer)?;
        Seat::from_index(i).ok_or_else(|| de::Error::custom(format!("seat must be 0 or 1, got {i}")))
    }
}

// --- Strength ---

/// Maps a seat's private cards plus the community cards to a comparable strength.
///
/// Implementations must be pure: the same seven cards always give the same strength.
pub trait Scorer: Send + Sync + 'static {
    type Strength: Ord + Copy + fmt::Debug + Send;

    fn strength(&self, hand: &[Card; 2], community: &[Card; 5]) -> Self::Strength;
}

/// Placeholder strength: the sum of rank values (2..=14) over all seven cards.
/// No pairs, straights or flushes are recognised.
#[derive(Debug, Clone, Copy, Default)]
pub struct RankSum;

impl Scorer for RankSum {
    type Strength = u32;

    fn strength(&self, hand: &[Card; 2], community: &[Card; 5]) -> u32 {
        hand.iter().chain(community).map(|c| c.rank.value()).sum()
    }
}

// --- Outcome ---

/// Result of one round. Encoded as `0`, `1` or `"draw"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Winner(Seat),
    Draw,
}

impl Outcome {
    /// Equal strengths draw; otherwise the stronger seat wins. Suits never break ties.
    pub fn decide<T: Ord>(seat0: T, seat1: T) -> Outcome {
        match seat0.cmp(&seat1) {
            std::cmp::Ordering::Equal => Outcome::Draw,
            std::cmp::Ordering::Greater => Outcome::Winner(Seat::Zero),
            std::cmp::Ordering::Less => Outcome::Winner(Seat::One),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Outcome::Winner(seat) => write!(f, "seat {seat} wins"),
            Outcome::Draw => write!(f, "draw"),
        }
    }
}

impl Serialize for Outcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Outcome::Winner(seat) => seat.serialize(serializer),
            Outcome::Draw => serializer.serialize_str("draw"),
        }
    }
}

impl<'de> Deserialize<'de> for Outcome {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct OutcomeVisitor;

        impl Visitor<'_> for OutcomeVisitor {
            type Value = Outcome;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("0, 1 or \"draw\"")
            }

            fn visit_u64<E: de::Error>(self, v: u64) -> Result<Outcome, E> {
                Seat::from_index(v)
                    .map(Outcome::Winner)
                    .ok_or_else(|| E::custom(format!("no seat {v}")))
            }

            fn visit_i64<E: de::Error>(self, v: i64) -> Result<Outcome, E> {
                u64::try_from(v)
                    .map_err(|_| E::custom(format!("no seat {v}")))
                    .and_then(|v| self.visit_u64(v))
            }

            fn visit_str<E: de::Error>(self, v: &str) -> Result<Outcome, E> {
                if v == "draw" {
                    Ok(Outcome::Draw)
                } else {
                    Err(E::invalid_value(de::Unexpected::Str(v), &self))
                }
            }
        }

        deserializer.deserialize_any(OutcomeVisitor)
    }
}
