use serde::{Deserialize, Serialize};
use std::fmt;

use crate::card::Card;

/// Marker for a slot field the operation does not use.
pub const UNUSED_SLOT: i32 = -1;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OpKind {
    Move,
    Flip,
    Create,
    Connect,
    Shuffle,
    Delete,
    FaceUp,
    FaceDown,
    MoveAll,
    Protect,
    Unprotect,
    PileMove,
    Disconnect,
}

/// A viewer request. Carries the union of fields any request needs; fields a
/// tag does not use travel with their defaults.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    pub op: OpKind,
    pub pile1: i32,
    pub pile2: i32,
    pub card: Option<Card>,
    pub name: String,
    #[serde(rename = "ipAddr")]
    pub ip_addr: String,
}

impl Operation {
    pub fn new(op: OpKind) -> Self {
        Operation {
            op,
            pile1: UNUSED_SLOT,
            pile2: UNUSED_SLOT,
            card: None,
            name: String::new(),
            ip_addr: String::new(),
        }
    }

    fn on(op: OpKind, pile1: i32) -> Self {
        Operation {
            pile1,
            ..Operation::new(op)
        }
    }

    fn between(op: OpKind, pile1: i32, pile2: i32) -> Self {
        Operation {
            pile1,
            pile2,
            ..Operation::new(op)
        }
    }

    fn named(op: OpKind, pile1: i32, name: impl Into<String>) -> Self {
        Operation {
            pile1,
            name: name.into(),
            ..Operation::new(op)
        }
    }

    fn addressed(op: OpKind, ip_addr: impl Into<String>) -> Self {
        Operation {
            ip_addr: ip_addr.into(),
            ..Operation::new(op)
        }
    }

    /// Moves one card (matched by suit and rank) from `from` to `to`.
    pub fn move_card(from: i32, to: i32, card: Card) -> Self {
        Operation {
            card: Some(card),
            ..Operation::between(OpKind::Move, from, to)
        }
    }

    pub fn flip(pile: i32, card: Card) -> Self {
        Operation {
            card: Some(card),
            ..Operation::on(OpKind::Flip, pile)
        }
    }

    pub fn create(pile: i32, name: impl Into<String>) -> Self {
        Operation::named(OpKind::Create, pile, name)
    }

    pub fn connect(ip_addr: impl Into<String>) -> Self {
        Operation::addressed(OpKind::Connect, ip_addr)
    }

    pub fn shuffle(pile: i32) -> Self {
        Operation::on(OpKind::Shuffle, pile)
    }

    pub fn delete(pile: i32) -> Self {
        Operation::on(OpKind::Delete, pile)
    }

    pub fn face_up(pile: i32) -> Self {
        Operation::on(OpKind::FaceUp, pile)
    }

    pub fn face_down(pile: i32) -> Self {
        Operation::on(OpKind::FaceDown, pile)
    }

    pub fn move_all(from: i32, to: i32) -> Self {
        Operation::between(OpKind::MoveAll, from, to)
    }

    pub fn protect(pile: i32, owner: impl Into<String>) -> Self {
        Operation::named(OpKind::Protect, pile, owner)
    }

    pub fn unprotect(pile: i32, owner: impl Into<String>) -> Self {
        Operation::named(OpKind::Unprotect, pile, owner)
    }

    pub fn pile_move(from: i32, to: i32) -> Self {
        Operation::between(OpKind::PileMove, from, to)
    }

    pub fn disconnect(ip_addr: impl Into<String>) -> Self {
        Operation::addressed(OpKind::Disconnect, ip_addr)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.op)?;
        match self.op {
            OpKind::Connect | OpKind::Disconnect => write!(f, "({})", self.ip_addr),
            OpKind::Move => match &self.card {
                Some(card) => write!(f, "({} -> {}, {})", self.pile1, self.pile2, card),
                None => write!(f, "({} -> {})", self.pile1, self.pile2),
            },
            OpKind::MoveAll | OpKind::PileMove => write!(f, "({} -> {})", self.pile1, self.pile2),
            OpKind::Create | OpKind::Protect | OpKind::Unprotect => {
                write!(f, "({}, {:?})", self.pile1, self.name)
            }
            _ => write!(f, "({})", self.pile1),
        }
    }
}
