//! Applies viewer operations to the authoritative table.
//!
//! Pure state transitions: nothing here touches the network. The caller holds
//! the table-wide lock, applies one operation, and broadcasts when the
//! outcome says the table changed.

use card_table::{
    default_pile_name, Face, GameState, OpKind, Operation, Pile, Table, MAIN_DECK_NAME, NO_OWNER,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The table changed; every viewer needs the new snapshot.
    Applied,
    /// Nothing changed. The reason is only logged.
    Rejected(&'static str),
    /// Open a snapshot channel to this viewer address.
    Connect(String),
    /// Drop the viewer registered under this address.
    Disconnect(String),
}

impl Outcome {
    pub fn is_applied(&self) -> bool {
        matches!(self, Outcome::Applied)
    }
}

type Step = Result<(), &'static str>;

pub struct Dispatcher {
    state: GameState,
    rng: StdRng,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Boot table with a shuffle source seeded from OS entropy.
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_rng(rng: StdRng) -> Self {
        Dispatcher {
            state: GameState::new(),
            rng,
        }
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    /// Deep copy for broadcasting.
    pub fn snapshot(&self) -> GameState {
        self.state.clone()
    }

    pub fn set_host_present(&mut self, present: bool) {
        self.state.host_still_present = present;
    }

    pub fn apply(&mut self, op: &Operation) -> Outcome {
        let step = match op.op {
            OpKind::Connect => return address_outcome(op, Outcome::Connect),
            OpKind::Disconnect => return address_outcome(op, Outcome::Disconnect),
            OpKind::Move => self.move_card(op),
            OpKind::Flip => self.flip(op),
            OpKind::Create => self.create(op),
            OpKind::Shuffle => self.shuffle(op),
            OpKind::Delete => self.delete(op),
            OpKind::FaceUp => self.set_faces(op, Face::Up),
            OpKind::FaceDown => self.set_faces(op, Face::Down),
            OpKind::MoveAll => self.move_all(op),
            OpKind::Protect => self.protect(op),
            OpKind::Unprotect => self.unprotect(op),
            OpKind::PileMove => self.pile_move(op),
        };
        match step {
            Ok(()) => Outcome::Applied,
            Err(reason) => Outcome::Rejected(reason),
        }
    }

    fn pile_mut(&mut self, raw: i32) -> Result<&mut Pile, &'static str> {
        let slot = slot(raw)?;
        self.state.table.get_mut(slot).ok_or("slot is empty")
    }

    fn move_card(&mut self, op: &Operation) -> Step {
        let card = op.card.as_ref().ok_or("no card given")?;
        let (from, to) = (slot(op.pile1)?, slot(op.pile2)?);

        if from == to {
            let pile = self.state.table.get_mut(from).ok_or("slot is empty")?;
            let idx = pile.position_of(card).ok_or("card not in source pile")?;
            let moved = pile.take_card(idx).ok_or("card not in source pile")?;
            pile.add_card(moved);
            return Ok(());
        }

        let (src, dest) = self
            .state
            .table
            .pair_mut(from, to)
            .ok_or("source or destination slot is empty")?;
        let idx = src.position_of(card).ok_or("card not in source pile")?;
        let moved = src.take_card(idx).ok_or("card not in source pile")?;
        dest.add_card(moved);
        Ok(())
    }

    fn flip(&mut self, op: &Operation) -> Step {
        let card = op.card.as_ref().ok_or("no card given")?;
        let pile = self.pile_mut(op.pile1)?;
        let idx = pile.position_of(card).ok_or("card not in pile")?;
        pile.cards[idx].flip();
        Ok(())
    }

    fn create(&mut self, op: &Operation) -> Step {
        let at = slot(op.pile1)?;
        if self.state.table.is_occupied(at) {
            return Err("slot already holds a pile");
        }
        if op.name == MAIN_DECK_NAME {
            return Err("name is reserved");
        }
        if self.state.pile_names.contains(&op.name) {
            return Err("name already in use");
        }

        self.state
            .table
            .place(at, Pile::new(op.name.clone()))
            .map_err(|_| "slot already holds a pile")?;
        self.state.pile_names.insert(op.name.clone());
        // Only the exact next default name advances the counter.
        if op.name == default_pile_name(self.state.default_pile_counter) {
            self.state.default_pile_counter += 1;
        }
        Ok(())
    }

    fn shuffle(&mut self, op: &Operation) -> Step {
        let at = slot(op.pile1)?;
        let pile = self.state.table.get_mut(at).ok_or("slot is empty")?;
        pile.shuffle(&mut self.rng);
        Ok(())
    }

    fn delete(&mut self, op: &Operation) -> Step {
        let at = slot(op.pile1)?;
        match self.state.table.get(at) {
            None => return Err("slot is empty"),
            Some(pile) if !pile.is_empty() => return Err("pile still holds cards"),
            Some(_) => {}
        }
        let pile = self.state.table.remove(at).ok_or("slot is empty")?;
        self.state.pile_names.remove(pile.name());
        Ok(())
    }

    fn set_faces(&mut self, op: &Operation, face: Face) -> Step {
        self.pile_mut(op.pile1)?.set_all_faces(face);
        Ok(())
    }

    fn move_all(&mut self, op: &Operation) -> Step {
        let (from, to) = (slot(op.pile1)?, slot(op.pile2)?);
        if from == to {
            return Err("source and destination are the same pile");
        }
        let (src, dest) = self
            .state
            .table
            .pair_mut(from, to)
            .ok_or("source or destination slot is empty")?;
        src.drain_into(dest);
        Ok(())
    }

    fn protect(&mut self, op: &Operation) -> Step {
        let owner = op.name.clone();
        self.pile_mut(op.pile1)?.set_owner(owner);
        Ok(())
    }

    fn unprotect(&mut self, op: &Operation) -> Step {
        let pile = self.pile_mut(op.pile1)?;
        if pile.owner() != op.name {
            return Err("pile is owned by someone else");
        }
        pile.set_owner(NO_OWNER);
        Ok(())
    }

    fn pile_move(&mut self, op: &Operation) -> Step {
        let (from, to) = (slot(op.pile1)?, slot(op.pile2)?);
        if self.state.table.is_occupied(to) {
            return Err("destination slot is occupied");
        }
        let pile = self.state.table.remove(from).ok_or("slot is empty")?;
        if let Err(pile) = self.state.table.place(to, pile) {
            let restored = self.state.table.place(from, pile);
            debug_assert!(restored.is_ok(), "source slot was just vacated");
            return Err("destination slot is occupied");
        }
        Ok(())
    }
}

fn slot(raw: i32) -> Result<usize, &'static str> {
    Table::slot_index(raw).ok_or("slot index out of range")
}

fn address_outcome(op: &Operation, wrap: fn(String) -> Outcome) -> Outcome {
    if op.ip_addr.trim().is_empty() {
        Outcome::Rejected("no viewer address given")
    } else {
        wrap(op.ip_addr.clone())
    }
}
