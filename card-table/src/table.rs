use serde::{Deserialize, Serialize};

use crate::pile::Pile;

pub const NUM_ROWS: usize = 3;
pub const NUM_COLUMNS: usize = 8;
pub const MAX_NUMBER_OF_PILES: usize = NUM_ROWS * NUM_COLUMNS;
/// Slot the main deck starts in.
pub const MID_OF_TABLE: usize = MAX_NUMBER_OF_PILES / 2 - 1;
pub const MAIN_DECK_NAME: &str = "deck";

/// Positional array of pile slots. Empty slots are kept so that positions
/// mean the same thing on every device.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    slots: Vec<Option<Pile>>,
}

impl Default for Table {
    fn default() -> Self {
        Table {
            slots: vec![None; MAX_NUMBER_OF_PILES],
        }
    }
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Converts a wire slot index into a table position.
    pub fn slot_index(raw: i32) -> Option<usize> {
        usize::try_from(raw)
            .ok()
            .filter(|&idx| idx < MAX_NUMBER_OF_PILES)
    }

    pub fn get(&self, slot: usize) -> Option<&Pile> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: usize) -> Option<&mut Pile> {
        self.slots.get_mut(slot).and_then(Option::as_mut)
    }

    pub fn is_occupied(&self, slot: usize) -> bool {
        self.get(slot).is_some()
    }

    /// Puts `pile` into an empty slot. Hands the pile back if the slot is
    /// taken or out of range.
    pub fn place(&mut self, slot: usize, pile: Pile) -> Result<(), Pile> {
        match self.slots.get_mut(slot) {
            Some(entry) if entry.is_none() => {
                *entry = Some(pile);
                Ok(())
            }
            _ => Err(pile),
        }
    }

    pub fn remove(&mut self, slot: usize) -> Option<Pile> {
        self.slots.get_mut(slot).and_then(Option::take)
    }

    /// Mutable access to two different occupied slots at once.
    pub fn pair_mut(&mut self, a: usize, b: usize) -> Option<(&mut Pile, &mut Pile)> {
        if a == b || a >= self.slots.len() || b >= self.slots.len() {
            return None;
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let (head, tail) = self.slots.split_at_mut(hi);
        let lo_pile = head[lo].as_mut()?;
        let hi_pile = tail[0].as_mut()?;
        if a < b {
            Some((lo_pile, hi_pile))
        } else {
            Some((hi_pile, lo_pile))
        }
    }

    pub fn slots(&self) -> &[Option<Pile>] {
        &self.slots
    }

    /// Occupied slots with their positions.
    pub fn piles(&self) -> impl Iterator<Item = (usize, &Pile)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.as_ref().map(|pile| (idx, pile)))
    }

    pub fn pile_count(&self) -> usize {
        self.piles().count()
    }

    pub fn card_count(&self) -> usize {
        self.piles().map(|(_, pile)| pile.len()).sum()
    }

    pub fn find_by_name(&self, name: &str) -> Option<usize> {
        self.piles()
            .find(|(_, pile)| pile.name() == name)
            .map(|(idx, _)| idx)
    }
}
