//! The broadcast snapshot of a table.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

use crate::card::{standard_deck, Card, DECK_SIZE};
use crate::pile::Pile;
use crate::table::{Table, MAIN_DECK_NAME, MID_OF_TABLE};

/// Everything a viewer needs to draw the table. Owned outright, so a clone is
/// a full deep copy with no ties back to the host.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub table: Table,
    /// Names of every pile currently on the table.
    pub pile_names: BTreeSet<String>,
    /// Number used for the next auto-named pile ("Pile N").
    pub default_pile_counter: u32,
    pub host_still_present: bool,
}

impl Default for GameState {
    fn default() -> Self {
        Self::new()
    }
}

impl GameState {
    /// Boot state: the full deck, face down, in the middle of the table.
    pub fn new() -> Self {
        let mut table = Table::new();
        let deck = Pile::with_cards(MAIN_DECK_NAME, standard_deck());
        let placed = table.place(MID_OF_TABLE, deck);
        debug_assert!(placed.is_ok(), "middle slot of a fresh table is free");

        let mut pile_names = BTreeSet::new();
        pile_names.insert(MAIN_DECK_NAME.to_string());

        GameState {
            table,
            pile_names,
            default_pile_counter: 1,
            host_still_present: true,
        }
    }

    pub fn next_default_pile_name(&self) -> String {
        default_pile_name(self.default_pile_counter)
    }

    pub fn pile(&self, slot: usize) -> Option<&Pile> {
        self.table.get(slot)
    }

    /// Checks the structural invariants every applied operation preserves:
    /// live names match the occupied slots, and the 52 cards are all present
    /// exactly once.
    pub fn check_invariants(&self) -> Result<(), String> {
        let occupied = self.table.pile_count();
        if occupied != self.pile_names.len() {
            return Err(format!(
                "{} occupied slots but {} live pile names",
                occupied,
                self.pile_names.len()
            ));
        }

        for (slot, pile) in self.table.piles() {
            if !self.pile_names.contains(pile.name()) {
                return Err(format!(
                    "pile '{}' in slot {} missing from live names",
                    pile.name(),
                    slot
                ));
            }
        }

        let mut seen: HashMap<Card, usize> = HashMap::with_capacity(DECK_SIZE);
        for (_, pile) in self.table.piles() {
            for card in pile {
                *seen.entry(*card).or_default() += 1;
            }
        }
        for card in standard_deck() {
            match seen.get(&card) {
                Some(1) => {}
                Some(n) => return Err(format!("{} appears {} times", card, n)),
                None => return Err(format!("{} is missing from the table", card)),
            }
        }
        if seen.len() != DECK_SIZE {
            return Err(format!("{} distinct cards on the table", seen.len()));
        }

        if self.default_pile_counter < 1 {
            return Err("default pile counter dropped below 1".to_string());
        }

        Ok(())
    }
}

pub fn default_pile_name(counter: u32) -> String {
    format!("Pile {}", counter)
}
