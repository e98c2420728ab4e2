//! Shared model for a networked table of card piles.
//!
//! The host owns a [`GameState`] and mutates it in response to viewer
//! [`Operation`]s; both travel between devices through [`wire`] frames.

pub mod card;
pub mod operation;
pub mod pile;
pub mod state;
pub mod table;
pub mod wire;

pub use card::{standard_deck, Card, Face, Rank, Suit, DECK_SIZE};
pub use operation::{OpKind, Operation, UNUSED_SLOT};
pub use pile::{Pile, NO_OWNER};
pub use state::{default_pile_name, GameState};
pub use table::{Table, MAIN_DECK_NAME, MAX_NUMBER_OF_PILES, MID_OF_TABLE, NUM_COLUMNS, NUM_ROWS};
pub use wire::WireError;
