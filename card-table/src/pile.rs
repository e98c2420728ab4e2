use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::card::{Card, Face};

/// Owner tag of a pile nobody has protected.
pub const NO_OWNER: &str = "noOwner";

/// A named, ordered stack of cards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pile {
    pub name: String,
    pub owner: String,
    pub cards: Vec<Card>,
}

impl Pile {
    pub fn new(name: impl Into<String>) -> Self {
        Pile {
            name: name.into(),
            owner: NO_OWNER.to_string(),
            cards: Vec::new(),
        }
    }

    pub fn with_cards(name: impl Into<String>, cards: Vec<Card>) -> Self {
        Pile {
            cards,
            ..Pile::new(name)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    /// Appends to the tail, keeping the card's face.
    pub fn add_card(&mut self, card: Card) {
        self.cards.push(card);
    }

    /// Removes and returns the card at `index`, or `None` past the end.
    pub fn take_card(&mut self, index: usize) -> Option<Card> {
        if index < self.cards.len() {
            Some(self.cards.remove(index))
        } else {
            None
        }
    }

    pub fn card(&self, index: usize) -> Option<&Card> {
        self.cards.get(index)
    }

    /// Position of the first card with the same suit and rank.
    pub fn position_of(&self, card: &Card) -> Option<usize> {
        self.cards.iter().position(|c| c == card)
    }

    pub fn contains(&self, card: &Card) -> bool {
        self.position_of(card).is_some()
    }

    pub fn shuffle<R: Rng + ?Sized>(&mut self, rng: &mut R) {
        self.cards.shuffle(rng);
    }

    pub fn set_all_faces(&mut self, face: Face) {
        for card in &mut self.cards {
            card.set_face(face);
        }
    }

    /// Moves every card, front first, onto the tail of `dest`.
    pub fn drain_into(&mut self, dest: &mut Pile) {
        dest.cards.append(&mut self.cards);
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn set_owner(&mut self, owner: impl Into<String>) {
        self.owner = owner.into();
    }

    pub fn is_protected(&self) -> bool {
        self.owner != NO_OWNER
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Card> {
        self.cards.iter()
    }
}

impl<'a> IntoIterator for &'a Pile {
    type Item = &'a Card;
    type IntoIter = std::slice::Iter<'a, Card>;

    fn into_iter(self) -> Self::IntoIter {
        self.cards.iter()
    }
}
