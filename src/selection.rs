//! Picklist narrowing which `(ksize, moltype, scaled/num)` sketch of a
//! multi-sketch `Signature` an operation should act on, grounded in
//! the teacher's `selection.rs` with the manifest/picklist-CSV
//! machinery dropped (no collection/CLI layer in this crate).

use typed_builder::TypedBuilder;

use crate::hash::HashFunctions;
use crate::Error;

#[derive(Default, Debug, TypedBuilder, Clone, Copy)]
pub struct Selection {
    #[builder(default, setter(strip_option))]
    ksize: Option<u32>,

    #[builder(default, setter(strip_option))]
    abund: Option<bool>,

    #[builder(default, setter(strip_option))]
    num: Option<u32>,

    #[builder(default, setter(strip_option))]
    scaled: Option<u32>,

    #[builder(default, setter(strip_option))]
    moltype: Option<HashFunctions>,
}

impl Selection {
    pub fn ksize(&self) -> Option<u32> {
        self.ksize
    }

    pub fn set_ksize(&mut self, ksize: u32) {
        self.ksize = Some(ksize);
    }

    pub fn abund(&self) -> Option<bool> {
        self.abund
    }

    pub fn set_abund(&mut self, value: bool) {
        self.abund = Some(value);
    }

    pub fn num(&self) -> Option<u32> {
        self.num
    }

    pub fn set_num(&mut self, num: u32) {
        self.num = Some(num);
    }

    pub fn scaled(&self) -> Option<u32> {
        self.scaled
    }

    pub fn set_scaled(&mut self, scaled: u32) {
        self.scaled = Some(scaled);
    }

    pub fn moltype(&self) -> Option<HashFunctions> {
        self.moltype
    }

    pub fn set_moltype(&mut self, value: HashFunctions) {
        self.moltype = Some(value);
    }
}

/// Narrows a collection of sketches to the ones matching a [`Selection`],
/// failing with `AmbiguousSelection` when more than one survives.
pub trait Select {
    fn select(self, selection: &Selection) -> Result<Self, Error>
    where
        Self: Sized;
}
