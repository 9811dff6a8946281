mod affine;
mod list2ragged;
mod ragged2list;

pub use affine::{Affine, affine, affine_with};
pub use list2ragged::{List2Ragged, list2ragged};
pub use ragged2list::{Ragged2List, ragged2list};
