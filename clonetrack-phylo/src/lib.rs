#![doc = include_str!("../README.md")]

mod assignment;
mod collapse;
pub mod examples;
mod relation;
mod tree;

#[doc(inline)]
pub use assignment::MutationAssignment;
#[doc(inline)]
pub use collapse::{collapse, Collapsed, EditableTree, TreeMatrices};
#[doc(inline)]
pub use relation::{classify, Classifier, Relation};
#[doc(inline)]
pub use tree::CandidateTree;
