//! `clonetrack` **TRACK**s the **CLONE**s of a tumor, by revising the plausibility of
//! candidate clonal phylogenies as marker evidence arrives over time.
//!
//! ## Why clonetrack?
//!
//! 1. Bootstrapped bulk sequencing produces an _ensemble_ of candidate trees, not a single tree.
//!
//!    Each tree in the [`Ensemble`] carries a weight, its share of the bootstrap replicates.
//!
//! 1. Targeted marker panels (ex. ddPCR on liquid biopsies) are _sparse_ but _repeated_.
//!
//!    At each timepoint, a handful of [`Observation`]s (mutant and total droplets) test how
//!    the marked clones are related: the same clone, ancestor and descendant, or siblings.
//!
//! 1. **Evidence accumulates.**
//!
//!    Each timepoint's posterior ensemble is the next timepoint's prior. The Bayesian
//!    [`Method`] reweights every tree by the likelihood of all marker pairs, while the
//!    rejection methods remove trees that the markers contradict.
//!
//! Tree structures and the node collapsing engine live in the `clonetrack-phylo` crate.

pub mod cli;
pub mod ensemble;
pub mod longitudinal;
pub mod observation;
pub mod run;
pub mod stats;
pub mod table;
pub mod update;
pub mod utils;

#[doc(inline)]
pub use crate::cli::Cli;
#[doc(inline)]
pub use crate::ensemble::{Ensemble, Member};
#[doc(inline)]
pub use crate::observation::{MarkerSelection, Observation, Panel};
#[doc(inline)]
pub use crate::update::Method;
#[doc(inline)]
pub use table::Table;
#[doc(inline)]
pub use utils::verbosity::Verbosity;
