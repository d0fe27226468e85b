#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_yaml;
#[macro_use]
extern crate serde_json;

#[macro_use]
extern crate log;

#[macro_use] extern crate failure;

pub use failure::Error; //Fail
pub type Result<T> = std::result::Result<T, Error>;

/// Resource document helpers and boundary validation
pub mod resource;
pub use resource::Resource;

/// CPU and memory quantity canonicalization
pub mod units;
pub use units::{canonical_cpu, canonical_memory};

/// Structural merging with callable overlays
pub mod merge;
pub use merge::{merge, merge_each, Overlay};

/// Semantic list tagging (set / keyed / positional)
pub mod listkind;

/// Kind-dispatched normalizer
pub mod normalize;
pub use normalize::{normalize, normalize_in};

/// Patch production from normalized resource pairs
pub mod diff;
pub use diff::{diff, PatchOp};

/// Adoption of server-assigned dynamic values
pub mod adopt;
pub use adopt::adopt;

/// Yaml document stream splitting and List flattening
pub mod multidoc;
pub use multidoc::resource_list;
