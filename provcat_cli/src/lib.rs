#![recursion_limit = "1024"]
#![allow(renamed_and_removed_lints)]

#[macro_use]
extern crate serde_derive;
extern crate serde;
extern crate serde_yaml;
#[macro_use]
extern crate serde_json;

#[macro_use]
extern crate log;

// sanity
extern crate regex;

// scratch file names for local patch simulation
extern crate uuid;

#[macro_use] extern crate failure;

pub use failure::Error; //Fail
pub type Result<T> = std::result::Result<T, Error>;

extern crate provcat_definitions;
pub use provcat_definitions::{adopt, diff, listkind, multidoc, normalize, resource, units};
pub use provcat_definitions::diff::PatchOp;
pub use provcat_definitions::Resource;

/// A small CLI interface to `oc`
pub mod oc;
pub use oc::{Connection, Oc};

/// The reconciler: decide and mutate
pub mod provision;
pub use provision::{provision, Action, PatchType, ProvisionRequest, ProvisionResult};

/// Change-record file emission
pub mod record;
