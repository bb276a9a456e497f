//! The subject runtime.
//!
//! Subjects carry plain-data [`Trait`]s stored column-wise in chunks, behavioural [`Detail`]s
//! stored per subject, and a flagmark of [`Flag`]s. A [`Mechanism`] owns the subjects and is
//! iterated through [`Filter`]s:
//!
//! - [`registry`] assigns dense ids to trait and detail types.
//! - [`fingerprint`] holds the bitmask vocabulary: fingerprints, filters and flags.
//! - [`storage`] is the chunked struct-of-arrays store.
//! - [`subject`] holds ids, handles and the subject pool.
//! - [`mechanism`] ties it together, with serial and concurrent iteration and deferred changes.

pub mod detail;
pub mod fingerprint;
pub mod machine;
pub mod mechanism;
pub mod registry;
pub mod status;
pub mod storage;
pub mod subject;
pub mod traits;
pub(crate) mod util;

pub use apparatus_macros::{Detail, Trait};
pub use detail::Detail;
pub use fingerprint::{Filter, Fingerprint, Flag, Flagmark};
pub use machine::{Machine, WorldId};
pub use mechanism::{Chain, Mechanism, SolidChain, Subject, TickReport};
pub use registry::TypeRegistry;
pub use status::{Error, Outcome, Status};
pub use subject::{
    ConstSubjectHandle, Handle, SolidSubjectHandle, SubjectHandle, SubjectId, Subjective,
    UnsafeSubjectHandle,
};
pub use traits::{Trait, TraitSet};
