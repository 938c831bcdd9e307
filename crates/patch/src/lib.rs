//! # DandiClaw Patch Engine
//!
//! Pure functions over `serde_json::Value` documents:
//!
//! - **Path operations** (`get`, `set`, `delete`, `insert`, `append`) addressed
//!   by dotted paths such as `contributor.0.name` or `contributor[0].name`.
//! - **Structural deltas** (`diff`, `apply`, `reverse`) between two snapshots
//!   of a document, with array elements matched by identity so that a
//!   reordering is recorded as a move.
//!
//! Nothing in this crate mutates its input. Every operation hands back a new
//! document or a typed error describing why the operation was refused.

pub mod canonical;
pub mod changes;
pub mod delta;
pub mod error;
pub mod ops;
pub mod path;

pub use canonical::to_canonical_string;
pub use changes::{Change, ChangeKind, changes};
pub use delta::{ArrayDelta, Delta, apply, diff, reverse};
pub use error::{DeltaError, PatchError};
pub use ops::{Operation, append, apply_operation, delete, get, insert, set};
pub use path::{Path, Segment};
