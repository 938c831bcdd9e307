//! # DandiClaw Proposals
//!
//! A proposal pairs a delta with the hash of the document it was computed
//! against. It travels as an opaque token inside a shareable link; the
//! recipient only applies it if their copy of the document still hashes to
//! the same value.

pub mod codec;
pub mod error;
pub mod hash;
pub mod link;

pub use codec::{Proposal, decode, encode, validate};
pub use error::{LinkError, ProposalRejection};
pub use hash::compute_hash;
pub use link::{ProposalLink, build_link, parse_link};
