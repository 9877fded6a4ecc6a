//! Identity resolver (C3) — given an entity reported by one tracker, locates
//! its counterpart in the mapping store by stored cross-system id,
//! description-tag fallback, or normalized title match (§4.3).

pub mod resolver;
pub mod tags;

pub use resolver::IdentityResolver;
pub use tags::{extract_beads_tag, with_beads_tag};
