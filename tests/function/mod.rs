//! Tests for the composite function tree.

mod evaluation;
mod index_tables;
mod serialization;
mod ties;
