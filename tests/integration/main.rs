//! Integration tests for the parbam CLI and library.
//!
//! These tests run the built binary end to end on BGZF files written to a
//! temporary directory.

mod helpers;
mod test_count_command;
mod test_decoder_equivalence;
mod test_dump_command;
