//! Parsing and validation of free-text user input.
//!
//! Every parser returns an [`InputError`] naming the violated constraint so
//! the dialog layer can re-prompt with a precise message.

pub mod rules;

pub use rules::InputError;
