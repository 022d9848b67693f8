//! Application Use Cases

mod place_bracket;

pub use place_bracket::{PlaceBracketRequest, PlaceBracketUseCase, PlacementError};
