/// UI widgets
///
/// - `grid.rs` - thumbnail grid for the gallery

pub mod grid;
