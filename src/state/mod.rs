/// State management module
///
/// This module handles all application state, including:
/// - Shared data structures (data.rs)
/// - The gallery the consumer appends decoded images to (gallery.rs)

pub mod data;
pub mod gallery;
