//! Presentation helpers shared by views.

pub mod color;
