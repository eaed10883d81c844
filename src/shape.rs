//! Three-dimensional layer shapes.
//!
//! A shape is `height x width x depth`. Any dimension may be unresolved
//! (`None`) until the layer's producers are known; such a shape has no size.
//! Flat data is laid out row-major with depth varying fastest, so a vector of
//! `n` values is the shape `n x 1 x 1`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dimensions of a layer's input or output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Shape {
    pub height: Option<usize>,
    pub width: Option<usize>,
    pub depth: Option<usize>,
}

impl Shape {
    /// Creates a fully resolved shape.
    pub fn new(height: usize, width: usize, depth: usize) -> Self {
        Shape {
            height: Some(height),
            width: Some(width),
            depth: Some(depth),
        }
    }

    /// Creates the flat shape `size x 1 x 1`.
    pub fn vector(size: usize) -> Self {
        Shape::new(size, 1, 1)
    }

    /// Creates a shape whose every dimension is unresolved.
    pub fn unresolved() -> Self {
        Shape::default()
    }

    /// Total element count, or `None` while any dimension is unresolved.
    ///
    /// # Examples
    ///
    /// ```
    /// use ffnn::Shape;
    ///
    /// assert_eq!(Shape::new(4, 3, 2).size(), Some(24));
    /// assert_eq!(Shape::unresolved().size(), None);
    /// ```
    pub fn size(&self) -> Option<usize> {
        Some(self.height? * self.width? * self.depth?)
    }

    /// `true` when every dimension is resolved.
    pub fn is_resolved(&self) -> bool {
        self.size().is_some()
    }

    /// `true` when the shape is resolved and holds at least one element.
    pub fn valid(&self) -> bool {
        matches!(self.size(), Some(size) if size > 0)
    }

    /// Resolved dimensions as an ndarray pattern.
    pub fn dims(&self) -> Option<(usize, usize, usize)> {
        Some((self.height?, self.width?, self.depth?))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.dims() {
            Some((h, w, d)) => write!(f, "<{} x {} x {}>", h, w, d),
            None => write!(f, "<undefined>"),
        }
    }
}
