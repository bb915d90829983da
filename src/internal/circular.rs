//! Circular dependency detection infrastructure.
//!
//! Resolution is async and may hop threads between awaits, so the stack of
//! services being constructed travels with each `ResolverContext` instead of
//! living in thread-local storage.

use smallvec::SmallVec;

use crate::error::{DiError, DiResult};

pub(crate) const MAX_DEPTH: usize = 64;

/// The chain of services currently being constructed, outermost first.
#[derive(Debug, Clone, Default)]
pub(crate) struct ResolutionPath {
    stack: SmallVec<[&'static str; 8]>,
}

impl ResolutionPath {
    /// Returns the path extended by `name`, or the cycle/depth error.
    pub(crate) fn enter(&self, name: &'static str) -> DiResult<ResolutionPath> {
        if self.stack.iter().any(|&n| n == name) {
            let mut path: Vec<&'static str> = self.stack.to_vec();
            path.push(name);
            return Err(DiError::Circular(path));
        }

        if self.stack.len() >= MAX_DEPTH {
            return Err(DiError::DepthExceeded(self.stack.len()));
        }

        let mut stack = self.stack.clone();
        stack.push(name);
        Ok(ResolutionPath { stack })
    }

    pub(crate) fn depth(&self) -> usize {
        self.stack.len()
    }
}
