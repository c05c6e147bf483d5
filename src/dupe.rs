//! A `Clone`-like trait for cheap, explicit duplication of handles.
//! SPDX-License-Identifier: Apache-2.0 OR GPL-3.0-or-later
use std::sync::Arc;

/// Like `Clone`, but only for types where cloning is known to be O(1)
/// (reference-counted handles, `Copy` primitives, channel senders). Spelling
/// it out as `Dupe` rather than `clone()` makes call sites searchable and
/// keeps an accidental O(n) `Clone` impl from being used to duplicate a
/// shared handle.
pub trait Dupe {
    /// Duplicate this value.
    fn dupe(&self) -> Self;
}

impl<T> Dupe for Arc<T> {
    #[inline]
    fn dupe(&self) -> Self {
        Arc::clone(self)
    }
}

impl<T: Dupe> Dupe for Option<T> {
    #[inline]
    fn dupe(&self) -> Self {
        self.as_ref().map(Dupe::dupe)
    }
}

impl<T> Dupe for tokio::sync::mpsc::Sender<T> {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}

impl<T> Dupe for tokio::sync::mpsc::UnboundedSender<T> {
    #[inline]
    fn dupe(&self) -> Self {
        self.clone()
    }
}
