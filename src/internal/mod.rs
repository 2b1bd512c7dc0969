//! Internal building blocks (object model) that power the public APIs.

pub mod object;
